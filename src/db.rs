use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::parser::record::FlightRecord;

/// Where finished records go.
pub trait ResultStore {
    fn insert_batch(&mut self, records: &[FlightRecord]) -> Result<usize>;
}

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct SqliteStore {
    conn: Connection,
}

/// Column order of the `scraped` table, shared by insert and CSV export.
pub const COLUMNS: [&str; 23] = [
    "depart_departure_datetime",
    "depart_departure_day",
    "depart_arrival_datetime",
    "depart_arrival_day",
    "return_departure_datetime",
    "return_departure_day",
    "return_arrival_datetime",
    "return_arrival_day",
    "airlines",
    "travel_time",
    "origin",
    "destination",
    "layover_n",
    "layover_time",
    "layover_location",
    "price",
    "price_currency",
    "price_trend",
    "price_value",
    "access_date",
    "one_way",
    "has_train",
    "days_advance",
];

impl SqliteStore {
    /// Open (or create) the database. `overwrite` drops existing rows.
    pub fn open(path: &Path, overwrite: bool) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn, overwrite)
    }

    pub fn with_connection(conn: Connection, overwrite: bool) -> Result<Self> {
        let store = SqliteStore { conn };
        store.init_schema(overwrite)?;
        Ok(store)
    }

    fn init_schema(&self, overwrite: bool) -> Result<()> {
        if overwrite {
            self.conn.execute_batch("DROP TABLE IF EXISTS scraped;")?;
            tracing::info!("dropped table scraped");
        }
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS scraped (
                id                        INTEGER PRIMARY KEY,
                depart_departure_datetime TEXT,
                depart_departure_day      TEXT,
                depart_arrival_datetime   TEXT,
                depart_arrival_day        TEXT,
                return_departure_datetime TEXT,
                return_departure_day      TEXT,
                return_arrival_datetime   TEXT,
                return_arrival_day        TEXT,
                airlines                  TEXT,
                travel_time               INTEGER NOT NULL,
                origin                    TEXT NOT NULL,
                destination               TEXT NOT NULL,
                layover_n                 INTEGER NOT NULL,
                layover_time              INTEGER,
                layover_location          TEXT,
                price                     INTEGER,
                price_currency            TEXT,
                price_trend               TEXT,
                price_value               TEXT,
                access_date               TEXT NOT NULL,
                one_way                   BOOLEAN NOT NULL,
                has_train                 BOOLEAN NOT NULL,
                days_advance              INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_scraped_route ON scraped(origin, destination);
            ",
        )?;
        Ok(())
    }

    pub fn route_summary(&self) -> Result<Vec<RouteSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT origin, destination, COUNT(*), MIN(price), AVG(price)
             FROM scraped
             GROUP BY origin, destination
             ORDER BY origin, destination",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RouteSummary {
                    origin: row.get(0)?,
                    destination: row.get(1)?,
                    rows: row.get(2)?,
                    min_price: row.get(3)?,
                    avg_price: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl ResultStore for SqliteStore {
    fn insert_batch(&mut self, records: &[FlightRecord]) -> Result<usize> {
        let placeholders: Vec<String> = (1..=COLUMNS.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO scraped ({}) VALUES ({})",
            COLUMNS.join(", "),
            placeholders.join(", ")
        );

        let tx = self.conn.transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for r in records {
                let fmt = |dt: &chrono::NaiveDateTime| dt.format(DATETIME_FORMAT).to_string();
                count += stmt.execute(rusqlite::params![
                    fmt(&r.depart_departure),
                    r.depart_departure_day,
                    fmt(&r.depart_arrival),
                    r.depart_arrival_day,
                    r.return_departure.as_ref().map(fmt),
                    r.return_departure_day,
                    r.return_arrival.as_ref().map(fmt),
                    r.return_arrival_day,
                    serde_json::to_string(&r.airlines)?,
                    r.travel_time,
                    r.origin,
                    r.destination,
                    r.layover_n,
                    r.layover_time,
                    (!r.layover_location.is_empty())
                        .then(|| serde_json::to_string(&r.layover_location))
                        .transpose()?,
                    r.price,
                    r.price_currency,
                    r.price_trend,
                    r.price_value,
                    r.access_date.to_rfc3339(),
                    r.one_way,
                    r.has_train,
                    r.days_advance,
                ])?;
            }
        }
        tx.commit()?;
        Ok(count)
    }
}

pub struct RouteSummary {
    pub origin: String,
    pub destination: String,
    pub rows: i64,
    pub min_price: Option<i64>,
    pub avg_price: Option<f64>,
}

// ── Tests ──
