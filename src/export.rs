use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::db::{COLUMNS, DATETIME_FORMAT};
use crate::parser::record::FlightRecord;

/// Write records to a CSV file at `path`, replacing it.
pub fn export_csv(path: &Path, records: &[FlightRecord]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    write_csv(file, records)
}

/// Header row in `scraped` column order, then one row per record.
pub fn write_csv<W: Write>(out: W, records: &[FlightRecord]) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(COLUMNS)?;
    for r in records {
        wtr.write_record(row(r))?;
    }
    wtr.flush()?;
    Ok(records.len())
}

fn row(r: &FlightRecord) -> [String; 23] {
    let dt = |d: &chrono::NaiveDateTime| d.format(DATETIME_FORMAT).to_string();
    let opt = |v: Option<String>| v.unwrap_or_default();
    [
        dt(&r.depart_departure),
        r.depart_departure_day.clone(),
        dt(&r.depart_arrival),
        r.depart_arrival_day.clone(),
        opt(r.return_departure.as_ref().map(dt)),
        opt(r.return_departure_day.clone()),
        opt(r.return_arrival.as_ref().map(dt)),
        opt(r.return_arrival_day.clone()),
        r.airlines.join("; "),
        r.travel_time.to_string(),
        r.origin.clone(),
        r.destination.clone(),
        r.layover_n.to_string(),
        opt(r.layover_time.map(|t| t.to_string())),
        r.layover_location.join("; "),
        opt(r.price.map(|p| p.to_string())),
        opt(r.price_currency.clone()),
        opt(r.price_trend.clone()),
        opt(r.price_value.clone()),
        r.access_date.to_rfc3339(),
        r.one_way.to_string(),
        r.has_train.to_string(),
        r.days_advance.to_string(),
    ]
}

// ── Tests ──
