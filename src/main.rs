mod db;
mod error;
mod export;
mod fetcher;
mod orchestrator;
mod parser;
mod planner;
mod settings;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use db::{ResultStore, SqliteStore};
use fetcher::{DumpFetcher, HttpFetcher, PageFetcher};
use orchestrator::{Orchestrator, Progress, RunOptions};
use parser::record::{FlightRecord, FlightRecordBuilder};
use planner::DateWindow;
use settings::Settings;

#[derive(Parser)]
#[command(name = "flight_scraper", about = "Date-windowed flight price scraper")]
struct Cli {
    /// Settings file (toml, ini, json, yaml)
    #[arg(short, long, global = true, default_value = "flights.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the query windows each configured route expands to
    Plan,
    /// Scrape every planned window and store the results
    Run {
        /// Replay saved line dumps from this directory instead of fetching
        #[arg(long)]
        replay: Option<PathBuf>,
        /// Print a summary but do not write to the database
        #[arg(long)]
        no_store: bool,
        /// Drop and recreate the results table before saving
        #[arg(long, conflicts_with = "no_store")]
        overwrite: bool,
        /// Also write the scraped flights to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Segment a saved line dump and print the flights found in it
    Parse {
        file: PathBuf,
        #[arg(long)]
        origin: String,
        #[arg(long)]
        dest: String,
        /// Leave date (YYYY-MM-DD)
        #[arg(long)]
        leave: NaiveDate,
        /// Return date (YYYY-MM-DD) for round trips
        #[arg(long)]
        ret: Option<NaiveDate>,
    },
    /// Rows and prices stored per route
    Stats,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    let result = match cli.command {
        Commands::Plan => {
            let today = Local::now().date_naive();
            let routes = settings.route_specs()?;
            planner::check_routes(&routes)?;
            let mut total = 0;
            for route in &routes {
                let windows = planner::plan(route, today)?;
                println!("{} -> {} ({}, {} windows)", route.origin, route.destination, route.mode.kind(), windows.len());
                for w in &windows {
                    println!("  {}", w);
                }
                total += windows.len();
            }
            println!("\n{} windows across {} routes", total, routes.len());
            Ok(())
        }
        Commands::Run { replay, no_store, overwrite, csv } => {
            let output = Output { store: !no_store, overwrite, csv };
            match replay {
                Some(dir) => run(&settings, DumpFetcher::new(dir), &output),
                None => {
                    let fetcher = HttpFetcher::new(Duration::from_secs(settings.timeout_secs))?;
                    run(&settings, fetcher, &output)
                }
            }
        }
        Commands::Parse { file, origin, dest, leave, ret } => {
            let window = match ret {
                Some(r) => DateWindow::round_trip(leave, r)
                    .with_context(|| format!("return date {} must be after leave date {}", r, leave))?,
                None => DateWindow::one_way(leave),
            };
            let records = parse_dump(&file, &origin, &dest, &window)?;
            print_records(&records);
            Ok(())
        }
        Commands::Stats => {
            let store = SqliteStore::open(&settings.db_path, false)?;
            let rows = store.route_summary()?;
            if rows.is_empty() {
                println!("No flights stored yet. Run 'run' first.");
                return Ok(());
            }
            println!("{:<6} | {:<6} | {:>6} | {:>8} | {:>8}", "From", "To", "Rows", "Min", "Avg");
            println!("{}", "-".repeat(46));
            for r in &rows {
                let min = r.min_price.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
                let avg = r.avg_price.map(|p| format!("{:.0}", p)).unwrap_or_else(|| "-".into());
                println!("{:<6} | {:<6} | {:>6} | {:>8} | {:>8}", r.origin, r.destination, r.rows, min, avg);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Where `run` sends its records.
struct Output {
    store: bool,
    overwrite: bool,
    csv: Option<PathBuf>,
}

fn run<F: PageFetcher>(settings: &Settings, fetcher: F, output: &Output) -> anyhow::Result<()> {
    let routes = settings.route_specs()?;
    if routes.is_empty() {
        println!("No routes configured in settings.");
        return Ok(());
    }

    let options = RunOptions {
        country: settings.country.clone(),
        currency: settings.currency.clone(),
        today: Local::now().date_naive(),
        dump_dir: settings.dump_dir.clone(),
    };
    let mut orch = Orchestrator::new(fetcher, FlightRecordBuilder::new(), options);
    let mut progress = BarProgress::default();
    let (records, stats) = orch.run(&routes, &mut progress)?;

    println!(
        "Scraped {} windows ({} ok, {} errors), {} flights, avg {:.2}s per window",
        stats.planned,
        stats.completed,
        stats.errored,
        records.len(),
        stats.mean_secs()
    );

    if let Some(path) = &output.csv {
        let n = export::export_csv(path, &records)?;
        println!("Exported {} rows to {:?}", n, path);
    }

    if !output.store || (records.is_empty() && !output.overwrite) {
        return Ok(());
    }
    let mut store = SqliteStore::open(&settings.db_path, output.overwrite)?;
    let n = store.insert_batch(&records)?;
    println!("Saved {} rows to {:?}", n, settings.db_path);
    Ok(())
}

fn parse_dump(file: &Path, origin: &str, dest: &str, window: &DateWindow) -> anyhow::Result<Vec<FlightRecord>> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let lines = fetcher::normalize_lines(raw.lines());
    let builder = FlightRecordBuilder::new();
    Ok(parser::process_page(&lines, origin, dest, window, &builder)?)
}

fn print_records(records: &[FlightRecord]) {
    if records.is_empty() {
        println!("No flights found.");
        return;
    }
    println!(
        "{:>3} | {:<16} | {:<16} | {:<20} | {:>6} | {:>5} | {:>7}",
        "#", "Departs", "Arrives", "Airlines", "Time", "Stops", "Price"
    );
    println!("{}", "-".repeat(90));
    for (i, r) in records.iter().enumerate() {
        let price = match (&r.price_currency, r.price) {
            (Some(c), Some(p)) => format!("{}{}", c, p),
            _ => "-".into(),
        };
        println!(
            "{:>3} | {:<16} | {:<16} | {:<20} | {:>6} | {:>5} | {:>7}",
            i + 1,
            r.depart_departure.format("%Y-%m-%d %H:%M"),
            r.depart_arrival.format("%Y-%m-%d %H:%M"),
            truncate(&r.airlines.join(", "), 20),
            format!("{}h{:02}", r.travel_time / 60, r.travel_time % 60),
            r.layover_n,
            price
        );
    }
    if let Some(trend) = records.first().and_then(|r| r.price_trend.as_deref()) {
        println!("\nPrices are currently {}", trend);
    }
}

/// Drives an indicatif bar from orchestrator progress.
#[derive(Default)]
struct BarProgress {
    pb: Option<ProgressBar>,
}

impl Progress for BarProgress {
    fn begin(&mut self, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        self.pb = Some(pb);
    }

    fn window_done(&mut self, msg: &str) {
        if let Some(pb) = &self.pb {
            pb.set_message(msg.to_string());
            pb.inc(1);
        }
    }

    fn finish(&mut self) {
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
