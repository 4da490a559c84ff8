use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::error::{Result, ScrapeError};
use crate::fetcher::{self, FetchRequest, PageFetcher};
use crate::parser::{self, record::RecordBuilder};
use crate::planner::{self, RouteSpec};

/// Progress sink for long runs; the CLI draws a bar, tests record calls.
pub trait Progress {
    /// Called once with the number of planned windows.
    fn begin(&mut self, _total: usize) {}

    /// One window finished, successfully or not. `msg` is a status line.
    fn window_done(&mut self, _msg: &str) {}

    fn finish(&mut self) {}
}

/// A no-op progress sink.
pub struct NullProgress;
impl Progress for NullProgress {}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeRunStats {
    pub planned: usize,
    pub completed: usize,
    pub errored: usize,
    pub records: usize,
    total_time: Duration,
}

impl ScrapeRunStats {
    fn record_completed(&mut self, elapsed: Duration, records: usize) {
        self.completed += 1;
        self.records += records;
        self.total_time += elapsed;
    }

    /// Mean fetch+parse time of completed windows, in seconds.
    pub fn mean_secs(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.total_time.as_secs_f64() / self.completed as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub country: String,
    pub currency: String,
    /// Forward-mode routes start the day after this.
    pub today: NaiveDate,
    pub dump_dir: Option<PathBuf>,
}

/// Plans every route, then scrapes its windows one at a time.
pub struct Orchestrator<F, B> {
    fetcher: F,
    builder: B,
    options: RunOptions,
}

impl<F: PageFetcher, B: RecordBuilder> Orchestrator<F, B> {
    pub fn new(fetcher: F, builder: B, options: RunOptions) -> Self {
        Orchestrator {
            fetcher,
            builder,
            options,
        }
    }

    /// Scrape every planned window.
    ///
    /// Only configuration errors are returned, and always before the first
    /// fetch. Per-window failures are logged, counted, and skipped.
    pub fn run(
        &mut self,
        routes: &[RouteSpec],
        progress: &mut dyn Progress,
    ) -> Result<(Vec<B::Record>, ScrapeRunStats)> {
        planner::check_routes(routes)?;
        let planned = routes
            .iter()
            .map(|r| planner::plan(r, self.options.today).map(|w| (r, w)))
            .collect::<Result<Vec<_>>>()?;

        let total: usize = planned.iter().map(|(_, w)| w.len()).sum();
        let mut stats = ScrapeRunStats {
            planned: total,
            ..Default::default()
        };
        let mut records = Vec::new();
        info!(routes = routes.len(), windows = total, "starting scrape");
        progress.begin(total);

        let mut n = 0;
        for (route, windows) in &planned {
            for window in windows {
                n += 1;
                let req = FetchRequest {
                    origin: &route.origin,
                    destination: &route.destination,
                    window: *window,
                    country: &self.options.country,
                    currency: &self.options.currency,
                };

                let t0 = Instant::now();
                let result = self.fetcher.fetch(&req).and_then(|lines| {
                    parser::process_page(&lines, req.origin, req.destination, &req.window, &self.builder)
                });
                let msg = match result {
                    Ok(found) => {
                        let elapsed = t0.elapsed();
                        stats.record_completed(elapsed, found.len());
                        let msg = format!(
                            "[{}/{}] [{:.2} sec - avg: {:.2}] Scraped: {} {} {} - {} results",
                            n,
                            total,
                            elapsed.as_secs_f64(),
                            stats.mean_secs(),
                            req.origin,
                            req.destination,
                            req.window,
                            found.len()
                        );
                        info!("{}", msg);
                        records.extend(found);
                        msg
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        stats.errored += 1;
                        self.report_failure(&req, &e);
                        format!(
                            "[{}/{}] ERROR: {} {} {}",
                            n, total, req.origin, req.destination, req.window
                        )
                    }
                };
                progress.window_done(&msg);
            }
        }

        progress.finish();
        info!(
            planned = stats.planned,
            completed = stats.completed,
            errored = stats.errored,
            records = stats.records,
            "scrape finished"
        );
        Ok((records, stats))
    }

    fn report_failure(&self, req: &FetchRequest<'_>, e: &ScrapeError) {
        let (origin, destination, window) = (req.origin, req.destination, req.window);
        match e {
            ScrapeError::FetchTimeout { .. } => {
                warn!(origin, destination, %window, error = %e, "no results for window");
            }
            ScrapeError::BoundaryNotFound { dump, .. } => {
                error!(origin, destination, %window, error = %e, dump = %dump.join(" | "), "segmentation failed");
                self.save_dump(req, dump);
            }
            _ => error!(origin, destination, %window, error = %e, "window failed"),
        }
    }

    fn save_dump(&self, req: &FetchRequest<'_>, dump: &[String]) {
        let Some(dir) = &self.options.dump_dir else {
            return;
        };
        match fetcher::write_dump(dir, req, dump) {
            Ok(path) => info!(path = %path.display(), "saved line dump"),
            Err(e) => warn!(error = %e, "could not save line dump"),
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::parser::record::SegmentContext;
    use crate::parser::segment::FlightSegment;
    use crate::planner::TripMode;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn good_page() -> Vec<String> {
        lines(&["Sort by:", "7:00AM", "9:00AM", "Delta", "8:00AM", "10:00AM", "United", "1:00PM", "3:00PM", "5 more flights"])
    }

    /// Serves pages by leave date; unknown dates time out.
    #[derive(Default)]
    struct ScriptedFetcher {
        pages: HashMap<NaiveDate, Vec<String>>,
        calls: usize,
    }

    impl PageFetcher for ScriptedFetcher {
        fn fetch(&mut self, req: &FetchRequest<'_>) -> Result<Vec<String>> {
            self.calls += 1;
            self.pages
                .get(&req.window.leave())
                .cloned()
                .ok_or_else(|| ScrapeError::FetchTimeout { url: req.url() })
        }
    }

    /// Yields the segment's first line; rejects segments containing "bad".
    struct FirstLine;

    impl RecordBuilder for FirstLine {
        type Record = (String, NaiveDate);

        fn build(&self, ctx: &SegmentContext<'_>, segment: &FlightSegment) -> Result<Self::Record> {
            if segment.lines.iter().any(|l| l == "bad") {
                return Err(ScrapeError::RecordBuild("bad line".into()));
            }
            Ok((segment.lines[0].clone(), ctx.leave))
        }
    }

    #[derive(Default)]
    struct Recorder {
        total: Option<usize>,
        messages: Vec<String>,
        finished: bool,
    }

    impl Progress for Recorder {
        fn begin(&mut self, total: usize) {
            self.total = Some(total);
        }
        fn window_done(&mut self, msg: &str) {
            self.messages.push(msg.to_string());
        }
        fn finish(&mut self) {
            self.finished = true;
        }
    }

    fn options(dump_dir: Option<PathBuf>) -> RunOptions {
        RunOptions {
            country: "US".into(),
            currency: "USD".into(),
            today: date("2024-01-01"),
            dump_dir,
        }
    }

    fn one_way(anchor: &str, flex: i64) -> RouteSpec {
        RouteSpec {
            origin: "JFK".into(),
            destination: "MIA".into(),
            mode: TripMode::FlexibleOneWay { anchor: date(anchor), flex },
        }
    }

    #[test]
    fn boundary_failures_are_isolated() {
        // 5 windows: 2024-03-13..=17; two of them lack "Sort by:"
        let broken: HashSet<_> = [date("2024-03-14"), date("2024-03-17")].into();
        let mut fetcher = ScriptedFetcher::default();
        for d in 13..=17 {
            let day = NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
            let page = if broken.contains(&day) { lines(&["nothing useful"]) } else { good_page() };
            fetcher.pages.insert(day, page);
        }

        let mut orch = Orchestrator::new(fetcher, FirstLine, options(None));
        let mut progress = Recorder::default();
        let (records, stats) = orch.run(&[one_way("2024-03-15", 2)], &mut progress).unwrap();

        assert_eq!(stats.planned, 5);
        assert_eq!(stats.errored, 2);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.records, 6);
        assert_eq!(records.len(), 6);
        assert_eq!(records[0], ("7:00AM".to_string(), date("2024-03-13")));
        assert_eq!(orch.fetcher.calls, 5);

        assert_eq!(progress.total, Some(5));
        assert_eq!(progress.messages.len(), 5);
        assert!(progress.messages[0].starts_with("[1/5] ["));
        assert!(progress.messages[1].starts_with("[2/5] ERROR"));
        assert!(progress.finished);
    }

    #[test]
    fn timeouts_and_rejections_are_counted() {
        let mut fetcher = ScriptedFetcher::default();
        fetcher.pages.insert(date("2024-03-15"), good_page());
        let mut rejected = good_page();
        rejected.insert(3, "bad".into());
        fetcher.pages.insert(date("2024-03-16"), rejected);
        // 2024-03-14 has no page: timeout

        let mut orch = Orchestrator::new(fetcher, FirstLine, options(None));
        let (records, stats) = orch.run(&[one_way("2024-03-15", 1)], &mut NullProgress).unwrap();

        assert_eq!(stats.completed, 1);
        assert_eq!(stats.errored, 2);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|(_, d)| *d == date("2024-03-15")));
    }

    #[test]
    fn configuration_error_prevents_fetching() {
        let bad = RouteSpec {
            origin: "JFK".into(),
            destination: "MIA".into(),
            mode: TripMode::FlexibleRoundTrip {
                leave: date("2024-03-15"),
                ret: date("2024-03-15"),
                flex: 1,
            },
        };
        let good = RouteSpec {
            mode: TripMode::FlexibleRoundTrip {
                leave: date("2024-03-15"),
                ret: date("2024-03-20"),
                flex: 1,
            },
            ..bad.clone()
        };

        let mut orch = Orchestrator::new(ScriptedFetcher::default(), FirstLine, options(None));
        let err = orch.run(&[good, bad], &mut NullProgress).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(orch.fetcher.calls, 0);
    }

    #[test]
    fn mixed_modes_prevent_fetching() {
        let forward = RouteSpec {
            origin: "EWR".into(),
            destination: "SFO".into(),
            mode: TripMode::SimpleForward { range_len: 3 },
        };
        let mut orch = Orchestrator::new(ScriptedFetcher::default(), FirstLine, options(None));
        assert!(orch.run(&[one_way("2024-03-15", 1), forward], &mut NullProgress).is_err());
        assert_eq!(orch.fetcher.calls, 0);
    }

    #[test]
    fn failed_pages_are_dumped() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = ScriptedFetcher::default();
        fetcher.pages.insert(date("2024-03-15"), lines(&["no", "boundaries"]));

        let mut orch = Orchestrator::new(fetcher, FirstLine, options(Some(dir.path().to_path_buf())));
        let (_, stats) = orch.run(&[one_way("2024-03-15", 0)], &mut NullProgress).unwrap();
        assert_eq!(stats.errored, 1);

        let saved = std::fs::read_to_string(dir.path().join("JFK-MIA-2024-03-15.txt")).unwrap();
        assert_eq!(saved, "no\nboundaries");
    }

    #[test]
    fn mean_of_nothing_is_zero() {
        assert_eq!(ScrapeRunStats::default().mean_secs(), 0.0);
    }
}
