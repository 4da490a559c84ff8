use chrono::{Days, NaiveDate};

use crate::error::{Result, ScrapeError};

/// How a route expands into concrete query dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripMode {
    /// `range_len` consecutive days starting tomorrow.
    SimpleForward { range_len: u32 },
    /// Anchor date +/- `flex` days, one-way.
    FlexibleOneWay { anchor: NaiveDate, flex: i64 },
    /// Every leave/return pair within `flex` days of both anchors.
    FlexibleRoundTrip {
        leave: NaiveDate,
        ret: NaiveDate,
        flex: i64,
    },
}

impl TripMode {
    pub fn kind(&self) -> &'static str {
        match self {
            TripMode::SimpleForward { .. } => "simple_forward",
            TripMode::FlexibleOneWay { .. } => "flexible_one_way",
            TripMode::FlexibleRoundTrip { .. } => "flexible_round_trip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub origin: String,
    pub destination: String,
    pub mode: TripMode,
}

/// One (leave, return?) pair to query. `ret` is always after `leave`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    leave: NaiveDate,
    ret: Option<NaiveDate>,
}

impl DateWindow {
    pub fn one_way(leave: NaiveDate) -> Self {
        DateWindow { leave, ret: None }
    }

    pub fn round_trip(leave: NaiveDate, ret: NaiveDate) -> Option<Self> {
        (ret > leave).then_some(DateWindow {
            leave,
            ret: Some(ret),
        })
    }

    pub fn leave(&self) -> NaiveDate {
        self.leave
    }

    pub fn ret(&self) -> Option<NaiveDate> {
        self.ret
    }

    pub fn is_round_trip(&self) -> bool {
        self.ret.is_some()
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.ret {
            Some(r) => write!(f, "{} - {}", self.leave, r),
            None => write!(f, "{}", self.leave),
        }
    }
}

/// Most windows a single route may expand to; each one is a page fetch.
pub const MAX_WINDOWS: u64 = 10_000;

/// Expand a route into its ordered query windows.
///
/// `today` is passed in so the forward mode stays deterministic.
pub fn plan(route: &RouteSpec, today: NaiveDate) -> Result<Vec<DateWindow>> {
    match route.mode {
        TripMode::SimpleForward { range_len } => {
            check_count(route, u64::from(range_len))?;
            (1..=i64::from(range_len))
                .map(|i| shift(route, today, i).map(DateWindow::one_way))
                .collect()
        }

        TripMode::FlexibleOneWay { anchor, flex } => {
            check_flex(route, flex)?;
            check_count(route, span(flex))?;
            Ok(around(route, anchor, flex)?.into_iter().map(DateWindow::one_way).collect())
        }

        TripMode::FlexibleRoundTrip { leave, ret, flex } => {
            check_flex(route, flex)?;
            if ret <= leave {
                return Err(invalid(route, format!("return date {} must be after leave date {}", ret, leave)));
            }
            check_count(route, span(flex).saturating_mul(span(flex)))?;
            let returns = around(route, ret, flex)?;
            Ok(around(route, leave, flex)?
                .into_iter()
                .flat_map(|l| returns.iter().filter_map(move |&r| DateWindow::round_trip(l, r)))
                .collect())
        }
    }
}

/// Reject routes that mix expansion modes in a single run.
pub fn check_routes(routes: &[RouteSpec]) -> Result<()> {
    let Some(first) = routes.first() else {
        return Ok(());
    };
    let kind = first.mode.kind();
    if let Some(other) = routes.iter().find(|r| r.mode.kind() != kind) {
        return Err(ScrapeError::Configuration(format!(
            "mixed route modes: {} -> {} is {}, expected {}",
            other.origin,
            other.destination,
            other.mode.kind(),
            kind
        )));
    }
    Ok(())
}

fn invalid(route: &RouteSpec, msg: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Configuration(format!("{} -> {}: {}", route.origin, route.destination, msg))
}

fn check_flex(route: &RouteSpec, flex: i64) -> Result<()> {
    if flex < 0 {
        return Err(invalid(route, format!("flexible days must be >= 0, got {}", flex)));
    }
    Ok(())
}

fn check_count(route: &RouteSpec, count: u64) -> Result<()> {
    if count > MAX_WINDOWS {
        return Err(invalid(route, format!("expands to {} windows, limit is {}", count, MAX_WINDOWS)));
    }
    Ok(())
}

/// Number of dates in `anchor - flex ..= anchor + flex`.
fn span(flex: i64) -> u64 {
    flex.unsigned_abs().saturating_mul(2).saturating_add(1)
}

fn shift(route: &RouteSpec, date: NaiveDate, by: i64) -> Result<NaiveDate> {
    let days = Days::new(by.unsigned_abs());
    let shifted = if by < 0 {
        date.checked_sub_days(days)
    } else {
        date.checked_add_days(days)
    };
    shifted.ok_or_else(|| invalid(route, format!("{} {:+} days is out of the supported date range", date, by)))
}

/// `anchor - flex ..= anchor + flex`, ascending.
fn around(route: &RouteSpec, anchor: NaiveDate, flex: i64) -> Result<Vec<NaiveDate>> {
    (-flex..=flex).map(|d| shift(route, anchor, d)).collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn route(mode: TripMode) -> RouteSpec {
        RouteSpec {
            origin: "JFK".into(),
            destination: "LAX".into(),
            mode,
        }
    }

    #[test]
    fn simple_forward_starts_tomorrow() {
        let windows = plan(&route(TripMode::SimpleForward { range_len: 3 }), date("2024-02-28")).unwrap();
        let leaves: Vec<_> = windows.iter().map(|w| w.leave()).collect();
        assert_eq!(leaves, vec![date("2024-02-29"), date("2024-03-01"), date("2024-03-02")]);
        assert!(windows.iter().all(|w| w.ret().is_none()));
    }

    #[test]
    fn simple_forward_zero_range_is_empty() {
        let windows = plan(&route(TripMode::SimpleForward { range_len: 0 }), date("2024-01-01")).unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn one_way_is_symmetric_around_anchor() {
        let anchor = date("2024-03-15");
        let windows = plan(&route(TripMode::FlexibleOneWay { anchor, flex: 3 }), date("2024-01-01")).unwrap();
        assert_eq!(windows.len(), 7);
        assert_eq!(windows[3].leave(), anchor);
        assert_eq!(windows[0].leave(), date("2024-03-12"));
        assert_eq!(windows[6].leave(), date("2024-03-18"));
        assert!(windows.windows(2).all(|p| p[0].leave() < p[1].leave()));
    }

    #[test]
    fn one_way_zero_flex_is_anchor_only() {
        let anchor = date("2024-03-15");
        let windows = plan(&route(TripMode::FlexibleOneWay { anchor, flex: 0 }), date("2024-01-01")).unwrap();
        assert_eq!(windows, vec![DateWindow::one_way(anchor)]);
    }

    #[test]
    fn negative_flex_is_rejected() {
        let err = plan(
            &route(TripMode::FlexibleOneWay { anchor: date("2024-03-15"), flex: -1 }),
            date("2024-01-01"),
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn round_trip_full_cross_product() {
        let windows = plan(
            &route(TripMode::FlexibleRoundTrip {
                leave: date("2024-01-10"),
                ret: date("2024-01-20"),
                flex: 1,
            }),
            date("2024-01-01"),
        )
        .unwrap();
        assert_eq!(windows.len(), 9);
        assert!(windows.iter().all(|w| w.ret().unwrap() > w.leave()));
        assert_eq!(windows[0].leave(), date("2024-01-09"));
        assert_eq!(windows[0].ret(), Some(date("2024-01-19")));
        assert_eq!(windows[8].leave(), date("2024-01-11"));
        assert_eq!(windows[8].ret(), Some(date("2024-01-21")));

        let mut deduped = windows.clone();
        deduped.dedup();
        assert_eq!(deduped.len(), windows.len());
    }

    #[test]
    fn round_trip_drops_return_on_or_before_leave() {
        // leave 10..=14, return 11..=15: unfiltered 25 pairs
        let windows = plan(
            &route(TripMode::FlexibleRoundTrip {
                leave: date("2024-01-12"),
                ret: date("2024-01-13"),
                flex: 2,
            }),
            date("2024-01-01"),
        )
        .unwrap();

        let mut expected = Vec::new();
        for l in 10..=14 {
            for r in 11..=15 {
                if r > l {
                    expected.push((l, r));
                }
            }
        }
        let got: Vec<_> = windows
            .iter()
            .map(|w| {
                use chrono::Datelike;
                (w.leave().day(), w.ret().unwrap().day())
            })
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn round_trip_return_not_after_leave_is_rejected() {
        let err = plan(
            &route(TripMode::FlexibleRoundTrip {
                leave: date("2024-01-10"),
                ret: date("2024-01-10"),
                flex: 1,
            }),
            date("2024-01-01"),
        )
        .unwrap_err();
        assert!(matches!(err, ScrapeError::Configuration(_)));
    }

    #[test]
    fn oversized_ranges_are_configuration_errors() {
        let huge_flex = route(TripMode::FlexibleOneWay { anchor: date("2024-03-15"), flex: 200_000_000 });
        let huge_range = route(TripMode::SimpleForward { range_len: u32::MAX });
        let huge_round_trip = route(TripMode::FlexibleRoundTrip {
            leave: date("2024-03-15"),
            ret: date("2024-03-20"),
            flex: i64::MAX,
        });
        for r in [huge_flex, huge_range, huge_round_trip] {
            let err = plan(&r, date("2024-01-01")).unwrap_err();
            assert!(matches!(err, ScrapeError::Configuration(_)), "{:?}", err);
        }
    }

    #[test]
    fn dates_past_the_calendar_are_configuration_errors() {
        let r = route(TripMode::FlexibleOneWay { anchor: NaiveDate::MAX, flex: 1 });
        assert!(matches!(plan(&r, date("2024-01-01")), Err(ScrapeError::Configuration(_))));

        let r = route(TripMode::SimpleForward { range_len: 2 });
        assert!(matches!(plan(&r, NaiveDate::MAX), Err(ScrapeError::Configuration(_))));
    }

    #[test]
    fn window_limit_is_inclusive() {
        let r = route(TripMode::SimpleForward { range_len: MAX_WINDOWS as u32 });
        assert_eq!(plan(&r, date("2024-01-01")).unwrap().len(), MAX_WINDOWS as usize);
    }

    #[test]
    fn window_rejects_return_before_leave() {
        assert!(DateWindow::round_trip(date("2024-01-10"), date("2024-01-10")).is_none());
        assert!(DateWindow::round_trip(date("2024-01-10"), date("2024-01-11")).is_some());
    }

    #[test]
    fn mixed_modes_are_rejected() {
        let routes = vec![
            route(TripMode::SimpleForward { range_len: 2 }),
            route(TripMode::FlexibleOneWay { anchor: date("2024-03-15"), flex: 1 }),
        ];
        assert!(check_routes(&routes).is_err());
        assert!(check_routes(&routes[..1]).is_ok());
        assert!(check_routes(&[]).is_ok());
    }
}
