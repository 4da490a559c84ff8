use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;

use super::segment::FlightSegment;
use super::trend::PriceTrend;
use crate::error::{Result, ScrapeError};

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}):(\d{2})\s?(AM|PM)(?:\+(\d))?").unwrap());
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:(\d+) hrs?)?(?: ?(\d+) min)?$").unwrap());
static LAYOVER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:(\d+) hrs?)?(?: ?(\d+) min)? ([A-Z]{3})$").unwrap());
static STOPS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+) stops?$").unwrap());
static AIRPORT_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}(?:, [A-Z]{3})+$").unwrap());
static CODE_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]{3}-[A-Z]{3}$").unwrap());
static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\d\s]{1,3}) ?(\d[\d,]*)$").unwrap());

/// What the builder knows about the window a segment came from.
#[derive(Debug, Clone)]
pub struct SegmentContext<'a> {
    pub origin: &'a str,
    pub destination: &'a str,
    pub leave: NaiveDate,
    pub is_round_trip: bool,
    pub trend: &'a PriceTrend,
}

/// Turns one flight segment into a record. May reject the segment.
pub trait RecordBuilder {
    type Record;

    fn build(&self, ctx: &SegmentContext<'_>, segment: &FlightSegment) -> Result<Self::Record>;
}

/// One row of the `scraped` table.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightRecord {
    pub depart_departure: NaiveDateTime,
    pub depart_departure_day: String,
    pub depart_arrival: NaiveDateTime,
    pub depart_arrival_day: String,
    pub return_departure: Option<NaiveDateTime>,
    pub return_departure_day: Option<String>,
    pub return_arrival: Option<NaiveDateTime>,
    pub return_arrival_day: Option<String>,
    pub airlines: Vec<String>,
    /// Minutes.
    pub travel_time: i64,
    pub origin: String,
    pub destination: String,
    pub layover_n: u32,
    /// Minutes; only known for single-stop itineraries.
    pub layover_time: Option<i64>,
    pub layover_location: Vec<String>,
    pub price: Option<i64>,
    pub price_currency: Option<String>,
    pub price_trend: Option<String>,
    pub price_value: Option<String>,
    pub access_date: DateTime<Utc>,
    pub one_way: bool,
    pub has_train: bool,
    pub days_advance: i64,
}

/// Builds [`FlightRecord`]s from the flattened results list.
pub struct FlightRecordBuilder {
    access_date: DateTime<Utc>,
}

impl FlightRecordBuilder {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(access_date: DateTime<Utc>) -> Self {
        FlightRecordBuilder { access_date }
    }
}

impl Default for FlightRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordBuilder for FlightRecordBuilder {
    type Record = FlightRecord;

    fn build(&self, ctx: &SegmentContext<'_>, segment: &FlightSegment) -> Result<FlightRecord> {
        let lines = &segment.lines;

        let times: Vec<(usize, NaiveTime, i64)> = lines
            .iter()
            .enumerate()
            .filter_map(|(i, l)| parse_time(l).map(|(t, days)| (i, t, days)))
            .take(2)
            .collect();
        let [(_, dep_time, dep_days), (arr_idx, arr_time, arr_days)] = times[..] else {
            return Err(ScrapeError::RecordBuild(format!(
                "expected departure and arrival times in {:?}",
                lines
            )));
        };

        let departure = (ctx.leave + Duration::days(dep_days)).and_time(dep_time);
        let arrival = (ctx.leave + Duration::days(arr_days)).and_time(arr_time);

        let travel_time = lines
            .iter()
            .find_map(|l| parse_duration(l))
            .ok_or_else(|| ScrapeError::RecordBuild(format!("no travel time in {:?}", lines)))?;

        let airlines = lines[arr_idx + 1..]
            .iter()
            .find(|l| is_airline_line(l))
            .map(|l| split_airlines(l))
            .unwrap_or_default();

        let (layover_n, layover_time, layover_location) = parse_layovers(lines);
        let (price, price_currency) = lines
            .iter()
            .find_map(|l| parse_price(l))
            .map(|(amount, cur)| (Some(amount), Some(cur)))
            .unwrap_or((None, None));

        Ok(FlightRecord {
            depart_departure: departure,
            depart_departure_day: departure.format("%A").to_string(),
            depart_arrival: arrival,
            depart_arrival_day: arrival.format("%A").to_string(),
            return_departure: None,
            return_departure_day: None,
            return_arrival: None,
            return_arrival_day: None,
            airlines,
            travel_time,
            origin: ctx.origin.to_string(),
            destination: ctx.destination.to_string(),
            layover_n,
            layover_time,
            layover_location,
            price,
            price_currency,
            price_trend: ctx.trend.category.as_str().map(str::to_string),
            price_value: ctx.trend.magnitude.clone(),
            access_date: self.access_date,
            one_way: !ctx.is_round_trip,
            has_train: lines.iter().any(|l| l.to_lowercase().contains("train")),
            days_advance: (ctx.leave - self.access_date.date_naive()).num_days(),
        })
    }
}

/// `"9:45PM"` → (21:45, 0); `"6:05AM+1"` → (06:05, 1).
fn parse_time(line: &str) -> Option<(NaiveTime, i64)> {
    let caps = TIME_RE.captures(line)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    if hour == 0 || hour > 12 {
        return None;
    }
    let hour = match &caps[3] {
        "AM" => hour % 12,
        _ => hour % 12 + 12,
    };
    let days = caps.get(4).and_then(|d| d.as_str().parse().ok()).unwrap_or(0);
    Some((NaiveTime::from_hms_opt(hour, minute, 0)?, days))
}

fn minutes(hours: Option<regex::Match<'_>>, mins: Option<regex::Match<'_>>) -> Option<i64> {
    if hours.is_none() && mins.is_none() {
        return None;
    }
    let h: i64 = hours.map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let m: i64 = mins.map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    Some(h * 60 + m)
}

fn parse_duration(line: &str) -> Option<i64> {
    let caps = DURATION_RE.captures(line)?;
    minutes(caps.get(1), caps.get(2))
}

fn parse_price(line: &str) -> Option<(i64, String)> {
    let caps = PRICE_RE.captures(line)?;
    let amount = caps[2].replace(',', "").parse().ok()?;
    Some((amount, caps[1].to_string()))
}

/// Layover count, single-stop duration, and stop airports.
fn parse_layovers(lines: &[String]) -> (u32, Option<i64>, Vec<String>) {
    let Some((idx, n)) = lines.iter().enumerate().find_map(|(i, l)| {
        if l == "Nonstop" {
            Some((i, 0))
        } else {
            STOPS_RE
                .captures(l)
                .and_then(|c| c[1].parse().ok())
                .map(|n| (i, n))
        }
    }) else {
        return (0, None, Vec::new());
    };
    if n == 0 {
        return (0, None, Vec::new());
    }

    let next = lines.get(idx + 1).map(String::as_str).unwrap_or("");
    if let Some(caps) = LAYOVER_RE.captures(next) {
        return (n, minutes(caps.get(1), caps.get(2)), vec![caps[3].to_string()]);
    }
    if AIRPORT_LIST_RE.is_match(next) {
        return (n, None, next.split(", ").map(str::to_string).collect());
    }
    (n, None, Vec::new())
}

fn is_airline_line(line: &str) -> bool {
    let starts_alpha = line.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    starts_alpha
        && line != "Nonstop"
        && parse_time(line).is_none()
        && parse_duration(line).is_none()
        && parse_price(line).is_none()
        && !STOPS_RE.is_match(line)
        && !LAYOVER_RE.is_match(line)
        && !CODE_PAIR_RE.is_match(line)
        && !AIRPORT_LIST_RE.is_match(line)
        && !line.contains("CO2")
        && !line.contains("emissions")
        && line != "one way"
        && line != "round trip"
}

fn split_airlines(line: &str) -> Vec<String> {
    let carriers = line.split("Operated by").next().unwrap_or(line);
    carriers
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Tests ──
