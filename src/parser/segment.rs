use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, ScrapeError};

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2}:\d{2}(?:AM|PM)\+?\d?").unwrap());

const SORT_BY: &str = "Sort by:";

/// How a strategy recognises its line.
#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    Exact(&'static str),
    StartsWith(&'static str),
    EndsWith(&'static str),
    Contains(&'static str),
}

impl Matcher {
    pub fn matches(&self, line: &str) -> bool {
        match *self {
            Matcher::Exact(s) => line == s,
            Matcher::StartsWith(s) => line.starts_with(s),
            Matcher::EndsWith(s) => line.ends_with(s),
            Matcher::Contains(s) => line.contains(s),
        }
    }
}

/// Where a strategy begins its scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Top,
    Start,
    ReturnStart,
}

#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    pub name: &'static str,
    pub matcher: Matcher,
    pub origin: Origin,
    /// Added to the matched index.
    pub offset: usize,
    /// The middle "other flights" section is absent when this strategy wins.
    pub skip_mid: bool,
}

const fn strategy(name: &'static str, matcher: Matcher, origin: Origin, offset: usize, skip_mid: bool) -> Strategy {
    Strategy {
        name,
        matcher,
        origin,
        offset,
        skip_mid,
    }
}

/// A named boundary and the ordered strategies that may locate it.
#[derive(Debug, Clone, Copy)]
pub struct Boundary {
    pub name: &'static str,
    pub strategies: &'static [Strategy],
}

pub const START: Boundary = Boundary {
    name: "start",
    strategies: &[strategy("sort_by", Matcher::Exact(SORT_BY), Origin::Top, 1, false)],
};

pub const MID_START: Boundary = Boundary {
    name: "mid_start",
    strategies: &[
        strategy("price_insights", Matcher::Exact("Price insights"), Origin::Top, 0, false),
        strategy("other_flights", Matcher::Exact("Other flights"), Origin::Top, 0, false),
        strategy("more_flights", Matcher::EndsWith("more flights"), Origin::Start, 0, true),
        strategy("language", Matcher::StartsWith("Language"), Origin::ReturnStart, 0, true),
    ],
};

pub const MID_END: Boundary = Boundary {
    name: "mid_end",
    strategies: &[
        strategy("other_departing_flights", Matcher::Exact("Other departing flights"), Origin::Top, 1, false),
        strategy("other_flights", Matcher::Exact("Other flights"), Origin::Top, 1, false),
    ],
};

pub const END: Boundary = Boundary {
    name: "end",
    strategies: &[
        strategy("more_flights", Matcher::EndsWith("more flights"), Origin::Top, 0, false),
        strategy("hide", Matcher::Contains("Hide"), Origin::Top, 0, false),
    ],
};

/// Outcome of running one boundary cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    Found {
        index: usize,
        strategy: &'static str,
        skip_mid: bool,
    },
    Exhausted {
        attempts: Vec<&'static str>,
    },
}

/// Scan origins resolved for one page.
#[derive(Debug, Clone, Copy, Default)]
pub struct Origins {
    pub start: usize,
    pub return_start: Option<usize>,
}

impl Origins {
    fn resolve(&self, origin: Origin) -> usize {
        match origin {
            Origin::Top => 0,
            Origin::Start => self.start,
            Origin::ReturnStart => self.return_start.unwrap_or(self.start),
        }
    }
}

/// Try each strategy of `boundary` in order; the first hit wins.
pub fn locate(lines: &[String], boundary: &Boundary, origins: &Origins) -> Located {
    let mut attempts = Vec::with_capacity(boundary.strategies.len());
    for s in boundary.strategies {
        let from = origins.resolve(s.origin).min(lines.len());
        if let Some(pos) = lines[from..].iter().position(|l| s.matcher.matches(l)) {
            return Located::Found {
                index: from + pos + s.offset,
                strategy: s.name,
                skip_mid: s.skip_mid,
            };
        }
        attempts.push(s.name);
    }
    Located::Exhausted { attempts }
}

fn require(lines: &[String], boundary: &Boundary, origins: &Origins) -> Result<(usize, bool)> {
    match locate(lines, boundary, origins) {
        Located::Found { index, strategy, skip_mid } => {
            tracing::trace!(boundary = boundary.name, strategy, index, "boundary located");
            Ok((index, skip_mid))
        }
        Located::Exhausted { attempts } => Err(ScrapeError::BoundaryNotFound {
            boundary: boundary.name,
            attempts,
            dump: lines.to_vec(),
        }),
    }
}

/// Lines of one itinerary candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightSegment {
    pub lines: Vec<String>,
}

/// Bounds of the section that holds the outbound flight list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub mid_start: usize,
    /// `(mid_end, end)` when the "other flights" section is present.
    pub tail: Option<(usize, usize)>,
}

/// Run the boundary cascades for the outbound leg.
pub fn locate_span(lines: &[String], is_round_trip: bool) -> Result<Span> {
    let (start, _) = require(lines, &START, &Origins::default())?;

    let return_start = if is_round_trip {
        lines
            .iter()
            .skip(start)
            .position(|l| l == SORT_BY)
            .map(|p| start + p + 1)
    } else {
        None
    };
    let origins = Origins { start, return_start };

    let (mid_start, skip_mid) = require(lines, &MID_START, &origins)?;
    if skip_mid {
        return Ok(Span {
            start,
            mid_start,
            tail: None,
        });
    }

    let (mid_end, _) = require(lines, &MID_END, &origins)?;
    let (end, _) = require(lines, &END, &origins)?;
    Ok(Span {
        start,
        mid_start,
        tail: Some((mid_end, end)),
    })
}

/// `lines[from..to]`, empty when the range is reversed or out of bounds.
fn slice(lines: &[String], from: usize, to: usize) -> &[String] {
    let to = to.min(lines.len());
    if from >= to {
        &[]
    } else {
        &lines[from..to]
    }
}

impl Span {
    pub fn collect<'a>(&self, lines: &'a [String]) -> Vec<&'a str> {
        let mut out: Vec<&str> = slice(lines, self.start, self.mid_start)
            .iter()
            .map(String::as_str)
            .collect();
        if let Some((mid_end, end)) = self.tail {
            out.extend(slice(lines, mid_end, end).iter().map(String::as_str));
        }
        out
    }
}

/// A departure or arrival time line (or a line ending in a `+N` day offset).
pub fn is_entry_marker(line: &str) -> bool {
    if line.chars().count() <= 2 {
        return false;
    }
    line.chars().rev().nth(1) == Some('+') || TIME_RE.is_match(line)
}

/// Marker indices that open a new itinerary: every second match, from the first.
pub fn entry_markers(span: &[&str]) -> Vec<usize> {
    span.iter()
        .enumerate()
        .filter(|(_, l)| is_entry_marker(l))
        .map(|(i, _)| i)
        .step_by(2)
        .collect()
}

/// Split a normalized result page into one segment per outbound itinerary.
///
/// The last kept marker has no closing marker and is dropped.
pub fn segment(lines: &[String], is_round_trip: bool) -> Result<Vec<FlightSegment>> {
    let span = locate_span(lines, is_round_trip)?;
    let relevant = span.collect(lines);
    let markers = entry_markers(&relevant);

    Ok(markers
        .windows(2)
        .map(|w| FlightSegment {
            lines: relevant[w[0]..w[1]].iter().map(|s| s.to_string()).collect(),
        })
        .collect())
}

// ── Tests ──
