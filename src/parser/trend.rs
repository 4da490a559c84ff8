const TREND_PREFIX: &str = "Prices are currently";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendCategory {
    Typical,
    High,
    Low,
    Unknown,
}

impl TrendCategory {
    /// Column value in the store; `Unknown` is stored as NULL.
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            TrendCategory::Typical => Some("typical"),
            TrendCategory::High => Some("high"),
            TrendCategory::Low => Some("low"),
            TrendCategory::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTrend {
    pub category: TrendCategory,
    /// Digits of the "cheaper" banner; only set for `Low`.
    pub magnitude: Option<String>,
}

impl PriceTrend {
    pub fn unknown() -> Self {
        PriceTrend {
            category: TrendCategory::Unknown,
            magnitude: None,
        }
    }

    fn of(category: TrendCategory) -> Self {
        PriceTrend {
            category,
            magnitude: None,
        }
    }
}

/// Lines of a result page that carry the price-trend banner.
pub fn trend_candidates(lines: &[String]) -> Vec<&str> {
    lines
        .iter()
        .map(String::as_str)
        .filter(|l| l.starts_with(TREND_PREFIX))
        .collect()
}

/// Classify the first candidate; the rest are ignored.
pub fn parse_trend<S: AsRef<str>>(candidates: &[S]) -> PriceTrend {
    let Some(first) = candidates.first() else {
        return PriceTrend::unknown();
    };
    let s = first.as_ref();

    match s {
        "Prices are currently typical" => PriceTrend::of(TrendCategory::Typical),
        "Prices are currently high" => PriceTrend::of(TrendCategory::High),
        _ if s.contains("cheaper") => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
            PriceTrend {
                category: TrendCategory::Low,
                magnitude: Some(if digits.is_empty() { "0".to_string() } else { digits }),
            }
        }
        _ => PriceTrend::unknown(),
    }
}
