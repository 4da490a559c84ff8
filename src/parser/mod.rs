pub mod record;
pub mod segment;
pub mod trend;

use crate::error::Result;
use crate::planner::DateWindow;
use record::{RecordBuilder, SegmentContext};

/// Page pipeline: lines → price trend + segments → records.
pub fn process_page<B: RecordBuilder>(
    lines: &[String],
    origin: &str,
    destination: &str,
    window: &DateWindow,
    builder: &B,
) -> Result<Vec<B::Record>> {
    let trend = trend::parse_trend(&trend::trend_candidates(lines));
    let segments = segment::segment(lines, window.is_round_trip())?;

    let ctx = SegmentContext {
        origin,
        destination,
        leave: window.leave(),
        is_round_trip: window.is_round_trip(),
        trend: &trend,
    };
    segments.iter().map(|s| builder.build(&ctx, s)).collect()
}
