use crate::date_util::{round2, DAY_SECONDS};
use crate::error::Result;
use crate::metrics::types::{FlowMetrics, Report};
use crate::model::{Scope, StageMedian};
use crate::query::window::DateWindow;
use crate::source::IssueSource;

fn median_days(stages: &[StageMedian], name: &str) -> Option<f64> {
    stages
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(name))
        .and_then(|s| s.median_seconds)
        .map(|secs| round2(secs / DAY_SECONDS))
}

/// Pick lead and cycle time out of value-stream stage medians.
pub fn flow_from_stages(stages: &[StageMedian]) -> FlowMetrics {
    FlowMetrics {
        lead_time_days: median_days(stages, "lead time"),
        cycle_time_days: median_days(stages, "cycle time"),
    }
}

/// Median lead and cycle time of the scope's first value stream.
pub async fn lead_cycle_time<S: IssueSource + ?Sized>(
    source: &S,
    scope: &Scope,
    window: &DateWindow,
) -> Result<Report<FlowMetrics>> {
    match source.value_stream_stages(scope, window).await? {
        None => Ok(Report::no_data("No value streams found for this scope.")),
        Some(stages) => Ok(Report::Ready(flow_from_stages(&stages))),
    }
}
