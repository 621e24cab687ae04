//! Report computations over an [`IssueSource`](crate::source::IssueSource).
//!
//! Each entry point fetches what it needs, folds it, and returns a
//! [`Report`]: `Ready` with the figures, or `NoData` with a message when
//! there is nothing to show. Upstream failures are `Err`.

pub mod burndown;
pub mod epic;
pub mod escape;
pub mod flow;
pub mod issues;
pub mod milestone;
pub mod status;
pub mod tat;
pub mod triage;
pub mod types;

pub use burndown::burndown;
pub use epic::{collect_epic_issues, epic_report};
pub use escape::{compute_escape_metrics, compute_monthly_trend};
pub use flow::lead_cycle_time;
pub use issues::{issue_analytics, user_activity};
pub use milestone::{list_milestones, milestone_detail};
pub use status::compute_time_in_status;
pub use tat::compute_tat_trend;
pub use triage::{compute_triage_lag, TriageLagOptions};
pub use types::*;
