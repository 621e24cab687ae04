use chrono::NaiveDate;

use crate::date_util::round2;
use crate::error::Result;
use crate::metrics::types::{EscapeMetrics, TrendPoint};
use crate::model::Scope;
use crate::query::builder::IssueQuery;
use crate::query::window::{month_windows, DateWindow};
use crate::source::{fetch_issues_any_label, IssueSource};

impl EscapeMetrics {
    /// Derive ratios from raw counts. Zero denominators yield 0.
    pub fn from_counts(qa_count: u64, prod_count: u64, total_created: u64) -> Self {
        let net_total = total_created as i64 - qa_count as i64;
        let qa_escape_ratio = if qa_count > 0 {
            prod_count as f64 / qa_count as f64 * 100.0
        } else {
            0.0
        };
        let dev_escape_rate = if net_total > 0 {
            qa_count as f64 / net_total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            qa_count,
            prod_count,
            total_created,
            net_total,
            qa_escape_ratio,
            dev_escape_rate,
        }
    }

    /// Same figures with both ratios rounded to two decimals.
    pub fn rounded(&self) -> Self {
        Self {
            qa_escape_ratio: round2(self.qa_escape_ratio),
            dev_escape_rate: round2(self.dev_escape_rate),
            ..*self
        }
    }
}

/// Defect escape metrics for issues created in `window`.
///
/// An issue counts as a QA bug when it carries ANY of `qa_labels`, and as a
/// production bug when it carries ANY of `prod_labels`.
pub async fn compute_escape_metrics<S: IssueSource + ?Sized>(
    source: &S,
    scope: &Scope,
    window: &DateWindow,
    qa_labels: &[String],
    prod_labels: &[String],
) -> Result<EscapeMetrics> {
    let base = IssueQuery::new().created_in(window);

    let qa = fetch_issues_any_label(source, Some(scope), qa_labels, &base).await?;
    let prod = fetch_issues_any_label(source, Some(scope), prod_labels, &base).await?;
    let total = source.list_issues(Some(scope), &base).await?;

    let metrics = EscapeMetrics::from_counts(qa.len() as u64, prod.len() as u64, total.len() as u64);
    log::debug!(
        "escape {scope} {window}: qa={} prod={} total={}",
        metrics.qa_count,
        metrics.prod_count,
        metrics.total_created
    );
    Ok(metrics)
}

/// Escape metrics for each of the `months_back` full calendar months before
/// the month containing `today`, oldest first. Ratios are rounded to two
/// decimals.
pub async fn compute_monthly_trend<S: IssueSource + ?Sized>(
    source: &S,
    scope: &Scope,
    months_back: u32,
    qa_labels: &[String],
    prod_labels: &[String],
    today: NaiveDate,
) -> Result<Vec<TrendPoint>> {
    log::info!("Computing {months_back}-month escape trend for {scope}");
    let mut points = Vec::with_capacity(months_back as usize);
    for (label, window) in month_windows(today, months_back) {
        let metrics = compute_escape_metrics(source, scope, &window, qa_labels, prod_labels).await?;
        points.push(TrendPoint {
            label,
            metrics: metrics.rounded(),
        });
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixtures::*;
    use crate::source::{MemorySource, Snapshot};

    fn labels(ls: &[&str]) -> Vec<String> {
        ls.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_zero_qa_gives_zero_ratio() {
        let m = EscapeMetrics::from_counts(0, 5, 20);
        assert_eq!(m.qa_escape_ratio, 0.0);
        assert_eq!(m.net_total, 20);
        assert_eq!(m.dev_escape_rate, 0.0);
    }

    #[test]
    fn test_non_positive_net_gives_zero_dev_rate() {
        let m = EscapeMetrics::from_counts(4, 1, 4);
        assert_eq!(m.net_total, 0);
        assert_eq!(m.dev_escape_rate, 0.0);
        assert_eq!(m.qa_escape_ratio, 25.0);

        let m = EscapeMetrics::from_counts(6, 0, 2);
        assert_eq!(m.net_total, -4);
        assert_eq!(m.dev_escape_rate, 0.0);
    }

    #[test]
    fn test_ratios_unrounded() {
        let m = EscapeMetrics::from_counts(3, 1, 10);
        assert!((m.qa_escape_ratio - 100.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.rounded().qa_escape_ratio, 33.33);
        assert_eq!(m.rounded().dev_escape_rate, 42.86);
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            issues: vec![
                // QA bug carrying both QA labels: counted once.
                issue(1, "2024-02-03T10:00:00Z", &["bug::qa", "bug::regression"]),
                issue(2, "2024-02-10T10:00:00Z", &["bug::qa"]),
                issue(3, "2024-02-11T10:00:00Z", &["bug::production"]),
                issue(4, "2024-02-12T10:00:00Z", &["feature"]),
                issue(5, "2024-02-20T10:00:00Z", &[]),
                // Outside February.
                issue(6, "2024-03-01T00:00:00Z", &["bug::qa"]),
                issue(7, "2024-01-31T23:59:59Z", &["bug::production"]),
            ],
            ..Snapshot::default()
        }
    }

    #[tokio::test]
    async fn test_escape_metrics_window_and_dedup() {
        let source = MemorySource::new(snapshot());
        let window = DateWindow::days(date("2024-02-01"), date("2024-02-29"));
        let m = compute_escape_metrics(
            &source,
            &Scope::group("g"),
            &window,
            &labels(&["bug::qa", "bug::regression"]),
            &labels(&["bug::production"]),
        )
        .await
        .unwrap();

        assert_eq!(m.qa_count, 2);
        assert_eq!(m.prod_count, 1);
        assert_eq!(m.total_created, 5);
        assert_eq!(m.net_total, 3);
        assert_eq!(m.qa_escape_ratio, 50.0);
        assert!((m.dev_escape_rate - 200.0 / 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_escape_metrics_idempotent() {
        let source = MemorySource::new(snapshot());
        let window = DateWindow::days(date("2024-01-01"), date("2024-03-31"));
        let qa = labels(&["bug::qa"]);
        let prod = labels(&["bug::production"]);
        let scope = Scope::group("g");
        let a = compute_escape_metrics(&source, &scope, &window, &qa, &prod).await.unwrap();
        let b = compute_escape_metrics(&source, &scope, &window, &qa, &prod).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_monthly_trend_shape() {
        let source = MemorySource::new(snapshot());
        let points = compute_monthly_trend(
            &source,
            &Scope::group("g"),
            3,
            &labels(&["bug::qa"]),
            &labels(&["bug::production"]),
            date("2024-04-17"),
        )
        .await
        .unwrap();

        let months: Vec<&str> = points.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(months, vec!["2024-01", "2024-02", "2024-03"]);
        assert_eq!(points[0].metrics.prod_count, 1);
        assert_eq!(points[0].metrics.qa_count, 0);
        assert_eq!(points[1].metrics.qa_count, 2);
        assert_eq!(points[1].metrics.dev_escape_rate, 66.67);
        assert_eq!(points[2].metrics.total_created, 1);
    }

    #[tokio::test]
    async fn test_monthly_trend_zero_months() {
        let source = MemorySource::default();
        let points = compute_monthly_trend(&source, &Scope::group("g"), 0, &[], &[], date("2024-04-17"))
            .await
            .unwrap();
        assert!(points.is_empty());
    }
}
