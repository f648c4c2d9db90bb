//! Delivery metrics derived from a campaign's reports

use serde::Serialize;
use wapulse_storage::models::{MessageReport, ReportStatus};

/// Read-only delivery figures. Rates are percentages of `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DeliveryMetrics {
    pub total: usize,
    /// Delivered or read
    pub delivered: usize,
    pub read: usize,
    pub failed: usize,
    /// Pending or sent, not yet delivered
    pub pending: usize,
    pub delivery_rate: f64,
    pub read_rate: f64,
}

impl DeliveryMetrics {
    pub fn from_reports(reports: &[MessageReport]) -> Self {
        let mut metrics = DeliveryMetrics {
            total: reports.len(),
            ..Default::default()
        };

        for report in reports {
            match report.effective_status() {
                ReportStatus::Read => {
                    metrics.read += 1;
                    metrics.delivered += 1;
                }
                ReportStatus::Delivered => metrics.delivered += 1,
                ReportStatus::Failed => metrics.failed += 1,
                ReportStatus::Pending | ReportStatus::Sent => metrics.pending += 1,
            }
        }

        if metrics.total > 0 {
            let total = metrics.total as f64;
            metrics.delivery_rate = metrics.delivered as f64 * 100.0 / total;
            metrics.read_rate = metrics.read as f64 * 100.0 / total;
        }

        metrics
    }
}
