//! Reconciliation Merger - Folds fresh delivery reports into stored ones

use std::collections::HashMap;
use wapulse_storage::models::MessageReport;

/// Result of merging a fresh batch of reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Unique by message id, newest submission first
    pub reports: Vec<MessageReport>,
    pub added: usize,
    pub updated: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.added > 0 || self.updated > 0
    }
}

fn differs(existing: &MessageReport, fresh: &MessageReport) -> bool {
    existing.status != fresh.status
        || existing.delivered_at != fresh.delivered_at
        || existing.read_at != fresh.read_at
}

/// Merge `fresh` into `existing`, keyed by message id.
///
/// An existing report is replaced only when the fresh copy changed its
/// status, delivery time or read time. Unknown ids are appended. A repeated
/// id inside `fresh` resolves to its last occurrence.
pub fn merge_reports(existing: &[MessageReport], fresh: &[MessageReport]) -> MergeOutcome {
    let mut latest: HashMap<&str, &MessageReport> = HashMap::with_capacity(fresh.len());
    let mut fresh_order: Vec<&str> = Vec::with_capacity(fresh.len());
    for report in fresh {
        if latest.insert(report.message_id.as_str(), report).is_none() {
            fresh_order.push(report.message_id.as_str());
        }
    }

    let mut updated = 0;
    let mut reports: Vec<MessageReport> = Vec::with_capacity(existing.len() + fresh_order.len());
    for current in existing {
        // a malformed store may hold a duplicate id; keep the first copy only
        if reports.iter().any(|r| r.message_id == current.message_id) {
            continue;
        }
        match latest.remove(current.message_id.as_str()) {
            Some(incoming) if differs(current, incoming) => {
                updated += 1;
                reports.push(incoming.clone());
            }
            _ => reports.push(current.clone()),
        }
    }

    let mut added = 0;
    for id in fresh_order {
        if let Some(incoming) = latest.remove(id) {
            added += 1;
            reports.push(incoming.clone());
        }
    }

    reports.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

    MergeOutcome {
        reports,
        added,
        updated,
    }
}
