//! Delivery Report Poller - Pulls the provider's report feed onto campaigns
//!
//! Report records carry no campaign id, so a campaign claims the `expected`
//! records whose submit time lies closest to its creation time. Two
//! campaigns created close together can claim each other's records.

use super::error::CampaignError;
use super::merger::merge_reports;
use crate::metrics::EngineMetrics;
use crate::whatsapp::{ReportFeed, ReportQuery};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use wapulse_common::config::ReportsConfig;
use wapulse_common::SessionContext;
use wapulse_storage::models::{Campaign, MessageReport};
use wapulse_storage::repository::CampaignStore;

/// Time range searched in the report feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportWindow {
    /// Configured bracket around the campaign's creation time
    AroundCreation,
    /// One UTC calendar day
    Day(NaiveDate),
}

impl ReportWindow {
    /// The current UTC day
    pub fn today() -> Self {
        ReportWindow::Day(Utc::now().date_naive())
    }

    /// Half-open `[from, to)` bounds for a campaign
    pub fn bounds(
        &self,
        campaign: &Campaign,
        config: &ReportsConfig,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            ReportWindow::AroundCreation => (
                campaign.created_at - Duration::seconds(config.window_before_secs),
                campaign.created_at + Duration::seconds(config.window_after_secs),
            ),
            ReportWindow::Day(day) => {
                let start = day.and_time(chrono::NaiveTime::MIN).and_utc();
                (start, start + Duration::days(1))
            }
        }
    }
}

/// Summary of one poll that reached the merge step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollOutcome {
    /// Valid records returned by the feed
    pub candidates: usize,
    /// Records kept after closest-time selection
    pub selected: usize,
    pub added: usize,
    pub updated: usize,
}

impl PollOutcome {
    pub fn changed(&self) -> bool {
        self.added > 0 || self.updated > 0
    }
}

/// Keep the `expected` records submitted closest to `anchor`.
///
/// Ties keep feed order. Fewer candidates than `expected` keeps them all.
pub fn select_closest(
    mut candidates: Vec<MessageReport>,
    anchor: DateTime<Utc>,
    expected: usize,
) -> Vec<MessageReport> {
    candidates.sort_by_key(|r| (r.submitted_at - anchor).num_milliseconds().unsigned_abs());
    candidates.truncate(expected);
    candidates
}

/// Fetches, selects and merges delivery reports for one campaign at a time
pub struct DeliveryReportPoller {
    feed: Arc<dyn ReportFeed>,
    campaigns: Arc<dyn CampaignStore>,
    metrics: Arc<EngineMetrics>,
    config: ReportsConfig,
}

impl DeliveryReportPoller {
    pub fn new(
        feed: Arc<dyn ReportFeed>,
        campaigns: Arc<dyn CampaignStore>,
        metrics: Arc<EngineMetrics>,
        config: ReportsConfig,
    ) -> Self {
        Self {
            feed,
            campaigns,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &ReportsConfig {
        &self.config
    }

    /// Poll the feed for `campaign` and merge what it finds.
    ///
    /// Returns `Ok(None)` when the campaign expects no reports. A feed failure
    /// is returned as an error and leaves the campaign untouched. The campaign
    /// is written back only when the merge changed its reports.
    pub async fn poll(
        &self,
        context: &SessionContext,
        campaign: &mut Campaign,
        window: ReportWindow,
    ) -> Result<Option<PollOutcome>, CampaignError> {
        let expected = campaign.expected_report_count();
        if expected == 0 {
            debug!(campaign_id = %campaign.id, "No reports expected, skipping poll");
            self.metrics.report_polls.with_label_values(&["skipped"]).inc();
            return Ok(None);
        }

        let candidates = match self.fetch(context, campaign, window).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(campaign_id = %campaign.id, "Report poll failed: {}", e);
                self.metrics.report_polls.with_label_values(&["error"]).inc();
                return Err(e);
            }
        };
        let candidate_count = candidates.len();

        let selected = select_closest(candidates, campaign.created_at, expected);
        let selected_count = selected.len();
        let merged = merge_reports(&campaign.reports, &selected);

        let outcome = PollOutcome {
            candidates: candidate_count,
            selected: selected_count,
            added: merged.added,
            updated: merged.updated,
        };

        if merged.changed() {
            campaign.reports = merged.reports;
            if let Err(e) = self.campaigns.save(campaign).await {
                error!(campaign_id = %campaign.id, "Failed to persist merged reports: {}", e);
            }
            self.metrics.report_polls.with_label_values(&["merged"]).inc();
            self.metrics
                .reports_merged
                .with_label_values(&["added"])
                .inc_by(outcome.added as u64);
            self.metrics
                .reports_merged
                .with_label_values(&["updated"])
                .inc_by(outcome.updated as u64);
            info!(
                campaign_id = %campaign.id,
                expected,
                candidates = outcome.candidates,
                added = outcome.added,
                updated = outcome.updated,
                "Merged delivery reports"
            );
        } else {
            self.metrics.report_polls.with_label_values(&["unchanged"]).inc();
            debug!(campaign_id = %campaign.id, candidates = outcome.candidates, "Reports unchanged");
        }

        Ok(Some(outcome))
    }

    /// Collect valid records across at most `max_pages` pages
    async fn fetch(
        &self,
        context: &SessionContext,
        campaign: &Campaign,
        window: ReportWindow,
    ) -> Result<Vec<MessageReport>, CampaignError> {
        let (from, to) = window.bounds(campaign, &self.config);
        let mut query = ReportQuery {
            owner_id: context.owner_id.clone(),
            from_time: from.timestamp_millis(),
            to_time: to.timestamp_millis(),
            recipient_filter: None,
            page_size: self.config.page_size,
            cursor: None,
        };

        let mut reports = Vec::new();
        for _ in 0..self.config.max_pages.max(1) {
            let page = self.feed.fetch_reports(context, &query).await?;

            for record in page.records {
                match record.into_report() {
                    Ok(report) => reports.push(report),
                    Err(e) => warn!(campaign_id = %campaign.id, "Skipping report record: {}", e),
                }
            }

            match page.next_cursor {
                Some(cursor) if !cursor.is_empty() => query.cursor = Some(cursor),
                _ => break,
            }
        }

        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeFeed, FlakyCampaignStore};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use wapulse_storage::models::{CampaignStatus, ReportStatus};
    use wapulse_storage::MemoryStore;

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn ms(offset_secs: i64) -> i64 {
        (created_at() + Duration::seconds(offset_secs)).timestamp_millis()
    }

    fn sent_campaign(sent: i32) -> Campaign {
        let mut c = Campaign::new_draft("acct-test", "Spring", uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
        c.created_at = created_at();
        c.status = CampaignStatus::Sent;
        c.sent_count = sent;
        c.contact_count = sent;
        c
    }

    fn setup(config: ReportsConfig) -> (Arc<FakeFeed>, Arc<FlakyCampaignStore>, DeliveryReportPoller) {
        let feed = FakeFeed::new();
        let store = FlakyCampaignStore::new(MemoryStore::new());
        let poller = DeliveryReportPoller::new(feed.clone(), store.clone(), testing::metrics(), config);
        (feed, store, poller)
    }

    #[tokio::test]
    async fn test_keeps_closest_records_newest_first() {
        let (feed, store, poller) = setup(ReportsConfig::default());
        feed.push_page(
            vec![
                testing::record("far", ms(1800), "SENT"),
                testing::record("near", ms(5), "SENT"),
                testing::record("mid", ms(-120), "DELIVERED"),
                testing::record("nearest", ms(-2), "READ"),
                testing::record("farther", ms(3000), "SENT"),
            ],
            None,
        );
        let mut c = sent_campaign(2);

        let outcome = poller
            .poll(&testing::context(), &mut c, ReportWindow::AroundCreation)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.candidates, 5);
        assert_eq!(outcome.selected, 2);
        assert_eq!(outcome.added, 2);
        let ids: Vec<_> = c.reports.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "nearest"]);
        assert_eq!(store.inner.get(c.id).await.unwrap().unwrap().reports, c.reports);
    }

    #[tokio::test]
    async fn test_takes_all_when_fewer_than_expected() {
        let (feed, _store, poller) = setup(ReportsConfig::default());
        feed.push_page(vec![testing::record("only", ms(1), "SENT")], None);
        let mut c = sent_campaign(3);

        let outcome = poller
            .poll(&testing::context(), &mut c, ReportWindow::AroundCreation)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.selected, 1);
        assert_eq!(c.reports.len(), 1);
    }

    #[tokio::test]
    async fn test_feed_failure_leaves_campaign_untouched() {
        let (feed, store, poller) = setup(ReportsConfig::default());
        feed.set_failing(true);
        let mut c = sent_campaign(2);
        let before = c.clone();

        let err = poller
            .poll(&testing::context(), &mut c, ReportWindow::AroundCreation)
            .await
            .unwrap_err();

        assert!(matches!(err, CampaignError::Feed(_)));
        assert_eq!(c, before);
        assert!(store.inner.get(c.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nothing_expected_skips_fetch() {
        let (feed, _store, poller) = setup(ReportsConfig::default());
        let mut c = sent_campaign(0);

        let outcome = poller
            .poll(&testing::context(), &mut c, ReportWindow::AroundCreation)
            .await
            .unwrap();

        assert_eq!(outcome, None);
        assert!(feed.queries().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_merge_does_not_persist() {
        let (feed, store, poller) = setup(ReportsConfig::default());
        feed.push_page(vec![testing::record("a", ms(1), "SENT")], None);
        feed.push_page(vec![testing::record("a", ms(1), "SENT")], None);
        let mut c = sent_campaign(1);

        poller
            .poll(&testing::context(), &mut c, ReportWindow::AroundCreation)
            .await
            .unwrap();
        store.set_fail_saves(true);

        let outcome = poller
            .poll(&testing::context(), &mut c, ReportWindow::AroundCreation)
            .await
            .unwrap()
            .unwrap();
        assert!(!outcome.changed());
        assert_eq!(c.reports.len(), 1);
    }

    #[tokio::test]
    async fn test_follows_cursor_up_to_max_pages() {
        let config = ReportsConfig {
            max_pages: 2,
            ..ReportsConfig::default()
        };
        let (feed, _store, poller) = setup(config);
        feed.push_page(vec![testing::record("p1", ms(10), "SENT")], Some("c2"));
        feed.push_page(vec![testing::record("p2", ms(20), "SENT")], Some("c3"));
        feed.push_page(vec![testing::record("p3", ms(1), "SENT")], None);
        let mut c = sent_campaign(5);

        let outcome = poller
            .poll(&testing::context(), &mut c, ReportWindow::AroundCreation)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.candidates, 2);
        let queries = feed.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].cursor, None);
        assert_eq!(queries[1].cursor.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn test_query_window_and_malformed_records() {
        let (feed, _store, poller) = setup(ReportsConfig::default());
        let mut bad = testing::record("bad", ms(1), "SENT");
        bad.status = "EXPLODED".into();
        feed.push_page(vec![bad, testing::record("good", ms(2), "SENT")], None);
        let mut c = sent_campaign(2);

        let outcome = poller
            .poll(&testing::context(), &mut c, ReportWindow::AroundCreation)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.candidates, 1);
        let query = &feed.queries()[0];
        assert_eq!(query.owner_id, "acct-test");
        assert_eq!(query.page_size, 100);
        assert_eq!(query.from_time, ms(-300));
        assert_eq!(query.to_time, ms(3600));
    }

    #[test]
    fn test_day_window_bounds() {
        let c = sent_campaign(1);
        let day = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let (from, to) = ReportWindow::Day(day).bounds(&c, &ReportsConfig::default());
        assert_eq!(from, Utc.with_ymd_and_hms(2025, 3, 4, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2025, 3, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_select_closest_prefers_smallest_distance() {
        let anchor = created_at();
        let make = |id: &str, offset: i64| MessageReport {
            message_id: id.into(),
            recipient: "+1".into(),
            status: ReportStatus::Sent,
            submitted_at: anchor + Duration::seconds(offset),
            delivered_at: None,
            read_at: None,
            message_type: "template".into(),
            error_code: None,
        };
        let selected = select_closest(vec![make("a", 100), make("b", -10), make("c", 50)], anchor, 2);
        let ids: Vec<_> = selected.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
