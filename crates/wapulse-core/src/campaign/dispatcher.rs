//! Message Dispatcher - Sends a campaign's rendered message to its audience

use super::template::TemplateRenderer;
use crate::metrics::EngineMetrics;
use crate::whatsapp::{MessageSender, SendRequest};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use wapulse_common::SessionContext;
use wapulse_storage::models::{Campaign, CampaignStatus, Contact, RecipientOutcome, Template};
use wapulse_storage::repository::CampaignStore;

/// Totals of one dispatch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub sent: i32,
    pub failed: i32,
}

impl DispatchSummary {
    pub fn from_outcomes(outcomes: &[RecipientOutcome]) -> Self {
        let sent = outcomes.iter().filter(|o| o.succeeded).count() as i32;
        Self {
            sent,
            failed: outcomes.len() as i32 - sent,
        }
    }
}

/// Sends messages one recipient at a time with a fixed delay between sends.
///
/// A failed send never aborts the run. Store write failures are logged and
/// otherwise ignored, so in-memory counts can diverge from the stored record.
pub struct MessageDispatcher {
    sender: Arc<dyn MessageSender>,
    campaigns: Arc<dyn CampaignStore>,
    renderer: TemplateRenderer,
    metrics: Arc<EngineMetrics>,
    /// Delay between consecutive sends
    pacing: Duration,
    message_type: String,
}

impl MessageDispatcher {
    pub fn new(
        sender: Arc<dyn MessageSender>,
        campaigns: Arc<dyn CampaignStore>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            sender,
            campaigns,
            renderer: TemplateRenderer::new(),
            metrics,
            pacing: Duration::from_secs(1),
            message_type: "template".to_string(),
        }
    }

    /// Set the delay between consecutive sends
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Set the message type sent with every request
    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = message_type.into();
        self
    }

    /// Run a full dispatch of `campaign` to `contacts`.
    ///
    /// Marks the campaign `sending` before the loop and `sent` after it,
    /// whatever the outcome, and overwrites both counters with this run's
    /// totals.
    pub async fn dispatch(
        &self,
        context: &SessionContext,
        campaign: &mut Campaign,
        contacts: &[Contact],
        template: &Template,
        bindings: &BTreeMap<String, String>,
        media: Option<&str>,
    ) -> DispatchSummary {
        info!(
            campaign_id = %campaign.id,
            recipients = contacts.len(),
            "Starting campaign dispatch"
        );

        campaign.status = CampaignStatus::Sending;
        campaign.contact_count = contacts.len() as i32;
        self.persist(campaign).await;

        let outcomes = self
            .send_all(context, campaign, contacts, template, bindings, media)
            .await;
        let summary = DispatchSummary::from_outcomes(&outcomes);

        campaign.sent_count = summary.sent;
        campaign.failed_count = summary.failed;
        campaign.recipient_outcomes = outcomes;
        campaign.last_dispatched_at = Some(Utc::now());
        campaign.status = CampaignStatus::Sent;
        self.persist(campaign).await;

        info!(
            campaign_id = %campaign.id,
            sent = summary.sent,
            failed = summary.failed,
            "Campaign dispatch finished"
        );

        summary
    }

    /// Send to every contact in list order and return one outcome per contact.
    ///
    /// Does not touch the campaign's status or counters.
    pub async fn send_all(
        &self,
        context: &SessionContext,
        campaign: &Campaign,
        contacts: &[Contact],
        template: &Template,
        bindings: &BTreeMap<String, String>,
        media: Option<&str>,
    ) -> Vec<RecipientOutcome> {
        let mut outcomes = Vec::with_capacity(contacts.len());
        let mut unbound_seen = BTreeSet::new();

        for (index, contact) in contacts.iter().enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            let rendered = self.renderer.render(template, contact, bindings);
            let new_unbound: Vec<&String> = rendered
                .unbound
                .iter()
                .filter(|v| !unbound_seen.contains(*v))
                .collect();
            if !new_unbound.is_empty() {
                warn!(
                    campaign_id = %campaign.id,
                    variables = ?new_unbound,
                    "Template variables have no binding, substituting empty text"
                );
                unbound_seen.extend(rendered.unbound.iter().cloned());
            }

            let request = SendRequest {
                recipient: contact.phone.clone(),
                rendered_body: rendered.text(),
                message_type: self.message_type.clone(),
                template_name: template.name.clone(),
                campaign_id: campaign.id,
                media: media.map(str::to_string),
            };

            let error = match self.sender.send(context, &request).await {
                Ok(response) if response.success => None,
                Ok(response) => Some(
                    response
                        .error
                        .unwrap_or_else(|| "rejected by provider".to_string()),
                ),
                Err(e) => Some(e.to_string()),
            };

            match &error {
                None => {
                    self.metrics.messages_sent.inc();
                    debug!(campaign_id = %campaign.id, recipient = %contact.phone, "Message sent");
                }
                Some(reason) => {
                    self.metrics.messages_failed.inc();
                    warn!(
                        campaign_id = %campaign.id,
                        recipient = %contact.phone,
                        error = %reason,
                        "Message send failed"
                    );
                }
            }

            outcomes.push(RecipientOutcome {
                contact_id: contact.id,
                phone: contact.phone.clone(),
                succeeded: error.is_none(),
                error,
                attempted_at: Utc::now(),
            });
        }

        outcomes
    }

    async fn persist(&self, campaign: &Campaign) {
        if let Err(e) = self.campaigns.save(campaign).await {
            error!(
                campaign_id = %campaign.id,
                status = %campaign.status,
                "Failed to persist campaign: {}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeSender, FlakyCampaignStore};
    use pretty_assertions::assert_eq;
    use wapulse_storage::MemoryStore;

    fn setup() -> (Arc<FakeSender>, Arc<FlakyCampaignStore>, MessageDispatcher) {
        let sender = FakeSender::new();
        let store = FlakyCampaignStore::new(MemoryStore::new());
        let dispatcher = MessageDispatcher::new(sender.clone(), store.clone(), testing::metrics());
        (sender, store, dispatcher)
    }

    fn campaign() -> Campaign {
        let mut c = Campaign::new_draft("acct", "Spring", uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
        c.variable_bindings.insert("name".into(), "name".into());
        c
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_counts_and_status() {
        let (sender, store, dispatcher) = setup();
        sender.reject(&["+3"]);

        let mut c = campaign();
        let contacts = testing::contacts(c.audience_id, &["+1", "+2", "+3"]);
        let template = testing::template("Hi {{name}}");
        let bindings = c.variable_bindings.clone();

        let summary = dispatcher
            .dispatch(&testing::context(), &mut c, &contacts, &template, &bindings, None)
            .await;

        assert_eq!(summary, DispatchSummary { sent: 2, failed: 1 });
        let stored = store.inner.get(c.id).await.unwrap().unwrap();
        assert_eq!(stored.sent_count, 2);
        assert_eq!(stored.failed_count, 1);
        assert_eq!(stored.contact_count, 3);
        assert_eq!(stored.status, CampaignStatus::Sent);
        assert_eq!(stored.failed_contact_ids(), vec![contacts[2].id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_in_list_order_with_pacing() {
        let (sender, _store, dispatcher) = setup();
        let mut c = campaign();
        let contacts = testing::contacts(c.audience_id, &["+9", "+1", "+5"]);
        let template = testing::template("Hi {{name}}");
        let bindings = c.variable_bindings.clone();

        dispatcher
            .dispatch(&testing::context(), &mut c, &contacts, &template, &bindings, None)
            .await;

        assert_eq!(sender.recipients(), vec!["+9", "+1", "+5"]);
        let instants = sender.send_instants();
        assert_eq!(instants[1] - instants[0], Duration::from_secs(1));
        assert_eq!(instants[2] - instants[1], Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_do_not_abort_loop() {
        let (sender, _store, dispatcher) = setup();
        sender.error_on(&["+1", "+2"]);
        let mut c = campaign();
        let contacts = testing::contacts(c.audience_id, &["+1", "+2", "+3", "+4"]);
        let template = testing::template("Hi");

        let summary = dispatcher
            .dispatch(&testing::context(), &mut c, &contacts, &template, &BTreeMap::new(), None)
            .await;

        assert_eq!(summary.sent + summary.failed, 4);
        assert_eq!(summary, DispatchSummary { sent: 2, failed: 2 });
        assert_eq!(sender.requests().len(), 4);
        let failure = &c.recipient_outcomes[0];
        assert!(!failure.succeeded);
        assert!(failure.error.as_deref().unwrap_or_default().contains("503"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_successes_still_marks_sent() {
        let (sender, _store, dispatcher) = setup();
        sender.reject(&["+1"]);
        let mut c = campaign();
        let contacts = testing::contacts(c.audience_id, &["+1"]);

        let summary = dispatcher
            .dispatch(
                &testing::context(),
                &mut c,
                &contacts,
                &testing::template("x"),
                &BTreeMap::new(),
                None,
            )
            .await;

        assert_eq!(summary, DispatchSummary { sent: 0, failed: 1 });
        assert_eq!(c.status, CampaignStatus::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_carries_rendered_body_and_media() {
        let (sender, _store, dispatcher) = setup();
        let mut c = campaign();
        let contacts = testing::contacts(c.audience_id, &["+1"]);
        let template = testing::template("Hello {{name}}, use {{code}}");
        let bindings = c.variable_bindings.clone();

        dispatcher
            .dispatch(
                &testing::context(),
                &mut c,
                &contacts,
                &template,
                &bindings,
                Some("media-123"),
            )
            .await;

        let requests = sender.requests();
        assert_eq!(requests[0].rendered_body, "Hello Contact 1, use ");
        assert_eq!(requests[0].template_name, "spring_promo");
        assert_eq!(requests[0].media.as_deref(), Some("media-123"));
        assert_eq!(requests[0].campaign_id, c.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failures_are_swallowed() {
        let (_sender, store, dispatcher) = setup();
        store.set_fail_saves(true);
        let mut c = campaign();
        let contacts = testing::contacts(c.audience_id, &["+1", "+2"]);

        let summary = dispatcher
            .dispatch(
                &testing::context(),
                &mut c,
                &contacts,
                &testing::template("x"),
                &BTreeMap::new(),
                None,
            )
            .await;

        assert_eq!(summary, DispatchSummary { sent: 2, failed: 0 });
        assert_eq!(c.sent_count, 2);
        assert!(store.inner.get(c.id).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_all_leaves_counters_alone() {
        let (_sender, _store, dispatcher) = setup();
        let mut c = campaign();
        c.status = CampaignStatus::Sent;
        c.sent_count = 5;
        let contacts = testing::contacts(c.audience_id, &["+1"]);

        let outcomes = dispatcher
            .send_all(
                &testing::context(),
                &c,
                &contacts,
                &testing::template("x"),
                &BTreeMap::new(),
                None,
            )
            .await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].succeeded);
        assert_eq!(c.sent_count, 5);
        assert_eq!(c.status, CampaignStatus::Sent);
    }
}
