//! Campaign Lifecycle Controller - Drives campaigns through their states
//!
//! ```text
//! draft ──> scheduled ──> sending ──> sent
//!   └─────────────────────────^        │
//!                             ^────────┘  retry / resend
//! ```

use super::dispatcher::{DispatchSummary, MessageDispatcher};
use super::error::CampaignError;
use super::poller::{DeliveryReportPoller, PollOutcome, ReportWindow};
use super::stats::DeliveryMetrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use wapulse_common::types::CampaignId;
use wapulse_common::SessionContext;
use wapulse_storage::models::{Campaign, CampaignStatus, Contact, DisplayStatus, Template};
use wapulse_storage::repository::{CampaignStore, ContactStore, MediaStore, TemplateStore};
use wapulse_storage::MemoryStore;

/// Stores the controller reads and writes
#[derive(Clone)]
pub struct CampaignStores {
    pub campaigns: Arc<dyn CampaignStore>,
    pub contacts: Arc<dyn ContactStore>,
    pub templates: Arc<dyn TemplateStore>,
    pub media: Arc<dyn MediaStore>,
}

impl CampaignStores {
    /// Back every store with the same in-memory tables
    pub fn from_memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            campaigns: store.clone(),
            contacts: store.clone(),
            templates: store.clone(),
            media: store,
        }
    }
}

/// Campaign together with the status shown to users
#[derive(Debug, Clone, Serialize)]
pub struct CampaignView {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub display_status: DisplayStatus,
}

/// Result of a retry of failed recipients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetrySummary {
    pub attempted: i32,
    pub recovered: i32,
    pub still_failed: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Activity {
    Dispatch,
    Poll,
}

/// Campaigns with work running in this process.
///
/// A campaign holds at most one activity at a time: a poll never overlaps a
/// send run, whose final save would otherwise drop the merged reports.
#[derive(Default)]
struct InFlight {
    running: Mutex<HashSet<(CampaignId, Activity)>>,
}

impl InFlight {
    fn try_begin(self: &Arc<Self>, id: CampaignId, activity: Activity) -> Option<InFlightGuard> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.iter().any(|(held, _)| *held == id) {
            return None;
        }
        running.insert((id, activity));
        Some(InFlightGuard {
            owner: self.clone(),
            key: (id, activity),
        })
    }

    #[cfg(test)]
    fn is_running(&self, id: CampaignId, activity: Activity) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(id, activity))
    }
}

/// Releases the in-flight slot when dropped
struct InFlightGuard {
    owner: Arc<InFlight>,
    key: (CampaignId, Activity),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.owner
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

/// Everything a send run needs besides the campaign itself
struct SendPlan {
    contacts: Vec<Contact>,
    template: Template,
    media: Option<String>,
}

/// Lifecycle operations over stored campaigns
#[derive(Clone)]
pub struct CampaignController {
    stores: CampaignStores,
    dispatcher: Arc<MessageDispatcher>,
    poller: Arc<DeliveryReportPoller>,
    in_flight: Arc<InFlight>,
    /// Delay before the report poll that follows a send run; `None` disables it
    post_dispatch_delay: Option<Duration>,
}

impl CampaignController {
    pub fn new(
        stores: CampaignStores,
        dispatcher: MessageDispatcher,
        poller: DeliveryReportPoller,
    ) -> Self {
        let post_dispatch_delay = Some(Duration::from_secs(
            poller.config().post_dispatch_delay_secs,
        ));
        Self {
            stores,
            dispatcher: Arc::new(dispatcher),
            poller: Arc::new(poller),
            in_flight: Arc::new(InFlight::default()),
            post_dispatch_delay,
        }
    }

    pub fn with_post_dispatch_delay(mut self, delay: Option<Duration>) -> Self {
        self.post_dispatch_delay = delay;
        self
    }

    // ========================================================================
    // Send runs
    // ========================================================================

    /// Send a draft or scheduled campaign now and wait for the run to finish
    pub async fn dispatch(
        &self,
        context: &SessionContext,
        id: CampaignId,
    ) -> Result<DispatchSummary, CampaignError> {
        let guard = self.begin(id, Activity::Dispatch)?;
        let (campaign, plan) = self.prepare_dispatch(id).await?;
        Ok(self.run_dispatch(context, campaign, plan, guard).await)
    }

    /// Validate a "send now" request, then run it in the background
    pub async fn start_dispatch(
        &self,
        context: &SessionContext,
        id: CampaignId,
    ) -> Result<(), CampaignError> {
        let guard = self.begin(id, Activity::Dispatch)?;
        let (campaign, plan) = self.prepare_dispatch(id).await?;

        let controller = self.clone();
        let context = context.clone();
        tokio::spawn(async move {
            controller.run_dispatch(&context, campaign, plan, guard).await;
        });

        Ok(())
    }

    /// Move a draft campaign to `scheduled`
    pub async fn schedule(
        &self,
        id: CampaignId,
        at: DateTime<Utc>,
    ) -> Result<Campaign, CampaignError> {
        let mut campaign = self.load(id).await?;
        if !campaign.status.can_transition_to(CampaignStatus::Scheduled) {
            return Err(CampaignError::InvalidTransition {
                from: campaign.status,
                to: CampaignStatus::Scheduled,
            });
        }
        if at <= Utc::now() {
            return Err(CampaignError::Validation(
                "scheduled_for must be in the future".to_string(),
            ));
        }

        campaign.status = CampaignStatus::Scheduled;
        campaign.scheduled_for = Some(at);
        self.stores.campaigns.save(&campaign).await?;

        info!(campaign_id = %id, scheduled_for = %at, "Campaign scheduled");
        Ok(campaign)
    }

    /// Dispatch every scheduled campaign whose time has come.
    ///
    /// Returns how many campaigns were dispatched.
    pub async fn run_scheduled_sweep(
        &self,
        context: &SessionContext,
        now: DateTime<Utc>,
    ) -> Result<usize, CampaignError> {
        let ready = self.stores.campaigns.list_scheduled_ready(now).await?;
        if ready.is_empty() {
            return Ok(0);
        }
        debug!(count = ready.len(), "Scheduled campaigns ready");

        let mut dispatched = 0;
        for campaign in ready {
            let Some(guard) = self.in_flight.try_begin(campaign.id, Activity::Dispatch) else {
                continue;
            };
            let plan = match self.load_plan(&campaign).await {
                Ok(plan) => plan,
                Err(e) => {
                    warn!(campaign_id = %campaign.id, "Cannot dispatch scheduled campaign: {}", e);
                    continue;
                }
            };
            self.run_dispatch(context, campaign, plan, guard).await;
            dispatched += 1;
        }

        Ok(dispatched)
    }

    /// Redispatch campaigns left in `sending` by a run that never finished.
    ///
    /// Every recipient is sent to again, so some may receive the message twice.
    pub async fn recover_stuck(&self, context: &SessionContext) -> Result<usize, CampaignError> {
        let stuck = self
            .stores
            .campaigns
            .list_by_status(&[CampaignStatus::Sending])
            .await?;

        let mut recovered = 0;
        for campaign in stuck {
            let Some(guard) = self.in_flight.try_begin(campaign.id, Activity::Dispatch) else {
                continue;
            };
            warn!(campaign_id = %campaign.id, "Redispatching campaign left in sending");
            let plan = match self.load_plan(&campaign).await {
                Ok(plan) => plan,
                Err(e) => {
                    error!(campaign_id = %campaign.id, "Cannot recover campaign: {}", e);
                    continue;
                }
            };
            self.run_dispatch(context, campaign, plan, guard).await;
            recovered += 1;
        }

        Ok(recovered)
    }

    /// Send again to the recipients whose last attempt failed.
    ///
    /// A failed save of the `sending` status aborts before anything is sent.
    pub async fn retry_failed(
        &self,
        context: &SessionContext,
        id: CampaignId,
    ) -> Result<RetrySummary, CampaignError> {
        let _guard = self.begin(id, Activity::Dispatch)?;
        let mut campaign = self.load_resendable(id).await?;

        let failed: HashSet<_> = campaign.failed_contact_ids().into_iter().collect();
        if failed.is_empty() {
            debug!(campaign_id = %id, "No failed recipients to retry");
            return Ok(RetrySummary::default());
        }

        let prior = campaign.status;
        campaign.status = CampaignStatus::Sending;
        self.stores.campaigns.save(&campaign).await?;

        let mut plan = match self.load_plan(&campaign).await {
            Ok(plan) => plan,
            Err(e) => {
                self.revert(&mut campaign, prior).await;
                return Err(e);
            }
        };
        plan.contacts.retain(|c| failed.contains(&c.id));

        info!(campaign_id = %id, recipients = plan.contacts.len(), "Retrying failed recipients");
        let outcomes = self
            .dispatcher
            .send_all(
                context,
                &campaign,
                &plan.contacts,
                &plan.template,
                &campaign.variable_bindings,
                plan.media.as_deref(),
            )
            .await;

        let batch = DispatchSummary::from_outcomes(&outcomes);
        campaign.sent_count += batch.sent;
        campaign.failed_count = (campaign.failed_count - batch.sent).max(0);
        campaign.record_outcomes(&outcomes);
        campaign.last_dispatched_at = Some(Utc::now());
        campaign.status = CampaignStatus::Sent;
        self.persist(&campaign).await;

        let summary = RetrySummary {
            attempted: batch.sent + batch.failed,
            recovered: batch.sent,
            still_failed: campaign.failed_count,
        };
        info!(
            campaign_id = %id,
            recovered = summary.recovered,
            still_failed = summary.still_failed,
            "Retry finished"
        );

        self.schedule_report_poll(context, id);
        Ok(summary)
    }

    /// Send again to the whole audience, overwriting both counters.
    ///
    /// A failed save of the `sending` status aborts before anything is sent.
    pub async fn resend(
        &self,
        context: &SessionContext,
        id: CampaignId,
    ) -> Result<DispatchSummary, CampaignError> {
        let _guard = self.begin(id, Activity::Dispatch)?;
        let mut campaign = self.load_resendable(id).await?;

        let prior = campaign.status;
        campaign.status = CampaignStatus::Sending;
        self.stores.campaigns.save(&campaign).await?;

        let plan = match self.load_plan(&campaign).await {
            Ok(plan) => plan,
            Err(e) => {
                self.revert(&mut campaign, prior).await;
                return Err(e);
            }
        };

        let bindings = campaign.variable_bindings.clone();
        let summary = self
            .dispatcher
            .dispatch(
                context,
                &mut campaign,
                &plan.contacts,
                &plan.template,
                &bindings,
                plan.media.as_deref(),
            )
            .await;

        self.schedule_report_poll(context, id);
        Ok(summary)
    }

    // ========================================================================
    // Reports
    // ========================================================================

    /// Poll the report feed for the current UTC day.
    ///
    /// Rejected with `AlreadyRunning` while a send run holds the campaign.
    pub async fn refresh_reports(
        &self,
        context: &SessionContext,
        id: CampaignId,
    ) -> Result<Option<PollOutcome>, CampaignError> {
        let _guard = self.begin(id, Activity::Poll)?;
        let mut campaign = self.load(id).await?;
        self.poller
            .poll(context, &mut campaign, ReportWindow::today())
            .await
    }

    /// Poll every sent campaign that still has no reports.
    ///
    /// Campaigns with a send or poll running in this process are skipped.
    /// Returns how many campaigns were polled successfully.
    pub async fn monitor_reports(&self, context: &SessionContext) -> Result<usize, CampaignError> {
        let candidates = self
            .stores
            .campaigns
            .list_by_status(&[CampaignStatus::Sending, CampaignStatus::Sent])
            .await?;

        let mut polled = 0;
        for mut campaign in candidates.into_iter().filter(Campaign::awaiting_reports) {
            let Some(_guard) = self.in_flight.try_begin(campaign.id, Activity::Poll) else {
                continue;
            };
            match self
                .poller
                .poll(context, &mut campaign, ReportWindow::AroundCreation)
                .await
            {
                Ok(_) => polled += 1,
                Err(e) => warn!(campaign_id = %campaign.id, "Monitor poll failed: {}", e),
            }
        }

        Ok(polled)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Delivery figures derived from the campaign's reports
    pub async fn metrics(&self, id: CampaignId) -> Result<DeliveryMetrics, CampaignError> {
        let campaign = self.load(id).await?;
        Ok(DeliveryMetrics::from_reports(&campaign.reports))
    }

    pub async fn view(&self, id: CampaignId) -> Result<CampaignView, CampaignError> {
        let campaign = self.load(id).await?;
        let display_status = campaign.display_status();
        Ok(CampaignView {
            campaign,
            display_status,
        })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn begin(&self, id: CampaignId, activity: Activity) -> Result<InFlightGuard, CampaignError> {
        self.in_flight
            .try_begin(id, activity)
            .ok_or(CampaignError::AlreadyRunning(id))
    }

    async fn load(&self, id: CampaignId) -> Result<Campaign, CampaignError> {
        self.stores
            .campaigns
            .get(id)
            .await?
            .ok_or(CampaignError::NotFound(id))
    }

    async fn prepare_dispatch(
        &self,
        id: CampaignId,
    ) -> Result<(Campaign, SendPlan), CampaignError> {
        let campaign = self.load(id).await?;
        if !matches!(
            campaign.status,
            CampaignStatus::Draft | CampaignStatus::Scheduled
        ) {
            return Err(CampaignError::InvalidTransition {
                from: campaign.status,
                to: CampaignStatus::Sending,
            });
        }
        let plan = self.load_plan(&campaign).await?;
        Ok((campaign, plan))
    }

    /// Retry and resend start from a finished run
    async fn load_resendable(&self, id: CampaignId) -> Result<Campaign, CampaignError> {
        let campaign = self.load(id).await?;
        if campaign.status != CampaignStatus::Sent {
            return Err(CampaignError::InvalidTransition {
                from: campaign.status,
                to: CampaignStatus::Sending,
            });
        }
        Ok(campaign)
    }

    async fn load_plan(&self, campaign: &Campaign) -> Result<SendPlan, CampaignError> {
        let template = self
            .stores
            .templates
            .get_template(campaign.template_id)
            .await?
            .ok_or(CampaignError::TemplateNotFound(campaign.template_id))?;

        let media = match campaign.media_id {
            Some(media_id) => Some(
                self.stores
                    .media
                    .get_media(media_id)
                    .await?
                    .ok_or(CampaignError::MediaNotFound(media_id))?,
            ),
            None => None,
        };

        let contacts = self
            .stores
            .contacts
            .list_contacts(campaign.audience_id)
            .await?;

        Ok(SendPlan {
            contacts,
            template,
            media,
        })
    }

    async fn run_dispatch(
        &self,
        context: &SessionContext,
        mut campaign: Campaign,
        plan: SendPlan,
        _guard: InFlightGuard,
    ) -> DispatchSummary {
        let bindings = campaign.variable_bindings.clone();
        let summary = self
            .dispatcher
            .dispatch(
                context,
                &mut campaign,
                &plan.contacts,
                &plan.template,
                &bindings,
                plan.media.as_deref(),
            )
            .await;

        self.schedule_report_poll(context, campaign.id);
        summary
    }

    async fn revert(&self, campaign: &mut Campaign, prior: CampaignStatus) {
        campaign.status = prior;
        self.persist(campaign).await;
    }

    async fn persist(&self, campaign: &Campaign) {
        if let Err(e) = self.stores.campaigns.save(campaign).await {
            error!(campaign_id = %campaign.id, "Failed to persist campaign: {}", e);
        }
    }

    /// Poll the feed once the provider has had time to report on a send run
    fn schedule_report_poll(&self, context: &SessionContext, id: CampaignId) {
        let Some(delay) = self.post_dispatch_delay else {
            return;
        };
        let controller = self.clone();
        let context = context.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(_guard) = controller.in_flight.try_begin(id, Activity::Poll) else {
                // a send run holding the campaign schedules its own poll
                debug!(campaign_id = %id, "Post-dispatch poll skipped, campaign busy");
                return;
            };
            let mut campaign = match controller.load(id).await {
                Ok(campaign) => campaign,
                Err(e) => {
                    warn!(campaign_id = %id, "Post-dispatch poll skipped: {}", e);
                    return;
                }
            };
            if let Err(e) = controller
                .poller
                .poll(&context, &mut campaign, ReportWindow::AroundCreation)
                .await
            {
                warn!(campaign_id = %id, "Post-dispatch poll failed: {}", e);
            }
        });
    }
}
