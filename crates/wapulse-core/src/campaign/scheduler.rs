//! Campaign Scheduler - Background sweep and report monitor
//!
//! The single process-wide owner of periodic dispatch and polling.

use super::controller::CampaignController;
use chrono::Utc;
use tokio::time::{interval, Duration as TokioDuration, MissedTickBehavior};
use tracing::{debug, error, info};
use wapulse_common::config::{ReportsConfig, SchedulerConfig};
use wapulse_common::SessionContext;

/// Runs the scheduled-send sweep and the report monitor
pub struct CampaignScheduler {
    controller: CampaignController,
    context: SessionContext,
    /// Interval of the scheduled-send sweep (seconds)
    sweep_interval_secs: u64,
    /// Interval of the report monitor (seconds)
    monitor_interval_secs: u64,
    recover_on_start: bool,
}

impl CampaignScheduler {
    pub fn new(controller: CampaignController, context: SessionContext) -> Self {
        Self {
            controller,
            context,
            sweep_interval_secs: 60,
            monitor_interval_secs: 20,
            recover_on_start: true,
        }
    }

    /// Apply intervals and startup recovery from configuration
    pub fn with_config(mut self, scheduler: &SchedulerConfig, reports: &ReportsConfig) -> Self {
        self.sweep_interval_secs = scheduler.sweep_interval_secs;
        self.monitor_interval_secs = reports.monitor_interval_secs;
        self.recover_on_start = scheduler.recover_on_start;
        self
    }

    pub fn with_sweep_interval(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs;
        self
    }

    pub fn with_monitor_interval(mut self, secs: u64) -> Self {
        self.monitor_interval_secs = secs;
        self
    }

    /// Run both loops until the task is dropped
    pub async fn run(&self) {
        info!(
            "Campaign scheduler started (sweep: {}s, monitor: {}s)",
            self.sweep_interval_secs, self.monitor_interval_secs
        );

        if self.recover_on_start {
            match self.controller.recover_stuck(&self.context).await {
                Ok(0) => {}
                Ok(n) => info!("Recovered {} campaigns left in sending", n),
                Err(e) => error!("Error recovering stuck campaigns: {}", e),
            }
        }

        tokio::join!(self.sweep_loop(), self.monitor_loop());
    }

    async fn sweep_loop(&self) {
        let mut ticker = interval(TokioDuration::from_secs(self.sweep_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self
                .controller
                .run_scheduled_sweep(&self.context, Utc::now())
                .await
            {
                Ok(0) => {}
                Ok(n) => debug!("Scheduled sweep dispatched {} campaigns", n),
                Err(e) => error!("Error running scheduled sweep: {}", e),
            }
        }
    }

    async fn monitor_loop(&self) {
        let mut ticker = interval(TokioDuration::from_secs(self.monitor_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.controller.monitor_reports(&self.context).await {
                Ok(0) => {}
                Ok(n) => debug!("Report monitor polled {} campaigns", n),
                Err(e) => error!("Error monitoring delivery reports: {}", e),
            }
        }
    }
}
