//! Prometheus counters for dispatch and reconciliation

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Engine counters, registered in their own registry
#[derive(Clone)]
pub struct EngineMetrics {
    registry: Registry,
    pub messages_sent: IntCounter,
    pub messages_failed: IntCounter,
    /// Labelled by `outcome`: merged, unchanged, skipped, error
    pub report_polls: IntCounterVec,
    /// Labelled by `kind`: added, updated
    pub reports_merged: IntCounterVec,
}

impl EngineMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("wapulse".to_string()), None)?;

        let messages_sent =
            IntCounter::new("messages_sent_total", "Campaign messages accepted by the provider")?;
        let messages_failed =
            IntCounter::new("messages_failed_total", "Campaign messages that failed to send")?;
        let report_polls = IntCounterVec::new(
            Opts::new("report_polls_total", "Delivery report polls by outcome"),
            &["outcome"],
        )?;
        let reports_merged = IntCounterVec::new(
            Opts::new("reports_merged_total", "Report records merged into campaigns"),
            &["kind"],
        )?;

        registry.register(Box::new(messages_sent.clone()))?;
        registry.register(Box::new(messages_failed.clone()))?;
        registry.register(Box::new(report_polls.clone()))?;
        registry.register(Box::new(reports_merged.clone()))?;

        Ok(Self {
            registry,
            messages_sent,
            messages_failed,
            report_polls,
            reports_merged,
        })
    }

    /// Render all counters in the Prometheus text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        let metrics = EngineMetrics::new().unwrap();
        metrics.messages_sent.inc_by(3);
        metrics.report_polls.with_label_values(&["merged"]).inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("wapulse_messages_sent_total 3"));
        assert!(text.contains("wapulse_report_polls_total{outcome=\"merged\"} 1"));
    }
}
