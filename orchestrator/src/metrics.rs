// Prometheus counters exported on /metrics

use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};
use std::sync::OnceLock;
use tracing::warn;

struct Metrics {
    runs_started: IntCounter,
    runs_completed: IntCounter,
    runs_failed: IntCounter,
    plan_fallbacks: IntCounter,
    messages_routed: IntCounter,
    routing_faults: IntCounter,
}

impl Metrics {
    fn register() -> prometheus::Result<Self> {
        Ok(Self {
            runs_started: register_int_counter!(
                "research_runs_started_total",
                "Research runs accepted"
            )?,
            runs_completed: register_int_counter!(
                "research_runs_completed_total",
                "Research runs that completed"
            )?,
            runs_failed: register_int_counter!(
                "research_runs_failed_total",
                "Research runs aborted by an unrecoverable fault"
            )?,
            plan_fallbacks: register_int_counter!(
                "research_plan_fallbacks_total",
                "Plans replaced by the default plan"
            )?,
            messages_routed: register_int_counter!(
                "bus_messages_routed_total",
                "Point-to-point messages delivered by the bus"
            )?,
            routing_faults: register_int_counter!(
                "bus_routing_faults_total",
                "Messages that came back as errors"
            )?,
        })
    }
}

static METRICS: OnceLock<Option<Metrics>> = OnceLock::new();

fn metrics() -> Option<&'static Metrics> {
    METRICS
        .get_or_init(|| match Metrics::register() {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!("Metrics registration failed: {}", e);
                None
            }
        })
        .as_ref()
}

pub fn run_started() {
    if let Some(m) = metrics() {
        m.runs_started.inc();
    }
}

pub fn run_completed() {
    if let Some(m) = metrics() {
        m.runs_completed.inc();
    }
}

pub fn run_failed() {
    if let Some(m) = metrics() {
        m.runs_failed.inc();
    }
}

pub fn plan_fallback() {
    if let Some(m) = metrics() {
        m.plan_fallbacks.inc();
    }
}

pub fn message_routed() {
    if let Some(m) = metrics() {
        m.messages_routed.inc();
    }
}

pub fn routing_fault() {
    if let Some(m) = metrics() {
        m.routing_faults.inc();
    }
}

/// Text exposition of the default registry.
pub fn render() -> Result<Vec<u8>, prometheus::Error> {
    metrics();
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(buffer)
}

pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        run_started();
        let text = String::from_utf8(render().unwrap()).unwrap();
        assert!(text.contains("research_runs_started_total"));
    }
}
