use onay_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use tracing::{error, info, warn};

/// Forwards workflow audit events to the tracing subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let entity_id = event.entity_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none");
        let metadata = render_metadata(&event);

        match event.outcome {
            AuditOutcome::Success => info!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                entity_id = %entity_id,
                actor = %event.actor,
                category = ?event.category,
                metadata = %metadata,
                "workflow event"
            ),
            AuditOutcome::Rejected => warn!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                entity_id = %entity_id,
                actor = %event.actor,
                category = ?event.category,
                metadata = %metadata,
                "workflow request rejected"
            ),
            AuditOutcome::Failed => error!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                entity_id = %entity_id,
                actor = %event.actor,
                category = ?event.category,
                metadata = %metadata,
                "workflow request failed"
            ),
        }
    }
}

fn render_metadata(event: &AuditEvent) -> String {
    event
        .metadata
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}
