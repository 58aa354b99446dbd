use tracing::warn;

use helpdesk_core::audit::InMemoryAuditSink;
use helpdesk_db::repositories::AuditRepository;

use crate::app::AppState;

/// Persists buffered audit events. Audit storage failures are logged, never surfaced to the caller.
pub async fn flush(state: &AppState, sink: &InMemoryAuditSink) {
    let events = sink.drain();
    if events.is_empty() {
        return;
    }
    if let Err(error) = state.audit().append(&events).await {
        warn!(
            event_name = "audit.persist_failed",
            correlation_id = %events[0].correlation_id,
            dropped = events.len(),
            error = %error,
            "failed to persist audit events"
        );
    }
}

#[cfg(test)]
mod tests {
    use helpdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
    use helpdesk_db::repositories::AuditRepository;

    use super::flush;
    use crate::app::test_support::test_state;

    #[tokio::test]
    async fn flush_drains_sink_into_storage() {
        let state = test_state().await;
        let sink = state.audit_sink();
        sink.emit(AuditEvent::new(
            Some("TKT-9".to_string()),
            "req-1",
            "ticket.created",
            AuditCategory::Flow,
            "USR-1",
            AuditOutcome::Success,
        ));

        flush(&state, &sink).await;

        assert!(sink.events().is_empty());
        let stored = state.audit().list_for_subject("TKT-9").await.expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_type, "ticket.created");

        state.db_pool.close().await;
    }
}
