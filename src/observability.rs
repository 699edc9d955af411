use std::net::SocketAddr;

// ── Scheduling counters ─────────────────────────────────────────

/// Counter: assignments created.
pub const ASSIGNMENTS_CREATED_TOTAL: &str = "crewplan_assignments_created_total";

/// Counter: assignment days written (created or overwritten).
pub const DAYS_WRITTEN_TOTAL: &str = "crewplan_days_written_total";

/// Counter: day entries rejected by add/move. Labels: reason.
pub const DAYS_REJECTED_TOTAL: &str = "crewplan_days_rejected_total";

/// Counter: booking conflicts recorded.
pub const CONFLICTS_DETECTED_TOTAL: &str = "crewplan_conflicts_detected_total";

/// Counter: booking conflicts overridden by an operator.
pub const CONFLICTS_RESOLVED_TOTAL: &str = "crewplan_conflicts_resolved_total";

/// Counter: booking status changes. Labels: from, to.
pub const STATUS_TRANSITIONS_TOTAL: &str = "crewplan_status_transitions_total";

/// Counter: confirmation requests created.
pub const CONFIRMATIONS_CREATED_TOTAL: &str = "crewplan_confirmations_created_total";

/// Counter: notifications handed to the hub. Labels: template.
pub const NOTIFICATIONS_SENT_TOTAL: &str = "crewplan_notifications_sent_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "crewplan_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "crewplan_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), String> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

pub(crate) fn record_transition(from: crate::model::BookingStatus, to: crate::model::BookingStatus) {
    metrics::counter!(STATUS_TRANSITIONS_TOTAL, "from" => from.as_str(), "to" => to.as_str())
        .increment(1);
}
