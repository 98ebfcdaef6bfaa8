//! Sinks for [`TelemetryEvent`]s.

use batchpay_core::report::TelemetryEvent;

/// Receives one event per phase entry and one terminal event per attempt.
pub trait TelemetrySink {
    fn record(&self, event: &TelemetryEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&self, _event: &TelemetryEvent) {}
}

/// Forwards events to `tracing` under the `batchpay::telemetry` target.
#[cfg(feature = "tracing")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

#[cfg(feature = "tracing")]
impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: &TelemetryEvent) {
        tracing::info!(
            target: "batchpay::telemetry",
            kind = ?event.kind,
            phase = %event.phase,
            progress = event.progress,
            account_kind = ?event.account_kind,
            fell_back_to_sequential = event.fell_back_to_sequential,
            total_time_ms = ?event.timing.total_time,
            "checkout telemetry"
        );
    }
}
