//! Structured observability hooks for migration run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via [`run_span`]
//! - Emission functions for run start, item completion, run finish and
//!   operation dispatch
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).

use tracing::info;

/// Span scoping every event of one run.
///
/// Attach it with `tracing::Instrument` rather than entering it, so the
/// run future stays `Send`.
///
/// # Example
///
/// ```ignore
/// orchestrator.execute(request).instrument(run_span("3f1c...")).await;
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("vmig.run", run_id = %run_id)
}

/// Emit event: run started with the number of included items.
pub fn emit_run_started(run_id: &str, total_items: usize, destination: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        total_items = total_items,
        destination = %destination,
    );
}

/// Emit event: one item finished.
pub fn emit_item_finished(run_id: &str, item: &str, kind: &str, status: &str) {
    info!(
        event = "item.finished",
        run_id = %run_id,
        item = %item,
        kind = %kind,
        status = %status,
    );
}

/// Emit event: run finished with its final state and counts.
pub fn emit_run_finished(
    run_id: &str,
    state: &str,
    duration_ms: u64,
    succeeded: usize,
    failed: usize,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        state = %state,
        duration_ms = duration_ms,
        succeeded = succeeded,
        failed = failed,
    );
}

/// Emit event: an operation was dispatched to the interpreter.
pub fn emit_dispatch_invoked(operation: &str, convention: &str, exit_code: i32, duration_ms: u64) {
    info!(
        event = "dispatch.invoked",
        operation = %operation,
        convention = %convention,
        exit_code = exit_code,
        duration_ms = duration_ms,
    );
}

/// Emit event: a transport-level dispatch failure (warning level).
pub fn emit_dispatch_failed(operation: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "dispatch.failed", operation = %operation, error = %error);
}
