// self
use crate::obs::{FlowKind, FlowOutcome};

/// What happened to one sync job within a worker run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobOutcome {
	/// Handler returned `Ok`.
	Succeeded,
	/// Failed and went back to the queue.
	Requeued,
	/// Failed for the last time.
	DeadLettered,
}
impl JobOutcome {
	/// Returns a stable label suitable for metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			JobOutcome::Succeeded => "succeeded",
			JobOutcome::Requeued => "requeued",
			JobOutcome::DeadLettered => "dead_lettered",
		}
	}
}

/// Increments `oauth2_keeper_flow_total{flow, outcome}` (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"oauth2_keeper_flow_total",
		"flow" => kind.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Increments `oauth2_keeper_sync_jobs_total{outcome}` (when enabled).
pub fn record_job_outcome(outcome: JobOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!("oauth2_keeper_sync_jobs_total", "outcome" => outcome.as_str()).increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = outcome;
}

/// Increments `oauth2_keeper_grants_revoked_total{reason}` (when enabled).
///
/// `reason` is `disconnect` or `invalid_grant`.
pub fn record_grant_revoked(reason: &'static str) {
	#[cfg(feature = "metrics")]
	metrics::counter!("oauth2_keeper_grants_revoked_total", "reason" => reason).increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = reason;
}
