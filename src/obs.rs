//! Observability helpers for integration flows.
//!
//! - Every flow runs inside a `tracing` span named `oauth2_keeper.flow` with the `flow` and
//!   `stage` (call site) fields.
//! - Enable `metrics` to increment `oauth2_keeper_flow_total{flow, outcome}` per flow attempt and
//!   result, `oauth2_keeper_sync_jobs_total{outcome}` per processed job, and
//!   `oauth2_keeper_grants_revoked_total{reason}` whenever a grant is revoked.

mod metrics;
mod tracing;

pub use self::{metrics::*, tracing::*};

// self
use crate::_prelude::*;

/// Flow kinds observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authorization URL, callback, and tenant selection.
	Connect,
	/// Token acquisition and refresh.
	Refresh,
	/// Binding disconnect and upstream revocation.
	Disconnect,
	/// Proactive refresh sweep.
	KeepAlive,
	/// Sync worker runs.
	Sync,
	/// Pending revocation retries.
	Reconcile,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Connect => "connect",
			FlowKind::Refresh => "refresh",
			FlowKind::Disconnect => "disconnect",
			FlowKind::KeepAlive => "keep_alive",
			FlowKind::Sync => "sync",
			FlowKind::Reconcile => "reconcile",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside a [`FlowSpan`] and records attempt plus success or failure.
pub(crate) async fn observe<T, E, Fut>(
	kind: FlowKind,
	stage: &'static str,
	fut: Fut,
) -> Result<T, E>
where
	Fut: Future<Output = Result<T, E>>,
{
	record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = FlowSpan::new(kind, stage).wrap(fut).await;

	match &result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => record_flow_outcome(kind, FlowOutcome::Failure),
	}

	result
}
