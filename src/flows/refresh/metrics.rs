// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-facade refresh counters, readable without a metrics recorder.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
	joined: AtomicU64,
	revoked: AtomicU64,
}
impl RefreshMetrics {
	/// Refreshes that reached the provider.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Refreshes that persisted rotated tokens.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Refreshes that failed, revoked grants included.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Callers that attached to a refresh already in flight instead of starting one.
	pub fn joined(&self) -> u64 {
		self.joined.load(Ordering::Relaxed)
	}

	/// Grants revoked because the provider rejected their refresh token.
	pub fn revoked(&self) -> u64 {
		self.revoked.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		Self::bump(&self.attempts);
	}

	pub(crate) fn record_success(&self) {
		Self::bump(&self.successes);
	}

	pub(crate) fn record_failure(&self) {
		Self::bump(&self.failures);
	}

	pub(crate) fn record_joined(&self) {
		Self::bump(&self.joined);
	}

	pub(crate) fn record_revoked(&self) {
		Self::bump(&self.revoked);
	}

	fn bump(counter: &AtomicU64) {
		counter.fetch_add(1, Ordering::Relaxed);
	}
}
