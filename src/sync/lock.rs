//! Named, expiring locks shared across processes.

// crates.io
use uuid::Uuid;
// self
use crate::{_prelude::*, sync::SyncFuture};

/// Set-if-absent lock primitive with a TTL.
///
/// An expired lock may be taken over by the next caller, and only the holder of the lease's
/// token can release it.
pub trait LockStore
where
	Self: Send + Sync,
{
	/// Takes `name` for `ttl` unless someone else holds it.
	fn try_acquire<'a>(&'a self, name: &'a str, ttl: Duration) -> SyncFuture<'a, Option<LockLease>>;

	/// Releases a lease, returning whether it was still held by its owner.
	fn release<'a>(&'a self, lease: &'a LockLease) -> SyncFuture<'a, bool>;
}

/// Proof of lock ownership.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockLease {
	/// Lock name.
	pub name: String,
	/// Random owner token.
	pub token: String,
	/// Instant the lock expires on its own.
	pub expires_at: OffsetDateTime,
}
impl LockLease {
	/// Creates a lease with a fresh owner token.
	pub fn new(name: impl Into<String>, ttl: Duration, now: OffsetDateTime) -> Self {
		Self { name: name.into(), token: Uuid::new_v4().to_string(), expires_at: now + ttl }
	}

	/// Returns `true` once the TTL elapsed.
	pub fn is_expired(&self, now: OffsetDateTime) -> bool {
		self.expires_at <= now
	}
}
