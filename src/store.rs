//! Storage contracts and built-in backends for grants, tenant bindings, and the revocation outbox.

pub mod file;
pub mod memory;
#[cfg(feature = "postgres")] pub mod postgres;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")] pub use postgres::PostgresStore;

// self
use crate::{
	_prelude::*,
	auth::{
		ExternalTenantId, Grant, GrantId, GrantTokenUpdate, OrganizationId, ProviderId,
		TenantBinding, TenantBindingId,
	},
};

/// Boxed future returned by every [`GrantStore`] method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Generator for ciphertext-shaped filler written over revoked secrets.
pub type ScrubFn = fn() -> String;

/// Persistence contract for grants and tenant bindings.
///
/// Implementations keep the credential graph consistent: a binding only ever points at a grant
/// of its own organization, and [`disconnect_binding`](GrantStore::disconnect_binding) runs as a
/// single transaction that locks the grant before deciding whether it became an orphan.
pub trait GrantStore
where
	Self: Send + Sync,
{
	/// Persists a new grant.
	fn insert_grant(&self, grant: Grant) -> StoreFuture<'_, ()>;

	/// Fetches a grant by id.
	fn fetch_grant<'a>(&'a self, id: &'a GrantId) -> StoreFuture<'a, Option<Grant>>;

	/// Lists every grant of an organization, oldest first.
	fn list_grants<'a>(&'a self, org: &'a OrganizationId) -> StoreFuture<'a, Vec<Grant>>;

	/// Lists active grants whose access token expires before `before`.
	fn list_expiring_grants(&self, before: OffsetDateTime) -> StoreFuture<'_, Vec<Grant>>;

	/// Writes refreshed tokens, but only while the grant is still active.
	///
	/// Returns whether the update was applied.
	fn update_grant_tokens<'a>(
		&'a self,
		id: &'a GrantId,
		update: GrantTokenUpdate,
	) -> StoreFuture<'a, bool>;

	/// Marks a grant revoked, returning the updated record.
	fn revoke_grant<'a>(
		&'a self,
		id: &'a GrantId,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<Grant>>;

	/// Stamps `last_used_at`.
	fn touch_grant<'a>(&'a self, id: &'a GrantId, instant: OffsetDateTime) -> StoreFuture<'a, ()>;

	/// Inserts a binding or, on reconnect, re-points and reactivates the existing row for the same
	/// `(organization, provider, external tenant)` while keeping its id.
	///
	/// Fails with [`StoreError::Constraint`] when the grant is missing, inactive, or owned by a
	/// different organization.
	fn upsert_binding(&self, binding: TenantBinding) -> StoreFuture<'_, BindingUpsert>;

	/// Fetches a binding by id.
	fn fetch_binding<'a>(
		&'a self,
		id: &'a TenantBindingId,
	) -> StoreFuture<'a, Option<TenantBinding>>;

	/// Returns the most recently updated active binding of an organization for a provider.
	fn find_active_binding<'a>(
		&'a self,
		org: &'a OrganizationId,
		provider: &'a ProviderId,
	) -> StoreFuture<'a, Option<TenantBinding>>;

	/// Lists the active bindings of an organization.
	fn list_active_bindings<'a>(
		&'a self,
		org: &'a OrganizationId,
	) -> StoreFuture<'a, Vec<TenantBinding>>;

	/// Lists active bindings, across organizations, attached to one external tenant.
	fn find_bindings_by_external_tenant<'a>(
		&'a self,
		provider: &'a ProviderId,
		tenant: &'a ExternalTenantId,
	) -> StoreFuture<'a, Vec<TenantBinding>>;

	/// Disconnects a binding in one transaction.
	///
	/// The binding must belong to `org`; otherwise `None` is returned without revealing whether
	/// it exists elsewhere. The binding is revoked, its grant is locked, and if no other active
	/// binding references the grant, the grant is revoked, a [`PendingRevocation`] holding the
	/// pre-overwrite refresh token is recorded, and both token fields are overwritten with
	/// `scrub` output. Repeating the call on a revoked binding changes nothing.
	fn disconnect_binding<'a>(
		&'a self,
		binding_id: &'a TenantBindingId,
		org: &'a OrganizationId,
		scrub: ScrubFn,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<DisconnectOutcome>>;

	/// Revokes and scrubs an active grant that no active binding references anymore.
	///
	/// Used after a reconnect re-pointed the last binding away from the grant.
	fn revoke_orphaned_grant<'a>(
		&'a self,
		grant_id: &'a GrantId,
		scrub: ScrubFn,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<PendingRevocation>>;

	/// Lists upstream revocations that have not succeeded yet.
	fn list_pending_revocations(&self) -> StoreFuture<'_, Vec<PendingRevocation>>;

	/// Removes a pending revocation once the provider confirmed it.
	fn clear_pending_revocation<'a>(&'a self, grant_id: &'a GrantId) -> StoreFuture<'a, ()>;
}

/// Outbox entry for a refresh token that still has to be revoked upstream.
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingRevocation {
	/// Revoked grant.
	pub grant_id: GrantId,
	/// Refresh token sealed before the grant was scrubbed.
	pub encrypted_refresh_token: String,
	/// When the revocation was queued.
	pub queued_at: OffsetDateTime,
}
impl Debug for PendingRevocation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingRevocation")
			.field("grant_id", &self.grant_id)
			.field("encrypted_refresh_token", &"<redacted>")
			.field("queued_at", &self.queued_at)
			.finish()
	}
}

/// Result of [`GrantStore::disconnect_binding`].
#[derive(Clone, Debug)]
pub struct DisconnectOutcome {
	/// Binding after the disconnect.
	pub binding: TenantBinding,
	/// Whether this call revoked the binding's grant.
	pub grant_revoked: bool,
	/// Upstream revocation to perform once the transaction committed.
	pub revocation: Option<PendingRevocation>,
}

/// Result of [`GrantStore::upsert_binding`].
#[derive(Clone, Debug)]
pub struct BindingUpsert {
	/// Stored binding.
	pub binding: TenantBinding,
	/// Grant the binding pointed at before a reconnect re-pointed it.
	pub previous_grant_id: Option<GrantId>,
}

/// Error type produced by [`GrantStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// A write would break the grant/binding invariants.
	#[error("Constraint violation: {message}.")]
	Constraint {
		/// Human-readable error payload.
		message: String,
	},
}
impl StoreError {
	pub(crate) fn constraint(message: impl Into<String>) -> Self {
		Self::Constraint { message: message.into() }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn pending_revocation_debug_redacts_token() {
		let pending = PendingRevocation {
			grant_id: GrantId::new("grant-1").expect("Grant fixture should be valid."),
			encrypted_refresh_token: "sealed-refresh".into(),
			queued_at: OffsetDateTime::UNIX_EPOCH,
		};

		assert!(!format!("{pending:?}").contains("sealed-refresh"));
	}
}
