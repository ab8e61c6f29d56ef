//! Lookups and upstream revocation shared by several flows.

// self
use crate::{
	_prelude::*,
	auth::{Grant, GrantId, OrganizationId, TenantBinding, TenantBindingId},
	error::TokenError,
	flows::Integrations,
	store::PendingRevocation,
};

impl Integrations {
	/// Loads a grant owned by `org`; grants of other organizations look missing.
	pub(crate) async fn owned_grant(
		&self,
		org: &OrganizationId,
		grant_id: &GrantId,
	) -> Result<Grant> {
		self.store
			.fetch_grant(grant_id)
			.await?
			.filter(|grant| &grant.organization_id == org)
			.ok_or_else(|| Error::not_found("grant", grant_id))
	}

	/// Loads a binding owned by `org`; bindings of other organizations look missing.
	pub(crate) async fn owned_binding(
		&self,
		org: &OrganizationId,
		binding_id: &TenantBindingId,
	) -> Result<TenantBinding> {
		self.store
			.fetch_binding(binding_id)
			.await?
			.filter(|binding| &binding.organization_id == org)
			.ok_or_else(|| Error::not_found("tenant binding", binding_id))
	}

	/// Loads a grant that must still be usable.
	pub(crate) async fn active_grant(&self, grant_id: &GrantId) -> Result<Grant> {
		let grant = self
			.store
			.fetch_grant(grant_id)
			.await?
			.ok_or_else(|| TokenError::refresh_revoked(grant_id, "grant no longer exists"))?;

		ensure_active(&grant)?;

		Ok(grant)
	}

	/// Revokes a pending refresh token upstream and clears the outbox entry on success.
	///
	/// Returns whether the provider confirmed the revocation. Failures leave the entry queued for
	/// [`reconcile_revocations`](Integrations::reconcile_revocations).
	pub(crate) async fn revoke_upstream(&self, pending: &PendingRevocation) -> Result<bool> {
		let refresh_token = self.codec.decrypt(&pending.encrypted_refresh_token)?;

		if let Err(e) = self.provider.revoke_refresh_token(&refresh_token).await {
			tracing::warn!(
				grant_id = %pending.grant_id,
				error = %e,
				"Upstream revocation failed; it stays queued."
			);

			return Ok(false);
		}

		self.store.clear_pending_revocation(&pending.grant_id).await?;

		Ok(true)
	}

	/// Best-effort [`revoke_upstream`](Self::revoke_upstream) for a store change that already
	/// committed. Local failures are logged and leave the outbox entry queued.
	pub(crate) async fn revoke_after_commit(&self, pending: &PendingRevocation) -> bool {
		match self.revoke_upstream(pending).await {
			Ok(revoked) => revoked,
			Err(e) => {
				tracing::warn!(
					grant_id = %pending.grant_id,
					error = %e,
					"Upstream revocation skipped; it stays queued."
				);

				false
			},
		}
	}
}

pub(crate) fn ensure_active(grant: &Grant) -> Result<(), TokenError> {
	if grant.is_active() {
		Ok(())
	} else {
		Err(TokenError::refresh_revoked(&grant.id, "grant has been revoked"))
	}
}
