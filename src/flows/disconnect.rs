//! Binding disconnect and the pending-revocation sweep.
//!
//! The store commits the disconnect first (binding revoked, orphaned grant revoked and scrubbed,
//! outbox entry recorded); the upstream revocation runs afterwards. A failed upstream call
//! leaves the outbox entry behind for [`Integrations::reconcile_revocations`].

// self
use crate::{
	_prelude::*,
	auth::{Caller, GrantId, TenantBinding, TenantBindingId},
	crypto::SecretCodec,
	error::CryptoError,
	flows::Integrations,
	obs::{self, FlowKind},
};

/// Result of [`Integrations::disconnect`].
#[derive(Clone, Debug)]
pub struct DisconnectReport {
	/// Binding after the disconnect.
	pub binding: TenantBinding,
	/// Whether the binding's grant lost its last binding and was revoked.
	pub grant_revoked: bool,
	/// Whether the provider confirmed the refresh token revocation.
	pub upstream_revoked: bool,
}

/// Result of [`Integrations::reconcile_revocations`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
	/// Outbox entries examined.
	pub attempted: usize,
	/// Entries the provider confirmed and that were cleared.
	pub revoked: usize,
	/// Entries that stay queued for the next sweep.
	pub failed: usize,
	/// Entries dropped because their token can no longer be opened.
	pub discarded: usize,
}

impl Integrations {
	/// Disconnects one of the caller's organization bindings.
	///
	/// Only owners and admins may disconnect. Repeating the call on a disconnected binding is a
	/// no-op that reports `grant_revoked = false`.
	pub async fn disconnect(
		&self,
		caller: &Caller,
		binding_id: &TenantBindingId,
	) -> Result<DisconnectReport> {
		caller.require_admin()?;

		obs::observe(FlowKind::Disconnect, "disconnect", async {
			let outcome = self
				.store
				.disconnect_binding(
					binding_id,
					&caller.organization_id,
					SecretCodec::scrub,
					OffsetDateTime::now_utc(),
				)
				.await?
				.ok_or_else(|| Error::not_found("tenant binding", binding_id))?;
			let upstream_revoked = match &outcome.revocation {
				Some(pending) => self.revoke_after_commit(pending).await,
				None => false,
			};

			if outcome.grant_revoked {
				obs::record_grant_revoked("disconnect");
			}

			tracing::info!(
				binding_id = %binding_id,
				grant_revoked = outcome.grant_revoked,
				upstream_revoked,
				"Tenant binding disconnected."
			);

			Ok(DisconnectReport {
				binding: outcome.binding,
				grant_revoked: outcome.grant_revoked,
				upstream_revoked,
			})
		})
		.await
	}

	/// Retries every queued upstream revocation.
	///
	/// Entries whose sealed token no longer opens (for example after a key rotation) can never
	/// succeed and are dropped with an error log.
	pub async fn reconcile_revocations(&self) -> Result<ReconcileReport> {
		obs::observe(FlowKind::Reconcile, "reconcile_revocations", async {
			let mut report = ReconcileReport::default();

			for pending in self.store.list_pending_revocations().await? {
				report.attempted += 1;

				match self.revoke_upstream(&pending).await {
					Ok(true) => report.revoked += 1,
					Ok(false) => report.failed += 1,
					Err(Error::Crypto(e)) => {
						self.discard_revocation(&pending.grant_id, e).await?;

						report.discarded += 1;
					},
					Err(e) => return Err(e),
				}
			}

			Ok(report)
		})
		.await
	}

	async fn discard_revocation(&self, grant_id: &GrantId, e: CryptoError) -> Result<()> {
		tracing::error!(grant_id = %grant_id, error = %e, "Pending revocation cannot be opened.");

		Ok(self.store.clear_pending_revocation(grant_id).await?)
	}
}
