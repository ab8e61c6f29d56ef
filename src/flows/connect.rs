//! Connect flow: consent URL, callback, tenant listing, and tenant selection.
//!
//! The consent URL carries a [`SignedState`] naming the organization and user that started the
//! flow, so the callback can persist the grant without a session. Selecting a tenant binds it to
//! the new grant; a reconnect re-points the existing binding, and a grant left without bindings
//! by that move is revoked like a disconnect would.

// self
use crate::{
	_prelude::*,
	auth::{Caller, ExternalTenantId, Grant, GrantId, OrganizationId, TenantBinding},
	crypto::{SecretCodec, SignedState},
	error::AuthError,
	flows::{Integrations, common},
	obs::{self, FlowKind},
	provider::ProviderTenant,
};

/// Query parameters the provider appends to the redirect URI.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CallbackParams {
	/// Authorization code.
	pub code: Option<String>,
	/// Signed state issued by [`Integrations::authorization_url`].
	pub state: Option<String>,
	/// OAuth error code when consent was not granted.
	pub error: Option<String>,
	/// Human-readable explanation accompanying `error`.
	pub error_description: Option<String>,
}

/// Result of a successful callback.
#[derive(Clone, Debug)]
pub struct CallbackOutcome {
	/// Newly stored grant.
	pub grant_id: GrantId,
	/// Organization the grant belongs to.
	pub organization_id: OrganizationId,
	/// Tenant selection page carrying `grantId`.
	pub redirect: Url,
}

impl Integrations {
	/// Builds the provider consent URL for an admin of the caller's organization.
	pub fn authorization_url(&self, caller: &Caller) -> Result<Url> {
		caller.require_admin()?;

		let payload = SignedState::new(
			caller.organization_id.clone(),
			caller.user_id.clone(),
			OffsetDateTime::now_utc(),
		);
		let state = self.signer.sign(&payload)?;

		Ok(self.provider.authorize_url(&state)?)
	}

	/// Handles the provider redirect: verifies state, exchanges the code, and stores the grant.
	pub async fn complete_authorization(&self, params: CallbackParams) -> Result<CallbackOutcome> {
		obs::observe(FlowKind::Connect, "complete_authorization", async move {
			if let Some(error) = params.error {
				let reason = params.error_description.unwrap_or(error);

				return Err(AuthError::Denied { reason }.into());
			}

			let now = OffsetDateTime::now_utc();
			let state = params
				.state
				.as_deref()
				.and_then(|state| self.signer.verify_fresh(state, self.options.state_max_age, now))
				.ok_or(AuthError::InvalidState)?;
			let code = params
				.code
				.filter(|code| !code.is_empty())
				.ok_or_else(|| Error::validation("Authorization code is missing."))?;
			let issued = self.provider.exchange_code(&code).await?;
			let refresh_token = issued.refresh_token.as_ref().ok_or_else(|| Error::ExternalApi {
				status: None,
				message: "provider did not issue a refresh token".into(),
			})?;
			let grant = Grant::builder(
				state.org_id.clone(),
				state.user_id,
				self.provider.provider_id().clone(),
			)
			.encrypted_access_token(self.codec.encrypt(issued.access_token.expose())?)
			.encrypted_refresh_token(self.codec.encrypt(refresh_token.expose())?)
			.issued_at(now)
			.expires_in(issued.expires_in)
			.build()?;
			let grant_id = grant.id.clone();

			self.store.insert_grant(grant).await?;

			let mut redirect = self.tenant_selection_url.clone();

			redirect.query_pairs_mut().append_pair("grantId", &grant_id);

			tracing::info!(
				grant_id = %grant_id,
				org = %state.org_id,
				"Grant stored after consent."
			);

			Ok(CallbackOutcome { grant_id, organization_id: state.org_id, redirect })
		})
		.await
	}

	/// Lists the tenants reachable with one of the caller's organization grants.
	///
	/// Uses the grant's current access token; the grant is fresh from the callback.
	pub async fn list_tenants(
		&self,
		caller: &Caller,
		grant_id: &GrantId,
	) -> Result<Vec<ProviderTenant>> {
		caller.require_admin()?;

		let grant = self.owned_grant(&caller.organization_id, grant_id).await?;

		common::ensure_active(&grant)?;

		let access_token = self.codec.decrypt(&grant.encrypted_access_token)?;

		Ok(self.provider.list_tenants(&access_token).await?)
	}

	/// Binds an external tenant to one of the caller's organization grants.
	pub async fn select_tenant(
		&self,
		caller: &Caller,
		grant_id: &GrantId,
		external_tenant_id: ExternalTenantId,
		external_tenant_name: impl Into<String>,
	) -> Result<TenantBinding> {
		caller.require_admin()?;

		let external_tenant_name = external_tenant_name.into();

		obs::observe(FlowKind::Connect, "select_tenant", async move {
			let grant = self.owned_grant(&caller.organization_id, grant_id).await?;

			common::ensure_active(&grant)?;

			let now = OffsetDateTime::now_utc();
			let upsert = self
				.store
				.upsert_binding(TenantBinding::new(
					grant.organization_id.clone(),
					grant.provider.clone(),
					external_tenant_id,
					external_tenant_name,
					grant.id.clone(),
					now,
				))
				.await?;

			let previous = upsert.previous_grant_id.filter(|previous| previous != &grant.id);

			if let Some(previous) = previous {
				let orphaned =
					self.store.revoke_orphaned_grant(&previous, SecretCodec::scrub, now).await?;

				if let Some(pending) = orphaned {
					tracing::info!(grant_id = %previous, "Previous grant lost its last binding.");

					self.revoke_after_commit(&pending).await;
				}
			}

			Ok(upsert.binding)
		})
		.await
	}
}
