//! Token service handing out authorized provider clients for tenant bindings.

// self
use crate::{
	_prelude::*,
	auth::{ExternalTenantId, GrantId, OrganizationId, ProviderId, TenantBindingId, TokenSecret},
	error::TokenError,
	flows::Integrations,
	obs::{self, FlowKind},
	provider::ProviderApi,
};

/// Provider client bound to one tenant and carrying a usable access token.
#[derive(Clone)]
pub struct AuthorizedClient {
	/// Grant the access token was issued for.
	pub grant_id: GrantId,
	/// Binding the client was requested for.
	pub binding_id: TenantBindingId,
	/// Provider-side tenant every request is scoped to.
	pub external_tenant_id: ExternalTenantId,
	/// Provider hosting the tenant.
	pub provider_id: ProviderId,
	/// Access token expiry.
	pub expires_at: OffsetDateTime,
	access_token: TokenSecret,
	provider: Arc<dyn ProviderApi>,
}
impl AuthorizedClient {
	/// Value for the `Authorization` header.
	pub fn bearer_header(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}

	/// Access token, for callers that issue requests themselves.
	pub fn access_token(&self) -> &TokenSecret {
		&self.access_token
	}

	/// Issues a tenant-scoped `GET` against the provider API.
	///
	/// A rejected access token surfaces as [`TokenError::Unauthorized`], which
	/// [`with_token_refresh_retry`](Integrations::with_token_refresh_retry) recovers from once.
	pub async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
		Ok(self.provider.get_json(&self.access_token, &self.external_tenant_id, path).await?)
	}
}
impl Debug for AuthorizedClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizedClient")
			.field("grant_id", &self.grant_id)
			.field("binding_id", &self.binding_id)
			.field("external_tenant_id", &self.external_tenant_id)
			.field("provider_id", &self.provider_id)
			.field("expires_at", &self.expires_at)
			.field("access_token", &self.access_token)
			.finish()
	}
}

impl Integrations {
	/// Returns a client for an active binding of `org`.
	///
	/// Tokens expiring within the refresh margin, or every token when `force_refresh` is set,
	/// are refreshed through the single-flight first. A binding of another organization is
	/// reported as missing; a disconnected binding or revoked grant requires a reconnect.
	pub async fn client_for_tenant_binding(
		&self,
		binding_id: &TenantBindingId,
		org: &OrganizationId,
		force_refresh: bool,
	) -> Result<AuthorizedClient> {
		obs::observe(FlowKind::Refresh, "client_for_tenant_binding", async {
			let binding = self.owned_binding(org, binding_id).await?;

			if !binding.is_active() {
				return Err(TokenError::Unauthorized { status: 401 }.into());
			}

			let grant = self.active_grant(&binding.active_grant_id).await?;
			let now = OffsetDateTime::now_utc();
			let due = force_refresh || grant.expires_within(self.options.refresh_margin, now);
			let tokens = if due {
				self.refresh_grant(&grant.id, true).await?
			} else {
				self.current_tokens(&grant)?
			};

			self.store.touch_grant(&grant.id, now).await?;

			Ok(AuthorizedClient {
				grant_id: tokens.grant_id,
				binding_id: binding.id,
				external_tenant_id: binding.external_tenant_id,
				provider_id: binding.provider,
				expires_at: tokens.expires_at,
				access_token: tokens.access_token,
				provider: Arc::clone(&self.provider),
			})
		})
		.await
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{Grant, TenantBinding, UserId},
		crypto::{SecretCodec, StateSigner},
		error::ProviderError,
		provider::{IssuedTokens, ProviderFuture, ProviderTenant},
		store::{GrantStore, MemoryStore},
	};

	struct StaticProvider(ProviderId);
	impl ProviderApi for StaticProvider {
		fn provider_id(&self) -> &ProviderId {
			&self.0
		}

		fn authorize_url(&self, _state: &str) -> Result<Url, ProviderError> {
			Url::parse("https://login.example.com/authorize")
				.map_err(|e| ProviderError::Upstream { status: None, message: e.to_string() })
		}

		fn exchange_code<'a>(&'a self, _code: &'a str) -> ProviderFuture<'a, IssuedTokens> {
			Box::pin(async {
				Err(ProviderError::Upstream { status: None, message: "unused".into() })
			})
		}

		fn refresh_tokens<'a>(
			&'a self,
			_refresh_token: &'a TokenSecret,
		) -> ProviderFuture<'a, IssuedTokens> {
			Box::pin(async {
				Ok(IssuedTokens {
					access_token: TokenSecret::new("access-refreshed"),
					refresh_token: None,
					expires_in: Duration::minutes(30),
				})
			})
		}

		fn revoke_refresh_token<'a>(
			&'a self,
			_refresh_token: &'a TokenSecret,
		) -> ProviderFuture<'a, ()> {
			Box::pin(async { Ok(()) })
		}

		fn list_tenants<'a>(
			&'a self,
			_access_token: &'a TokenSecret,
		) -> ProviderFuture<'a, Vec<ProviderTenant>> {
			Box::pin(async { Ok(Vec::new()) })
		}

		fn get_json<'a>(
			&'a self,
			_access_token: &'a TokenSecret,
			_tenant: &'a ExternalTenantId,
			_path: &'a str,
		) -> ProviderFuture<'a, serde_json::Value> {
			Box::pin(async { Ok(serde_json::Value::Null) })
		}
	}

	async fn setup(expires_in: Duration) -> (Integrations, TenantBinding) {
		let codec = SecretCodec::new(&[7; 32]).expect("Codec fixture should be valid.");
		let provider = ProviderId::new("xero").expect("Provider fixture should be valid.");
		let org = OrganizationId::new("org-1").expect("Organization fixture should be valid.");
		let user = UserId::new("user-1").expect("User fixture should be valid.");
		let store = Arc::new(MemoryStore::default());
		let grant = Grant::builder(org.clone(), user, provider.clone())
			.encrypted_access_token(
				codec.encrypt("access-current").expect("Encrypt should work."),
			)
			.encrypted_refresh_token(
				codec.encrypt("refresh-current").expect("Encrypt should work."),
			)
			.expires_in(expires_in)
			.build()
			.expect("Grant fixture should build.");
		let binding = TenantBinding::new(
			org,
			provider.clone(),
			ExternalTenantId::new("tenant-1").expect("Tenant fixture should be valid."),
			"Demo Company",
			grant.id.clone(),
			OffsetDateTime::now_utc(),
		);

		store.insert_grant(grant).await.expect("Grant insert should succeed.");

		let binding =
			store.upsert_binding(binding).await.expect("Binding upsert should succeed.").binding;
		let integrations = Integrations::new(
			store,
			Arc::new(StaticProvider(provider)),
			codec,
			StateSigner::new("state-secret").expect("Signer fixture should be valid."),
			Url::parse("https://app.example.com/select").expect("URL fixture should parse."),
		);

		(integrations, binding)
	}

	#[tokio::test]
	async fn fresh_tokens_are_used_without_refresh() {
		let (integrations, binding) = setup(Duration::hours(1)).await;
		let client = integrations
			.client_for_tenant_binding(&binding.id, &binding.organization_id, false)
			.await
			.expect("Client should be issued for a fresh grant.");

		assert_eq!(client.bearer_header(), "Bearer access-current");
		assert_eq!(integrations.refresh_metrics.attempts(), 0);
		assert!(!format!("{client:?}").contains("access-current"));

		let grant = integrations
			.store()
			.fetch_grant(&client.grant_id)
			.await
			.expect("Grant fetch should succeed.")
			.expect("Grant should exist.");

		assert!(grant.last_used_at.is_some());
	}

	#[tokio::test]
	async fn tokens_inside_the_margin_are_refreshed() {
		let (integrations, binding) = setup(Duration::minutes(2)).await;
		let client = integrations
			.client_for_tenant_binding(&binding.id, &binding.organization_id, false)
			.await
			.expect("Client should be issued after a refresh.");

		assert_eq!(client.access_token().expose(), "access-refreshed");
		assert_eq!(integrations.refresh_metrics.attempts(), 1);
		assert_eq!(integrations.refresh_metrics.successes(), 1);
	}

	#[tokio::test]
	async fn other_organizations_see_not_found() {
		let (integrations, binding) = setup(Duration::hours(1)).await;
		let stranger = OrganizationId::new("org-2").expect("Organization fixture should be valid.");
		let err = integrations
			.client_for_tenant_binding(&binding.id, &stranger, false)
			.await
			.expect_err("Foreign organizations must not reach the binding.");

		assert_eq!(err.code(), "NOT_FOUND");
	}
}
