//! The boundary flows call to reach the provider.

// self
use crate::{
	_prelude::*,
	auth::{ExternalTenantId, ProviderId, TokenSecret},
	error::ProviderError,
};

/// Boxed future returned by every [`ProviderApi`] method.
pub type ProviderFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, ProviderError>> + 'a + Send>>;

/// Provider operations used by the connect, token, disconnect, and sync paths.
///
/// Failures are already classified; flows decide what a classification means for the grant
/// (for example an [`ProviderError::InvalidGrant`] on refresh revokes it).
pub trait ProviderApi
where
	Self: Send + Sync,
{
	/// Identifier of the provider this API talks to.
	fn provider_id(&self) -> &ProviderId;

	/// Builds the consent URL carrying `state`.
	fn authorize_url(&self, state: &str) -> Result<Url, ProviderError>;

	/// Exchanges an authorization code for tokens.
	fn exchange_code<'a>(&'a self, code: &'a str) -> ProviderFuture<'a, IssuedTokens>;

	/// Redeems a refresh token.
	fn refresh_tokens<'a>(
		&'a self,
		refresh_token: &'a TokenSecret,
	) -> ProviderFuture<'a, IssuedTokens>;

	/// Revokes a refresh token upstream. Providers without a revocation endpoint succeed
	/// without a call.
	fn revoke_refresh_token<'a>(&'a self, refresh_token: &'a TokenSecret) -> ProviderFuture<'a, ()>;

	/// Lists the tenants reachable with `access_token`.
	fn list_tenants<'a>(
		&'a self,
		access_token: &'a TokenSecret,
	) -> ProviderFuture<'a, Vec<ProviderTenant>>;

	/// Issues a tenant-scoped `GET` against the API base and returns the JSON body.
	fn get_json<'a>(
		&'a self,
		access_token: &'a TokenSecret,
		tenant: &'a ExternalTenantId,
		path: &'a str,
	) -> ProviderFuture<'a, serde_json::Value>;
}

/// Tokens returned by a code exchange or refresh.
#[derive(Clone, Debug)]
pub struct IssuedTokens {
	/// New access token.
	pub access_token: TokenSecret,
	/// Rotated refresh token; `None` means the previous one stays valid.
	pub refresh_token: Option<TokenSecret>,
	/// Access token lifetime.
	pub expires_in: Duration,
}
impl IssuedTokens {
	/// Absolute expiry relative to `now`, clamped to the largest representable instant.
	pub fn expires_at(&self, now: OffsetDateTime) -> OffsetDateTime {
		now.saturating_add(self.expires_in)
	}
}

/// A tenant (organization) the provider exposes to a grant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTenant {
	/// Provider-side tenant identifier.
	#[serde(rename = "tenantId")]
	pub id: ExternalTenantId,
	/// Display name.
	#[serde(rename = "tenantName")]
	pub name: String,
	/// Provider-specific tenant type (for example `ORGANISATION`).
	#[serde(rename = "tenantType", default)]
	pub kind: Option<String>,
}
