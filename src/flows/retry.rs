//! Single retry around provider calls whose access token was rejected.

// self
use crate::{
	_prelude::*,
	auth::{OrganizationId, TenantBindingId},
	error::TokenError,
	flows::{AuthorizedClient, Integrations},
};

impl Integrations {
	/// Runs `operation` with a client for the binding, recovering once from a rejected token.
	///
	/// When `operation` fails with a 401 [`TokenError::Unauthorized`], the token is force
	/// refreshed and `operation` runs exactly once more; that attempt's outcome is returned
	/// either way. Scope denials and every other failure propagate untouched.
	pub async fn with_token_refresh_retry<T, F, Fut>(
		&self,
		binding_id: &TenantBindingId,
		org: &OrganizationId,
		mut operation: F,
	) -> Result<T>
	where
		F: FnMut(AuthorizedClient) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let client = self.client_for_tenant_binding(binding_id, org, false).await?;

		match operation(client).await {
			Err(Error::Token(TokenError::Unauthorized { status: 401 })) => {
				tracing::info!(binding_id = %binding_id, "Access token rejected; refreshing once.");

				let client = self.client_for_tenant_binding(binding_id, org, true).await?;

				operation(client).await
			},
			outcome => outcome,
		}
	}
}
