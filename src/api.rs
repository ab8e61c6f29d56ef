//! Framework-agnostic handlers behind the `/integrations` HTTP surface.
//!
//! Each handler takes the collaborators it needs plus the resolved [`Caller`], and returns a
//! serializable response or an [`ApiError`]. Bodies are provider-agnostic camelCase JSON; errors
//! render as `{ "error": { "code", "message", "action"? } }` with the error's HTTP status.
//! Enable `server` for the axum [`router`](router::router).

#[cfg(feature = "server")] pub mod router;

#[cfg(feature = "server")] pub use router::*;

// self
use crate::{
	_prelude::*,
	auth::{Caller, ExternalTenantId, GrantId, TenantBinding, TenantBindingId},
	error::WebhookError,
	flows::{CallbackParams, IntegrationStatus, Integrations, KeepAliveReport, ReconcileReport},
	provider::ProviderTenant,
	sync::{SyncQueue, SyncWorker, WebhookVerifier, WorkerRun},
};

/// Error rendered by every handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiError {
	/// HTTP status code.
	pub status: u16,
	/// JSON body.
	pub body: ErrorBody,
}
impl From<Error> for ApiError {
	fn from(e: Error) -> Self {
		if e.is_operational() {
			tracing::debug!(code = e.code(), error = %e, "Request failed.");
		} else {
			tracing::error!(code = e.code(), error = ?e, "Request failed with an internal error.");
		}

		Self {
			status: e.http_status(),
			body: ErrorBody {
				error: ErrorDetail {
					code: e.code(),
					message: e.safe_message(),
					action: e.action(),
				},
			},
		}
	}
}

/// Error envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
	/// Error details.
	pub error: ErrorDetail,
}

/// Machine-readable error description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
	/// Stable error code.
	pub code: &'static str,
	/// Message safe to show to users.
	pub message: String,
	/// Follow-up the user has to take, such as `reconnect`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub action: Option<&'static str>,
}

/// Query of `GET /integrations/tenants`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantsQuery {
	/// Grant created by the callback.
	pub grant_id: String,
}

/// Body of `GET /integrations/tenants`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantsResponse {
	/// Grant the tenants were listed with.
	pub grant_id: GrantId,
	/// Reachable tenants.
	pub tenants: Vec<TenantView>,
}

/// Provider tenant in API responses.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantView {
	/// Provider-side tenant identifier.
	pub tenant_id: ExternalTenantId,
	/// Display name.
	pub tenant_name: String,
	/// Provider-specific tenant type.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tenant_type: Option<String>,
}
impl From<ProviderTenant> for TenantView {
	fn from(tenant: ProviderTenant) -> Self {
		Self { tenant_id: tenant.id, tenant_name: tenant.name, tenant_type: tenant.kind }
	}
}

/// Body of `POST /integrations/tenants`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectTenantRequest {
	/// Grant created by the callback.
	pub grant_id: String,
	/// Provider-side tenant identifier.
	pub tenant_id: String,
	/// Display name.
	pub tenant_name: String,
}

/// Tenant binding in API responses.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingView {
	/// Binding identifier.
	pub tenant_binding_id: TenantBindingId,
	/// Provider-side tenant identifier.
	pub tenant_id: ExternalTenantId,
	/// Display name.
	pub tenant_name: String,
	/// Lifecycle status.
	pub status: &'static str,
	/// Grant serving the binding.
	pub grant_id: GrantId,
}
impl From<TenantBinding> for BindingView {
	fn from(binding: TenantBinding) -> Self {
		Self {
			tenant_binding_id: binding.id,
			tenant_id: binding.external_tenant_id,
			tenant_name: binding.external_tenant_name,
			status: binding.status.as_str(),
			grant_id: binding.active_grant_id,
		}
	}
}

/// Body of `POST /integrations/disconnect`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectRequest {
	/// Binding to disconnect.
	pub tenant_binding_id: String,
}

/// Response of `POST /integrations/disconnect`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResponse {
	/// Binding after the disconnect.
	pub binding: BindingView,
	/// Whether the grant lost its last binding and was revoked.
	pub grant_revoked: bool,
	/// Whether the provider confirmed the revocation.
	pub upstream_revoked: bool,
}

/// Response of `GET /integrations/keep-alive`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeepAliveResponse {
	/// Refresh sweep outcome.
	#[serde(flatten)]
	pub keep_alive: KeepAliveReport,
	/// Pending revocation sweep outcome.
	pub revocations: ReconcileReport,
}

/// Response of the webhook endpoint.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
	/// Jobs added to the sync queue.
	pub enqueued: usize,
}

/// `GET /integrations/connect`: consent URL for the caller's organization.
pub fn connect(integrations: &Integrations, caller: &Caller) -> Result<Url, ApiError> {
	Ok(integrations.authorization_url(caller)?)
}

/// `GET /integrations/callback`: stores the grant and returns the tenant selection redirect.
pub async fn callback(
	integrations: &Integrations,
	params: CallbackParams,
) -> Result<Url, ApiError> {
	Ok(integrations.complete_authorization(params).await?.redirect)
}

/// `GET /integrations/tenants`: tenants reachable with a fresh grant.
pub async fn list_tenants(
	integrations: &Integrations,
	caller: &Caller,
	query: TenantsQuery,
) -> Result<TenantsResponse, ApiError> {
	let grant_id = GrantId::new(&query.grant_id).map_err(Error::from)?;
	let tenants = integrations.list_tenants(caller, &grant_id).await?;

	Ok(TenantsResponse { grant_id, tenants: tenants.into_iter().map(TenantView::from).collect() })
}

/// `POST /integrations/tenants`: binds a tenant to a grant.
pub async fn select_tenant(
	integrations: &Integrations,
	caller: &Caller,
	request: SelectTenantRequest,
) -> Result<BindingView, ApiError> {
	let grant_id = GrantId::new(&request.grant_id).map_err(Error::from)?;
	let tenant_id = ExternalTenantId::new(&request.tenant_id).map_err(Error::from)?;
	let binding =
		integrations.select_tenant(caller, &grant_id, tenant_id, request.tenant_name).await?;

	Ok(binding.into())
}

/// `GET /integrations/status`: bindings and grants of the caller's organization.
pub async fn status(
	integrations: &Integrations,
	caller: &Caller,
) -> Result<IntegrationStatus, ApiError> {
	Ok(integrations.status(caller).await?)
}

/// `POST /integrations/disconnect`: disconnects a binding.
pub async fn disconnect(
	integrations: &Integrations,
	caller: &Caller,
	request: DisconnectRequest,
) -> Result<DisconnectResponse, ApiError> {
	let binding_id = TenantBindingId::new(&request.tenant_binding_id).map_err(Error::from)?;
	let report = integrations.disconnect(caller, &binding_id).await?;

	Ok(DisconnectResponse {
		binding: report.binding.into(),
		grant_revoked: report.grant_revoked,
		upstream_revoked: report.upstream_revoked,
	})
}

/// `GET /integrations/keep-alive`: refreshes expiring grants and retries pending revocations.
pub async fn keep_alive(integrations: &Integrations) -> Result<KeepAliveResponse, ApiError> {
	let keep_alive = integrations.keep_alive(integrations.options().keep_alive_threshold).await?;
	let revocations = integrations.reconcile_revocations().await?;

	Ok(KeepAliveResponse { keep_alive, revocations })
}

/// `GET /integrations/sync/process`: runs one worker batch.
pub async fn process_sync(worker: &SyncWorker) -> Result<WorkerRun, ApiError> {
	Ok(worker.run_once().await?)
}

/// `POST /integrations/webhook`: verifies a delivery and enqueues its events.
///
/// Deliveries are refused while no webhook key is configured.
pub async fn webhook(
	integrations: &Integrations,
	verifier: Option<&WebhookVerifier>,
	queue: &dyn SyncQueue,
	signature: Option<&str>,
	body: &[u8],
) -> Result<WebhookResponse, ApiError> {
	let verifier = verifier.ok_or(Error::from(WebhookError::InvalidSignature))?;
	let payload = verifier.open(body, signature).map_err(Error::from)?;
	let enqueued = integrations.enqueue_webhook_events(queue, &payload).await?;

	Ok(WebhookResponse { enqueued })
}
