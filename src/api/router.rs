//! axum router exposing the `/integrations` endpoints.

// crates.io
use axum::{
	Json, Router,
	body::Bytes,
	extract::{Query, State},
	http::{
		HeaderMap, StatusCode,
		header::{AUTHORIZATION, LOCATION},
	},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use subtle::ConstantTimeEq;
// self
use crate::{
	_prelude::*,
	api::{self, ApiError, DisconnectRequest, SelectTenantRequest, TenantsQuery},
	auth::{Caller, TokenSecret},
	error::AuthError,
	flows::{CallbackParams, Integrations},
	sync::{SIGNATURE_HEADER, SyncWorker, WebhookVerifier},
};

/// Boxed future returned by [`IdentityResolver::resolve`].
pub type IdentityFuture<'a> = Pin<Box<dyn Future<Output = Result<Caller, AuthError>> + 'a + Send>>;

/// Resolves the caller triple from request headers (session cookie, bearer token, ...).
pub trait IdentityResolver
where
	Self: Send + Sync,
{
	/// Returns the caller, or [`AuthError::Unauthenticated`] when no identity is present.
	fn resolve<'a>(&'a self, headers: &'a HeaderMap) -> IdentityFuture<'a>;
}

/// Collaborators shared by every route.
#[derive(Clone)]
pub struct ApiState {
	integrations: Integrations,
	worker: SyncWorker,
	identity: Arc<dyn IdentityResolver>,
	webhook: Option<WebhookVerifier>,
	cron_secret: Option<TokenSecret>,
}
impl ApiState {
	/// Creates the state without webhook intake or cron protection.
	pub fn new(
		integrations: Integrations,
		worker: SyncWorker,
		identity: Arc<dyn IdentityResolver>,
	) -> Self {
		Self { integrations, worker, identity, webhook: None, cron_secret: None }
	}

	/// Accepts webhook deliveries signed with this verifier's key.
	pub fn with_webhook(mut self, verifier: WebhookVerifier) -> Self {
		self.webhook = Some(verifier);

		self
	}

	/// Requires `Authorization: Bearer <secret>` on the keep-alive and sync endpoints.
	pub fn with_cron_secret(mut self, secret: TokenSecret) -> Self {
		self.cron_secret = Some(secret);

		self
	}

	async fn caller(&self, headers: &HeaderMap) -> Result<Caller, ApiError> {
		self.identity.resolve(headers).await.map_err(|e| Error::from(e).into())
	}

	fn authorize_cron(&self, headers: &HeaderMap) -> Result<(), ApiError> {
		let Some(secret) = &self.cron_secret else {
			return Ok(());
		};
		let provided = headers
			.get(AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.strip_prefix("Bearer "))
			.unwrap_or_default();

		if bool::from(provided.as_bytes().ct_eq(secret.expose().as_bytes())) {
			Ok(())
		} else {
			Err(Error::from(AuthError::Unauthenticated).into())
		}
	}
}
impl Debug for ApiState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiState")
			.field("integrations", &self.integrations)
			.field("webhook", &self.webhook.is_some())
			.field("cron_secret", &self.cron_secret.is_some())
			.finish()
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

		(status, Json(self.body)).into_response()
	}
}

/// Builds the `/integrations` router.
pub fn router(state: ApiState) -> Router {
	Router::new()
		.route("/integrations/connect", get(connect))
		.route("/integrations/callback", get(callback))
		.route("/integrations/tenants", get(list_tenants).post(select_tenant))
		.route("/integrations/status", get(status))
		.route("/integrations/disconnect", post(disconnect))
		.route("/integrations/keep-alive", get(keep_alive))
		.route("/integrations/sync/process", get(process_sync))
		.route("/integrations/webhook", post(webhook))
		.with_state(state)
}

fn found(url: &Url) -> Response {
	(StatusCode::FOUND, [(LOCATION, url.as_str().to_owned())]).into_response()
}

async fn connect(State(state): State<ApiState>, headers: HeaderMap) -> Result<Response, ApiError> {
	let caller = state.caller(&headers).await?;

	Ok(found(&api::connect(&state.integrations, &caller)?))
}

async fn callback(
	State(state): State<ApiState>,
	Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
	Ok(found(&api::callback(&state.integrations, params).await?))
}

async fn list_tenants(
	State(state): State<ApiState>,
	headers: HeaderMap,
	Query(query): Query<TenantsQuery>,
) -> Result<Response, ApiError> {
	let caller = state.caller(&headers).await?;

	Ok(Json(api::list_tenants(&state.integrations, &caller, query).await?).into_response())
}

async fn select_tenant(
	State(state): State<ApiState>,
	headers: HeaderMap,
	Json(request): Json<SelectTenantRequest>,
) -> Result<Response, ApiError> {
	let caller = state.caller(&headers).await?;

	Ok(Json(api::select_tenant(&state.integrations, &caller, request).await?).into_response())
}

async fn status(State(state): State<ApiState>, headers: HeaderMap) -> Result<Response, ApiError> {
	let caller = state.caller(&headers).await?;

	Ok(Json(api::status(&state.integrations, &caller).await?).into_response())
}

async fn disconnect(
	State(state): State<ApiState>,
	headers: HeaderMap,
	Json(request): Json<DisconnectRequest>,
) -> Result<Response, ApiError> {
	let caller = state.caller(&headers).await?;

	Ok(Json(api::disconnect(&state.integrations, &caller, request).await?).into_response())
}

async fn keep_alive(
	State(state): State<ApiState>,
	headers: HeaderMap,
) -> Result<Response, ApiError> {
	state.authorize_cron(&headers)?;

	Ok(Json(api::keep_alive(&state.integrations).await?).into_response())
}

async fn process_sync(
	State(state): State<ApiState>,
	headers: HeaderMap,
) -> Result<Response, ApiError> {
	state.authorize_cron(&headers)?;

	Ok(Json(api::process_sync(&state.worker).await?).into_response())
}

async fn webhook(
	State(state): State<ApiState>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Response, ApiError> {
	let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
	let response = api::webhook(
		&state.integrations,
		state.webhook.as_ref(),
		state.worker.queue().as_ref(),
		signature,
		&body,
	)
	.await?;

	Ok(Json(response).into_response())
}
