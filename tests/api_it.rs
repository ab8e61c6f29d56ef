#![cfg(feature = "server")]

mod common;

// std
use std::sync::Arc;
// crates.io
use axum::{
	Router,
	body::{Body, to_bytes},
	http::{Request, Response, StatusCode, header},
};
use serde_json::Value;
use time::Duration;
use tower::ServiceExt;
// self
use common::*;
use oauth2_keeper::{
	api::{ApiState, IdentityFuture, IdentityResolver, router},
	auth::{Caller, OrgRole, TokenSecret},
	error::AuthError,
	flows::AuthorizedClient,
	sync::{
		HandlerFuture, MemoryQueue, SIGNATURE_HEADER, SyncJob, SyncJobHandler, SyncQueue,
		SyncWorker, WebhookVerifier,
	},
};

const CRON_SECRET: &str = "cron-secret";
const WEBHOOK_KEY: &str = "webhook-key";

/// Reads the caller from `x-org` and `x-role` headers.
struct HeaderIdentity;
impl IdentityResolver for HeaderIdentity {
	fn resolve<'a>(&'a self, headers: &'a axum::http::HeaderMap) -> IdentityFuture<'a> {
		Box::pin(async move {
			let value = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
			let org = value("x-org").ok_or(AuthError::Unauthenticated)?;
			let role = match value("x-role") {
				Some("admin") => OrgRole::Admin,
				_ => OrgRole::Member,
			};

			Ok(Caller::new(common::org(org), user(), role))
		})
	}
}

struct NoopHandler;
impl SyncJobHandler for NoopHandler {
	fn handle<'a>(&'a self, _: &'a SyncJob, _: &'a AuthorizedClient) -> HandlerFuture<'a> {
		Box::pin(async { Ok(()) })
	}
}

fn app(harness: &Harness, queue: &Arc<MemoryQueue>) -> Router {
	let worker = SyncWorker::new(
		harness.integrations.clone(),
		queue.clone(),
		queue.clone(),
		Arc::new(NoopHandler),
	);
	let state = ApiState::new(harness.integrations.clone(), worker, Arc::new(HeaderIdentity))
		.with_webhook(WebhookVerifier::new(WEBHOOK_KEY).expect("Verifier fixture should build."))
		.with_cron_secret(TokenSecret::new(CRON_SECRET));

	router(state)
}

fn get(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
	let mut request = Request::builder().method("GET").uri(uri);

	for (name, value) in headers {
		request = request.header(*name, *value);
	}

	request.body(Body::empty()).expect("Request fixture should build.")
}

async fn json(response: Response<Body>) -> Value {
	let bytes =
		to_bytes(response.into_body(), usize::MAX).await.expect("Response body should be read.");

	serde_json::from_slice(&bytes).expect("Response body should be JSON.")
}

#[tokio::test]
async fn connect_redirects_admins_to_the_consent_page() {
	let harness = Harness::new(FakeProvider::new());
	let queue = Arc::new(MemoryQueue::default());
	let response = app(&harness, &queue)
		.oneshot(get("/integrations/connect", &[("x-org", "org-1"), ("x-role", "admin")]))
		.await
		.expect("Router should answer.");

	assert_eq!(response.status(), StatusCode::FOUND);

	let location = response
		.headers()
		.get(header::LOCATION)
		.and_then(|value| value.to_str().ok())
		.expect("Redirect should carry a location.");

	assert!(location.starts_with("https://login.example.com/authorize?state="));

	let anonymous = app(&harness, &queue)
		.oneshot(get("/integrations/connect", &[]))
		.await
		.expect("Router should answer.");

	assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
	assert_eq!(json(anonymous).await["error"]["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn callback_with_a_forged_state_is_rejected() {
	let harness = Harness::new(FakeProvider::new());
	let queue = Arc::new(MemoryQueue::default());
	let response = app(&harness, &queue)
		.oneshot(get("/integrations/callback?code=abc&state=forged.state", &[]))
		.await
		.expect("Router should answer.");

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(json(response).await["error"]["code"], "INVALID_STATE");
}

#[tokio::test]
async fn status_never_exposes_token_material() {
	let harness = Harness::new(FakeProvider::new());
	let queue = Arc::new(MemoryQueue::default());
	let grant = harness.seed_grant(&org("org-1"), Duration::hours(1)).await;

	harness.seed_binding(&grant, "tenant-1").await;

	let response = app(&harness, &queue)
		.oneshot(get("/integrations/status", &[("x-org", "org-1")]))
		.await
		.expect("Router should answer.");

	assert_eq!(response.status(), StatusCode::OK);

	let body = json(response).await;
	let text = body.to_string();

	assert_eq!(body["connected"], true);
	assert_eq!(body["bindings"].as_array().map(Vec::len), Some(1));
	assert!(!text.contains(&grant.encrypted_access_token));
	assert!(!text.contains(&grant.encrypted_refresh_token));
	assert!(!text.contains(ACCESS_TOKEN));
	assert!(!text.contains(REFRESH_TOKEN));
}

#[tokio::test]
async fn cron_endpoints_require_the_shared_secret() {
	let harness = Harness::new(FakeProvider::new());
	let queue = Arc::new(MemoryQueue::default());
	let missing = app(&harness, &queue)
		.oneshot(get("/integrations/keep-alive", &[]))
		.await
		.expect("Router should answer.");

	assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

	let wrong = app(&harness, &queue)
		.oneshot(get("/integrations/sync/process", &[("authorization", "Bearer nope")]))
		.await
		.expect("Router should answer.");

	assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

	let bearer = format!("Bearer {CRON_SECRET}");
	let keep_alive = app(&harness, &queue)
		.oneshot(get("/integrations/keep-alive", &[("authorization", &bearer)]))
		.await
		.expect("Router should answer.");

	assert_eq!(keep_alive.status(), StatusCode::OK);

	let body = json(keep_alive).await;

	assert_eq!(body["checked"], 0);
	assert_eq!(body["revocations"]["attempted"], 0);

	let sync = app(&harness, &queue)
		.oneshot(get("/integrations/sync/process", &[("authorization", &bearer)]))
		.await
		.expect("Router should answer.");

	assert_eq!(sync.status(), StatusCode::OK);
	assert_eq!(json(sync).await["status"], "completed");
}

#[tokio::test]
async fn webhook_deliveries_are_verified_before_enqueueing() {
	let harness = Harness::new(FakeProvider::new());
	let queue = Arc::new(MemoryQueue::default());
	let grant = harness.seed_grant(&org("org-1"), Duration::hours(1)).await;

	harness.seed_binding(&grant, "tenant-1").await;

	let payload = br#"{"events":[{"resourceId":"inv-1","eventDateUtc":"2025-01-01T00:00:00.000","eventType":"UPDATE","eventCategory":"INVOICE","tenantId":"tenant-1"}],"firstEventSequence":1,"lastEventSequence":1}"#;
	let post = |signature: &str| {
		Request::builder()
			.method("POST")
			.uri("/integrations/webhook")
			.header(SIGNATURE_HEADER, signature)
			.body(Body::from(payload.to_vec()))
			.expect("Request fixture should build.")
	};
	let forged = app(&harness, &queue)
		.oneshot(post("bm90LWEtc2lnbmF0dXJl"))
		.await
		.expect("Router should answer.");

	assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
	assert!(queue.is_empty().await.expect("Length should be readable."));

	let signature = WebhookVerifier::new(WEBHOOK_KEY)
		.expect("Verifier fixture should build.")
		.sign(payload)
		.expect("Signing should succeed.");
	let accepted =
		app(&harness, &queue).oneshot(post(&signature)).await.expect("Router should answer.");

	assert_eq!(accepted.status(), StatusCode::OK);
	assert_eq!(json(accepted).await["enqueued"], 1);

	let job = queue.dequeue().await.expect("Dequeue should succeed.").expect("Job expected.");

	assert_eq!(job.attempts, 0);
}
