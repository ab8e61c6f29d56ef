mod common;

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use time::Duration;
use url::Url;
// self
use common::*;
use oauth2_keeper::{
	auth::{Grant, GrantStatus, TokenSecret},
	config::ClientCredentials,
	error::{ProviderError, TokenError},
	flows::Integrations,
	oauth::{ReqwestProviderApi, ReqwestTransportErrorMapper},
	provider::{
		ClientAuthMethod, DefaultProviderStrategy, ProviderApi, ProviderDescriptor,
		ProviderDescriptorBuilder,
	},
	store::{GrantStore, MemoryStore},
};

fn descriptor(server: &MockServer) -> ProviderDescriptorBuilder {
	let url = |path: &str| Url::parse(&server.url(path)).expect("Mock endpoint should parse.");

	ProviderDescriptor::builder(provider_id())
		.authorization_endpoint(url("/authorize"))
		.token_endpoint(url("/token"))
		.tenants_endpoint(url("/connections"))
		.api_base(url("/api.xro/2.0/"))
		.scopes(["offline_access", "accounting.transactions"])
		.preferred_client_auth_method(ClientAuthMethod::ClientSecretBasic)
}

fn api(descriptor: ProviderDescriptor) -> ReqwestProviderApi {
	let credentials = ClientCredentials {
		client_id: "client-id".into(),
		client_secret: TokenSecret::new("client-secret"),
		redirect_uri: Url::parse("https://app.example.com/integrations/callback")
			.expect("Redirect URI fixture should parse."),
	};

	ReqwestProviderApi::with_http_client(
		descriptor,
		Arc::new(DefaultProviderStrategy),
		credentials,
		test_reqwest_http_client(),
		ReqwestTransportErrorMapper,
	)
	.expect("Provider API should build.")
}

#[tokio::test]
async fn refresh_returns_rotated_tokens() {
	let server = MockServer::start_async().await;
	let api = api(descriptor(&server).build().expect("Descriptor should build."));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(
					"{\"access_token\":\"access-new\",\"refresh_token\":\"refresh-new\",\"token_type\":\"bearer\",\"expires_in\":1800}",
				);
		})
		.await;
	let issued = api
		.refresh_tokens(&TokenSecret::new("refresh-old"))
		.await
		.expect("Refresh should succeed.");

	mock.assert_async().await;

	assert_eq!(issued.access_token.expose(), "access-new");
	assert_eq!(issued.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-new"));
	assert_eq!(issued.expires_in, Duration::minutes(30));
}

#[tokio::test]
async fn token_endpoint_failures_are_classified() {
	let server = MockServer::start_async().await;
	let api = api(descriptor(&server).build().expect("Descriptor should build."));
	let mut rejected = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;
	let err = api
		.refresh_tokens(&TokenSecret::new("refresh-old"))
		.await
		.expect_err("A rejected refresh token should fail.");

	assert!(matches!(err, ProviderError::InvalidGrant { .. }));

	rejected.delete_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(429)
				.header("content-type", "application/json")
				.header("retry-after", "30")
				.body("{\"error\":\"rate_limit_exceeded\"}");
		})
		.await;

	let err = api
		.refresh_tokens(&TokenSecret::new("refresh-old"))
		.await
		.expect_err("A throttled refresh should fail.");

	assert!(matches!(
		err,
		ProviderError::RateLimited { retry_after: Some(delay) } if delay == Duration::seconds(30)
	));
	assert!(err.is_transient());
}

#[tokio::test]
async fn revocation_posts_the_refresh_token() {
	let server = MockServer::start_async().await;
	let revocation = Url::parse(&server.url("/revoke")).expect("Mock endpoint should parse.");
	let api = api(
		descriptor(&server)
			.revocation_endpoint(revocation)
			.build()
			.expect("Descriptor should build."),
	);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/revoke")
				.header_exists("authorization")
				.body("token=refresh-1&token_type_hint=refresh_token");
			then.status(200);
		})
		.await;

	api.revoke_refresh_token(&TokenSecret::new("refresh-1"))
		.await
		.expect("Revocation should succeed.");

	mock.assert_async().await;
}

#[tokio::test]
async fn revocation_without_an_endpoint_is_a_no_op() {
	let server = MockServer::start_async().await;
	let api = api(descriptor(&server).build().expect("Descriptor should build."));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST);
			then.status(500);
		})
		.await;

	api.revoke_refresh_token(&TokenSecret::new("refresh-1"))
		.await
		.expect("Revocation without an endpoint should succeed.");

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn tenants_and_api_calls_carry_the_bearer_token() {
	let server = MockServer::start_async().await;
	let api = api(descriptor(&server).build().expect("Descriptor should build."));
	let tenants_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/connections").header("authorization", "Bearer access-1");
			then.status(200)
				.header("content-type", "application/json")
				.body(
					"[{\"id\":\"c-1\",\"tenantId\":\"tenant-1\",\"tenantType\":\"ORGANISATION\",\"tenantName\":\"Demo Company\"}]",
				);
		})
		.await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api.xro/2.0/Invoices")
				.header("authorization", "Bearer access-1")
				.header("xero-tenant-id", "tenant-1");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"Invoices\":[]}");
		})
		.await;
	let token = TokenSecret::new("access-1");
	let tenants = api.list_tenants(&token).await.expect("Tenant listing should succeed.");

	assert_eq!(tenants.len(), 1);
	assert_eq!(&*tenants[0].id, "tenant-1");
	assert_eq!(tenants[0].name, "Demo Company");
	assert_eq!(tenants[0].kind.as_deref(), Some("ORGANISATION"));

	let body = api
		.get_json(&token, &tenant("tenant-1"), "/Invoices")
		.await
		.expect("API call should work.");

	assert_eq!(body, serde_json::json!({ "Invoices": [] }));

	tenants_mock.assert_async().await;
	api_mock.assert_async().await;
}

#[tokio::test]
async fn rejected_access_tokens_surface_as_unauthorized() {
	let server = MockServer::start_async().await;
	let api = api(descriptor(&server).build().expect("Descriptor should build."));

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api.xro/2.0/Invoices");
			then.status(401).body("{\"Title\":\"Unauthorized\"}");
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api.xro/2.0/Accounts");
			then.status(403).body("{\"Title\":\"Forbidden\"}");
		})
		.await;

	let token = TokenSecret::new("access-stale");
	let tenant = tenant("tenant-1");

	assert!(matches!(
		api.get_json(&token, &tenant, "Invoices").await,
		Err(ProviderError::Unauthorized { status: 401 })
	));
	assert!(matches!(
		api.get_json(&token, &tenant, "Accounts").await,
		Err(ProviderError::InsufficientScope { .. })
	));
}

#[tokio::test]
async fn invalid_grant_over_http_revokes_the_stored_grant() {
	let server = MockServer::start_async().await;
	let store = Arc::new(MemoryStore::default());
	let integrations = Integrations::new(
		store.clone(),
		Arc::new(api(descriptor(&server).build().expect("Descriptor should build."))),
		codec(),
		signer(),
		Url::parse("https://app.example.com/integrations/select")
			.expect("Tenant selection URL fixture should parse."),
	);
	let grant = Grant::builder(org("org-1"), user(), provider_id())
		.encrypted_access_token(
			codec().encrypt(ACCESS_TOKEN).expect("Access token should encrypt."),
		)
		.encrypted_refresh_token(
			codec().encrypt(REFRESH_TOKEN).expect("Refresh token should encrypt."),
		)
		.expires_in(Duration::minutes(1))
		.build()
		.expect("Grant fixture should build.");

	store.insert_grant(grant.clone()).await.expect("Grant insert should succeed.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"refresh token expired\"}");
		})
		.await;
	let err = integrations
		.refresh_grant(&grant.id, false)
		.await
		.expect_err("A rejected refresh token should fail the refresh.");

	mock.assert_async().await;

	assert!(err.as_token_error().is_some_and(TokenError::is_revoked));
	let stored = store
		.fetch_grant(&grant.id)
		.await
		.expect("Grant fetch should succeed.")
		.expect("Grant should exist.");

	assert_eq!(stored.status, GrantStatus::Revoked);
}
