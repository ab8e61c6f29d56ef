mod common;

// std
use std::collections::HashMap;
// crates.io
use time::Duration;
// self
use common::*;
use oauth2_keeper::{
	auth::{Caller, GrantId, GrantStatus},
	flows::{CallbackOutcome, CallbackParams, Integrations},
	store::GrantStore,
};

fn state_of(url: &url::Url) -> String {
	url.query_pairs()
		.into_owned()
		.collect::<HashMap<_, _>>()
		.remove("state")
		.expect("Consent URL should carry a state.")
}

async fn connect(integrations: &Integrations, caller: &Caller, code: &str) -> CallbackOutcome {
	let consent = integrations.authorization_url(caller).expect("Admins should get a consent URL.");

	integrations
		.complete_authorization(CallbackParams {
			code: Some(code.into()),
			state: Some(state_of(&consent)),
			..Default::default()
		})
		.await
		.expect("Callback with a valid state should store a grant.")
}

#[tokio::test]
async fn callback_stores_a_sealed_grant_and_redirects_to_tenant_selection() {
	let harness = Harness::new(FakeProvider::new());
	let org = org("org-1");
	let outcome = connect(&harness.integrations, &admin(&org), "abc").await;

	assert_eq!(outcome.organization_id, org);

	let query = outcome.redirect.query_pairs().into_owned().collect::<HashMap<_, _>>();

	assert!(outcome.redirect.as_str().starts_with("https://app.example.com/integrations/select"));
	assert_eq!(query.get("grantId").map(String::as_str), Some(&*outcome.grant_id));

	let grant = harness
		.store
		.fetch_grant(&outcome.grant_id)
		.await
		.expect("Grant fetch should succeed.")
		.expect("Grant should be stored.");

	assert_eq!(grant.organization_id, org);
	assert_eq!(grant.status, GrantStatus::Active);
	assert!(!grant.encrypted_access_token.contains("access-abc"));
	assert_eq!(
		harness
			.codec
			.decrypt(&grant.encrypted_refresh_token)
			.expect("Refresh token should open.")
			.expose(),
		"refresh-abc",
	);
	assert!(grant.expires_at > time::OffsetDateTime::now_utc() + Duration::minutes(25));
}

#[tokio::test]
async fn callback_rejects_forged_state_and_denied_consent() {
	let harness = Harness::new(FakeProvider::new());
	let consent = harness
		.integrations
		.authorization_url(&admin(&org("org-1")))
		.expect("Admins should get a consent URL.");
	let mut forged = state_of(&consent);

	forged.push('x');

	let err = harness
		.integrations
		.complete_authorization(CallbackParams {
			code: Some("abc".into()),
			state: Some(forged),
			..Default::default()
		})
		.await
		.expect_err("A tampered state must be rejected.");

	assert_eq!(err.code(), "INVALID_STATE");
	assert_eq!(err.http_status(), 400);

	let err = harness
		.integrations
		.complete_authorization(CallbackParams {
			error: Some("access_denied".into()),
			error_description: Some("user cancelled".into()),
			..Default::default()
		})
		.await
		.expect_err("Denied consent must not store a grant.");

	assert_eq!(err.code(), "AUTHORIZATION_DENIED");
	assert!(
		harness
			.store
			.list_grants(&org("org-1"))
			.await
			.expect("Grant listing should succeed.")
			.is_empty()
	);
}

#[tokio::test]
async fn members_cannot_start_the_connect_flow() {
	let harness = Harness::new(FakeProvider::new());
	let err = harness
		.integrations
		.authorization_url(&member(&org("org-1")))
		.expect_err("Members must not connect integrations.");

	assert_eq!(err.code(), "FORBIDDEN");
}

#[tokio::test]
async fn tenants_are_listed_and_bound_to_the_new_grant() {
	let harness = Harness::new(FakeProvider::new());
	let org = org("org-1");
	let caller = admin(&org);
	let outcome = connect(&harness.integrations, &caller, "abc").await;
	let tenants = harness
		.integrations
		.list_tenants(&caller, &outcome.grant_id)
		.await
		.expect("Tenants should be listed.");

	assert_eq!(tenants.len(), 2);

	let binding = harness
		.integrations
		.select_tenant(&caller, &outcome.grant_id, tenants[0].id.clone(), tenants[0].name.clone())
		.await
		.expect("Tenant selection should bind the tenant.");

	assert_eq!(binding.organization_id, org);
	assert_eq!(binding.active_grant_id, outcome.grant_id);
	assert_eq!(&*binding.external_tenant_id, "tenant-1");

	let foreign = harness
		.integrations
		.list_tenants(&admin(&common::org("org-2")), &outcome.grant_id)
		.await
		.expect_err("Other organizations must not use the grant.");

	assert_eq!(foreign.code(), "NOT_FOUND");

	let unknown = GrantId::new("missing").expect("Grant fixture should be valid.");
	let missing = harness
		.integrations
		.select_tenant(&caller, &unknown, tenant("tenant-1"), "Demo Company")
		.await
		.expect_err("Unknown grants cannot be bound.");

	assert_eq!(missing.code(), "NOT_FOUND");
}

#[tokio::test]
async fn reconnect_repoints_the_binding_and_revokes_the_orphaned_grant() {
	let harness = Harness::new(FakeProvider::new());
	let org = org("org-1");
	let caller = admin(&org);
	let first = connect(&harness.integrations, &caller, "first").await;
	let original = harness
		.integrations
		.select_tenant(&caller, &first.grant_id, tenant("tenant-1"), "Demo Company")
		.await
		.expect("Initial selection should succeed.");
	let second = connect(&harness.integrations, &caller, "second").await;
	let rebound = harness
		.integrations
		.select_tenant(&caller, &second.grant_id, tenant("tenant-1"), "Demo Company Ltd")
		.await
		.expect("Reconnect selection should succeed.");

	assert_eq!(rebound.id, original.id);
	assert_eq!(rebound.active_grant_id, second.grant_id);
	assert_eq!(rebound.external_tenant_name, "Demo Company Ltd");

	let old = harness
		.store
		.fetch_grant(&first.grant_id)
		.await
		.expect("Grant fetch should succeed.")
		.expect("Old grant should still exist.");

	assert_eq!(old.status, GrantStatus::Revoked);
	assert!(harness.codec.decrypt(&old.encrypted_refresh_token).is_err());
	assert_eq!(*harness.provider.revoked.lock(), vec!["refresh-first".to_owned()]);

	let status = harness.integrations.status(&member(&org)).await.expect("Status should load.");

	assert!(status.connected);
	assert_eq!(status.bindings.len(), 1);
	assert_eq!(status.grants.len(), 2);
}
