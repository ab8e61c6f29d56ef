mod common;

// crates.io
use time::Duration;
// self
use common::*;
use oauth2_keeper::{
	auth::{BindingStatus, Grant, GrantStatus},
	crypto::SecretCodec,
	error::CryptoError,
	store::GrantStore,
};

#[tokio::test]
async fn shared_grant_is_revoked_with_its_last_binding() {
	let harness = Harness::new(FakeProvider::new());
	let org = org("org-1");
	let grant = harness.seed_grant(&org, Duration::hours(1)).await;
	let first = harness.seed_binding(&grant, "tenant-1").await;
	let second = harness.seed_binding(&grant, "tenant-2").await;
	let report = harness
		.integrations
		.disconnect(&admin(&org), &first.id)
		.await
		.expect("Disconnecting the first binding should succeed.");

	assert_eq!(report.binding.status, BindingStatus::Revoked);
	assert!(!report.grant_revoked);
	assert!(!report.upstream_revoked);
	assert_eq!(harness.grant(&grant).await.status, GrantStatus::Active);
	assert!(harness.provider.revoked.lock().is_empty());

	let report = harness
		.integrations
		.disconnect(&admin(&org), &second.id)
		.await
		.expect("Disconnecting the last binding should succeed.");

	assert!(report.grant_revoked);
	assert!(report.upstream_revoked);
	assert_eq!(*harness.provider.revoked.lock(), vec![REFRESH_TOKEN.to_owned()]);

	let stored = harness.grant(&grant).await;

	assert_eq!(stored.status, GrantStatus::Revoked);
	assert_eq!(
		harness.codec.decrypt(&stored.encrypted_access_token).err(),
		Some(CryptoError::Decrypt),
	);
	assert_eq!(
		harness.codec.decrypt(&stored.encrypted_refresh_token).err(),
		Some(CryptoError::Decrypt),
	);
	assert!(
		harness
			.store
			.list_pending_revocations()
			.await
			.expect("Outbox listing should succeed.")
			.is_empty()
	);

	let again = harness
		.integrations
		.disconnect(&admin(&org), &second.id)
		.await
		.expect("Repeating a disconnect should be a no-op.");

	assert!(!again.grant_revoked);
	assert_eq!(harness.provider.revoked.lock().len(), 1);
}

#[tokio::test]
async fn disconnected_bindings_no_longer_hand_out_clients() {
	let harness = Harness::new(FakeProvider::new());
	let org = org("org-1");
	let grant = harness.seed_grant(&org, Duration::hours(1)).await;
	let binding = harness.seed_binding(&grant, "tenant-1").await;

	harness
		.integrations
		.disconnect(&admin(&org), &binding.id)
		.await
		.expect("Disconnect should succeed.");

	let err = harness
		.integrations
		.client_for_tenant_binding(&binding.id, &org, false)
		.await
		.expect_err("A disconnected binding must not produce a client.");

	assert_eq!(err.http_status(), 401);
	assert_eq!(err.action(), Some("reconnect"));
}

#[tokio::test]
async fn only_admins_of_the_owning_organization_disconnect() {
	let harness = Harness::new(FakeProvider::new());
	let org = org("org-1");
	let grant = harness.seed_grant(&org, Duration::hours(1)).await;
	let binding = harness.seed_binding(&grant, "tenant-1").await;
	let forbidden = harness
		.integrations
		.disconnect(&member(&org), &binding.id)
		.await
		.expect_err("Members must not disconnect.");

	assert_eq!(forbidden.code(), "FORBIDDEN");
	assert_eq!(forbidden.http_status(), 403);

	let hidden = harness
		.integrations
		.disconnect(&admin(&common::org("org-2")), &binding.id)
		.await
		.expect_err("Other organizations must not see the binding.");

	assert_eq!(hidden.code(), "NOT_FOUND");
	assert_eq!(harness.grant(&grant).await.status, GrantStatus::Active);
}

#[tokio::test]
async fn failed_upstream_revocations_are_reconciled_later() {
	let harness = Harness::new(FakeProvider::new());
	let org = org("org-1");
	let grant = harness.seed_grant(&org, Duration::hours(1)).await;
	let binding = harness.seed_binding(&grant, "tenant-1").await;

	harness.provider.set_revoke_fails(true);

	let report = harness
		.integrations
		.disconnect(&admin(&org), &binding.id)
		.await
		.expect("Disconnect should commit even when the provider is down.");

	assert!(report.grant_revoked);
	assert!(!report.upstream_revoked);
	assert_eq!(harness.grant(&grant).await.status, GrantStatus::Revoked);

	let pending =
		harness.store.list_pending_revocations().await.expect("Outbox listing should succeed.");

	assert_eq!(pending.len(), 1);
	assert_eq!(pending[0].grant_id, grant.id);

	let still_down =
		harness.integrations.reconcile_revocations().await.expect("Sweep should complete.");

	assert_eq!((still_down.attempted, still_down.revoked, still_down.failed), (1, 0, 1));

	harness.provider.set_revoke_fails(false);

	let recovered =
		harness.integrations.reconcile_revocations().await.expect("Sweep should complete.");

	assert_eq!((recovered.attempted, recovered.revoked, recovered.failed), (1, 1, 0));
	assert_eq!(*harness.provider.revoked.lock(), vec![REFRESH_TOKEN.to_owned()]);
	assert!(
		harness
			.store
			.list_pending_revocations()
			.await
			.expect("Outbox listing should succeed.")
			.is_empty()
	);
}

#[tokio::test]
async fn concurrent_disconnects_of_a_shared_grant_revoke_it_once() {
	let harness = Harness::new(FakeProvider::new());
	let org = org("org-1");
	let grant = harness.seed_grant(&org, Duration::hours(1)).await;
	let first = harness.seed_binding(&grant, "tenant-1").await;
	let second = harness.seed_binding(&grant, "tenant-2").await;
	let caller = admin(&org);
	let (left, right) = tokio::join!(
		harness.integrations.disconnect(&caller, &first.id),
		harness.integrations.disconnect(&caller, &second.id),
	);
	let left = left.expect("Disconnecting the first binding should succeed.");
	let right = right.expect("Disconnecting the second binding should succeed.");

	assert_eq!(left.binding.status, BindingStatus::Revoked);
	assert_eq!(right.binding.status, BindingStatus::Revoked);
	assert_eq!([left.grant_revoked, right.grant_revoked].iter().filter(|r| **r).count(), 1);
	assert_eq!(*harness.provider.revoked.lock(), vec![REFRESH_TOKEN.to_owned()]);

	let stored = harness.grant(&grant).await;

	assert_eq!(stored.status, GrantStatus::Revoked);
	assert_eq!(
		harness.codec.decrypt(&stored.encrypted_refresh_token).err(),
		Some(CryptoError::Decrypt),
	);
}

#[tokio::test]
async fn unreadable_outbox_entries_do_not_fail_a_committed_disconnect() {
	let harness = Harness::new(FakeProvider::new());
	let org = org("org-1");
	let foreign = SecretCodec::new(&[9; 32]).expect("Foreign codec fixture should be valid.");
	let grant = Grant::builder(org.clone(), user(), provider_id())
		.encrypted_access_token(
			foreign.encrypt(ACCESS_TOKEN).expect("Access token should encrypt."),
		)
		.encrypted_refresh_token(
			foreign.encrypt(REFRESH_TOKEN).expect("Refresh token should encrypt."),
		)
		.expires_in(Duration::hours(1))
		.build()
		.expect("Grant fixture should build.");

	harness.store.insert_grant(grant.clone()).await.expect("Grant insert should succeed.");

	let binding = harness.seed_binding(&grant, "tenant-1").await;
	let report = harness
		.integrations
		.disconnect(&admin(&org), &binding.id)
		.await
		.expect("The committed disconnect should be reported as a success.");

	assert!(report.grant_revoked);
	assert!(!report.upstream_revoked);
	assert!(harness.provider.revoked.lock().is_empty());
	assert_eq!(harness.grant(&grant).await.status, GrantStatus::Revoked);
	assert_eq!(
		harness
			.store
			.list_pending_revocations()
			.await
			.expect("Outbox listing should succeed.")
			.len(),
		1,
	);
}
