mod common;

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use time::Duration;
// self
use common::*;
use oauth2_keeper::{
	error::{Error, TokenError},
	flows::AuthorizedClient,
};

#[tokio::test]
async fn rejected_token_is_refreshed_and_retried_once() {
	let harness = Harness::new(FakeProvider::new());
	let org = org("org-1");
	let grant = harness.seed_grant(&org, Duration::hours(1)).await;
	let binding = harness.seed_binding(&grant, "tenant-1").await;
	let body = harness
		.integrations
		.with_token_refresh_retry(&binding.id, &org, |client: AuthorizedClient| async move {
			client.get_json("Invoices").await
		})
		.await
		.expect("The retry should succeed with the refreshed token.");

	assert_eq!(body, serde_json::json!({ "Invoices": [] }));
	assert_eq!(harness.provider.refresh_calls(), 1);
	assert_eq!(
		*harness.provider.api_tokens.lock(),
		vec![ACCESS_TOKEN.to_owned(), REFRESHED_ACCESS_TOKEN.to_owned()],
	);
}

#[tokio::test]
async fn second_rejection_is_returned_without_another_retry() {
	let harness = Harness::new(FakeProvider::new());
	let org = org("org-1");
	let grant = harness.seed_grant(&org, Duration::hours(1)).await;
	let binding = harness.seed_binding(&grant, "tenant-1").await;
	let calls = AtomicUsize::new(0);
	let err = harness
		.integrations
		.with_token_refresh_retry(&binding.id, &org, |_client| {
			calls.fetch_add(1, Ordering::SeqCst);

			async { Err::<(), _>(Error::from(TokenError::Unauthorized { status: 401 })) }
		})
		.await
		.expect_err("A second rejection should surface.");

	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(err.code(), "API_UNAUTHORIZED");
	assert_eq!(harness.provider.refresh_calls(), 1);
}

#[tokio::test]
async fn scope_denials_are_not_retried() {
	let harness = Harness::new(FakeProvider::new());
	let org = org("org-1");
	let grant = harness.seed_grant(&org, Duration::hours(1)).await;
	let binding = harness.seed_binding(&grant, "tenant-1").await;
	let calls = AtomicUsize::new(0);
	let err = harness
		.integrations
		.with_token_refresh_retry(&binding.id, &org, |_client| {
			calls.fetch_add(1, Ordering::SeqCst);

			async {
				Err::<(), _>(Error::from(TokenError::InsufficientScope {
					reason: "accounting.transactions".into(),
				}))
			}
		})
		.await
		.expect_err("Scope denials should surface immediately.");

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(err.code(), "INSUFFICIENT_SCOPE");
	assert_eq!(err.http_status(), 403);
	assert_eq!(harness.provider.refresh_calls(), 0);
}
