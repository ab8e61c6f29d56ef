mod common;

// crates.io
use time::Duration;
// self
use common::*;

#[tokio::test]
async fn keep_alive_refreshes_only_grants_inside_the_threshold() {
	let harness = Harness::new(FakeProvider::new());
	let org = org("org-1");
	let due = harness.seed_grant(&org, Duration::minutes(5)).await;
	let later = harness.seed_grant(&org, Duration::minutes(20)).await;
	let report = harness
		.integrations
		.keep_alive(Duration::minutes(10))
		.await
		.expect("Keep-alive sweep should complete.");

	assert_eq!(report.checked, 1);
	assert_eq!(report.refreshed, 1);
	assert_eq!(report.failed, 0);
	assert_eq!(report.results[0].grant_id, due.id);
	assert_eq!(harness.provider.refresh_calls(), 1);
	assert!(harness.grant(&due).await.expires_at > due.expires_at);
	assert_eq!(harness.grant(&later).await.expires_at, later.expires_at);
}

#[tokio::test]
async fn one_failing_grant_does_not_abort_the_sweep() {
	let harness = Harness::new(FakeProvider::new());
	let org = org("org-1");

	harness.seed_grant(&org, Duration::minutes(3)).await;
	harness.seed_grant(&org, Duration::minutes(4)).await;
	harness.provider.set_refresh_behavior(RefreshBehavior::Unavailable);

	let report = harness
		.integrations
		.keep_alive(Duration::minutes(10))
		.await
		.expect("Keep-alive sweep should complete despite failures.");

	assert_eq!(report.checked, 2);
	assert_eq!(report.refreshed, 0);
	assert_eq!(report.failed, 2);
	assert!(report.results.iter().all(|result| result.error == Some("TOKEN_REFRESH_FAILED")));

	let body = serde_json::to_value(&report).expect("Report should serialize.");

	assert_eq!(body["failed"], 2);
	assert!(body["results"][0]["expiresAt"].is_null());
}
