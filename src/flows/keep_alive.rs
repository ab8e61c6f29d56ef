//! Proactive refresh of grants that are about to expire.

// crates.io
use futures::future;
// self
use crate::{
	_prelude::*,
	auth::GrantId,
	flows::Integrations,
	obs::{self, FlowKind},
};

/// Per-grant keep-alive outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeepAliveResult {
	/// Grant that was refreshed.
	pub grant_id: GrantId,
	/// Whether the refresh succeeded.
	pub refreshed: bool,
	/// New access token expiry on success.
	#[serde(with = "time::serde::rfc3339::option")]
	pub expires_at: Option<OffsetDateTime>,
	/// Error code on failure.
	pub error: Option<&'static str>,
}

/// Aggregate result of [`Integrations::keep_alive`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeepAliveReport {
	/// Grants that were due.
	pub checked: usize,
	/// Grants refreshed successfully.
	pub refreshed: usize,
	/// Grants whose refresh failed.
	pub failed: usize,
	/// Per-grant outcomes.
	pub results: Vec<KeepAliveResult>,
}

impl Integrations {
	/// Refreshes every active grant expiring within `threshold`, in parallel.
	///
	/// Refreshes go through the single-flight, so a sweep never races a request-path refresh of
	/// the same grant. One failing grant never aborts the sweep.
	pub async fn keep_alive(&self, threshold: Duration) -> Result<KeepAliveReport> {
		obs::observe(FlowKind::KeepAlive, "keep_alive", async {
			let due = self.store.list_expiring_grants(OffsetDateTime::now_utc() + threshold).await?;
			let results = future::join_all(due.iter().map(|grant| async move {
				match self.refresh_grant(&grant.id, true).await {
					Ok(fresh) => KeepAliveResult {
						grant_id: grant.id.clone(),
						refreshed: true,
						expires_at: Some(fresh.expires_at),
						error: None,
					},
					Err(e) => {
						tracing::warn!(
							grant_id = %grant.id,
							error = %e,
							"Keep-alive refresh failed."
						);

						KeepAliveResult {
							grant_id: grant.id.clone(),
							refreshed: false,
							expires_at: None,
							error: Some(e.code()),
						}
					},
				}
			}))
			.await;
			let refreshed = results.iter().filter(|result| result.refreshed).count();

			Ok(KeepAliveReport {
				checked: results.len(),
				refreshed,
				failed: results.len() - refreshed,
				results,
			})
		})
		.await
	}
}
