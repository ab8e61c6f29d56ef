//! Grant refresh with an in-process single-flight and an optional distributed lock.
//!
//! [`Integrations::refresh_grant`] redeems a grant's refresh token at most once at a time per
//! process: the first caller starts the provider call and later callers attach to the same
//! [`OnceCell`], receiving a clone of its outcome. The entry is removed once it settles, win or
//! lose. When a [`LockStore`](crate::sync::LockStore) is configured, the provider call is also
//! serialized across processes through the `refresh:<grant_id>` lock.
//!
//! An `invalid_grant` (or `unauthorized_client`) answer revokes the grant; transient failures
//! leave it untouched so a later call can try again.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use async_lock::OnceCell;
// self
use crate::{
	_prelude::*,
	auth::{Grant, GrantId, GrantTokenUpdate, TokenSecret},
	error::{ProviderError, TokenError},
	flows::Integrations,
	obs::{self, FlowKind},
};

type RefreshOutcome = Result<FreshTokens, TokenError>;

pub(crate) type InflightRefreshes = Mutex<HashMap<GrantId, Arc<OnceCell<RefreshOutcome>>>>;

/// Usable access token for a grant.
#[derive(Clone, Debug)]
pub struct FreshTokens {
	/// Grant the token belongs to.
	pub grant_id: GrantId,
	/// Decrypted access token.
	pub access_token: TokenSecret,
	/// Access token expiry.
	pub expires_at: OffsetDateTime,
}

impl Integrations {
	/// Returns a usable access token for `grant_id`, refreshing it through the single-flight.
	///
	/// Without `force`, a token that stays valid beyond the refresh margin is returned as is.
	pub async fn refresh_grant(&self, grant_id: &GrantId, force: bool) -> Result<FreshTokens> {
		if !force {
			let grant = self.active_grant(grant_id).await?;

			if !grant.expires_within(self.options.refresh_margin, OffsetDateTime::now_utc()) {
				return self.current_tokens(&grant);
			}
		}

		obs::observe(FlowKind::Refresh, "refresh_grant", async {
			self.single_flight(grant_id).await.map_err(Error::from)
		})
		.await
	}

	/// Opens the access token currently stored for `grant`.
	pub(crate) fn current_tokens(&self, grant: &Grant) -> Result<FreshTokens> {
		Ok(FreshTokens {
			grant_id: grant.id.clone(),
			access_token: self.codec.decrypt(&grant.encrypted_access_token)?,
			expires_at: grant.expires_at,
		})
	}

	async fn single_flight(&self, grant_id: &GrantId) -> RefreshOutcome {
		let (cell, joined) = {
			let mut inflight = self.inflight.lock();

			match inflight.get(grant_id) {
				Some(cell) => (Arc::clone(cell), true),
				None => {
					let cell = Arc::new(OnceCell::new());

					inflight.insert(grant_id.clone(), Arc::clone(&cell));

					(cell, false)
				},
			}
		};

		if joined {
			self.refresh_metrics.record_joined();
		}

		let outcome = cell.get_or_init(|| self.run_refresh(grant_id)).await.clone();

		{
			let mut inflight = self.inflight.lock();

			if inflight.get(grant_id).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
				inflight.remove(grant_id);
			}
		}

		outcome
	}

	// The settled outcome is shared by every attached caller, so non-token failures are folded
	// into a retryable refresh failure after being logged in full.
	async fn run_refresh(&self, grant_id: &GrantId) -> RefreshOutcome {
		match self.refresh_locked(grant_id).await {
			Ok(fresh) => Ok(fresh),
			Err(Error::Token(e)) => Err(e),
			Err(e) => {
				tracing::error!(grant_id = %grant_id, error = %e, "Grant refresh failed.");

				Err(TokenError::refresh_transient(
					grant_id,
					"an internal error interrupted the refresh",
				))
			},
		}
	}

	async fn refresh_locked(&self, grant_id: &GrantId) -> Result<FreshTokens> {
		let Some(locks) = &self.refresh_lock else {
			return self.refresh_with_provider(grant_id).await;
		};
		let name = format!("refresh:{grant_id}");
		let Some(lease) = locks.try_acquire(&name, self.options.refresh_lock_ttl).await? else {
			let grant = self.active_grant(grant_id).await?;

			if !grant.expires_within(self.options.refresh_margin, OffsetDateTime::now_utc()) {
				return self.current_tokens(&grant);
			}

			return Err(
				TokenError::refresh_transient(grant_id, "refresh in progress elsewhere").into()
			);
		};
		let result = self.refresh_with_provider(grant_id).await;

		if let Err(e) = locks.release(&lease).await {
			tracing::warn!(lock = %name, error = %e, "Refresh lock release failed.");
		}

		result
	}

	async fn refresh_with_provider(&self, grant_id: &GrantId) -> Result<FreshTokens> {
		self.refresh_metrics.record_attempt();

		let result = self.rotate_tokens(grant_id).await;

		match &result {
			Ok(_) => self.refresh_metrics.record_success(),
			Err(_) => self.refresh_metrics.record_failure(),
		}

		result
	}

	async fn rotate_tokens(&self, grant_id: &GrantId) -> Result<FreshTokens> {
		let grant = self.active_grant(grant_id).await?;
		let refresh_token = self.codec.decrypt(&grant.encrypted_refresh_token)?;
		let issued = match self.provider.refresh_tokens(&refresh_token).await {
			Ok(issued) => issued,
			Err(ProviderError::InvalidGrant { reason }) => {
				self.store.revoke_grant(grant_id, OffsetDateTime::now_utc()).await?;
				self.refresh_metrics.record_revoked();
				obs::record_grant_revoked("invalid_grant");

				tracing::warn!(grant_id = %grant_id, "Refresh token rejected; grant revoked.");

				return Err(TokenError::refresh_revoked(grant_id, reason).into());
			},
			Err(ProviderError::InsufficientScope { reason }) =>
				return Err(TokenError::InsufficientScope { reason }.into()),
			Err(e) => {
				tracing::warn!(grant_id = %grant_id, error = %e, "Grant refresh failed upstream.");

				return Err(TokenError::refresh_transient(grant_id, transient_reason(&e)).into());
			},
		};
		let now = OffsetDateTime::now_utc();
		let expires_at = issued.expires_at(now);
		let update = GrantTokenUpdate {
			encrypted_access_token: self.codec.encrypt(issued.access_token.expose())?,
			encrypted_refresh_token: issued
				.refresh_token
				.as_ref()
				.map(|token| self.codec.encrypt(token.expose()))
				.transpose()?,
			expires_at,
			updated_at: now,
		};

		if !self.store.update_grant_tokens(grant_id, update).await? {
			return Err(
				TokenError::refresh_revoked(grant_id, "grant was revoked during refresh").into()
			);
		}

		Ok(FreshTokens {
			grant_id: grant_id.clone(),
			access_token: issued.access_token,
			expires_at,
		})
	}
}

fn transient_reason(e: &ProviderError) -> &'static str {
	match e {
		ProviderError::InvalidClient { .. } => "client authentication failed",
		ProviderError::RateLimited { .. } => "provider rate limit reached",
		ProviderError::Config(_) | ProviderError::Parse { .. } => "provider response was unusable",
		_ => "provider is unavailable",
	}
}
