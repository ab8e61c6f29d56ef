//! Persisted OAuth grants, their lifecycle helpers, and builders.

// self
use crate::{
	_prelude::*,
	auth::{GrantId, OrganizationId, ProviderId, UserId},
};

/// Lifecycle status for a grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
	/// Grant can be used and refreshed.
	Active,
	/// Grant was revoked locally; its secrets are gone or unusable.
	Revoked,
}
impl GrantStatus {
	/// Returns a stable label for storage and responses.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Active => "active",
			Self::Revoked => "revoked",
		}
	}
}

/// Errors produced by [`GrantBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum GrantBuilderError {
	/// Issued when no encrypted access token was provided.
	#[error("Encrypted access token is required.")]
	MissingAccessToken,
	/// Issued when no encrypted refresh token was provided.
	#[error("Encrypted refresh token is required.")]
	MissingRefreshToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}
impl From<GrantBuilderError> for Error {
	fn from(e: GrantBuilderError) -> Self {
		Error::validation(e.to_string())
	}
}

/// OAuth authorization an organization gave to the provider, with its tokens sealed.
#[derive(Clone, Serialize, Deserialize)]
pub struct Grant {
	/// Grant identifier.
	pub id: GrantId,
	/// Owning organization.
	pub organization_id: OrganizationId,
	/// User who completed the consent.
	pub authorized_by_user_id: UserId,
	/// Provider that issued the tokens.
	pub provider: ProviderId,
	/// Sealed access token.
	pub encrypted_access_token: String,
	/// Sealed refresh token.
	pub encrypted_refresh_token: String,
	/// Lifecycle status.
	pub status: GrantStatus,
	/// Access token expiry.
	pub expires_at: OffsetDateTime,
	/// Last time a client was handed out for this grant.
	pub last_used_at: Option<OffsetDateTime>,
	/// When the current refresh token was issued.
	pub refresh_token_issued_at: OffsetDateTime,
	/// Creation instant.
	pub created_at: OffsetDateTime,
	/// Last mutation instant.
	pub updated_at: OffsetDateTime,
}
impl Grant {
	/// Returns a builder for a freshly exchanged grant.
	pub fn builder(
		organization_id: OrganizationId,
		authorized_by_user_id: UserId,
		provider: ProviderId,
	) -> GrantBuilder {
		GrantBuilder::new(organization_id, authorized_by_user_id, provider)
	}

	/// Only active grants can be used or refreshed.
	pub fn is_active(&self) -> bool {
		matches!(self.status, GrantStatus::Active)
	}

	/// Returns `true` when the access token expires within `window` of `now` (or already has).
	pub fn expires_within(&self, window: Duration, now: OffsetDateTime) -> bool {
		self.expires_at - now <= window
	}

	/// Marks the grant as revoked.
	pub fn revoke(&mut self, instant: OffsetDateTime) {
		self.status = GrantStatus::Revoked;
		self.updated_at = instant;
	}

	/// Applies refreshed tokens, keeping the old refresh token when none was rotated in.
	pub fn apply(&mut self, update: GrantTokenUpdate) {
		self.encrypted_access_token = update.encrypted_access_token;
		self.expires_at = update.expires_at;
		self.updated_at = update.updated_at;

		if let Some(refresh) = update.encrypted_refresh_token {
			self.encrypted_refresh_token = refresh;
			self.refresh_token_issued_at = update.updated_at;
		}
	}
}
impl Debug for Grant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Grant")
			.field("id", &self.id)
			.field("organization_id", &self.organization_id)
			.field("authorized_by_user_id", &self.authorized_by_user_id)
			.field("provider", &self.provider)
			.field("encrypted_access_token", &"<redacted>")
			.field("encrypted_refresh_token", &"<redacted>")
			.field("status", &self.status)
			.field("expires_at", &self.expires_at)
			.field("last_used_at", &self.last_used_at)
			.field("refresh_token_issued_at", &self.refresh_token_issued_at)
			.finish()
	}
}

/// Token fields written back after a successful refresh.
#[derive(Clone)]
pub struct GrantTokenUpdate {
	/// New sealed access token.
	pub encrypted_access_token: String,
	/// New sealed refresh token, when the provider rotated it.
	pub encrypted_refresh_token: Option<String>,
	/// New access token expiry.
	pub expires_at: OffsetDateTime,
	/// Refresh instant.
	pub updated_at: OffsetDateTime,
}
impl Debug for GrantTokenUpdate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GrantTokenUpdate")
			.field("refresh_rotated", &self.encrypted_refresh_token.is_some())
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`Grant`].
#[derive(Clone)]
pub struct GrantBuilder {
	id: Option<GrantId>,
	organization_id: OrganizationId,
	authorized_by_user_id: UserId,
	provider: ProviderId,
	encrypted_access_token: Option<String>,
	encrypted_refresh_token: Option<String>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl GrantBuilder {
	fn new(
		organization_id: OrganizationId,
		authorized_by_user_id: UserId,
		provider: ProviderId,
	) -> Self {
		Self {
			id: None,
			organization_id,
			authorized_by_user_id,
			provider,
			encrypted_access_token: None,
			encrypted_refresh_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Uses a caller-chosen identifier instead of a generated one.
	pub fn id(mut self, id: GrantId) -> Self {
		self.id = Some(id);

		self
	}

	/// Sets the sealed access token.
	pub fn encrypted_access_token(mut self, value: impl Into<String>) -> Self {
		self.encrypted_access_token = Some(value.into());

		self
	}

	/// Sets the sealed refresh token.
	pub fn encrypted_refresh_token(mut self, value: impl Into<String>) -> Self {
		self.encrypted_refresh_token = Some(value.into());

		self
	}

	/// Sets the issued-at instant (defaults to now).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces an active [`Grant`].
	pub fn build(self) -> Result<Grant, GrantBuilderError> {
		let encrypted_access_token =
			self.encrypted_access_token.ok_or(GrantBuilderError::MissingAccessToken)?;
		let encrypted_refresh_token =
			self.encrypted_refresh_token.ok_or(GrantBuilderError::MissingRefreshToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at.saturating_add(delta),
			(None, None) => return Err(GrantBuilderError::MissingExpiry),
		};

		Ok(Grant {
			id: self.id.unwrap_or_else(GrantId::generate),
			organization_id: self.organization_id,
			authorized_by_user_id: self.authorized_by_user_id,
			provider: self.provider,
			encrypted_access_token,
			encrypted_refresh_token,
			status: GrantStatus::Active,
			expires_at,
			last_used_at: None,
			refresh_token_issued_at: issued_at,
			created_at: issued_at,
			updated_at: issued_at,
		})
	}
}
