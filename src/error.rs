//! Error taxonomy shared by the store, token, sync, and API layers.
//!
//! Every failure surfaces as an [`Error`] that knows its machine-readable code, the HTTP status
//! it maps to, and whether it is operational (safe to echo to clients) or not (logged in full,
//! surfaced generically).

// self
use crate::{_prelude::*, auth::GrantId, provider::ProviderDescriptorError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Action hint attached to token failures that only a fresh consent can fix.
pub const RECONNECT_ACTION: &str = "reconnect";

const GENERIC_MESSAGE: &str = "An internal error occurred.";

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Caller is not authenticated or not allowed to act for the organization.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Provider credential failure.
	#[error(transparent)]
	Token(#[from] TokenError),
	/// Provider rejected or failed an API call for reasons other than credentials.
	#[error("Provider API request failed: {message}.")]
	ExternalApi {
		/// HTTP status returned by the provider, when one was received.
		status: Option<u16>,
		/// Provider- or crate-supplied message.
		message: String,
	},
	/// Provider throttled the request; callers decide when to try again.
	#[error("Provider rate limit reached.")]
	RateLimit {
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Secret material could not be sealed or opened.
	#[error(transparent)]
	Crypto(#[from] CryptoError),
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Queue or worker failure.
	#[error(transparent)]
	Sync(#[from] SyncError),
	/// Inbound webhook could not be accepted.
	#[error(transparent)]
	Webhook(#[from] WebhookError),
	/// Network failure while talking to the provider.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Requested record does not exist for the caller's organization.
	#[error("{resource} `{id}` was not found.")]
	NotFound {
		/// Record kind.
		resource: &'static str,
		/// Identifier supplied by the caller.
		id: String,
	},
	/// Caller-supplied input is invalid.
	#[error("{message}")]
	Validation {
		/// Human-readable explanation.
		message: String,
	},
}
impl Error {
	/// Builds a [`Error::NotFound`] for the provided resource.
	pub fn not_found(resource: &'static str, id: impl Display) -> Self {
		Self::NotFound { resource, id: id.to_string() }
	}

	/// Builds a [`Error::Validation`] from a message.
	pub fn validation(message: impl Into<String>) -> Self {
		Self::Validation { message: message.into() }
	}

	/// Stable machine-readable code.
	pub fn code(&self) -> &'static str {
		match self {
			Self::Auth(e) => e.code(),
			Self::Token(e) => e.code(),
			Self::ExternalApi { .. } => "EXTERNAL_API_ERROR",
			Self::RateLimit { .. } => "RATE_LIMITED",
			Self::Config(_) => "CONFIG_ERROR",
			Self::Crypto(_) => "DECRYPTION_FAILED",
			Self::Storage(_) => "STORAGE_ERROR",
			Self::Sync(_) => "SYNC_ERROR",
			Self::Webhook(_) => "WEBHOOK_ERROR",
			Self::Transport(_) => "UPSTREAM_UNAVAILABLE",
			Self::NotFound { .. } => "NOT_FOUND",
			Self::Validation { .. } => "VALIDATION_ERROR",
		}
	}

	/// HTTP status code this error maps to.
	pub fn http_status(&self) -> u16 {
		match self {
			Self::Auth(e) => e.http_status(),
			Self::Token(e) => e.http_status(),
			Self::ExternalApi { status: Some(code), .. } if (400..500).contains(code) => 400,
			Self::ExternalApi { .. } => 502,
			Self::RateLimit { .. } => 429,
			Self::Config(_) | Self::Crypto(_) | Self::Storage(_) | Self::Sync(_) => 500,
			Self::Webhook(e) => e.http_status(),
			Self::Transport(_) => 502,
			Self::NotFound { .. } => 404,
			Self::Validation { .. } => 400,
		}
	}

	/// Operational errors are expected at runtime and safe to describe to clients.
	pub fn is_operational(&self) -> bool {
		!matches!(self, Self::Config(_) | Self::Crypto(_) | Self::Storage(_))
	}

	/// Message suitable for clients; non-operational details never leave the process.
	pub fn safe_message(&self) -> String {
		if self.is_operational() { self.to_string() } else { GENERIC_MESSAGE.into() }
	}

	/// Follow-up the user has to take, if any.
	pub fn action(&self) -> Option<&'static str> {
		match self {
			Self::Token(e) => e.action(),
			_ => None,
		}
	}

	/// Returns the wrapped token error, if this is one.
	pub fn as_token_error(&self) -> Option<&TokenError> {
		match self {
			Self::Token(e) => Some(e),
			_ => None,
		}
	}
}

/// Caller authentication and authorization failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthError {
	/// No identity could be resolved for the request.
	#[error("Authentication is required.")]
	Unauthenticated,
	/// Identity lacks the required organization role.
	#[error("Only organization {required} may perform this action.")]
	Forbidden {
		/// Roles allowed to perform the action.
		required: &'static str,
	},
	/// OAuth state failed verification (forged, tampered, or stale).
	#[error("OAuth state is invalid or expired.")]
	InvalidState,
	/// Provider reported that the user denied or aborted consent.
	#[error("Authorization was not granted: {reason}.")]
	Denied {
		/// Provider-supplied reason.
		reason: String,
	},
}
impl AuthError {
	fn code(&self) -> &'static str {
		match self {
			Self::Unauthenticated => "UNAUTHENTICATED",
			Self::Forbidden { .. } => "FORBIDDEN",
			Self::InvalidState => "INVALID_STATE",
			Self::Denied { .. } => "AUTHORIZATION_DENIED",
		}
	}

	fn http_status(&self) -> u16 {
		match self {
			Self::Unauthenticated => 401,
			Self::Forbidden { .. } => 403,
			Self::InvalidState | Self::Denied { .. } => 400,
		}
	}
}

/// Classified provider credential failures.
///
/// The type is `Clone` because a single refresh outcome is shared by every caller attached to
/// the same in-flight refresh.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenError {
	/// Provider rejected the access token on an API call.
	#[error("Provider rejected the access token (HTTP {status}).")]
	Unauthorized {
		/// HTTP status returned by the provider.
		status: u16,
	},
	/// Refresh could not produce a usable access token.
	#[error("Token refresh failed: {reason}.")]
	RefreshFailed {
		/// Summary safe to show to the organization.
		reason: String,
		/// Whether the grant was revoked as a consequence.
		revoked: bool,
		/// Grant the failure belongs to.
		grant_id: Option<GrantId>,
	},
	/// Provider denied the call on permission grounds; only re-consent fixes it.
	#[error("Provider denied access due to missing permissions: {reason}.")]
	InsufficientScope {
		/// Provider- or crate-supplied reason.
		reason: String,
	},
}
impl TokenError {
	/// Builds a refresh failure that leaves the grant usable for a later retry.
	pub fn refresh_transient(grant_id: &GrantId, reason: impl Into<String>) -> Self {
		Self::RefreshFailed {
			reason: reason.into(),
			revoked: false,
			grant_id: Some(grant_id.clone()),
		}
	}

	/// Builds a refresh failure for a grant that can no longer be used.
	pub fn refresh_revoked(grant_id: &GrantId, reason: impl Into<String>) -> Self {
		Self::RefreshFailed {
			reason: reason.into(),
			revoked: true,
			grant_id: Some(grant_id.clone()),
		}
	}

	/// Stable machine-readable code.
	pub fn code(&self) -> &'static str {
		match self {
			Self::Unauthorized { .. } => "API_UNAUTHORIZED",
			Self::RefreshFailed { .. } => "TOKEN_REFRESH_FAILED",
			Self::InsufficientScope { .. } => "INSUFFICIENT_SCOPE",
		}
	}

	fn http_status(&self) -> u16 {
		match self {
			Self::Unauthorized { .. } | Self::RefreshFailed { .. } => 401,
			Self::InsufficientScope { .. } => 403,
		}
	}

	fn action(&self) -> Option<&'static str> {
		Some(RECONNECT_ACTION)
	}

	/// Returns `true` when the grant behind this failure has been revoked.
	pub fn is_revoked(&self) -> bool {
		matches!(self, Self::RefreshFailed { revoked: true, .. })
	}
}

/// Configuration and validation failures raised at startup or while wiring collaborators.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required setting is absent.
	#[error("Missing required setting `{name}`.")]
	MissingSetting {
		/// Setting name.
		name: &'static str,
	},
	/// A setting is present but malformed.
	#[error("Setting `{name}` is invalid: {reason}.")]
	InvalidSetting {
		/// Setting name.
		name: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] ProviderDescriptorError),
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Shorthand for [`ConfigError::InvalidSetting`].
	pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
		Self::InvalidSetting { name, reason: reason.into() }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures raised while sealing or opening secrets.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CryptoError {
	/// Stored ciphertext is not valid base64.
	#[error("Ciphertext is not valid base64.")]
	Encoding,
	/// Stored ciphertext is shorter than a nonce plus tag.
	#[error("Ciphertext is too short to hold a nonce and tag.")]
	Truncated,
	/// Authentication tag mismatch: wrong key or tampered data.
	#[error("Ciphertext failed authentication.")]
	Decrypt,
	/// The cipher refused to seal the plaintext.
	#[error("Plaintext could not be encrypted.")]
	Encrypt,
	/// Opened secret is not UTF-8.
	#[error("Decrypted secret is not valid UTF-8.")]
	Utf8,
	/// Signed payload could not be serialized.
	#[error("Payload could not be serialized for signing.")]
	Payload,
}

/// Queue and worker failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SyncError {
	/// Queue backend failure.
	#[error("Sync queue failure: {message}.")]
	Queue {
		/// Backend message.
		message: String,
	},
	/// Lock backend failure.
	#[error("Worker lock failure: {message}.")]
	Lock {
		/// Backend message.
		message: String,
	},
	/// Stored job payload could not be decoded.
	#[error("Sync job payload is invalid: {message}.")]
	InvalidJob {
		/// Decoder message.
		message: String,
	},
	/// A job handler reported a failure.
	#[error("Sync job failed: {message}.")]
	Handler {
		/// Handler message.
		message: String,
	},
}

/// Inbound webhook failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum WebhookError {
	/// Signature header missing or not matching the payload.
	#[error("Webhook signature is invalid.")]
	InvalidSignature,
	/// Payload could not be parsed.
	#[error("Webhook payload is invalid: {reason}.")]
	InvalidPayload {
		/// Parser message.
		reason: String,
	},
}
impl WebhookError {
	fn http_status(&self) -> u16 {
		match self {
			Self::InvalidSignature => 401,
			Self::InvalidPayload { .. } => 400,
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Classified outcome of a failed provider call, before it is folded into [`Error`].
///
/// Token flows inspect the variant (an `InvalidGrant` on refresh revokes the grant); everything
/// else converts into the taxonomy through `From`.
#[derive(Debug, ThisError)]
pub enum ProviderError {
	/// Provider rejected the authorization code or refresh token.
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or crate-supplied reason.
		reason: String,
	},
	/// Client authentication failed at the token endpoint.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or crate-supplied reason.
		reason: String,
	},
	/// Provider denied the call on permission grounds.
	#[error("Provider denied access due to missing permissions: {reason}.")]
	InsufficientScope {
		/// Provider- or crate-supplied reason.
		reason: String,
	},
	/// Provider rejected the access token.
	#[error("Provider rejected the access token (HTTP {status}).")]
	Unauthorized {
		/// HTTP status returned by the provider.
		status: u16,
	},
	/// Provider throttled the call.
	#[error("Provider rate limit reached.")]
	RateLimited {
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Any other unexpected response.
	#[error("Provider returned an unexpected response: {message}.")]
	Upstream {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Provider- or crate-supplied message.
		message: String,
	},
	/// Provider answered with JSON that does not match the expected shape.
	#[error("Provider returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Network failure.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Local misconfiguration surfaced while preparing the call.
	#[error(transparent)]
	Config(#[from] ConfigError),
}
impl ProviderError {
	/// Failures that say nothing about the grant itself and may succeed later.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::RateLimited { .. } | Self::Transport(_) => true,
			Self::Upstream { status, .. } => status.is_none_or(|code| code >= 500),
			_ => false,
		}
	}
}
impl From<ProviderError> for Error {
	fn from(e: ProviderError) -> Self {
		match e {
			ProviderError::InvalidGrant { reason } | ProviderError::InvalidClient { reason } =>
				Error::ExternalApi { status: Some(400), message: reason },
			ProviderError::InsufficientScope { reason } =>
				TokenError::InsufficientScope { reason }.into(),
			ProviderError::Unauthorized { status } => TokenError::Unauthorized { status }.into(),
			ProviderError::RateLimited { retry_after } => Error::RateLimit { retry_after },
			ProviderError::Upstream { status, message } => Error::ExternalApi { status, message },
			ProviderError::Parse { status, .. } =>
				Error::ExternalApi { status, message: "response body was malformed JSON".into() },
			ProviderError::Transport(e) => e.into(),
			ProviderError::Config(e) => e.into(),
		}
	}
}
