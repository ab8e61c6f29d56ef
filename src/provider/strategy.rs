//! Provider strategy hooks that classify failed provider calls.
//!
//! Implementations normalize error mapping without tying flows to any particular HTTP client.

// self
use crate::{_prelude::*, error::ProviderError, http::ResponseMetadata};

/// Strategy hook that allows providers to classify errors.
///
/// Implementors are required to be `Send + Sync`, and the hooks use crate-owned data types so
/// downstream crates never depend on reqwest-specific structures. Only
/// [`classify_token_error`](Self::classify_token_error) is required; API calls fall back to a
/// status-driven default.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a failed token endpoint call (code exchange or refresh) into a category.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Maps a failed resource call (tenant listing, API request, revocation) into a category.
	fn classify_api_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.network_error {
			return ProviderErrorKind::Transient;
		}

		match ctx.http_status {
			Some(401) => ProviderErrorKind::Unauthorized,
			Some(403) => ProviderErrorKind::InsufficientScope,
			Some(429) => ProviderErrorKind::RateLimited,
			Some(code) if code >= 500 => ProviderErrorKind::Transient,
			Some(_) => ProviderErrorKind::Rejected,
			None => ProviderErrorKind::Transient,
		}
	}

	/// Dispatches to the classifier matching the call.
	fn classify(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		match ctx.call {
			ProviderCall::CodeExchange | ProviderCall::Refresh => self.classify_token_error(ctx),
			ProviderCall::Revoke | ProviderCall::TenantListing | ProviderCall::ApiRequest =>
				self.classify_api_error(ctx),
		}
	}
}

/// Provider call that produced a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderCall {
	/// Authorization code exchange at the token endpoint.
	CodeExchange,
	/// Refresh token grant at the token endpoint.
	Refresh,
	/// Token revocation.
	Revoke,
	/// Tenant (connection) listing.
	TenantListing,
	/// Tenant-scoped API request.
	ApiRequest,
}
impl ProviderCall {
	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::CodeExchange => "code_exchange",
			Self::Refresh => "refresh",
			Self::Revoke => "revoke",
			Self::TenantListing => "tenant_listing",
			Self::ApiRequest => "api_request",
		}
	}
}
impl Display for ProviderCall {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the authorization grant (bad code/refresh token).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// The token does not cover the requested operation.
	InsufficientScope,
	/// Access token rejected on a resource call.
	Unauthorized,
	/// Provider throttled the call.
	RateLimited,
	/// Failure is temporary and may succeed later.
	Transient,
	/// Provider refused the request for a reason unrelated to credentials.
	Rejected,
}

/// Context passed to provider strategies when classifying errors.
///
/// The struct keeps only primitive data (status codes, OAuth fields, body preview) so
/// strategies stay decoupled from any HTTP client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Call associated with the failing request.
	pub call: ProviderCall,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Retry-After hint, when available.
	pub retry_after: Option<Duration>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
	/// Indicates whether the failure originated from the network/transport layer.
	pub network_error: bool,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a new context scoped to the provided call.
	pub fn new(call: ProviderCall) -> Self {
		Self {
			call,
			http_status: None,
			retry_after: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
			network_error: false,
		}
	}

	/// Convenience constructor for transport-level/network failures.
	pub fn network_failure(call: ProviderCall) -> Self {
		let mut ctx = Self::new(call);

		ctx.network_error = true;

		ctx
	}

	/// Copies status and retry hint from captured response metadata.
	pub fn with_metadata(mut self, meta: Option<&ResponseMetadata>) -> Self {
		if let Some(meta) = meta {
			self.http_status = meta.status.or(self.http_status);
			self.retry_after = meta.retry_after.or(self.retry_after);
		}

		self
	}

	/// Adds an HTTP status code (e.g., 400, 401, 500).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview for providers that return non-JSON payloads.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}

	/// Human-readable summary of the failure, preferring provider-supplied text.
	pub fn summary(&self) -> String {
		let detail = self
			.error_description
			.as_deref()
			.or(self.oauth_error.as_deref())
			.or(self.body_preview.as_deref().filter(|body| !body.trim().is_empty()));

		match (detail, self.http_status) {
			(Some(detail), Some(status)) =>
				format!("{} returned HTTP {status}: {detail}", self.call),
			(Some(detail), None) => format!("{} failed: {detail}", self.call),
			(None, Some(status)) => format!("{} returned HTTP {status}", self.call),
			(None, None) => format!("{} failed", self.call),
		}
	}

	/// Converts the context into a [`ProviderError`] using `kind`.
	pub fn into_error(self, kind: ProviderErrorKind) -> ProviderError {
		let reason = self.summary();

		match kind {
			ProviderErrorKind::InvalidGrant => ProviderError::InvalidGrant { reason },
			ProviderErrorKind::InvalidClient => ProviderError::InvalidClient { reason },
			ProviderErrorKind::InsufficientScope => ProviderError::InsufficientScope { reason },
			ProviderErrorKind::Unauthorized =>
				ProviderError::Unauthorized { status: self.http_status.unwrap_or(401) },
			ProviderErrorKind::RateLimited =>
				ProviderError::RateLimited { retry_after: self.retry_after },
			ProviderErrorKind::Transient => ProviderError::Upstream {
				status: self.http_status.filter(|code| *code >= 500),
				message: reason,
			},
			ProviderErrorKind::Rejected =>
				ProviderError::Upstream { status: self.http_status, message: reason },
		}
	}
}

/// Default strategy that applies RFC-guided heuristics.
///
/// Token failures prioritize structured OAuth fields (`error`, `error_description`), then body
/// text hints, and finally the HTTP status code. Network failures are always transient.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.network_error {
			return ProviderErrorKind::Transient;
		}
		if ctx.http_status == Some(429) {
			return ProviderErrorKind::RateLimited;
		}

		if let Some(kind) =
			classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
		{
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<ProviderErrorKind> {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| error_description.and_then(match_exact_value))
		.or_else(|| classify_body(error_description))
}

// `unauthorized_client` on a refresh means the refresh token no longer belongs to this client,
// so it is treated like an expired grant.
fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant")
		|| value.eq_ignore_ascii_case("access_denied")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ProviderErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client") {
		Some(ProviderErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_scope")
		|| value.eq_ignore_ascii_case("insufficient_scope")
	{
		Some(ProviderErrorKind::InsufficientScope)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") => Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ProviderErrorKind::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(ProviderErrorKind::InsufficientScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		Some(429) => ProviderErrorKind::RateLimited,
		_ => ProviderErrorKind::Transient,
	}
}
