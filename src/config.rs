//! Process configuration: secrets, OAuth client credentials, and tunables.
//!
//! [`Settings::from_env`] reads `OAUTH2_KEEPER_*` variables and fails fast with a
//! [`ConfigError`] naming the first missing or malformed value. Tests and embedders can use
//! [`SettingsBuilder`] directly.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	crypto::{SecretCodec, StateSigner},
	error::ConfigError,
	sync::WebhookVerifier,
};

/// Base64 of the 32-byte AES-256-GCM key sealing provider tokens.
pub const ENV_ENCRYPTION_KEY: &str = "OAUTH2_KEEPER_ENCRYPTION_KEY";
/// HMAC secret signing OAuth `state` values.
pub const ENV_STATE_SECRET: &str = "OAUTH2_KEEPER_STATE_SECRET";
/// OAuth client identifier.
pub const ENV_CLIENT_ID: &str = "OAUTH2_KEEPER_CLIENT_ID";
/// OAuth client secret.
pub const ENV_CLIENT_SECRET: &str = "OAUTH2_KEEPER_CLIENT_SECRET";
/// Redirect URI registered with the provider.
pub const ENV_REDIRECT_URI: &str = "OAUTH2_KEEPER_REDIRECT_URI";
/// Page the callback redirects to so the user can pick a tenant.
pub const ENV_TENANT_SELECTION_URL: &str = "OAUTH2_KEEPER_TENANT_SELECTION_URL";
/// Optional refresh safety margin in seconds.
pub const ENV_REFRESH_MARGIN_SECS: &str = "OAUTH2_KEEPER_REFRESH_MARGIN_SECS";
/// Optional keep-alive threshold in seconds.
pub const ENV_KEEP_ALIVE_THRESHOLD_SECS: &str = "OAUTH2_KEEPER_KEEP_ALIVE_THRESHOLD_SECS";
/// Optional maximum OAuth state age in seconds.
pub const ENV_STATE_MAX_AGE_SECS: &str = "OAUTH2_KEEPER_STATE_MAX_AGE_SECS";
/// Optional cross-process refresh lock TTL in seconds.
pub const ENV_REFRESH_LOCK_TTL_SECS: &str = "OAUTH2_KEEPER_REFRESH_LOCK_TTL_SECS";
/// Optional number of jobs drained per worker run.
pub const ENV_SYNC_BATCH_SIZE: &str = "OAUTH2_KEEPER_SYNC_BATCH_SIZE";
/// Optional worker lock TTL in seconds.
pub const ENV_SYNC_LOCK_TTL_SECS: &str = "OAUTH2_KEEPER_SYNC_LOCK_TTL_SECS";
/// Optional number of attempts before a job is dead-lettered.
pub const ENV_SYNC_MAX_ATTEMPTS: &str = "OAUTH2_KEEPER_SYNC_MAX_ATTEMPTS";
/// Optional webhook signing key; webhooks are refused without it.
pub const ENV_WEBHOOK_KEY: &str = "OAUTH2_KEEPER_WEBHOOK_KEY";

/// OAuth client registration used for every provider call.
#[derive(Clone, Debug)]
pub struct ClientCredentials {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
	/// Redirect URI registered with the provider.
	pub redirect_uri: Url,
}

/// Token-lifecycle tunables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowOptions {
	/// Access tokens expiring within this window are refreshed before use.
	pub refresh_margin: Duration,
	/// Keep-alive refreshes grants expiring within this window.
	pub keep_alive_threshold: Duration,
	/// OAuth states older than this are rejected.
	pub state_max_age: Duration,
	/// TTL of the cross-process refresh lock, when a lock store is configured.
	pub refresh_lock_ttl: Duration,
}
impl Default for FlowOptions {
	fn default() -> Self {
		Self {
			refresh_margin: Duration::minutes(5),
			keep_alive_threshold: Duration::minutes(10),
			state_max_age: Duration::minutes(10),
			refresh_lock_ttl: Duration::seconds(30),
		}
	}
}

/// Sync worker tunables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerOptions {
	/// Maximum number of jobs drained per run.
	pub batch_size: usize,
	/// TTL of the worker lock.
	pub lock_ttl: Duration,
	/// Attempts before a failing job is dead-lettered.
	pub max_attempts: u32,
}
impl Default for WorkerOptions {
	fn default() -> Self {
		Self { batch_size: 10, lock_ttl: Duration::seconds(50), max_attempts: 3 }
	}
}

/// Fully validated process configuration.
#[derive(Clone, Debug)]
pub struct Settings {
	/// Codec built from the encryption key.
	pub codec: SecretCodec,
	/// Signer built from the state secret.
	pub signer: StateSigner,
	/// OAuth client registration.
	pub client: ClientCredentials,
	/// Tenant selection page the callback redirects to.
	pub tenant_selection_url: Url,
	/// Token-lifecycle tunables.
	pub flow: FlowOptions,
	/// Sync worker tunables.
	pub worker: WorkerOptions,
	/// Webhook signature verifier, when a key is configured.
	pub webhook: Option<WebhookVerifier>,
}
impl Settings {
	/// Creates an empty builder.
	pub fn builder() -> SettingsBuilder {
		SettingsBuilder::default()
	}

	/// Reads settings from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Reads settings through `lookup`, which maps variable names to values.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let required = |name: &'static str| {
			lookup(name)
				.filter(|value| !value.trim().is_empty())
				.ok_or(ConfigError::MissingSetting { name })
		};
		let seconds = |name: &'static str, fallback: Duration| -> Result<Duration, ConfigError> {
			match lookup(name) {
				Some(raw) =>
					parse_number::<u32>(name, &raw).map(|secs| Duration::seconds(secs.into())),
				None => Ok(fallback),
			}
		};
		let flow_defaults = FlowOptions::default();
		let worker_defaults = WorkerOptions::default();
		let flow = FlowOptions {
			refresh_margin: seconds(ENV_REFRESH_MARGIN_SECS, flow_defaults.refresh_margin)?,
			keep_alive_threshold: seconds(
				ENV_KEEP_ALIVE_THRESHOLD_SECS,
				flow_defaults.keep_alive_threshold,
			)?,
			state_max_age: seconds(ENV_STATE_MAX_AGE_SECS, flow_defaults.state_max_age)?,
			refresh_lock_ttl: seconds(ENV_REFRESH_LOCK_TTL_SECS, flow_defaults.refresh_lock_ttl)?,
		};
		let worker = WorkerOptions {
			batch_size: match lookup(ENV_SYNC_BATCH_SIZE) {
				Some(raw) => parse_number(ENV_SYNC_BATCH_SIZE, &raw)?,
				None => worker_defaults.batch_size,
			},
			lock_ttl: seconds(ENV_SYNC_LOCK_TTL_SECS, worker_defaults.lock_ttl)?,
			max_attempts: match lookup(ENV_SYNC_MAX_ATTEMPTS) {
				Some(raw) => parse_number(ENV_SYNC_MAX_ATTEMPTS, &raw)?,
				None => worker_defaults.max_attempts,
			},
		};

		let mut builder = Self::builder();

		if let Some(key) = lookup(ENV_WEBHOOK_KEY).filter(|value| !value.trim().is_empty()) {
			builder = builder.webhook_key(key);
		}

		builder
			.encryption_key(required(ENV_ENCRYPTION_KEY)?)
			.state_secret(required(ENV_STATE_SECRET)?)
			.client_id(required(ENV_CLIENT_ID)?)
			.client_secret(required(ENV_CLIENT_SECRET)?)
			.redirect_uri(parse_url(ENV_REDIRECT_URI, &required(ENV_REDIRECT_URI)?)?)
			.tenant_selection_url(parse_url(
				ENV_TENANT_SELECTION_URL,
				&required(ENV_TENANT_SELECTION_URL)?,
			)?)
			.flow_options(flow)
			.worker_options(worker)
			.build()
	}
}

/// Builder for [`Settings`].
#[derive(Default)]
pub struct SettingsBuilder {
	encryption_key: Option<String>,
	state_secret: Option<String>,
	client_id: Option<String>,
	client_secret: Option<String>,
	redirect_uri: Option<Url>,
	tenant_selection_url: Option<Url>,
	webhook_key: Option<String>,
	flow: FlowOptions,
	worker: WorkerOptions,
}
impl SettingsBuilder {
	/// Sets the base64-encoded encryption key.
	pub fn encryption_key(mut self, key: impl Into<String>) -> Self {
		self.encryption_key = Some(key.into());

		self
	}

	/// Sets the state signing secret.
	pub fn state_secret(mut self, secret: impl Into<String>) -> Self {
		self.state_secret = Some(secret.into());

		self
	}

	/// Sets the OAuth client identifier.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Sets the OAuth client secret.
	pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Sets the redirect URI registered with the provider.
	pub fn redirect_uri(mut self, url: Url) -> Self {
		self.redirect_uri = Some(url);

		self
	}

	/// Sets the tenant selection page.
	pub fn tenant_selection_url(mut self, url: Url) -> Self {
		self.tenant_selection_url = Some(url);

		self
	}

	/// Sets the webhook signing key.
	pub fn webhook_key(mut self, key: impl Into<String>) -> Self {
		self.webhook_key = Some(key.into());

		self
	}

	/// Overrides the token-lifecycle tunables.
	pub fn flow_options(mut self, options: FlowOptions) -> Self {
		self.flow = options;

		self
	}

	/// Overrides the worker tunables.
	pub fn worker_options(mut self, options: WorkerOptions) -> Self {
		self.worker = options;

		self
	}

	/// Validates every value and builds the [`Settings`].
	pub fn build(self) -> Result<Settings, ConfigError> {
		let key = self
			.encryption_key
			.ok_or(ConfigError::MissingSetting { name: ENV_ENCRYPTION_KEY })?;
		let secret =
			self.state_secret.ok_or(ConfigError::MissingSetting { name: ENV_STATE_SECRET })?;
		let client_id = self.client_id.ok_or(ConfigError::MissingSetting { name: ENV_CLIENT_ID })?;
		let client_secret =
			self.client_secret.ok_or(ConfigError::MissingSetting { name: ENV_CLIENT_SECRET })?;
		let redirect_uri =
			self.redirect_uri.ok_or(ConfigError::MissingSetting { name: ENV_REDIRECT_URI })?;
		let tenant_selection_url = self
			.tenant_selection_url
			.ok_or(ConfigError::MissingSetting { name: ENV_TENANT_SELECTION_URL })?;

		if self.worker.batch_size == 0 {
			return Err(ConfigError::invalid(ENV_SYNC_BATCH_SIZE, "must be at least 1"));
		}
		if self.worker.max_attempts == 0 {
			return Err(ConfigError::invalid(ENV_SYNC_MAX_ATTEMPTS, "must be at least 1"));
		}
		if !self.worker.lock_ttl.is_positive() {
			return Err(ConfigError::invalid(ENV_SYNC_LOCK_TTL_SECS, "must be positive"));
		}
		if !self.flow.refresh_lock_ttl.is_positive() {
			return Err(ConfigError::invalid(ENV_REFRESH_LOCK_TTL_SECS, "must be positive"));
		}

		Ok(Settings {
			codec: SecretCodec::from_base64(&key)?,
			signer: StateSigner::new(secret)?,
			client: ClientCredentials {
				client_id,
				client_secret: TokenSecret::new(client_secret),
				redirect_uri,
			},
			tenant_selection_url,
			flow: self.flow,
			worker: self.worker,
			webhook: self.webhook_key.map(WebhookVerifier::new).transpose()?,
		})
	}
}
impl Debug for SettingsBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SettingsBuilder")
			.field("client_id", &self.client_id)
			.field("encryption_key_set", &self.encryption_key.is_some())
			.field("state_secret_set", &self.state_secret.is_some())
			.field("client_secret_set", &self.client_secret.is_some())
			.field("webhook_key_set", &self.webhook_key.is_some())
			.field("redirect_uri", &self.redirect_uri)
			.field("tenant_selection_url", &self.tenant_selection_url)
			.finish()
	}
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw.trim()).map_err(|e| ConfigError::invalid(name, e.to_string()))
}

fn parse_number<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
	T: FromStr,
	T::Err: Display,
{
	raw.trim().parse().map_err(|e: T::Err| ConfigError::invalid(name, e.to_string()))
}

#[cfg(test)]
mod tests {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::STANDARD};
	// self
	use super::*;

	fn env() -> HashMap<&'static str, String> {
		HashMap::from([
			(ENV_ENCRYPTION_KEY, STANDARD.encode([3_u8; 32])),
			(ENV_STATE_SECRET, "state-secret".into()),
			(ENV_CLIENT_ID, "client-id".into()),
			(ENV_CLIENT_SECRET, "client-secret".into()),
			(ENV_REDIRECT_URI, "https://app.example.com/integrations/callback".into()),
			(ENV_TENANT_SELECTION_URL, "https://app.example.com/integrations/select".into()),
		])
	}

	fn load(vars: &HashMap<&'static str, String>) -> Result<Settings, ConfigError> {
		Settings::from_lookup(|name| vars.get(name).cloned())
	}

	#[test]
	fn loads_required_values_with_default_tunables() {
		let settings = load(&env()).expect("Complete environment should load.");

		assert_eq!(settings.client.client_id, "client-id");
		assert_eq!(settings.client.client_secret.expose(), "client-secret");
		assert_eq!(settings.flow, FlowOptions::default());
		assert_eq!(settings.worker, WorkerOptions::default());
		assert_eq!(settings.worker.batch_size, 10);
		assert_eq!(settings.flow.refresh_margin, Duration::minutes(5));
		assert!(settings.webhook.is_none());
	}

	#[test]
	fn missing_values_fail_fast() {
		let mut vars = env();

		vars.remove(ENV_ENCRYPTION_KEY);

		assert!(matches!(
			load(&vars),
			Err(ConfigError::MissingSetting { name: ENV_ENCRYPTION_KEY })
		));

		let mut vars = env();

		vars.insert(ENV_CLIENT_SECRET, "   ".into());

		assert!(matches!(
			load(&vars),
			Err(ConfigError::MissingSetting { name: ENV_CLIENT_SECRET })
		));
	}

	#[test]
	fn malformed_values_are_rejected() {
		let mut vars = env();

		vars.insert(ENV_ENCRYPTION_KEY, STANDARD.encode([3_u8; 16]));

		assert!(matches!(load(&vars), Err(ConfigError::InvalidSetting { .. })));

		let mut vars = env();

		vars.insert(ENV_SYNC_BATCH_SIZE, "ten".into());

		assert!(matches!(
			load(&vars),
			Err(ConfigError::InvalidSetting { name: ENV_SYNC_BATCH_SIZE, .. })
		));

		let mut vars = env();

		vars.insert(ENV_SYNC_MAX_ATTEMPTS, "0".into());

		assert!(matches!(
			load(&vars),
			Err(ConfigError::InvalidSetting { name: ENV_SYNC_MAX_ATTEMPTS, .. })
		));
	}

	#[test]
	fn tunables_override_defaults() {
		let mut vars = env();

		vars.insert(ENV_REFRESH_MARGIN_SECS, "120".into());
		vars.insert(ENV_SYNC_BATCH_SIZE, "25".into());

		let settings = load(&vars).expect("Environment with overrides should load.");

		assert_eq!(settings.flow.refresh_margin, Duration::minutes(2));
		assert_eq!(settings.worker.batch_size, 25);
		assert_eq!(settings.worker.max_attempts, 3);

		vars.insert(ENV_WEBHOOK_KEY, "webhook-key".into());

		assert!(load(&vars).expect("Webhook key should load.").webhook.is_some());
	}
}
