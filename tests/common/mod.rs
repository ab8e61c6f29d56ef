#![allow(dead_code)]

// std
use std::sync::{
	Arc,
	atomic::{AtomicBool, AtomicUsize, Ordering},
};
// crates.io
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use oauth2_keeper::{
	auth::{
		Caller, ExternalTenantId, Grant, OrgRole, OrganizationId, ProviderId, TenantBinding,
		TokenSecret, UserId,
	},
	crypto::{SecretCodec, StateSigner},
	error::ProviderError,
	flows::Integrations,
	http::ReqwestHttpClient,
	provider::{IssuedTokens, ProviderApi, ProviderFuture, ProviderTenant},
	reqwest::Client as ReqwestClient,
	store::{GrantStore, MemoryStore},
};

pub const PROVIDER: &str = "xero";
pub const ACCESS_TOKEN: &str = "access-current";
pub const REFRESH_TOKEN: &str = "refresh-current";
pub const REFRESHED_ACCESS_TOKEN: &str = "access-refreshed";

/// How the fake provider answers refresh requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshBehavior {
	Succeed,
	InvalidGrant,
	Unavailable,
}

/// In-process provider that counts calls and answers from canned data.
pub struct FakeProvider {
	id: ProviderId,
	refresh_delay: std::time::Duration,
	behavior: Mutex<RefreshBehavior>,
	revoke_fails: AtomicBool,
	pub refresh_calls: AtomicUsize,
	pub revoked: Mutex<Vec<String>>,
	pub api_tokens: Mutex<Vec<String>>,
}
impl FakeProvider {
	pub fn new() -> Self {
		Self::with_refresh_delay(std::time::Duration::ZERO)
	}

	pub fn with_refresh_delay(delay: std::time::Duration) -> Self {
		Self {
			id: provider_id(),
			refresh_delay: delay,
			behavior: Mutex::new(RefreshBehavior::Succeed),
			revoke_fails: AtomicBool::new(false),
			refresh_calls: AtomicUsize::new(0),
			revoked: Mutex::new(Vec::new()),
			api_tokens: Mutex::new(Vec::new()),
		}
	}

	pub fn set_refresh_behavior(&self, behavior: RefreshBehavior) {
		*self.behavior.lock() = behavior;
	}

	pub fn set_revoke_fails(&self, fails: bool) {
		self.revoke_fails.store(fails, Ordering::SeqCst);
	}

	pub fn refresh_calls(&self) -> usize {
		self.refresh_calls.load(Ordering::SeqCst)
	}
}
impl ProviderApi for FakeProvider {
	fn provider_id(&self) -> &ProviderId {
		&self.id
	}

	fn authorize_url(&self, state: &str) -> Result<Url, ProviderError> {
		let mut url = Url::parse("https://login.example.com/authorize")
			.map_err(|e| ProviderError::Upstream { status: None, message: e.to_string() })?;

		url.query_pairs_mut().append_pair("state", state);

		Ok(url)
	}

	fn exchange_code<'a>(&'a self, code: &'a str) -> ProviderFuture<'a, IssuedTokens> {
		Box::pin(async move {
			if code == "bad-code" {
				return Err(ProviderError::InvalidGrant { reason: "code expired".into() });
			}

			Ok(IssuedTokens {
				access_token: TokenSecret::new(format!("access-{code}")),
				refresh_token: Some(TokenSecret::new(format!("refresh-{code}"))),
				expires_in: Duration::minutes(30),
			})
		})
	}

	fn refresh_tokens<'a>(
		&'a self,
		_refresh_token: &'a TokenSecret,
	) -> ProviderFuture<'a, IssuedTokens> {
		Box::pin(async move {
			self.refresh_calls.fetch_add(1, Ordering::SeqCst);

			if !self.refresh_delay.is_zero() {
				tokio::time::sleep(self.refresh_delay).await;
			}

			let behavior = *self.behavior.lock();

			match behavior {
				RefreshBehavior::Succeed => Ok(IssuedTokens {
					access_token: TokenSecret::new(REFRESHED_ACCESS_TOKEN),
					refresh_token: Some(TokenSecret::new("refresh-rotated")),
					expires_in: Duration::minutes(30),
				}),
				RefreshBehavior::InvalidGrant =>
					Err(ProviderError::InvalidGrant { reason: "refresh token expired".into() }),
				RefreshBehavior::Unavailable => Err(ProviderError::Upstream {
					status: Some(503),
					message: "maintenance".into(),
				}),
			}
		})
	}

	fn revoke_refresh_token<'a>(
		&'a self,
		refresh_token: &'a TokenSecret,
	) -> ProviderFuture<'a, ()> {
		Box::pin(async move {
			if self.revoke_fails.load(Ordering::SeqCst) {
				return Err(ProviderError::Upstream { status: Some(503), message: "down".into() });
			}

			self.revoked.lock().push(refresh_token.expose().to_owned());

			Ok(())
		})
	}

	fn list_tenants<'a>(
		&'a self,
		_access_token: &'a TokenSecret,
	) -> ProviderFuture<'a, Vec<ProviderTenant>> {
		Box::pin(async {
			Ok(vec![
				ProviderTenant { id: tenant("tenant-1"), name: "Demo Company".into(), kind: None },
				ProviderTenant { id: tenant("tenant-2"), name: "Other Company".into(), kind: None },
			])
		})
	}

	fn get_json<'a>(
		&'a self,
		access_token: &'a TokenSecret,
		_tenant: &'a ExternalTenantId,
		_path: &'a str,
	) -> ProviderFuture<'a, serde_json::Value> {
		Box::pin(async move {
			self.api_tokens.lock().push(access_token.expose().to_owned());

			if access_token.expose() == ACCESS_TOKEN {
				return Err(ProviderError::Unauthorized { status: 401 });
			}

			Ok(serde_json::json!({ "Invoices": [] }))
		})
	}
}

/// Integrations wired to a memory store and a fake provider.
pub struct Harness {
	pub integrations: Integrations,
	pub store: Arc<MemoryStore>,
	pub provider: Arc<FakeProvider>,
	pub codec: SecretCodec,
}
impl Harness {
	pub fn new(provider: FakeProvider) -> Self {
		let store = Arc::new(MemoryStore::default());
		let provider = Arc::new(provider);
		let integrations = Integrations::new(
			store.clone(),
			provider.clone(),
			codec(),
			signer(),
			Url::parse("https://app.example.com/integrations/select")
				.expect("Tenant selection URL fixture should parse."),
		);

		Self { integrations, store, provider, codec: codec() }
	}

	/// Seeds an active grant whose access token expires in `expires_in`.
	pub async fn seed_grant(&self, org: &OrganizationId, expires_in: Duration) -> Grant {
		let grant = Grant::builder(org.clone(), user(), provider_id())
			.encrypted_access_token(
				self.codec.encrypt(ACCESS_TOKEN).expect("Access token should encrypt."),
			)
			.encrypted_refresh_token(
				self.codec.encrypt(REFRESH_TOKEN).expect("Refresh token should encrypt."),
			)
			.expires_in(expires_in)
			.build()
			.expect("Grant fixture should build.");

		self.store.insert_grant(grant.clone()).await.expect("Grant insert should succeed.");

		grant
	}

	/// Binds `tenant_id` of `org` to `grant`.
	pub async fn seed_binding(&self, grant: &Grant, tenant_id: &str) -> TenantBinding {
		let binding = TenantBinding::new(
			grant.organization_id.clone(),
			provider_id(),
			tenant(tenant_id),
			format!("Tenant {tenant_id}"),
			grant.id.clone(),
			OffsetDateTime::now_utc(),
		);

		self.store.upsert_binding(binding).await.expect("Binding upsert should succeed.").binding
	}

	pub async fn grant(&self, grant: &Grant) -> Grant {
		self.store
			.fetch_grant(&grant.id)
			.await
			.expect("Grant fetch should succeed.")
			.expect("Grant should exist.")
	}
}

pub fn codec() -> SecretCodec {
	SecretCodec::new(&[7; 32]).expect("Codec fixture should be valid.")
}

pub fn signer() -> StateSigner {
	StateSigner::new("state-secret").expect("Signer fixture should be valid.")
}

pub fn provider_id() -> ProviderId {
	ProviderId::new(PROVIDER).expect("Provider fixture should be valid.")
}

pub fn org(value: &str) -> OrganizationId {
	OrganizationId::new(value).expect("Organization fixture should be valid.")
}

pub fn user() -> UserId {
	UserId::new("user-1").expect("User fixture should be valid.")
}

pub fn tenant(value: &str) -> ExternalTenantId {
	ExternalTenantId::new(value).expect("Tenant fixture should be valid.")
}

pub fn admin(org_id: &OrganizationId) -> Caller {
	Caller::new(org_id.clone(), user(), OrgRole::Admin)
}

pub fn member(org_id: &OrganizationId) -> Caller {
	Caller::new(org_id.clone(), user(), OrgRole::Member)
}

/// Builds a reqwest client that accepts the self-signed certificates produced by `httpmock`.
pub fn test_reqwest_http_client() -> ReqwestHttpClient {
	let client = ReqwestClient::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.");

	ReqwestHttpClient::with_client(client)
}
