//! Integration flows orchestrated by the [`Integrations`] facade.
//!
//! Every flow borrows the same collaborators: the grant store, the provider API, the secret
//! codec, and the state signer. The facade also owns the in-process single-flight map used by
//! refreshes, so clones share it and two refreshes of one grant never reach the provider twice.

pub mod connect;
pub mod disconnect;
pub mod keep_alive;
pub mod refresh;
pub mod retry;
pub mod status;
pub mod token;

mod common;

pub use connect::*;
pub use disconnect::*;
pub use keep_alive::*;
pub use refresh::*;
pub use status::*;
pub use token::*;

// self
use crate::{
	_prelude::*,
	config::{FlowOptions, Settings},
	crypto::{SecretCodec, StateSigner},
	provider::ProviderApi,
	store::GrantStore,
	sync::LockStore,
};

/// Shared entry point for connect, token, disconnect, and upkeep flows.
#[derive(Clone)]
pub struct Integrations {
	store: Arc<dyn GrantStore>,
	provider: Arc<dyn ProviderApi>,
	codec: SecretCodec,
	signer: StateSigner,
	tenant_selection_url: Url,
	options: FlowOptions,
	refresh_lock: Option<Arc<dyn LockStore>>,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	inflight: Arc<InflightRefreshes>,
}
impl Integrations {
	/// Wires the flows with default [`FlowOptions`] and no cross-process refresh lock.
	pub fn new(
		store: Arc<dyn GrantStore>,
		provider: Arc<dyn ProviderApi>,
		codec: SecretCodec,
		signer: StateSigner,
		tenant_selection_url: Url,
	) -> Self {
		Self {
			store,
			provider,
			codec,
			signer,
			tenant_selection_url,
			options: FlowOptions::default(),
			refresh_lock: None,
			refresh_metrics: Default::default(),
			inflight: Default::default(),
		}
	}

	/// Wires the flows from validated [`Settings`].
	pub fn from_settings(
		settings: &Settings,
		store: Arc<dyn GrantStore>,
		provider: Arc<dyn ProviderApi>,
	) -> Self {
		Self::new(
			store,
			provider,
			settings.codec.clone(),
			settings.signer.clone(),
			settings.tenant_selection_url.clone(),
		)
		.with_options(settings.flow)
	}

	/// Replaces the token-lifecycle tunables.
	pub fn with_options(mut self, options: FlowOptions) -> Self {
		self.options = options;

		self
	}

	/// Guards refreshes with a distributed lock so only one process redeems a refresh token.
	pub fn with_refresh_lock(mut self, locks: Arc<dyn LockStore>) -> Self {
		self.refresh_lock = Some(locks);

		self
	}

	/// Grant and binding store.
	pub fn store(&self) -> &Arc<dyn GrantStore> {
		&self.store
	}

	/// Provider API.
	pub fn provider(&self) -> &Arc<dyn ProviderApi> {
		&self.provider
	}

	/// Active token-lifecycle tunables.
	pub fn options(&self) -> &FlowOptions {
		&self.options
	}
}
impl Debug for Integrations {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Integrations")
			.field("provider", self.provider.provider_id())
			.field("tenant_selection_url", &self.tenant_selection_url.as_str())
			.field("options", &self.options)
			.field("refresh_lock", &self.refresh_lock.is_some())
			.finish()
	}
}
