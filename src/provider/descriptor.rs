//! Provider descriptor data structures shared by the connect, token, and sync paths.

/// Builder API for assembling provider descriptors.
pub mod builder;
/// Provider-specific quirk toggles.
pub mod quirks;

pub use builder::*;
pub use quirks::*;

// self
use crate::{_prelude::*, auth::ProviderId};

/// Endpoints of the Xero accounting platform used by [`ProviderDescriptor::xero`].
pub mod xero {
	/// Consent page.
	pub const AUTHORIZATION: &str = "https://login.xero.com/identity/connect/authorize";
	/// Code exchange and refresh.
	pub const TOKEN: &str = "https://identity.xero.com/connect/token";
	/// Refresh token revocation.
	pub const REVOCATION: &str = "https://identity.xero.com/connect/revocation";
	/// Tenants a grant can reach.
	pub const CONNECTIONS: &str = "https://api.xero.com/connections";
	/// Accounting API root.
	pub const API_BASE: &str = "https://api.xero.com/api.xro/2.0/";
	/// Scopes requested when none are configured.
	pub const DEFAULT_SCOPES: [&str; 4] = [
		"offline_access",
		"accounting.transactions.read",
		"accounting.contacts.read",
		"accounting.settings.read",
	];
}

/// Client authentication modes for token and revocation endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint the connect flow redirects to.
	pub authorization: Url,
	/// Token endpoint used for code exchanges and refreshes.
	pub token: Url,
	/// Optional revocation endpoint; without it disconnects skip the upstream call.
	pub revocation: Option<Url>,
	/// Endpoint listing the tenants (organizations) a grant can reach.
	pub tenants: Url,
	/// Base URL joined with relative paths for API calls.
	pub api_base: Url,
}

/// Immutable provider descriptor consumed by flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Descriptor identifier.
	pub id: ProviderId,
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Scopes requested during authorization.
	pub scopes: Vec<String>,
	/// Preferred client authentication mechanism.
	pub preferred_client_auth_method: ClientAuthMethod,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(id)
	}

	/// Descriptor for the Xero accounting platform with its production endpoints.
	///
	/// `offline_access` is required for refresh tokens; an empty `scopes` falls back to
	/// [`xero::DEFAULT_SCOPES`].
	pub fn xero<I, S>(scopes: I) -> Result<Self, ProviderDescriptorError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let parse = |url: &str| {
			Url::parse(url)
				.map_err(|e| ProviderDescriptorError::InvalidPreset { reason: e.to_string() })
		};
		let id = ProviderId::new("xero")
			.map_err(|e| ProviderDescriptorError::InvalidPreset { reason: e.to_string() })?;
		let mut scopes = scopes.into_iter().map(Into::into).collect::<Vec<String>>();

		if scopes.is_empty() {
			scopes = xero::DEFAULT_SCOPES.iter().map(|scope| scope.to_string()).collect();
		}

		Self::builder(id)
			.authorization_endpoint(parse(xero::AUTHORIZATION)?)
			.token_endpoint(parse(xero::TOKEN)?)
			.revocation_endpoint(parse(xero::REVOCATION)?)
			.tenants_endpoint(parse(xero::CONNECTIONS)?)
			.api_base(parse(xero::API_BASE)?)
			.scopes(scopes)
			.preferred_client_auth_method(ClientAuthMethod::ClientSecretBasic)
			.build()
	}

	/// Resolves an API path against [`ProviderEndpoints::api_base`].
	///
	/// Leading slashes are ignored so `"/Invoices"` and `"Invoices"` resolve identically.
	pub fn api_url(&self, path: &str) -> Result<Url, url::ParseError> {
		let mut base = self.endpoints.api_base.clone();

		if !base.path().ends_with('/') {
			let with_slash = format!("{}/", base.path());

			base.set_path(&with_slash);
		}

		base.join(path.trim_start_matches('/'))
	}

	/// Joins the requested scopes with the provider's delimiter.
	pub fn scope_param(&self) -> Option<String> {
		if self.scopes.is_empty() {
			return None;
		}

		let delimiter = self.quirks.scope_delimiter.to_string();

		Some(self.scopes.join(&delimiter))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn descriptor(api_base: &str) -> ProviderDescriptor {
		ProviderDescriptor::builder(ProviderId::new("xero").expect("Provider id should be valid."))
			.authorization_endpoint(
				Url::parse("https://login.example.com/authorize")
					.expect("Authorization URL should parse."),
			)
			.token_endpoint(
				Url::parse("https://identity.example.com/token").expect("Token URL should parse."),
			)
			.tenants_endpoint(
				Url::parse("https://api.example.com/connections")
					.expect("Tenants URL should parse."),
			)
			.api_base(Url::parse(api_base).expect("API base should parse."))
			.scopes(["offline_access", "accounting.transactions"])
			.build()
			.expect("Descriptor fixture should build.")
	}

	#[test]
	fn api_url_joins_relative_paths() {
		for base in ["https://api.example.com/api.xro/2.0", "https://api.example.com/api.xro/2.0/"]
		{
			let descriptor = descriptor(base);

			assert_eq!(
				descriptor.api_url("/Invoices").expect("API path should join.").as_str(),
				"https://api.example.com/api.xro/2.0/Invoices",
			);
			assert_eq!(
				descriptor.api_url("Contacts?page=2").expect("API path should join.").as_str(),
				"https://api.example.com/api.xro/2.0/Contacts?page=2",
			);
		}
	}

	#[test]
	fn xero_preset_is_complete() {
		let descriptor =
			ProviderDescriptor::xero(Vec::<String>::new()).expect("Xero preset should build.");

		assert_eq!(&*descriptor.id, "xero");
		assert_eq!(descriptor.scopes.len(), xero::DEFAULT_SCOPES.len());
		assert!(descriptor.endpoints.revocation.is_some());
		assert_eq!(
			descriptor.api_url("Invoices").expect("API path should join.").as_str(),
			"https://api.xero.com/api.xro/2.0/Invoices",
		);

		let narrowed = ProviderDescriptor::xero(["offline_access", "accounting.transactions"])
			.expect("Xero preset should build.");

		assert_eq!(
			narrowed.scope_param().as_deref(),
			Some("offline_access accounting.transactions")
		);
	}

	#[test]
	fn scope_param_uses_delimiter() {
		let mut descriptor = descriptor("https://api.example.com/");

		assert_eq!(
			descriptor.scope_param().as_deref(),
			Some("offline_access accounting.transactions")
		);

		descriptor.quirks.scope_delimiter = ',';

		assert_eq!(
			descriptor.scope_param().as_deref(),
			Some("offline_access,accounting.transactions")
		);

		descriptor.scopes.clear();

		assert_eq!(descriptor.scope_param(), None);
	}
}
