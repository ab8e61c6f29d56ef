// std
use std::iter::IntoIterator;
// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	provider::{ClientAuthMethod, ProviderDescriptor, ProviderEndpoints, ProviderQuirks},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderDescriptorError {
	/// Authorization endpoint is required by the connect flow.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is mandatory for code exchange and refresh.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Tenant listing endpoint is required for tenant selection.
	#[error("Missing tenants endpoint.")]
	MissingTenantsEndpoint,
	/// API base URL is required for API calls.
	#[error("Missing API base URL.")]
	MissingApiBase,
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Reject scope delimiters that are control characters.
	#[error("Scope delimiter must be a printable character.")]
	InvalidScopeDelimiter {
		/// Invalid delimiter that was supplied.
		delimiter: char,
	},
	/// Scopes cannot contain whitespace or be empty.
	#[error("Scope `{scope}` is invalid.")]
	InvalidScope {
		/// Offending scope value.
		scope: String,
	},
	/// A built-in preset could not be assembled.
	#[error("Descriptor preset is malformed: {reason}.")]
	InvalidPreset {
		/// Parser message.
		reason: String,
	},
	/// The tenant header must be a valid, non-empty HTTP header name.
	#[error("Tenant header `{header}` is not a valid header name.")]
	InvalidTenantHeader {
		/// Offending header name.
		header: String,
	},
}

/// Builder for [`ProviderDescriptor`] values.
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	/// Identifier for the descriptor being constructed.
	pub id: ProviderId,
	/// Authorization endpoint.
	pub authorization_endpoint: Option<Url>,
	/// Token endpoint used for exchanges and refreshes.
	pub token_endpoint: Option<Url>,
	/// Optional revocation endpoint.
	pub revocation_endpoint: Option<Url>,
	/// Tenant listing endpoint.
	pub tenants_endpoint: Option<Url>,
	/// API base URL.
	pub api_base: Option<Url>,
	/// Scopes requested during authorization.
	pub scopes: Vec<String>,
	/// Preferred client authentication method for the token endpoint.
	pub preferred_client_auth_method: ClientAuthMethod,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptorBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: ProviderId) -> Self {
		Self {
			id,
			authorization_endpoint: None,
			token_endpoint: None,
			revocation_endpoint: None,
			tenants_endpoint: None,
			api_base: None,
			scopes: Vec::new(),
			preferred_client_auth_method: ClientAuthMethod::default(),
			quirks: ProviderQuirks::default(),
		}
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the optional revocation endpoint.
	pub fn revocation_endpoint(mut self, url: Url) -> Self {
		self.revocation_endpoint = Some(url);

		self
	}

	/// Sets the tenant listing endpoint.
	pub fn tenants_endpoint(mut self, url: Url) -> Self {
		self.tenants_endpoint = Some(url);

		self
	}

	/// Sets the API base URL.
	pub fn api_base(mut self, url: Url) -> Self {
		self.api_base = Some(url);

		self
	}

	/// Replaces the requested scopes.
	pub fn scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Overrides the preferred client authentication method.
	pub fn preferred_client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.preferred_client_auth_method = method;

		self
	}

	/// Overrides the provider quirks.
	pub fn quirks(mut self, quirks: ProviderQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let authorization = self
			.authorization_endpoint
			.ok_or(ProviderDescriptorError::MissingAuthorizationEndpoint)?;
		let token = self.token_endpoint.ok_or(ProviderDescriptorError::MissingTokenEndpoint)?;
		let tenants =
			self.tenants_endpoint.ok_or(ProviderDescriptorError::MissingTenantsEndpoint)?;
		let api_base = self.api_base.ok_or(ProviderDescriptorError::MissingApiBase)?;
		let endpoints = ProviderEndpoints {
			authorization,
			token,
			revocation: self.revocation_endpoint,
			tenants,
			api_base,
		};
		let descriptor = ProviderDescriptor {
			id: self.id,
			endpoints,
			scopes: self.scopes,
			preferred_client_auth_method: self.preferred_client_auth_method,
			quirks: self.quirks,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ProviderDescriptor {
	/// Validates invariants for the descriptor.
	fn validate(&self) -> Result<(), ProviderDescriptorError> {
		validate_endpoint("authorization", &self.endpoints.authorization)?;
		validate_endpoint("token", &self.endpoints.token)?;

		if let Some(revocation) = self.endpoints.revocation.as_ref() {
			validate_endpoint("revocation", revocation)?;
		}

		validate_endpoint("tenants", &self.endpoints.tenants)?;
		validate_endpoint("api", &self.endpoints.api_base)?;
		validate_scope_delimiter(self.quirks.scope_delimiter)?;

		if let Some(scope) =
			self.scopes.iter().find(|scope| scope.is_empty() || scope.contains(char::is_whitespace))
		{
			return Err(ProviderDescriptorError::InvalidScope { scope: scope.clone() });
		}
		if oauth2::http::HeaderName::from_bytes(self.quirks.tenant_header.as_bytes()).is_err() {
			return Err(ProviderDescriptorError::InvalidTenantHeader {
				header: self.quirks.tenant_header.clone(),
			});
		}

		Ok(())
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	if url.scheme() != "https" {
		Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}

fn validate_scope_delimiter(delimiter: char) -> Result<(), ProviderDescriptorError> {
	if delimiter.is_control() {
		Err(ProviderDescriptorError::InvalidScopeDelimiter { delimiter })
	} else {
		Ok(())
	}
}
