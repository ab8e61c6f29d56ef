//! OAuth-backed [`ProviderApi`] implementation.
//!
//! Code exchange and refresh go through the `oauth2` crate's [`BasicClient`]; revocation,
//! tenant listing, and API calls are issued directly through the same instrumented
//! [`TokenHttpClient`] handle. Every failure is classified by the configured
//! [`ProviderStrategy`].

pub use oauth2;

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use oauth2::{
	AsyncHttpClient, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
	EndpointNotSet, EndpointSet, HttpClientError, HttpRequest, HttpResponse, RedirectUrl,
	RefreshToken, RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicRequestTokenError, BasicTokenResponse},
	http::{
		Method, Request,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
use url::form_urlencoded::{self, Serializer};
// self
use crate::{
	_prelude::*,
	auth::{ExternalTenantId, ProviderId, TokenSecret},
	config::ClientCredentials,
	error::{ConfigError, ProviderError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{
		ClientAuthMethod, DefaultProviderStrategy, IssuedTokens, ProviderApi, ProviderCall,
		ProviderDescriptor, ProviderErrorContext, ProviderFuture, ProviderStrategy,
		ProviderTenant,
	},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";
/// Longest access-token lifetime accepted from a token endpoint (one year).
const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 60 * 60;

/// [`OAuthProviderApi`] specialized for the crate's default reqwest transport stack.
pub type ReqwestProviderApi = OAuthProviderApi<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Maps HTTP transport failures into [`ProviderError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport.
	fn map_transport_error(
		&self,
		call: ProviderCall,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> ProviderError;
}

/// Default mapper for reqwest-backed transports.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		call: ProviderCall,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> ProviderError {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(call, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => ProviderError::Upstream {
				status: meta_status(meta),
				message: format!("HTTP client error during {call}: {message}"),
			},
			_ => ProviderError::Upstream {
				status: meta_status(meta),
				message: format!("HTTP client error during {call}"),
			},
		}
	}
}

/// [`ProviderApi`] backed by a provider descriptor and an OAuth client registration.
pub struct OAuthProviderApi<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	descriptor: ProviderDescriptor,
	strategy: Arc<dyn ProviderStrategy>,
	credentials: ClientCredentials,
	oauth_client: ConfiguredBasicClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> OAuthProviderApi<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an API that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		credentials: ClientCredentials,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self, ConfigError> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let redirect_url = RedirectUrl::new(credentials.redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(credentials.client_id.clone()))
			.set_client_secret(ClientSecret::new(credentials.client_secret.expose().to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url);

		if matches!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self {
			descriptor,
			strategy,
			credentials,
			oauth_client,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		})
	}

	/// Descriptor the API was built from.
	pub fn descriptor(&self) -> &ProviderDescriptor {
		&self.descriptor
	}

	fn map_request_error(
		&self,
		call: ProviderCall,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> ProviderError {
		let meta = meta.as_ref();

		match err {
			RequestTokenError::ServerResponse(response) => {
				let mut ctx = ProviderErrorContext::new(call)
					.with_metadata(meta)
					.with_oauth_error(response.error().as_ref().to_string());

				if let Some(description) = response.error_description() {
					ctx = ctx.with_error_description(description.clone());
				}

				let kind = self.strategy.classify(&ctx);

				ctx.into_error(kind)
			},
			RequestTokenError::Request(error) =>
				self.error_mapper.map_transport_error(call, meta, error),
			RequestTokenError::Parse(source, _body) =>
				ProviderError::Parse { source, status: meta_status(meta) },
			RequestTokenError::Other(message) => ProviderError::Upstream {
				status: meta_status(meta),
				message: format!("{call} returned an unexpected response: {message}"),
			},
		}
	}

	/// Sends a request built outside the `oauth2` facade and classifies non-2xx answers.
	async fn send(
		&self,
		call: ProviderCall,
		request: HttpRequest,
	) -> Result<HttpResponse, ProviderError> {
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let response = handle
			.call(request)
			.await
			.map_err(|e| self.error_mapper.map_transport_error(call, meta.take().as_ref(), e))?;

		if response.status().is_success() {
			return Ok(response);
		}

		let mut ctx = ProviderErrorContext::new(call)
			.with_metadata(meta.take().as_ref())
			.with_http_status(response.status().as_u16());

		match serde_json::from_slice::<OAuthErrorBody>(response.body()) {
			Ok(OAuthErrorBody { error: Some(error), error_description }) => {
				ctx = ctx.with_oauth_error(error);

				if let Some(description) = error_description {
					ctx = ctx.with_error_description(description);
				}
			},
			_ => ctx = ctx.with_body_preview(String::from_utf8_lossy(response.body())),
		}

		let kind = self.strategy.classify(&ctx);

		Err(ctx.into_error(kind))
	}

	fn basic_credentials(&self) -> String {
		let id = form_urlencoded::byte_serialize(self.credentials.client_id.as_bytes())
			.collect::<String>();
		let secret =
			form_urlencoded::byte_serialize(self.credentials.client_secret.expose().as_bytes())
				.collect::<String>();

		format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")))
	}
}
impl OAuthProviderApi<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates an API that provisions its own reqwest transport and the default strategy.
	pub fn new(
		descriptor: ProviderDescriptor,
		credentials: ClientCredentials,
	) -> Result<Self, ConfigError> {
		Self::with_http_client(
			descriptor,
			Arc::new(DefaultProviderStrategy),
			credentials,
			ReqwestHttpClient::default(),
			ReqwestTransportErrorMapper,
		)
	}
}
impl<C, M> ProviderApi for OAuthProviderApi<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn provider_id(&self) -> &ProviderId {
		&self.descriptor.id
	}

	fn authorize_url(&self, state: &str) -> Result<Url, ProviderError> {
		let mut request = self.oauth_client.authorize_url(|| CsrfToken::new(state.to_owned()));

		if let Some(scope) = self.descriptor.scope_param() {
			request = request.add_extra_param("scope", scope);
		}

		let (url, _) = request.url();

		Ok(url)
	}

	fn exchange_code<'a>(&'a self, code: &'a str) -> ProviderFuture<'a, IssuedTokens> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let response = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.request_async(&instrumented)
				.await
				.map_err(|e| self.map_request_error(ProviderCall::CodeExchange, meta.take(), e))?;

			issued_tokens(&response)
		})
	}

	fn refresh_tokens<'a>(
		&'a self,
		refresh_token: &'a TokenSecret,
	) -> ProviderFuture<'a, IssuedTokens> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let secret = RefreshToken::new(refresh_token.expose().to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&secret)
				.request_async(&instrumented)
				.await
				.map_err(|e| self.map_request_error(ProviderCall::Refresh, meta.take(), e))?;

			issued_tokens(&response)
		})
	}

	fn revoke_refresh_token<'a>(
		&'a self,
		refresh_token: &'a TokenSecret,
	) -> ProviderFuture<'a, ()> {
		Box::pin(async move {
			let Some(endpoint) = self.descriptor.endpoints.revocation.as_ref() else {
				return Ok(());
			};
			// `Serializer` is not `Send`; finish it before the first await.
			let (builder, body) = {
				let mut form = Serializer::new(String::new());

				form.append_pair("token", refresh_token.expose())
					.append_pair("token_type_hint", "refresh_token");

				let mut builder = Request::builder()
					.method(Method::POST)
					.uri(endpoint.as_str())
					.header(ACCEPT, JSON)
					.header(CONTENT_TYPE, FORM);

				match self.descriptor.preferred_client_auth_method {
					ClientAuthMethod::ClientSecretBasic =>
						builder = builder.header(AUTHORIZATION, self.basic_credentials()),
					ClientAuthMethod::ClientSecretPost => {
						form.append_pair("client_id", &self.credentials.client_id)
							.append_pair("client_secret", self.credentials.client_secret.expose());
					},
				}

				(builder, form.finish().into_bytes())
			};
			let request = builder.body(body).map_err(ConfigError::from)?;

			self.send(ProviderCall::Revoke, request).await?;

			Ok(())
		})
	}

	fn list_tenants<'a>(
		&'a self,
		access_token: &'a TokenSecret,
	) -> ProviderFuture<'a, Vec<ProviderTenant>> {
		Box::pin(async move {
			let request = bearer_request(&self.descriptor.endpoints.tenants, access_token)
				.body(Vec::new())
				.map_err(ConfigError::from)?;
			let response = self.send(ProviderCall::TenantListing, request).await?;

			parse_json(&response)
		})
	}

	fn get_json<'a>(
		&'a self,
		access_token: &'a TokenSecret,
		tenant: &'a ExternalTenantId,
		path: &'a str,
	) -> ProviderFuture<'a, serde_json::Value> {
		Box::pin(async move {
			let url = self
				.descriptor
				.api_url(path)
				.map_err(|source| ConfigError::InvalidDescriptor { source })?;
			let request = bearer_request(&url, access_token)
				.header(self.descriptor.quirks.tenant_header.as_str(), &tenant[..])
				.body(Vec::new())
				.map_err(ConfigError::from)?;
			let response = self.send(ProviderCall::ApiRequest, request).await?;

			parse_json(&response)
		})
	}
}
impl<C, M> Debug for OAuthProviderApi<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthProviderApi")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.credentials.client_id)
			.finish()
	}
}

#[derive(Deserialize)]
struct OAuthErrorBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
}

fn bearer_request(url: &Url, access_token: &TokenSecret) -> oauth2::http::request::Builder {
	Request::builder()
		.method(Method::GET)
		.uri(url.as_str())
		.header(ACCEPT, JSON)
		.header(AUTHORIZATION, format!("Bearer {}", access_token.expose()))
}

fn issued_tokens(response: &BasicTokenResponse) -> Result<IssuedTokens, ProviderError> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}
	if expires_in > MAX_EXPIRES_IN_SECS {
		return Err(ConfigError::ExpiresInOutOfRange.into());
	}

	Ok(IssuedTokens {
		access_token: TokenSecret::new(response.access_token().secret().to_owned()),
		refresh_token: response
			.refresh_token()
			.map(|token| TokenSecret::new(token.secret().to_owned())),
		expires_in: Duration::seconds(expires_in),
	})
}

fn parse_json<T>(response: &HttpResponse) -> Result<T, ProviderError>
where
	T: for<'de> Deserialize<'de>,
{
	let mut de = serde_json::Deserializer::from_slice(response.body());

	serde_path_to_error::deserialize(&mut de).map_err(|source| ProviderError::Parse {
		source,
		status: Some(response.status().as_u16()),
	})
}

fn map_reqwest_error(call: ProviderCall, err: ReqwestError) -> ProviderError {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return ProviderError::Upstream { status: None, message: format!("{call} timed out") };
	}

	TransportError::from(err).into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}
