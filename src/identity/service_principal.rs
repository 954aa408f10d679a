// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, HttpClientError, RequestTokenError, Scope, TokenResponse,
	TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::{PrincipalKind, PrincipalUsed, ServiceIdentityToken, TokenSecret},
	error::ConfigError,
	http::{HttpClient, ResponseMetadata, ResponseMetadataSlot},
	identity::{CredentialSource, IdentityError, IdentityFuture},
};

/// Public cloud authority used when no other host is configured.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/";

/// Acquires tokens with the OAuth 2.0 client-credentials grant of an application registration.
#[derive(Clone)]
pub struct ServicePrincipalCredential {
	http: HttpClient,
	authority: Option<Url>,
	tenant_id: String,
	app_id: String,
	app_key: TokenSecret,
}
impl ServicePrincipalCredential {
	/// Creates a credential against [`DEFAULT_AUTHORITY`].
	pub fn new(
		http: HttpClient,
		tenant_id: impl Into<String>,
		app_id: impl Into<String>,
		app_key: TokenSecret,
	) -> Self {
		Self {
			http,
			authority: None,
			tenant_id: tenant_id.into(),
			app_id: app_id.into(),
			app_key,
		}
	}

	/// Overrides the authority host (sovereign clouds, tests).
	pub fn with_authority(mut self, authority: Url) -> Self {
		self.authority = Some(authority);

		self
	}

	/// Token endpoint for the configured tenant.
	pub fn token_endpoint(&self) -> Result<Url> {
		let mut endpoint = match &self.authority {
			Some(authority) => authority.clone(),
			None => Url::parse(DEFAULT_AUTHORITY)
				.map_err(|source| ConfigError::InvalidUrl { field: "authority", source })?,
		};

		if endpoint.cannot_be_a_base() {
			return Err(
				ConfigError::CannotBeABase { field: "authority", url: endpoint.to_string() }.into()
			);
		}
		if let Ok(mut segments) = endpoint.path_segments_mut() {
			segments.pop_if_empty().extend([self.tenant_id.as_str(), "oauth2", "v2.0", "token"]);
		}

		Ok(endpoint)
	}

	async fn request(&self, resource: &str) -> Result<ServiceIdentityToken, IdentityError> {
		let endpoint = self
			.token_endpoint()
			.map_err(|e| IdentityError::NotConfigured { reason: e.to_string() })?;
		let token_url = TokenUrl::new(endpoint.to_string()).map_err(|source| {
			let reason = ConfigError::InvalidAuthority { source }.to_string();

			IdentityError::NotConfigured { reason }
		})?;
		let client = BasicClient::new(ClientId::new(self.app_id.clone()))
			.set_client_secret(ClientSecret::new(self.app_key.expose().to_owned()))
			.set_auth_type(AuthType::RequestBody)
			.set_token_uri(token_url);
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http.instrumented(meta.clone());
		let response = client
			.exchange_client_credentials()
			.add_scope(Scope::new(default_scope(resource)))
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(meta.take(), err))?;
		let access_token = response.access_token().secret().to_owned();

		if access_token.trim().is_empty() {
			return Err(IdentityError::Rejected {
				status: meta_status(meta.take().as_ref()),
				message: "the authority returned an empty access token".into(),
			});
		}

		let principal =
			PrincipalUsed::from_access_token(PrincipalKind::ServicePrincipal, &access_token)
				.or_app_id(Some(self.app_id.clone()))
				.or_tenant_id(Some(self.tenant_id.clone()));
		let expires_at = response
			.expires_in()
			.and_then(|ttl| time::Duration::try_from(ttl).ok())
			.and_then(|ttl| OffsetDateTime::now_utc().checked_add(ttl));

		Ok(ServiceIdentityToken::new(access_token)
			.with_principal(principal)
			.with_expires_at(expires_at))
	}
}
impl CredentialSource for ServicePrincipalCredential {
	fn acquire_token<'a>(&'a self, resource: &'a str) -> IdentityFuture<'a> {
		Box::pin(self.request(resource))
	}
}
impl Debug for ServicePrincipalCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServicePrincipalCredential")
			.field("authority", &self.authority)
			.field("tenant_id", &self.tenant_id)
			.field("app_id", &self.app_id)
			.field("app_key", &self.app_key)
			.finish()
	}
}

/// Converts a resource identifier into the `.default` scope understood by v2.0 endpoints.
fn default_scope(resource: &str) -> String {
	format!("{}/.default", resource.trim_end_matches('/'))
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> IdentityError {
	let status = meta_status(meta.as_ref());

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response(status, response),
		RequestTokenError::Request(error) => IdentityError::unreachable(error),
		RequestTokenError::Parse(error, _body) => IdentityError::malformed(error),
		RequestTokenError::Other(message) => IdentityError::Rejected { status, message },
	}
}

fn map_server_response(status: Option<u16>, response: BasicErrorResponse) -> IdentityError {
	let message = match response.error_description() {
		Some(description) => description.clone(),
		None => response.error().as_ref().to_owned(),
	};

	IdentityError::Rejected { status, message }
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}
