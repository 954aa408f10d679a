//! Service identity acquisition.
//!
//! [`CredentialSource`] is the seam between the flow and the ambient identity of the process.
//! Production code picks an implementation from the environment with [`credential_from_env`]:
//!
//! - `AzureServicesAuthConnectionString=RunAs=App;AppId=..;TenantId=..;AppKey=..` selects a
//!   [`ServicePrincipalCredential`].
//! - `AzureServicesAuthConnectionString=RunAs=App[;AppId=..]` selects a (user-assigned)
//!   [`ManagedIdentityCredential`].
//! - Without a connection string a managed identity is used, honoring `AZURE_CLIENT_ID`.
//!
//! Tests substitute their own source returning canned tokens or errors.

mod managed;
mod service_principal;

pub use managed::*;
pub use service_principal::*;

// self
use crate::{
	_prelude::*,
	auth::{ServiceIdentityToken, TokenSecret},
	error::ConfigError,
	http::HttpClient,
};

/// Environment variable holding the identity connection string.
pub const CONNECTION_STRING_ENV: &str = "AzureServicesAuthConnectionString";
/// Environment variable naming a user-assigned managed identity.
pub const CLIENT_ID_ENV: &str = "AZURE_CLIENT_ID";

/// Boxed future returned by [`CredentialSource::acquire_token`].
pub type IdentityFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ServiceIdentityToken, IdentityError>> + 'a + Send>>;

/// Capability that yields bearer tokens for a resource audience.
pub trait CredentialSource
where
	Self: Send + Sync,
{
	/// Requests a token whose audience is `resource`.
	fn acquire_token<'a>(&'a self, resource: &'a str) -> IdentityFuture<'a>;
}

/// Failures raised while acquiring a service identity token.
#[derive(Debug, ThisError)]
pub enum IdentityError {
	/// No usable identity mechanism is configured for this process.
	#[error("Service identity is not configured: {reason}.")]
	NotConfigured {
		/// What is missing or invalid.
		reason: String,
	},
	/// The identity endpoint could not be reached.
	#[error("Identity endpoint could not be reached.")]
	Unreachable {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// The identity endpoint denied the token request.
	#[error("Identity endpoint rejected the token request: {message}.")]
	Rejected {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Endpoint-supplied reason.
		message: String,
	},
	/// The identity endpoint answered with a body that could not be parsed.
	#[error("Identity endpoint returned a malformed token response.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: BoxError,
	},
}
impl IdentityError {
	/// Wraps a transport failure as [`IdentityError::Unreachable`].
	pub fn unreachable(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Unreachable { source: Box::new(src) }
	}

	/// Wraps a parsing failure as [`IdentityError::MalformedResponse`].
	pub fn malformed(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::MalformedResponse { source: Box::new(src) }
	}
}

/// Credential chosen from the identity connection string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialSelection {
	/// Managed identity, optionally user-assigned.
	ManagedIdentity {
		/// Client identifier of a user-assigned identity.
		client_id: Option<String>,
	},
	/// Service principal authenticating with a client secret.
	ServicePrincipal {
		/// Application (client) identifier.
		app_id: String,
		/// Directory (tenant) identifier.
		tenant_id: String,
		/// Client secret.
		app_key: TokenSecret,
	},
}
impl CredentialSelection {
	/// Resolves the selection from an optional connection string and an optional
	/// user-assigned client id.
	pub fn resolve(
		connection_string: Option<&str>,
		client_id: Option<String>,
	) -> Result<Self, ConfigError> {
		match connection_string.map(str::trim).filter(|value| !value.is_empty()) {
			Some(raw) => Self::parse_connection_string(raw),
			None => Ok(Self::ManagedIdentity { client_id: client_id.filter(|id| !id.is_empty()) }),
		}
	}

	/// Parses a `key=value;key=value` identity connection string.
	///
	/// Keys are case-insensitive. Only `RunAs=App` is supported.
	pub fn parse_connection_string(raw: &str) -> Result<Self, ConfigError> {
		let mut run_as = None;
		let mut app_id = None;
		let mut tenant_id = None;
		let mut app_key = None;

		for pair in raw.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
			let (key, value) =
				pair.split_once('=').ok_or_else(|| ConfigError::UnsupportedConnectionString {
					reason: "every segment must be a key=value pair".into(),
				})?;
			let value = value.trim().to_owned();

			match key.trim().to_ascii_lowercase().as_str() {
				"runas" => run_as = Some(value),
				"appid" => app_id = Some(value),
				"tenantid" => tenant_id = Some(value),
				"appkey" => app_key = Some(value),
				other =>
					return Err(ConfigError::UnsupportedConnectionString {
						reason: format!("unknown key `{other}`"),
					}),
			}
		}

		match run_as.as_deref() {
			Some(mode) if mode.eq_ignore_ascii_case("app") => {},
			Some(mode) =>
				return Err(ConfigError::UnsupportedConnectionString {
					reason: format!("RunAs={mode} is not supported"),
				}),
			None =>
				return Err(ConfigError::UnsupportedConnectionString {
					reason: "RunAs is required".into(),
				}),
		}

		match (app_id, tenant_id, app_key) {
			(Some(app_id), Some(tenant_id), Some(app_key)) => Ok(Self::ServicePrincipal {
				app_id,
				tenant_id,
				app_key: TokenSecret::new(app_key),
			}),
			(_, _, Some(_)) => Err(ConfigError::UnsupportedConnectionString {
				reason: "AppKey requires both AppId and TenantId".into(),
			}),
			(app_id, _, None) => Ok(Self::ManagedIdentity { client_id: app_id }),
		}
	}

	/// Builds the credential source for this selection over the shared client.
	pub fn into_source(self, http: HttpClient) -> Arc<dyn CredentialSource> {
		match self {
			Self::ManagedIdentity { client_id } => Arc::new(
				ManagedIdentityCredential::new(http, ManagedIdentityEndpoint::from_env())
					.with_client_id(client_id),
			),
			Self::ServicePrincipal { app_id, tenant_id, app_key } =>
				Arc::new(ServicePrincipalCredential::new(http, tenant_id, app_id, app_key)),
		}
	}
}

/// Picks a credential source from the process environment.
pub fn credential_from_env(http: HttpClient) -> Result<Arc<dyn CredentialSource>> {
	let connection_string = std::env::var(CONNECTION_STRING_ENV).ok();
	let client_id = std::env::var(CLIENT_ID_ENV).ok();
	let selection = CredentialSelection::resolve(connection_string.as_deref(), client_id)?;

	Ok(selection.into_source(http))
}
