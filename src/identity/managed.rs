// self
use crate::{
	_prelude::*,
	auth::{PrincipalKind, PrincipalUsed, ServiceIdentityToken, TokenSecret},
	http::HttpClient,
	identity::{CredentialSource, IdentityError, IdentityFuture},
};

/// Instance metadata service endpoint used when no App Service variables are present.
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const LEGACY_APP_SERVICE_API_VERSION: &str = "2017-09-01";
const IMDS_API_VERSION: &str = "2018-02-01";

/// Where the managed identity token is requested from.
#[derive(Clone, Debug)]
pub enum ManagedIdentityEndpoint {
	/// App Service / Functions endpoint (`IDENTITY_ENDPOINT` + `IDENTITY_HEADER`).
	AppService {
		/// Local identity endpoint.
		endpoint: Url,
		/// Value sent in the `X-IDENTITY-HEADER` header.
		header: TokenSecret,
	},
	/// Legacy App Service endpoint (`MSI_ENDPOINT` + `MSI_SECRET`).
	LegacyAppService {
		/// Local identity endpoint.
		endpoint: Url,
		/// Value sent in the `Secret` header.
		secret: TokenSecret,
	},
	/// Instance metadata service on virtual machines and container hosts.
	InstanceMetadata {
		/// Metadata endpoint, normally [`IMDS_ENDPOINT`].
		endpoint: Url,
	},
	/// The environment names an endpoint that cannot be used.
	Misconfigured {
		/// What is wrong with the environment.
		reason: String,
	},
}
impl ManagedIdentityEndpoint {
	/// Detects the endpoint from the process environment.
	pub fn from_env() -> Self {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Detects the endpoint using `lookup` to read settings.
	///
	/// App Service variables win over the legacy ones; the instance metadata service is the
	/// fallback. A half-configured pair (endpoint without secret or vice versa) is reported as
	/// [`ManagedIdentityEndpoint::Misconfigured`] so the failure surfaces per request.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
		let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

		match (read("IDENTITY_ENDPOINT"), read("IDENTITY_HEADER")) {
			(Some(endpoint), Some(header)) =>
				return match Url::parse(&endpoint) {
					Ok(endpoint) => Self::AppService { endpoint, header: TokenSecret::new(header) },
					Err(e) => Self::Misconfigured {
						reason: format!("IDENTITY_ENDPOINT is invalid ({e})"),
					},
				},
			(Some(_), None) =>
				return Self::Misconfigured {
					reason: "IDENTITY_ENDPOINT is set without IDENTITY_HEADER".into(),
				},
			_ => {},
		}
		match (read("MSI_ENDPOINT"), read("MSI_SECRET")) {
			(Some(endpoint), Some(secret)) =>
				return match Url::parse(&endpoint) {
					Ok(endpoint) =>
						Self::LegacyAppService { endpoint, secret: TokenSecret::new(secret) },
					Err(e) =>
						Self::Misconfigured { reason: format!("MSI_ENDPOINT is invalid ({e})") },
				},
			(Some(_), None) =>
				return Self::Misconfigured {
					reason: "MSI_ENDPOINT is set without MSI_SECRET".into(),
				},
			_ => {},
		}

		match Url::parse(IMDS_ENDPOINT) {
			Ok(endpoint) => Self::InstanceMetadata { endpoint },
			Err(e) => Self::Misconfigured {
				reason: format!("instance metadata endpoint is invalid ({e})"),
			},
		}
	}

	/// Returns a stable label suitable for log fields.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::AppService { .. } => "app_service",
			Self::LegacyAppService { .. } => "legacy_app_service",
			Self::InstanceMetadata { .. } => "instance_metadata",
			Self::Misconfigured { .. } => "misconfigured",
		}
	}

	fn request_url(&self, resource: &str, client_id: Option<&str>) -> Result<Url, IdentityError> {
		let (endpoint, api_version) = match self {
			Self::AppService { endpoint, .. } => (endpoint, APP_SERVICE_API_VERSION),
			Self::LegacyAppService { endpoint, .. } => (endpoint, LEGACY_APP_SERVICE_API_VERSION),
			Self::InstanceMetadata { endpoint } => (endpoint, IMDS_API_VERSION),
			Self::Misconfigured { reason } =>
				return Err(IdentityError::NotConfigured { reason: reason.clone() }),
		};
		let mut url = endpoint.clone();

		{
			let mut query = url.query_pairs_mut();

			query.append_pair("api-version", api_version).append_pair("resource", resource);

			if let Some(client_id) = client_id {
				query.append_pair("client_id", client_id);
			}
		}

		Ok(url)
	}

	fn header(&self) -> Option<(&'static str, &str)> {
		match self {
			Self::AppService { header, .. } => Some(("X-IDENTITY-HEADER", header.expose())),
			Self::LegacyAppService { secret, .. } => Some(("Secret", secret.expose())),
			Self::InstanceMetadata { .. } => Some(("Metadata", "true")),
			Self::Misconfigured { .. } => None,
		}
	}
}

/// Acquires tokens from the managed identity assigned to the hosting environment.
#[derive(Clone, Debug)]
pub struct ManagedIdentityCredential {
	http: HttpClient,
	endpoint: ManagedIdentityEndpoint,
	client_id: Option<String>,
}
impl ManagedIdentityCredential {
	/// Creates a credential for the system-assigned identity behind `endpoint`.
	pub fn new(http: HttpClient, endpoint: ManagedIdentityEndpoint) -> Self {
		Self { http, endpoint, client_id: None }
	}

	/// Targets a user-assigned identity instead of the system-assigned one.
	pub fn with_client_id(mut self, client_id: Option<String>) -> Self {
		self.client_id = client_id;

		self
	}

	/// Endpoint this credential talks to.
	pub fn endpoint(&self) -> &ManagedIdentityEndpoint {
		&self.endpoint
	}

	async fn request(&self, resource: &str) -> Result<ServiceIdentityToken, IdentityError> {
		let url = self.endpoint.request_url(resource, self.client_id.as_deref())?;
		let mut request = self.http.get(url);

		if let Some((name, value)) = self.endpoint.header() {
			request = request.header(name, value);
		}

		let response = request.send().await.map_err(IdentityError::unreachable)?;
		let status = response.status();
		let body = response.text().await.map_err(IdentityError::unreachable)?;

		if !status.is_success() {
			return Err(IdentityError::Rejected {
				status: Some(status.as_u16()),
				message: rejection_message(status, &body),
			});
		}

		let mut de = serde_json::Deserializer::from_str(&body);
		let parsed: ManagedIdentityResponse =
			serde_path_to_error::deserialize(&mut de).map_err(IdentityError::malformed)?;

		if parsed.access_token.is_empty() {
			return Err(IdentityError::Rejected {
				status: Some(status.as_u16()),
				message: "the endpoint returned an empty access token".into(),
			});
		}

		let principal = PrincipalUsed::from_access_token(
			PrincipalKind::ManagedIdentity,
			parsed.access_token.expose(),
		)
		.or_app_id(parsed.client_id.or_else(|| self.client_id.clone()));
		let expires_at = parsed
			.expires_on
			.and_then(EpochSeconds::into_i64)
			.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());

		Ok(ServiceIdentityToken {
			access_token: parsed.access_token,
			principal: Some(principal),
			expires_at,
		})
	}
}
impl CredentialSource for ManagedIdentityCredential {
	fn acquire_token<'a>(&'a self, resource: &'a str) -> IdentityFuture<'a> {
		Box::pin(self.request(resource))
	}
}

#[derive(Debug, Deserialize)]
struct ManagedIdentityResponse {
	access_token: TokenSecret,
	#[serde(default)]
	expires_on: Option<EpochSeconds>,
	#[serde(default)]
	client_id: Option<String>,
}

/// Identity endpoints disagree on whether `expires_on` is a number or a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EpochSeconds {
	Number(i64),
	Text(String),
}
impl EpochSeconds {
	fn into_i64(self) -> Option<i64> {
		match self {
			Self::Number(secs) => Some(secs),
			Self::Text(raw) => raw.trim().parse().ok(),
		}
	}
}

#[derive(Debug, Default, Deserialize)]
struct EndpointErrorBody {
	#[serde(default)]
	error: Option<serde_json::Value>,
	#[serde(default)]
	error_description: Option<String>,
	#[serde(default)]
	message: Option<String>,
}

fn rejection_message(status: StatusCode, body: &str) -> String {
	const PREVIEW_LEN: usize = 256;

	let parsed = serde_json::from_str::<EndpointErrorBody>(body).unwrap_or_default();
	let error_code = parsed.error.as_ref().and_then(|error| match error {
		serde_json::Value::String(code) => Some(code.clone()),
		serde_json::Value::Object(map) =>
			map.get("message").and_then(|message| message.as_str()).map(str::to_owned),
		_ => None,
	});

	if let Some(message) = parsed.error_description.or(parsed.message).or(error_code) {
		return message;
	}

	let preview: String = body.trim().chars().take(PREVIEW_LEN).collect();

	if preview.is_empty() { format!("HTTP {status}") } else { format!("HTTP {status}: {preview}") }
}
