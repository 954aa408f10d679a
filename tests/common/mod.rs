//! Shared fixtures for integration tests: canned credential sources, a recording lister, and
//! small URL/config helpers.

#![allow(dead_code)]

// std
use std::{
	io::{Error as IoError, ErrorKind},
	net::TcpListener,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
// self
use token_vault_flow::{
	auth::{PrincipalKind, PrincipalUsed, ServiceIdentityToken, TokenSecret},
	config::{BrokerVariant, FlowConfig},
	http::{DEFAULT_TIMEOUT, HttpClient},
	identity::{CredentialSource, IdentityError, IdentityFuture},
	listing::{DirectoryEntry, DownstreamListError, ListingFuture, ResourceLister},
	reqwest::{Client, redirect::Policy},
	url::Url,
};

pub const BROKER_PATH: &str = "/services/dropbox/tokens/sampleToken";

pub fn url(value: &str) -> Url {
	Url::parse(value).expect("Test URL should parse.")
}

/// Builds a client that accepts the self-signed certificates served by `httpmock`, with the
/// same timeout and redirect policy as [`HttpClient::new`].
pub fn http_client() -> HttpClient {
	let client = Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.timeout(DEFAULT_TIMEOUT)
		.redirect(Policy::none())
		.build()
		.expect("Failed to build insecure reqwest client for tests.");

	HttpClient::with_client(client)
}

pub fn request_url() -> Url {
	url("https://app.example/Home/Index")
}

pub fn flow_config(variant: BrokerVariant, broker_url: &str) -> FlowConfig {
	FlowConfig::new(variant, url(broker_url)).expect("Loopback broker URL should be accepted.")
}

/// Returns a loopback URL whose port has no listener, so connecting is refused.
pub fn refused_url(path: &str) -> Url {
	let listener = TcpListener::bind("127.0.0.1:0").expect("Ephemeral port should bind.");
	let port = listener.local_addr().expect("Bound listener should report its address.").port();

	drop(listener);

	url(&format!("http://127.0.0.1:{port}{path}"))
}

/// Builds an unsigned JWT whose payload carries the given claims.
pub fn jwt_with_claims(claims: serde_json::Value) -> String {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
	let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

	format!("{header}.{payload}.signature")
}

enum CredentialOutcome {
	Token(ServiceIdentityToken),
	Refused(String),
}

/// Credential source returning a canned token or a refused-connection error.
pub struct FakeCredential {
	outcome: CredentialOutcome,
	calls: AtomicUsize,
	resources: Mutex<Vec<String>>,
}
impl FakeCredential {
	pub fn token(access_token: &str) -> Arc<Self> {
		let token = ServiceIdentityToken::new(access_token).with_principal(PrincipalUsed {
			kind: PrincipalKind::ManagedIdentity,
			app_id: Some("app-1".into()),
			tenant_id: Some("tenant-1".into()),
			object_id: None,
		});

		Self::with_token(token)
	}

	pub fn with_token(token: ServiceIdentityToken) -> Arc<Self> {
		Arc::new(Self::build(CredentialOutcome::Token(token)))
	}

	pub fn refused(message: &str) -> Arc<Self> {
		Arc::new(Self::build(CredentialOutcome::Refused(message.into())))
	}

	fn build(outcome: CredentialOutcome) -> Self {
		Self { outcome, calls: AtomicUsize::new(0), resources: Mutex::new(Vec::new()) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn resources(&self) -> Vec<String> {
		self.resources.lock().clone()
	}
}
impl CredentialSource for FakeCredential {
	fn acquire_token<'a>(&'a self, resource: &'a str) -> IdentityFuture<'a> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.resources.lock().push(resource.to_owned());

		let result = match &self.outcome {
			CredentialOutcome::Token(token) => Ok(token.clone()),
			CredentialOutcome::Refused(message) => Err(IdentityError::unreachable(IoError::new(
				ErrorKind::ConnectionRefused,
				message.clone(),
			))),
		};

		Box::pin(async move { result })
	}
}

enum ListingOutcome {
	Entries(Vec<DirectoryEntry>),
	Unauthorized(String),
}

/// Lister that records every token it receives and answers with a canned outcome.
pub struct RecordingLister {
	outcome: ListingOutcome,
	tokens: Mutex<Vec<String>>,
}
impl RecordingLister {
	pub fn entries(entries: Vec<DirectoryEntry>) -> Arc<Self> {
		Arc::new(Self { outcome: ListingOutcome::Entries(entries), tokens: Mutex::new(Vec::new()) })
	}

	pub fn unauthorized(summary: &str) -> Arc<Self> {
		Arc::new(Self {
			outcome: ListingOutcome::Unauthorized(summary.into()),
			tokens: Mutex::new(Vec::new()),
		})
	}

	pub fn calls(&self) -> usize {
		self.tokens.lock().len()
	}

	pub fn tokens(&self) -> Vec<String> {
		self.tokens.lock().clone()
	}
}
impl ResourceLister for RecordingLister {
	fn list_root_folder<'a>(&'a self, token: Option<&'a TokenSecret>) -> ListingFuture<'a> {
		self.tokens.lock().push(token.map(|token| token.expose().to_owned()).unwrap_or_default());

		let result = match &self.outcome {
			ListingOutcome::Entries(entries) => Ok(entries.clone()),
			ListingOutcome::Unauthorized(summary) =>
				Err(DownstreamListError::Unauthorized { summary: summary.clone() }),
		};

		Box::pin(async move { result })
	}
}
