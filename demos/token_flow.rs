//! Runs the full token flow against local mock servers standing in for the App Service identity
//! endpoint, a token vault, and the Dropbox API, then prints the rendered result.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use token_vault_flow::{
	auth::TokenSecret,
	config::{BrokerVariant, FlowConfig},
	flow::TokenFlow,
	http::{DEFAULT_TIMEOUT, HttpClient},
	identity::{ManagedIdentityCredential, ManagedIdentityEndpoint},
	listing::DropboxLister,
	reqwest::{Client, redirect::Policy},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let identity_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/msi/token")
				.query_param("resource", BrokerVariant::Vault.resource())
				.header("x-identity-header", "demo-header");
			then.status(200).header("content-type", "application/json").body(concat!(
				"{\"access_token\":\"demo-identity-token\",",
				"\"expires_on\":\"1900000000\",\"client_id\":\"demo-app\"}",
			));
		})
		.await;
	let broker_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/services/dropbox/tokens/sampleToken")
				.header("authorization", "Bearer demo-identity-token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"value\":{\"accessToken\":\"demo-dropbox-token\"},\"expiresIn\":3600}");
		})
		.await;
	let dropbox_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/2/files/list_folder")
				.header("authorization", "Bearer demo-dropbox-token");
			then.status(200).header("content-type", "application/json").body(concat!(
				"{\"entries\":[{\".tag\":\"file\",\"name\":\"notes.txt\"},{\".tag\":\"folder\",",
				"\"name\":\"Photos\"}],\"cursor\":\"c\",\"has_more\":false}",
			));
		})
		.await;
	// The mock server presents a self-signed certificate.
	let http = HttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.timeout(DEFAULT_TIMEOUT)
			.redirect(Policy::none())
			.build()?,
	);
	let credential = ManagedIdentityCredential::new(
		http.clone(),
		ManagedIdentityEndpoint::AppService {
			endpoint: Url::parse(&server.url("/msi/token"))?,
			header: TokenSecret::new("demo-header"),
		},
	);
	let config = FlowConfig::new(
		BrokerVariant::Vault,
		Url::parse(&server.url("/services/dropbox/tokens/sampleToken"))?,
	)?;
	let lister = DropboxLister::with_api_base(http.clone(), Url::parse(&server.base_url())?)?;
	let flow = TokenFlow::new(config, Arc::new(credential), http).with_lister(Arc::new(lister));
	let result = flow.run(&Url::parse("https://app.example/Home/Index")?).await;

	identity_mock.assert_async().await;
	broker_mock.assert_async().await;
	dropbox_mock.assert_async().await;

	println!("outcome: {}", result.outcome);

	if let Some(principal) = &result.principal_display {
		println!("{principal}");
	}
	if let Some(secret) = &result.secret_display {
		println!("{secret}");
	}
	if let Some(error) = &result.error_message {
		println!("{error}");
	}

	for line in result.file_list() {
		println!("{line}");
	}

	println!("login: {}", result.login_link);
	println!("{}", serde_json::to_string_pretty(&result)?);

	Ok(())
}
