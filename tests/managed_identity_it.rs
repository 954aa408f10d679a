mod common;

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use common::*;
use token_vault_flow::{
	auth::{PrincipalKind, TokenSecret},
	identity::{
		CredentialSource, IdentityError, ManagedIdentityCredential, ManagedIdentityEndpoint,
	},
};

const STORE_RESOURCE: &str = "https://tokenstore.azure.net";

fn app_service(server: &MockServer) -> ManagedIdentityEndpoint {
	ManagedIdentityEndpoint::AppService {
		endpoint: url(&server.url("/msi/token")),
		header: TokenSecret::new("identity-header"),
	}
}

#[tokio::test]
async fn app_service_endpoint_returns_token_with_principal() {
	let server = MockServer::start_async().await;
	let claims = json!({ "appid": "app-from-claims", "tid": "tenant-1", "oid": "object-1" });
	let access_token = jwt_with_claims(claims);
	let body = json!({
		"access_token": access_token,
		"expires_on": "1900000000",
		"resource": STORE_RESOURCE,
		"token_type": "Bearer",
		"client_id": "app-from-response"
	})
	.to_string();
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/msi/token")
				.query_param("api-version", "2019-08-01")
				.query_param("resource", STORE_RESOURCE)
				.header("x-identity-header", "identity-header");
			then.status(200).header("content-type", "application/json").body(body);
		})
		.await;
	let credential = ManagedIdentityCredential::new(http_client(), app_service(&server));
	let token = credential
		.acquire_token(STORE_RESOURCE)
		.await
		.expect("App Service identity should issue a token.");
	let principal = token.principal.expect("Managed identity tokens carry a principal.");

	assert_eq!(token.access_token.expose(), access_token);
	assert_eq!(principal.kind, PrincipalKind::ManagedIdentity);
	assert_eq!(principal.app_id.as_deref(), Some("app-from-claims"));
	assert_eq!(principal.tenant_id.as_deref(), Some("tenant-1"));
	assert_eq!(principal.object_id.as_deref(), Some("object-1"));
	assert_eq!(token.expires_at.map(|at| at.unix_timestamp()), Some(1_900_000_000));
	mock.assert_async().await;
}

#[tokio::test]
async fn user_assigned_client_id_is_forwarded() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/msi/token").query_param("client_id", "user-assigned");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"opaque-token\",\"expires_on\":1900000000}");
		})
		.await;
	let credential = ManagedIdentityCredential::new(http_client(), app_service(&server))
		.with_client_id(Some("user-assigned".into()));
	let token = credential
		.acquire_token(STORE_RESOURCE)
		.await
		.expect("User-assigned identity should issue a token.");
	let principal = token.principal.expect("Managed identity tokens carry a principal.");

	assert_eq!(principal.app_id.as_deref(), Some("user-assigned"));
	assert_eq!(token.expires_at.map(|at| at.unix_timestamp()), Some(1_900_000_000));
	mock.assert_async().await;
}

#[tokio::test]
async fn legacy_endpoint_uses_the_secret_header() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/legacy")
				.query_param("api-version", "2017-09-01")
				.header("secret", "legacy-secret");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"legacy-token\"}");
		})
		.await;
	let credential = ManagedIdentityCredential::new(
		http_client(),
		ManagedIdentityEndpoint::LegacyAppService {
			endpoint: url(&server.url("/legacy")),
			secret: TokenSecret::new("legacy-secret"),
		},
	);
	let token = credential
		.acquire_token(STORE_RESOURCE)
		.await
		.expect("Legacy endpoint should issue a token.");

	assert_eq!(token.access_token.expose(), "legacy-token");
	assert!(token.expires_at.is_none());
	mock.assert_async().await;
}

#[tokio::test]
async fn instance_metadata_endpoint_sends_metadata_header() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/metadata/identity/oauth2/token")
				.query_param("api-version", "2018-02-01")
				.header("metadata", "true");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"imds-token\",\"expires_on\":\"1900000000\"}");
		})
		.await;
	let credential = ManagedIdentityCredential::new(
		http_client(),
		ManagedIdentityEndpoint::InstanceMetadata {
			endpoint: url(&server.url("/metadata/identity/oauth2/token")),
		},
	);
	let token = credential
		.acquire_token(STORE_RESOURCE)
		.await
		.expect("Instance metadata should issue a token.");

	assert_eq!(token.access_token.expose(), "imds-token");
	mock.assert_async().await;
}

#[tokio::test]
async fn rejection_surfaces_status_and_description() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/msi/token");
			then.status(400).header("content-type", "application/json").body(concat!(
				"{\"error\":\"invalid_resource\",",
				"\"error_description\":\"Resource is not registered.\"}",
			));
		})
		.await;

	let credential = ManagedIdentityCredential::new(http_client(), app_service(&server));
	let err = credential
		.acquire_token("https://unknown.example")
		.await
		.expect_err("Unknown resource should be rejected.");

	assert!(matches!(
		err,
		IdentityError::Rejected { status: Some(400), ref message }
			if message == "Resource is not registered."
	));
}

#[tokio::test]
async fn malformed_body_is_reported() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/msi/token");
			then.status(200).header("content-type", "application/json").body("{\"token\":1}");
		})
		.await;

	let credential = ManagedIdentityCredential::new(http_client(), app_service(&server));
	let err = credential
		.acquire_token(STORE_RESOURCE)
		.await
		.expect_err("Missing access_token must fail.");

	assert!(matches!(err, IdentityError::MalformedResponse { .. }));
}

#[tokio::test]
async fn unreachable_endpoint_is_reported() {
	let credential = ManagedIdentityCredential::new(
		http_client(),
		ManagedIdentityEndpoint::InstanceMetadata { endpoint: refused_url("/token") },
	);
	let err = credential
		.acquire_token(STORE_RESOURCE)
		.await
		.expect_err("Refused connection must fail.");

	assert!(matches!(err, IdentityError::Unreachable { .. }));
}

#[tokio::test]
async fn misconfigured_endpoint_fails_without_network() {
	let credential = ManagedIdentityCredential::new(
		http_client(),
		ManagedIdentityEndpoint::Misconfigured {
			reason: "MSI_ENDPOINT is set without MSI_SECRET".into(),
		},
	);
	let err = credential
		.acquire_token(STORE_RESOURCE)
		.await
		.expect_err("Misconfigured endpoint must fail.");

	assert_eq!(
		err.to_string(),
		"Service identity is not configured: MSI_ENDPOINT is set without MSI_SECRET."
	);
}
