//! Token broker exchange.
//!
//! The broker (a token store or token vault) holds third-party OAuth tokens on behalf of the
//! application. [`BrokerClient::exchange`] presents the service identity token as bearer
//! authentication and returns whatever the broker answered, together with the HTTP status, so
//! the caller decides whether the downstream token is usable.

// self
use crate::{
	_prelude::*,
	auth::{ServiceIdentityToken, TokenSecret},
	error::{ConfigError, TransportError},
	http::HttpClient,
};

/// Payload returned by the token broker.
///
/// Both `value` and its `accessToken` are optional: a failed or partially configured broker
/// answers with `{"value": null}` and consumers must degrade instead of failing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerResponse {
	/// Token container, absent when the broker has no token to hand out.
	#[serde(default, alias = "Value")]
	pub value: Option<TokenValue>,
	/// Token lifetime in seconds, if the broker reports one. Read but not acted upon.
	#[serde(default, alias = "ExpiresIn")]
	pub expires_in: Option<i64>,
}
impl BrokerResponse {
	/// Returns the downstream access token when present and non-empty.
	pub fn access_token(&self) -> Option<&TokenSecret> {
		self.value.as_ref()?.access_token.as_ref().filter(|token| !token.is_empty())
	}
}

/// Token container nested in [`BrokerResponse`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenValue {
	/// Downstream OAuth access token.
	#[serde(default, alias = "AccessToken")]
	pub access_token: Option<TokenSecret>,
}

/// Outcome of one broker call: the parsed body plus the HTTP status it arrived with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerExchange {
	/// HTTP status code of the broker response.
	pub status: u16,
	/// Parsed broker payload.
	pub response: BrokerResponse,
}
impl BrokerExchange {
	/// Returns `true` for 2xx broker responses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns the downstream token only when the broker call succeeded and carried one.
	pub fn usable_token(&self) -> Option<&TokenSecret> {
		if self.is_success() { self.response.access_token() } else { None }
	}
}

/// Issues authenticated POST requests to the token broker over the shared client.
#[derive(Clone, Debug)]
pub struct BrokerClient {
	http: HttpClient,
}
impl BrokerClient {
	/// Creates a client on top of the shared pooled transport.
	pub fn new(http: HttpClient) -> Self {
		Self { http }
	}

	/// Sends one body-less POST to `broker_url` authenticated with `bearer`.
	///
	/// The body is parsed even when the status is not a success; only transport failures and
	/// malformed JSON are errors.
	pub async fn exchange(
		&self,
		broker_url: &Url,
		bearer: &ServiceIdentityToken,
	) -> Result<BrokerExchange> {
		if bearer.access_token.is_empty() {
			return Err(ConfigError::EmptyBearerToken.into());
		}

		let response = self
			.http
			.post(broker_url.clone())
			.bearer_auth(bearer.access_token.expose())
			.send()
			.await
			.map_err(TransportError::from)?;
		let status = response.status().as_u16();
		let body = response.text().await.map_err(TransportError::from)?;
		let response = parse_broker_response(&body)
			.map_err(|source| Error::ResponseParse { source, status: Some(status) })?;

		Ok(BrokerExchange { status, response })
	}
}

/// Parses a broker body, reporting the JSON path of the first mismatch.
pub fn parse_broker_response(
	body: &str,
) -> Result<BrokerResponse, serde_path_to_error::Error<serde_json::Error>> {
	let mut de = serde_json::Deserializer::from_str(body);

	serde_path_to_error::deserialize(&mut de)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn parses_camel_case_payload() {
		let parsed = parse_broker_response(r#"{"value":{"accessToken":"tok123"},"expiresIn":3600}"#)
			.expect("Broker payload should parse.");

		assert_eq!(parsed.access_token().map(TokenSecret::expose), Some("tok123"));
		assert_eq!(parsed.expires_in, Some(3600));
	}

	#[test]
	fn accepts_pascal_case_aliases() {
		let parsed = parse_broker_response(r#"{"Value":{"AccessToken":"tok"},"ExpiresIn":60}"#)
			.expect("PascalCase payload should parse.");

		assert_eq!(parsed.access_token().map(TokenSecret::expose), Some("tok"));
		assert_eq!(parsed.expires_in, Some(60));
	}

	#[test]
	fn null_or_missing_value_yields_no_token() {
		let bodies =
			[r#"{"value":null}"#, "{}", r#"{"value":{}}"#, r#"{"value":{"accessToken":""}}"#];

		for body in bodies {
			let parsed = parse_broker_response(body).expect("Degraded payload should still parse.");

			assert!(parsed.access_token().is_none(), "No token expected for {body}.");
		}
	}

	#[test]
	fn malformed_payload_reports_the_path() {
		let err = parse_broker_response(r#"{"value":{"accessToken":42}}"#)
			.expect_err("Numeric token must be rejected.");

		assert!(err.path().to_string().contains("accessToken"));
		assert!(parse_broker_response("<html>").is_err());
		assert!(parse_broker_response("").is_err());
	}

	#[test]
	fn usable_token_requires_success_status() {
		let response = parse_broker_response(r#"{"value":{"accessToken":"tok"}}"#)
			.expect("Broker payload should parse.");
		let ok = BrokerExchange { status: 200, response: response.clone() };
		let denied = BrokerExchange { status: 403, response };

		assert!(ok.usable_token().is_some());
		assert!(denied.usable_token().is_none());
	}

	#[tokio::test]
	async fn empty_bearer_is_rejected_before_sending() {
		let http = HttpClient::new().expect("Default HTTP client should build.");
		let client = BrokerClient::new(http);
		let url = Url::parse("https://127.0.0.1:9/never").expect("URL fixture.");
		let err = client
			.exchange(&url, &ServiceIdentityToken::new(""))
			.await
			.expect_err("Empty bearer tokens must be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::EmptyBearerToken)));
	}
}
