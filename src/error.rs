//! Flow-level error types shared across the identity, exchange, and listing stages.

// self
use crate::{_prelude::*, identity::IdentityError, listing::DownstreamListError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error used wherever a transport-specific failure is carried as a source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error surfaced by every stage of the token flow.
///
/// Each variant is request-scoped and recoverable; the orchestrator folds them into a
/// [`FlowResult`](crate::flow::FlowResult) instead of propagating them.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Service identity token could not be acquired.
	#[error(transparent)]
	Identity(#[from] IdentityError),
	/// Transport failure while calling the token broker (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Token broker responded with a body that is not the expected JSON shape.
	#[error("Token broker returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure, including the JSON path that failed.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the broker response, when available.
		status: Option<u16>,
	},
	/// Downstream folder listing failed.
	#[error(transparent)]
	DownstreamList(#[from] DownstreamListError),
}
impl Error {
	/// Returns the message of the deepest error in the `source` chain.
	///
	/// Outer context (for example the "network error" wrapper around a refused connection) is
	/// dropped so only the root cause is shown to end users.
	pub fn innermost_message(&self) -> String {
		let mut current: &dyn StdError = self;

		while let Some(next) = current.source() {
			current = next;
		}

		let message = current.to_string();

		if message.trim().is_empty() { self.to_string() } else { message }
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A configured URL cannot be parsed.
	#[error("The {field} URL is invalid.")]
	InvalidUrl {
		/// Configuration field holding the URL.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A configured URL uses plain HTTP for a non-loopback host.
	#[error("The {field} URL must use HTTPS: {url}.")]
	InsecureUrl {
		/// Configuration field holding the URL.
		field: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// A configured URL cannot carry path segments (for example `mailto:` or `data:` URLs).
	#[error("The {field} URL cannot be used as a base URL: {url}.")]
	CannotBeABase {
		/// Configuration field holding the URL.
		field: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// Token endpoint URL of an OAuth authority cannot be parsed.
	#[error("The authority token endpoint is invalid.")]
	InvalidAuthority {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// A broker URL template segment is empty.
	#[error("The broker URL template segment `{segment}` cannot be empty.")]
	EmptyTemplateSegment {
		/// Name of the empty segment.
		segment: &'static str,
	},
	/// A required setting is missing.
	#[error("Missing required setting `{key}`.")]
	MissingSetting {
		/// Setting name.
		key: &'static str,
	},
	/// A setting holds a value that cannot be interpreted.
	#[error("Setting `{key}` has an invalid value: {value}.")]
	InvalidSetting {
		/// Setting name.
		key: &'static str,
		/// Rejected value.
		value: String,
	},
	/// The identity connection string requests a mode this crate does not support.
	#[error("Unsupported identity connection string: {reason}.")]
	UnsupportedConnectionString {
		/// Why the connection string was rejected.
		reason: String,
	},
	/// A bearer token was empty when a request required one.
	#[error("Bearer token cannot be empty.")]
	EmptyBearerToken,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO) raised while calling the token broker.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token broker.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token broker.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::io::{Error as IoError, ErrorKind};
	// self
	use super::*;

	#[test]
	fn innermost_message_skips_wrappers() {
		let refused = IoError::new(ErrorKind::ConnectionRefused, "connection refused");
		let err: Error = TransportError::network(refused).into();

		assert_eq!(err.to_string(), "Network error occurred while calling the token broker.");
		assert_eq!(err.innermost_message(), "connection refused");
	}

	#[test]
	fn innermost_message_uses_leaf_variant_without_source() {
		let err: Error = ConfigError::EmptyBearerToken.into();

		assert_eq!(err.innermost_message(), "Bearer token cannot be empty.");
	}

	#[test]
	fn innermost_message_falls_back_when_leaf_is_blank() {
		let err: Error = TransportError::network(IoError::new(ErrorKind::Other, " ")).into();

		assert_eq!(
			err.innermost_message(),
			"Network error occurred while calling the token broker."
		);
	}
}
