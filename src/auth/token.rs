//! Service identity token issued for a single request.

// self
use crate::{
	_prelude::*,
	auth::{PrincipalUsed, TokenSecret},
};

/// Bearer token obtained from the ambient identity for one broker call.
///
/// Tokens are created per request, never persisted, and used once as an `Authorization` header.
#[derive(Clone, Debug)]
pub struct ServiceIdentityToken {
	/// Bearer secret presented to the token broker.
	pub access_token: TokenSecret,
	/// Identity that issued the token, when known.
	pub principal: Option<PrincipalUsed>,
	/// Expiry instant reported by the identity endpoint.
	pub expires_at: Option<OffsetDateTime>,
}
impl ServiceIdentityToken {
	/// Wraps a bearer secret without principal or expiry information.
	pub fn new(access_token: impl Into<String>) -> Self {
		Self { access_token: TokenSecret::new(access_token), principal: None, expires_at: None }
	}

	/// Attaches the principal that issued the token.
	pub fn with_principal(mut self, principal: PrincipalUsed) -> Self {
		self.principal = Some(principal);

		self
	}

	/// Attaches the expiry instant.
	pub fn with_expires_at(mut self, expires_at: Option<OffsetDateTime>) -> Self {
		self.expires_at = expires_at;

		self
	}
}
