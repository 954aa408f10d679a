//! Description of the identity that issued a service token.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::_prelude::*;

/// Kind of credential used to obtain a service identity token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
	/// System- or user-assigned managed identity.
	ManagedIdentity,
	/// Application registration authenticating with a client secret.
	ServicePrincipal,
}
impl PrincipalKind {
	/// Returns a stable label suitable for display and log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			PrincipalKind::ManagedIdentity => "ManagedIdentity",
			PrincipalKind::ServicePrincipal => "ServicePrincipal",
		}
	}
}
impl Display for PrincipalKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Identity reported as "principal used" for a service token.
///
/// Fields are populated from the token's JWT claims (`appid`/`azp`, `tid`, `oid`) when the
/// access token is a readable JWT, and from what the credential itself knows otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalUsed {
	/// Credential kind that produced the token.
	pub kind: PrincipalKind,
	/// Application (client) identifier.
	pub app_id: Option<String>,
	/// Directory (tenant) identifier.
	pub tenant_id: Option<String>,
	/// Object identifier of the principal in the directory.
	pub object_id: Option<String>,
}
impl PrincipalUsed {
	/// Creates a principal that only knows its kind.
	pub fn new(kind: PrincipalKind) -> Self {
		Self { kind, app_id: None, tenant_id: None, object_id: None }
	}

	/// Builds the principal from the claims embedded in `access_token`.
	///
	/// Tokens that are not JWTs, or whose payload cannot be decoded, yield a principal with only
	/// the kind populated.
	pub fn from_access_token(kind: PrincipalKind, access_token: &str) -> Self {
		let claims = decode_claims(access_token).unwrap_or_default();

		Self {
			kind,
			app_id: claims.appid.or(claims.azp),
			tenant_id: claims.tid,
			object_id: claims.oid,
		}
	}

	/// Fills the application identifier when the claims did not carry one.
	pub fn or_app_id(mut self, app_id: Option<String>) -> Self {
		if self.app_id.is_none() {
			self.app_id = app_id;
		}

		self
	}

	/// Fills the tenant identifier when the claims did not carry one.
	pub fn or_tenant_id(mut self, tenant_id: Option<String>) -> Self {
		if self.tenant_id.is_none() {
			self.tenant_id = tenant_id;
		}

		self
	}
}
impl Display for PrincipalUsed {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Type: {}", self.kind)?;

		if let Some(app_id) = &self.app_id {
			write!(f, ", AppId: {app_id}")?;
		}
		if let Some(tenant_id) = &self.tenant_id {
			write!(f, ", TenantId: {tenant_id}")?;
		}
		if let Some(object_id) = &self.object_id {
			write!(f, ", ObjectId: {object_id}")?;
		}

		Ok(())
	}
}

#[derive(Debug, Default, Deserialize)]
struct Claims {
	#[serde(default)]
	appid: Option<String>,
	#[serde(default)]
	azp: Option<String>,
	#[serde(default)]
	tid: Option<String>,
	#[serde(default)]
	oid: Option<String>,
}

fn decode_claims(access_token: &str) -> Option<Claims> {
	let mut parts = access_token.split('.');
	let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
	let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;

	serde_json::from_slice(&bytes).ok()
}
