//! Flow configuration: broker variant, broker URL, listing toggle, and transport timeout.
//!
//! [`FlowConfig::from_env`] reads the following settings:
//!
//! | Variable | Meaning |
//! | --- | --- |
//! | `TOKEN_RESOURCE_URL` | Full broker token URL. Takes precedence over the template. |
//! | `TOKEN_BROKER_ROOT` | Template root for `<root>/services/<provider>/tokens/<token-name>`. |
//! | `TOKEN_BROKER_PROVIDER` | Template `<provider>` segment. |
//! | `TOKEN_BROKER_TOKEN_NAME` | Template `<token-name>` segment. |
//! | `TOKEN_BROKER_VARIANT` | `store` (default) or `vault`. |
//! | `TOKEN_BROKER_RESOURCE` | Overrides the identity audience implied by the variant. |
//! | `TOKEN_BROKER_LISTING` | `true` (default) or `false`. |
//! | `TOKEN_BROKER_TIMEOUT_SECS` | Request timeout in seconds (default 30). |
//! | `TOKEN_DROPBOX_API_BASE` | Dropbox RPC base URL (default `https://api.dropboxapi.com/`). |

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, error::ConfigError, http::DEFAULT_TIMEOUT};

/// Broker deployments supported by the flow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerVariant {
	/// Token Store deployment.
	#[default]
	Store,
	/// Token Vault deployment.
	Vault,
}
impl BrokerVariant {
	/// Identity audience expected by the broker.
	pub const fn resource(self) -> &'static str {
		match self {
			BrokerVariant::Store => "https://tokenstore.azure.net",
			BrokerVariant::Vault => "https://tokenvault.azure.net",
		}
	}

	/// Returns a stable label suitable for span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			BrokerVariant::Store => "store",
			BrokerVariant::Vault => "vault",
		}
	}
}
impl Display for BrokerVariant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for BrokerVariant {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"store" | "tokenstore" => Ok(Self::Store),
			"vault" | "tokenvault" => Ok(Self::Vault),
			_ => Err(ConfigError::InvalidSetting {
				key: "TOKEN_BROKER_VARIANT",
				value: s.to_owned(),
			}),
		}
	}
}

/// Settings for one [`TokenFlow`](crate::flow::TokenFlow).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawFlowConfig")]
pub struct FlowConfig {
	/// Broker deployment.
	pub variant: BrokerVariant,
	/// Identity audience override; defaults to [`BrokerVariant::resource`].
	pub resource: Option<String>,
	/// Token URL on the broker, e.g.
	/// `https://name.region.tokenvault.azure.net/services/dropbox/tokens/sampleToken`.
	pub broker_url: Url,
	/// Whether to list the downstream root folder after a successful exchange.
	pub listing: bool,
	/// Request timeout for identity and broker calls.
	pub timeout: StdDuration,
	/// Dropbox RPC base override; defaults to
	/// [`DROPBOX_API_BASE`](crate::listing::DROPBOX_API_BASE).
	pub dropbox_api_base: Option<Url>,
}
impl FlowConfig {
	/// Creates a validated configuration with listing enabled and the default timeout.
	pub fn new(variant: BrokerVariant, broker_url: Url) -> Result<Self, ConfigError> {
		validate_secure_url("broker_url", &broker_url)?;

		Ok(Self {
			variant,
			resource: None,
			broker_url,
			listing: true,
			timeout: DEFAULT_TIMEOUT,
			dropbox_api_base: None,
		})
	}

	/// Overrides the identity audience.
	pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
		self.resource = Some(resource.into());

		self
	}

	/// Enables or disables the downstream listing stage.
	pub fn with_listing(mut self, listing: bool) -> Self {
		self.listing = listing;

		self
	}

	/// Overrides the request timeout.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Points the downstream lister at another Dropbox API base.
	pub fn with_dropbox_api_base(mut self, api_base: Url) -> Self {
		self.dropbox_api_base = Some(api_base);

		self
	}

	/// Identity audience the flow requests tokens for.
	pub fn resource(&self) -> &str {
		self.resource.as_deref().unwrap_or(self.variant.resource())
	}

	/// Link that starts the broker's interactive consent flow and returns to `request_url`.
	pub fn login_link(&self, request_url: &Url) -> String {
		let mut link = self.broker_url.clone();

		if let Ok(mut segments) = link.path_segments_mut() {
			segments.pop_if_empty().push("login");
		}

		link.set_query(None);
		link.query_pairs_mut().append_pair("PostLoginRedirectUrl", request_url.as_str());

		link.to_string()
	}

	/// Reads the configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Reads the configuration through `lookup`, see the module documentation for the keys.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let read = |key: &str| {
			lookup(key).map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
		};
		let variant = match read("TOKEN_BROKER_VARIANT") {
			Some(raw) => raw.parse()?,
			None => BrokerVariant::default(),
		};
		let broker_url = match read("TOKEN_RESOURCE_URL") {
			Some(raw) => Url::parse(&raw)
				.map_err(|source| ConfigError::InvalidUrl { field: "TOKEN_RESOURCE_URL", source })?,
			None => {
				let root = read("TOKEN_BROKER_ROOT")
					.ok_or(ConfigError::MissingSetting { key: "TOKEN_RESOURCE_URL" })?;
				let root = Url::parse(&root).map_err(|source| ConfigError::InvalidUrl {
					field: "TOKEN_BROKER_ROOT",
					source,
				})?;
				let provider = read("TOKEN_BROKER_PROVIDER").unwrap_or_default();
				let token_name = read("TOKEN_BROKER_TOKEN_NAME").unwrap_or_default();

				broker_url_from_template(&root, &provider, &token_name)?
			},
		};
		let mut config = Self::new(variant, broker_url)?;

		if let Some(resource) = read("TOKEN_BROKER_RESOURCE") {
			config = config.with_resource(resource);
		}
		if let Some(raw) = read("TOKEN_BROKER_LISTING") {
			config = config.with_listing(parse_bool("TOKEN_BROKER_LISTING", &raw)?);
		}
		if let Some(raw) = read("TOKEN_BROKER_TIMEOUT_SECS") {
			let secs = raw
				.parse::<u64>()
				.ok()
				.filter(|secs| *secs > 0)
				.ok_or(ConfigError::InvalidSetting {
					key: "TOKEN_BROKER_TIMEOUT_SECS",
					value: raw,
				})?;

			config = config.with_timeout(StdDuration::from_secs(secs));
		}
		if let Some(raw) = read("TOKEN_DROPBOX_API_BASE") {
			let api_base = Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl {
				field: "TOKEN_DROPBOX_API_BASE",
				source,
			})?;

			validate_secure_url("dropbox_api_base", &api_base)?;

			config = config.with_dropbox_api_base(api_base);
		}

		Ok(config)
	}
}
impl TryFrom<RawFlowConfig> for FlowConfig {
	type Error = ConfigError;

	fn try_from(raw: RawFlowConfig) -> Result<Self, Self::Error> {
		let mut config = Self::new(raw.variant, raw.broker_url)?
			.with_listing(raw.listing)
			.with_timeout(StdDuration::from_secs(raw.timeout_secs));

		config.resource = raw.resource;

		if let Some(api_base) = raw.dropbox_api_base {
			validate_secure_url("dropbox_api_base", &api_base)?;

			config = config.with_dropbox_api_base(api_base);
		}

		Ok(config)
	}
}

#[derive(Deserialize)]
struct RawFlowConfig {
	#[serde(default)]
	variant: BrokerVariant,
	#[serde(default)]
	resource: Option<String>,
	broker_url: Url,
	#[serde(default = "default_listing")]
	listing: bool,
	#[serde(default = "default_timeout_secs")]
	timeout_secs: u64,
	#[serde(default)]
	dropbox_api_base: Option<Url>,
}

fn default_listing() -> bool {
	true
}

fn default_timeout_secs() -> u64 {
	DEFAULT_TIMEOUT.as_secs()
}

/// Builds `<root>/services/<provider>/tokens/<token_name>` with each segment percent-encoded.
pub fn broker_url_from_template(
	root: &Url,
	provider: &str,
	token_name: &str,
) -> Result<Url, ConfigError> {
	if provider.trim().is_empty() {
		return Err(ConfigError::EmptyTemplateSegment { segment: "provider" });
	}
	if token_name.trim().is_empty() {
		return Err(ConfigError::EmptyTemplateSegment { segment: "token_name" });
	}
	if root.cannot_be_a_base() {
		return Err(ConfigError::CannotBeABase { field: "broker_root", url: root.to_string() });
	}

	let mut url = root.clone();

	url.set_query(None);

	if let Ok(mut segments) = url.path_segments_mut() {
		segments.pop_if_empty().extend(["services", provider.trim(), "tokens", token_name.trim()]);
	}

	Ok(url)
}

/// Rejects URLs that would carry a bearer token over plain HTTP to a non-loopback host.
pub(crate) fn validate_secure_url(field: &'static str, url: &Url) -> Result<(), ConfigError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ConfigError::InsecureUrl { field, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
		Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
	match raw.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(ConfigError::InvalidSetting { key, value: raw.to_owned() }),
	}
}
