//! Request-scoped orchestration of the identity, exchange, and listing stages.
//!
//! [`TokenFlow::run`] never fails. Every stage error is folded into the returned [`FlowResult`],
//! which a hosting framework renders as-is.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::FlowConfig,
	exchange::{BrokerClient, BrokerExchange},
	http::HttpClient,
	identity::{self, CredentialSource},
	listing::{DirectoryEntry, DropboxLister, ResourceLister},
	obs::{self, FlowStage, StageOutcome, StageSpan},
};

/// Terminal branch reached by one flow run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowOutcome {
	/// The downstream folder was listed.
	Listed,
	/// The broker answered but listing did not run (disabled, non-success status, or no token).
	Skipped,
	/// A stage failed; see [`FlowResult::error_message`].
	Failed,
}
impl FlowOutcome {
	/// Returns a stable label suitable for display and log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Listed => "listed",
			FlowOutcome::Skipped => "skipped",
			FlowOutcome::Failed => "failed",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// View model produced by [`TokenFlow::run`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FlowResult {
	/// Redacted description of the downstream token, present once the broker answered.
	pub secret_display: Option<String>,
	/// `"Something went wrong: <cause>"` when a stage failed.
	pub error_message: Option<String>,
	/// Root folder entries, folders first. Empty unless the outcome is [`FlowOutcome::Listed`].
	pub entries: Vec<DirectoryEntry>,
	/// `"Principal Used: <principal>"` once an identity token was acquired.
	pub principal_display: Option<String>,
	/// Link that starts the broker consent flow and returns to the current request.
	pub login_link: String,
	/// Terminal branch reached.
	pub outcome: FlowOutcome,
}
impl FlowResult {
	/// Entries rendered one per line as `D  name/` or `F  name`.
	pub fn file_list(&self) -> Vec<String> {
		self.entries.iter().map(ToString::to_string).collect()
	}

	/// Returns `true` when a stage failed.
	pub fn is_failed(&self) -> bool {
		self.outcome == FlowOutcome::Failed
	}
}

/// Renders a downstream token without revealing it.
pub fn secret_display(token: Option<&TokenSecret>) -> String {
	match token.filter(|token| !token.is_empty()) {
		Some(token) => format!("Token: <redacted sha256:{}>", token.fingerprint()),
		None => "Token: <none>".into(),
	}
}

/// Sequences identity acquisition, broker exchange, and the optional downstream listing.
///
/// Cloning is cheap; clones share the pooled HTTP client, the credential source, and the lister.
#[derive(Clone)]
pub struct TokenFlow {
	config: FlowConfig,
	credential: Arc<dyn CredentialSource>,
	broker: BrokerClient,
	lister: Option<Arc<dyn ResourceLister>>,
}
impl TokenFlow {
	/// Creates a flow without a downstream lister; listing is then always skipped.
	pub fn new(
		config: FlowConfig,
		credential: Arc<dyn CredentialSource>,
		http: HttpClient,
	) -> Self {
		Self { config, credential, broker: BrokerClient::new(http), lister: None }
	}

	/// Attaches the downstream lister.
	pub fn with_lister(mut self, lister: Arc<dyn ResourceLister>) -> Self {
		self.lister = Some(lister);

		self
	}

	/// Builds a flow from `config`, selecting the credential from the environment and wiring a
	/// [`DropboxLister`] when listing is enabled.
	pub fn from_config(config: FlowConfig) -> Result<Self> {
		let http = HttpClient::with_timeout(config.timeout)?;
		let credential = identity::credential_from_env(http.clone())?;
		let lister = if config.listing {
			let lister = match config.dropbox_api_base.clone() {
				Some(api_base) => DropboxLister::with_api_base(http.clone(), api_base)?,
				None => DropboxLister::new(http.clone())?,
			};

			Some(Arc::new(lister) as Arc<dyn ResourceLister>)
		} else {
			None
		};
		let flow = Self::new(config, credential, http);

		Ok(match lister {
			Some(lister) => flow.with_lister(lister),
			None => flow,
		})
	}

	/// Builds a flow entirely from the process environment.
	pub fn from_env() -> Result<Self> {
		Self::from_config(FlowConfig::from_env()?)
	}

	/// Configuration this flow runs with.
	pub fn config(&self) -> &FlowConfig {
		&self.config
	}

	/// Runs the flow for the request at `request_url` and folds every outcome into a
	/// [`FlowResult`].
	pub async fn run(&self, request_url: &Url) -> FlowResult {
		let login_link = self.config.login_link(request_url);
		let mut progress = Progress::default();
		let result = self.drive(&mut progress).await;
		let Progress { principal_display, secret_display } = progress;

		match result {
			Ok(Some(entries)) => FlowResult {
				secret_display,
				error_message: None,
				entries,
				principal_display,
				login_link,
				outcome: FlowOutcome::Listed,
			},
			Ok(None) => FlowResult {
				secret_display,
				error_message: None,
				entries: Vec::new(),
				principal_display,
				login_link,
				outcome: FlowOutcome::Skipped,
			},
			Err(e) => FlowResult {
				secret_display,
				error_message: Some(format!("Something went wrong: {}", e.innermost_message())),
				entries: Vec::new(),
				principal_display,
				login_link,
				outcome: FlowOutcome::Failed,
			},
		}
	}

	/// Returns `Some(entries)` when the listing ran and `None` when it was skipped.
	async fn drive(&self, progress: &mut Progress) -> Result<Option<Vec<DirectoryEntry>>> {
		let variant = self.config.variant.as_str();
		let identity_span = StageSpan::new(FlowStage::Identity, variant);
		let identity = observe(&identity_span, FlowStage::Identity, async {
			self.credential.acquire_token(self.config.resource()).await.map_err(Error::from)
		})
		.await?;

		progress.principal_display = Some(match &identity.principal {
			Some(principal) => format!("Principal Used: {principal}"),
			None => "Principal Used: unknown".into(),
		});

		let exchange_span = StageSpan::new(FlowStage::Exchange, variant);
		let exchange = observe(&exchange_span, FlowStage::Exchange, async {
			self.broker.exchange(&self.config.broker_url, &identity).await
		})
		.await?;

		exchange_span.record_broker_status(exchange.status);
		obs::record_broker_response(exchange.status);

		progress.secret_display = Some(secret_display(exchange.response.access_token()));

		let Some((lister, token)) = self.listing_target(&exchange) else {
			return Ok(None);
		};
		let listing_span = StageSpan::new(FlowStage::Listing, variant);
		let entries = observe(&listing_span, FlowStage::Listing, async {
			lister.list_root_folder(Some(token)).await.map_err(Error::from)
		})
		.await?;

		Ok(Some(entries))
	}

	fn listing_target<'a>(
		&'a self,
		exchange: &'a BrokerExchange,
	) -> Option<(&'a dyn ResourceLister, &'a TokenSecret)> {
		let skip = |reason: &'static str| {
			obs::listing_skipped(reason);
			obs::record_stage_outcome(FlowStage::Listing, StageOutcome::Skipped);
		};

		if !self.config.listing {
			skip("listing disabled");

			return None;
		}

		let Some(lister) = self.lister.as_deref() else {
			skip("no lister configured");

			return None;
		};

		if !exchange.is_success() {
			skip("broker returned a non-success status");

			return None;
		}

		let Some(token) = exchange.usable_token() else {
			skip("no downstream token");

			return None;
		};

		Some((lister, token))
	}
}

#[derive(Default)]
struct Progress {
	principal_display: Option<String>,
	secret_display: Option<String>,
}

async fn observe<T, F>(span: &StageSpan, stage: FlowStage, fut: F) -> Result<T>
where
	F: Future<Output = Result<T>>,
{
	obs::record_stage_outcome(stage, StageOutcome::Attempt);

	let result = span.instrument(fut).await;

	match &result {
		Ok(_) => obs::record_stage_outcome(stage, StageOutcome::Success),
		Err(e) => {
			obs::record_stage_outcome(stage, StageOutcome::Failure);
			obs::stage_failed(stage, &e.innermost_message());
		},
	}

	result
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_display_never_reveals_the_token() {
		let token = TokenSecret::new("tok123");
		let shown = secret_display(Some(&token));

		assert!(shown.starts_with("Token: <redacted sha256:"));
		assert!(shown.contains(&token.fingerprint()));
		assert!(!shown.contains("tok123"));
		assert_eq!(secret_display(None), "Token: <none>");
		assert_eq!(secret_display(Some(&TokenSecret::new(""))), "Token: <none>");
	}

	#[test]
	fn file_list_renders_entries_in_order() {
		let result = FlowResult {
			secret_display: None,
			error_message: None,
			entries: vec![
				DirectoryEntry::Folder("Docs".into()),
				DirectoryEntry::File("a.txt".into()),
			],
			principal_display: None,
			login_link: String::new(),
			outcome: FlowOutcome::Listed,
		};

		assert_eq!(result.file_list(), vec!["D  Docs/".to_owned(), "F  a.txt".to_owned()]);
		assert!(!result.is_failed());
	}

	#[test]
	fn result_serializes_outcome_in_snake_case() {
		let result = FlowResult {
			secret_display: Some("Token: <none>".into()),
			error_message: None,
			entries: Vec::new(),
			principal_display: None,
			login_link: "https://broker.example/login".into(),
			outcome: FlowOutcome::Skipped,
		};
		let json = serde_json::to_value(&result).expect("Flow result should serialize.");

		assert_eq!(json["outcome"], "skipped");
		assert_eq!(json["secret_display"], "Token: <none>");
		assert_eq!(json["entries"], serde_json::json!([]));
	}
}
