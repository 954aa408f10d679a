// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config,
	error::ConfigError,
	http::HttpClient,
	listing::{
		DirectoryEntry, DownstreamListError, ListingFuture, ResourceLister, folders_then_files,
	},
};

/// Dropbox RPC endpoint host.
pub const DROPBOX_API_BASE: &str = "https://api.dropboxapi.com/";

const LIST_FOLDER_SEGMENTS: [&str; 3] = ["2", "files", "list_folder"];

/// Lists the root folder of a Dropbox account through the `files/list_folder` endpoint.
#[derive(Clone, Debug)]
pub struct DropboxLister {
	http: HttpClient,
	list_folder_url: Url,
}
impl DropboxLister {
	/// Creates a lister against the public Dropbox API.
	pub fn new(http: HttpClient) -> Result<Self> {
		let api_base = Url::parse(DROPBOX_API_BASE)
			.map_err(|source| ConfigError::InvalidUrl { field: "dropbox_api_base", source })?;

		Self::with_api_base(http, api_base)
	}

	/// Creates a lister against a custom API base such as a regional proxy or a mock server.
	///
	/// The RPC path is appended to whatever path `api_base` already carries, with or without a
	/// trailing slash. The base must use HTTPS unless it points at a loopback host.
	pub fn with_api_base(http: HttpClient, api_base: Url) -> Result<Self> {
		config::validate_secure_url("dropbox_api_base", &api_base)?;

		if api_base.cannot_be_a_base() {
			return Err(ConfigError::CannotBeABase {
				field: "dropbox_api_base",
				url: api_base.to_string(),
			}
			.into());
		}

		let mut list_folder_url = api_base;

		list_folder_url.set_query(None);

		if let Ok(mut segments) = list_folder_url.path_segments_mut() {
			segments.pop_if_empty().extend(LIST_FOLDER_SEGMENTS);
		}

		Ok(Self { http, list_folder_url })
	}

	/// Endpoint the lister posts to.
	pub fn list_folder_url(&self) -> &Url {
		&self.list_folder_url
	}

	async fn list(
		&self,
		token: Option<&TokenSecret>,
	) -> Result<Vec<DirectoryEntry>, DownstreamListError> {
		let Some(token) = token.filter(|token| !token.is_empty()) else {
			return Ok(Vec::new());
		};
		let session = DropboxSession::open(&self.http, &self.list_folder_url, token);
		let page = session.list_folder("").await?;

		Ok(folders_then_files(page.entries.into_iter().filter_map(RawEntry::into_entry)))
	}
}
impl ResourceLister for DropboxLister {
	fn list_root_folder<'a>(&'a self, token: Option<&'a TokenSecret>) -> ListingFuture<'a> {
		Box::pin(self.list(token))
	}
}

/// Authenticated Dropbox session scoped to a single listing call.
///
/// The session borrows the pooled client and the token; it is dropped, and any connection it
/// used returned to the pool, when the listing call returns on either path.
struct DropboxSession<'a> {
	http: &'a HttpClient,
	list_folder_url: &'a Url,
	token: &'a TokenSecret,
}
impl<'a> DropboxSession<'a> {
	fn open(http: &'a HttpClient, list_folder_url: &'a Url, token: &'a TokenSecret) -> Self {
		Self { http, list_folder_url, token }
	}

	async fn list_folder(&self, path: &str) -> Result<ListFolderPage, DownstreamListError> {
		let response = self
			.http
			.post(self.list_folder_url.clone())
			.bearer_auth(self.token.expose())
			.header(reqwest::header::CONTENT_TYPE, "application/json")
			.body(serde_json::json!({ "path": path }).to_string())
			.send()
			.await?;
		let status = response.status();
		let body = response.text().await?;

		if status == StatusCode::UNAUTHORIZED {
			return Err(DownstreamListError::Unauthorized { summary: error_summary(&body) });
		}
		if !status.is_success() {
			return Err(DownstreamListError::Api {
				status: status.as_u16(),
				summary: error_summary(&body),
			});
		}

		let mut de = serde_json::Deserializer::from_str(&body);
		let page: ListFolderPage = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| DownstreamListError::MalformedResponse { source })?;

		if page.has_more {
			crate::obs::listing_truncated(page.entries.len());
		}

		Ok(page)
	}
}

#[derive(Debug, Deserialize)]
struct ListFolderPage {
	entries: Vec<RawEntry>,
	#[serde(default)]
	has_more: bool,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
	#[serde(rename = ".tag")]
	tag: String,
	name: String,
}
impl RawEntry {
	/// Deleted entries (and tags this crate does not know) are neither folders nor files.
	fn into_entry(self) -> Option<DirectoryEntry> {
		match self.tag.as_str() {
			"folder" => Some(DirectoryEntry::Folder(self.name)),
			"file" => Some(DirectoryEntry::File(self.name)),
			_ => None,
		}
	}
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
	#[serde(default)]
	error_summary: Option<String>,
}

fn error_summary(body: &str) -> String {
	const PREVIEW_LEN: usize = 256;

	match serde_json::from_str::<ApiErrorBody>(body).ok().and_then(|parsed| parsed.error_summary) {
		Some(summary) => summary,
		None => {
			let preview: String = body.trim().chars().take(PREVIEW_LEN).collect();

			if preview.is_empty() { "no details".into() } else { preview }
		},
	}
}
