//! Downstream folder listing.
//!
//! [`ResourceLister`] enumerates the root folder of a third-party storage account with the
//! token obtained from the broker. [`DropboxLister`] is the production implementation.

mod dropbox;

pub use dropbox::*;

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Boxed future returned by [`ResourceLister::list_root_folder`].
pub type ListingFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Vec<DirectoryEntry>, DownstreamListError>> + 'a + Send>>;

/// Lists the root folder of a downstream storage account.
pub trait ResourceLister
where
	Self: Send + Sync,
{
	/// Lists the root folder, folders first.
	///
	/// A missing or empty `token` yields an empty listing without any network call.
	fn list_root_folder<'a>(&'a self, token: Option<&'a TokenSecret>) -> ListingFuture<'a>;
}

/// One entry of a folder listing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum DirectoryEntry {
	/// Sub-folder.
	Folder(String),
	/// Regular file.
	File(String),
}
impl DirectoryEntry {
	/// Entry name without any path prefix.
	pub fn name(&self) -> &str {
		match self {
			Self::Folder(name) | Self::File(name) => name,
		}
	}

	/// Returns `true` for folders.
	pub fn is_folder(&self) -> bool {
		matches!(self, Self::Folder(_))
	}
}
impl Display for DirectoryEntry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Folder(name) => write!(f, "D  {name}/"),
			Self::File(name) => write!(f, "F  {name}"),
		}
	}
}

/// Orders entries folders-first while keeping the source order inside each group.
pub fn folders_then_files<I>(entries: I) -> Vec<DirectoryEntry>
where
	I: IntoIterator<Item = DirectoryEntry>,
{
	let (mut folders, files): (Vec<_>, Vec<_>) =
		entries.into_iter().partition(DirectoryEntry::is_folder);

	folders.extend(files);

	folders
}

/// Failures raised while listing the downstream folder.
#[derive(Debug, ThisError)]
pub enum DownstreamListError {
	/// The downstream API rejected the access token (expired, revoked, or invalid).
	#[error("Downstream storage rejected the access token: {summary}.")]
	Unauthorized {
		/// Provider-supplied error summary.
		summary: String,
	},
	/// The downstream API answered with a non-success status.
	#[error("Downstream storage returned HTTP {status}: {summary}.")]
	Api {
		/// HTTP status code.
		status: u16,
		/// Provider-supplied error summary.
		summary: String,
	},
	/// The downstream API could not be reached.
	#[error("Network error occurred while listing the downstream folder.")]
	Transport {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// The downstream API answered with a body that is not a folder listing.
	#[error("Downstream storage returned a malformed folder listing.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl From<ReqwestError> for DownstreamListError {
	fn from(e: ReqwestError) -> Self {
		Self::Transport { source: Box::new(e) }
	}
}
