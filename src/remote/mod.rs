//! The remote object store files are backed up to.
//!
//! [`RemoteStore`] is the only surface the backup engine talks to. The
//! production implementation is [`drive::DriveClient`] (Google Drive v3).

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub mod drive;
#[cfg(test)]
pub mod memory;

/// Id Google Drive uses for "My Drive".
pub const ROOT_FOLDER_ID: &str = "root";

#[derive(Debug, Error)]
pub enum RemoteError {
	#[error("HTTP request failed: {0}")]
	Request(#[from] reqwest::Error),

	#[error("remote error ({status}): {message}")]
	Api { status: u16, message: String },

	#[error("no access token configured")]
	AuthRequired,

	#[error("upload session was not opened: {0}")]
	MissingSession(String),

	#[error("failed to parse response: {0}")]
	Parse(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

/// A folder in the remote store. Looked up again every run, never cached on disk.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFolder {
	pub id: String,
	pub name: String,
	#[serde(rename = "parents", default, deserialize_with = "first_parent")]
	pub parent_id: Option<String>,
}

fn first_parent<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let parents: Option<Vec<String>> = Option::deserialize(deserializer)?;
	Ok(parents.and_then(|p| p.into_iter().next()))
}

/// Acknowledgement for a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedFile {
	pub id: String,
	pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
	Starting,
	Uploading,
	Completed,
	Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
	pub status: UploadStatus,
	pub bytes_sent: u64,
	pub bytes_total: u64,
}

/// Receives progress notifications while an upload call is running.
/// Purely observational: nothing it does changes the upload.
pub trait ProgressSink: Send {
	fn on_progress(&mut self, progress: UploadProgress);
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
	/// Non-trashed folders called `name` directly under `parent_id`.
	async fn list_folders(&self, parent_id: &str, name: &str) -> Result<Vec<RemoteFolder>, RemoteError>;

	async fn create_folder(&self, parent_id: &str, name: &str) -> Result<RemoteFolder, RemoteError>;

	/// Upload the bytes of `local_path` into `parent_id`, keeping the file name.
	async fn upload_file(
		&self,
		parent_id: &str,
		local_path: &Path,
		content_type: &str,
		progress: &mut dyn ProgressSink,
	) -> Result<UploadedFile, RemoteError>;
}

/// Content type from the file extension, `application/octet-stream` when unknown.
pub fn content_type_for(path: &Path) -> String {
	mime_guess::from_path(path).first_or_octet_stream().to_string()
}
