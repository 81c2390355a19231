//! Google Drive v3 client.
//!
//! Folders are plain `files` with the folder MIME type. File bodies go
//! through a resumable upload session in fixed-size chunks, with a progress
//! event after every chunk.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::{
	fs::File,
	io::{AsyncRead, AsyncReadExt},
};
use tracing::debug;

use super::{ProgressSink, RemoteError, RemoteFolder, RemoteStore, UploadProgress, UploadStatus, UploadedFile};
use crate::config::Settings;

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const FOLDER_FIELDS: &str = "id,name,parents";

/// Bytes handed to the server so far, out of the size read at session start.
#[derive(Debug, Default, Clone, Copy)]
struct Transferred {
	sent: u64,
	total: u64,
}

#[derive(Debug, Deserialize)]
struct FileList {
	#[serde(default)]
	files: Vec<RemoteFolder>,
}

pub struct DriveClient {
	http: Client,
	base_url: String,
	access_token: String,
	chunk_size: usize,
}

impl DriveClient {
	pub fn new(base_url: &str, access_token: &str, timeout: Duration, chunk_size: usize) -> Result<Self, RemoteError> {
		if access_token.trim().is_empty() {
			return Err(RemoteError::AuthRequired);
		}

		// 308 is "resume incomplete" for upload sessions, not a redirect.
		let http = Client::builder()
			.timeout(timeout)
			.connect_timeout(Duration::from_secs(30))
			.redirect(reqwest::redirect::Policy::none())
			.user_agent(format!("backline/{}", env!("CARGO_PKG_VERSION")))
			.build()?;

		Ok(Self {
			http,
			base_url: base_url.trim_end_matches('/').to_string(),
			access_token: access_token.trim().to_string(),
			chunk_size: chunk_size.max(1),
		})
	}

	pub fn from_settings(settings: &Settings) -> Result<Self, RemoteError> {
		let token = settings.access_token.as_deref().ok_or(RemoteError::AuthRequired)?;
		Self::new(
			&settings.drive_api_url,
			token,
			Duration::from_secs(settings.timeout_minutes.saturating_mul(60)),
			settings.chunk_size(),
		)
	}

	/// Open a resumable session and return its URI.
	async fn start_session(
		&self,
		parent_id: &str,
		file_name: &str,
		content_type: &str,
		total: u64,
	) -> Result<String, RemoteError> {
		let url = format!("{}/upload/drive/v3/files", self.base_url);
		let response = self
			.http
			.post(&url)
			.bearer_auth(&self.access_token)
			.query(&[
				("uploadType", "resumable"),
				("supportsAllDrives", "true"),
				("fields", "id,name"),
			])
			.header("X-Upload-Content-Type", content_type)
			.header("X-Upload-Content-Length", total.to_string())
			.json(&json!({ "name": file_name, "parents": [parent_id] }))
			.send()
			.await?;

		let response = ensure_success(response).await?;

		response
			.headers()
			.get(header::LOCATION)
			.and_then(|v| v.to_str().ok())
			.map(str::to_string)
			.ok_or_else(|| RemoteError::MissingSession(format!("no Location header for {file_name}")))
	}

	/// PUT one chunk. `Ok(None)` means the server wants more bytes.
	async fn put_chunk(
		&self,
		session: &str,
		chunk: Vec<u8>,
		start: u64,
		total: u64,
	) -> Result<Option<UploadedFile>, RemoteError> {
		let range = if chunk.is_empty() {
			format!("bytes */{total}")
		} else {
			format!("bytes {}-{}/{}", start, start + chunk.len() as u64 - 1, total)
		};

		let response = self
			.http
			.put(session)
			.bearer_auth(&self.access_token)
			.header(header::CONTENT_RANGE, range)
			.body(chunk)
			.send()
			.await?;

		if response.status() == StatusCode::PERMANENT_REDIRECT {
			return Ok(None);
		}

		let response = ensure_success(response).await?;
		let uploaded: UploadedFile = response
			.json()
			.await
			.map_err(|e| RemoteError::Parse(format!("upload response: {e}")))?;
		Ok(Some(uploaded))
	}

	async fn upload_chunks(
		&self,
		parent_id: &str,
		local_path: &Path,
		content_type: &str,
		progress: &mut dyn ProgressSink,
		transferred: &mut Transferred,
	) -> Result<UploadedFile, RemoteError> {
		let file_name = local_path
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.ok_or_else(|| RemoteError::Parse(format!("no file name in {}", local_path.display())))?;

		let mut file = File::open(local_path).await?;
		let total = file.metadata().await?.len();
		transferred.total = total;

		progress.on_progress(UploadProgress {
			status: UploadStatus::Starting,
			bytes_sent: 0,
			bytes_total: total,
		});

		let session = self.start_session(parent_id, &file_name, content_type, total).await?;
		debug!(file = %file_name, total, "upload session opened");

		let mut sent: u64 = 0;
		loop {
			let chunk = next_chunk(&mut file, self.chunk_size, total - sent).await?;

			if chunk.is_empty() && sent < total {
				return Err(RemoteError::Io(std::io::Error::new(
					std::io::ErrorKind::UnexpectedEof,
					format!("{} shrank during upload ({sent} of {total} bytes)", local_path.display()),
				)));
			}

			let len = chunk.len() as u64;
			let done = self.put_chunk(&session, chunk, sent, total).await?;
			sent += len;
			transferred.sent = sent;

			match done {
				Some(uploaded) => {
					progress.on_progress(UploadProgress {
						status: UploadStatus::Completed,
						bytes_sent: sent,
						bytes_total: total,
					});
					return Ok(uploaded);
				}
				None if sent >= total => {
					return Err(RemoteError::Api {
						status: StatusCode::PERMANENT_REDIRECT.as_u16(),
						message: format!("server wants more bytes after all {total} were sent"),
					});
				}
				None => {
					progress.on_progress(UploadProgress {
						status: UploadStatus::Uploading,
						bytes_sent: sent,
						bytes_total: total,
					});
				}
			}
		}
	}
}

#[async_trait]
impl RemoteStore for DriveClient {
	async fn list_folders(&self, parent_id: &str, name: &str) -> Result<Vec<RemoteFolder>, RemoteError> {
		let q = format!(
			"name='{}' and mimeType='{FOLDER_MIME}' and '{}' in parents and trashed=false",
			escape_query(name),
			escape_query(parent_id),
		);
		let url = format!("{}/drive/v3/files", self.base_url);

		let response = self
			.http
			.get(&url)
			.bearer_auth(&self.access_token)
			.query(&[
				("q", q.as_str()),
				("fields", "files(id,name,parents)"),
				("supportsAllDrives", "true"),
				("includeItemsFromAllDrives", "true"),
			])
			.send()
			.await?;

		let list: FileList = ensure_success(response)
			.await?
			.json()
			.await
			.map_err(|e| RemoteError::Parse(format!("folder list: {e}")))?;
		Ok(list.files)
	}

	async fn create_folder(&self, parent_id: &str, name: &str) -> Result<RemoteFolder, RemoteError> {
		let url = format!("{}/drive/v3/files", self.base_url);
		let response = self
			.http
			.post(&url)
			.bearer_auth(&self.access_token)
			.query(&[("fields", FOLDER_FIELDS), ("supportsAllDrives", "true")])
			.json(&json!({ "name": name, "mimeType": FOLDER_MIME, "parents": [parent_id] }))
			.send()
			.await?;

		ensure_success(response)
			.await?
			.json()
			.await
			.map_err(|e| RemoteError::Parse(format!("created folder: {e}")))
	}

	async fn upload_file(
		&self,
		parent_id: &str,
		local_path: &Path,
		content_type: &str,
		progress: &mut dyn ProgressSink,
	) -> Result<UploadedFile, RemoteError> {
		let mut transferred = Transferred::default();
		let result = self
			.upload_chunks(parent_id, local_path, content_type, progress, &mut transferred)
			.await;
		if result.is_err() {
			progress.on_progress(UploadProgress {
				status: UploadStatus::Failed,
				bytes_sent: transferred.sent,
				bytes_total: transferred.total,
			});
		}
		result
	}
}

async fn ensure_success(response: Response) -> Result<Response, RemoteError> {
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}
	if status == StatusCode::UNAUTHORIZED {
		return Err(RemoteError::AuthRequired);
	}
	let message = response.text().await.unwrap_or_default();
	Err(RemoteError::Api {
		status: status.as_u16(),
		message,
	})
}

/// Read up to `chunk_size` bytes, never more than `remaining`. Bytes appended
/// after the session was opened are left unread.
async fn next_chunk<R: AsyncRead + Unpin>(
	reader: &mut R,
	chunk_size: usize,
	remaining: u64,
) -> std::io::Result<Vec<u8>> {
	let limit = (chunk_size as u64).min(remaining);
	let mut chunk = Vec::with_capacity(limit as usize);
	reader.take(limit).read_to_end(&mut chunk).await?;
	Ok(chunk)
}

/// Escape a value for a single-quoted Drive query literal.
fn escape_query(value: &str) -> String {
	value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
	use std::fs;

	use wiremock::{
		matchers::{body_json, header as header_is, method, path, query_param},
		Mock, MockServer, ResponseTemplate,
	};

	use super::*;

	#[derive(Default)]
	struct Recorder(Vec<UploadProgress>);

	impl ProgressSink for Recorder {
		fn on_progress(&mut self, progress: UploadProgress) {
			self.0.push(progress);
		}
	}

	fn client(server: &MockServer, chunk_size: usize) -> DriveClient {
		DriveClient::new(&server.uri(), "token-123", Duration::from_secs(10), chunk_size).unwrap()
	}

	#[test]
	fn empty_token_rejected() {
		let err = DriveClient::new("http://localhost", "  ", Duration::from_secs(1), 1).err().unwrap();
		assert!(matches!(err, RemoteError::AuthRequired));
	}

	#[test]
	fn settings_without_token_rejected() {
		let settings = Settings::default();
		let err = DriveClient::from_settings(&settings).err().unwrap();
		assert!(matches!(err, RemoteError::AuthRequired));
	}

	#[test]
	fn escapes_quotes_in_queries() {
		assert_eq!(escape_query("O'Brien"), "O\\'Brien");
		assert_eq!(escape_query("a\\b"), "a\\\\b");
	}

	#[tokio::test]
	async fn list_folders_sends_query_and_parses_files() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/drive/v3/files"))
			.and(header_is("authorization", "Bearer token-123"))
			.and(query_param(
				"q",
				"name='Acme' and mimeType='application/vnd.google-apps.folder' and 'root-id' in parents and trashed=false",
			))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"files": [
					{ "id": "f1", "name": "Acme", "parents": ["root-id"] },
					{ "id": "f2", "name": "Acme", "parents": ["root-id"] }
				]
			})))
			.mount(&server)
			.await;

		let folders = client(&server, 1024).list_folders("root-id", "Acme").await.unwrap();

		assert_eq!(folders.len(), 2);
		assert_eq!(folders[0].id, "f1");
		assert_eq!(folders[0].parent_id.as_deref(), Some("root-id"));
	}

	#[tokio::test]
	async fn create_folder_posts_folder_metadata() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/drive/v3/files"))
			.and(body_json(serde_json::json!({
				"name": "01_01_24",
				"mimeType": FOLDER_MIME,
				"parents": ["company-id"]
			})))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"id": "day-id", "name": "01_01_24", "parents": ["company-id"]
			})))
			.expect(1)
			.mount(&server)
			.await;

		let folder = client(&server, 1024).create_folder("company-id", "01_01_24").await.unwrap();

		assert_eq!(folder.id, "day-id");
		assert_eq!(folder.name, "01_01_24");
	}

	#[tokio::test]
	async fn api_errors_carry_status() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/drive/v3/files"))
			.respond_with(ResponseTemplate::new(403).set_body_string("rate limit"))
			.mount(&server)
			.await;

		let err = client(&server, 1024).list_folders("root", "x").await.unwrap_err();

		match err {
			RemoteError::Api { status, message } => {
				assert_eq!(status, 403);
				assert!(message.contains("rate limit"));
			}
			other => panic!("expected Api error, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn unauthorized_maps_to_auth_required() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/drive/v3/files"))
			.respond_with(ResponseTemplate::new(401))
			.mount(&server)
			.await;

		let err = client(&server, 1024).list_folders("root", "x").await.unwrap_err();
		assert!(matches!(err, RemoteError::AuthRequired));
	}

	async fn mount_session(server: &MockServer) {
		Mock::given(method("POST"))
			.and(path("/upload/drive/v3/files"))
			.and(query_param("uploadType", "resumable"))
			.and(header_is("X-Upload-Content-Type", "text/plain"))
			.respond_with(
				ResponseTemplate::new(200).insert_header("Location", format!("{}/session/abc", server.uri()).as_str()),
			)
			.expect(1)
			.mount(server)
			.await;
	}

	#[tokio::test]
	async fn uploads_in_chunks_with_progress() {
		let server = MockServer::start().await;
		mount_session(&server).await;

		Mock::given(method("PUT"))
			.and(path("/session/abc"))
			.and(header_is("Content-Range", "bytes 0-9/25"))
			.respond_with(ResponseTemplate::new(308))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("PUT"))
			.and(path("/session/abc"))
			.and(header_is("Content-Range", "bytes 10-19/25"))
			.respond_with(ResponseTemplate::new(308))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("PUT"))
			.and(path("/session/abc"))
			.and(header_is("Content-Range", "bytes 20-24/25"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"id": "file-1", "name": "report.txt"
			})))
			.expect(1)
			.mount(&server)
			.await;

		let tmp = tempfile::tempdir().unwrap();
		let local = tmp.path().join("report.txt");
		fs::write(&local, "a".repeat(25)).unwrap();

		let mut recorder = Recorder::default();
		let uploaded = client(&server, 10)
			.upload_file("slot-id", &local, "text/plain", &mut recorder)
			.await
			.unwrap();

		assert_eq!(uploaded, UploadedFile { id: "file-1".into(), name: "report.txt".into() });
		let statuses: Vec<(UploadStatus, u64)> = recorder.0.iter().map(|p| (p.status, p.bytes_sent)).collect();
		assert_eq!(
			statuses,
			vec![
				(UploadStatus::Starting, 0),
				(UploadStatus::Uploading, 10),
				(UploadStatus::Uploading, 20),
				(UploadStatus::Completed, 25),
			]
		);
	}

	#[tokio::test]
	async fn uploads_empty_file() {
		let server = MockServer::start().await;
		mount_session(&server).await;
		Mock::given(method("PUT"))
			.and(path("/session/abc"))
			.and(header_is("Content-Range", "bytes */0"))
			.respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
				"id": "file-0", "name": "empty.txt"
			})))
			.expect(1)
			.mount(&server)
			.await;

		let tmp = tempfile::tempdir().unwrap();
		let local = tmp.path().join("empty.txt");
		fs::write(&local, "").unwrap();

		let uploaded = client(&server, 10)
			.upload_file("slot-id", &local, "text/plain", &mut Recorder::default())
			.await
			.unwrap();

		assert_eq!(uploaded.id, "file-0");
	}

	#[tokio::test]
	async fn missing_session_header_fails_upload() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/upload/drive/v3/files"))
			.respond_with(ResponseTemplate::new(200))
			.mount(&server)
			.await;

		let tmp = tempfile::tempdir().unwrap();
		let local = tmp.path().join("report.txt");
		fs::write(&local, "abc").unwrap();

		let mut recorder = Recorder::default();
		let err = client(&server, 10)
			.upload_file("slot-id", &local, "text/plain", &mut recorder)
			.await
			.unwrap_err();

		assert!(matches!(err, RemoteError::MissingSession(_)));
		assert_eq!(recorder.0.last().unwrap().status, UploadStatus::Failed);
	}

	#[tokio::test]
	async fn missing_local_file_is_io_error() {
		let server = MockServer::start().await;
		let tmp = tempfile::tempdir().unwrap();

		let err = client(&server, 10)
			.upload_file("slot-id", &tmp.path().join("gone.txt"), "text/plain", &mut Recorder::default())
			.await
			.unwrap_err();

		assert!(matches!(err, RemoteError::Io(_)));
	}

	#[tokio::test]
	async fn chunk_never_reads_past_session_size() {
		// 30 bytes on disk, but the session was opened for 25 and 20 are sent.
		let data = [b'a'; 30];
		let mut reader: &[u8] = &data;
		let mut skip = [0u8; 20];
		reader.read_exact(&mut skip).await.unwrap();

		let chunk = next_chunk(&mut reader, 10, 5).await.unwrap();
		assert_eq!(chunk.len(), 5);

		let full = next_chunk(&mut reader, 3, 5).await.unwrap();
		assert_eq!(full.len(), 3);
	}

	#[tokio::test]
	async fn failed_chunk_reports_bytes_already_sent() {
		let server = MockServer::start().await;
		mount_session(&server).await;

		Mock::given(method("PUT"))
			.and(path("/session/abc"))
			.and(header_is("Content-Range", "bytes 0-9/25"))
			.respond_with(ResponseTemplate::new(308))
			.mount(&server)
			.await;
		Mock::given(method("PUT"))
			.and(path("/session/abc"))
			.and(header_is("Content-Range", "bytes 10-19/25"))
			.respond_with(ResponseTemplate::new(503).set_body_string("backend error"))
			.mount(&server)
			.await;

		let tmp = tempfile::tempdir().unwrap();
		let local = tmp.path().join("report.txt");
		fs::write(&local, "a".repeat(25)).unwrap();

		let mut recorder = Recorder::default();
		let err = client(&server, 10)
			.upload_file("slot-id", &local, "text/plain", &mut recorder)
			.await
			.unwrap_err();

		assert!(matches!(err, RemoteError::Api { status: 503, .. }));
		assert_eq!(
			recorder.0.last().copied(),
			Some(UploadProgress {
				status: UploadStatus::Failed,
				bytes_sent: 10,
				bytes_total: 25,
			})
		);
	}
}
