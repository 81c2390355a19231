use std::{
	collections::HashSet,
	path::{Path, PathBuf},
	sync::Mutex,
};

use async_trait::async_trait;

use super::{ProgressSink, RemoteError, RemoteFolder, RemoteStore, UploadProgress, UploadStatus, UploadedFile};

#[derive(Debug, Clone)]
pub struct StoredFolder {
	pub folder: RemoteFolder,
	pub trashed: bool,
}

#[derive(Debug, Clone)]
pub struct StoredUpload {
	pub id: String,
	pub parent_id: String,
	pub name: String,
	pub local_path: PathBuf,
	pub content_type: String,
	pub size: u64,
}

#[derive(Default)]
struct State {
	next_id: u64,
	folders: Vec<StoredFolder>,
	uploads: Vec<StoredUpload>,
	list_calls: u64,
}

/// In-process stand-in for the remote store.
#[derive(Default)]
pub struct MemoryRemote {
	state: Mutex<State>,
	failing_names: HashSet<String>,
	failing_folders: bool,
}

impl MemoryRemote {
	pub fn new() -> Self {
		Self::default()
	}

	/// Uploads of files called `name` fail with an API error.
	pub fn failing_on(mut self, name: &str) -> Self {
		self.failing_names.insert(name.to_string());
		self
	}

	/// Every folder list and create call fails, as if the service were down.
	pub fn failing_folders(mut self) -> Self {
		self.failing_folders = true;
		self
	}

	/// Seed a folder as if another run (or a person) had created it.
	pub fn add_folder(&self, parent_id: &str, name: &str, trashed: bool) -> RemoteFolder {
		let mut state = self.state.lock().unwrap();
		let folder = new_folder(&mut state, parent_id, name);
		state.folders.push(StoredFolder { folder: folder.clone(), trashed });
		folder
	}

	pub fn folders(&self) -> Vec<StoredFolder> {
		self.state.lock().unwrap().folders.clone()
	}

	pub fn folders_named(&self, parent_id: &str, name: &str) -> usize {
		self.state
			.lock()
			.unwrap()
			.folders
			.iter()
			.filter(|f| f.folder.name == name && f.folder.parent_id.as_deref() == Some(parent_id))
			.count()
	}

	pub fn uploads(&self) -> Vec<StoredUpload> {
		self.state.lock().unwrap().uploads.clone()
	}

	pub fn list_calls(&self) -> u64 {
		self.state.lock().unwrap().list_calls
	}
}

fn new_folder(state: &mut State, parent_id: &str, name: &str) -> RemoteFolder {
	state.next_id += 1;
	RemoteFolder {
		id: format!("folder-{}", state.next_id),
		name: name.to_string(),
		parent_id: Some(parent_id.to_string()),
	}
}

fn unavailable() -> RemoteError {
	RemoteError::Api {
		status: 503,
		message: "folder service unavailable".to_string(),
	}
}

#[async_trait]
impl RemoteStore for MemoryRemote {
	async fn list_folders(&self, parent_id: &str, name: &str) -> Result<Vec<RemoteFolder>, RemoteError> {
		let mut state = self.state.lock().unwrap();
		state.list_calls += 1;
		if self.failing_folders {
			return Err(unavailable());
		}
		Ok(state
			.folders
			.iter()
			.filter(|f| !f.trashed && f.folder.name == name && f.folder.parent_id.as_deref() == Some(parent_id))
			.map(|f| f.folder.clone())
			.collect())
	}

	async fn create_folder(&self, parent_id: &str, name: &str) -> Result<RemoteFolder, RemoteError> {
		if self.failing_folders {
			return Err(unavailable());
		}
		let mut state = self.state.lock().unwrap();
		let folder = new_folder(&mut state, parent_id, name);
		state.folders.push(StoredFolder { folder: folder.clone(), trashed: false });
		Ok(folder)
	}

	async fn upload_file(
		&self,
		parent_id: &str,
		local_path: &Path,
		content_type: &str,
		progress: &mut dyn ProgressSink,
	) -> Result<UploadedFile, RemoteError> {
		let name = local_path
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_default();
		let size = std::fs::metadata(local_path)?.len();

		progress.on_progress(UploadProgress {
			status: UploadStatus::Starting,
			bytes_sent: 0,
			bytes_total: size,
		});

		if self.failing_names.contains(&name) {
			progress.on_progress(UploadProgress {
				status: UploadStatus::Failed,
				bytes_sent: 0,
				bytes_total: size,
			});
			return Err(RemoteError::Api {
				status: 500,
				message: format!("injected failure for {name}"),
			});
		}

		let mut state = self.state.lock().unwrap();
		state.next_id += 1;
		let id = format!("file-{}", state.next_id);
		state.uploads.push(StoredUpload {
			id: id.clone(),
			parent_id: parent_id.to_string(),
			name: name.clone(),
			local_path: local_path.to_path_buf(),
			content_type: content_type.to_string(),
			size,
		});

		progress.on_progress(UploadProgress {
			status: UploadStatus::Completed,
			bytes_sent: size,
			bytes_total: size,
		});

		Ok(UploadedFile { id, name })
	}
}
