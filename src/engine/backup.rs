use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
	clock::Clock,
	config::{BackupConfig, SyncOption},
	db::{StateStore, StoreError},
	engine::{
		detector::{self, Decision, UploadReason},
		placement::{self, RunFolders},
		scanner,
	},
	models::file_record::FileRecord,
	remote::{self, ProgressSink, RemoteError, RemoteFolder, RemoteStore, UploadProgress},
};

#[derive(Debug, Error)]
pub enum BackupError {
	#[error("state store failure: {0}")]
	Store(#[from] StoreError),

	#[error("cannot prepare remote destination: {0}")]
	Placement(#[source] RemoteError),
}

/// Everything a run needs besides its configuration.
pub struct BackupContext<'a> {
	pub store: &'a StateStore,
	pub remote: &'a dyn RemoteStore,
	pub clock: &'a dyn Clock,
	/// Name of the top-level folder under the remote root.
	pub root_folder: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
	Unchanged,
	EmptyPath,
}

/// Terminal state of one file within a run.
///
/// `Pending -> Skipped` or `Pending -> Uploading -> Committed | Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
	Skipped(SkipReason),
	Committed {
		reason: UploadReason,
		remote_id: String,
		remote_name: String,
	},
	Failed(String),
}

#[derive(Debug, Clone)]
pub struct FileResult {
	pub path: PathBuf,
	pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
	pub folders: Option<RunFolders>,
	pub files: Vec<FileResult>,
	/// Patterns whose directory could not be listed.
	pub patterns_failed: u64,
	/// Directory entries that could not be inspected while expanding patterns.
	pub skipped_entries: u64,
}

impl RunReport {
	pub fn uploaded(&self) -> usize {
		self.count(|o| matches!(o, FileOutcome::Committed { .. }))
	}

	pub fn skipped(&self) -> usize {
		self.count(|o| matches!(o, FileOutcome::Skipped(_)))
	}

	pub fn failed(&self) -> usize {
		self.count(|o| matches!(o, FileOutcome::Failed(_)))
	}

	fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
		self.files.iter().filter(|f| pred(&f.outcome)).count()
	}
}

/// Writes upload progress to the log.
struct LogProgress {
	file: String,
}

impl ProgressSink for LogProgress {
	fn on_progress(&mut self, progress: UploadProgress) {
		info!(
			file = %self.file,
			total = progress.bytes_total,
			"Upload Status: {:?} Bytes Sent: {}",
			progress.status,
			progress.bytes_sent
		);
	}
}

/// One backup run over every configured path pattern.
///
/// Files are handled strictly one after another. Per-file problems (vanished
/// file, failed upload) are logged and the run moves on; state store failures
/// and an unreachable destination end the run.
pub async fn run_backup(ctx: &BackupContext<'_>, config: &BackupConfig) -> Result<RunReport, BackupError> {
	let mut report = RunReport::default();

	if config.entries.is_empty() {
		warn!("no file paths configured, nothing to back up");
		return Ok(report);
	}

	let now = ctx.clock.now();
	let folders = placement::resolve_run_folders(ctx.remote, ctx.root_folder, &config.company, &now)
		.await
		.map_err(BackupError::Placement)?;

	info!(
		company = %config.company,
		"backing up into {}/{}/{}/{}",
		folders.root.name,
		folders.company.name,
		folders.day.name,
		folders.slot.name
	);

	for entry in &config.entries {
		let expansion = match scanner::expand(&entry.file_path).await {
			Ok(e) => e,
			Err(e) => {
				error!(pattern = %entry.file_path, error = %e, "cannot list files for pattern, skipping");
				report.patterns_failed += 1;
				continue;
			}
		};
		report.skipped_entries += expansion.skipped_entries;

		for path in expansion.files {
			let outcome = process_file(ctx, &folders.slot, &path, &entry.option).await?;
			report.files.push(FileResult { path, outcome });
		}
	}

	info!(
		uploaded = report.uploaded(),
		skipped = report.skipped(),
		failed = report.failed(),
		"backup run finished"
	);

	report.folders = Some(folders);
	Ok(report)
}

async fn process_file(
	ctx: &BackupContext<'_>,
	slot: &RemoteFolder,
	path: &Path,
	option: &SyncOption,
) -> Result<FileOutcome, StoreError> {
	info!("{}", path.display());

	if path.as_os_str().is_empty() {
		info!("Skipping empty file path.");
		return Ok(FileOutcome::Skipped(SkipReason::EmptyPath));
	}

	let file = match scanner::snapshot_file(path).await {
		Ok(s) => s,
		Err(e) => {
			error!(path = %path.display(), error = %e, "cannot read file, skipping");
			return Ok(FileOutcome::Failed(format!("{}: {e}", path.display())));
		}
	};

	let record = ctx.store.lookup(&file.path).await?;

	let reason = match detector::decide(&file, record.as_ref(), option) {
		Decision::Skip => {
			info!("File '{}' has not been modified. Skipping backup.", file.name);
			return Ok(FileOutcome::Skipped(SkipReason::Unchanged));
		}
		Decision::Upload(reason) => reason,
	};

	info!(file = %file.name, %reason, "uploading");

	let mut sink = LogProgress { file: file.name.clone() };
	let content_type = remote::content_type_for(path);

	match ctx.remote.upload_file(&slot.id, path, &content_type, &mut sink).await {
		Ok(uploaded) => {
			ctx.store
				.upsert(&FileRecord {
					path: file.path.clone(),
					name: file.name.clone(),
					size: file.size,
					modified_at: file.modified_at,
				})
				.await?;

			info!("File '{}' was uploaded successfully. File ID: {}", uploaded.name, uploaded.id);

			Ok(FileOutcome::Committed {
				reason,
				remote_id: uploaded.id,
				remote_name: uploaded.name,
			})
		}
		Err(e) => {
			error!(file = %file.path, error = %e, "upload failed, state left unchanged");
			Ok(FileOutcome::Failed(e.to_string()))
		}
	}
}
