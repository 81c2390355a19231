use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::remote::{RemoteError, RemoteFolder, RemoteStore, ROOT_FOLDER_ID};

/// Destination chain for one run: `root folder / company / day / slot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFolders {
	pub root: RemoteFolder,
	pub company: RemoteFolder,
	pub day: RemoteFolder,
	/// The hour-minute folder every file of this run lands in.
	pub slot: RemoteFolder,
}

/// `MM_DD_YY`, shared by every run of the same day.
pub fn day_folder_name(now: &DateTime<Local>) -> String {
	now.format("%m_%d_%y").to_string()
}

/// `HH.mm`, effectively one per run.
pub fn slot_folder_name(now: &DateTime<Local>) -> String {
	now.format("%H.%M").to_string()
}

/// Find the non-trashed folder `name` under `parent_id`, creating it if absent.
///
/// Racing runs can leave duplicates behind; the first match is used and the
/// duplication is logged, nothing is merged or removed.
pub async fn resolve_or_create_folder(
	remote: &dyn RemoteStore,
	parent_id: &str,
	name: &str,
) -> Result<RemoteFolder, RemoteError> {
	let mut existing = remote.list_folders(parent_id, name).await?;

	if existing.len() > 1 {
		warn!(
			parent = parent_id,
			folder = name,
			count = existing.len(),
			"duplicate remote folders found, using the first"
		);
	}

	if !existing.is_empty() {
		let folder = existing.swap_remove(0);
		debug!(folder = name, id = %folder.id, "reusing remote folder");
		return Ok(folder);
	}

	let folder = remote.create_folder(parent_id, name).await?;
	debug!(folder = name, id = %folder.id, "created remote folder");
	Ok(folder)
}

/// Resolve the whole chain for a run started at `now`.
pub async fn resolve_run_folders(
	remote: &dyn RemoteStore,
	root_name: &str,
	company: &str,
	now: &DateTime<Local>,
) -> Result<RunFolders, RemoteError> {
	let root = resolve_or_create_folder(remote, ROOT_FOLDER_ID, root_name).await?;
	let company = resolve_or_create_folder(remote, &root.id, company).await?;
	let day = resolve_or_create_folder(remote, &company.id, &day_folder_name(now)).await?;
	let slot = resolve_or_create_folder(remote, &day.id, &slot_folder_name(now)).await?;

	Ok(RunFolders { root, company, day, slot })
}
