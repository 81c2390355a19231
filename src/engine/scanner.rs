use std::{
	fs, io,
	path::{Path, PathBuf},
	time::SystemTime,
};

use chrono::{DateTime, Utc};
use glob::Pattern;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ScanError {
	#[error("pattern has no file name part: {0}")]
	NoFilePattern(String),

	#[error("invalid file name pattern {pattern}: {source}")]
	BadPattern {
		pattern: String,
		#[source]
		source: glob::PatternError,
	},

	#[error("directory does not exist: {0}")]
	DirNotExists(String),

	#[error("not a directory: {0}")]
	NotDir(String),

	#[error("scan task failed: {0}")]
	Join(String),
}

#[derive(Debug, Default)]
pub struct Expansion {
	/// Matching regular files, sorted by name.
	pub files: Vec<PathBuf>,
	pub skipped_entries: u64,
}

/// Current on-disk state of one candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
	pub name: String,
	/// Absolute path as text; the identity used by the state store.
	pub path: String,
	pub size: i64,
	/// Last write time, Unix seconds.
	pub modified_at: i64,
}

/// Expand `dir/pattern` into the regular files of `dir` whose names match
/// `pattern`. Not recursive. Symlinks are followed.
pub fn expand_pattern(pattern_path: &str) -> Result<Expansion, ScanError> {
	let full = Path::new(pattern_path);

	let file_pattern = full
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.ok_or_else(|| ScanError::NoFilePattern(pattern_path.to_string()))?;

	let dir = match full.parent() {
		Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
		_ => PathBuf::from("."),
	};

	if !dir.exists() {
		return Err(ScanError::DirNotExists(dir.display().to_string()));
	}
	if !dir.is_dir() {
		return Err(ScanError::NotDir(dir.display().to_string()));
	}

	let matcher = compile_pattern(&file_pattern)?;

	let mut expansion = Expansion::default();

	for result in WalkDir::new(&dir)
		.min_depth(1)
		.max_depth(1)
		.follow_links(true)
		.sort_by_file_name()
	{
		let entry = match result {
			Ok(e) => e,
			Err(_) => {
				expansion.skipped_entries += 1;
				continue;
			}
		};

		if !entry.file_type().is_file() {
			continue;
		}

		if matcher.matches(&entry.file_name().to_string_lossy()) {
			expansion.files.push(entry.into_path());
		}
	}

	Ok(expansion)
}

/// `*.*` means "every file", including ones without an extension.
fn compile_pattern(file_pattern: &str) -> Result<Pattern, ScanError> {
	let normalized = if file_pattern == "*.*" {
		"*"
	} else {
		file_pattern
	};

	Pattern::new(normalized).map_err(|source| ScanError::BadPattern {
		pattern: file_pattern.to_string(),
		source,
	})
}

/// Read the current metadata of `path`.
pub fn snapshot(path: &Path) -> io::Result<FileSnapshot> {
	let metadata = fs::metadata(path)?;
	if !metadata.is_file() {
		return Err(io::Error::new(
			io::ErrorKind::InvalidInput,
			format!("not a regular file: {}", path.display()),
		));
	}

	let absolute = std::path::absolute(path)?;
	let name = absolute
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_default();

	Ok(FileSnapshot {
		name,
		path: absolute.to_string_lossy().into_owned(),
		size: metadata.len() as i64,
		modified_at: unix_seconds(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)),
	})
}

/// [`expand_pattern`] on the blocking thread pool.
pub async fn expand(pattern_path: &str) -> Result<Expansion, ScanError> {
	tokio::task::spawn_blocking({
		let pattern_path = pattern_path.to_string();
		move || expand_pattern(&pattern_path)
	})
	.await
	.map_err(|e| ScanError::Join(e.to_string()))?
}

/// [`snapshot`] on the blocking thread pool.
pub async fn snapshot_file(path: &Path) -> io::Result<FileSnapshot> {
	tokio::task::spawn_blocking({
		let path = path.to_path_buf();
		move || snapshot(&path)
	})
	.await
	.map_err(io::Error::other)?
}

/// Truncate to whole seconds; sub-second precision never takes part in comparisons.
pub fn unix_seconds(time: SystemTime) -> i64 {
	DateTime::<Utc>::from(time).timestamp()
}
