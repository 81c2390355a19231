//! Configuration: what to back up (`filePaths.json`), for whom
//! (`companies.json`), and how (`backline.toml`).

use std::{
	fs,
	path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

pub const PATHS_FILE: &str = "filePaths.json";
pub const COMPANIES_FILE: &str = "companies.json";
pub const SETTINGS_FILE: &str = "backline.toml";
pub const TOKEN_ENV: &str = "BACKLINE_ACCESS_TOKEN";

/// Google Drive requires resumable chunks in multiples of 256 KiB.
const CHUNK_GRANULARITY: usize = 256 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("cannot read {path}: {source}")]
	Read {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid JSON in {path}: {source}")]
	Json {
		path: String,
		#[source]
		source: serde_json::Error,
	},

	#[error("invalid settings in {path}: {source}")]
	Toml {
		path: String,
		#[source]
		source: toml::de::Error,
	},

	#[error("there should be exactly one company name in 'companies.json', found {0}")]
	CompanyCount(usize),

	#[error("company name in 'companies.json' is empty")]
	EmptyCompany,
}

/// Per-path sync behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "Option<String>")]
pub enum SyncOption {
	/// Skip the upload when the file is unchanged since the last one.
	Incremental,
	/// Upload on every run.
	#[default]
	Full,
}

impl From<Option<String>> for SyncOption {
	fn from(value: Option<String>) -> Self {
		match value.as_deref().map(str::trim) {
			Some(v) if v.eq_ignore_ascii_case("i") || v.eq_ignore_ascii_case("incremental") => SyncOption::Incremental,
			_ => SyncOption::Full,
		}
	}
}

/// One `filePaths.json` entry: a directory plus a file-name pattern.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PathEntry {
	#[serde(rename = "FilePath")]
	pub file_path: String,
	#[serde(rename = "Option", default)]
	pub option: SyncOption,
}

#[derive(Debug, Deserialize)]
struct CompanyList {
	#[serde(rename = "Companies", default)]
	companies: Vec<String>,
}

/// Validated input for one backup run.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupConfig {
	pub company: String,
	pub entries: Vec<PathEntry>,
}

impl BackupConfig {
	/// Exactly one non-empty company is required.
	pub fn new(companies: Vec<String>, entries: Vec<PathEntry>) -> Result<Self, ConfigError> {
		let [company]: [String; 1] = companies
			.try_into()
			.map_err(|all: Vec<String>| ConfigError::CompanyCount(all.len()))?;

		let company = company.trim().to_string();
		if company.is_empty() {
			return Err(ConfigError::EmptyCompany);
		}

		Ok(Self { company, entries })
	}

	/// Read both JSON files. Relative `FilePath`s resolve against `base_dir`.
	pub fn load(paths_file: &Path, companies_file: &Path, base_dir: &Path) -> Result<Self, ConfigError> {
		let mut entries: Vec<PathEntry> = read_json(paths_file)?;
		for entry in &mut entries {
			entry.file_path = resolve(base_dir, Path::new(&entry.file_path))
				.to_string_lossy()
				.into_owned();
		}

		let companies: CompanyList = read_json(companies_file)?;
		Self::new(companies.companies, entries)
	}
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
	let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
		path: path.display().to_string(),
		source,
	})?;
	serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
		path: path.display().to_string(),
		source,
	})
}

/// `path` if absolute, otherwise `base/path`.
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
	if path.is_absolute() {
		path.to_path_buf()
	} else {
		base.join(path)
	}
}

/// Program settings from the optional `backline.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
	pub database_file: String,
	pub log_dir: String,
	pub root_folder: String,
	pub drive_api_url: String,
	pub access_token: Option<String>,
	pub timeout_minutes: u64,
	pub chunk_size_kib: usize,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			database_file: "backline.db".to_string(),
			log_dir: "log".to_string(),
			root_folder: "BackupRoot".to_string(),
			drive_api_url: "https://www.googleapis.com".to_string(),
			access_token: None,
			timeout_minutes: 100,
			chunk_size_kib: 5 * 1024,
		}
	}
}

impl Settings {
	/// Load `backline.toml` from `base_dir`, falling back to defaults when it
	/// does not exist. The access token env var wins over the file.
	pub fn load(base_dir: &Path) -> Result<Self, ConfigError> {
		let path = base_dir.join(SETTINGS_FILE);
		let mut settings = if path.exists() {
			let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
				path: path.display().to_string(),
				source,
			})?;
			toml::from_str(&raw).map_err(|source| ConfigError::Toml {
				path: path.display().to_string(),
				source,
			})?
		} else {
			Settings::default()
		};

		if let Ok(token) = std::env::var(TOKEN_ENV) {
			if !token.trim().is_empty() {
				settings.access_token = Some(token.trim().to_string());
			}
		}

		Ok(settings)
	}

	pub fn database_path(&self, base_dir: &Path) -> PathBuf {
		resolve(base_dir, Path::new(&self.database_file))
	}

	pub fn log_path(&self, base_dir: &Path) -> PathBuf {
		resolve(base_dir, Path::new(&self.log_dir))
	}

	/// Upload chunk size in bytes, rounded down to the 256 KiB grid (min one unit).
	pub fn chunk_size(&self) -> usize {
		let bytes = self.chunk_size_kib.saturating_mul(1024);
		(bytes / CHUNK_GRANULARITY).max(1) * CHUNK_GRANULARITY
	}
}
