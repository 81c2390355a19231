use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Format used when a last-change time is shown to a person.
pub const LAST_CHANGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Every file backline has successfully uploaded.
/// The basis for change detection: one row per absolute path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
	pub path: String,
	pub name: String,
	pub size: i64,
	/// Last-change time, Unix seconds.
	pub modified_at: i64,
}

impl FileRecord {
	pub fn last_change_display(&self) -> String {
		format_unix_seconds(self.modified_at)
	}
}

/// Render Unix seconds in local time as `yyyy-MM-dd HH:mm:ss`.
pub fn format_unix_seconds(secs: i64) -> String {
	match DateTime::from_timestamp(secs, 0) {
		Some(utc) => utc.with_timezone(&Local).format(LAST_CHANGE_FORMAT).to_string(),
		None => format!("@{secs}"),
	}
}
