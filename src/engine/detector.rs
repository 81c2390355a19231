use std::fmt;

use crate::{config::SyncOption, engine::scanner::FileSnapshot, models::file_record::FileRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadReason {
	/// The path is configured for a full upload every run.
	Forced,
	/// Nothing stored for this path yet.
	New,
	SizeChanged,
	TimeChanged,
	PathChanged,
}

impl fmt::Display for UploadReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			UploadReason::Forced => "full sync requested",
			UploadReason::New => "no previous backup",
			UploadReason::SizeChanged => "size changed",
			UploadReason::TimeChanged => "last change time changed",
			UploadReason::PathChanged => "path changed",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
	Skip,
	Upload(UploadReason),
}

/// Compare the file on disk with what was recorded at its last upload.
///
/// Incremental paths are skipped only when size, last-change second and
/// absolute path all match the stored record.
pub fn decide(file: &FileSnapshot, record: Option<&FileRecord>, option: &SyncOption) -> Decision {
	if *option != SyncOption::Incremental {
		return Decision::Upload(UploadReason::Forced);
	}

	let Some(record) = record else {
		return Decision::Upload(UploadReason::New);
	};

	if record.size != file.size {
		Decision::Upload(UploadReason::SizeChanged)
	} else if record.modified_at != file.modified_at {
		Decision::Upload(UploadReason::TimeChanged)
	} else if record.path != file.path {
		Decision::Upload(UploadReason::PathChanged)
	} else {
		Decision::Skip
	}
}

pub fn should_upload(file: &FileSnapshot, record: Option<&FileRecord>, option: &SyncOption) -> bool {
	matches!(decide(file, record, option), Decision::Upload(_))
}
