use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "backline=info";

/// `log_dd_MM_yyyy_HH_mm.txt`: one file per run.
pub fn log_file_name(now: &DateTime<Local>) -> String {
	format!("log_{}.txt", now.format("%d_%m_%Y_%H_%M"))
}

/// File layer in `log_dir` plus a console layer on stdout.
///
/// Returns the log file path, or `None` when the file could not be set up;
/// in that case only the console layer is installed and the reason is printed.
pub fn init(log_dir: &Path, now: &DateTime<Local>) -> Option<PathBuf> {
	let file_name = log_file_name(now);

	let appender = std::fs::create_dir_all(log_dir)
		.map_err(|e| e.to_string())
		.and_then(|_| {
			RollingFileAppender::builder()
				.rotation(Rotation::NEVER)
				.filename_prefix(file_name.as_str())
				.build(log_dir)
				.map_err(|e| e.to_string())
		});

	let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
	let console = tracing_subscriber::fmt::layer()
		.with_writer(std::io::stdout)
		.with_target(false)
		.with_filter(filter());

	match appender {
		Ok(file_appender) => {
			tracing_subscriber::registry()
				.with(console)
				.with(
					tracing_subscriber::fmt::layer()
						.with_writer(file_appender)
						.with_ansi(false)
						.with_filter(filter()),
				)
				.init();
			Some(log_dir.join(file_name))
		}
		Err(e) => {
			tracing_subscriber::registry().with(console).init();
			tracing::warn!(dir = %log_dir.display(), error = %e, "cannot write log file, logging to console only");
			None
		}
	}
}
