use std::{
	io,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use backline::{
	cli::{self, Cli, Command, RunArgs},
	clock::{Clock, SystemClock},
	config::{self, BackupConfig, Settings},
	db::StateStore,
	engine::backup::{self, BackupContext},
	logging,
	remote::drive::DriveClient,
};
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
	let opts = Cli::parse();

	let base_dir = match &opts.base_dir {
		Some(dir) => dir.clone(),
		None => exe_dir()?,
	};
	let settings = Settings::load(&base_dir)?;
	let clock = SystemClock;

	if let Some(log_file) = logging::init(&settings.log_path(&base_dir), &clock.now()) {
		info!(log = %log_file.display(), "logging to file");
	}

	match opts.command() {
		Command::Status => status(&settings, &base_dir).await,
		Command::Run(args) => {
			if !args.yes {
				let stdin = io::stdin();
				if !cli::confirm(&mut stdin.lock(), &mut io::stdout())? {
					return Ok(());
				}
			}
			run(&settings, &base_dir, &args, &clock).await
		}
	}
}

/// Config files, database and logs live next to the executable unless told otherwise.
fn exe_dir() -> Result<PathBuf> {
	let exe = std::env::current_exe().context("cannot locate the executable")?;
	exe.parent()
		.map(Path::to_path_buf)
		.context("executable has no parent directory")
}

async fn run(settings: &Settings, base_dir: &Path, args: &RunArgs, clock: &dyn Clock) -> Result<()> {
	// Validate everything before touching the database or the network.
	let config = BackupConfig::load(
		&config::resolve(base_dir, &args.paths),
		&config::resolve(base_dir, &args.companies),
		base_dir,
	)
	.inspect_err(|e| error!("Error: {e}"))?;

	let remote = DriveClient::from_settings(settings)
		.inspect_err(|e| error!("cannot set up Google Drive client: {e} (set {})", config::TOKEN_ENV))?;

	let db_path = settings.database_path(base_dir);
	let store = StateStore::open(&db_path)
		.await
		.inspect_err(|e| error!("{e}"))
		.with_context(|| format!("cannot open state database {}", db_path.display()))?;

	let ctx = BackupContext {
		store: &store,
		remote: &remote,
		clock,
		root_folder: &settings.root_folder,
	};

	let report = backup::run_backup(&ctx, &config)
		.await
		.inspect_err(|e| error!("backup aborted: {e}"))?;

	if report.failed() > 0 {
		error!(failed = report.failed(), "some files were not backed up, they will be retried next run");
	}
	Ok(())
}

async fn status(settings: &Settings, base_dir: &Path) -> Result<()> {
	let db_path = settings.database_path(base_dir);
	let store = StateStore::open(&db_path)
		.await
		.with_context(|| format!("cannot open state database {}", db_path.display()))?;

	let records = store.list().await?;
	cli::render_status(&records, &mut io::stdout())?;
	Ok(())
}
