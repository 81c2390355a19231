use std::{
	io::{self, BufRead, Write},
	path::PathBuf,
};

use clap::{Args, Parser, Subcommand};

use crate::models::file_record::FileRecord;

pub const CONFIRM_PROMPT: &str = "This is a backup shortcut. Do you want to resume (Y/N)? ";
const INVALID_INPUT: &str = "Invalid input. Please enter 'Y' or 'N'.";

#[derive(Debug, Parser)]
#[command(name = "backline", version, about = "Incremental file backup to Google Drive")]
pub struct Cli {
	/// Directory holding the config files, state database and logs.
	/// Defaults to the directory of the executable.
	#[arg(long, global = true)]
	pub base_dir: Option<PathBuf>,

	/// `Y` runs without asking, for scheduled shortcuts.
	#[arg(value_name = "Y", hide = true)]
	pub answer: Option<String>,

	#[command(subcommand)]
	pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Back up changed files (the default).
	Run(RunArgs),
	/// Show what the state store currently tracks.
	Status,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
	/// Skip the confirmation prompt.
	#[arg(short = 'y', long)]
	pub yes: bool,

	/// Path-pattern list, relative to the base directory.
	#[arg(long, default_value = crate::config::PATHS_FILE)]
	pub paths: PathBuf,

	/// Company list, relative to the base directory.
	#[arg(long, default_value = crate::config::COMPANIES_FILE)]
	pub companies: PathBuf,
}

impl Cli {
	/// `run` with default arguments when no subcommand is given.
	pub fn command(&self) -> Command {
		match &self.command {
			Some(Command::Run(args)) => Command::Run(args.clone()),
			Some(Command::Status) => Command::Status,
			None => Command::Run(RunArgs {
				yes: self
					.answer
					.as_deref()
					.is_some_and(|a| a.eq_ignore_ascii_case("Y")),
				paths: PathBuf::from(crate::config::PATHS_FILE),
				companies: PathBuf::from(crate::config::COMPANIES_FILE),
			}),
		}
	}
}

/// Ask until the answer is `Y` or `N`. End of input counts as `N`.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<bool> {
	loop {
		write!(output, "{CONFIRM_PROMPT}")?;
		output.flush()?;

		let mut line = String::new();
		if input.read_line(&mut line)? == 0 {
			writeln!(output)?;
			return Ok(false);
		}

		match line.trim() {
			"Y" => return Ok(true),
			"N" => return Ok(false),
			_ => writeln!(output, "{INVALID_INPUT}")?,
		}
	}
}

/// One line per tracked file.
pub fn render_status<W: Write>(records: &[FileRecord], output: &mut W) -> io::Result<()> {
	if records.is_empty() {
		return writeln!(output, "No files backed up yet.");
	}

	for r in records {
		writeln!(output, "{}  {} bytes  {}", r.last_change_display(), r.size, r.path)?;
	}
	writeln!(output, "{} file(s) tracked.", records.len())
}
