use chrono::{DateTime, Local};

/// Source of "now" for folder names and log file names.
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Local> {
		Local::now()
	}
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl Clock for FixedClock {
	fn now(&self) -> DateTime<Local> {
		self.0
	}
}
