//! backline: incremental backup of local files to Google Drive.
//!
//! A run expands the configured path patterns, compares every file with the
//! record of its last upload, uploads what changed into
//! `BackupRoot/<company>/<MM_DD_YY>/<HH.mm>` and then replaces the record.

pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod logging;
pub mod models;
pub mod remote;
