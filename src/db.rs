use std::path::Path;

use surrealdb::engine::local::{Db, Mem, SurrealKv};
use surrealdb::Surreal;
use thiserror::Error;
use tracing::debug;

use crate::models::file_record::FileRecord;

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("failed to open state database at {path}: {message}")]
	Open { path: String, message: String },

	#[error("database error: {0}")]
	DbError(String),

	#[error("malformed record for {path}: {message}")]
	Malformed { path: String, message: String },
}

/// Local record of what has been backed up.
///
/// Opened once per run and held until the run ends. Clone is cheap
/// (the SurrealDB handle is an Arc internally).
#[derive(Clone)]
pub struct StateStore {
	db: Surreal<Db>,
}

impl StateStore {
	/// Open (or create) the on-disk store and make sure the schema exists.
	pub async fn open(path: &Path) -> Result<Self, StoreError> {
		let db = Surreal::new::<SurrealKv>(path.to_path_buf()).await.map_err(|e| StoreError::Open {
			path: path.display().to_string(),
			message: e.to_string(),
		})?;
		Self::from_handle(db).await
	}

	/// Throwaway store, used by tests and dry runs.
	pub async fn in_memory() -> Result<Self, StoreError> {
		let db = Surreal::new::<Mem>(())
			.await
			.map_err(|e| StoreError::DbError(e.to_string()))?;
		Self::from_handle(db).await
	}

	async fn from_handle(db: Surreal<Db>) -> Result<Self, StoreError> {
		db.use_ns("backline")
			.use_db("backline")
			.await
			.map_err(|e| StoreError::DbError(e.to_string()))?;

		let store = Self { db };
		store.initialize().await?;
		Ok(store)
	}

	/// Run schema definitions. DEFINE ... OVERWRITE is idempotent.
	pub async fn initialize(&self) -> Result<(), StoreError> {
		self.db
			.query(SCHEMA_V1)
			.await
			.map_err(|e| StoreError::DbError(e.to_string()))?
			.check()
			.map_err(|e| StoreError::DbError(e.to_string()))?;
		Ok(())
	}

	/// The stored record for `path`. `None` means "no history".
	pub async fn lookup(&self, path: &str) -> Result<Option<FileRecord>, StoreError> {
		let mut response = self
			.db
			.query("SELECT path, name, size, modified_at FROM backed_up_file WHERE path = $path LIMIT 1")
			.bind(("path", path.to_string()))
			.await
			.map_err(|e| StoreError::DbError(e.to_string()))?;

		let rows: Vec<serde_json::Value> = response
			.take(0)
			.map_err(|e| StoreError::DbError(e.to_string()))?;

		rows.into_iter().next().map(|row| parse_record(path, row)).transpose()
	}

	/// Replace whatever is stored for `record.path` with `record`.
	///
	/// Delete and create run in one transaction: readers see either the old
	/// row or the new one, and the unique index on `path` rejects a second row.
	pub async fn upsert(&self, record: &FileRecord) -> Result<(), StoreError> {
		self.db
			.query(
				"BEGIN TRANSACTION;
                DELETE backed_up_file WHERE path = $path;
                CREATE backed_up_file CONTENT {
                    path: $path,
                    name: $name,
                    size: $size,
                    modified_at: $modified_at,
                    recorded_at: time::now(),
                };
                COMMIT TRANSACTION;",
			)
			.bind(("path", record.path.clone()))
			.bind(("name", record.name.clone()))
			.bind(("size", record.size))
			.bind(("modified_at", record.modified_at))
			.await
			.map_err(|e| StoreError::DbError(e.to_string()))?
			.check()
			.map_err(|e| StoreError::DbError(e.to_string()))?;

		debug!(path = %record.path, size = record.size, "state record replaced");
		Ok(())
	}

	/// Remove every record for `path`. No-op when nothing is stored.
	pub async fn delete(&self, path: &str) -> Result<(), StoreError> {
		self.db
			.query("DELETE backed_up_file WHERE path = $path")
			.bind(("path", path.to_string()))
			.await
			.map_err(|e| StoreError::DbError(e.to_string()))?
			.check()
			.map_err(|e| StoreError::DbError(e.to_string()))?;
		Ok(())
	}

	/// Number of rows stored for `path`. Anything above 1 is a defect.
	pub async fn count_for_path(&self, path: &str) -> Result<usize, StoreError> {
		let mut response = self
			.db
			.query("SELECT path FROM backed_up_file WHERE path = $path")
			.bind(("path", path.to_string()))
			.await
			.map_err(|e| StoreError::DbError(e.to_string()))?;

		let rows: Vec<serde_json::Value> = response
			.take(0)
			.map_err(|e| StoreError::DbError(e.to_string()))?;
		Ok(rows.len())
	}

	/// Run raw statements against the store.
	#[cfg(test)]
	pub(crate) async fn execute(&self, sql: &str) -> Result<(), StoreError> {
		self.db
			.query(sql)
			.await
			.map_err(|e| StoreError::DbError(e.to_string()))?
			.check()
			.map_err(|e| StoreError::DbError(e.to_string()))?;
		Ok(())
	}

	/// All tracked records, ordered by path.
	pub async fn list(&self) -> Result<Vec<FileRecord>, StoreError> {
		let mut response = self
			.db
			.query("SELECT path, name, size, modified_at FROM backed_up_file ORDER BY path")
			.await
			.map_err(|e| StoreError::DbError(e.to_string()))?;

		let rows: Vec<serde_json::Value> = response
			.take(0)
			.map_err(|e| StoreError::DbError(e.to_string()))?;

		rows.into_iter()
			.map(|row| {
				let path = row["path"].as_str().unwrap_or_default().to_string();
				parse_record(&path, row)
			})
			.collect()
	}
}

fn parse_record(path: &str, row: serde_json::Value) -> Result<FileRecord, StoreError> {
	serde_json::from_value(row).map_err(|e| StoreError::Malformed {
		path: path.to_string(),
		message: e.to_string(),
	})
}

const SCHEMA_V1: &str = "
    DEFINE TABLE OVERWRITE backed_up_file SCHEMAFULL;
    DEFINE FIELD OVERWRITE path ON backed_up_file TYPE string;
    DEFINE FIELD OVERWRITE name ON backed_up_file TYPE string;
    DEFINE FIELD OVERWRITE size ON backed_up_file TYPE int;
    DEFINE FIELD OVERWRITE modified_at ON backed_up_file TYPE int;
    DEFINE FIELD OVERWRITE recorded_at ON backed_up_file TYPE datetime;
    DEFINE INDEX OVERWRITE idx_path ON backed_up_file FIELDS path UNIQUE;
    DEFINE INDEX OVERWRITE idx_name ON backed_up_file FIELDS name;
";
