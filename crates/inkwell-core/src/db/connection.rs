//! libSQL handle behind the Local Store

use std::path::PathBuf;

use libsql::{Builder, Connection, Database as LibSqlDatabase};

use super::migrations;
use crate::error::{Error, Result};

/// Where the store keeps its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

impl StoreLocation {
    fn builder_path(&self) -> String {
        match self {
            Self::File(path) => path.to_string_lossy().into_owned(),
            Self::Memory => ":memory:".to_string(),
        }
    }
}

/// Open, configured, and migrated libSQL database
pub struct Database {
    // Kept alive for the lifetime of `conn`.
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open the database at `location` and bring its schema up to date.
    ///
    /// Missing parent directories of a file location are created first.
    pub async fn open(location: &StoreLocation) -> Result<Self> {
        if let StoreLocation::File(path) = location {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|error| {
                    Error::StorageUnavailable(format!("cannot create {}: {error}", parent.display()))
                })?;
            }
        }

        let db = Builder::new_local(location.builder_path()).build().await?;
        let conn = db.connect()?;
        let database = Self { _db: db, conn };
        database.configure(location).await;
        migrations::run(&database.conn).await?;
        Ok(database)
    }

    async fn configure(&self, location: &StoreLocation) {
        // WAL only applies to file databases.
        if matches!(location, StoreLocation::File(_)) {
            if let Err(error) = self.conn.execute("PRAGMA journal_mode = WAL;", ()).await {
                tracing::debug!("WAL unavailable for local store: {error}");
            }
        }
        for pragma in ["PRAGMA synchronous = NORMAL;", "PRAGMA busy_timeout = 5000;"] {
            if let Err(error) = self.conn.execute(pragma, ()).await {
                tracing::debug!("Ignoring `{pragma}`: {error}");
            }
        }
    }

    /// Schema version recorded by the last migration
    pub async fn schema_version(&self) -> Result<i32> {
        migrations::version(&self.conn).await
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_database_is_migrated() {
        let db = Database::open(&StoreLocation::Memory).await.unwrap();
        assert_eq!(db.schema_version().await.unwrap(), migrations::CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn file_database_creates_parent_directories() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("inkwell.db");
        let location = StoreLocation::File(path.clone());

        drop(Database::open(&location).await.unwrap());
        assert!(path.exists());

        // Reopening leaves the schema version untouched.
        let reopened = Database::open(&location).await.unwrap();
        assert_eq!(
            reopened.schema_version().await.unwrap(),
            migrations::CURRENT_VERSION
        );
    }
}
