use std::{path::PathBuf, time::Duration};

use tempfile::TempDir;

use crate::{
    config::{Config, SyncPolicy},
    relation::Relation,
    storage::{TABLE_FILE_NAME, WAL_FILE_NAME},
    types::error::Result,
};

/// A data root in a throwaway directory, removed on drop. The background
/// flusher is off by default so tests control when pages reach disk.
pub struct TempDatabase {
    dir: TempDir,
    pub name: String,
    pub config: Config,
}

impl TempDatabase {
    pub fn new() -> Result<Self> {
        Self::with_prefix("pacul_test")
    }

    pub fn with_prefix(prefix: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        let config = Config::default()
            .with_data_root(dir.path())
            .with_flush_interval(Duration::ZERO)
            .with_sync_policy(SyncPolicy::Never);
        Ok(Self {
            dir,
            name: "testdb".to_string(),
            config,
        })
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config.with_data_root(self.dir.path());
        self
    }

    pub fn create(&self) -> Result<Relation> {
        Relation::create_db(&self.config, &self.name)
    }

    pub fn open(&self) -> Result<Relation> {
        Relation::open(&self.config, &self.name)
    }

    pub fn table_path(&self) -> PathBuf {
        self.config.database_dir(&self.name).join(TABLE_FILE_NAME)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.config.database_dir(&self.name).join(WAL_FILE_NAME)
    }

    /// A fresh page file path inside the temp directory, for store-level tests.
    pub fn scratch_path(&self, file_name: &str) -> PathBuf {
        self.dir.path().join(file_name)
    }
}
