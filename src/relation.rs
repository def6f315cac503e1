//! Public façade over one database directory.
//!
//! A `Relation` owns the page store (`<data_root>/<name>/tbl`) and the
//! write-ahead log (`<data_root>/<name>/wal`). Mutations return the WAL batch
//! describing them; a mutation is committed once `flush_wal_batch` has
//! written that batch. Table operations live in `crate::executor`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use crate::{
    config::Config,
    storage::{
        TABLE_FILE_NAME, WAL_FILE_NAME,
        schema::{
            self, SYS_PAGES, SYS_SCHEMA, TableSchema, page_table_tuple, sys_pages_schema,
            sys_schema_schema,
        },
        storage_manager::StorageManager,
        wal::{self, Wal, WalEntry},
    },
    types::{
        PAGE_SIZE, PageOffset,
        error::{DatabaseError, Result},
        page::Page,
    },
};

/// Root of sys_pages in a freshly created database.
pub const SYS_PAGES_ROOT: PageOffset = PAGE_SIZE as PageOffset;
/// Root of sys_schema in a freshly created database.
pub const SYS_SCHEMA_ROOT: PageOffset = 2 * PAGE_SIZE as PageOffset;

pub struct Relation {
    name: String,
    dir: PathBuf,
    pub(crate) store: StorageManager,
    wal: Mutex<Wal>,
}

impl Relation {
    /// Creates `<data_root>/<name>` with an empty page store whose two
    /// catalogs describe themselves.
    pub fn create_db(config: &Config, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(DatabaseError::DbNotSelected);
        }
        let dir = config.database_dir(name);
        let table_path = dir.join(TABLE_FILE_NAME);
        if table_path.exists() {
            return Err(DatabaseError::DbExists {
                name: name.to_string(),
            });
        }
        fs::create_dir_all(&dir)?;

        let store = StorageManager::create(&table_path, config)?;
        let mut wal = Wal::open(dir.join(WAL_FILE_NAME), config.sync_policy)?;
        // a log left behind by an earlier database of this name is stale
        wal.truncate()?;

        {
            let mut pager = store.write();
            let pages_root = pager.append(Page::new_leaf())?;
            if pages_root != SYS_PAGES_ROOT {
                return Err(DatabaseError::InvalidPageOffset { offset: pages_root });
            }
            pager.set_page_table_root(pages_root);

            let schema_root = pager.append(Page::new_leaf())?;
            if schema_root != SYS_SCHEMA_ROOT {
                return Err(DatabaseError::InvalidPageOffset {
                    offset: schema_root,
                });
            }

            schema::insert_catalog_row(&mut pager, SYS_PAGES, &page_table_tuple(SYS_PAGES, pages_root)?)?;
            schema::insert_catalog_row(&mut pager, SYS_PAGES, &page_table_tuple(SYS_SCHEMA, schema_root)?)?;

            for (catalog, columns) in [(SYS_PAGES, sys_pages_schema()), (SYS_SCHEMA, sys_schema_schema())] {
                for column in &columns {
                    schema::insert_catalog_row(&mut pager, SYS_SCHEMA, &column.to_schema_tuple(catalog))?;
                }
            }
            pager.flush_pages()?;
        }

        tracing::info!(name, path = %dir.display(), "created database");
        Ok(Self {
            name: name.to_string(),
            dir,
            store,
            wal: Mutex::new(wal),
        })
    }

    /// Opens an existing database, replaying and then truncating its WAL.
    pub fn open(config: &Config, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(DatabaseError::DbNotSelected);
        }
        let dir = config.database_dir(name);
        let table_path = dir.join(TABLE_FILE_NAME);
        if !table_path.exists() {
            return Err(DatabaseError::DbNotExist {
                name: name.to_string(),
            });
        }

        let store = StorageManager::open(&table_path, config)?;
        let mut wal = Wal::open(dir.join(WAL_FILE_NAME), config.sync_policy)?;

        let batch = wal.read()?;
        if !batch.is_empty() {
            let stats = wal::replay(&mut store.write(), &batch)?;
            wal.truncate()?;
            tracing::info!(
                name,
                records = batch.len(),
                applied = stats.applied,
                skipped = stats.skipped,
                "replayed WAL"
            );
        }

        tracing::info!(name, path = %dir.display(), "opened database");
        Ok(Self {
            name: name.to_string(),
            dir,
            store,
            wal: Mutex::new(wal),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn storage(&self) -> &StorageManager {
        &self.store
    }

    /// Makes every entry of `batch` durable.
    pub fn flush_wal_batch(&self, batch: &[WalEntry]) -> Result<()> {
        self.wal.lock().flush(batch)
    }

    /// Checkpoint: writes every dirty page and the superblock, then empties
    /// the WAL, whose records are all reflected on disk at that point. The
    /// WAL lock is held throughout so no batch lands between the two steps.
    pub fn flush(&self) -> Result<()> {
        let mut wal = self.wal.lock();
        self.store.flush()?;
        wal.truncate()?;
        tracing::debug!(name = %self.name, "checkpointed WAL");
        Ok(())
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        schema::table_names(&self.store.read())
    }

    pub fn table_schema(&self, table: &str) -> Result<TableSchema> {
        schema::load_table(&self.store.read(), table)
    }

    /// Closes the WAL, then the page store (which flushes once more).
    pub fn close(self) -> Result<()> {
        self.wal.into_inner().close()?;
        self.store.close()?;
        tracing::info!(name = %self.name, "closed database");
        Ok(())
    }
}
