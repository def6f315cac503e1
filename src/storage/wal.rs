//! Append-only write-ahead log.
//!
//! Every record is framed as `len: u32` followed by `len` payload bytes:
//! `op(1) | lsn(8) | page_offset(8) | cell_key(4) | value_len(4) | value`,
//! all little-endian. A zero length terminates the log.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use crate::{
    config::SyncPolicy,
    storage::{bplus_tree::BPlusTree, storage_manager::Pager},
    types::{
        Lsn, PageOffset, RowId,
        error::{DatabaseError, Result},
    },
    utils::bytes::ByteReader,
};

const RECORD_HEADER_SIZE: usize = 1 + 8 + 8 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalOp {
    Insert,
    Update,
    Delete,
}

impl WalOp {
    pub fn as_u8(&self) -> u8 {
        match self {
            WalOp::Insert => 0,
            WalOp::Update => 1,
            WalOp::Delete => 2,
        }
    }

    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(WalOp::Insert),
            1 => Ok(WalOp::Update),
            2 => Ok(WalOp::Delete),
            _ => Err(DatabaseError::decode(format!("unknown WAL op {}", tag))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    pub lsn: Lsn,
    pub op: WalOp,
    pub page_offset: PageOffset,
    pub cell_key: RowId,
    pub value: Vec<u8>,
}

/// Entries produced by one operation, in increasing LSN order. Durable once
/// passed to `Wal::flush`.
pub type WalBatch = Vec<WalEntry>;

impl WalEntry {
    pub fn insert(lsn: Lsn, page_offset: PageOffset, cell_key: RowId, value: Vec<u8>) -> Self {
        Self {
            lsn,
            op: WalOp::Insert,
            page_offset,
            cell_key,
            value,
        }
    }

    pub fn update(lsn: Lsn, page_offset: PageOffset, cell_key: RowId, value: Vec<u8>) -> Self {
        Self {
            lsn,
            op: WalOp::Update,
            page_offset,
            cell_key,
            value,
        }
    }

    pub fn delete(lsn: Lsn, page_offset: PageOffset, cell_key: RowId) -> Self {
        Self {
            lsn,
            op: WalOp::Delete,
            page_offset,
            cell_key,
            value: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(RECORD_HEADER_SIZE + self.value.len());
        buffer.push(self.op.as_u8());
        buffer.extend_from_slice(&self.lsn.to_le_bytes());
        buffer.extend_from_slice(&self.page_offset.to_le_bytes());
        buffer.extend_from_slice(&self.cell_key.to_le_bytes());
        buffer.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        buffer.extend_from_slice(&self.value);
        buffer
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let op = WalOp::from_u8(reader.read_u8()?)?;
        let lsn = reader.read_u64()?;
        let page_offset = reader.read_u64()?;
        let cell_key = reader.read_u32()?;
        let len = reader.read_u32()? as usize;
        let value = reader.take(len)?.to_vec();
        Ok(Self {
            lsn,
            op,
            page_offset,
            cell_key,
            value,
        })
    }

    fn framed(&self) -> Vec<u8> {
        let payload = self.to_bytes();
        let mut buffer = Vec::with_capacity(4 + payload.len());
        buffer.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buffer.extend_from_slice(&payload);
        buffer
    }
}

pub struct Wal {
    path: PathBuf,
    file: File,
    sync_policy: SyncPolicy,
}

impl Wal {
    /// Opens (creating if needed) the log in append mode.
    pub fn open<P: AsRef<Path>>(path: P, sync_policy: SyncPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        Ok(Self {
            path,
            file,
            sync_policy,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends every entry in order. An error aborts the rest of the batch.
    pub fn flush(&mut self, batch: &[WalEntry]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        match self.sync_policy {
            SyncPolicy::EveryRecord => {
                for entry in batch {
                    self.file.write_all(&entry.framed())?;
                    self.file.sync_data()?;
                }
            }
            SyncPolicy::EveryBatch | SyncPolicy::Never => {
                let mut buffer = Vec::new();
                for entry in batch {
                    buffer.extend_from_slice(&entry.framed());
                }
                self.file.write_all(&buffer)?;
                if self.sync_policy == SyncPolicy::EveryBatch {
                    self.file.sync_data()?;
                }
            }
        }
        tracing::debug!(
            records = batch.len(),
            last_lsn = batch[batch.len() - 1].lsn,
            "flushed WAL batch"
        );
        Ok(())
    }

    /// Reads records from the start of the log until EOF, a zero length, or
    /// a torn trailing record.
    pub fn read(&self) -> Result<WalBatch> {
        let mut bytes = Vec::new();
        File::open(&self.path)?.read_to_end(&mut bytes)?;

        let mut reader = ByteReader::new(&bytes);
        let mut batch = Vec::new();
        while reader.remaining() > 0 {
            if reader.remaining() < 4 {
                tracing::warn!(bytes = reader.remaining(), "ignoring torn WAL length prefix");
                break;
            }
            let len = reader.read_u32()? as usize;
            if len == 0 {
                break;
            }
            if reader.remaining() < len {
                tracing::warn!(
                    expected = len,
                    available = reader.remaining(),
                    "ignoring torn WAL record"
                );
                break;
            }
            batch.push(WalEntry::from_bytes(reader.take(len)?)?);
        }
        Ok(batch)
    }

    /// Discards every record; called once the pages they describe are flushed.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.file.flush()?;
        if self.sync_policy != SyncPolicy::Never {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub skipped: usize,
}

/// Re-applies `batch` to the store. A record is skipped when its LSN is not
/// newer than the target page's last LSN, which makes replay idempotent.
/// Pages are flushed afterwards.
pub fn replay(pager: &mut Pager, batch: &[WalEntry]) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();
    let resume_lsn = pager.next_lsn();

    for entry in batch {
        pager.set_next_lsn(entry.lsn);
        let page_lsn = pager.page_mut(entry.page_offset)?.last_lsn;
        if entry.lsn <= page_lsn {
            stats.skipped += 1;
            continue;
        }

        match entry.op {
            WalOp::Insert => {
                let mut tree = BPlusTree::new(entry.page_offset);
                match tree.insert_key(pager, entry.cell_key, &entry.value) {
                    Ok(_) => {}
                    Err(DatabaseError::KeyAlreadyExists { key }) => {
                        tracing::warn!(key, lsn = entry.lsn, "replayed insert already present");
                    }
                    Err(e) => return Err(e),
                }
                pager.observe_key(entry.cell_key);
            }
            WalOp::Update => {
                let page = pager.page_mut(entry.page_offset)?;
                page.update_cell(entry.cell_key, &entry.value)
                    .map_err(|e| recovery_error(entry, e))?;
                page.mark_dirty(entry.lsn);
            }
            WalOp::Delete => {
                let page = pager.page_mut(entry.page_offset)?;
                page.mark_deleted(entry.cell_key)
                    .map_err(|e| recovery_error(entry, e))?;
                page.mark_dirty(entry.lsn);
            }
        }
        stats.applied += 1;
    }

    let last_lsn = batch.last().map_or(0, |entry| entry.lsn);
    pager.set_next_lsn(resume_lsn.max(last_lsn + 1));
    pager.flush_pages()?;
    Ok(stats)
}

fn recovery_error(entry: &WalEntry, cause: DatabaseError) -> DatabaseError {
    DatabaseError::Recovery {
        details: format!(
            "{:?} of key {} on page {} (lsn {}): {}",
            entry.op, entry.cell_key, entry.page_offset, entry.lsn, cause
        ),
    }
}
