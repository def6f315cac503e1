use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{
        Arc,
        mpsc::{self, RecvTimeoutError},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    config::Config,
    storage::{
        SUPERBLOCK_SIZE,
        header::Superblock,
        lru::LruCache,
    },
    types::{
        Lsn, PAGE_SIZE, PageOffset, RowId,
        error::{DatabaseError, Result},
        page::Page,
    },
};

/// File-backed page store: the page file, the LRU of decoded pages and the
/// superblock counters. Reached through the `StorageManager` lock; the shared
/// side can fetch pages (cloned out of the cache), the exclusive side can
/// mutate them in place.
pub struct Pager {
    file: Mutex<File>,
    cache: Mutex<LruCache<PageOffset, Page>>,
    superblock: Superblock,
    undo: Option<UndoLog>,
}

/// State captured when an atomic section opens: the superblock and the
/// pre-image of every existing page handed out by `page_mut` since.
struct UndoLog {
    superblock: Superblock,
    images: HashMap<PageOffset, Page>,
}

impl Pager {
    fn new(file: File, superblock: Superblock, cache_capacity: usize) -> Self {
        Self {
            file: Mutex::new(file),
            cache: Mutex::new(LruCache::new(cache_capacity)),
            superblock,
            undo: None,
        }
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn page_table_root(&self) -> PageOffset {
        self.superblock.page_table_root
    }

    pub fn set_page_table_root(&mut self, root: PageOffset) {
        self.superblock.page_table_root = root;
    }

    pub fn last_key(&self) -> RowId {
        self.superblock.last_key
    }

    /// Raises last_key to at least `key`; used when replay re-inserts a row.
    pub fn observe_key(&mut self, key: RowId) {
        self.superblock.last_key = self.superblock.last_key.max(key);
    }

    pub fn next_key(&mut self) -> RowId {
        self.superblock.last_key += 1;
        self.superblock.last_key
    }

    pub fn next_lsn(&self) -> Lsn {
        self.superblock.next_lsn
    }

    pub fn set_next_lsn(&mut self, lsn: Lsn) {
        self.superblock.next_lsn = lsn;
    }

    pub fn next_free_offset(&self) -> PageOffset {
        self.superblock.next_free_offset
    }

    pub fn cached_pages(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.lock().capacity()
    }

    /// Offsets currently cached, most recently used first.
    pub fn cached_offsets(&self) -> Vec<PageOffset> {
        self.cache.lock().keys()
    }

    /// Takes the next LSN, stamps it on every page in `offsets` and marks
    /// them dirty. Runs under the exclusive lock, so the stamp and the
    /// increment are never interleaved with another writer.
    pub fn stamp(&mut self, offsets: &[PageOffset]) -> Result<Lsn> {
        let lsn = self.superblock.next_lsn;
        for &offset in offsets {
            self.page_mut(offset)?.mark_dirty(lsn);
        }
        self.superblock.next_lsn += 1;
        Ok(lsn)
    }

    /// Places `page` at next_free_offset and caches it dirty.
    pub fn append(&mut self, mut page: Page) -> Result<PageOffset> {
        let offset = self.superblock.next_free_offset;
        page.offset = offset;
        page.is_dirty = true;
        let cache = self.cache.get_mut();
        if !cache.set(offset, page) {
            return Err(DatabaseError::LruCacheFull {
                capacity: cache.capacity(),
            });
        }
        self.superblock.next_free_offset += PAGE_SIZE as PageOffset;
        tracing::debug!(offset, "appended page");
        Ok(offset)
    }

    /// Writes the page image immediately and refreshes the cached copy.
    pub fn update(&mut self, mut page: Page) -> Result<()> {
        check_offset(page.offset)?;
        let bytes = page.to_bytes()?;
        write_at(self.file.get_mut(), page.offset, &bytes)?;
        page.is_dirty = false;
        let offset = page.offset;
        let cache = self.cache.get_mut();
        if !cache.set(offset, page) {
            return Err(DatabaseError::LruCacheFull {
                capacity: cache.capacity(),
            });
        }
        Ok(())
    }

    /// Shared-side fetch: returns a copy of the page, loading it on a miss.
    pub fn page(&self, offset: PageOffset) -> Result<Page> {
        check_offset(offset)?;
        let mut cache = self.cache.lock();
        if let Some(page) = cache.get(&offset) {
            return Ok(page.clone());
        }
        let page = read_page(&mut self.file.lock(), offset)?;
        if !cache.set(offset, page.clone()) {
            return Err(DatabaseError::LruCacheFull {
                capacity: cache.capacity(),
            });
        }
        Ok(page)
    }

    /// Exclusive-side fetch: the cached page itself, loading it on a miss.
    pub fn page_mut(&mut self, offset: PageOffset) -> Result<&mut Page> {
        check_offset(offset)?;
        let cache = self.cache.get_mut();
        if !cache.contains(&offset) {
            let page = read_page(self.file.get_mut(), offset)?;
            if !cache.set(offset, page) {
                return Err(DatabaseError::LruCacheFull {
                    capacity: cache.capacity(),
                });
            }
        }
        let page = cache
            .get_mut(&offset)
            .ok_or(DatabaseError::InvalidPageOffset { offset })?;
        if let Some(undo) = self.undo.as_mut() {
            if offset < undo.superblock.next_free_offset {
                undo.images.entry(offset).or_insert_with(|| page.clone());
            }
            // pinned until the section ends
            page.is_dirty = true;
        }
        Ok(page)
    }

    /// Runs `f` as one all-or-nothing mutation. If it fails, every page it
    /// reached through `page_mut` gets its old image back, pages it appended
    /// are dropped and the superblock counters are restored, so neither the
    /// cache nor a later flush sees a partial change. Nested calls join the
    /// outermost section.
    pub fn atomic<T>(&mut self, f: impl FnOnce(&mut Pager) -> Result<T>) -> Result<T> {
        if self.undo.is_some() {
            return f(self);
        }
        self.undo = Some(UndoLog {
            superblock: self.superblock,
            images: HashMap::new(),
        });
        let result = f(self);
        if let Some(undo) = self.undo.take() {
            match &result {
                Ok(_) => self.release(undo),
                Err(e) => self.rollback(undo, e),
            }
        }
        result
    }

    /// Unpins pages the section reached but left unchanged.
    fn release(&mut self, undo: UndoLog) {
        let cache = self.cache.get_mut();
        for (offset, image) in undo.images {
            if let Some(page) = cache.get_mut(&offset) {
                if same_contents(page, &image) {
                    page.is_dirty = image.is_dirty;
                }
            }
        }
    }

    fn rollback(&mut self, undo: UndoLog, cause: &DatabaseError) {
        let cache = self.cache.get_mut();
        let mut offset = undo.superblock.next_free_offset;
        while offset < self.superblock.next_free_offset {
            cache.remove(&offset);
            offset += PAGE_SIZE as PageOffset;
        }
        let restored = undo.images.len();
        for (offset, image) in undo.images {
            // replaces a pinned entry, so no eviction is needed
            if !cache.set(offset, image) {
                tracing::error!(offset, "lost pre-image during rollback");
            }
        }
        self.superblock = undo.superblock;
        tracing::debug!(pages = restored, error = %cause, "rolled back mutation");
    }

    /// Writes every dirty page, marks it clean, then rewrites the superblock.
    pub fn flush_pages(&mut self) -> Result<()> {
        let file = self.file.get_mut();
        let mut written = 0usize;
        for page in self.cache.get_mut().values_mut() {
            if !page.is_dirty {
                continue;
            }
            let bytes = page.to_bytes()?;
            write_at(file, page.offset, &bytes)?;
            page.is_dirty = false;
            written += 1;
        }
        write_at(file, 0, &self.superblock.to_bytes()?)?;
        file.sync_data()?;
        if written > 0 {
            tracing::debug!(pages = written, "flushed dirty pages");
        }
        Ok(())
    }
}

fn same_contents(page: &Page, image: &Page) -> bool {
    page.last_lsn == image.last_lsn && page.slots == image.slots && page.kind == image.kind
}

fn check_offset(offset: PageOffset) -> Result<()> {
    if offset < PAGE_SIZE as PageOffset || offset % PAGE_SIZE as PageOffset != 0 {
        return Err(DatabaseError::InvalidPageOffset { offset });
    }
    Ok(())
}

fn read_page(file: &mut File, offset: PageOffset) -> Result<Page> {
    let mut buffer = vec![0u8; PAGE_SIZE];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buffer)?;
    Page::from_bytes(&buffer)
}

fn write_at(file: &mut File, offset: u64, bytes: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    Ok(())
}

/// Background task flushing dirty pages at a fixed interval until stopped.
struct Flusher {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Flusher {
    fn spawn(pager: Arc<RwLock<Pager>>, interval: Duration) -> Result<Self> {
        let (stop, ticks) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("page-flusher".to_string())
            .spawn(move || {
                loop {
                    match ticks.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(e) = pager.write().flush_pages() {
                                tracing::error!(error = %e, "background page flush failed");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;
        Ok(Self { stop, handle })
    }

    fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            tracing::error!("page flusher panicked");
        }
    }
}

pub struct StorageManager {
    path: PathBuf,
    pager: Arc<RwLock<Pager>>,
    flusher: Option<Flusher>,
    closed: bool,
}

impl StorageManager {
    /// Creates a fresh page file holding only the superblock.
    pub fn create<P: AsRef<Path>>(path: P, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;
        let superblock = Superblock::default();
        write_at(&mut file, 0, &superblock.to_bytes()?)?;
        file.sync_data()?;
        Self::start(path, file, superblock, config)
    }

    /// Opens an existing page file and reads its superblock.
    pub fn open<P: AsRef<Path>>(path: P, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut buffer = [0u8; SUPERBLOCK_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buffer)?;
        let superblock = Superblock::from_bytes(&buffer)?;
        Self::start(path, file, superblock, config)
    }

    fn start(path: &Path, file: File, superblock: Superblock, config: &Config) -> Result<Self> {
        let pager = Arc::new(RwLock::new(Pager::new(
            file,
            superblock,
            config.cache_capacity,
        )));
        let flusher = if config.flush_interval.is_zero() {
            None
        } else {
            Some(Flusher::spawn(Arc::clone(&pager), config.flush_interval)?)
        };
        Ok(Self {
            path: path.to_path_buf(),
            pager,
            flusher,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts a read transaction; it ends when the guard drops.
    pub fn read(&self) -> RwLockReadGuard<'_, Pager> {
        self.pager.read()
    }

    /// Starts a write transaction; it ends when the guard drops.
    pub fn write(&self) -> RwLockWriteGuard<'_, Pager> {
        self.pager.write()
    }

    pub fn flush(&self) -> Result<()> {
        self.pager.write().flush_pages()
    }

    /// Stops the flusher, flushes once and releases the file.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(flusher) = self.flusher.take() {
            flusher.stop();
        }
        self.flush()
    }
}

impl Drop for StorageManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, path = %self.path.display(), "final flush failed");
        }
    }
}
