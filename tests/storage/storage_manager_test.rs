use std::{fs, thread, time::Duration};

use pacul::{
    config::Config,
    storage::{SUPERBLOCK_SIZE, header::Superblock, storage_manager::StorageManager},
    types::{PAGE_SIZE, error::DatabaseError, page::Page},
    utils::mock::TempDatabase,
};

fn test_config() -> Config {
    Config::default().with_flush_interval(Duration::ZERO)
}

#[test]
fn test_superblock_layout() {
    let superblock = Superblock {
        last_key: 7,
        page_table_root: 4096,
        next_free_offset: 3 * 4096,
        next_lsn: 42,
    };
    let bytes = superblock.to_bytes().unwrap();

    assert_eq!(bytes.len(), SUPERBLOCK_SIZE);
    assert_eq!(&bytes[0..4], &7u32.to_le_bytes());
    assert_eq!(&bytes[4..12], &4096u64.to_le_bytes());
    assert_eq!(&bytes[12..20], &(3 * 4096u64).to_le_bytes());
    assert_eq!(&bytes[20..28], &42u64.to_le_bytes());
    assert_eq!(Superblock::from_bytes(&bytes).unwrap(), superblock);
}

#[test]
fn test_fresh_store_defaults() {
    let temp = TempDatabase::with_prefix("store_defaults").unwrap();
    let path = temp.scratch_path("tbl");
    let store = StorageManager::create(&path, &test_config()).unwrap();

    let pager = store.read();
    assert_eq!(pager.next_free_offset(), PAGE_SIZE as u64);
    assert_eq!(pager.next_lsn(), 1);
    assert_eq!(pager.last_key(), 0);
    drop(pager);

    // a second create on the same path fails
    assert!(matches!(
        StorageManager::create(&path, &test_config()),
        Err(DatabaseError::Io(_))
    ));
}

#[test]
fn test_append_assigns_consecutive_offsets() {
    let temp = TempDatabase::with_prefix("store_append").unwrap();
    let store = StorageManager::create(temp.scratch_path("tbl"), &test_config()).unwrap();

    let mut pager = store.write();
    let first = pager.append(Page::new_leaf()).unwrap();
    let second = pager.append(Page::new_leaf()).unwrap();

    assert_eq!(first, 4096);
    assert_eq!(second, 8192);
    assert_eq!(pager.next_free_offset(), 3 * 4096);
    assert_eq!(pager.page_mut(second).unwrap().offset, second);
    assert!(pager.page_mut(first).unwrap().is_dirty);
}

#[test]
fn test_flush_persists_pages_and_superblock() {
    let temp = TempDatabase::with_prefix("store_flush").unwrap();
    let path = temp.scratch_path("tbl");
    {
        let store = StorageManager::create(&path, &test_config()).unwrap();
        let mut pager = store.write();
        let offset = pager.append(Page::new_leaf()).unwrap();
        pager.page_mut(offset).unwrap().insert_leaf_cell(1, b"hello").unwrap();
        let key = pager.next_key();
        assert_eq!(key, 1);
        pager.stamp(&[offset]).unwrap();
        pager.set_page_table_root(offset);
        drop(pager);
        store.close().unwrap();
    }

    assert_eq!(fs::metadata(&path).unwrap().len(), 2 * PAGE_SIZE as u64);

    let store = StorageManager::open(&path, &test_config()).unwrap();
    let pager = store.read();
    assert_eq!(pager.page_table_root(), 4096);
    assert_eq!(pager.last_key(), 1);
    assert_eq!(pager.next_lsn(), 2);

    let page = pager.page(4096).unwrap();
    assert_eq!(page.last_lsn, 1);
    assert!(!page.is_dirty);
    let (_, cell) = page.leaf_cell_at(0).unwrap();
    assert_eq!(cell.value, b"hello");
}

#[test]
fn test_stamp_uses_one_lsn_per_call() {
    let temp = TempDatabase::with_prefix("store_stamp").unwrap();
    let store = StorageManager::create(temp.scratch_path("tbl"), &test_config()).unwrap();
    let mut pager = store.write();
    let a = pager.append(Page::new_leaf()).unwrap();
    let b = pager.append(Page::new_leaf()).unwrap();

    assert_eq!(pager.stamp(&[a, b]).unwrap(), 1);
    assert_eq!(pager.stamp(&[b]).unwrap(), 2);
    assert_eq!(pager.page_mut(a).unwrap().last_lsn, 1);
    assert_eq!(pager.page_mut(b).unwrap().last_lsn, 2);
    assert_eq!(pager.next_lsn(), 3);
}

#[test]
fn test_invalid_offsets_rejected() {
    let temp = TempDatabase::with_prefix("store_offsets").unwrap();
    let store = StorageManager::create(temp.scratch_path("tbl"), &test_config()).unwrap();
    let pager = store.read();

    assert!(matches!(
        pager.page(0),
        Err(DatabaseError::InvalidPageOffset { offset: 0 })
    ));
    assert!(matches!(
        pager.page(4097),
        Err(DatabaseError::InvalidPageOffset { offset: 4097 })
    ));
}

#[test]
fn test_all_dirty_cache_surfaces_lru_full() {
    let temp = TempDatabase::with_prefix("store_lru_full").unwrap();
    let config = test_config().with_cache_capacity(2);
    let store = StorageManager::create(temp.scratch_path("tbl"), &config).unwrap();
    let mut pager = store.write();
    pager.append(Page::new_leaf()).unwrap();
    pager.append(Page::new_leaf()).unwrap();

    assert!(matches!(
        pager.append(Page::new_leaf()),
        Err(DatabaseError::LruCacheFull { capacity: 2 })
    ));
    // the allocator did not advance
    assert_eq!(pager.next_free_offset(), 3 * 4096);

    pager.flush_pages().unwrap();
    assert_eq!(pager.append(Page::new_leaf()).unwrap(), 3 * 4096);
    assert_eq!(pager.cached_pages(), 2);
}

#[test]
fn test_failed_atomic_section_restores_store() {
    let temp = TempDatabase::with_prefix("store_atomic_rollback").unwrap();
    let store = StorageManager::create(temp.scratch_path("tbl"), &test_config()).unwrap();
    let mut pager = store.write();
    let offset = pager.append(Page::new_leaf()).unwrap();
    pager.flush_pages().unwrap();
    let before = *pager.superblock();

    let result = pager.atomic::<()>(|pager| {
        pager.page_mut(offset)?.insert_leaf_cell(1, b"gone")?;
        pager.next_key();
        pager.append(Page::new_leaf())?;
        pager.stamp(&[offset])?;
        Err(DatabaseError::InvalidData {
            details: "abort".to_string(),
        })
    });
    assert!(matches!(result, Err(DatabaseError::InvalidData { .. })));

    assert_eq!(*pager.superblock(), before);
    assert_eq!(pager.cached_offsets(), vec![offset]);
    let page = pager.page(offset).unwrap();
    assert!(page.is_empty());
    assert!(!page.is_dirty);
    assert_eq!(page.last_lsn, 0);

    // the next append reuses the offset the failed section took
    assert_eq!(pager.append(Page::new_leaf()).unwrap(), 2 * 4096);
}

#[test]
fn test_atomic_section_unpins_untouched_pages() {
    let temp = TempDatabase::with_prefix("store_atomic_release").unwrap();
    let store = StorageManager::create(temp.scratch_path("tbl"), &test_config()).unwrap();
    let mut pager = store.write();
    let first = pager.append(Page::new_leaf()).unwrap();
    let second = pager.append(Page::new_leaf()).unwrap();
    pager.flush_pages().unwrap();

    pager
        .atomic(|pager| {
            pager.page_mut(first)?;
            pager.page_mut(second)?.insert_leaf_cell(7, b"kept")?;
            pager.stamp(&[second])
        })
        .unwrap();

    assert!(!pager.page(first).unwrap().is_dirty);
    let second = pager.page(second).unwrap();
    assert!(second.is_dirty);
    assert_eq!(second.len(), 1);
}

#[test]
fn test_clean_pages_reload_after_eviction() {
    let temp = TempDatabase::with_prefix("store_reload").unwrap();
    let config = test_config().with_cache_capacity(1);
    let store = StorageManager::create(temp.scratch_path("tbl"), &config).unwrap();
    let mut pager = store.write();

    let first = pager.append(Page::new_leaf()).unwrap();
    pager.page_mut(first).unwrap().insert_leaf_cell(3, b"three").unwrap();
    pager.flush_pages().unwrap();
    let second = pager.append(Page::new_leaf()).unwrap();
    assert_eq!(pager.cached_offsets(), vec![second]);
    pager.flush_pages().unwrap();

    let page = pager.page(first).unwrap();
    assert_eq!(page.leaf_cell_at(0).unwrap().1.value, b"three");
    assert_eq!(pager.cached_offsets(), vec![first]);
}

#[test]
fn test_update_writes_through() {
    let temp = TempDatabase::with_prefix("store_update").unwrap();
    let path = temp.scratch_path("tbl");
    let store = StorageManager::create(&path, &test_config()).unwrap();
    let mut pager = store.write();
    let offset = pager.append(Page::new_leaf()).unwrap();

    let mut page = pager.page(offset).unwrap();
    page.insert_leaf_cell(8, b"eight").unwrap();
    pager.update(page).unwrap();
    assert!(!pager.page_mut(offset).unwrap().is_dirty);

    let bytes = fs::read(&path).unwrap();
    let on_disk = Page::from_bytes(&bytes[4096..8192]).unwrap();
    assert_eq!(on_disk.leaf_cell_at(0).unwrap().1.value, b"eight");
}

#[test]
fn test_background_flusher_writes_dirty_pages() {
    let temp = TempDatabase::with_prefix("store_flusher").unwrap();
    let path = temp.scratch_path("tbl");
    let config = Config::default().with_flush_interval(Duration::from_millis(10));
    let store = StorageManager::create(&path, &config).unwrap();
    store.write().append(Page::new_leaf()).unwrap();

    let mut flushed = false;
    for _ in 0..200 {
        thread::sleep(Duration::from_millis(10));
        if !store.read().page(4096).unwrap().is_dirty {
            flushed = true;
            break;
        }
    }
    assert!(flushed);
    assert_eq!(fs::metadata(&path).unwrap().len(), 2 * PAGE_SIZE as u64);
    store.close().unwrap();
}

#[test]
fn test_drop_flushes() {
    let temp = TempDatabase::with_prefix("store_drop").unwrap();
    let path = temp.scratch_path("tbl");
    {
        let store = StorageManager::create(&path, &test_config()).unwrap();
        store.write().append(Page::new_leaf()).unwrap();
    }
    let store = StorageManager::open(&path, &test_config()).unwrap();
    assert_eq!(store.read().next_free_offset(), 2 * 4096);
    assert!(store.read().page(4096).unwrap().is_leaf());
}
