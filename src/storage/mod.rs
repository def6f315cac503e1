pub mod bplus_tree;
pub mod header;
pub mod lru;
pub mod schema;
pub mod storage_manager;
pub mod wal;

/// last_key(4) | page_table_root(8) | next_free_offset(8) | next_lsn(8)
pub const SUPERBLOCK_SIZE: usize = 4 + 8 + 8 + 8;

pub const TABLE_FILE_NAME: &str = "tbl";
pub const WAL_FILE_NAME: &str = "wal";
