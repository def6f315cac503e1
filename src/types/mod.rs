pub mod error;
pub mod page;
pub mod row;
pub mod value;

// Common type aliases
pub type PageOffset = u64;
pub type Lsn = u64;
pub type RowId = u32;

pub const PAGE_SIZE: usize = 4096;
pub const MAX_VALUE_SIZE: usize = 400;

// Header layouts (see page.rs)
pub const COMMON_HEADER_SIZE: usize = 1 + 8 + 8; // tag | offset | last_lsn
pub const INTERNAL_HEADER_SIZE: usize = COMMON_HEADER_SIZE + 8 + 4; // right_child | count
pub const LEAF_HEADER_SIZE: usize = COMMON_HEADER_SIZE + 1 + 1 + 8 + 8 + 4; // flags | siblings | count

pub const SLOT_SIZE: usize = 2;
pub const FREE_SIZE_FIELD: usize = 2;

pub const INTERNAL_CELL_SIZE: usize = 4 + 8; // key | child
pub const LEAF_CELL_HEADER_SIZE: usize = 4 + 1 + 4; // key | deleted | value_size
pub const MAX_LEAF_CELL_SIZE: usize = LEAF_CELL_HEADER_SIZE + MAX_VALUE_SIZE;

pub const MAX_INTERNAL_CELLS: usize =
    (PAGE_SIZE - INTERNAL_HEADER_SIZE - FREE_SIZE_FIELD) / (SLOT_SIZE + INTERNAL_CELL_SIZE);
pub const MAX_LEAF_CELLS: usize =
    (PAGE_SIZE - LEAF_HEADER_SIZE - FREE_SIZE_FIELD) / (SLOT_SIZE + MAX_LEAF_CELL_SIZE);
