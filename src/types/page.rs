use crate::{
    types::{
        COMMON_HEADER_SIZE, FREE_SIZE_FIELD, INTERNAL_CELL_SIZE, INTERNAL_HEADER_SIZE,
        LEAF_CELL_HEADER_SIZE, LEAF_HEADER_SIZE, Lsn, MAX_INTERNAL_CELLS, MAX_LEAF_CELLS,
        MAX_VALUE_SIZE, PAGE_SIZE, PageOffset, RowId, SLOT_SIZE,
        error::{DatabaseError, Result},
    },
    utils::bytes::ByteReader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Internal = 0,
    Leaf = 1,
}

impl PageType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PageType::Internal),
            1 => Ok(PageType::Leaf),
            _ => Err(DatabaseError::decode(format!("unknown page type tag {}", value))),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            PageType::Internal => 0,
            PageType::Leaf => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalCell {
    pub key: RowId,
    pub child: PageOffset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCell {
    pub key: RowId,
    pub deleted: bool,
    pub value: Vec<u8>,
}

impl LeafCell {
    pub fn encoded_size(&self) -> usize {
        LEAF_CELL_HEADER_SIZE + self.value.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageKind {
    Internal {
        right_child: PageOffset,
        cells: Vec<InternalCell>,
    },
    Leaf {
        left_sibling: Option<PageOffset>,
        right_sibling: Option<PageOffset>,
        cells: Vec<LeafCell>,
    },
}

/*
 * Page Layout on Disk (4096 bytes, little-endian)
 * ┌─────────────────────────────────────────────────────────────────┐
 * │ HEADER                                                          │
 * │  type(1) | offset(8) | last_lsn(8) |                            │
 * │  internal: right_child(8) | count(4)                            │
 * │  leaf:     has_left(1) | has_right(1) | left(8) | right(8) |    │
 * │            count(4)                                             │
 * ├─────────────────────────────────────────────────────────────────┤
 * │ OFFSET ARRAY: count x slot(2), in key order                     │
 * ├─────────────────────────────────────────────────────────────────┤
 * │ free_size(2) | free_size zero bytes                             │
 * ├─────────────────────────────────────────────────────────────────┤
 * │ CELLS, in slot order                                            │
 * │  internal: key(4) | child(8)                                    │
 * │  leaf:     key(4) | deleted(1) | value_size(4) | value          │
 * └─────────────────────────────────────────────────────────────────┘
 */

/// In-memory B+-tree node. `slots[i]` indexes into the unordered cell array;
/// walking `slots` in order yields cells in ascending key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub offset: PageOffset,
    pub last_lsn: Lsn,
    pub is_dirty: bool,
    pub slots: Vec<u16>,
    pub kind: PageKind,
}

impl Page {
    pub fn new_leaf() -> Self {
        Self {
            offset: 0,
            last_lsn: 0,
            is_dirty: false,
            slots: Vec::new(),
            kind: PageKind::Leaf {
                left_sibling: None,
                right_sibling: None,
                cells: Vec::new(),
            },
        }
    }

    pub fn new_internal(right_child: PageOffset) -> Self {
        Self {
            offset: 0,
            last_lsn: 0,
            is_dirty: false,
            slots: Vec::new(),
            kind: PageKind::Internal {
                right_child,
                cells: Vec::new(),
            },
        }
    }

    pub fn page_type(&self) -> PageType {
        match self.kind {
            PageKind::Internal { .. } => PageType::Internal,
            PageKind::Leaf { .. } => PageType::Leaf,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, PageKind::Leaf { .. })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn max_cells(&self) -> usize {
        match self.kind {
            PageKind::Internal { .. } => MAX_INTERNAL_CELLS,
            PageKind::Leaf { .. } => MAX_LEAF_CELLS,
        }
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.max_cells()
    }

    pub fn mark_dirty(&mut self, lsn: Lsn) {
        self.last_lsn = self.last_lsn.max(lsn);
        self.is_dirty = true;
    }

    /// Key of the cell at position `index` of the offset array.
    pub fn key_at(&self, index: usize) -> RowId {
        let slot = self.slots[index] as usize;
        match &self.kind {
            PageKind::Internal { cells, .. } => cells[slot].key,
            PageKind::Leaf { cells, .. } => cells[slot].key,
        }
    }

    /// Binary search over the offset array. Returns `(index, true)` on a hit,
    /// otherwise the insertion point. Deleted leaf cells still match.
    pub fn find_cell_offset_by_key(&self, key: RowId) -> (usize, bool) {
        let (mut low, mut high) = (0, self.slots.len());
        while low < high {
            let mid = low + (high - low) / 2;
            match self.key_at(mid).cmp(&key) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Equal => return (mid, true),
                std::cmp::Ordering::Greater => high = mid,
            }
        }
        (low, false)
    }

    pub fn insert_leaf_cell(&mut self, key: RowId, value: &[u8]) -> Result<()> {
        if value.len() > MAX_VALUE_SIZE {
            return Err(DatabaseError::RowTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        if self.is_full() {
            return Err(DatabaseError::PageFull {
                offset: self.offset,
            });
        }
        let (index, found) = self.find_cell_offset_by_key(key);
        if found {
            return Err(DatabaseError::KeyAlreadyExists { key });
        }
        let PageKind::Leaf { cells, .. } = &mut self.kind else {
            return Err(DatabaseError::decode("leaf insert on an internal page"));
        };
        let slot = cells.len() as u16;
        cells.push(LeafCell {
            key,
            deleted: false,
            value: value.to_vec(),
        });
        self.slots.insert(index, slot);
        Ok(())
    }

    pub fn insert_internal_cell(&mut self, key: RowId, child: PageOffset) -> Result<()> {
        if self.is_full() {
            return Err(DatabaseError::PageFull {
                offset: self.offset,
            });
        }
        let (index, found) = self.find_cell_offset_by_key(key);
        if found {
            return Err(DatabaseError::KeyAlreadyExists { key });
        }
        let PageKind::Internal { cells, .. } = &mut self.kind else {
            return Err(DatabaseError::decode("internal insert on a leaf page"));
        };
        let slot = cells.len() as u16;
        cells.push(InternalCell { key, child });
        self.slots.insert(index, slot);
        Ok(())
    }

    /// Records a child split: keys below `separator` stay in `left`, the
    /// pointer that used to cover `left` now covers `right`.
    pub fn insert_separator(
        &mut self,
        separator: RowId,
        left: PageOffset,
        right: PageOffset,
    ) -> Result<()> {
        if self.is_full() {
            return Err(DatabaseError::PageFull {
                offset: self.offset,
            });
        }
        let (index, found) = self.find_cell_offset_by_key(separator);
        if found {
            return Err(DatabaseError::KeyAlreadyExists { key: separator });
        }
        let covering = self.slots.get(index).copied();
        let PageKind::Internal { right_child, cells } = &mut self.kind else {
            return Err(DatabaseError::decode("separator insert on a leaf page"));
        };
        let pointer = match covering {
            Some(slot) => &mut cells[slot as usize].child,
            None => right_child,
        };
        if *pointer != left {
            return Err(DatabaseError::decode(format!(
                "page {} does not route key {} to child {}",
                self.offset, separator, left
            )));
        }
        *pointer = right;
        self.insert_internal_cell(separator, left)
    }

    pub fn update_cell(&mut self, key: RowId, value: &[u8]) -> Result<()> {
        if value.len() > MAX_VALUE_SIZE {
            return Err(DatabaseError::RowTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        let cell = self.leaf_cell_mut(key)?;
        cell.value = value.to_vec();
        Ok(())
    }

    pub fn mark_deleted(&mut self, key: RowId) -> Result<()> {
        self.leaf_cell_mut(key)?.deleted = true;
        Ok(())
    }

    fn leaf_cell_mut(&mut self, key: RowId) -> Result<&mut LeafCell> {
        let (index, found) = self.find_cell_offset_by_key(key);
        if !found {
            return Err(DatabaseError::KeyNotFound { key });
        }
        let slot = self.slots[index] as usize;
        match &mut self.kind {
            PageKind::Leaf { cells, .. } => Ok(&mut cells[slot]),
            PageKind::Internal { .. } => Err(DatabaseError::decode("cell update on an internal page")),
        }
    }

    /// Leaf cell at position `index` of the offset array, with its slot.
    pub fn leaf_cell_at(&self, index: usize) -> Option<(u16, &LeafCell)> {
        let slot = *self.slots.get(index)?;
        match &self.kind {
            PageKind::Leaf { cells, .. } => cells.get(slot as usize).map(|cell| (slot, cell)),
            PageKind::Internal { .. } => None,
        }
    }

    pub fn leaf_cell_by_slot(&self, slot: u16) -> Option<&LeafCell> {
        match &self.kind {
            PageKind::Leaf { cells, .. } => cells.get(slot as usize),
            PageKind::Internal { .. } => None,
        }
    }

    /// Child covering `key`: the child of the smallest separator strictly
    /// greater than `key`, or the right child when none is.
    pub fn child_for(&self, key: RowId) -> Option<PageOffset> {
        let PageKind::Internal { right_child, cells } = &self.kind else {
            return None;
        };
        let (index, found) = self.find_cell_offset_by_key(key);
        let index = if found { index + 1 } else { index };
        match self.slots.get(index) {
            Some(&slot) => Some(cells[slot as usize].child),
            None => Some(*right_child),
        }
    }

    pub fn leftmost_child(&self) -> Option<PageOffset> {
        let PageKind::Internal { right_child, cells } = &self.kind else {
            return None;
        };
        match self.slots.first() {
            Some(&slot) => Some(cells[slot as usize].child),
            None => Some(*right_child),
        }
    }

    pub fn right_child(&self) -> Option<PageOffset> {
        match self.kind {
            PageKind::Internal { right_child, .. } => Some(right_child),
            PageKind::Leaf { .. } => None,
        }
    }

    pub fn left_sibling(&self) -> Option<PageOffset> {
        match self.kind {
            PageKind::Leaf { left_sibling, .. } => left_sibling,
            PageKind::Internal { .. } => None,
        }
    }

    pub fn right_sibling(&self) -> Option<PageOffset> {
        match self.kind {
            PageKind::Leaf { right_sibling, .. } => right_sibling,
            PageKind::Internal { .. } => None,
        }
    }

    pub fn set_left_sibling(&mut self, sibling: Option<PageOffset>) {
        if let PageKind::Leaf { left_sibling, .. } = &mut self.kind {
            *left_sibling = sibling;
        }
    }

    pub fn set_right_sibling(&mut self, sibling: Option<PageOffset>) {
        if let PageKind::Leaf { right_sibling, .. } = &mut self.kind {
            *right_sibling = sibling;
        }
    }

    /// Splits a node around `mid = len / 2` and returns the separator key
    /// with the fresh right-hand node (offset unassigned).
    ///
    /// Leaf: cells from `mid` on move right; the separator is the first key
    /// of the new leaf, which inherits this leaf's right sibling.
    /// Internal: cells after `mid` move right; the cell at `mid` is promoted,
    /// its child becomes this node's right child and the new node takes the
    /// old right child.
    pub fn split(&mut self) -> Result<(RowId, Page)> {
        if self.slots.len() < 2 {
            return Err(DatabaseError::InvalidData {
                details: format!("cannot split page {} with {} cells", self.offset, self.len()),
            });
        }
        let mid = self.slots.len() / 2;
        let slots = std::mem::take(&mut self.slots);
        match &mut self.kind {
            PageKind::Leaf {
                right_sibling,
                cells,
                ..
            } => {
                let mut ordered = in_slot_order(&slots, std::mem::take(cells));
                let moved = ordered.split_off(mid);
                let separator = moved[0].key;
                *cells = ordered;
                self.slots = (0..mid as u16).collect();

                let mut sibling = Page::new_leaf();
                sibling.last_lsn = self.last_lsn;
                sibling.slots = (0..moved.len() as u16).collect();
                sibling.kind = PageKind::Leaf {
                    left_sibling: Some(self.offset),
                    right_sibling: *right_sibling,
                    cells: moved,
                };
                Ok((separator, sibling))
            }
            PageKind::Internal { right_child, cells } => {
                let mut ordered = in_slot_order(&slots, std::mem::take(cells));
                let moved = ordered.split_off(mid + 1);
                let promoted = ordered
                    .pop()
                    .ok_or_else(|| DatabaseError::decode("internal split lost its separator"))?;
                *cells = ordered;
                self.slots = (0..mid as u16).collect();

                let mut sibling = Page::new_internal(*right_child);
                sibling.last_lsn = self.last_lsn;
                sibling.slots = (0..moved.len() as u16).collect();
                if let PageKind::Internal { cells, .. } = &mut sibling.kind {
                    *cells = moved;
                }
                *right_child = promoted.child;
                Ok((promoted.key, sibling))
            }
        }
    }

    fn cells_size(&self) -> usize {
        match &self.kind {
            PageKind::Internal { cells, .. } => cells.len() * INTERNAL_CELL_SIZE,
            PageKind::Leaf { cells, .. } => cells.iter().map(LeafCell::encoded_size).sum(),
        }
    }

    fn header_size(&self) -> usize {
        match self.kind {
            PageKind::Internal { .. } => INTERNAL_HEADER_SIZE,
            PageKind::Leaf { .. } => LEAF_HEADER_SIZE,
        }
    }

    /// Serialize the page to exactly PAGE_SIZE bytes following the documented layout
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let used = self.header_size()
            + self.slots.len() * SLOT_SIZE
            + FREE_SIZE_FIELD
            + self.cells_size();
        if used > PAGE_SIZE {
            return Err(DatabaseError::PageFull {
                offset: self.offset,
            });
        }
        let free_size = PAGE_SIZE - used;

        let mut buffer = Vec::with_capacity(PAGE_SIZE);
        buffer.push(self.page_type().as_u8());
        buffer.extend_from_slice(&self.offset.to_le_bytes());
        buffer.extend_from_slice(&self.last_lsn.to_le_bytes());
        match &self.kind {
            PageKind::Internal { right_child, .. } => {
                buffer.extend_from_slice(&right_child.to_le_bytes());
            }
            PageKind::Leaf {
                left_sibling,
                right_sibling,
                ..
            } => {
                buffer.push(left_sibling.is_some() as u8);
                buffer.push(right_sibling.is_some() as u8);
                buffer.extend_from_slice(&left_sibling.unwrap_or(0).to_le_bytes());
                buffer.extend_from_slice(&right_sibling.unwrap_or(0).to_le_bytes());
            }
        }
        buffer.extend_from_slice(&(self.slots.len() as u32).to_le_bytes());

        for slot in &self.slots {
            buffer.extend_from_slice(&slot.to_le_bytes());
        }

        buffer.extend_from_slice(&(free_size as u16).to_le_bytes());
        buffer.resize(buffer.len() + free_size, 0);

        match &self.kind {
            PageKind::Internal { cells, .. } => {
                for cell in cells {
                    buffer.extend_from_slice(&cell.key.to_le_bytes());
                    buffer.extend_from_slice(&cell.child.to_le_bytes());
                }
            }
            PageKind::Leaf { cells, .. } => {
                for cell in cells {
                    buffer.extend_from_slice(&cell.key.to_le_bytes());
                    buffer.push(cell.deleted as u8);
                    buffer.extend_from_slice(&(cell.value.len() as u32).to_le_bytes());
                    buffer.extend_from_slice(&cell.value);
                }
            }
        }

        debug_assert_eq!(buffer.len(), PAGE_SIZE);
        Ok(buffer)
    }

    /// Deserialize a page, inferring the variant from the leading tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let tag = bytes
            .first()
            .ok_or_else(|| DatabaseError::decode("empty page buffer"))?;
        Self::decode_as(bytes, PageType::from_u8(*tag)?)
    }

    /// Deserialize a page that must be of variant `expected`.
    pub fn decode_as(bytes: &[u8], expected: PageType) -> Result<Self> {
        if bytes.len() != PAGE_SIZE {
            return Err(DatabaseError::decode(format!(
                "page buffer is {} bytes, expected {}",
                bytes.len(),
                PAGE_SIZE
            )));
        }
        let mut reader = ByteReader::new(bytes);
        let page_type = PageType::from_u8(reader.read_u8()?)?;
        if page_type != expected {
            return Err(DatabaseError::decode(format!(
                "expected {:?} page, found {:?}",
                expected, page_type
            )));
        }
        let offset = reader.read_u64()?;
        let last_lsn = reader.read_u64()?;
        debug_assert_eq!(reader.position(), COMMON_HEADER_SIZE);

        let mut kind = match page_type {
            PageType::Internal => PageKind::Internal {
                right_child: reader.read_u64()?,
                cells: Vec::new(),
            },
            PageType::Leaf => {
                let has_left = reader.read_u8()? != 0;
                let has_right = reader.read_u8()? != 0;
                let left = reader.read_u64()?;
                let right = reader.read_u64()?;
                PageKind::Leaf {
                    left_sibling: has_left.then_some(left),
                    right_sibling: has_right.then_some(right),
                    cells: Vec::new(),
                }
            }
        };
        let count = reader.read_u32()? as usize;

        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            let slot = reader.read_u16()?;
            if slot as usize >= count {
                return Err(DatabaseError::decode(format!(
                    "page {} slot {} out of range ({} cells)",
                    offset, slot, count
                )));
            }
            slots.push(slot);
        }

        let free_size = reader.read_u16()? as usize;
        reader.skip(free_size)?;

        match &mut kind {
            PageKind::Internal { cells, .. } => {
                for _ in 0..count {
                    let key = reader.read_u32()?;
                    let child = reader.read_u64()?;
                    cells.push(InternalCell { key, child });
                }
            }
            PageKind::Leaf { cells, .. } => {
                for _ in 0..count {
                    let key = reader.read_u32()?;
                    let deleted = reader.read_u8()? != 0;
                    let size = reader.read_u32()? as usize;
                    if size > MAX_VALUE_SIZE {
                        return Err(DatabaseError::decode(format!(
                            "page {} cell {} claims {} value bytes",
                            offset, key, size
                        )));
                    }
                    let value = reader.take(size)?.to_vec();
                    cells.push(LeafCell {
                        key,
                        deleted,
                        value,
                    });
                }
            }
        }

        Ok(Page {
            offset,
            last_lsn,
            is_dirty: false,
            slots,
            kind,
        })
    }
}

fn in_slot_order<T>(slots: &[u16], cells: Vec<T>) -> Vec<T> {
    let mut cells: Vec<Option<T>> = cells.into_iter().map(Some).collect();
    slots
        .iter()
        .filter_map(|&slot| cells.get_mut(slot as usize).and_then(Option::take))
        .collect()
}
