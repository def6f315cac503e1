use crate::{
    storage::storage_manager::Pager,
    types::{
        Lsn, MAX_VALUE_SIZE, PageOffset, RowId,
        error::{DatabaseError, Result},
        page::{LeafCell, Page},
    },
};

/// Location of a leaf cell: the containing page and the cell's slot. Only
/// meaningful while the caller holds the store lock it was obtained under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellHandle {
    pub page: PageOffset,
    pub slot: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Stop,
}

/// B+-tree over u32 keys identified by its root page offset. Pages are owned
/// by the pager; the tree only keeps offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BPlusTree {
    root: PageOffset,
}

impl BPlusTree {
    pub fn new(root: PageOffset) -> Self {
        Self { root }
    }

    pub fn root(&self) -> PageOffset {
        self.root
    }

    /// Allocates the next key from the store and inserts `value` under it.
    /// A failed insert does not consume the key.
    pub fn insert(&mut self, pager: &mut Pager, value: &[u8]) -> Result<(RowId, Lsn)> {
        if value.len() > MAX_VALUE_SIZE {
            return Err(DatabaseError::RowTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        let root = self.root;
        let result = pager.atomic(|pager| {
            let key = pager.next_key();
            let lsn = self.insert_key(pager, key, value)?;
            Ok((key, lsn))
        });
        if result.is_err() {
            self.root = root;
        }
        result
    }

    /// Inserts under an explicit key. Every page the insert touches is
    /// stamped with one fresh LSN, which is returned. On error the store is
    /// left as it was, splits included.
    pub fn insert_key(&mut self, pager: &mut Pager, key: RowId, value: &[u8]) -> Result<Lsn> {
        let root = self.root;
        let result = pager.atomic(|pager| {
            let mut touched = Vec::new();
            self.insert_recursive(pager, self.root, None, key, value, &mut touched)?;
            touched.sort_unstable();
            touched.dedup();
            pager.stamp(&touched)
        });
        if result.is_err() {
            self.root = root;
        }
        result
    }

    fn insert_recursive(
        &mut self,
        pager: &mut Pager,
        offset: PageOffset,
        parent: Option<PageOffset>,
        key: RowId,
        value: &[u8],
        touched: &mut Vec<PageOffset>,
    ) -> Result<()> {
        let page = pager.page_mut(offset)?;
        match page.child_for(key) {
            None => {
                page.insert_leaf_cell(key, value)?;
                touched.push(offset);
            }
            Some(child) => {
                self.insert_recursive(pager, child, Some(offset), key, value, touched)?;
                if pager.page_mut(child)?.is_full() {
                    self.split_child(pager, offset, child, touched)?;
                }
            }
        }

        if parent.is_none() && pager.page_mut(offset)?.is_full() {
            let new_root = pager.append(Page::new_internal(offset))?;
            self.split_child(pager, new_root, offset, touched)?;
            tracing::debug!(old_root = offset, new_root, "root split");
            self.root = new_root;
        }
        Ok(())
    }

    fn split_child(
        &mut self,
        pager: &mut Pager,
        parent: PageOffset,
        child: PageOffset,
        touched: &mut Vec<PageOffset>,
    ) -> Result<()> {
        let (separator, sibling) = pager.page_mut(child)?.split()?;
        let is_leaf = sibling.is_leaf();
        let old_right = sibling.right_sibling();
        let sibling_offset = pager.append(sibling)?;

        if is_leaf {
            pager.page_mut(child)?.set_right_sibling(Some(sibling_offset));
            if let Some(right) = old_right {
                pager.page_mut(right)?.set_left_sibling(Some(sibling_offset));
                touched.push(right);
            }
        }

        pager
            .page_mut(parent)?
            .insert_separator(separator, child, sibling_offset)?;
        touched.extend([child, sibling_offset, parent]);
        Ok(())
    }

    /// Point lookup. Tombstoned cells are reported as absent.
    pub fn find_cell(&self, pager: &Pager, key: RowId) -> Result<Option<(CellHandle, LeafCell)>> {
        let mut offset = self.root;
        loop {
            let page = pager.page(offset)?;
            match page.child_for(key) {
                Some(child) => offset = child,
                None => {
                    let (index, found) = page.find_cell_offset_by_key(key);
                    if !found {
                        return Ok(None);
                    }
                    return Ok(page
                        .leaf_cell_at(index)
                        .filter(|(_, cell)| !cell.deleted)
                        .map(|(slot, cell)| (CellHandle { page: offset, slot }, cell.clone())));
                }
            }
        }
    }

    pub fn leftmost_leaf(&self, pager: &Pager) -> Result<PageOffset> {
        let mut offset = self.root;
        loop {
            match pager.page(offset)?.leftmost_child() {
                Some(child) => offset = child,
                None => return Ok(offset),
            }
        }
    }

    pub fn rightmost_leaf(&self, pager: &Pager) -> Result<PageOffset> {
        let mut offset = self.root;
        loop {
            match pager.page(offset)?.right_child() {
                Some(child) => offset = child,
                None => return Ok(offset),
            }
        }
    }

    /// Visits live cells in ascending key order until `f` returns Stop.
    pub fn scan_right<F>(&self, pager: &Pager, mut f: F) -> Result<()>
    where
        F: FnMut(CellHandle, &LeafCell) -> Result<ScanControl>,
    {
        let mut next = Some(self.leftmost_leaf(pager)?);
        while let Some(offset) = next {
            let page = pager.page(offset)?;
            for index in 0..page.len() {
                let Some((slot, cell)) = page.leaf_cell_at(index) else {
                    continue;
                };
                if cell.deleted {
                    continue;
                }
                if f(CellHandle { page: offset, slot }, cell)? == ScanControl::Stop {
                    return Ok(());
                }
            }
            next = page.right_sibling();
        }
        Ok(())
    }

    /// Visits live cells in descending key order until `f` returns Stop.
    pub fn scan_left<F>(&self, pager: &Pager, mut f: F) -> Result<()>
    where
        F: FnMut(CellHandle, &LeafCell) -> Result<ScanControl>,
    {
        let mut next = Some(self.rightmost_leaf(pager)?);
        while let Some(offset) = next {
            let page = pager.page(offset)?;
            for index in (0..page.len()).rev() {
                let Some((slot, cell)) = page.leaf_cell_at(index) else {
                    continue;
                };
                if cell.deleted {
                    continue;
                }
                if f(CellHandle { page: offset, slot }, cell)? == ScanControl::Stop {
                    return Ok(());
                }
            }
            next = page.left_sibling();
        }
        Ok(())
    }
}
