use std::collections::VecDeque;

use crate::{
    relation::Relation,
    storage::{
        bplus_tree::{BPlusTree, CellHandle, ScanControl},
        schema::{self, ColumnSchema},
        storage_manager::StorageManager,
    },
    types::{
        PageOffset, RowId,
        error::Result,
        page::LeafCell,
        row::Row,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Backward,
}

pub trait Scanner {
    fn scan(&mut self) -> Result<Option<Row>>;
    fn scan_batch(&mut self, batch_size: usize) -> Result<Vec<Row>>;
    fn reset(&mut self) -> Result<()>;
}

pub struct ScanIterator<S: Scanner> {
    scanner: S,
}

impl<S: Scanner> ScanIterator<S> {
    pub fn new(scanner: S) -> Self {
        Self { scanner }
    }
}

impl<S: Scanner> Iterator for ScanIterator<S> {
    type Item = Result<Row>;
    fn next(&mut self) -> Option<Self::Item> {
        self.scanner.scan().transpose()
    }
}

/// Leaf-at-a-time scan of one table. The store's shared lock is held only
/// while a leaf is decoded, so writers may interleave between leaves.
pub struct SequentialScanner<'a> {
    store: &'a StorageManager,
    tree: BPlusTree,
    columns: Vec<ColumnSchema>,
    direction: ScanDirection,
    buffered: VecDeque<Row>,
    next_leaf: Option<PageOffset>,
    started: bool,
}

impl<'a> SequentialScanner<'a> {
    pub fn new(relation: &'a Relation, table: &str, direction: ScanDirection) -> Result<Self> {
        let schema = relation.table_schema(table)?;
        Ok(Self {
            store: relation.storage(),
            tree: BPlusTree::new(schema.root),
            columns: schema.columns,
            direction,
            buffered: VecDeque::new(),
            next_leaf: None,
            started: false,
        })
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    fn load_next_leaf(&mut self) -> Result<bool> {
        let pager = self.store.read();
        if !self.started {
            self.started = true;
            self.next_leaf = Some(match self.direction {
                ScanDirection::Forward => self.tree.leftmost_leaf(&pager)?,
                ScanDirection::Backward => self.tree.rightmost_leaf(&pager)?,
            });
        }
        let Some(offset) = self.next_leaf else {
            return Ok(false);
        };

        let page = pager.page(offset)?;
        let mut indexes: Vec<usize> = (0..page.len()).collect();
        if self.direction == ScanDirection::Backward {
            indexes.reverse();
        }
        for index in indexes {
            if let Some((_, cell)) = page.leaf_cell_at(index) {
                if !cell.deleted {
                    self.buffered
                        .push_back(Row::decode(cell.key, &self.columns, &cell.value)?);
                }
            }
        }
        self.next_leaf = match self.direction {
            ScanDirection::Forward => page.right_sibling(),
            ScanDirection::Backward => page.left_sibling(),
        };
        Ok(true)
    }
}

impl Scanner for SequentialScanner<'_> {
    fn scan(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.buffered.pop_front() {
                return Ok(Some(row));
            }
            if !self.load_next_leaf()? {
                return Ok(None);
            }
        }
    }

    fn scan_batch(&mut self, batch_size: usize) -> Result<Vec<Row>> {
        let mut rows = Vec::with_capacity(batch_size);
        while rows.len() < batch_size {
            match self.scan()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    fn reset(&mut self) -> Result<()> {
        self.buffered.clear();
        self.next_leaf = None;
        self.started = false;
        Ok(())
    }
}

impl Relation {
    /// Every live row of `table` in ascending row id order, with the columns
    /// the values are laid out by.
    pub fn fetch(&self, table: &str) -> Result<(Vec<Row>, Vec<ColumnSchema>)> {
        self.fetch_in(table, false)
    }

    /// Like `fetch`, newest row first.
    pub fn fetch_reverse(&self, table: &str) -> Result<(Vec<Row>, Vec<ColumnSchema>)> {
        self.fetch_in(table, true)
    }

    fn fetch_in(&self, table: &str, reverse: bool) -> Result<(Vec<Row>, Vec<ColumnSchema>)> {
        let pager = self.store.read();
        let schema = schema::load_table(&pager, table)?;
        let tree = BPlusTree::new(schema.root);
        let mut rows = Vec::new();

        let mut visit = |_: CellHandle, cell: &LeafCell| -> Result<ScanControl> {
            rows.push(Row::decode(cell.key, &schema.columns, &cell.value)?);
            Ok(ScanControl::Continue)
        };
        if reverse {
            tree.scan_left(&pager, &mut visit)?;
        } else {
            tree.scan_right(&pager, &mut visit)?;
        }
        Ok((rows, schema.columns))
    }

    /// Point lookup by row id; deleted rows are absent.
    pub fn fetch_row(&self, table: &str, row_id: RowId) -> Result<Option<Row>> {
        let pager = self.store.read();
        let schema = schema::load_table(&pager, table)?;
        BPlusTree::new(schema.root)
            .find_cell(&pager, row_id)?
            .map(|(_, cell)| Row::decode(row_id, &schema.columns, &cell.value))
            .transpose()
    }
}
