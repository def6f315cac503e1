use crate::{
    relation::Relation,
    storage::{
        bplus_tree::BPlusTree,
        schema,
        wal::{WalBatch, WalEntry},
    },
    types::{
        RowId,
        error::{DatabaseError, Result},
    },
};

impl Relation {
    /// Tombstones row `row_id`. The cell keeps its key and bytes; scans and
    /// lookups skip it from now on.
    pub fn mark_deleted(&self, table: &str, row_id: RowId) -> Result<WalBatch> {
        let mut pager = self.store.write();
        let schema = schema::load_table(&pager, table)?;
        let (handle, _) = BPlusTree::new(schema.root)
            .find_cell(&pager, row_id)?
            .ok_or(DatabaseError::KeyNotFound { key: row_id })?;

        let lsn = pager.atomic(|pager| {
            pager.page_mut(handle.page)?.mark_deleted(row_id)?;
            pager.stamp(&[handle.page])
        })?;
        Ok(vec![WalEntry::delete(lsn, handle.page, row_id)])
    }
}
