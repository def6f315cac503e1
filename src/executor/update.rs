use crate::{
    executor::insert::bind_values,
    relation::Relation,
    storage::{
        bplus_tree::BPlusTree,
        schema,
        wal::{WalBatch, WalEntry},
    },
    types::{
        RowId,
        error::{DatabaseError, Result},
        row::{decode_tuple, encode_tuple},
        value::Value,
    },
};

impl Relation {
    /// Overwrites the named columns of row `row_id` in place; the other
    /// columns keep their values.
    pub fn update(&self, table: &str, row_id: RowId, cols: &[&str], vals: &[Value]) -> Result<WalBatch> {
        let mut pager = self.store.write();
        let schema = schema::load_table(&pager, table)?;
        let changes = bind_values(&schema, cols, vals)?;

        let (handle, cell) = BPlusTree::new(schema.root)
            .find_cell(&pager, row_id)?
            .ok_or(DatabaseError::KeyNotFound { key: row_id })?;

        let mut tuple = decode_tuple(&schema.columns, &cell.value)?;
        tuple.extend(changes);
        let bytes = encode_tuple(&schema.columns, &tuple)?;

        let lsn = pager.atomic(|pager| {
            pager.page_mut(handle.page)?.update_cell(row_id, &bytes)?;
            pager.stamp(&[handle.page])
        })?;
        Ok(vec![WalEntry::update(lsn, handle.page, row_id, bytes)])
    }
}
