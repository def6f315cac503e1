use crate::{
    relation::Relation,
    storage::{
        bplus_tree::BPlusTree,
        schema::{self, TableSchema},
        wal::{WalBatch, WalEntry},
    },
    types::{
        RowId,
        error::{DatabaseError, Result},
        row::{Tuple, encode_tuple},
        value::Value,
    },
};

/// Pairs `cols` with `vals` into a tuple for `schema`. An empty `cols` means
/// every column in schema order.
pub(crate) fn bind_values(schema: &TableSchema, cols: &[&str], vals: &[Value]) -> Result<Tuple> {
    let names = if cols.is_empty() {
        schema.column_names()
    } else {
        cols.to_vec()
    };
    if names.len() != vals.len() {
        return Err(DatabaseError::ColCountMismatch {
            columns: names.len(),
            values: vals.len(),
        });
    }

    let mut tuple = Tuple::with_capacity(names.len());
    for (name, value) in names.into_iter().zip(vals) {
        if schema.get_column(name).is_none() {
            return Err(DatabaseError::FieldNotFound {
                name: name.to_string(),
                table: schema.table_name.clone(),
            });
        }
        if tuple.insert(name.to_string(), value.clone()).is_some() {
            return Err(DatabaseError::FieldAmbiguous {
                name: name.to_string(),
            });
        }
    }
    Ok(tuple)
}

impl Relation {
    /// Inserts one row under a freshly allocated row id. Columns left out of
    /// `cols` are stored as NULL. The returned batch holds the Insert entry
    /// and, when the table root moved, the sys_pages rewrite.
    pub fn insert(&self, table: &str, cols: &[&str], vals: &[Value]) -> Result<(RowId, WalBatch)> {
        let mut pager = self.store.write();
        let schema = schema::load_table(&pager, table)?;
        let tuple = bind_values(&schema, cols, vals)?;
        let bytes = encode_tuple(&schema.columns, &tuple)?;

        pager.atomic(|pager| {
            let mut tree = BPlusTree::new(schema.root);
            let (row_id, lsn) = tree.insert(pager, &bytes)?;

            let mut batch = vec![WalEntry::insert(lsn, schema.root, row_id, bytes)];
            if tree.root() != schema.root {
                batch.push(schema::set_root(pager, table, tree.root())?);
            }
            Ok((row_id, batch))
        })
    }
}
