use serde::{Deserialize, Serialize};

use crate::{
    storage::{
        bplus_tree::{BPlusTree, CellHandle, ScanControl},
        storage_manager::Pager,
        wal::WalEntry,
    },
    types::{
        Lsn, PageOffset, RowId,
        error::{DatabaseError, Result},
        row::{Tuple, decode_tuple, encode_tuple},
        value::{DataType, Value},
    },
};

/// Catalog mapping table names to root page offsets.
pub const SYS_PAGES: &str = "sys_pages";
/// Catalog describing the columns of every table.
pub const SYS_SCHEMA: &str = "sys_schema";

pub const CATALOG_NAME_LENGTH: i32 = 255;
pub const INT_LENGTH: i32 = 4;
pub const BOOL_LENGTH: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    /// Declared width; the maximum byte length for varchar columns.
    pub length: i32,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DataType, length: i32) -> Self {
        Self {
            name: name.into(),
            data_type,
            length,
        }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Int, INT_LENGTH)
    }

    pub fn varchar(name: impl Into<String>, length: i32) -> Self {
        Self::new(name, DataType::Varchar, length)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Bool, BOOL_LENGTH)
    }

    /// The sys_schema row describing this column.
    pub fn to_schema_tuple(&self, table_name: &str) -> Tuple {
        Tuple::from([
            ("table_name".to_string(), Value::from(table_name)),
            ("field_name".to_string(), Value::from(self.name.as_str())),
            ("field_type".to_string(), Value::Int(self.data_type.as_i32())),
            ("field_length".to_string(), Value::Int(self.length)),
        ])
    }

    /// Inverse of `to_schema_tuple`; returns the owning table name too.
    pub fn from_schema_tuple(tuple: &Tuple) -> Result<(String, Self)> {
        let table_name = required_str(tuple, "table_name")?;
        let name = required_str(tuple, "field_name")?;
        let data_type = DataType::from_i32(required_int(tuple, "field_type")?)?;
        let length = required_int(tuple, "field_length")?;
        Ok((table_name.to_string(), Self::new(name, data_type, length)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub root: PageOffset,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>, root: PageOffset, columns: Vec<ColumnSchema>) -> Self {
        Self {
            table_name: table_name.into(),
            root,
            columns,
        }
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }
}

pub fn sys_pages_schema() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::varchar("table_name", CATALOG_NAME_LENGTH),
        ColumnSchema::int("file_offset"),
    ]
}

pub fn sys_schema_schema() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::varchar("table_name", CATALOG_NAME_LENGTH),
        ColumnSchema::varchar("field_name", CATALOG_NAME_LENGTH),
        ColumnSchema::int("field_type"),
        ColumnSchema::int("field_length"),
    ]
}

/// The sys_pages row for one table.
pub fn page_table_tuple(table_name: &str, root: PageOffset) -> Result<Tuple> {
    let offset = i32::try_from(root).map_err(|_| DatabaseError::InvalidData {
        details: format!("root offset {} of '{}' does not fit sys_pages", root, table_name),
    })?;
    Ok(Tuple::from([
        ("table_name".to_string(), Value::from(table_name)),
        ("file_offset".to_string(), Value::Int(offset)),
    ]))
}

/// A table's sys_pages row and where it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub row_id: RowId,
    pub handle: CellHandle,
    pub root: PageOffset,
}

fn page_table(pager: &Pager) -> BPlusTree {
    BPlusTree::new(pager.page_table_root())
}

/// Looks `table_name` up in sys_pages.
pub fn find_table(pager: &Pager, table_name: &str) -> Result<Option<CatalogEntry>> {
    let schema = sys_pages_schema();
    let mut found = None;
    page_table(pager).scan_right(pager, |handle, cell| {
        let tuple = decode_tuple(&schema, &cell.value)?;
        if required_str(&tuple, "table_name")? != table_name {
            return Ok(ScanControl::Continue);
        }
        let offset = required_int(&tuple, "file_offset")?;
        let root = PageOffset::try_from(offset)
            .map_err(|_| DatabaseError::decode(format!("negative root offset for '{}'", table_name)))?;
        found = Some(CatalogEntry {
            row_id: cell.key,
            handle,
            root,
        });
        Ok(ScanControl::Stop)
    })?;
    Ok(found)
}

pub fn table_names(pager: &Pager) -> Result<Vec<String>> {
    let schema = sys_pages_schema();
    let mut names = Vec::new();
    page_table(pager).scan_right(pager, |_, cell| {
        let tuple = decode_tuple(&schema, &cell.value)?;
        names.push(required_str(&tuple, "table_name")?.to_string());
        Ok(ScanControl::Continue)
    })?;
    Ok(names)
}

/// Columns of `table_name` in declaration order (sys_schema key order).
pub fn load_columns(pager: &Pager, table_name: &str) -> Result<Vec<ColumnSchema>> {
    let Some(entry) = find_table(pager, SYS_SCHEMA)? else {
        return Err(DatabaseError::TableNotExist {
            name: SYS_SCHEMA.to_string(),
        });
    };
    let schema = sys_schema_schema();
    let mut columns = Vec::new();
    BPlusTree::new(entry.root).scan_right(pager, |_, cell| {
        let tuple = decode_tuple(&schema, &cell.value)?;
        let (owner, column) = ColumnSchema::from_schema_tuple(&tuple)?;
        if owner == table_name {
            columns.push(column);
        }
        Ok(ScanControl::Continue)
    })?;
    Ok(columns)
}

pub fn load_table(pager: &Pager, table_name: &str) -> Result<TableSchema> {
    let Some(entry) = find_table(pager, table_name)? else {
        return Err(DatabaseError::TableNotExist {
            name: table_name.to_string(),
        });
    };
    let columns = load_columns(pager, table_name)?;
    Ok(TableSchema::new(table_name, entry.root, columns))
}

/// Inserts a row into one of the two catalogs and keeps sys_pages (and the
/// superblock) pointing at the catalog's current root.
pub fn insert_catalog_row(pager: &mut Pager, catalog: &str, tuple: &Tuple) -> Result<(RowId, Lsn)> {
    let (root, schema) = match catalog {
        SYS_PAGES => (pager.page_table_root(), sys_pages_schema()),
        SYS_SCHEMA => {
            let entry = find_table(pager, SYS_SCHEMA)?.ok_or_else(|| DatabaseError::TableNotExist {
                name: SYS_SCHEMA.to_string(),
            })?;
            (entry.root, sys_schema_schema())
        }
        _ => {
            return Err(DatabaseError::TableNotExist {
                name: catalog.to_string(),
            });
        }
    };

    let bytes = encode_tuple(&schema, tuple)?;
    pager.atomic(|pager| {
        let mut tree = BPlusTree::new(root);
        let (row_id, lsn) = tree.insert(pager, &bytes)?;

        if tree.root() != root {
            if catalog == SYS_PAGES {
                pager.set_page_table_root(tree.root());
            }
            set_root(pager, catalog, tree.root())?;
        }
        Ok((row_id, lsn))
    })
}

/// Rewrites the sys_pages row of `table_name` to point at `root`. The row is
/// updated in place under a fresh LSN; the returned entry logs the change.
pub fn set_root(pager: &mut Pager, table_name: &str, root: PageOffset) -> Result<WalEntry> {
    let entry = find_table(pager, table_name)?.ok_or_else(|| DatabaseError::TableNotExist {
        name: table_name.to_string(),
    })?;
    let bytes = encode_tuple(&sys_pages_schema(), &page_table_tuple(table_name, root)?)?;
    pager
        .page_mut(entry.handle.page)?
        .update_cell(entry.row_id, &bytes)?;
    let lsn = pager.stamp(&[entry.handle.page])?;
    tracing::debug!(table = table_name, old_root = entry.root, new_root = root, "table root moved");
    Ok(WalEntry::update(lsn, entry.handle.page, entry.row_id, bytes))
}

fn required_str<'a>(tuple: &'a Tuple, field: &str) -> Result<&'a str> {
    tuple
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| DatabaseError::decode(format!("catalog field '{}' missing", field)))
}

fn required_int(tuple: &Tuple, field: &str) -> Result<i32> {
    tuple
        .get(field)
        .and_then(Value::as_int)
        .ok_or_else(|| DatabaseError::decode(format!("catalog field '{}' missing", field)))
}
