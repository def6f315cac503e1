use std::collections::HashSet;

use crate::{
    relation::Relation,
    storage::schema::{self, ColumnSchema, SYS_PAGES, SYS_SCHEMA, page_table_tuple},
    types::{
        PageOffset,
        error::{DatabaseError, Result},
        page::Page,
        value::DataType,
    },
};

/// Builder for table definitions
pub struct TableSchemaBuilder {
    table_name: String,
    columns: Vec<ColumnSchema>,
}

impl TableSchemaBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
        }
    }

    pub fn add_column(mut self, name: impl Into<String>, data_type: DataType, length: i32) -> Self {
        self.columns.push(ColumnSchema::new(name, data_type, length));
        self
    }

    pub fn int(self, name: impl Into<String>) -> Self {
        let column = ColumnSchema::int(name);
        self.push(column)
    }

    pub fn varchar(self, name: impl Into<String>, length: i32) -> Self {
        let column = ColumnSchema::varchar(name, length);
        self.push(column)
    }

    pub fn bool(self, name: impl Into<String>) -> Self {
        let column = ColumnSchema::bool(name);
        self.push(column)
    }

    fn push(mut self, column: ColumnSchema) -> Self {
        self.columns.push(column);
        self
    }

    pub fn build(self) -> Result<(String, Vec<ColumnSchema>)> {
        validate_columns(&self.columns)?;
        Ok((self.table_name, self.columns))
    }
}

/// A table needs at least one column, unique names, and positive varchar widths.
fn validate_columns(columns: &[ColumnSchema]) -> Result<()> {
    if columns.is_empty() {
        return Err(DatabaseError::InvalidData {
            details: "Table must have at least one column".to_string(),
        });
    }

    let mut names = HashSet::new();
    for column in columns {
        if !names.insert(column.name.as_str()) {
            return Err(DatabaseError::InvalidData {
                details: format!("Duplicate column name: {}", column.name),
            });
        }
        if column.data_type == DataType::Varchar && column.length <= 0 {
            return Err(DatabaseError::InvalidData {
                details: format!("Column '{}' needs a positive varchar length", column.name),
            });
        }
    }
    Ok(())
}

impl Relation {
    /// Allocates a leaf root for `table_name` and registers it and its
    /// columns in the catalogs. Returns the new root offset.
    pub fn create_table(&self, table_name: &str, columns: Vec<ColumnSchema>) -> Result<PageOffset> {
        if table_name.is_empty() {
            return Err(DatabaseError::InvalidData {
                details: "Table name must not be empty".to_string(),
            });
        }
        validate_columns(&columns)?;

        let mut pager = self.store.write();
        if schema::find_table(&pager, table_name)?.is_some() {
            return Err(DatabaseError::TableAlreadyExist {
                name: table_name.to_string(),
            });
        }

        let root = pager.atomic(|pager| {
            let root = pager.append(Page::new_leaf())?;
            schema::insert_catalog_row(pager, SYS_PAGES, &page_table_tuple(table_name, root)?)?;
            for column in &columns {
                schema::insert_catalog_row(pager, SYS_SCHEMA, &column.to_schema_tuple(table_name))?;
            }
            Ok(root)
        })?;
        pager.flush_pages()?;

        tracing::info!(table = table_name, root, columns = columns.len(), "created table");
        Ok(root)
    }

    pub fn create_table_with_builder(&self, builder: TableSchemaBuilder) -> Result<PageOffset> {
        let (table_name, columns) = builder.build()?;
        self.create_table(&table_name, columns)
    }
}
