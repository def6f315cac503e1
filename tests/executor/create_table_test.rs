use std::fs;

use pacul::{
    executor::create_table::TableSchemaBuilder,
    relation::{SYS_PAGES_ROOT, SYS_SCHEMA_ROOT},
    storage::schema::{ColumnSchema, SYS_PAGES, SYS_SCHEMA},
    types::{PAGE_SIZE, error::DatabaseError, value::{DataType, Value}},
    utils::mock::TempDatabase,
};

fn people_columns() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::int("person_id"),
        ColumnSchema::varchar("first_name", 255),
        ColumnSchema::varchar("last_name", 255),
    ]
}

#[test]
fn test_create_db_lays_out_catalogs() {
    let temp = TempDatabase::with_prefix("create_db").unwrap();
    let relation = temp.create().unwrap();

    assert_eq!(
        fs::metadata(temp.table_path()).unwrap().len(),
        3 * PAGE_SIZE as u64
    );
    assert!(temp.wal_path().exists());
    assert_eq!(relation.storage().read().page_table_root(), SYS_PAGES_ROOT);

    let (rows, columns) = relation.fetch(SYS_PAGES).unwrap();
    assert_eq!(columns.len(), 2);
    let pages: Vec<Vec<Value>> = rows.into_iter().map(|row| row.values).collect();
    assert_eq!(
        pages,
        vec![
            vec![Value::from("sys_pages"), Value::Int(4096)],
            vec![Value::from("sys_schema"), Value::Int(8192)],
        ]
    );
    assert_eq!(SYS_SCHEMA_ROOT, 8192);

    let (rows, _) = relation.fetch(SYS_SCHEMA).unwrap();
    let described: Vec<(String, String)> = rows
        .iter()
        .map(|row| (row.values[0].to_string(), row.values[1].to_string()))
        .collect();
    assert_eq!(
        described,
        vec![
            ("sys_pages".to_string(), "table_name".to_string()),
            ("sys_pages".to_string(), "file_offset".to_string()),
            ("sys_schema".to_string(), "table_name".to_string()),
            ("sys_schema".to_string(), "field_name".to_string()),
            ("sys_schema".to_string(), "field_type".to_string()),
            ("sys_schema".to_string(), "field_length".to_string()),
        ]
    );
    assert_eq!(rows[0].values[2], Value::Int(DataType::Varchar.as_i32()));
    assert_eq!(rows[0].values[3], Value::Int(255));
    assert_eq!(rows[1].values[2], Value::Int(DataType::Int.as_i32()));
}

#[test]
fn test_create_db_twice_fails() {
    let temp = TempDatabase::with_prefix("create_db_twice").unwrap();
    temp.create().unwrap().close().unwrap();

    match temp.create() {
        Err(DatabaseError::DbExists { name }) => assert_eq!(name, "testdb"),
        other => panic!("expected DbExists, got {:?}", other.err()),
    }
}

#[test]
fn test_open_missing_database() {
    let temp = TempDatabase::with_prefix("open_missing").unwrap();
    match temp.open() {
        Err(DatabaseError::DbNotExist { name }) => assert_eq!(name, "testdb"),
        other => panic!("expected DbNotExist, got {:?}", other.err()),
    }
}

#[test]
fn test_empty_database_name() {
    let mut temp = TempDatabase::with_prefix("no_name").unwrap();
    temp.name = String::new();
    assert!(matches!(temp.create(), Err(DatabaseError::DbNotSelected)));
    assert!(matches!(temp.open(), Err(DatabaseError::DbNotSelected)));
}

#[test]
fn test_create_table_registers_schema() {
    let temp = TempDatabase::with_prefix("create_table").unwrap();
    let relation = temp.create().unwrap();

    let root = relation.create_table("people", people_columns()).unwrap();
    assert_eq!(root, 3 * PAGE_SIZE as u64);

    assert_eq!(
        relation.table_names().unwrap(),
        vec!["sys_pages", "sys_schema", "people"]
    );
    let schema = relation.table_schema("people").unwrap();
    assert_eq!(schema.root, root);
    assert_eq!(schema.columns, people_columns());
    assert_eq!(schema.get_column_index("last_name"), Some(2));

    let (rows, columns) = relation.fetch("people").unwrap();
    assert!(rows.is_empty());
    assert_eq!(columns, people_columns());
}

#[test]
fn test_create_table_twice_fails() {
    let temp = TempDatabase::with_prefix("create_table_twice").unwrap();
    let relation = temp.create().unwrap();
    relation.create_table("people", people_columns()).unwrap();

    match relation.create_table("people", people_columns()) {
        Err(DatabaseError::TableAlreadyExist { name }) => assert_eq!(name, "people"),
        other => panic!("expected TableAlreadyExist, got {:?}", other),
    }
    assert!(matches!(
        relation.create_table(SYS_PAGES, people_columns()),
        Err(DatabaseError::TableAlreadyExist { .. })
    ));
}

#[test]
fn test_invalid_table_definitions() {
    let temp = TempDatabase::with_prefix("create_table_invalid").unwrap();
    let relation = temp.create().unwrap();

    assert!(matches!(
        relation.create_table("empty", vec![]),
        Err(DatabaseError::InvalidData { .. })
    ));
    assert!(matches!(
        relation.create_table(
            "dupes",
            vec![ColumnSchema::int("id"), ColumnSchema::int("id")]
        ),
        Err(DatabaseError::InvalidData { .. })
    ));
    assert!(matches!(
        relation.create_table("zero", vec![ColumnSchema::varchar("name", 0)]),
        Err(DatabaseError::InvalidData { .. })
    ));
    assert_eq!(relation.table_names().unwrap().len(), 2);
}

#[test]
fn test_create_table_with_builder() {
    let temp = TempDatabase::with_prefix("create_table_builder").unwrap();
    let relation = temp.create().unwrap();

    let builder = TableSchemaBuilder::new("tools")
        .int("tool_id")
        .varchar("name", 32)
        .bool("in_stock");
    relation.create_table_with_builder(builder).unwrap();

    let schema = relation.table_schema("tools").unwrap();
    assert_eq!(
        schema.column_names(),
        vec!["tool_id", "name", "in_stock"]
    );
    assert_eq!(schema.get_column("name").unwrap().length, 32);
}

#[test]
fn test_many_tables_split_the_catalogs() {
    let temp = TempDatabase::with_prefix("create_many_tables").unwrap();
    {
        let relation = temp.create().unwrap();
        for i in 0..40 {
            relation
                .create_table(&format!("table_{:02}", i), vec![ColumnSchema::int("id")])
                .unwrap();
        }
        let page_table_root = relation.storage().read().page_table_root();
        assert_ne!(page_table_root, SYS_PAGES_ROOT);
        assert_ne!(relation.table_schema(SYS_SCHEMA).unwrap().root, SYS_SCHEMA_ROOT);
        assert_eq!(relation.table_schema(SYS_PAGES).unwrap().root, page_table_root);
        relation.close().unwrap();
    }

    let relation = temp.open().unwrap();
    let names = relation.table_names().unwrap();
    assert_eq!(names.len(), 42);
    assert_eq!(names[41], "table_39");

    let page_table_root = relation.storage().read().page_table_root();
    assert_eq!(relation.table_schema(SYS_PAGES).unwrap().root, page_table_root);
    let schema = relation.table_schema("table_17").unwrap();
    assert_eq!(schema.columns, vec![ColumnSchema::int("id")]);
}

#[test]
fn test_create_db_discards_leftover_wal() {
    let temp = TempDatabase::with_prefix("create_db_stale_wal").unwrap();
    {
        let relation = temp.create().unwrap();
        relation.create_table("people", people_columns()).unwrap();
        let (_, batch) = relation
            .insert("people", &["person_id"], &[Value::Int(1)])
            .unwrap();
        relation.flush_wal_batch(&batch).unwrap();
        relation.close().unwrap();
    }
    // only the page file goes away
    fs::remove_file(temp.table_path()).unwrap();
    assert!(fs::metadata(temp.wal_path()).unwrap().len() > 0);

    let relation = temp.create().unwrap();
    assert_eq!(fs::metadata(temp.wal_path()).unwrap().len(), 0);
    relation.close().unwrap();

    let relation = temp.open().unwrap();
    assert_eq!(relation.table_names().unwrap(), vec!["sys_pages", "sys_schema"]);
}
