use pacul::{
    executor::scan::{ScanDirection, ScanIterator, Scanner, SequentialScanner},
    relation::Relation,
    storage::schema::ColumnSchema,
    types::{error::DatabaseError, row::Row, value::Value},
    utils::mock::TempDatabase,
};

const WORDS: [&str; 11] = [
    "bonjour", "hello", "chien", "lumber", "chat", "saw", "nail", "screwdriver", "screw", "hallo",
    "hammer",
];

fn setup_words(temp: &TempDatabase) -> Relation {
    let relation = temp.create().unwrap();
    relation
        .create_table(
            "words",
            vec![ColumnSchema::int("n"), ColumnSchema::varchar("word", 32)],
        )
        .unwrap();
    for (n, word) in WORDS.iter().enumerate() {
        let (_, batch) = relation
            .insert("words", &[], &[Value::Int(n as i32), Value::from(*word)])
            .unwrap();
        relation.flush_wal_batch(&batch).unwrap();
    }
    relation
}

fn words_of(rows: &[Row]) -> Vec<String> {
    rows.iter().map(|row| row.values[1].to_string()).collect()
}

#[test]
fn test_fetch_returns_rows_in_insert_order() {
    let temp = TempDatabase::with_prefix("scan_fetch").unwrap();
    let relation = setup_words(&temp);

    let (rows, columns) = relation.fetch("words").unwrap();
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[1].name, "word");
    assert_eq!(words_of(&rows), WORDS.to_vec());
    assert!(rows.windows(2).all(|w| w[0].row_id < w[1].row_id));
}

#[test]
fn test_fetch_reverse() {
    let temp = TempDatabase::with_prefix("scan_reverse").unwrap();
    let relation = setup_words(&temp);

    let (rows, _) = relation.fetch_reverse("words").unwrap();
    let mut expected = WORDS.to_vec();
    expected.reverse();
    assert_eq!(words_of(&rows), expected);
}

#[test]
fn test_fetch_row_point_lookup() {
    let temp = TempDatabase::with_prefix("scan_fetch_row").unwrap();
    let relation = setup_words(&temp);
    let (rows, _) = relation.fetch("words").unwrap();

    for row in &rows {
        assert_eq!(relation.fetch_row("words", row.row_id).unwrap().as_ref(), Some(row));
    }
    let missing = rows.last().unwrap().row_id + 100;
    assert!(relation.fetch_row("words", missing).unwrap().is_none());
}

#[test]
fn test_fetch_missing_table() {
    let temp = TempDatabase::with_prefix("scan_missing").unwrap();
    let relation = temp.create().unwrap();

    assert!(matches!(
        relation.fetch("ghosts"),
        Err(DatabaseError::TableNotExist { .. })
    ));
    assert!(matches!(
        relation.fetch_row("ghosts", 1),
        Err(DatabaseError::TableNotExist { .. })
    ));
}

#[test]
fn test_sequential_scanner_both_directions() {
    let temp = TempDatabase::with_prefix("scan_sequential").unwrap();
    let relation = setup_words(&temp);

    let forward = SequentialScanner::new(&relation, "words", ScanDirection::Forward).unwrap();
    let rows: Vec<Row> = ScanIterator::new(forward).collect::<Result<_, _>>().unwrap();
    assert_eq!(words_of(&rows), WORDS.to_vec());

    let backward = SequentialScanner::new(&relation, "words", ScanDirection::Backward).unwrap();
    let rows: Vec<Row> = ScanIterator::new(backward).collect::<Result<_, _>>().unwrap();
    let mut expected = WORDS.to_vec();
    expected.reverse();
    assert_eq!(words_of(&rows), expected);
}

#[test]
fn test_scan_batch_and_reset() {
    let temp = TempDatabase::with_prefix("scan_batch").unwrap();
    let relation = setup_words(&temp);
    let mut scanner = SequentialScanner::new(&relation, "words", ScanDirection::Forward).unwrap();

    assert_eq!(scanner.columns().len(), 2);
    assert_eq!(words_of(&scanner.scan_batch(4).unwrap()), WORDS[..4].to_vec());
    assert_eq!(words_of(&scanner.scan_batch(4).unwrap()), WORDS[4..8].to_vec());
    assert_eq!(words_of(&scanner.scan_batch(4).unwrap()), WORDS[8..].to_vec());
    assert!(scanner.scan().unwrap().is_none());

    scanner.reset().unwrap();
    assert_eq!(
        scanner.scan().unwrap().map(|row| row.values[1].clone()),
        Some(Value::from("bonjour"))
    );
}

#[test]
fn test_scan_skips_deleted_rows() {
    let temp = TempDatabase::with_prefix("scan_deleted").unwrap();
    let relation = setup_words(&temp);
    let (rows, _) = relation.fetch("words").unwrap();

    for row in rows.iter().filter(|row| row.values[0].as_int().unwrap() % 2 == 1) {
        let batch = relation.mark_deleted("words", row.row_id).unwrap();
        relation.flush_wal_batch(&batch).unwrap();
    }

    let expected: Vec<&str> = WORDS.iter().step_by(2).copied().collect();
    let (rows, _) = relation.fetch("words").unwrap();
    assert_eq!(words_of(&rows), expected);

    let scanner = SequentialScanner::new(&relation, "words", ScanDirection::Backward).unwrap();
    let rows: Vec<Row> = ScanIterator::new(scanner).collect::<Result<_, _>>().unwrap();
    let mut reversed = expected.clone();
    reversed.reverse();
    assert_eq!(words_of(&rows), reversed);
}

#[test]
fn test_large_table_scan() {
    let temp = TempDatabase::with_prefix("scan_large").unwrap();
    let relation = temp.create().unwrap();
    relation
        .create_table("numbers", vec![ColumnSchema::int("n"), ColumnSchema::bool("even")])
        .unwrap();

    for n in 0..500 {
        let (_, batch) = relation
            .insert("numbers", &[], &[Value::Int(n), Value::Bool(n % 2 == 0)])
            .unwrap();
        relation.flush_wal_batch(&batch).unwrap();
    }

    let (rows, _) = relation.fetch("numbers").unwrap();
    let numbers: Vec<i32> = rows.iter().map(|row| row.values[0].as_int().unwrap()).collect();
    assert_eq!(numbers, (0..500).collect::<Vec<_>>());
    assert_eq!(rows[3].values[1], Value::Bool(false));

    let (rows, _) = relation.fetch_reverse("numbers").unwrap();
    assert_eq!(rows[0].values[0], Value::Int(499));
    assert_eq!(rows.len(), 500);
}
