use thiserror::Error;

use crate::types::{PageOffset, RowId};

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database '{name}' already exists")]
    DbExists { name: String },

    #[error("Database '{name}' does not exist")]
    DbNotExist { name: String },

    #[error("No database selected")]
    DbNotSelected,

    #[error("Table '{name}' already exists")]
    TableAlreadyExist { name: String },

    #[error("Table '{name}' does not exist")]
    TableNotExist { name: String },

    #[error("Column count mismatch: {columns} columns, {values} values")]
    ColCountMismatch { columns: usize, values: usize },

    #[error("Field '{name}' is ambiguous")]
    FieldAmbiguous { name: String },

    #[error("Field '{name}' not found in table '{table}'")]
    FieldNotFound { name: String, table: String },

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Row too large: {size} bytes (max: {max})")]
    RowTooLarge { size: usize, max: usize },

    #[error("LRU cache is full: every one of {capacity} pages is dirty")]
    LruCacheFull { capacity: usize },

    #[error("Key {key} already exists")]
    KeyAlreadyExists { key: RowId },

    #[error("Key {key} not found")]
    KeyNotFound { key: RowId },

    #[error("Page is full (offset: {offset})")]
    PageFull { offset: PageOffset },

    #[error("Invalid page offset: {offset}")]
    InvalidPageOffset { offset: PageOffset },

    #[error("Decode error: {details}")]
    Decode { details: String },

    #[error("Recovery error: {details}")]
    Recovery { details: String },

    #[error("Serialization/deserialization error: {details}")]
    Serialization { details: String },

    #[error("Invalid data: {details}")]
    InvalidData { details: String },
}

impl DatabaseError {
    pub(crate) fn decode(details: impl Into<String>) -> Self {
        DatabaseError::Decode {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
