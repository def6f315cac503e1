use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    storage::schema::ColumnSchema,
    types::{
        MAX_VALUE_SIZE, RowId,
        error::{DatabaseError, Result},
        value::{DataType, Value},
    },
    utils::bytes::ByteReader,
};

/// Column name to value map, the unit the tuple codec works on.
pub type Tuple = HashMap<String, Value>;

/// A decoded table row: the B+-tree key and the values in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub row_id: RowId,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(row_id: RowId, values: Vec<Value>) -> Self {
        Self { row_id, values }
    }

    pub fn from_tuple(row_id: RowId, schema: &[ColumnSchema], mut tuple: Tuple) -> Self {
        let values = schema
            .iter()
            .map(|column| tuple.remove(&column.name).unwrap_or(Value::Null))
            .collect();
        Self { row_id, values }
    }

    pub fn decode(row_id: RowId, schema: &[ColumnSchema], bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_tuple(row_id, schema, decode_tuple(schema, bytes)?))
    }

    pub fn get_value(&self, column_index: usize) -> Option<&Value> {
        self.values.get(column_index)
    }

    pub fn to_tuple(&self, schema: &[ColumnSchema]) -> Tuple {
        schema
            .iter()
            .zip(&self.values)
            .map(|(column, value)| (column.name.clone(), value.clone()))
            .collect()
    }
}

/// Encode a tuple in schema order: for every column a null flag byte, then
/// for non-null values either an i32, a length-prefixed string or a bool byte.
/// Columns missing from the tuple are written as NULL.
pub fn encode_tuple(schema: &[ColumnSchema], tuple: &Tuple) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();

    for column in schema {
        let value = tuple.get(&column.name).unwrap_or(&Value::Null);
        if value.is_null() {
            buffer.push(1);
            continue;
        }
        buffer.push(0);
        validate_value(column, value)?;
        match value {
            Value::Int(i) => buffer.extend_from_slice(&i.to_le_bytes()),
            Value::Varchar(s) => {
                buffer.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buffer.extend_from_slice(s.as_bytes());
            }
            Value::Bool(b) => buffer.push(*b as u8),
            Value::Null => unreachable!("null handled above"),
        }
    }

    if buffer.len() > MAX_VALUE_SIZE {
        return Err(DatabaseError::RowTooLarge {
            size: buffer.len(),
            max: MAX_VALUE_SIZE,
        });
    }

    Ok(buffer)
}

pub fn decode_tuple(schema: &[ColumnSchema], bytes: &[u8]) -> Result<Tuple> {
    let mut reader = ByteReader::new(bytes);
    let mut tuple = Tuple::with_capacity(schema.len());

    for column in schema {
        let is_null = reader.read_u8()? != 0;
        let value = if is_null {
            Value::Null
        } else {
            match column.data_type {
                DataType::Int => Value::Int(reader.read_i32()?),
                DataType::Varchar => {
                    let len = reader.read_u32()? as usize;
                    let raw = reader.take(len)?;
                    let text = String::from_utf8(raw.to_vec()).map_err(|_| {
                        DatabaseError::decode(format!("invalid UTF-8 in column '{}'", column.name))
                    })?;
                    Value::Varchar(text)
                }
                DataType::Bool => Value::Bool(reader.read_u8()? != 0),
            }
        };
        tuple.insert(column.name.clone(), value);
    }

    Ok(tuple)
}

fn validate_value(column: &ColumnSchema, value: &Value) -> Result<()> {
    if value.data_type() != Some(column.data_type) {
        return Err(DatabaseError::TypeMismatch {
            expected: format!("{} for column '{}'", column.data_type, column.name),
            actual: value.type_name().to_string(),
        });
    }
    if let Value::Varchar(s) = value {
        if s.len() > column.length as usize {
            return Err(DatabaseError::TypeMismatch {
                expected: format!("varchar({}) for column '{}'", column.length, column.name),
                actual: format!("string of {} bytes", s.len()),
            });
        }
    }
    Ok(())
}
