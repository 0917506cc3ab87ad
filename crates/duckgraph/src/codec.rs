//! Property codec: typed values as a row of nullable columns
//!
//! The properties table carries one nullable column per [`ValueKind`]. A row
//! holds its value in exactly one of them; the kind is recovered on read by
//! finding the first non-null column, scanning in [`ValueKind::ALL`] order.
//! Classification on write uses the same order, so both sides agree on which
//! column a value lives in.

use crate::error::{GraphError, GraphResult};
use crate::value::PropertyValue;
use duckdb::types::Value as SqlValue;
use duckdb::Row;

/// Storage kind of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Boolean,
    Float,
    Double,
    Long,
    Integer,
    String,
    Blob,
}

impl ValueKind {
    /// All kinds in classification and decoding precedence
    pub const ALL: [ValueKind; 7] = [
        ValueKind::Boolean,
        ValueKind::Float,
        ValueKind::Double,
        ValueKind::Long,
        ValueKind::Integer,
        ValueKind::String,
        ValueKind::Blob,
    ];

    /// Kind of the column a value is stored in
    pub fn of(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Boolean(_) => Self::Boolean,
            PropertyValue::Float(_) => Self::Float,
            PropertyValue::Double(_) => Self::Double,
            PropertyValue::Long(_) => Self::Long,
            PropertyValue::Integer(_) => Self::Integer,
            PropertyValue::String(_) => Self::String,
            PropertyValue::Object(_) => Self::Blob,
        }
    }

    pub fn column_name(self) -> &'static str {
        match self {
            Self::Boolean => "value_boolean",
            Self::Float => "value_float",
            Self::Double => "value_double",
            Self::Long => "value_long",
            Self::Integer => "value_int",
            Self::String => "value_string",
            Self::Blob => "value_blob",
        }
    }

    pub fn column_type(self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Long => "BIGINT",
            Self::Integer => "INTEGER",
            Self::String => "VARCHAR",
            Self::Blob => "BLOB",
        }
    }

    /// Expression used to select this kind's column
    ///
    /// Blobs are read back as hex text and decoded client-side; every other
    /// kind is selected by plain column name.
    pub fn column_expression(self) -> &'static str {
        match self {
            Self::Blob => "hex(value_blob)",
            other => other.column_name(),
        }
    }

    /// Read this kind's column at `index`, `None` if it is NULL
    fn read(self, row: &Row<'_>, index: usize) -> GraphResult<Option<PropertyValue>> {
        let value = match self {
            Self::Boolean => row.get::<_, Option<bool>>(index)?.map(PropertyValue::Boolean),
            Self::Float => row.get::<_, Option<f32>>(index)?.map(PropertyValue::Float),
            Self::Double => row.get::<_, Option<f64>>(index)?.map(PropertyValue::Double),
            Self::Long => row.get::<_, Option<i64>>(index)?.map(PropertyValue::Long),
            Self::Integer => row.get::<_, Option<i32>>(index)?.map(PropertyValue::Integer),
            Self::String => row.get::<_, Option<String>>(index)?.map(PropertyValue::String),
            Self::Blob => match row.get::<_, Option<String>>(index)? {
                Some(hex_text) => Some(decode_blob(&hex_text)?),
                None => None,
            },
        };
        Ok(value)
    }
}

/// `(column, type)` pairs for the value columns of the properties table
pub fn columns_for_storage() -> Vec<(&'static str, &'static str)> {
    ValueKind::ALL
        .iter()
        .map(|kind| (kind.column_name(), kind.column_type()))
        .collect()
}

/// Column definitions fragment for `CREATE TABLE`
pub fn table_columns() -> String {
    columns_for_storage()
        .into_iter()
        .map(|(name, ty)| format!("{} {}", name, ty))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Select list fragment covering every value column in precedence order
pub fn query_columns() -> String {
    ValueKind::ALL
        .iter()
        .map(|kind| kind.column_expression())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Bind parameter for the column matching the value's kind
pub fn encode(value: &PropertyValue) -> GraphResult<SqlValue> {
    let encoded = match value {
        PropertyValue::Boolean(b) => SqlValue::Boolean(*b),
        PropertyValue::Float(f) => SqlValue::Float(*f),
        PropertyValue::Double(d) => SqlValue::Double(*d),
        PropertyValue::Long(l) => SqlValue::BigInt(*l),
        PropertyValue::Integer(i) => SqlValue::Int(*i),
        PropertyValue::String(s) => SqlValue::Text(s.clone()),
        PropertyValue::Object(v) => SqlValue::Blob(serde_json::to_vec(v)?),
    };
    Ok(encoded)
}

/// One value per column of [`ValueKind::ALL`], NULL everywhere except the
/// value's own column
pub fn encode_columns(value: &PropertyValue) -> GraphResult<Vec<SqlValue>> {
    let kind = ValueKind::of(value);
    let mut encoded = Some(encode(value)?);
    Ok(ValueKind::ALL
        .iter()
        .map(|k| {
            if *k == kind {
                encoded.take().unwrap_or(SqlValue::Null)
            } else {
                SqlValue::Null
            }
        })
        .collect())
}

/// Decode the value columns starting at `offset`
///
/// The columns must have been selected with [`query_columns`]. Returns the
/// value of the first non-null column, or `None` if all are NULL.
pub fn decode_row(row: &Row<'_>, offset: usize) -> GraphResult<Option<PropertyValue>> {
    for (i, kind) in ValueKind::ALL.iter().enumerate() {
        if let Some(value) = kind.read(row, offset + i)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn decode_blob(hex_text: &str) -> GraphResult<PropertyValue> {
    let bytes = hex::decode(hex_text.trim())?;
    let value = serde_json::from_slice(&bytes)
        .map_err(|e| GraphError::Encoding(format!("corrupt blob payload: {}", e)))?;
    Ok(PropertyValue::Object(value))
}
