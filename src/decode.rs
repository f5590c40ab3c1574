//! Binding and decoding between JSON values and the Any driver

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value as JsonValue;
use sqlx::any::{AnyArguments, AnyRow, AnyTypeInfoKind};
use sqlx::query::Query;
use sqlx::{Any, Column, Row as _, ValueRef as _};

use crate::conn::Row;
use crate::error::Result;

/// Bind a JSON value to the next query placeholder.
pub(crate) fn bind_value<'a>(
   query: Query<'a, Any, AnyArguments<'a>>,
   value: JsonValue,
) -> Query<'a, Any, AnyArguments<'a>> {
   match value {
      JsonValue::Null => query.bind(None::<String>),
      JsonValue::Bool(b) => query.bind(b),
      JsonValue::String(s) => query.bind(s),
      JsonValue::Number(number) => {
         // Preserve integer precision by binding as i64 when possible
         if let Some(int_val) = number.as_i64() {
            query.bind(int_val)
         } else {
            query.bind(number.as_f64().unwrap_or_default())
         }
      }
      // Arrays and objects are bound as their JSON text
      composite => query.bind(composite.to_string()),
   }
}

/// Decode one row into an ordered column-name → JSON-value map.
///
/// Integer kinds widen to i64, real kinds to f64, and BLOBs become base64
/// text. Booleans surface however the node stores them (MySQL reports
/// TINYINT columns as integers).
pub(crate) fn row_to_json(row: &AnyRow) -> Result<Row> {
   let mut out = Row::default();

   for (i, column) in row.columns().iter().enumerate() {
      let raw = row.try_get_raw(i)?;
      let is_null = raw.is_null();
      let kind = raw.type_info().kind();

      let value = if is_null {
         JsonValue::Null
      } else {
         match kind {
            AnyTypeInfoKind::Null => JsonValue::Null,
            AnyTypeInfoKind::Bool => JsonValue::Bool(row.try_get::<bool, _>(i)?),
            AnyTypeInfoKind::SmallInt | AnyTypeInfoKind::Integer | AnyTypeInfoKind::BigInt => {
               JsonValue::from(row.try_get::<i64, _>(i)?)
            }
            AnyTypeInfoKind::Real | AnyTypeInfoKind::Double => {
               let v = row.try_get::<f64, _>(i)?;
               serde_json::Number::from_f64(v)
                  .map(JsonValue::Number)
                  .unwrap_or(JsonValue::Null)
            }
            AnyTypeInfoKind::Text => JsonValue::String(row.try_get::<String, _>(i)?),
            // Blob kinds decode as base64 text
            _ => JsonValue::String(BASE64.encode(row.try_get::<Vec<u8>, _>(i)?)),
         }
      };

      out.insert(column.name().to_string(), value);
   }

   Ok(out)
}
