//! Connection handle passed into scope bodies

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::Any;
use sqlx::pool::PoolConnection;

use crate::cluster::Role;
use crate::decode;
use crate::error::{Error, Origin, Result};

/// A single result row, keyed by column name in select order
pub type Row = IndexMap<String, JsonValue>;

/// Result returned from write statements (e.g. INSERT, UPDATE, DELETE).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
   /// The number of rows affected by the statement
   pub rows_affected: u64,

   /// The last inserted row id, when the driver reports one
   pub last_insert_id: Option<i64>,
}

/// Handle to the one connection a scope owns.
///
/// Statements issued through this handle run sequentially, in program order,
/// on that single connection. Dropping the handle returns the connection to
/// its pool, which the scope runner does exactly once per scope.
pub struct Conn {
   inner: PoolConnection<Any>,
   role: Role,
   origin: Origin,
}

impl Conn {
   pub(crate) fn new(inner: PoolConnection<Any>, role: Role, origin: Origin) -> Self {
      Self {
         inner,
         role,
         origin,
      }
   }

   /// Which node this connection belongs to.
   pub fn role(&self) -> Role {
      self.role
   }

   /// Execute a SELECT statement and return every row.
   pub async fn query(&mut self, sql: &str, params: Vec<JsonValue>) -> Result<Vec<Row>> {
      let mut q = sqlx::query(sql);
      for param in &params {
         q = decode::bind_value(q, param.clone());
      }

      let rows = q
         .fetch_all(&mut *self.inner)
         .await
         .map_err(|e| Error::query(sql, &params, e).with_origin(self.origin))?;

      rows.iter().map(decode::row_to_json).collect()
   }

   /// Execute a SELECT statement and return the first row, or `None` when
   /// the result set is empty.
   pub async fn select_one(&mut self, sql: &str, params: Vec<JsonValue>) -> Result<Option<Row>> {
      let mut rows = self.query(sql, params).await?;
      if rows.is_empty() {
         Ok(None)
      } else {
         Ok(Some(rows.swap_remove(0)))
      }
   }

   /// Execute a write statement (INSERT/UPDATE/DELETE/DDL).
   pub async fn execute(&mut self, sql: &str, params: Vec<JsonValue>) -> Result<ExecResult> {
      let mut q = sqlx::query(sql);
      for param in &params {
         q = decode::bind_value(q, param.clone());
      }

      let result = q
         .execute(&mut *self.inner)
         .await
         .map_err(|e| Error::query(sql, &params, e).with_origin(self.origin))?;

      Ok(ExecResult {
         rows_affected: result.rows_affected(),
         last_insert_id: result.last_insert_id(),
      })
   }

   /// Run a bare transaction-control statement, without the query-error
   /// wrapping: BEGIN/COMMIT/ROLLBACK failures get their own error kinds.
   ///
   /// Uses the unprepared text protocol; MySQL rejects transaction control
   /// as a prepared statement.
   pub(crate) async fn control(&mut self, sql: &str) -> std::result::Result<(), sqlx::Error> {
      sqlx::raw_sql(sql).execute(&mut *self.inner).await.map(|_| ())
   }
}
