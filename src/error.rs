//! Error types and origin tracking for cluster operations

use std::fmt;
use std::panic::Location;

use serde_json::Value as JsonValue;

use crate::cluster::Role;

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Call site that opened a connection scope.
///
/// Captured synchronously, before the scope suspends for the first time, so
/// that errors surfacing from deep inside an asynchronous continuation stay
/// traceable to the line that opened the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
   location: &'static Location<'static>,
}

impl Origin {
   #[track_caller]
   pub(crate) fn caller() -> Self {
      Self {
         location: Location::caller(),
      }
   }

   /// Source file of the call site.
   pub fn file(&self) -> &'static str {
      self.location.file()
   }

   /// Line number of the call site.
   pub fn line(&self) -> u32 {
      self.location.line()
   }
}

impl fmt::Display for Origin {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{}", self.location)
   }
}

/// Errors that may occur when working with a cluster client.
///
/// Every error carries an [`ErrorKind`] plus, once it has crossed a scope
/// boundary, the [`Origin`] of the call that opened the scope. The origin is
/// appended to the `Display` output; [`Error::message`] returns the kind's
/// text alone.
#[derive(Debug)]
pub struct Error {
   kind: ErrorKind,
   origin: Option<Origin>,
}

/// The different classes of cluster client errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
   /// Failed to check a connection out of a pool.
   #[error("failed to acquire a {role} connection: {source}")]
   Acquire {
      role: Role,
      #[source]
      source: sqlx::Error,
   },

   /// The pool cluster has been shut down and cannot hand out connections.
   #[error("pool is closed")]
   PoolClosed,

   /// A replica connection was requested but no replica pools are configured.
   #[error("no replica pools are configured")]
   NoReplicas,

   /// BEGIN failed; the scope body never ran.
   #[error("failed to begin transaction: {0}")]
   Begin(#[source] sqlx::Error),

   /// COMMIT failed. Always fatal, always surfaced.
   #[error("failed to commit transaction: {0}")]
   Commit(#[source] sqlx::Error),

   /// A statement failed. Carries the statement and its bound parameters
   /// for diagnosability.
   #[error("query failed: {source} (statement: {statement}, params: {params})")]
   Query {
      statement: String,
      params: JsonValue,
      #[source]
      source: sqlx::Error,
   },

   /// The scope body failed and the cleanup ROLLBACK failed too. Both
   /// messages are preserved so the triggering error is never dropped.
   #[error("transaction failed: {scope_error}; rollback also failed: {rollback_error}")]
   RollbackFailed {
      scope_error: String,
      rollback_error: String,
   },

   /// Invalid cluster configuration.
   #[error("configuration error: {0}")]
   Config(String),

   /// Error from the sqlx library outside the categories above.
   #[error("sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// Caller-supplied error, including bare strings promoted via
   /// `Error::from(&str)` with their text preserved verbatim.
   #[error("{0}")]
   Other(String),
}

impl Error {
   pub(crate) fn new(kind: ErrorKind) -> Self {
      Self { kind, origin: None }
   }

   pub(crate) fn acquire(role: Role, source: sqlx::Error) -> Self {
      match source {
         sqlx::Error::PoolClosed => Self::new(ErrorKind::PoolClosed),
         source => Self::new(ErrorKind::Acquire { role, source }),
      }
   }

   pub(crate) fn begin(source: sqlx::Error) -> Self {
      Self::new(ErrorKind::Begin(source))
   }

   pub(crate) fn commit(source: sqlx::Error) -> Self {
      Self::new(ErrorKind::Commit(source))
   }

   pub(crate) fn query(statement: &str, params: &[JsonValue], source: sqlx::Error) -> Self {
      Self::new(ErrorKind::Query {
         statement: statement.to_owned(),
         params: JsonValue::Array(params.to_vec()),
         source,
      })
   }

   pub(crate) fn rollback_failed(scope_error: Error, rollback_error: sqlx::Error) -> Self {
      Self {
         origin: scope_error.origin,
         kind: ErrorKind::RollbackFailed {
            // The kind text alone; the merged error carries the origin and
            // Display appends it once
            scope_error: scope_error.message(),
            rollback_error: rollback_error.to_string(),
         },
      }
   }

   pub(crate) fn config(message: impl Into<String>) -> Self {
      Self::new(ErrorKind::Config(message.into()))
   }

   /// Build a caller-side error from any displayable value.
   pub fn other(message: impl Into<String>) -> Self {
      Self::new(ErrorKind::Other(message.into()))
   }

   /// Attach a scope origin, keeping an already-attached one.
   pub(crate) fn with_origin(mut self, origin: Origin) -> Self {
      self.origin.get_or_insert(origin);
      self
   }

   /// The class of this error.
   pub fn kind(&self) -> &ErrorKind {
      &self.kind
   }

   /// The call site of the scope this error surfaced from, if known.
   pub fn origin(&self) -> Option<Origin> {
      self.origin
   }

   /// The error text without the origin suffix.
   ///
   /// For an error promoted from a bare string this equals that string.
   pub fn message(&self) -> String {
      self.kind.to_string()
   }

   /// Whether this error was caused by acquiring from a shut-down cluster.
   pub fn is_pool_closed(&self) -> bool {
      matches!(self.kind, ErrorKind::PoolClosed)
   }
}

impl fmt::Display for Error {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{}", self.kind)?;
      if let Some(origin) = self.origin {
         write!(f, " (scope opened at {origin})")?;
      }
      Ok(())
   }
}

impl std::error::Error for Error {
   fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
      Some(&self.kind)
   }
}

impl From<ErrorKind> for Error {
   fn from(kind: ErrorKind) -> Self {
      Self::new(kind)
   }
}

impl From<sqlx::Error> for Error {
   fn from(source: sqlx::Error) -> Self {
      Self::new(ErrorKind::Sqlx(source))
   }
}

impl From<String> for Error {
   fn from(message: String) -> Self {
      Self::other(message)
   }
}

impl From<&str> for Error {
   fn from(message: &str) -> Self {
      Self::other(message)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_bare_string_promotion_preserves_message() {
      let err: Error = "something broke".into();
      assert_eq!(err.message(), "something broke");
      assert_eq!(err.to_string(), "something broke");
      assert!(err.origin().is_none());
   }

   #[test]
   fn test_origin_suffix_in_display_only() {
      let origin = Origin::caller();
      let err = Error::from("boom").with_origin(origin);

      assert_eq!(err.message(), "boom");
      assert!(err.to_string().starts_with("boom (scope opened at "));
      assert!(err.to_string().contains("error.rs"));
   }

   #[test]
   fn test_with_origin_keeps_first_origin() {
      let first = Origin::caller();
      let second = Origin::caller();
      assert_ne!(first.line(), second.line());

      let err = Error::from("boom").with_origin(first).with_origin(second);
      assert_eq!(err.origin().map(|o| o.line()), Some(first.line()));
   }

   #[test]
   fn test_pool_closed_detection() {
      let err = Error::acquire(Role::Master, sqlx::Error::PoolClosed);
      assert!(err.is_pool_closed());
      assert!(err.to_string().contains("closed"));

      let err = Error::acquire(Role::Master, sqlx::Error::RowNotFound);
      assert!(!err.is_pool_closed());
      assert!(err.to_string().contains("master"));
   }

   #[test]
   fn test_query_error_embeds_statement_and_params() {
      let err = Error::query(
         "SELECT * FROM users WHERE id = ?",
         &[serde_json::json!(7)],
         sqlx::Error::RowNotFound,
      );

      let text = err.to_string();
      assert!(text.contains("SELECT * FROM users WHERE id = ?"));
      assert!(text.contains("[7]"));
   }

   #[test]
   fn test_rollback_failed_preserves_both_messages() {
      let body_err = Error::from("body exploded").with_origin(Origin::caller());
      let err = Error::rollback_failed(body_err, sqlx::Error::PoolClosed);

      let text = err.to_string();
      assert!(text.contains("body exploded"));
      assert!(text.contains("rollback also failed"));
      assert!(err.origin().is_some());

      // The origin of the triggering error surfaces exactly once
      assert_eq!(text.matches("scope opened at").count(), 1);
   }
}
