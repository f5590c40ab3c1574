//! Connection scopes: one acquire → use → release episode
//!
//! A scope checks a single connection out of the cluster, hands it to a
//! caller-supplied body, and returns it to its pool exactly once no matter
//! how the body ends. Transactional scopes additionally bracket the body in
//! BEGIN and COMMIT/ROLLBACK.

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::cluster::{PoolCluster, Role};
use crate::conn::Conn;
use crate::error::{Error, Origin, Result};

/// How a transactional scope body asks to be finished.
///
/// This replaces the classic "throw a magic sentinel value" rollback signal:
/// rolling back without an error is an ordinary return value, so it can never
/// be confused with, or surfaced as, a genuine error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "the scope commits or rolls back based on this value"]
pub enum TxOutcome {
   /// Commit the transaction and resolve the scope with `true`
   Commit,

   /// Roll the transaction back and resolve the scope with `false`,
   /// surfacing no error
   Rollback,
}

/// One checkout episode against a cluster role.
pub(crate) struct Scope {
   role: Role,
   origin: Origin,
}

impl Scope {
   pub(crate) fn new(role: Role, origin: Origin) -> Self {
      Self { role, origin }
   }

   /// Run a non-transactional scope: acquire, execute the body, release.
   ///
   /// The `Conn` handle owns the pooled connection, so dropping it on the
   /// way out is the single release point for every path below.
   pub(crate) async fn run<T, F>(self, cluster: &PoolCluster, body: F) -> Result<T>
   where
      F: for<'c> FnOnce(&'c mut Conn) -> BoxFuture<'c, Result<T>>,
   {
      let raw = cluster
         .acquire(self.role)
         .await
         .map_err(|e| e.with_origin(self.origin))?;
      let mut conn = Conn::new(raw, self.role, self.origin);

      debug!(role = %self.role, "connection scope running");
      let outcome = body(&mut conn).await;
      drop(conn);

      outcome.map_err(|e| e.with_origin(self.origin))
   }

   /// Run a transactional scope: acquire, BEGIN, execute the body, then
   /// COMMIT or ROLLBACK, release.
   ///
   /// Resolves `true` when the transaction committed and `false` when the
   /// body requested [`TxOutcome::Rollback`].
   pub(crate) async fn run_transaction<F>(self, cluster: &PoolCluster, body: F) -> Result<bool>
   where
      F: for<'c> FnOnce(&'c mut Conn) -> BoxFuture<'c, Result<TxOutcome>>,
   {
      let raw = cluster
         .acquire(self.role)
         .await
         .map_err(|e| e.with_origin(self.origin))?;
      let mut conn = Conn::new(raw, self.role, self.origin);

      // BEGIN failure releases the connection without ever running the body
      if let Err(e) = conn.control("BEGIN").await {
         return Err(Error::begin(e).with_origin(self.origin));
      }

      debug!(role = %self.role, "transaction scope running");
      match body(&mut conn).await {
         Ok(TxOutcome::Commit) => match conn.control("COMMIT").await {
            Ok(()) => {
               debug!("transaction committed");
               Ok(true)
            }
            // Commit failure is always fatal and always surfaced; the
            // cleanup rollback is best-effort and must not mask it
            Err(commit_err) => {
               if let Err(rollback_err) = conn.control("ROLLBACK").await {
                  warn!(%rollback_err, "rollback after failed commit also failed");
               }
               Err(Error::commit(commit_err).with_origin(self.origin))
            }
         },

         Ok(TxOutcome::Rollback) => {
            if let Err(rollback_err) = conn.control("ROLLBACK").await {
               warn!(%rollback_err, "requested rollback failed");
            }
            debug!("transaction rolled back by request");
            Ok(false)
         }

         Err(body_err) => {
            let body_err = body_err.with_origin(self.origin);
            match conn.control("ROLLBACK").await {
               Ok(()) => {
                  debug!("transaction rolled back after body error");
                  Err(body_err)
               }
               // Merge the two failures rather than dropping either
               Err(rollback_err) => Err(Error::rollback_failed(body_err, rollback_err)),
            }
         }
      }
   }
}
