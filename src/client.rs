//! Client facade owning the pool cluster

use std::future::Future;

use futures::future::BoxFuture;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::cluster::{ClusterStatus, PoolCluster, Role};
use crate::config::ClusterConfig;
use crate::conn::{Conn, ExecResult, Row};
use crate::error::{Origin, Result};
use crate::scope::{Scope, TxOutcome};

/// Client for a master/replica MySQL cluster.
///
/// The client owns one pool per configured node for its whole lifetime.
/// Callers never hold connections directly; they open a *scope* with one of
/// the methods below, which checks a connection out, runs the supplied body
/// against it, and returns it to its pool exactly once regardless of how the
/// body ends.
///
/// Scope bodies have the same shape as SQLx's closure transactions:
///
/// ```no_run
/// # async fn demo(client: sqlx_mysql_cluster::Client) -> sqlx_mysql_cluster::Result<()> {
/// use serde_json::json;
///
/// let names = client
///     .with_replica(|conn| {
///         Box::pin(async move {
///             conn.query("SELECT name FROM users WHERE active = ?", vec![json!(1)])
///                 .await
///         })
///     })
///     .await?;
/// # let _ = names; Ok(())
/// # }
/// ```
pub struct Client {
   cluster: PoolCluster,
}

impl Client {
   /// Build a client from a cluster configuration.
   ///
   /// Pools are registered immediately but open their first physical
   /// connection lazily, on first use.
   pub fn connect(config: ClusterConfig) -> Result<Self> {
      Ok(Self {
         cluster: PoolCluster::new(&config)?,
      })
   }

   /// Run `body` inside a non-transactional scope against the master.
   #[track_caller]
   pub fn with_master<'a, T, F>(&'a self, body: F) -> impl Future<Output = Result<T>> + 'a
   where
      F: for<'c> FnOnce(&'c mut Conn) -> BoxFuture<'c, Result<T>> + 'a,
      T: 'a,
   {
      Scope::new(Role::Master, Origin::caller()).run(&self.cluster, body)
   }

   /// Run `body` inside a non-transactional scope against a replica chosen
   /// by the configured selection strategy.
   #[track_caller]
   pub fn with_replica<'a, T, F>(&'a self, body: F) -> impl Future<Output = Result<T>> + 'a
   where
      F: for<'c> FnOnce(&'c mut Conn) -> BoxFuture<'c, Result<T>> + 'a,
      T: 'a,
   {
      Scope::new(Role::Replica, Origin::caller()).run(&self.cluster, body)
   }

   /// Run `body` inside a transactional scope against the master.
   ///
   /// Resolves `true` when the body returned [`TxOutcome::Commit`] and the
   /// commit succeeded, `false` when the body requested
   /// [`TxOutcome::Rollback`]. Any error from the body rolls the
   /// transaction back and is re-raised.
   #[track_caller]
   pub fn transaction<'a, F>(&'a self, body: F) -> impl Future<Output = Result<bool>> + 'a
   where
      F: for<'c> FnOnce(&'c mut Conn) -> BoxFuture<'c, Result<TxOutcome>> + 'a,
   {
      Scope::new(Role::Master, Origin::caller()).run_transaction(&self.cluster, body)
   }

   /// Execute one SELECT statement inside an ephemeral master scope.
   #[track_caller]
   pub fn query<'a>(
      &'a self,
      sql: &str,
      params: Vec<JsonValue>,
   ) -> impl Future<Output = Result<Vec<Row>>> + 'a {
      let scope = Scope::new(Role::Master, Origin::caller());

      // The body future may not borrow from outside the scope, so it owns
      // the statement text
      let sql = sql.to_owned();
      scope.run(&self.cluster, move |conn| {
         Box::pin(async move { conn.query(&sql, params).await })
      })
   }

   /// Execute one SELECT statement inside an ephemeral master scope and
   /// return the first row, or `None` when the result set is empty.
   #[track_caller]
   pub fn select_one<'a>(
      &'a self,
      sql: &str,
      params: Vec<JsonValue>,
   ) -> impl Future<Output = Result<Option<Row>>> + 'a {
      let scope = Scope::new(Role::Master, Origin::caller());

      let sql = sql.to_owned();
      scope.run(&self.cluster, move |conn| {
         Box::pin(async move { conn.select_one(&sql, params).await })
      })
   }

   /// Execute one write statement inside an ephemeral master scope.
   #[track_caller]
   pub fn execute<'a>(
      &'a self,
      sql: &str,
      params: Vec<JsonValue>,
   ) -> impl Future<Output = Result<ExecResult>> + 'a {
      let scope = Scope::new(Role::Master, Origin::caller());

      let sql = sql.to_owned();
      scope.run(&self.cluster, move |conn| {
         Box::pin(async move { conn.execute(&sql, params).await })
      })
   }

   /// Shut every pool down. Best-effort: never returns an error.
   ///
   /// Afterwards every pool reports zero connections and any further scope
   /// fails with a pool-closed error.
   pub async fn close(&self) {
      debug!("client shutting down");
      self.cluster.close().await;
   }

   /// Connection counts for every pool in the cluster.
   pub fn status(&self) -> ClusterStatus {
      self.cluster.status()
   }
}
