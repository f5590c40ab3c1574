//! Pool cluster: one master pool plus zero or more replica pools

use std::fmt;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::Any;
use sqlx::any::AnyPoolOptions;
use sqlx::pool::PoolConnection;
use tracing::debug;

use crate::config::{ClusterConfig, NodeConfig, ReplicaStrategy};
use crate::error::{Error, Result};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

static INSTALL_DRIVERS: Once = Once::new();

/// Which node of the cluster a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
   /// The single writable node
   Master,

   /// One of the read replicas
   Replica,
}

impl fmt::Display for Role {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Role::Master => write!(f, "master"),
         Role::Replica => write!(f, "replica"),
      }
   }
}

/// Connection counts for a single pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
   /// Total connections currently open, whether checked out or idle
   pub size: u32,

   /// Connections sitting free in the pool
   pub idle: usize,
}

/// Connection counts for every pool in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterStatus {
   pub master: PoolStatus,
   pub replicas: Vec<PoolStatus>,
}

/// Owns the connection pools for one master node and N replica nodes.
///
/// Pools are registered once at construction and opened lazily, so the first
/// physical connection to a node is established on first acquire. Replica
/// acquires pick a pool via the configured [`ReplicaStrategy`].
#[derive(Debug)]
pub(crate) struct PoolCluster {
   master: sqlx::Pool<Any>,
   replicas: Vec<sqlx::Pool<Any>>,
   strategy: ReplicaStrategy,

   /// Cursor for round-robin replica selection
   next_replica: AtomicUsize,
}

impl PoolCluster {
   pub(crate) fn new(config: &ClusterConfig) -> Result<Self> {
      INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

      let master = Self::build_pool(&config.master_node(), "master")?;
      let replicas = config
         .replica_nodes()
         .iter()
         .enumerate()
         .map(|(i, node)| Self::build_pool(node, &format!("replica{}", i + 1)))
         .collect::<Result<Vec<_>>>()?;

      Ok(Self {
         master,
         replicas,
         strategy: config.replica_strategy,
         next_replica: AtomicUsize::new(0),
      })
   }

   fn build_pool(node: &NodeConfig, name: &str) -> Result<sqlx::Pool<Any>> {
      let url = node
         .url
         .as_deref()
         .ok_or_else(|| Error::config(format!("no url configured for {name}")))?;

      let mut options = AnyPoolOptions::new()
         .max_connections(node.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS))
         .min_connections(node.min_connections.unwrap_or(0))
         .acquire_timeout(node.acquire_timeout.unwrap_or(DEFAULT_ACQUIRE_TIMEOUT));

      if let Some(idle_timeout) = node.idle_timeout {
         options = options.idle_timeout(idle_timeout);
      }

      options
         .connect_lazy(url)
         .map_err(|e| Error::config(format!("invalid url for {name}: {e}")))
   }

   /// Check a connection out of the pool for `role`.
   ///
   /// Acquiring from a shut-down cluster fails with a `PoolClosed` error
   /// through the same channel as any other acquisition failure.
   pub(crate) async fn acquire(&self, role: Role) -> Result<PoolConnection<Any>> {
      let pool = self.pool_for(role)?;
      pool.acquire().await.map_err(|e| Error::acquire(role, e))
   }

   fn pool_for(&self, role: Role) -> Result<&sqlx::Pool<Any>> {
      match role {
         Role::Master => Ok(&self.master),
         Role::Replica => self.pick_replica(),
      }
   }

   fn pick_replica(&self) -> Result<&sqlx::Pool<Any>> {
      if self.replicas.is_empty() {
         return Err(crate::error::ErrorKind::NoReplicas.into());
      }

      let index = match self.strategy {
         ReplicaStrategy::Random => rand::thread_rng().gen_range(0..self.replicas.len()),
         ReplicaStrategy::RoundRobin => {
            self.next_replica.fetch_add(1, Ordering::Relaxed) % self.replicas.len()
         }
      };

      Ok(&self.replicas[index])
   }

   /// Close every pool. Best-effort: shutdown never raises.
   pub(crate) async fn close(&self) {
      debug!("closing pool cluster ({} replica pool(s))", self.replicas.len());
      self.master.close().await;
      for replica in &self.replicas {
         replica.close().await;
      }
   }

   pub(crate) fn status(&self) -> ClusterStatus {
      ClusterStatus {
         master: Self::pool_status(&self.master),
         replicas: self.replicas.iter().map(Self::pool_status).collect(),
      }
   }

   fn pool_status(pool: &sqlx::Pool<Any>) -> PoolStatus {
      PoolStatus {
         size: pool.size(),
         // A closed pool keeps reporting its last idle count while its
         // connections drain; nothing is acquirable, so report zero
         idle: if pool.is_closed() { 0 } else { pool.num_idle() },
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn config_with_replicas(count: usize) -> ClusterConfig {
      ClusterConfig {
         common: NodeConfig {
            url: Some("mysql://localhost/db".into()),
            ..Default::default()
         },
         replicas: vec![NodeConfig::default(); count],
         ..Default::default()
      }
   }

   #[tokio::test]
   async fn test_missing_url_is_a_config_error() {
      let err = PoolCluster::new(&ClusterConfig::default()).unwrap_err();
      assert!(err.to_string().contains("no url configured for master"));
   }

   #[tokio::test]
   async fn test_replica_acquire_without_replicas_fails() {
      let cluster = PoolCluster::new(&config_with_replicas(0)).unwrap();
      let err = cluster.pick_replica().unwrap_err();
      assert!(err.to_string().contains("no replica pools"));
   }

   #[tokio::test]
   async fn test_round_robin_cycles_through_replicas() {
      let mut config = config_with_replicas(3);
      config.replica_strategy = ReplicaStrategy::RoundRobin;
      let cluster = PoolCluster::new(&config).unwrap();

      let picks: Vec<usize> = (0..6)
         .map(|_| {
            let pool = cluster.pick_replica().unwrap();
            cluster
               .replicas
               .iter()
               .position(|p| std::ptr::eq(p, pool))
               .unwrap()
         })
         .collect();

      assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
   }

   #[tokio::test]
   async fn test_random_picks_stay_in_range() {
      let cluster = PoolCluster::new(&config_with_replicas(2)).unwrap();
      for _ in 0..50 {
         cluster.pick_replica().unwrap();
      }
   }
}
