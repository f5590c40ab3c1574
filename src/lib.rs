//! # sqlx-mysql-cluster
//!
//! A scoped client for a MySQL cluster deployed as one master node and zero
//! or more read replicas, built on SQLx.
//!
//! ## Core Types
//!
//! - **[`Client`]**: the object callers hold; opens connection scopes against
//!   the master or a replica, transaction scopes, and one-shot queries
//! - **[`ClusterConfig`]** / **[`NodeConfig`]**: merged configuration — a
//!   common base overridden per field by the master and each replica entry
//! - **[`Conn`]**: handle a scope body uses to run statements on the one
//!   connection that scope owns
//! - **[`TxOutcome`]**: how a transactional body finishes (commit, or roll
//!   back without surfacing an error)
//! - **[`Error`]**: error type carrying the opening call site of the scope
//!   an error surfaced from
//!
//! ## Architecture
//!
//! - **One pool per node**: a pool cluster owns the master pool and every
//!   replica pool; replica scopes pick a pool by strategy (random by default)
//! - **Exactly-once release**: a scope exclusively owns its connection and
//!   returns it to the pool on every terminal path, success or failure
//! - **Atomic transactions**: transactional scopes bracket the body in
//!   BEGIN and COMMIT/ROLLBACK; commit failure is always surfaced
//! - **Origin tracking**: every scope records the line that opened it and
//!   reattaches it to errors that cross the asynchronous boundary

mod client;
mod cluster;
mod config;
mod conn;
mod decode;
mod error;
mod scope;

// Re-export public types
pub use client::Client;
pub use cluster::{ClusterStatus, PoolStatus, Role};
pub use config::{ClusterConfig, NodeConfig, ReplicaStrategy};
pub use conn::{Conn, ExecResult, Row};
pub use error::{Error, ErrorKind, Origin, Result};
pub use scope::TxOutcome;
