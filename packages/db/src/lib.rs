//! Job persistence for the job queue system.
//!
//! This crate provides the [`JobStore`] contract and two implementations:
//! an in-memory store and a SurrealDB-backed one.
//!
//! # Features
//!
//! - `memory` (default): SurrealDB in-memory engine
//! - `rocksdb`: RocksDB for persistent file-based storage

mod connection;
mod memory;
mod schema;
mod store;
mod surreal;

pub use connection::{Database, DbConfig, connect_db};
pub use memory::MemoryJobStore;
pub use schema::init_schema;
pub use store::{JobStore, StoreError};
pub use surreal::SurrealJobStore;
