// src/upstream/mod.rs

//! Clients for everything the proxy talks to on the far side: the origin
//! application server, the K/V store, and the relational database.

pub mod db;
pub mod kv;
pub mod origin;

pub use db::{Database, PgDatabase};
pub use kv::{KvPool, KvStore};
pub use origin::{HttpOrigin, Origin};
