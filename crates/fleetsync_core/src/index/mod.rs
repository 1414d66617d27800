//! Relationship indexes.
//!
//! The index answers three questions without scanning the store:
//! which nodes run an application, and which applications reference a
//! configuration or a secret. It is derived state: every entry can be
//! rebuilt from node desires and application volumes.
//!
//! # Components
//!
//! - [`IndexEngine`]: The three relationship maps plus the reverse
//!   application → references map that keeps them in sync
//! - [`KeyedLocks`]: Per-key write serialization
//!
//! Maps are split into FNV-1a hashed shards so writers on different keys
//! rarely contend.

mod engine;
mod locks;
mod shard;

pub use engine::IndexEngine;
pub use locks::KeyedLocks;
