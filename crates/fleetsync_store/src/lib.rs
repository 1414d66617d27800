//! # fleetsync Store
//!
//! Versioned resource store contract for fleetsync.
//!
//! This crate provides the persistence boundary the control plane is written
//! against. Stores are **per-kind, per-key strongly consistent** record maps
//! with optimistic versioning; they know nothing about selectors, indexes or
//! cascades.
//!
//! ## Design Principles
//!
//! - Every write stamps a fresh [`Version`] on the record
//! - Updates are conditional on the caller's version (compare-and-swap)
//! - No cross-key transactions
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For tests, the CLI and embedded use
//!
//! ## Example
//!
//! ```rust
//! use fleetsync_store::{InMemoryStore, ObjectKey, Resource, ResourceKind, ResourceStore, Version};
//!
//! #[derive(Clone, Debug)]
//! struct Blob {
//!     key: ObjectKey,
//!     version: Version,
//! }
//!
//! impl Resource for Blob {
//!     const KIND: ResourceKind = ResourceKind::Config;
//!     fn key(&self) -> ObjectKey { self.key.clone() }
//!     fn version(&self) -> &Version { &self.version }
//!     fn set_version(&mut self, version: Version) { self.version = version; }
//! }
//!
//! let store = InMemoryStore::new();
//! let created = store
//!     .create(Blob { key: ObjectKey::new("default", "a"), version: Version::default() })
//!     .unwrap();
//! assert_eq!(created.version().as_str(), "1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod key;
mod memory;
mod resource;
mod version;

pub use error::{StoreError, StoreResult};
pub use key::{ObjectKey, ResourceKind};
pub use memory::InMemoryStore;
pub use resource::{Resource, ResourceStore};
pub use version::Version;
