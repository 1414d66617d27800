//! # fleetsync Core
//!
//! Resource reconciliation and referential-integrity engine for fleetsync.
//!
//! This crate provides:
//! - The data model (nodes, applications, configurations, secrets)
//! - Label selectors, parsed once per application write
//! - The Index Engine (application → nodes, config/secret → applications)
//! - The Assignment Engine (selector placement into node desire)
//! - The Cascading Consistency Engine (version propagation, delete guards,
//!   node-deletion cleanup)
//! - The [`ControlPlane`] facade the API layer calls after every mutation
//!
//! ## Key Invariants
//!
//! - A volume reference never moves to an older version
//! - A configuration/secret with dependents cannot be deleted
//! - The app → node index never claims a node whose desire lacks the app
//! - Cascade failures never roll back the write that triggered them
//!
//! ## Example
//!
//! ```rust
//! use fleetsync_core::{Application, ControlPlane, Node, Stores};
//!
//! let stores = Stores::in_memory();
//! stores.nodes.create(Node::new("default", "edge-1").with_label("zone", "a")).unwrap();
//! let app = stores
//!     .apps
//!     .create(Application::new("default", "web").with_selector("zone=a"))
//!     .unwrap();
//!
//! let plane = ControlPlane::new(stores);
//! plane.on_application_write(&app, None).unwrap();
//! assert_eq!(plane.list_nodes_for_app("default", "web"), vec!["edge-1".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod assign;
mod cascade;
mod config;
mod control;
mod error;
mod index;
mod model;
mod outcome;
mod reconcile;
mod retry;
mod selector;
mod snapshot;
mod stores;

pub use assign::{Assignment, AssignmentEngine};
pub use cascade::{CascadeEngine, CascadeReport, NodeCleanup};
pub use config::EngineConfig;
pub use control::ControlPlane;
pub use error::{CoreError, CoreResult};
pub use index::{IndexEngine, KeyedLocks};
pub use model::{
    Application, Config, Node, NodeDesire, ObjectRef, ReferenceKind, Secret, SecretLabel, Volume,
    VolumeSource, NODE_NAME_LABEL,
};
pub use outcome::{CascadeWarning, Outcome};
pub use reconcile::{Inconsistency, ReconcileReport};
pub use retry::{retry_on_conflict, update_with_retry, RetryConfig, Write};
pub use selector::{Requirement, Selector};
pub use snapshot::FleetSnapshot;
pub use stores::Stores;

pub use fleetsync_protocol::AppInfo;
pub use fleetsync_store::{ObjectKey, Resource, ResourceKind, ResourceStore, Version};
