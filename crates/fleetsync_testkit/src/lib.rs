//! # fleetsync Testkit
//!
//! Test utilities for fleetsync.
//!
//! This crate provides:
//! - A fleet fixture that drives the control plane the way the API layer does
//! - A fault-injecting store for cleanup and retry paths
//! - Property-based generators for labels, selectors, fleets and operations
//!
//! ## Usage
//!
//! ```rust
//! use fleetsync_testkit::prelude::*;
//!
//! let fleet = TestFleet::new();
//! fleet.add_node("edge-1", &[("zone", "a")]);
//! let _ = fleet.put_app(Application::new(TEST_NAMESPACE, "web").with_selector("zone=a"));
//!
//! assert_eq!(fleet.nodes_for("web"), vec!["edge-1".to_string()]);
//! fleet.assert_consistent();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use fleetsync_core::{
        Application, Config, ControlPlane, Node, ReferenceKind, Secret, Stores, Volume,
    };
    pub use fleetsync_protocol::AppInfo;
    pub use fleetsync_store::{ObjectKey, ResourceStore, Version};
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
