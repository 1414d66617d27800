//! # fleetsync Sync Server
//!
//! Handles the two messages edge nodes exchange with the control plane.
//!
//! This crate provides:
//! - `Report` handling: store the node's reported state and answer with the
//!   delta between its desire and what it runs
//! - `Desire` handling: resolve the configurations, secrets and applications
//!   a node references into their current content
//! - Encoded-message dispatch over the CBOR envelope
//!
//! # Protocol
//!
//! A node converges in two steps:
//! 1. It reports what it runs and gets back what to install, upgrade or remove
//! 2. It asks for the content of every record the new applications reference
//!
//! Resolution never fails because a referenced record disappeared: missing
//! records are simply absent from the reply.
//!
//! ```rust
//! use fleetsync_core::{ControlPlane, Node, Stores};
//! use fleetsync_protocol::{MessageMetadata, ReportPayload, SyncMessage};
//! use fleetsync_sync_server::{ServerConfig, SyncServer};
//! use std::sync::Arc;
//!
//! let stores = Stores::in_memory();
//! stores.nodes.create(Node::new("default", "edge-1")).unwrap();
//! let server = SyncServer::new(Arc::new(ControlPlane::new(stores)), ServerConfig::default());
//!
//! let report = SyncMessage::report(
//!     MessageMetadata::new("default", "edge-1"),
//!     &ReportPayload::default(),
//! )
//! .unwrap();
//! let reply = server.handle_message(&report.encode().unwrap()).unwrap();
//! assert!(!reply.is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::SyncServer;
