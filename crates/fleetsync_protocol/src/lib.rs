//! # fleetsync Sync Protocol
//!
//! Report/Desire protocol types and CBOR codecs for fleetsync.
//!
//! This crate provides:
//! - `AppInfo`, the `{name, version}` pair nodes and the cloud exchange
//! - Report payloads and the `Delta` the cloud answers with
//! - Desire requests (references to resolve) and responses (resolved values)
//! - The `SyncMessage` envelope and its CBOR encoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod codec;
mod delta;
mod error;
mod messages;

pub use codec::{decode, encode};
pub use delta::{AppDelta, AppInfo, Delta};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    DesireRequest, DesireResponse, MessageKind, MessageMetadata, ReportPayload, ResolvedValue,
    ResourceReference, SyncMessage, PROTOCOL_VERSION,
};
