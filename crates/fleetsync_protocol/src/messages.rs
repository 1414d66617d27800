//! Protocol messages for node sync.

use crate::codec::{decode, encode};
use crate::delta::AppInfo;
use crate::error::{ProtocolError, ProtocolResult};
use fleetsync_store::{ResourceKind, Version};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: u16 = 1;

/// Kind of a sync message.
///
/// A node sends a `Report` and gets a `Report` back carrying its delta; it
/// sends a `Desire` and gets a `Desire` back carrying resolved values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Node state report / delta reply.
    Report,
    /// Reference resolution request / reply.
    Desire,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Report => f.write_str("report"),
            MessageKind::Desire => f.write_str("desire"),
        }
    }
}

/// Routing metadata carried by every message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Namespace of the node.
    pub namespace: String,
    /// Name of the node.
    pub name: String,
    /// Free-form transport metadata, echoed back untouched.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl MessageMetadata {
    /// Creates metadata for a node.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Adds a transport metadata entry.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A sync protocol message.
///
/// The content is an encoded payload whose type is implied by `kind` and
/// direction; the envelope itself never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
    /// Message kind.
    pub kind: MessageKind,
    /// Protocol version of the sender.
    pub protocol_version: u16,
    /// Routing metadata.
    pub metadata: MessageMetadata,
    /// Encoded payload.
    pub content: Vec<u8>,
}

impl SyncMessage {
    /// Creates a message with an already-encoded payload.
    pub fn new(kind: MessageKind, metadata: MessageMetadata, content: Vec<u8>) -> Self {
        Self {
            kind,
            protocol_version: PROTOCOL_VERSION,
            metadata,
            content,
        }
    }

    /// Creates a message by encoding `payload`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded.
    pub fn with_payload<T: Serialize>(
        kind: MessageKind,
        metadata: MessageMetadata,
        payload: &T,
    ) -> ProtocolResult<Self> {
        Ok(Self::new(kind, metadata, encode(payload)?))
    }

    /// Creates a report message.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded.
    pub fn report(metadata: MessageMetadata, payload: &ReportPayload) -> ProtocolResult<Self> {
        Self::with_payload(MessageKind::Report, metadata, payload)
    }

    /// Creates a desire message.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded.
    pub fn desire(metadata: MessageMetadata, request: &DesireRequest) -> ProtocolResult<Self> {
        Self::with_payload(MessageKind::Desire, metadata, request)
    }

    /// Decodes the content as `T`, checking the kind first.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedKind` if the kind differs, or a decoding error.
    pub fn content_as<T: DeserializeOwned>(&self, expected: MessageKind) -> ProtocolResult<T> {
        if self.kind != expected {
            return Err(ProtocolError::UnexpectedKind {
                expected: expected.to_string(),
                actual: self.kind.to_string(),
            });
        }
        decode(&self.content)
    }

    /// Encodes the whole message to CBOR.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode(self)
    }

    /// Decodes a whole message from CBOR.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid message.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode(bytes)
    }
}

/// State a node reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPayload {
    /// System applications the node observes running.
    #[serde(default)]
    pub system_apps: Vec<AppInfo>,
    /// User applications the node observes running.
    #[serde(default)]
    pub apps: Vec<AppInfo>,
    /// Node telemetry (resource usage, agent version, ...). Opaque to the cloud.
    #[serde(default)]
    pub telemetry: BTreeMap<String, String>,
}

impl ReportPayload {
    /// Creates a report from the two application lists.
    pub fn new(system_apps: Vec<AppInfo>, apps: Vec<AppInfo>) -> Self {
        Self {
            system_apps,
            apps,
            telemetry: BTreeMap::new(),
        }
    }

    /// Adds a telemetry entry.
    pub fn with_telemetry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.telemetry.insert(key.into(), value.into());
        self
    }
}

/// A resource a node wants the content of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReference {
    /// Kind of the resource.
    pub kind: ResourceKind,
    /// Name of the resource, in the node's namespace.
    pub name: String,
    /// Version the node knows about (possibly stale).
    pub version: Version,
}

impl ResourceReference {
    /// Creates a new reference.
    pub fn new(kind: ResourceKind, name: impl Into<String>, version: impl Into<Version>) -> Self {
        Self {
            kind,
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Desire request: references to resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesireRequest {
    /// References the node does not hold, or holds an older version of.
    pub references: Vec<ResourceReference>,
}

impl DesireRequest {
    /// Creates a new request.
    pub fn new(references: Vec<ResourceReference>) -> Self {
        Self { references }
    }
}

/// A resolved reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedValue {
    /// Kind of the resource.
    pub kind: ResourceKind,
    /// Name of the resource.
    pub name: String,
    /// Current version of the resource.
    pub version: Version,
    /// Encoded resource content.
    pub value: Vec<u8>,
}

impl ResolvedValue {
    /// Decodes the resolved content.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not a valid `T`.
    pub fn decode_value<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        decode(&self.value)
    }
}

/// Desire response: resolved values.
///
/// References to resources that no longer exist are absent, not errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesireResponse {
    /// Resolved values, in request order.
    pub values: Vec<ResolvedValue>,
}

impl DesireResponse {
    /// Finds a resolved value by kind and name.
    #[must_use]
    pub fn get(&self, kind: ResourceKind, name: &str) -> Option<&ResolvedValue> {
        self.values.iter().find(|v| v.kind == kind && v.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_message_roundtrip() {
        let payload = ReportPayload::new(
            vec![AppInfo::new("agent", 2u64)],
            vec![AppInfo::new("web", 7u64)],
        )
        .with_telemetry("cpu", "0.25");
        let msg = SyncMessage::report(MessageMetadata::new("default", "edge-1"), &payload).unwrap();

        let decoded = SyncMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        let back: ReportPayload = decoded.content_as(MessageKind::Report).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn content_kind_is_checked() {
        let msg = SyncMessage::desire(
            MessageMetadata::new("default", "edge-1"),
            &DesireRequest::default(),
        )
        .unwrap();
        let err = msg.content_as::<ReportPayload>(MessageKind::Report).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedKind { .. }));
    }

    #[test]
    fn metadata_extra_survives() {
        let meta = MessageMetadata::new("ns", "n").with_extra("trace-id", "abc");
        let msg = SyncMessage::desire(meta.clone(), &DesireRequest::default()).unwrap();
        let decoded = SyncMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.metadata, meta);
        assert_eq!(decoded.protocol_version, PROTOCOL_VERSION);
    }

    #[test]
    fn desire_response_lookup() {
        let response = DesireResponse {
            values: vec![ResolvedValue {
                kind: ResourceKind::Config,
                name: "settings".into(),
                version: Version::from_u64(3),
                value: encode(&"payload").unwrap(),
            }],
        };
        let found = response.get(ResourceKind::Config, "settings").unwrap();
        assert_eq!(found.decode_value::<String>().unwrap(), "payload");
        assert!(response.get(ResourceKind::Secret, "settings").is_none());
    }
}
