//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use fleetsync_core::ControlPlane;
use fleetsync_protocol::{
    Delta, DesireRequest, DesireResponse, MessageKind, MessageMetadata, ReportPayload,
    SyncMessage, PROTOCOL_VERSION,
};
use std::sync::Arc;
use tracing::warn;

/// The sync server.
///
/// Answers `Report` and `Desire` messages from edge nodes against a shared
/// [`ControlPlane`]. The server holds no per-node session state: every
/// message is handled on its own.
///
/// # Example
///
/// ```
/// use fleetsync_core::{ControlPlane, Stores};
/// use fleetsync_sync_server::{ServerConfig, SyncServer};
/// use std::sync::Arc;
///
/// let plane = Arc::new(ControlPlane::new(Stores::in_memory()));
/// let server = SyncServer::new(plane, ServerConfig::default());
///
/// // A transport hands each received frame to server.handle_message()
/// // and sends back the bytes it returns.
/// assert_eq!(server.config().max_desire_references, 256);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(plane: Arc<ControlPlane>, config: ServerConfig) -> Self {
        let context = Arc::new(HandlerContext::new(config, plane));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the control plane this server answers from.
    pub fn plane(&self) -> &ControlPlane {
        &self.context.plane
    }

    /// Handles a report.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::handle_report`].
    pub fn handle_report(
        &self,
        metadata: &MessageMetadata,
        payload: ReportPayload,
    ) -> ServerResult<Delta> {
        self.handler
            .handle_report(&metadata.namespace, &metadata.name, payload)
    }

    /// Handles a desire request.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::handle_desire`].
    pub fn handle_desire(
        &self,
        metadata: &MessageMetadata,
        request: &DesireRequest,
    ) -> ServerResult<DesireResponse> {
        self.handler
            .handle_desire(&metadata.namespace, request, metadata)
    }

    /// Handles a decoded message (dispatches to the appropriate handler).
    ///
    /// The reply has the same kind as the request and echoes its metadata.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolMismatch` if the sender speaks another protocol
    /// version, or any handler error.
    pub fn dispatch(&self, message: SyncMessage) -> ServerResult<SyncMessage> {
        if message.protocol_version != PROTOCOL_VERSION {
            return Err(ServerError::ProtocolMismatch {
                expected: PROTOCOL_VERSION,
                actual: message.protocol_version,
            });
        }

        match message.kind {
            MessageKind::Report => {
                let payload: ReportPayload = message.content_as(MessageKind::Report)?;
                let delta = self.handle_report(&message.metadata, payload)?;
                Ok(SyncMessage::with_payload(
                    MessageKind::Report,
                    message.metadata,
                    &delta,
                )?)
            }
            MessageKind::Desire => {
                let request: DesireRequest = message.content_as(MessageKind::Desire)?;
                let response = self.handle_desire(&message.metadata, &request)?;
                Ok(SyncMessage::with_payload(
                    MessageKind::Desire,
                    message.metadata,
                    &response,
                )?)
            }
        }
    }

    /// Handles an encoded message and returns the encoded reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid message or handling
    /// fails.
    pub fn handle_message(&self, bytes: &[u8]) -> ServerResult<Vec<u8>> {
        let message = SyncMessage::decode(bytes)?;
        let kind = message.kind;
        let node = format!("{}/{}", message.metadata.namespace, message.metadata.name);
        let reply = self.dispatch(message).inspect_err(|err| {
            if err.is_server_error() {
                warn!(%kind, %node, error = %err, "sync message failed");
            }
        })?;
        Ok(reply.encode()?)
    }
}

impl std::fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("config", &self.context.config)
            .finish_non_exhaustive()
    }
}
