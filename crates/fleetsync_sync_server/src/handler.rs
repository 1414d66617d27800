//! Request handlers for the sync protocol.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use fleetsync_core::{update_with_retry, ControlPlane, CoreError, Node, ResourceStore};
use fleetsync_protocol::{
    encode, Delta, DesireRequest, DesireResponse, MessageMetadata, ReportPayload,
    ResolvedValue, ResourceReference,
};
use fleetsync_store::{ObjectKey, Resource, ResourceKind};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared state for request handlers.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Control plane owning the stores and index.
    pub plane: Arc<ControlPlane>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, plane: Arc<ControlPlane>) -> Self {
        Self { config, plane }
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Request handler for sync operations.
#[derive(Debug)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a report from `node`.
    ///
    /// Stores the report on the node record (unless disabled or unchanged)
    /// and answers with what the node still has to install, upgrade or
    /// remove. A node that reports exactly its desire gets an empty delta.
    ///
    /// # Errors
    ///
    /// Returns `UnknownNode` if the node has no record.
    pub fn handle_report(
        &self,
        namespace: &str,
        node: &str,
        payload: ReportPayload,
    ) -> ServerResult<Delta> {
        validate_names(namespace, node)?;
        let key = ObjectKey::new(namespace, node);
        let stores = self.context.plane.stores();

        let record = if self.context.config.store_reports {
            let stored = update_with_retry(&*stores.nodes, &key, &self.context.config.retry, |n| {
                if n.report.as_ref() == Some(&payload) {
                    return false;
                }
                n.report = Some(payload.clone());
                true
            });
            stored.map(|write| write.into_inner())
        } else {
            stores.nodes.get(&key).map_err(CoreError::from)
        };

        let record: Node = match record {
            Ok(record) => record,
            Err(CoreError::NotFound { .. }) => {
                return Err(ServerError::UnknownNode {
                    namespace: namespace.to_string(),
                    name: node.to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        };

        let delta = Delta::compute(
            &record.desire.system_apps,
            &record.desire.apps,
            &payload.system_apps,
            &payload.apps,
        );
        debug!(
            node = %key,
            upserts = delta.system.upsert.len() + delta.apps.upsert.len(),
            removals = delta.system.remove.len() + delta.apps.remove.len(),
            "report handled"
        );
        Ok(delta)
    }

    /// Handles a desire request from a node in `namespace`.
    ///
    /// Each reference resolves to the record's current version and encoded
    /// content. References to records that no longer exist are left out of
    /// the response.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an oversized request or a reference to a
    /// node, or a store error if a lookup fails for another reason.
    pub fn handle_desire(
        &self,
        namespace: &str,
        request: &DesireRequest,
        metadata: &MessageMetadata,
    ) -> ServerResult<DesireResponse> {
        if namespace.is_empty() {
            return Err(ServerError::InvalidRequest("namespace must not be empty".into()));
        }
        let max = self.context.config.max_desire_references;
        if request.references.len() > max {
            return Err(ServerError::InvalidRequest(format!(
                "{} references exceed the limit of {max}",
                request.references.len()
            )));
        }

        let mut response = DesireResponse::default();
        for reference in &request.references {
            match self.resolve(namespace, reference)? {
                Some(value) => response.values.push(value),
                None => debug!(
                    kind = %reference.kind,
                    name = %reference.name,
                    node = %metadata.name,
                    "reference no longer exists"
                ),
            }
        }

        info!(
            namespace,
            node = %metadata.name,
            requested = request.references.len(),
            resolved = response.values.len(),
            "desire handled"
        );
        Ok(response)
    }

    fn resolve(
        &self,
        namespace: &str,
        reference: &ResourceReference,
    ) -> ServerResult<Option<ResolvedValue>> {
        let key = ObjectKey::new(namespace, &reference.name);
        let stores = self.context.plane.stores();
        match reference.kind {
            ResourceKind::Application => lookup(&*stores.apps, &key),
            ResourceKind::Config => lookup(&*stores.configs, &key),
            ResourceKind::Secret => lookup(&*stores.secrets, &key),
            ResourceKind::Node => Err(ServerError::InvalidRequest(format!(
                "node {} cannot be resolved through desire",
                reference.name
            ))),
        }
    }
}

fn lookup<R: Resource + Serialize>(
    store: &dyn ResourceStore<R>,
    key: &ObjectKey,
) -> ServerResult<Option<ResolvedValue>> {
    let record = match store.get(key) {
        Ok(record) => record,
        Err(err) if err.is_not_found() => return Ok(None),
        Err(err) => return Err(CoreError::from(err).into()),
    };
    Ok(Some(ResolvedValue {
        kind: R::KIND,
        name: key.name.clone(),
        version: record.version().clone(),
        value: encode(&record)?,
    }))
}

fn validate_names(namespace: &str, node: &str) -> ServerResult<()> {
    if namespace.is_empty() || node.is_empty() {
        return Err(ServerError::InvalidRequest(
            "namespace and node name must not be empty".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_core::{Application, Config, Stores};
    use fleetsync_protocol::AppInfo;
    use fleetsync_store::Version;

    fn create_handler(config: ServerConfig) -> (Stores, RequestHandler) {
        let stores = Stores::in_memory();
        let plane = Arc::new(ControlPlane::new(stores.clone()));
        let context = Arc::new(HandlerContext::new(config, plane));
        (stores, RequestHandler::new(context))
    }

    fn node_with_desire(stores: &Stores) {
        let mut node = Node::new("default", "edge-1");
        node.desire.upsert(true, AppInfo::new("agent", 2u64));
        node.desire.upsert(false, AppInfo::new("web", 3u64));
        stores.nodes.create(node).unwrap();
    }

    #[test]
    fn report_returns_delta_and_stores_report() {
        let (stores, handler) = create_handler(ServerConfig::default());
        node_with_desire(&stores);

        let payload = ReportPayload::new(
            vec![AppInfo::new("agent", 2u64)],
            vec![AppInfo::new("web", 1u64), AppInfo::new("old", 1u64)],
        );
        let delta = handler
            .handle_report("default", "edge-1", payload.clone())
            .unwrap();

        assert!(delta.system.is_empty());
        assert_eq!(delta.apps.upsert, vec![AppInfo::new("web", 3u64)]);
        assert_eq!(delta.apps.remove, vec!["old".to_string()]);

        let node = stores.nodes.get(&ObjectKey::new("default", "edge-1")).unwrap();
        assert_eq!(node.report, Some(payload));
    }

    #[test]
    fn identical_report_does_not_write() {
        let (stores, handler) = create_handler(ServerConfig::default());
        node_with_desire(&stores);
        let payload = ReportPayload::default().with_telemetry("cpu", "12");

        handler
            .handle_report("default", "edge-1", payload.clone())
            .unwrap();
        let first = stores.nodes.get(&ObjectKey::new("default", "edge-1")).unwrap();
        handler.handle_report("default", "edge-1", payload).unwrap();
        let second = stores.nodes.get(&ObjectKey::new("default", "edge-1")).unwrap();

        assert_eq!(first.version, second.version);
    }

    #[test]
    fn report_without_storing() {
        let (stores, handler) = create_handler(ServerConfig::new().with_store_reports(false));
        node_with_desire(&stores);

        let delta = handler
            .handle_report("default", "edge-1", ReportPayload::default())
            .unwrap();
        assert_eq!(delta.upsert_for("agent"), Some(&AppInfo::new("agent", 2u64)));

        let node = stores.nodes.get(&ObjectKey::new("default", "edge-1")).unwrap();
        assert!(node.report.is_none());
    }

    #[test]
    fn report_from_unknown_node() {
        let (_, handler) = create_handler(ServerConfig::default());
        let err = handler
            .handle_report("default", "ghost", ReportPayload::default())
            .unwrap_err();
        assert!(matches!(err, ServerError::UnknownNode { .. }));

        let err = handler
            .handle_report("", "edge-1", ReportPayload::default())
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidRequest(_)));
    }

    #[test]
    fn desire_resolves_current_versions_and_omits_missing() {
        let (stores, handler) = create_handler(ServerConfig::default());
        let config = stores
            .configs
            .create(Config::new("default", "settings").with_data("level", "debug"))
            .unwrap();
        stores.configs.update(config).unwrap();
        stores
            .apps
            .create(Application::new("default", "web").with_selector("zone=a"))
            .unwrap();

        let request = DesireRequest::new(vec![
            ResourceReference::new(ResourceKind::Config, "settings", 1u64),
            ResourceReference::new(ResourceKind::Secret, "gone", 4u64),
            ResourceReference::new(ResourceKind::Application, "web", 1u64),
        ]);
        let response = handler
            .handle_desire("default", &request, &MessageMetadata::new("default", "edge-1"))
            .unwrap();

        assert_eq!(response.values.len(), 2);
        let settings = response.get(ResourceKind::Config, "settings").unwrap();
        assert_eq!(settings.version, Version::from_u64(2));
        let decoded: Config = settings.decode_value().unwrap();
        assert_eq!(decoded.data.get("level").map(String::as_str), Some("debug"));
        assert!(response.get(ResourceKind::Secret, "gone").is_none());
        assert!(response.get(ResourceKind::Application, "web").is_some());
    }

    #[test]
    fn desire_rejects_oversized_and_node_references() {
        let (_, handler) = create_handler(ServerConfig::new().with_max_desire_references(1));
        let metadata = MessageMetadata::new("default", "edge-1");

        let request = DesireRequest::new(vec![
            ResourceReference::new(ResourceKind::Config, "a", 1u64),
            ResourceReference::new(ResourceKind::Config, "b", 1u64),
        ]);
        let err = handler
            .handle_desire("default", &request, &metadata)
            .unwrap_err();
        assert!(err.is_client_error());

        let request = DesireRequest::new(vec![ResourceReference::new(
            ResourceKind::Node,
            "edge-2",
            1u64,
        )]);
        let err = handler
            .handle_desire("default", &request, &metadata)
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidRequest(_)));
    }
}
