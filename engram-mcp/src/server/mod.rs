//! The tool dispatcher.
//!
//! Parses the tool-call envelope, enforces scope rules, validates
//! parameters against the registry's schema, routes to the owning
//! domain, and wraps results in a uniform envelope.

pub mod registry;
pub mod schemas;
pub mod validate;

pub use registry::{OperationCall, OperationRegistry};

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use engram_core::audit::{AuditConfig, AuditLogger, AuditOutput};
use engram_core::config::EngramConfig;
use engram_core::embeddings::EmbeddingService;
use engram_core::engine::MemoryEngine;
use engram_core::error::{Error, Result};
use engram_core::events::EventBus;
use engram_core::health::{ComponentHealth, SystemHealth};
use engram_core::intelligence::IntelligenceService;
use engram_core::metadata::{MemoryMetadataStore, MetadataStore};
use engram_core::reliability::{Dependency, ReliabilityManager};
use engram_core::session::SessionManager;
use engram_core::types::{AuditEvent, Scope};
use engram_core::vector::{InMemoryVectorIndex, ResilientVectorStore, VectorStore};

use crate::jsonrpc::{
    INVALID_REQUEST, JsonRpcError, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND,
};
use crate::protocol;

/// Deadline for dependency health probes.
const HEALTH_PROBE_DEADLINE: Duration = Duration::from_secs(2);

/// Shared server state handed to operation handlers.
pub struct ServerState {
    pub engine: Arc<MemoryEngine>,
    pub intelligence: Arc<IntelligenceService>,
    pub sessions: SessionManager,
    pub audit: AuditLogger,
}

impl ServerState {
    /// Aggregate health: worst of the three dependencies plus breakers.
    pub async fn system_health(&self) -> SystemHealth {
        let mut health = SystemHealth::new();

        health.record(
            "embedding",
            self.engine.embeddings().check(HEALTH_PROBE_DEADLINE).await,
        );

        let vectors = self.engine.vectors();
        let vector_health =
            match tokio::time::timeout(HEALTH_PROBE_DEADLINE, vectors.ping()).await {
                Ok(Ok(())) => ComponentHealth::Healthy,
                Ok(Err(_)) => ComponentHealth::Unhealthy,
                Err(_) => ComponentHealth::Degraded,
            };
        health.record("vector_store", vector_health);

        let metadata = self.engine.metadata();
        let metadata_health =
            match tokio::time::timeout(HEALTH_PROBE_DEADLINE, metadata.ping()).await {
                Ok(Ok(())) => ComponentHealth::Healthy,
                Ok(Err(_)) => ComponentHealth::Unhealthy,
                Err(_) => ComponentHealth::Degraded,
            };
        health.record("metadata", metadata_health);

        let breakers = if self.engine.reliability().all_closed() {
            ComponentHealth::Healthy
        } else {
            ComponentHealth::Degraded
        };
        health.record("circuit_breakers", breakers);
        health
    }
}

/// The MCP server: registry plus shared state.
pub struct EngramMcpServer {
    state: Arc<ServerState>,
    registry: OperationRegistry,
}

impl EngramMcpServer {
    /// Build a server on in-memory backends from configuration alone.
    pub fn new(config: EngramConfig) -> Result<Self> {
        config.validate()?;
        let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let vectors: Arc<dyn VectorStore> = Arc::new(InMemoryVectorIndex::new());
        Self::with_backends(config, metadata, vectors)
    }

    /// Build a server over caller-supplied storage backends.
    pub fn with_backends(
        config: EngramConfig,
        metadata: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let reliability = Arc::new(ReliabilityManager::new(&config.reliability));
        let embeddings = Arc::new(EmbeddingService::from_settings(
            &config.embedding,
            reliability.breaker(Dependency::Embedding),
            reliability.retry_config(),
        ));
        let vectors: Arc<dyn VectorStore> = Arc::new(ResilientVectorStore::new(
            vectors,
            &config.vector_store,
            reliability.breaker(Dependency::VectorStore),
            reliability.retry_config(),
        ));
        let events = EventBus::default();
        let audit = AuditLogger::new(AuditConfig {
            output: AuditOutput::Stderr,
            ..AuditConfig::default()
        });

        let intelligence = Arc::new(IntelligenceService::new(
            config.intelligence.clone(),
            config.decay.clone(),
            Arc::clone(&metadata),
            Arc::clone(&vectors),
            events.clone(),
        ));
        intelligence.start();

        let engine = Arc::new(MemoryEngine::new(
            config,
            embeddings,
            vectors,
            Arc::clone(&metadata),
            events.clone(),
            reliability,
            AuditLogger::disabled(),
        ));
        let sessions = SessionManager::new(metadata, events);

        Ok(Self::from_parts(engine, intelligence, sessions, audit))
    }

    /// Assemble a server from pre-built components; tests use this to
    /// inject mock providers and backends.
    #[must_use]
    pub fn from_parts(
        engine: Arc<MemoryEngine>,
        intelligence: Arc<IntelligenceService>,
        sessions: SessionManager,
        audit: AuditLogger,
    ) -> Self {
        Self {
            state: Arc::new(ServerState {
                engine,
                intelligence,
                sessions,
                audit,
            }),
            registry: OperationRegistry::standard(),
        }
    }

    #[must_use]
    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    #[must_use]
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Dispatch one tool call: envelope parse → scope check → schema
    /// validation → handler → uniform result envelope.
    pub async fn call_tool(&self, tool: &str, arguments: &Value) -> Result<Value> {
        let operation = arguments
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidParams {
                path: "operation".into(),
                message: "required field is missing".into(),
            })?;

        let spec = self.registry.get(tool, operation).ok_or_else(|| {
            Error::InvalidParams {
                path: "operation".into(),
                message: format!("unknown operation '{operation}' for tool '{tool}'"),
            }
        })?;

        // Admission control: shed load while breakers reject or the
        // service is shutting down. Health stays reachable for probes.
        if operation != "check_system_health" {
            self.state.engine.reliability().admit()?;
        }

        let call = parse_call(operation, arguments)?;
        enforce_scope(spec.scope, &call)?;
        validate::validate(&(spec.schema)(), &call.params, "parameters")?;
        validate::validate_epoch_window(&call.params, "parameters")?;

        debug!(tool, operation, project_id = ?call.project_id, "dispatching");
        let outcome = (spec.handler)(Arc::clone(&self.state), call.clone()).await;

        self.state.audit.log(
            AuditEvent::now("dispatcher", operation, call.project_id.as_deref().unwrap_or("-"))
                .with_success(outcome.is_ok()),
        );

        match outcome {
            Ok(data) => Ok(json!({
                "success": true,
                "operation": operation,
                "data": data
            })),
            Err(e) => {
                warn!(tool, operation, error = %e, "operation failed");
                Err(e)
            }
        }
    }

    /// Handle one parsed JSON-RPC request. Returns `None` for
    /// notifications.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        match request.method.as_str() {
            "initialize" => protocol::handle_initialize(&request),
            "shutdown" => protocol::handle_shutdown(&request),
            "tools/list" => {
                protocol::handle_list_tools(&request, self.registry.tool_descriptors())
            }
            "resources/list" => protocol::handle_list_resources(&request, &[]),
            "tools/call" => {
                let id = request.id.clone();
                id.as_ref()?;
                let params = request.params.unwrap_or(Value::Null);
                let Some(name) = params.get("name").and_then(Value::as_str) else {
                    return Some(JsonRpcResponse::failure(
                        id,
                        JsonRpcError::new(INVALID_REQUEST, "tools/call requires params.name"),
                    ));
                };
                let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
                match self.call_tool(name, &arguments).await {
                    Ok(result) => Some(JsonRpcResponse::success(id, result)),
                    Err(e) => Some(JsonRpcResponse::failure(id, JsonRpcError::from(&e))),
                }
            }
            other => {
                let id = request.id.clone();
                id.as_ref()?;
                Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(METHOD_NOT_FOUND, format!("unknown method '{other}'")),
                ))
            }
        }
    }
}

fn parse_call(operation: &str, arguments: &Value) -> Result<OperationCall> {
    let project_id = arguments
        .get("project_id")
        .and_then(Value::as_str)
        .map(String::from);
    if let Some(project_id) = &project_id {
        engram_core::types::validate_project_id(project_id)?;
    }
    let session_id = arguments
        .get("session_id")
        .and_then(Value::as_str)
        .map(String::from);
    let params = arguments.get("parameters").cloned().unwrap_or(json!({}));
    if !params.is_object() {
        return Err(Error::InvalidParams {
            path: "parameters".into(),
            message: "expected object".into(),
        });
    }
    Ok(OperationCall {
        operation: operation.to_string(),
        project_id,
        session_id,
        params,
    })
}

fn enforce_scope(scope: Scope, call: &OperationCall) -> Result<()> {
    match scope {
        Scope::Session => {
            if call.project_id.is_none() {
                return Err(Error::InvalidParams {
                    path: "project_id".into(),
                    message: "required for session-scoped operations".into(),
                });
            }
            if call.session_id.is_none() {
                return Err(Error::InvalidScope(call.operation.clone()));
            }
            Ok(())
        }
        Scope::Project => {
            if call.project_id.is_none() {
                return Err(Error::InvalidParams {
                    path: "project_id".into(),
                    message: "required for project-scoped operations".into(),
                });
            }
            Ok(())
        }
        Scope::Global => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_session_requires_both_identifiers() {
        let call = OperationCall {
            operation: "store_content".into(),
            project_id: Some("acme/api".into()),
            session_id: None,
            params: json!({}),
        };
        let err = enforce_scope(Scope::Session, &call).expect_err("no session");
        assert_eq!(err.code(), "invalid_scope");
        assert!(err.to_string().contains("expands access"));

        let call = OperationCall {
            session_id: Some("s1".into()),
            ..call
        };
        assert!(enforce_scope(Scope::Session, &call).is_ok());
    }

    #[test]
    fn scope_project_tolerates_missing_session() {
        let call = OperationCall {
            operation: "search_content".into(),
            project_id: Some("acme/api".into()),
            session_id: None,
            params: json!({}),
        };
        assert!(enforce_scope(Scope::Project, &call).is_ok());
    }

    #[test]
    fn scope_global_needs_nothing() {
        let call = OperationCall {
            operation: "check_system_health".into(),
            project_id: None,
            session_id: None,
            params: json!({}),
        };
        assert!(enforce_scope(Scope::Global, &call).is_ok());
    }
}
