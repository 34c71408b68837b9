//! Static operation registry.
//!
//! Each of the four tools owns a table mapping operation name to handler,
//! parameter schema, and declared scope; dispatch and validation consult
//! only this table. No reflective routing.

use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use engram_core::Result;
use engram_core::types::Scope;

use super::ServerState;
use super::schemas;
use crate::protocol::ToolDescriptor;
use crate::tools::{analyze, retrieve, store, system};

/// The four public tools.
pub const TOOL_MEMORY_STORE: &str = "memory_store";
pub const TOOL_MEMORY_RETRIEVE: &str = "memory_retrieve";
pub const TOOL_MEMORY_ANALYZE: &str = "memory_analyze";
pub const TOOL_MEMORY_SYSTEM: &str = "memory_system";

/// All tool names, in listing order.
pub const TOOL_NAMES: [&str; 4] = [
    TOOL_MEMORY_STORE,
    TOOL_MEMORY_RETRIEVE,
    TOOL_MEMORY_ANALYZE,
    TOOL_MEMORY_SYSTEM,
];

/// One dispatched tool call, after envelope parsing.
#[derive(Debug, Clone)]
pub struct OperationCall {
    pub operation: String,
    pub project_id: Option<String>,
    pub session_id: Option<String>,
    pub params: Value,
}

impl OperationCall {
    /// The project id, guaranteed present by the scope check for
    /// project- and session-scoped operations.
    pub fn project(&self) -> Result<&str> {
        self.project_id
            .as_deref()
            .ok_or_else(|| engram_core::Error::InvalidParams {
                path: "project_id".into(),
                message: "required for this operation".into(),
            })
    }
}

/// Handler signature: owned call data, boxed future.
pub type Handler = fn(Arc<ServerState>, OperationCall) -> BoxFuture<'static, Result<Value>>;

/// One registry entry.
pub struct OperationSpec {
    pub name: &'static str,
    pub tool: &'static str,
    pub scope: Scope,
    pub schema: fn() -> Value,
    pub handler: Handler,
}

/// The static operation table.
pub struct OperationRegistry {
    operations: HashMap<&'static str, OperationSpec>,
}

impl OperationRegistry {
    /// Build the standard four-tool registry.
    #[must_use]
    pub fn standard() -> Self {
        let mut operations = HashMap::new();
        let specs = [
            // memory_store: writes, session scope
            entry(TOOL_MEMORY_STORE, "store_content", Scope::Session, schemas::store_content, store::store_content),
            entry(TOOL_MEMORY_STORE, "store_decision", Scope::Session, schemas::store_decision, store::store_decision),
            entry(TOOL_MEMORY_STORE, "update_existing_content", Scope::Session, schemas::update_existing_content, store::update_existing_content),
            entry(TOOL_MEMORY_STORE, "delete_content", Scope::Session, schemas::delete_content, store::delete_content),
            entry(TOOL_MEMORY_STORE, "expire_stale_content", Scope::Session, schemas::expire_stale_content, store::expire_stale_content),
            entry(TOOL_MEMORY_STORE, "create_thread", Scope::Session, schemas::create_thread, store::create_thread),
            entry(TOOL_MEMORY_STORE, "create_relationship", Scope::Session, schemas::create_relationship, store::create_relationship),
            // memory_retrieve: reads, project scope
            entry(TOOL_MEMORY_RETRIEVE, "search_content", Scope::Project, schemas::search_content, retrieve::search_content),
            entry(TOOL_MEMORY_RETRIEVE, "get_content_by_id", Scope::Project, schemas::get_content_by_id, retrieve::get_content_by_id),
            entry(TOOL_MEMORY_RETRIEVE, "find_similar_content", Scope::Project, schemas::find_similar_content, retrieve::find_similar_content),
            entry(TOOL_MEMORY_RETRIEVE, "get_content_history", Scope::Project, schemas::get_content_history, retrieve::get_content_history),
            entry(TOOL_MEMORY_RETRIEVE, "get_threads", Scope::Project, schemas::get_threads, retrieve::get_threads),
            entry(TOOL_MEMORY_RETRIEVE, "get_relationships", Scope::Project, schemas::get_relationships, retrieve::get_relationships),
            // memory_analyze: derived state, project scope
            entry(TOOL_MEMORY_ANALYZE, "detect_content_patterns", Scope::Project, schemas::detect_content_patterns, analyze::detect_content_patterns),
            entry(TOOL_MEMORY_ANALYZE, "analyze_content_quality", Scope::Project, schemas::analyze_content_quality, analyze::analyze_content_quality),
            entry(TOOL_MEMORY_ANALYZE, "find_content_relationships", Scope::Project, schemas::find_content_relationships, analyze::find_content_relationships),
            entry(TOOL_MEMORY_ANALYZE, "generate_content_insights", Scope::Project, schemas::generate_content_insights, analyze::generate_content_insights),
            entry(TOOL_MEMORY_ANALYZE, "detect_conflicts", Scope::Project, schemas::detect_conflicts, analyze::detect_conflicts),
            entry(TOOL_MEMORY_ANALYZE, "suggest_related_content", Scope::Project, schemas::suggest_related_content, analyze::suggest_related_content),
            // memory_system: global scope
            entry(TOOL_MEMORY_SYSTEM, "check_system_health", Scope::Global, schemas::check_system_health, system::check_system_health),
            entry(TOOL_MEMORY_SYSTEM, "export_project_data", Scope::Global, schemas::export_project_data, system::export_project_data),
            entry(TOOL_MEMORY_SYSTEM, "import_project_data", Scope::Global, schemas::import_project_data, system::import_project_data),
            entry(TOOL_MEMORY_SYSTEM, "validate_data_integrity", Scope::Global, schemas::validate_data_integrity, system::validate_data_integrity),
            entry(TOOL_MEMORY_SYSTEM, "generate_citation", Scope::Global, schemas::generate_citation, system::generate_citation),
        ];
        for spec in specs {
            operations.insert(spec.name, spec);
        }
        Self { operations }
    }

    /// Look up an operation within a tool.
    #[must_use]
    pub fn get(&self, tool: &str, operation: &str) -> Option<&OperationSpec> {
        self.operations
            .get(operation)
            .filter(|spec| spec.tool == tool)
    }

    /// Operation names owned by one tool, sorted.
    #[must_use]
    pub fn operations_for(&self, tool: &str) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .operations
            .values()
            .filter(|spec| spec.tool == tool)
            .map(|spec| spec.name)
            .collect();
        names.sort_unstable();
        names
    }

    /// Total registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Tool descriptors for tools/list, with per-operation parameter
    /// schemas inlined.
    #[must_use]
    pub fn tool_descriptors(&self) -> Vec<ToolDescriptor> {
        TOOL_NAMES
            .iter()
            .map(|tool| {
                let operations = self.operations_for(tool);
                let parameter_schemas: serde_json::Map<String, Value> = self
                    .operations
                    .values()
                    .filter(|spec| spec.tool == *tool)
                    .map(|spec| (spec.name.to_string(), (spec.schema)()))
                    .collect();
                ToolDescriptor {
                    name: (*tool).to_string(),
                    description: tool_description(tool).to_string(),
                    input_schema: json!({
                        "type": "object",
                        "required": ["operation"],
                        "properties": {
                            "operation": { "type": "string", "enum": operations },
                            "project_id": { "type": "string" },
                            "session_id": { "type": "string" },
                            "parameters": {
                                "type": "object",
                                "description": "Operation-specific payload; see operationSchemas",
                            }
                        },
                        "operationSchemas": parameter_schemas
                    }),
                }
            })
            .collect()
    }
}

fn entry(
    tool: &'static str,
    name: &'static str,
    scope: Scope,
    schema: fn() -> Value,
    handler: Handler,
) -> OperationSpec {
    OperationSpec {
        name,
        tool,
        scope,
        schema,
        handler,
    }
}

fn tool_description(tool: &str) -> &'static str {
    match tool {
        TOOL_MEMORY_STORE => "Persist conversational memory: store, update, delete, expire, and link chunks",
        TOOL_MEMORY_RETRIEVE => "Retrieve memory: semantic search, lookups, history, threads, and relationships",
        TOOL_MEMORY_ANALYZE => "Analyze memory: patterns, quality, insights, conflicts, and suggestions",
        _ => "System operations: health, export/import, integrity, citations",
    }
}
