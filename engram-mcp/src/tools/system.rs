//! `memory_system` operations.

use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::sync::Arc;

use engram_core::engine::{OpContext, ProjectExport};
use engram_core::error::{Error, Result};

use super::{required_str, required_uuid};
use crate::server::{OperationCall, ServerState};

pub fn check_system_health(
    state: Arc<ServerState>,
    _call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let health = state.system_health().await;
        Ok(json!({
            "overall": health.overall(),
            "ready": health.ready(),
            "alive": true,
            "components": health.components,
        }))
    })
}

pub fn export_project_data(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let project_id = required_str(&call.params, "project_id")?;
        let export = state.engine.export_project(project_id).await?;
        serde_json::to_value(export).map_err(Into::into)
    })
}

pub fn import_project_data(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let project_id = required_str(&call.params, "project_id")?.to_string();
        let data = call
            .params
            .get("data")
            .cloned()
            .ok_or_else(|| Error::InvalidParams {
                path: "parameters.data".into(),
                message: "required field is missing".into(),
            })?;
        let export: ProjectExport =
            serde_json::from_value(data).map_err(|e| Error::InvalidParams {
                path: "parameters.data".into(),
                message: format!("not a valid project export: {e}"),
            })?;
        let imported = state
            .engine
            .import_project(&project_id, export, &OpContext::new())
            .await?;
        Ok(json!({ "project_id": project_id, "imported": imported }))
    })
}

pub fn validate_data_integrity(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let project_id = required_str(&call.params, "project_id")?;
        let repair = call
            .params
            .get("repair")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let report = state
            .engine
            .validate_integrity(project_id, repair, &OpContext::new())
            .await?;
        serde_json::to_value(report).map_err(Into::into)
    })
}

pub fn generate_citation(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let project_id = required_str(&call.params, "project_id")?;
        let chunk_id = required_uuid(&call.params, "chunk_id")?;
        let chunk = state.engine.get_chunk(project_id, chunk_id, None).await?;

        let citation = format!(
            "[{}] {} — {} ({}, {})",
            chunk.id,
            chunk.summary,
            chunk.project_id,
            chunk.chunk_type,
            chunk.created_at.format("%Y-%m-%d"),
        );
        Ok(json!({
            "chunk_id": chunk.id,
            "citation": citation,
            "uri": format!("memory://projects/{}/chunks/{}", chunk.project_id, chunk.id),
        }))
    })
}
