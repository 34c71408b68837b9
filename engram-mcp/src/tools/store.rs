//! `memory_store` operations.

use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::sync::Arc;

use engram_core::engine::OpContext;
use engram_core::error::Result;
use engram_core::types::{
    ChunkDelta, ChunkInput, ChunkType, Difficulty, Outcome, Visibility,
};

use super::{chunk_view, enum_param, optional_uuid, required_str, required_uuid, string_vec};
use crate::server::{OperationCall, ServerState};

fn chunk_input(call: &OperationCall, chunk_type: ChunkType) -> Result<ChunkInput> {
    let params = &call.params;
    Ok(ChunkInput {
        project_id: call.project()?.to_string(),
        session_id: call.session_id.clone(),
        chunk_type,
        content: required_str(params, "content")?.to_string(),
        summary: params
            .get("summary")
            .and_then(Value::as_str)
            .map(String::from),
        tags: string_vec(params, "tags"),
        outcome: enum_param::<Outcome>(params, "outcome")?.unwrap_or_default(),
        difficulty: enum_param::<Difficulty>(params, "difficulty")?.unwrap_or_default(),
        supersedes: optional_uuid(params, "supersedes")?,
        visibility: enum_param::<Visibility>(params, "visibility")?.unwrap_or_default(),
    })
}

fn store_outcome(result: engram_core::engine::StoreResult) -> Value {
    json!({
        "chunk_ids": result.chunk_ids,
        "primary_id": result.chunk_ids.first(),
        "deferred": result.deferred,
    })
}

pub fn store_content(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let chunk_type: ChunkType = required_str(&call.params, "type")?.parse()?;
        let input = chunk_input(&call, chunk_type)?;
        let result = state.engine.store(input, &OpContext::new()).await?;
        Ok(store_outcome(result))
    })
}

pub fn store_decision(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let input = chunk_input(&call, ChunkType::ArchitectureDecision)?;
        let result = state.engine.store(input, &OpContext::new()).await?;
        Ok(store_outcome(result))
    })
}

pub fn update_existing_content(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let chunk_id = required_uuid(&call.params, "chunk_id")?;
        let delta = ChunkDelta {
            content: call
                .params
                .get("content")
                .and_then(Value::as_str)
                .map(String::from),
            summary: call
                .params
                .get("summary")
                .and_then(Value::as_str)
                .map(String::from),
            tags: call
                .params
                .get("tags")
                .and_then(Value::as_array)
                .map(|_| string_vec(&call.params, "tags")),
            outcome: enum_param::<Outcome>(&call.params, "outcome")?,
            difficulty: enum_param::<Difficulty>(&call.params, "difficulty")?,
        };
        let chunk = state
            .engine
            .update(
                call.project()?,
                chunk_id,
                delta,
                call.session_id.as_deref(),
                &OpContext::new(),
            )
            .await?;
        Ok(chunk_view(&chunk))
    })
}

pub fn delete_content(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let chunk_id = required_uuid(&call.params, "chunk_id")?;
        let deleted = state
            .engine
            .delete(call.project()?, chunk_id, &OpContext::new())
            .await?;
        Ok(json!({ "chunk_id": chunk_id, "deleted": deleted }))
    })
}

pub fn expire_stale_content(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let project_id = call.project()?;
        // Refresh staleness first so the expiry acts on current scores.
        let sweep = state.intelligence.decay_sweep(project_id).await?;
        let expired = state
            .engine
            .expire_stale(project_id, &OpContext::new())
            .await?;
        Ok(json!({
            "scanned": sweep.scanned,
            "marked_stale": sweep.marked_stale,
            "expired": expired,
        }))
    })
}

pub fn create_thread(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let name = required_str(&call.params, "name")?.to_string();
        let raw_ids = string_vec(&call.params, "chunk_ids");
        let mut chunk_ids = Vec::with_capacity(raw_ids.len());
        for raw in &raw_ids {
            chunk_ids.push(uuid::Uuid::parse_str(raw).map_err(|_| {
                engram_core::Error::InvalidParams {
                    path: "parameters.chunk_ids".into(),
                    message: format!("'{raw}' is not a UUID"),
                }
            })?);
        }
        let root = state
            .engine
            .create_thread(call.project()?, &name, &chunk_ids)
            .await?;
        Ok(json!({ "thread": name, "root": root, "members": chunk_ids }))
    })
}

pub fn create_relationship(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let from = required_uuid(&call.params, "from_id")?;
        let to = required_uuid(&call.params, "to_id")?;
        state
            .engine
            .create_relationship(call.project()?, from, to)
            .await?;
        Ok(json!({ "from": from, "to": to, "linked": true }))
    })
}
