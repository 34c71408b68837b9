//! `memory_retrieve` operations.

use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::sync::Arc;

use engram_core::engine::{OpContext, RetrieveRequest};
use engram_core::error::Result;
use engram_core::types::ChunkType;

use super::{chunk_view, enum_param, ranked_view, required_uuid, string_vec, usize_or};
use crate::server::{OperationCall, ServerState};

pub fn search_content(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let params = &call.params;
        let request = RetrieveRequest {
            project_id: call.project()?.to_string(),
            session_id: call.session_id.clone(),
            query: super::required_str(params, "query")?.to_string(),
            k: usize_or(params, "k", 10),
            chunk_type: enum_param::<ChunkType>(params, "type")?,
            tags_any: string_vec(params, "tags"),
            epoch_gt: params.get("epoch_gt").and_then(Value::as_i64),
            epoch_lt: params.get("epoch_lt").and_then(Value::as_i64),
            include_stale: params
                .get("include_stale")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };
        let result = state.engine.retrieve(request, &OpContext::new()).await?;
        Ok(json!({
            "items": result.items.iter().map(ranked_view).collect::<Vec<_>>(),
            "degraded": result.degraded,
            "degraded_reason": result.degraded_reason,
        }))
    })
}

pub fn get_content_by_id(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let chunk_id = required_uuid(&call.params, "chunk_id")?;
        let chunk = state
            .engine
            .get_chunk(call.project()?, chunk_id, call.session_id.as_deref())
            .await?;
        Ok(chunk_view(&chunk))
    })
}

pub fn find_similar_content(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let chunk_id = required_uuid(&call.params, "chunk_id")?;
        let k = usize_or(&call.params, "k", 10);
        let similar = state
            .engine
            .find_similar(
                call.project()?,
                chunk_id,
                k,
                call.session_id.clone(),
                &OpContext::new(),
            )
            .await?;
        Ok(json!({
            "reference": chunk_id,
            "items": similar.iter().map(ranked_view).collect::<Vec<_>>(),
        }))
    })
}

pub fn get_content_history(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let resource = call
            .params
            .get("chunk_id")
            .and_then(Value::as_str)
            .map(String::from);
        let limit = usize_or(&call.params, "limit", 100);
        let events = state
            .engine
            .metadata()
            .list_audit(call.project()?, resource.as_deref(), limit)
            .await?;
        Ok(json!({ "events": events }))
    })
}

pub fn get_threads(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let threads = state
            .engine
            .list_threads(call.project()?, call.session_id.clone())
            .await?;
        let view: serde_json::Map<String, Value> = threads
            .iter()
            .map(|(name, members)| {
                (
                    name.clone(),
                    json!(members.iter().map(chunk_view).collect::<Vec<_>>()),
                )
            })
            .collect();
        Ok(json!({ "threads": view }))
    })
}

pub fn get_relationships(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let chunk_id = required_uuid(&call.params, "chunk_id")?;
        let depth = usize_or(&call.params, "depth", 2);
        let related = state
            .engine
            .related_chunks(call.project()?, chunk_id, depth)
            .await?;
        Ok(json!({
            "root": chunk_id,
            "related": related.iter().map(chunk_view).collect::<Vec<_>>(),
        }))
    })
}
