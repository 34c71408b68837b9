//! `memory_analyze` operations.

use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::sync::Arc;

use engram_core::engine::OpContext;
use engram_core::error::Result;
use engram_core::types::PatternStatus;

use super::{chunk_view, ranked_view, required_uuid, string_vec, usize_or};
use crate::server::{OperationCall, ServerState};

pub fn detect_content_patterns(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let patterns = state.intelligence.patterns(call.project()?);
        let (validated, candidates): (Vec<_>, Vec<_>) = patterns
            .into_iter()
            .partition(|p| p.status == PatternStatus::Validated);
        Ok(json!({
            "validated": validated,
            "validation_queue": candidates,
        }))
    })
}

pub fn analyze_content_quality(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let report = state.intelligence.quality_report(call.project()?).await?;
        serde_json::to_value(report).map_err(Into::into)
    })
}

pub fn find_content_relationships(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let chunk_id = required_uuid(&call.params, "chunk_id")?;
        let k = usize_or(&call.params, "k", 10);
        let project_id = call.project()?;

        let reference = state
            .engine
            .get_chunk(project_id, chunk_id, call.session_id.as_deref())
            .await?;
        let similar = state
            .engine
            .find_similar(
                project_id,
                chunk_id,
                k,
                call.session_id.clone(),
                &OpContext::new(),
            )
            .await?;
        let tag_matches = state
            .intelligence
            .suggest_related(project_id, &reference.tags, call.session_id.clone(), k)
            .await?;

        Ok(json!({
            "reference": chunk_id,
            "similar": similar.iter().map(ranked_view).collect::<Vec<_>>(),
            "tag_matches": tag_matches
                .iter()
                .filter(|s| s.chunk.id != chunk_id)
                .map(|s| {
                    let mut view = chunk_view(&s.chunk);
                    if let Some(object) = view.as_object_mut() {
                        object.insert("affinity".into(), json!(s.affinity));
                    }
                    view
                })
                .collect::<Vec<_>>(),
        }))
    })
}

pub fn generate_content_insights(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let insights = state.intelligence.insights(call.project()?).await?;
        serde_json::to_value(insights).map_err(Into::into)
    })
}

pub fn detect_conflicts(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let conflicts = state.intelligence.conflicts(call.project()?).await?;
        let open = conflicts.iter().filter(|c| c.resolution.is_none()).count();
        Ok(json!({
            "conflicts": conflicts,
            "open": open,
        }))
    })
}

pub fn suggest_related_content(
    state: Arc<ServerState>,
    call: OperationCall,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let tags = string_vec(&call.params, "tags");
        let limit = usize_or(&call.params, "limit", 10);
        let suggestions = state
            .intelligence
            .suggest_related(call.project()?, &tags, call.session_id.clone(), limit)
            .await?;
        Ok(json!({
            "suggestions": suggestions
                .iter()
                .map(|s| {
                    let mut view = chunk_view(&s.chunk);
                    if let Some(object) = view.as_object_mut() {
                        object.insert("affinity".into(), json!(s.affinity));
                    }
                    view
                })
                .collect::<Vec<_>>(),
        }))
    })
}
