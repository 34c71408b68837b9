//! Operation handlers for the four tools, one module per tool.

pub mod analyze;
pub mod retrieve;
pub mod store;
pub mod system;

use serde_json::{Value, json};
use uuid::Uuid;

use engram_core::engine::RankedChunk;
use engram_core::error::{Error, Result};
use engram_core::types::Chunk;

/// Required string parameter.
pub(crate) fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidParams {
            path: format!("parameters.{key}"),
            message: "required field is missing".into(),
        })
}

/// Required UUID parameter.
pub(crate) fn required_uuid(params: &Value, key: &str) -> Result<Uuid> {
    let raw = required_str(params, key)?;
    Uuid::parse_str(raw).map_err(|_| Error::InvalidParams {
        path: format!("parameters.{key}"),
        message: "expected a UUID".into(),
    })
}

/// Optional UUID parameter.
pub(crate) fn optional_uuid(params: &Value, key: &str) -> Result<Option<Uuid>> {
    match params.get(key).and_then(Value::as_str) {
        Some(raw) => Ok(Some(Uuid::parse_str(raw).map_err(|_| {
            Error::InvalidParams {
                path: format!("parameters.{key}"),
                message: "expected a UUID".into(),
            }
        })?)),
        None => Ok(None),
    }
}

/// Optional positive integer with a default.
pub(crate) fn usize_or(params: &Value, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(Value::as_u64)
        .map_or(default, |v| v as usize)
}

/// Optional string-array parameter.
pub(crate) fn string_vec(params: &Value, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse an enum-valued string parameter through serde.
pub(crate) fn enum_param<T: serde::de::DeserializeOwned>(
    params: &Value,
    key: &str,
) -> Result<Option<T>> {
    match params.get(key) {
        Some(value) if !value.is_null() => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|_| Error::InvalidParams {
                path: format!("parameters.{key}"),
                message: "unrecognized value".into(),
            }),
        _ => Ok(None),
    }
}

/// Wire representation of a chunk, embedding omitted.
pub(crate) fn chunk_view(chunk: &Chunk) -> Value {
    json!({
        "id": chunk.id,
        "project_id": chunk.project_id,
        "session_id": chunk.session_id,
        "type": chunk.chunk_type.to_string(),
        "content": chunk.content,
        "summary": chunk.summary,
        "tags": chunk.tags,
        "outcome": chunk.outcome.to_string(),
        "difficulty": chunk.difficulty,
        "created_at": chunk.created_at.to_rfc3339(),
        "timestamp_epoch": chunk.created_at_epoch,
        "related_chunks": chunk.related_chunks,
        "parent": chunk.parent,
        "supersedes": chunk.supersedes,
        "quality": chunk.quality,
        "confidence": chunk.confidence,
        "stale": chunk.stale,
        "provenance": chunk.provenance,
    })
}

/// Wire representation of a ranked retrieval hit.
pub(crate) fn ranked_view(ranked: &RankedChunk) -> Value {
    let mut view = chunk_view(&ranked.chunk);
    if let Some(object) = view.as_object_mut() {
        object.insert("similarity".into(), json!(ranked.similarity));
        object.insert("score".into(), json!(ranked.score));
        object.insert("conflict".into(), json!(ranked.conflicted));
    }
    view
}
