//! Parameter schemas for every operation in the registry.

use serde_json::{Value, json};

const CHUNK_TYPES: [&str; 5] = [
    "problem",
    "solution",
    "code_change",
    "discussion",
    "architecture_decision",
];
const OUTCOMES: [&str; 4] = ["success", "in_progress", "failed", "abandoned"];
const DIFFICULTIES: [&str; 3] = ["simple", "moderate", "complex"];

pub fn store_content() -> Value {
    json!({
        "type": "object",
        "required": ["type", "content"],
        "properties": {
            "type": { "type": "string", "enum": CHUNK_TYPES },
            "content": { "type": "string" },
            "summary": { "type": "string" },
            "tags": { "type": "array", "items": { "type": "string" } },
            "outcome": { "type": "string", "enum": OUTCOMES },
            "difficulty": { "type": "string", "enum": DIFFICULTIES },
            "visibility": { "type": "string", "enum": ["project", "session"] }
        }
    })
}

pub fn store_decision() -> Value {
    json!({
        "type": "object",
        "required": ["content"],
        "properties": {
            "content": { "type": "string" },
            "summary": { "type": "string" },
            "tags": { "type": "array", "items": { "type": "string" } },
            "supersedes": { "type": "string" }
        }
    })
}

pub fn update_existing_content() -> Value {
    json!({
        "type": "object",
        "required": ["chunk_id"],
        "properties": {
            "chunk_id": { "type": "string" },
            "content": { "type": "string" },
            "summary": { "type": "string" },
            "tags": { "type": "array", "items": { "type": "string" } },
            "outcome": { "type": "string", "enum": OUTCOMES },
            "difficulty": { "type": "string", "enum": DIFFICULTIES }
        }
    })
}

pub fn delete_content() -> Value {
    json!({
        "type": "object",
        "required": ["chunk_id"],
        "properties": {
            "chunk_id": { "type": "string" }
        }
    })
}

pub fn expire_stale_content() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub fn create_thread() -> Value {
    json!({
        "type": "object",
        "required": ["name", "chunk_ids"],
        "properties": {
            "name": { "type": "string" },
            "chunk_ids": { "type": "array", "items": { "type": "string" } }
        }
    })
}

pub fn create_relationship() -> Value {
    json!({
        "type": "object",
        "required": ["from_id", "to_id"],
        "properties": {
            "from_id": { "type": "string" },
            "to_id": { "type": "string" }
        }
    })
}

pub fn search_content() -> Value {
    json!({
        "type": "object",
        "required": ["query"],
        "properties": {
            "query": { "type": "string" },
            "k": { "type": "integer", "minimum": 1, "maximum": 100 },
            "type": { "type": "string", "enum": CHUNK_TYPES },
            "tags": { "type": "array", "items": { "type": "string" } },
            "epoch_gt": { "type": "integer" },
            "epoch_lt": { "type": "integer" },
            "include_stale": { "type": "boolean" }
        }
    })
}

pub fn get_content_by_id() -> Value {
    json!({
        "type": "object",
        "required": ["chunk_id"],
        "properties": {
            "chunk_id": { "type": "string" }
        }
    })
}

pub fn find_similar_content() -> Value {
    json!({
        "type": "object",
        "required": ["chunk_id"],
        "properties": {
            "chunk_id": { "type": "string" },
            "k": { "type": "integer", "minimum": 1, "maximum": 100 }
        }
    })
}

pub fn get_content_history() -> Value {
    json!({
        "type": "object",
        "properties": {
            "chunk_id": { "type": "string" },
            "limit": { "type": "integer", "minimum": 1, "maximum": 500 }
        }
    })
}

pub fn get_threads() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub fn get_relationships() -> Value {
    json!({
        "type": "object",
        "required": ["chunk_id"],
        "properties": {
            "chunk_id": { "type": "string" },
            "depth": { "type": "integer", "minimum": 1, "maximum": 5 }
        }
    })
}

pub fn detect_content_patterns() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub fn analyze_content_quality() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub fn find_content_relationships() -> Value {
    json!({
        "type": "object",
        "required": ["chunk_id"],
        "properties": {
            "chunk_id": { "type": "string" },
            "k": { "type": "integer", "minimum": 1, "maximum": 50 }
        }
    })
}

pub fn generate_content_insights() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub fn detect_conflicts() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub fn suggest_related_content() -> Value {
    json!({
        "type": "object",
        "required": ["tags"],
        "properties": {
            "tags": { "type": "array", "items": { "type": "string" } },
            "limit": { "type": "integer", "minimum": 1, "maximum": 50 }
        }
    })
}

pub fn check_system_health() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub fn export_project_data() -> Value {
    json!({
        "type": "object",
        "required": ["project_id"],
        "properties": {
            "project_id": { "type": "string" }
        }
    })
}

pub fn import_project_data() -> Value {
    json!({
        "type": "object",
        "required": ["project_id", "data"],
        "properties": {
            "project_id": { "type": "string" },
            "data": { "type": "object" }
        }
    })
}

pub fn validate_data_integrity() -> Value {
    json!({
        "type": "object",
        "required": ["project_id"],
        "properties": {
            "project_id": { "type": "string" },
            "repair": { "type": "boolean" }
        }
    })
}

pub fn generate_citation() -> Value {
    json!({
        "type": "object",
        "required": ["project_id", "chunk_id"],
        "properties": {
            "project_id": { "type": "string" },
            "chunk_id": { "type": "string" }
        }
    })
}
