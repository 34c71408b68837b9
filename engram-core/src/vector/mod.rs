//! Vector store client: trait, metadata filter model, the in-process
//! index, and the reliability-wrapped client the engine talks to.

mod filter;
mod index;
mod resilient;

pub use filter::{Filter, SessionFilter};
pub use index::InMemoryVectorIndex;
pub use resilient::ResilientVectorStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{ChunkType, Visibility};

/// Metadata carried alongside each vector in the index.
///
/// `timestamp_epoch` is an integer precisely so range predicates never
/// compare strings; it is the only field the filter may apply `>`/`<` to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub project_id: String,
    pub session_id: Option<String>,
    pub chunk_type: ChunkType,
    pub timestamp_epoch: i64,
    pub tags: Vec<String>,
    pub visibility: Visibility,
}

/// A nearest-neighbour match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub id: Uuid,
    /// Cosine similarity, in [-1, 1]
    pub score: f32,
}

/// Upsert/query/delete interface over an external vector database.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Write-or-replace a vector and its metadata.
    async fn upsert(&self, id: Uuid, vector: Vec<f32>, metadata: VectorMetadata) -> Result<()>;

    /// Top-k nearest neighbours whose metadata matches the filter.
    async fn query(&self, vector: &[f32], filter: &Filter, k: usize) -> Result<Vec<Hit>>;

    /// Remove a vector from the index. Returns whether it existed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// All vector ids stored for a project, for integrity reconciliation.
    async fn list(&self, project_id: &str) -> Result<Vec<Uuid>>;

    /// Fetch a stored vector and its metadata.
    async fn fetch(&self, id: Uuid) -> Result<Option<(Vec<f32>, VectorMetadata)>>;

    /// Number of vectors stored for a project.
    async fn count(&self, project_id: &str) -> Result<usize>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> Result<()>;
}
