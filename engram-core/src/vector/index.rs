//! Brute-force in-process vector index.
//!
//! The default backend behind the [`VectorStore`](super::VectorStore)
//! trait: exact cosine scan with metadata filtering. External vector
//! databases plug in behind the same trait.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use super::filter::Filter;
use super::{Hit, VectorMetadata, VectorStore};
use crate::embeddings::similarity::cosine_similarity;
use crate::error::Result;

struct Entry {
    vector: Vec<f32>,
    metadata: VectorMetadata,
}

/// Exact-scan vector index held in process memory.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl InMemoryVectorIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total vectors held, across all projects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorIndex {
    async fn upsert(&self, id: Uuid, vector: Vec<f32>, metadata: VectorMetadata) -> Result<()> {
        self.entries.write().insert(id, Entry { vector, metadata });
        Ok(())
    }

    async fn query(&self, vector: &[f32], filter: &Filter, k: usize) -> Result<Vec<Hit>> {
        let entries = self.entries.read();
        let mut hits: Vec<Hit> = entries
            .iter()
            .filter(|(id, entry)| filter.matches(**id, &entry.metadata))
            .map(|(id, entry)| Hit {
                id: *id,
                score: cosine_similarity(vector, &entry.vector),
            })
            .collect();
        // Ties break on id so identical queries always return the same order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.entries.write().remove(&id).is_some())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<(Vec<f32>, VectorMetadata)>> {
        Ok(self
            .entries
            .read()
            .get(&id)
            .map(|e| (e.vector.clone(), e.metadata.clone())))
    }

    async fn count(&self, project_id: &str) -> Result<usize> {
        Ok(self
            .entries
            .read()
            .values()
            .filter(|e| e.metadata.project_id == project_id)
            .count())
    }

    async fn list(&self, project_id: &str) -> Result<Vec<Uuid>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| e.metadata.project_id == project_id)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
