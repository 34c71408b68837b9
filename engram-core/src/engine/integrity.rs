//! Cross-store integrity check and repair.
//!
//! Corruption is detected by comparing the live-chunk count in the
//! metadata store against the vector count in the index. Repair rebuilds
//! missing vectors from the chunks' stored embeddings (re-embedding when
//! the stored copy is unusable) and drops orphaned vectors that no live
//! chunk claims.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use super::{MemoryEngine, OpContext, chunk_vector_metadata};
use crate::error::{Error, Result};
use crate::metadata::MetadataFilter;
use crate::vector::SessionFilter;

/// Outcome of an integrity pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub project_id: String,
    pub metadata_live: usize,
    pub vector_count: usize,
    /// Counts matched before any repair ran
    pub consistent: bool,
    pub rebuilt: usize,
    pub removed_orphans: usize,
}

impl MemoryEngine {
    /// Compare C against B for one project and optionally repair.
    pub async fn validate_integrity(
        &self,
        project_id: &str,
        repair: bool,
        ctx: &OpContext,
    ) -> Result<IntegrityReport> {
        ctx.ensure_active()?;
        let live_chunks = self
            .metadata()
            .list_chunks(project_id, &MetadataFilter {
                session: SessionFilter::Any,
                ..MetadataFilter::default()
            })
            .await?;
        let vector_ids: HashSet<Uuid> = self.vectors().list(project_id).await?.into_iter().collect();

        let metadata_live = live_chunks.len();
        let vector_count = vector_ids.len();
        let consistent = metadata_live == vector_count
            && live_chunks.iter().all(|c| vector_ids.contains(&c.id));

        let mut report = IntegrityReport {
            project_id: project_id.to_string(),
            metadata_live,
            vector_count,
            consistent,
            rebuilt: 0,
            removed_orphans: 0,
        };

        if consistent || !repair {
            return Ok(report);
        }
        warn!(
            project_id,
            metadata_live, vector_count, "integrity mismatch detected; rebuilding"
        );

        let live_ids: HashSet<Uuid> = live_chunks.iter().map(|c| c.id).collect();
        for chunk in &live_chunks {
            ctx.ensure_active()?;
            if vector_ids.contains(&chunk.id) {
                continue;
            }
            let vector = if chunk.embedding.is_empty() {
                // Stored copy unusable: regenerate from content.
                self.embeddings().embed(&chunk.content).await?.vector.clone()
            } else {
                chunk.embedding.clone()
            };
            self.vectors()
                .upsert(chunk.id, vector, chunk_vector_metadata(chunk))
                .await
                .map_err(|e| Error::Corrupted(format!("rebuild failed for {}: {e}", chunk.id)))?;
            report.rebuilt += 1;
        }

        for orphan in vector_ids.difference(&live_ids) {
            ctx.ensure_active()?;
            if self.vectors().delete(*orphan).await? {
                report.removed_orphans += 1;
            }
        }

        info!(
            project_id,
            rebuilt = report.rebuilt,
            removed = report.removed_orphans,
            "integrity repair complete"
        );
        Ok(report)
    }
}
