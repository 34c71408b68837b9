//! Freshness sweep.
//!
//! Recomputes freshness for every live chunk and marks the ones whose
//! score fell below the stale threshold. Callers can then refresh a chunk
//! (boosting freshness) or expire it (soft-delete); both live on the
//! engine.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::config::{DecaySettings, IntelligenceSettings};
use crate::engine::ranking::freshness;
use crate::error::Result;
use crate::metadata::{MetadataFilter, MetadataStore};
use crate::vector::SessionFilter;

/// Outcome of one decay sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecayReport {
    pub scanned: usize,
    pub marked_stale: usize,
    pub stale_ids: Vec<Uuid>,
}

/// Recompute freshness for a project and mark stale chunks.
pub async fn sweep_project(
    project_id: &str,
    metadata: &Arc<dyn MetadataStore>,
    decay: &DecaySettings,
    settings: &IntelligenceSettings,
) -> Result<DecayReport> {
    let now = Utc::now();
    let chunks = metadata
        .list_chunks(project_id, &MetadataFilter {
            session: SessionFilter::Any,
            ..MetadataFilter::default()
        })
        .await?;

    let mut report = DecayReport {
        scanned: chunks.len(),
        ..DecayReport::default()
    };

    for mut chunk in chunks {
        let score = freshness(&chunk, now, decay);
        let should_be_stale = score < settings.stale_threshold;
        if should_be_stale == chunk.stale {
            continue;
        }
        chunk.stale = should_be_stale;
        metadata.update_chunk(&chunk).await?;
        if should_be_stale {
            report.marked_stale += 1;
            report.stale_ids.push(chunk.id);
        }
    }

    debug!(
        project_id,
        scanned = report.scanned,
        stale = report.marked_stale,
        "decay sweep complete"
    );
    Ok(report)
}
