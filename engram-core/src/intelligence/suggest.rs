//! Related-context suggestion.
//!
//! Surfaces chunks whose tag overlap or pattern membership with a query
//! fingerprint is highest, independently of where they would land under
//! the vector-similarity cutoff.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::metadata::{MetadataFilter, MetadataStore};
use crate::types::{Chunk, Pattern, PatternStatus, PatternType};
use crate::vector::SessionFilter;

/// A suggestion with the affinity that produced it.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub chunk: Chunk,
    pub affinity: f64,
}

/// Score chunks of a project against a query tag fingerprint.
pub async fn suggest_related(
    project_id: &str,
    query_tags: &[String],
    session_id: Option<String>,
    limit: usize,
    metadata: &Arc<dyn MetadataStore>,
    patterns: &[Pattern],
) -> Result<Vec<Suggestion>> {
    let filter = MetadataFilter {
        session: session_id.map_or(SessionFilter::Public, SessionFilter::WithSession),
        ..MetadataFilter::default()
    };
    let chunks = metadata.list_chunks(project_id, &filter).await?;

    // Tags that participate in validated tag-cluster patterns alongside a
    // query tag carry extra weight.
    let pattern_tags: HashSet<&str> = patterns
        .iter()
        .filter(|p| {
            p.status == PatternStatus::Validated
                && p.pattern_type == PatternType::TagCluster
                && query_tags.iter().any(|t| p.signature.contains(t.as_str()))
        })
        .flat_map(|p| p.signature.split('+'))
        .collect();

    let mut suggestions: Vec<Suggestion> = chunks
        .into_iter()
        .filter_map(|chunk| {
            let overlap = chunk
                .tags
                .iter()
                .filter(|t| query_tags.contains(t))
                .count() as f64;
            let pattern_bonus = chunk
                .tags
                .iter()
                .filter(|t| pattern_tags.contains(t.as_str()))
                .count() as f64
                * 0.5;
            let affinity = overlap + pattern_bonus;
            (affinity > 0.0).then_some(Suggestion { chunk, affinity })
        })
        .collect();

    suggestions.sort_by(|a, b| {
        b.affinity
            .partial_cmp(&a.affinity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    suggestions.truncate(limit.max(1));
    Ok(suggestions)
}
