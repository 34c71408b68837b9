//! Retrieval scoring.
//!
//! `final = raw × decay(age) × confidence × (1 − fallback_penalty)` where
//! `raw` is the vector-store cosine normalized into [0, 1] and `decay` is
//! `exp(−age_days / half_life_days)` with a per-type half-life.

use chrono::{DateTime, Utc};

use crate::config::DecaySettings;
use crate::types::{Chunk, Provenance};

/// Map cosine similarity from [-1, 1] into [0, 1].
#[must_use]
pub fn normalize_similarity(raw: f32) -> f64 {
    (f64::from(raw) + 1.0) / 2.0
}

/// Exponential time decay.
#[must_use]
pub fn decay_factor(age_days: f64, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 1.0;
    }
    (-age_days / half_life_days).exp()
}

/// Freshness of a chunk right now, in (0, 1].
#[must_use]
pub fn freshness(chunk: &Chunk, now: DateTime<Utc>, decay: &DecaySettings) -> f64 {
    decay_factor(chunk.age_days(now), decay.half_life(chunk.chunk_type))
}

/// Final retrieval score for one chunk.
#[must_use]
pub fn final_score(
    raw_similarity: f32,
    chunk: &Chunk,
    now: DateTime<Utc>,
    decay: &DecaySettings,
    fallback_penalty: f64,
) -> f64 {
    let penalty = match chunk.provenance {
        Provenance::Primary => 0.0,
        Provenance::Fallback => fallback_penalty.clamp(0.0, 1.0),
    };
    normalize_similarity(raw_similarity)
        * freshness(chunk, now, decay)
        * f64::from(chunk.confidence)
        * (1.0 - penalty)
}
