//! Metadata filter predicates for vector queries.
//!
//! Supported predicates: equality on strings, set membership on tags, and
//! `>` / `<` on the integer epoch field. String comparison operators are
//! unrepresentable here on purpose; timestamps filter on
//! `timestamp_epoch` only.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::VectorMetadata;
use crate::types::{ChunkType, Visibility};

/// Session visibility of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SessionFilter {
    /// Project-public entries only
    #[default]
    Public,
    /// Project-public entries plus session-private entries of this session
    WithSession(String),
    /// Every entry regardless of visibility; internal sweeps and integrity
    /// checks only, never reachable from caller parameters
    Any,
}

/// Conjunction of metadata predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Tenant boundary; always an equality match
    pub project_id: String,
    #[serde(default)]
    pub session: SessionFilter,
    #[serde(default)]
    pub chunk_type: Option<ChunkType>,
    /// Set membership: a match carries at least one of these tags
    #[serde(default)]
    pub tags_any: Vec<String>,
    /// `timestamp_epoch > epoch_gt`
    #[serde(default)]
    pub epoch_gt: Option<i64>,
    /// `timestamp_epoch < epoch_lt`
    #[serde(default)]
    pub epoch_lt: Option<i64>,
    /// Excluded chunk id, used by find-similar
    #[serde(default)]
    pub exclude: Option<Uuid>,
}

impl Filter {
    #[must_use]
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            session: SessionFilter::Public,
            chunk_type: None,
            tags_any: Vec::new(),
            epoch_gt: None,
            epoch_lt: None,
            exclude: None,
        }
    }

    #[must_use]
    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session = match session_id {
            Some(id) => SessionFilter::WithSession(id),
            None => SessionFilter::Public,
        };
        self
    }

    #[must_use]
    pub fn with_type(mut self, chunk_type: Option<ChunkType>) -> Self {
        self.chunk_type = chunk_type;
        self
    }

    #[must_use]
    pub fn with_tags_any(mut self, tags: Vec<String>) -> Self {
        self.tags_any = tags;
        self
    }

    #[must_use]
    pub fn with_epoch_range(mut self, gt: Option<i64>, lt: Option<i64>) -> Self {
        self.epoch_gt = gt;
        self.epoch_lt = lt;
        self
    }

    #[must_use]
    pub fn excluding(mut self, id: Uuid) -> Self {
        self.exclude = Some(id);
        self
    }

    /// Evaluate the predicate conjunction against one vector's metadata.
    #[must_use]
    pub fn matches(&self, id: Uuid, metadata: &VectorMetadata) -> bool {
        if metadata.project_id != self.project_id {
            return false;
        }
        if self.exclude == Some(id) {
            return false;
        }
        let visible = match (&self.session, metadata.visibility) {
            (SessionFilter::Any, _) | (_, Visibility::Project) => true,
            (SessionFilter::Public, Visibility::Session) => false,
            (SessionFilter::WithSession(session), Visibility::Session) => {
                metadata.session_id.as_deref() == Some(session.as_str())
            }
        };
        if !visible {
            return false;
        }
        if let Some(chunk_type) = self.chunk_type {
            if metadata.chunk_type != chunk_type {
                return false;
            }
        }
        if !self.tags_any.is_empty() && !self.tags_any.iter().any(|t| metadata.tags.contains(t)) {
            return false;
        }
        if let Some(gt) = self.epoch_gt {
            if metadata.timestamp_epoch <= gt {
                return false;
            }
        }
        if let Some(lt) = self.epoch_lt {
            if metadata.timestamp_epoch >= lt {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(epoch: i64) -> VectorMetadata {
        VectorMetadata {
            project_id: "acme/api".into(),
            session_id: Some("s1".into()),
            chunk_type: ChunkType::Solution,
            timestamp_epoch: epoch,
            tags: vec!["db".into(), "perf".into()],
            visibility: Visibility::Project,
        }
    }

    #[test]
    fn project_equality_is_mandatory() {
        let filter = Filter::for_project("acme/api");
        assert!(filter.matches(Uuid::new_v4(), &metadata(100)));
        let other = Filter::for_project("acme/web");
        assert!(!other.matches(Uuid::new_v4(), &metadata(100)));
    }

    #[test]
    fn epoch_range_is_strict() {
        let filter = Filter::for_project("acme/api").with_epoch_range(Some(100), None);
        assert!(!filter.matches(Uuid::new_v4(), &metadata(100)));
        assert!(filter.matches(Uuid::new_v4(), &metadata(101)));

        let upper = Filter::for_project("acme/api").with_epoch_range(None, Some(100));
        assert!(!upper.matches(Uuid::new_v4(), &metadata(100)));
        assert!(upper.matches(Uuid::new_v4(), &metadata(99)));
    }

    #[test]
    fn tags_are_set_membership() {
        let filter = Filter::for_project("acme/api").with_tags_any(vec!["db".into()]);
        assert!(filter.matches(Uuid::new_v4(), &metadata(0)));
        let none = Filter::for_project("acme/api").with_tags_any(vec!["frontend".into()]);
        assert!(!none.matches(Uuid::new_v4(), &metadata(0)));
    }

    #[test]
    fn session_private_entries_require_matching_session() {
        let mut private = metadata(0);
        private.visibility = Visibility::Session;

        let public_reader = Filter::for_project("acme/api");
        assert!(!public_reader.matches(Uuid::new_v4(), &private));

        let same_session = Filter::for_project("acme/api").with_session(Some("s1".into()));
        assert!(same_session.matches(Uuid::new_v4(), &private));

        let other_session = Filter::for_project("acme/api").with_session(Some("s2".into()));
        assert!(!other_session.matches(Uuid::new_v4(), &private));
    }

    #[test]
    fn excluded_id_never_matches() {
        let id = Uuid::new_v4();
        let filter = Filter::for_project("acme/api").excluding(id);
        assert!(!filter.matches(id, &metadata(0)));
        assert!(filter.matches(Uuid::new_v4(), &metadata(0)));
    }
}
