//! In-memory metadata store.
//!
//! Backs tests and zero-configuration deployments; the durable libsql
//! backend implements the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use super::{MetadataFilter, MetadataStore};
use crate::error::{Error, Result};
use crate::types::{
    AuditEvent, Chunk, ChunkState, ConflictRecord, Pattern, Project, Session,
    validate_project_id,
};

#[derive(Default)]
struct Tables {
    projects: HashMap<String, Project>,
    chunks: HashMap<(String, Uuid), Chunk>,
    sessions: HashMap<(String, String), Session>,
    patterns: HashMap<Uuid, Pattern>,
    conflicts: HashMap<Uuid, ConflictRecord>,
    audit: Vec<AuditEvent>,
}

/// Hash-map backed [`MetadataStore`].
#[derive(Default)]
pub struct MemoryMetadataStore {
    tables: RwLock<Tables>,
}

impl MemoryMetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn ensure_project(
        &self,
        project_id: &str,
        dimension: usize,
        retention_days: u32,
    ) -> Result<Project> {
        validate_project_id(project_id)?;
        let mut tables = self.tables.write();
        let project = tables
            .projects
            .entry(project_id.to_string())
            .or_insert_with(|| Project {
                project_id: project_id.to_string(),
                dimension,
                retention_days,
                created_at: Utc::now(),
            });
        Ok(project.clone())
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        Ok(self.tables.read().projects.get(project_id).cloned())
    }

    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        validate_project_id(&chunk.project_id)?;
        let mut tables = self.tables.write();
        if !tables.projects.contains_key(&chunk.project_id) {
            return Err(Error::Storage(format!(
                "project {} does not exist",
                chunk.project_id
            )));
        }
        let key = (chunk.project_id.clone(), chunk.id);
        if tables.chunks.contains_key(&key) {
            return Err(Error::Storage(format!("duplicate chunk id {}", chunk.id)));
        }
        tables.chunks.insert(key, chunk.clone());
        Ok(())
    }

    async fn mark_chunk_live(&self, project_id: &str, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write();
        let chunk = tables
            .chunks
            .get_mut(&(project_id.to_string(), id))
            .ok_or(Error::NotFound(id))?;
        chunk.state = ChunkState::Live;
        Ok(())
    }

    async fn remove_chunk(&self, project_id: &str, id: Uuid) -> Result<()> {
        self.tables
            .write()
            .chunks
            .remove(&(project_id.to_string(), id));
        Ok(())
    }

    async fn get_chunk(&self, project_id: &str, id: Uuid) -> Result<Option<Chunk>> {
        Ok(self
            .tables
            .read()
            .chunks
            .get(&(project_id.to_string(), id))
            .cloned())
    }

    async fn update_chunk(&self, chunk: &Chunk) -> Result<()> {
        let mut tables = self.tables.write();
        let key = (chunk.project_id.clone(), chunk.id);
        match tables.chunks.get_mut(&key) {
            Some(existing) => {
                *existing = chunk.clone();
                Ok(())
            }
            None => Err(Error::NotFound(chunk.id)),
        }
    }

    async fn soft_delete_chunk(
        &self,
        project_id: &str,
        id: Uuid,
        when: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.write();
        match tables.chunks.get_mut(&(project_id.to_string(), id)) {
            Some(chunk) if chunk.deleted_at.is_none() => {
                chunk.deleted_at = Some(when);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_chunks(&self, project_id: &str, filter: &MetadataFilter) -> Result<Vec<Chunk>> {
        let tables = self.tables.read();
        let mut chunks: Vec<Chunk> = tables
            .chunks
            .values()
            .filter(|c| c.project_id == project_id && filter.matches(c))
            .cloned()
            .collect();
        chunks.sort_by(|a, b| {
            b.created_at_epoch
                .cmp(&a.created_at_epoch)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = filter.limit {
            chunks.truncate(limit);
        }
        Ok(chunks)
    }

    async fn count_live_chunks(&self, project_id: &str) -> Result<usize> {
        Ok(self
            .tables
            .read()
            .chunks
            .values()
            .filter(|c| c.project_id == project_id && c.is_live())
            .count())
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<(String, Uuid)>> {
        Ok(self
            .tables
            .read()
            .chunks
            .values()
            .filter(|c| c.state == ChunkState::Pending && c.created_at < cutoff)
            .map(|c| (c.project_id.clone(), c.id))
            .collect())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut tables = self.tables.write();
        let retention: HashMap<String, i64> = tables
            .projects
            .values()
            .map(|p| (p.project_id.clone(), i64::from(p.retention_days)))
            .collect();
        let before = tables.chunks.len();
        tables.chunks.retain(|(project_id, _), chunk| {
            let Some(deleted_at) = chunk.deleted_at else {
                return true;
            };
            let window_days = retention.get(project_id).copied().unwrap_or(30);
            now - deleted_at < Duration::days(window_days)
        });
        Ok(before - tables.chunks.len())
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        validate_project_id(&session.project_id)?;
        let mut tables = self.tables.write();
        let key = (session.project_id.clone(), session.id.clone());
        if tables.sessions.contains_key(&key) {
            return Err(Error::Storage(format!(
                "duplicate session id {}",
                session.id
            )));
        }
        tables.sessions.insert(key, session.clone());
        Ok(())
    }

    async fn get_session(&self, project_id: &str, id: &str) -> Result<Option<Session>> {
        Ok(self
            .tables
            .read()
            .sessions
            .get(&(project_id.to_string(), id.to_string()))
            .cloned())
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        let mut tables = self.tables.write();
        let key = (session.project_id.clone(), session.id.clone());
        match tables.sessions.get_mut(&key) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(Error::Storage(format!("unknown session {}", session.id))),
        }
    }

    async fn list_sessions(&self, project_id: &str) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .tables
            .read()
            .sessions
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    async fn upsert_pattern(&self, pattern: &Pattern) -> Result<()> {
        self.tables
            .write()
            .patterns
            .insert(pattern.id, pattern.clone());
        Ok(())
    }

    async fn list_patterns(&self, project_id: &str) -> Result<Vec<Pattern>> {
        let mut patterns: Vec<Pattern> = self
            .tables
            .read()
            .patterns
            .values()
            .filter(|p| p.project_id == project_id)
            .cloned()
            .collect();
        patterns.sort_by(|a, b| a.signature.cmp(&b.signature));
        Ok(patterns)
    }

    async fn insert_conflict(&self, conflict: &ConflictRecord) -> Result<()> {
        self.tables
            .write()
            .conflicts
            .insert(conflict.id, conflict.clone());
        Ok(())
    }

    async fn update_conflict(&self, conflict: &ConflictRecord) -> Result<()> {
        let mut tables = self.tables.write();
        match tables.conflicts.get_mut(&conflict.id) {
            Some(existing) => {
                *existing = conflict.clone();
                Ok(())
            }
            None => Err(Error::NotFound(conflict.id)),
        }
    }

    async fn list_conflicts(&self, project_id: &str) -> Result<Vec<ConflictRecord>> {
        let mut conflicts: Vec<ConflictRecord> = self
            .tables
            .read()
            .conflicts
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        conflicts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(conflicts)
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        self.tables.write().audit.push(event.clone());
        Ok(())
    }

    async fn list_audit(
        &self,
        project_id: &str,
        resource: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditEvent>> {
        let tables = self.tables.read();
        let mut events: Vec<AuditEvent> = tables
            .audit
            .iter()
            .filter(|e| e.project_id.as_deref() == Some(project_id))
            .filter(|e| resource.is_none_or(|r| e.resource == r))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        Ok(events)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
