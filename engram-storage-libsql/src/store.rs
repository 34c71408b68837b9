//! [`MetadataStore`] implementation over libSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;
use tracing::debug;
use uuid::Uuid;

use engram_core::error::{Error, Result};
use engram_core::metadata::{MetadataFilter, MetadataStore};
use engram_core::types::{
    AuditEvent, Chunk, ChunkState, ConflictRecord, Pattern, Project, Session,
    validate_project_id,
};

use crate::LibsqlMetadataStore;

fn storage_err(context: &str) -> impl FnOnce(libsql::Error) -> Error + '_ {
    move |e| Error::Storage(format!("{context}: {e}"))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Error::Serialization)
}

fn decode<T: serde::de::DeserializeOwned>(payload: &str, what: &str) -> Result<T> {
    serde_json::from_str(payload)
        .map_err(|e| Error::Storage(format!("failed to parse stored {what}: {e}")))
}

fn state_str(state: ChunkState) -> &'static str {
    match state {
        ChunkState::Pending => "pending",
        ChunkState::Live => "live",
    }
}

impl LibsqlMetadataStore {
    async fn load_chunk(&self, project_id: &str, id: Uuid) -> Result<Option<Chunk>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .get()
            .query(
                "SELECT payload FROM chunks WHERE project_id = ? AND chunk_id = ?",
                params![project_id.to_string(), id.to_string()],
            )
            .await
            .map_err(storage_err("failed to query chunk"))?;
        match rows
            .next()
            .await
            .map_err(storage_err("failed to fetch chunk row"))?
        {
            Some(row) => {
                let payload: String = row.get(0).map_err(storage_err("chunk payload column"))?;
                Ok(Some(decode(&payload, "chunk")?))
            }
            None => Ok(None),
        }
    }

    async fn write_chunk_row(&self, chunk: &Chunk) -> Result<()> {
        let conn = self.connection().await?;
        conn.get()
            .execute(
                "UPDATE chunks
                 SET session_id = ?, chunk_type = ?, created_at_epoch = ?, state = ?,
                     stale = ?, deleted_at_epoch = ?, payload = ?
                 WHERE project_id = ? AND chunk_id = ?",
                params![
                    chunk.session_id.clone(),
                    chunk.chunk_type.to_string(),
                    chunk.created_at_epoch,
                    state_str(chunk.state).to_string(),
                    i64::from(chunk.stale),
                    chunk.deleted_at.map(|t| t.timestamp()),
                    encode(chunk)?,
                    chunk.project_id.clone(),
                    chunk.id.to_string(),
                ],
            )
            .await
            .map_err(storage_err("failed to update chunk"))?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for LibsqlMetadataStore {
    async fn ensure_project(
        &self,
        project_id: &str,
        dimension: usize,
        retention_days: u32,
    ) -> Result<Project> {
        validate_project_id(project_id)?;
        let candidate = Project {
            project_id: project_id.to_string(),
            dimension,
            retention_days,
            created_at: Utc::now(),
        };

        let conn = self.connection().await?;
        conn.get()
            .execute(
                "INSERT OR IGNORE INTO projects (project_id, dimension, retention_days, payload)
                 VALUES (?, ?, ?, ?)",
                params![
                    project_id.to_string(),
                    dimension as i64,
                    i64::from(retention_days),
                    encode(&candidate)?,
                ],
            )
            .await
            .map_err(storage_err("failed to insert project"))?;

        let mut rows = conn
            .get()
            .query(
                "SELECT payload FROM projects WHERE project_id = ?",
                params![project_id.to_string()],
            )
            .await
            .map_err(storage_err("failed to query project"))?;
        let row = rows
            .next()
            .await
            .map_err(storage_err("failed to fetch project row"))?
            .ok_or_else(|| Error::Storage(format!("project {project_id} vanished")))?;
        let payload: String = row.get(0).map_err(storage_err("project payload column"))?;
        decode(&payload, "project")
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .get()
            .query(
                "SELECT payload FROM projects WHERE project_id = ?",
                params![project_id.to_string()],
            )
            .await
            .map_err(storage_err("failed to query project"))?;
        match rows
            .next()
            .await
            .map_err(storage_err("failed to fetch project row"))?
        {
            Some(row) => {
                let payload: String = row.get(0).map_err(storage_err("project payload column"))?;
                Ok(Some(decode(&payload, "project")?))
            }
            None => Ok(None),
        }
    }

    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        validate_project_id(&chunk.project_id)?;
        if self.get_project(&chunk.project_id).await?.is_none() {
            return Err(Error::Storage(format!(
                "project {} does not exist",
                chunk.project_id
            )));
        }

        debug!(chunk_id = %chunk.id, state = state_str(chunk.state), "inserting chunk");
        let conn = self.connection().await?;
        conn.get()
            .execute(
                "INSERT INTO chunks
                 (project_id, chunk_id, session_id, chunk_type, created_at_epoch,
                  state, stale, deleted_at_epoch, payload)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    chunk.project_id.clone(),
                    chunk.id.to_string(),
                    chunk.session_id.clone(),
                    chunk.chunk_type.to_string(),
                    chunk.created_at_epoch,
                    state_str(chunk.state).to_string(),
                    i64::from(chunk.stale),
                    chunk.deleted_at.map(|t| t.timestamp()),
                    encode(chunk)?,
                ],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to insert chunk {}: {e}", chunk.id)))?;
        Ok(())
    }

    async fn mark_chunk_live(&self, project_id: &str, id: Uuid) -> Result<()> {
        let mut chunk = self
            .load_chunk(project_id, id)
            .await?
            .ok_or(Error::NotFound(id))?;
        chunk.state = ChunkState::Live;
        self.write_chunk_row(&chunk).await
    }

    async fn remove_chunk(&self, project_id: &str, id: Uuid) -> Result<()> {
        let conn = self.connection().await?;
        conn.get()
            .execute(
                "DELETE FROM chunks WHERE project_id = ? AND chunk_id = ?",
                params![project_id.to_string(), id.to_string()],
            )
            .await
            .map_err(storage_err("failed to remove chunk"))?;
        Ok(())
    }

    async fn get_chunk(&self, project_id: &str, id: Uuid) -> Result<Option<Chunk>> {
        self.load_chunk(project_id, id).await
    }

    async fn update_chunk(&self, chunk: &Chunk) -> Result<()> {
        if self
            .load_chunk(&chunk.project_id, chunk.id)
            .await?
            .is_none()
        {
            return Err(Error::NotFound(chunk.id));
        }
        self.write_chunk_row(chunk).await
    }

    async fn soft_delete_chunk(
        &self,
        project_id: &str,
        id: Uuid,
        when: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(mut chunk) = self.load_chunk(project_id, id).await? else {
            return Ok(false);
        };
        if chunk.deleted_at.is_some() {
            return Ok(false);
        }
        chunk.deleted_at = Some(when);
        self.write_chunk_row(&chunk).await?;
        Ok(true)
    }

    async fn list_chunks(&self, project_id: &str, filter: &MetadataFilter) -> Result<Vec<Chunk>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .get()
            .query(
                "SELECT payload FROM chunks WHERE project_id = ?
                 ORDER BY created_at_epoch DESC",
                params![project_id.to_string()],
            )
            .await
            .map_err(storage_err("failed to list chunks"))?;

        let mut chunks = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(storage_err("failed to fetch chunk row"))?
        {
            let payload: String = row.get(0).map_err(storage_err("chunk payload column"))?;
            let chunk: Chunk = decode(&payload, "chunk")?;
            if filter.matches(&chunk) {
                chunks.push(chunk);
            }
        }
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
        let conn = self.connection().await?;
        let mut rows = conn
            .get()
            .query(
                "SELECT COUNT(*) FROM chunks
                 WHERE project_id = ? AND state = 'live' AND deleted_at_epoch IS NULL",
                params![project_id.to_string()],
            )
            .await
            .map_err(storage_err("failed to count chunks"))?;
        let row = rows
            .next()
            .await
            .map_err(storage_err("failed to fetch count row"))?
            .ok_or_else(|| Error::Storage("count query returned no rows".into()))?;
        let count: i64 = row.get(0).map_err(storage_err("count column"))?;
        Ok(count.max(0) as usize)
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<(String, Uuid)>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .get()
            .query(
                "SELECT project_id, chunk_id FROM chunks
                 WHERE state = 'pending' AND created_at_epoch < ?",
                params![cutoff.timestamp()],
            )
            .await
            .map_err(storage_err("failed to list pending chunks"))?;

        let mut pending = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(storage_err("failed to fetch pending row"))?
        {
            let project_id: String = row.get(0).map_err(storage_err("project column"))?;
            let chunk_id: String = row.get(1).map_err(storage_err("chunk id column"))?;
            let chunk_id = Uuid::parse_str(&chunk_id)
                .map_err(|e| Error::Storage(format!("invalid chunk id in storage: {e}")))?;
            pending.push((project_id, chunk_id));
        }
        Ok(pending)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.connection().await?;
        let mut rows = conn
            .get()
            .query("SELECT project_id, retention_days FROM projects", ())
            .await
            .map_err(storage_err("failed to list projects"))?;

        let mut projects = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(storage_err("failed to fetch project row"))?
        {
            let project_id: String = row.get(0).map_err(storage_err("project column"))?;
            let retention_days: i64 = row.get(1).map_err(storage_err("retention column"))?;
            projects.push((project_id, retention_days));
        }

        let mut purged = 0usize;
        for (project_id, retention_days) in projects {
            let cutoff = now.timestamp() - retention_days * 86_400;
            let affected = conn
                .get()
                .execute(
                    "DELETE FROM chunks
                     WHERE project_id = ? AND deleted_at_epoch IS NOT NULL
                       AND deleted_at_epoch < ?",
                    params![project_id, cutoff],
                )
                .await
                .map_err(storage_err("failed to purge chunks"))?;
            purged += affected as usize;
        }
        Ok(purged)
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        validate_project_id(&session.project_id)?;
        let conn = self.connection().await?;
        conn.get()
            .execute(
                "INSERT INTO sessions (project_id, session_id, started_at_epoch, status, payload)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    session.project_id.clone(),
                    session.id.clone(),
                    session.started_at.timestamp(),
                    encode(&session.status)?,
                    encode(session)?,
                ],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to insert session {}: {e}", session.id)))?;
        Ok(())
    }

    async fn get_session(&self, project_id: &str, id: &str) -> Result<Option<Session>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .get()
            .query(
                "SELECT payload FROM sessions WHERE project_id = ? AND session_id = ?",
                params![project_id.to_string(), id.to_string()],
            )
            .await
            .map_err(storage_err("failed to query session"))?;
        match rows
            .next()
            .await
            .map_err(storage_err("failed to fetch session row"))?
        {
            Some(row) => {
                let payload: String = row.get(0).map_err(storage_err("session payload column"))?;
                Ok(Some(decode(&payload, "session")?))
            }
            None => Ok(None),
        }
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        let conn = self.connection().await?;
        let affected = conn
            .get()
            .execute(
                "UPDATE sessions SET status = ?, payload = ?
                 WHERE project_id = ? AND session_id = ?",
                params![
                    encode(&session.status)?,
                    encode(session)?,
                    session.project_id.clone(),
                    session.id.clone(),
                ],
            )
            .await
            .map_err(storage_err("failed to update session"))?;
        if affected == 0 {
            return Err(Error::Storage(format!("unknown session {}", session.id)));
        }
        Ok(())
    }

    async fn list_sessions(&self, project_id: &str) -> Result<Vec<Session>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .get()
            .query(
                "SELECT payload FROM sessions WHERE project_id = ?
                 ORDER BY started_at_epoch DESC",
                params![project_id.to_string()],
            )
            .await
            .map_err(storage_err("failed to list sessions"))?;
        let mut sessions = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(storage_err("failed to fetch session row"))?
        {
            let payload: String = row.get(0).map_err(storage_err("session payload column"))?;
            sessions.push(decode(&payload, "session")?);
        }
        Ok(sessions)
    }

    async fn upsert_pattern(&self, pattern: &Pattern) -> Result<()> {
        let conn = self.connection().await?;
        conn.get()
            .execute(
                "INSERT OR REPLACE INTO patterns (pattern_id, project_id, signature, payload)
                 VALUES (?, ?, ?, ?)",
                params![
                    pattern.id.to_string(),
                    pattern.project_id.clone(),
                    pattern.signature.clone(),
                    encode(pattern)?,
                ],
            )
            .await
            .map_err(storage_err("failed to upsert pattern"))?;
        Ok(())
    }

    async fn list_patterns(&self, project_id: &str) -> Result<Vec<Pattern>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .get()
            .query(
                "SELECT payload FROM patterns WHERE project_id = ? ORDER BY signature",
                params![project_id.to_string()],
            )
            .await
            .map_err(storage_err("failed to list patterns"))?;
        let mut patterns = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(storage_err("failed to fetch pattern row"))?
        {
            let payload: String = row.get(0).map_err(storage_err("pattern payload column"))?;
            patterns.push(decode(&payload, "pattern")?);
        }
        Ok(patterns)
    }

    async fn insert_conflict(&self, conflict: &ConflictRecord) -> Result<()> {
        let conn = self.connection().await?;
        conn.get()
            .execute(
                "INSERT INTO conflicts (conflict_id, project_id, detected_at_epoch, payload)
                 VALUES (?, ?, ?, ?)",
                params![
                    conflict.id.to_string(),
                    conflict.project_id.clone(),
                    conflict.detected_at.timestamp(),
                    encode(conflict)?,
                ],
            )
            .await
            .map_err(storage_err("failed to insert conflict"))?;
        Ok(())
    }

    async fn update_conflict(&self, conflict: &ConflictRecord) -> Result<()> {
        let conn = self.connection().await?;
        let affected = conn
            .get()
            .execute(
                "UPDATE conflicts SET payload = ? WHERE conflict_id = ?",
                params![encode(conflict)?, conflict.id.to_string()],
            )
            .await
            .map_err(storage_err("failed to update conflict"))?;
        if affected == 0 {
            return Err(Error::NotFound(conflict.id));
        }
        Ok(())
    }

    async fn list_conflicts(&self, project_id: &str) -> Result<Vec<ConflictRecord>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .get()
            .query(
                "SELECT payload FROM conflicts WHERE project_id = ?
                 ORDER BY detected_at_epoch DESC",
                params![project_id.to_string()],
            )
            .await
            .map_err(storage_err("failed to list conflicts"))?;
        let mut conflicts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(storage_err("failed to fetch conflict row"))?
        {
            let payload: String = row.get(0).map_err(storage_err("conflict payload column"))?;
            conflicts.push(decode(&payload, "conflict")?);
        }
        Ok(conflicts)
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        let conn = self.connection().await?;
        conn.get()
            .execute(
                "INSERT INTO audit_events
                 (timestamp_epoch, actor, action, resource, project_id, success, payload)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    event.timestamp.timestamp(),
                    event.actor.clone(),
                    event.action.clone(),
                    event.resource.clone(),
                    event.project_id.clone(),
                    i64::from(event.success),
                    encode(event)?,
                ],
            )
            .await
            .map_err(storage_err("failed to append audit event"))?;
        Ok(())
    }

    async fn list_audit(
        &self,
        project_id: &str,
        resource: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditEvent>> {
        let conn = self.connection().await?;
        let limit = i64::try_from(limit.max(1)).unwrap_or(i64::MAX);
        let mut rows = match resource {
            Some(resource) => conn
                .get()
                .query(
                    "SELECT payload FROM audit_events
                     WHERE project_id = ? AND resource = ?
                     ORDER BY timestamp_epoch DESC, id DESC LIMIT ?",
                    params![project_id.to_string(), resource.to_string(), limit],
                )
                .await ,
            None => conn
                .get()
                .query(
                    "SELECT payload FROM audit_events
                     WHERE project_id = ?
                     ORDER BY timestamp_epoch DESC, id DESC LIMIT ?",
                    params![project_id.to_string(), limit],
                )
                .await,
        }
        .map_err(storage_err("failed to list audit events"))?;

        let mut events = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(storage_err("failed to fetch audit row"))?
        {
            let payload: String = row.get(0).map_err(storage_err("audit payload column"))?;
            events.push(decode(&payload, "audit event")?);
        }
        Ok(events)
    }

    async fn ping(&self) -> Result<()> {
        let conn = self.connection().await?;
        conn.get()
            .query("SELECT 1", ())
            .await
            .map_err(storage_err("metadata ping failed"))?;
        Ok(())
    }
}
