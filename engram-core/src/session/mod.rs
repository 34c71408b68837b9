//! Session lifecycle.
//!
//! Sessions bound related activity inside a project. They are mutable only
//! while active; ending one freezes it with a derived productivity score.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::{EventBus, MemoryEvent};
use crate::metadata::MetadataStore;
use crate::types::{Session, SessionMetrics, SessionStatus, validate_project_id};

/// Manages session state on behalf of the dispatcher.
pub struct SessionManager {
    metadata: Arc<dyn MetadataStore>,
    events: EventBus,
}

impl SessionManager {
    pub fn new(metadata: Arc<dyn MetadataStore>, events: EventBus) -> Self {
        Self { metadata, events }
    }

    /// Start a session; a missing id gets a generated one.
    pub async fn start(
        &self,
        project_id: &str,
        session_id: Option<String>,
        goals: Vec<String>,
    ) -> Result<Session> {
        validate_project_id(project_id)?;
        let id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = Session::start(id.clone(), project_id.to_string(), goals);
        self.metadata.insert_session(&session).await?;
        self.events.publish(MemoryEvent::SessionStarted {
            project_id: project_id.to_string(),
            session_id: id,
        });
        Ok(session)
    }

    pub async fn get(&self, project_id: &str, session_id: &str) -> Result<Option<Session>> {
        self.metadata.get_session(project_id, session_id).await
    }

    pub async fn list(&self, project_id: &str) -> Result<Vec<Session>> {
        self.metadata.list_sessions(project_id).await
    }

    /// Accumulate activity counters; only active sessions accept them.
    pub async fn record_activity(
        &self,
        project_id: &str,
        session_id: &str,
        delta: SessionMetrics,
    ) -> Result<Session> {
        let mut session = self.require(project_id, session_id).await?;
        if !session.is_mutable() {
            return Err(Error::Conflict(format!(
                "session {session_id} is {:?} and no longer accepts activity",
                session.status
            )));
        }
        session.metrics.tasks_touched += delta.tasks_touched;
        session.metrics.files_changed += delta.files_changed;
        session.metrics.ai_interactions += delta.ai_interactions;
        self.metadata.update_session(&session).await?;
        Ok(session)
    }

    /// Pause an active session.
    pub async fn pause(&self, project_id: &str, session_id: &str) -> Result<Session> {
        self.transition(project_id, session_id, SessionStatus::Paused, &[
            SessionStatus::Active,
        ])
        .await
    }

    /// Resume a paused session.
    pub async fn resume(&self, project_id: &str, session_id: &str) -> Result<Session> {
        self.transition(project_id, session_id, SessionStatus::Active, &[
            SessionStatus::Paused,
        ])
        .await
    }

    /// End a session: freeze it as completed and compute its score.
    pub async fn end(
        &self,
        project_id: &str,
        session_id: &str,
        summary: Option<String>,
    ) -> Result<Session> {
        let mut session = self.require(project_id, session_id).await?;
        if matches!(
            session.status,
            SessionStatus::Completed | SessionStatus::Abandoned
        ) {
            return Err(Error::Conflict(format!(
                "session {session_id} already ended"
            )));
        }
        session.status = SessionStatus::Completed;
        session.ended_at = Some(Utc::now());
        if let Some(summary) = summary {
            session.summary = summary;
        }
        session.productivity_score = Some(productivity_score(&session));
        self.metadata.update_session(&session).await?;
        self.events.publish(MemoryEvent::SessionEnded {
            project_id: project_id.to_string(),
            session_id: session_id.to_string(),
        });
        Ok(session)
    }

    async fn transition(
        &self,
        project_id: &str,
        session_id: &str,
        to: SessionStatus,
        allowed_from: &[SessionStatus],
    ) -> Result<Session> {
        let mut session = self.require(project_id, session_id).await?;
        if !allowed_from.contains(&session.status) {
            return Err(Error::Conflict(format!(
                "session {session_id} cannot move from {:?} to {to:?}",
                session.status
            )));
        }
        session.status = to;
        self.metadata.update_session(&session).await?;
        Ok(session)
    }

    async fn require(&self, project_id: &str, session_id: &str) -> Result<Session> {
        self.metadata
            .get_session(project_id, session_id)
            .await?
            .ok_or_else(|| Error::Storage(format!("unknown session {session_id}")))
    }
}

/// Productivity in [0, 1]: activity volume damped by session length.
///
/// Saturates at roughly twenty touched tasks and penalizes sessions that
/// ran for hours with little recorded activity.
fn productivity_score(session: &Session) -> f64 {
    let metrics = &session.metrics;
    let activity = f64::from(metrics.tasks_touched)
        + 0.5 * f64::from(metrics.files_changed)
        + 0.1 * f64::from(metrics.ai_interactions);
    let volume = (activity / 20.0).min(1.0);

    let hours = session
        .ended_at
        .map_or(0.0, |end| (end - session.started_at).num_seconds() as f64)
        / 3600.0;
    let pace = if hours <= 0.01 {
        1.0
    } else {
        (activity / hours / 10.0).min(1.0)
    };

    (0.7 * volume + 0.3 * pace).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemoryMetadataStore;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(MemoryMetadataStore::new()), EventBus::default())
    }

    #[tokio::test]
    async fn lifecycle_start_activity_end() {
        let manager = manager();
        let session = manager
            .start("acme/api", Some("s1".into()), vec!["ship v2".into()])
            .await
            .expect("start");
        assert_eq!(session.status, SessionStatus::Active);

        manager
            .record_activity("acme/api", "s1", SessionMetrics {
                tasks_touched: 6,
                files_changed: 10,
                ai_interactions: 20,
            })
            .await
            .expect("activity");

        let ended = manager
            .end("acme/api", "s1", Some("shipped".into()))
            .await
            .expect("end");
        assert_eq!(ended.status, SessionStatus::Completed);
        assert!(ended.ended_at.is_some());
        let score = ended.productivity_score.expect("score");
        assert!(score > 0.0 && score <= 1.0);
    }

    #[tokio::test]
    async fn ended_sessions_reject_mutation() {
        let manager = manager();
        manager
            .start("acme/api", Some("s1".into()), vec![])
            .await
            .expect("start");
        manager.end("acme/api", "s1", None).await.expect("end");

        let err = manager
            .record_activity("acme/api", "s1", SessionMetrics::default())
            .await
            .expect_err("frozen");
        assert_eq!(err.code(), "conflict");

        let err = manager.end("acme/api", "s1", None).await.expect_err("dup");
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn pause_resume_round_trip() {
        let manager = manager();
        manager
            .start("acme/api", Some("s1".into()), vec![])
            .await
            .expect("start");

        let paused = manager.pause("acme/api", "s1").await.expect("pause");
        assert_eq!(paused.status, SessionStatus::Paused);
        assert!(manager.pause("acme/api", "s1").await.is_err());

        let resumed = manager.resume("acme/api", "s1").await.expect("resume");
        assert_eq!(resumed.status, SessionStatus::Active);
    }
}
