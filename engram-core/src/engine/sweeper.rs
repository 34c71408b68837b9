//! Background maintenance: pending-row rollback and tombstone purge.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{MemoryEngine, PENDING_ROLLBACK_AFTER};
use crate::error::Result;

/// What one sweep accomplished.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SweepReport {
    /// Pending rows rolled back (two-step writes that never completed)
    pub rolled_back: usize,
    /// Tombstones hard-purged past their retention window
    pub purged: usize,
}

impl MemoryEngine {
    /// One maintenance pass. Safe to run concurrently with requests.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let cutoff = Utc::now()
            - chrono::Duration::from_std(PENDING_ROLLBACK_AFTER)
                .unwrap_or_else(|_| chrono::Duration::seconds(300));

        for (project_id, chunk_id) in self.metadata().list_pending_before(cutoff).await? {
            // The vector may or may not have landed; remove both sides.
            if let Err(e) = self.vectors().delete(chunk_id).await {
                warn!(chunk_id = %chunk_id, error = %e, "sweeper vector delete failed");
            }
            self.metadata().remove_chunk(&project_id, chunk_id).await?;
            report.rolled_back += 1;
        }

        report.purged = self.metadata().purge_expired(Utc::now()).await?;
        if report.rolled_back > 0 || report.purged > 0 {
            debug!(
                rolled_back = report.rolled_back,
                purged = report.purged,
                "sweep complete"
            );
        }
        Ok(report)
    }
}

/// Run [`MemoryEngine::sweep_once`] on an interval until the handle drops.
pub fn spawn_sweeper(engine: Arc<MemoryEngine>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = engine.sweep_once().await {
                warn!(error = %e, "sweep failed");
            }
        }
    })
}
