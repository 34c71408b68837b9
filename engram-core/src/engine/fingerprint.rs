//! Per-project fingerprint locks for duplicate-write collapse.
//!
//! Concurrent stores of the same `(project_id, content_hash)` funnel
//! through one `OnceCell`: the first caller runs the write, the rest wait
//! and observe the same chunk ids. Entries are dropped once initialization
//! settles, so later identical stores create fresh chunks.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::error::Result;

type Key = (String, u64);
type Cell = Arc<OnceCell<Vec<Uuid>>>;

#[derive(Default)]
pub struct FingerprintLocks {
    cells: Mutex<HashMap<Key, Cell>>,
}

impl FingerprintLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` at most once per concurrent `(project, fingerprint)` group.
    pub async fn run<F, Fut>(&self, project_id: &str, fingerprint: u64, op: F) -> Result<Vec<Uuid>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Uuid>>>,
    {
        let key = (project_id.to_string(), fingerprint);
        let cell = {
            let mut cells = self.cells.lock();
            Arc::clone(cells.entry(key.clone()).or_default())
        };

        let result = cell.get_or_try_init(op).await.cloned();

        // First settled caller retires the entry; waiters still hold the
        // cell through their own Arc.
        let mut cells = self.cells.lock();
        if let Some(existing) = cells.get(&key) {
            if Arc::ptr_eq(existing, &cell) {
                cells.remove(&key);
            }
        }
        result
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.cells.lock().len()
    }
}
