//! Append-only audit logging.
//!
//! Events flow through a bounded channel to a writer task, one JSON object
//! per line, with file output rotated by size and age. The logging path
//! never blocks request handling: a saturated channel drops the entry and
//! counts it.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::Result;
use crate::types::AuditEvent;

/// Where audit lines go.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuditOutput {
    #[default]
    Stderr,
    Stdout,
    File(PathBuf),
    /// Discard everything; for tests
    Null,
}

/// Audit logger configuration.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub enabled: bool,
    pub output: AuditOutput,
    /// Rotate the file once it grows past this many bytes
    pub max_file_bytes: u64,
    /// Rotate the file once its oldest entry is this old
    pub max_file_age_days: i64,
    /// Buffered entries before the logger starts dropping
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output: AuditOutput::Stderr,
            max_file_bytes: 16 * 1024 * 1024,
            max_file_age_days: 7,
            queue_capacity: 1024,
        }
    }
}

/// Non-blocking JSONL audit logger.
pub struct AuditLogger {
    sender: Option<mpsc::Sender<AuditEvent>>,
    dropped: Arc<AtomicU64>,
}

impl AuditLogger {
    /// Start the writer task.
    pub fn new(config: AuditConfig) -> Self {
        if !config.enabled {
            return Self {
                sender: None,
                dropped: Arc::new(AtomicU64::new(0)),
            };
        }
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        tokio::spawn(writer_loop(config, receiver));
        Self {
            sender: Some(sender),
            dropped,
        }
    }

    /// Disabled logger that swallows everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(AuditConfig {
            enabled: false,
            ..AuditConfig::default()
        })
    }

    /// Queue an entry; drops (and counts) when the writer is saturated.
    pub fn log(&self, event: AuditEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.try_send(event).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped, "audit queue saturated; entry dropped");
        }
    }

    /// Entries lost to backpressure so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn writer_loop(config: AuditConfig, mut receiver: mpsc::Receiver<AuditEvent>) {
    let mut file_state: Option<FileState> = None;
    while let Some(event) = receiver.recv().await {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "failed to serialize audit event");
                continue;
            }
        };
        match &config.output {
            AuditOutput::Null => {}
            AuditOutput::Stdout => println!("{line}"),
            AuditOutput::Stderr => eprintln!("{line}"),
            AuditOutput::File(path) => {
                if let Err(e) = write_line(path, &config, &mut file_state, &line).await {
                    error!(error = %e, "failed to write audit line");
                }
            }
        }
    }
}

struct FileState {
    bytes_written: u64,
    opened_at: DateTime<Utc>,
}

async fn write_line(
    path: &PathBuf,
    config: &AuditConfig,
    state: &mut Option<FileState>,
    line: &str,
) -> Result<()> {
    let needs_rotation = match state {
        Some(s) => {
            s.bytes_written + line.len() as u64 + 1 > config.max_file_bytes
                || (Utc::now() - s.opened_at).num_days() >= config.max_file_age_days
        }
        None => tokio::fs::metadata(path)
            .await
            .map(|m| m.len() + line.len() as u64 + 1 > config.max_file_bytes)
            .unwrap_or(false),
    };

    if needs_rotation {
        let rotated = path.with_extension(format!("{}.jsonl", Utc::now().timestamp()));
        if let Err(e) = tokio::fs::rename(path, &rotated).await {
            warn!(error = %e, "audit rotation failed; continuing in place");
        }
        *state = None;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await?;

    let written = line.len() as u64 + 1;
    match state {
        Some(s) => s.bytes_written += written,
        None => {
            *state = Some(FileState {
                bytes_written: file.metadata().await.map(|m| m.len()).unwrap_or(written),
                opened_at: Utc::now(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn writes_one_json_object_per_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.jsonl");
        let logger = AuditLogger::new(AuditConfig {
            output: AuditOutput::File(path.clone()),
            ..AuditConfig::default()
        });

        logger.log(AuditEvent::now("tester", "store_content", "c1").with_project("acme/api"));
        logger.log(AuditEvent::now("tester", "delete_content", "c1").with_success(false));

        // Let the writer task drain.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let raw = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: AuditEvent = serde_json::from_str(line).expect("valid json");
            assert_eq!(parsed.actor, "tester");
        }
    }

    #[tokio::test]
    async fn size_rotation_renames_the_active_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.jsonl");
        let logger = AuditLogger::new(AuditConfig {
            output: AuditOutput::File(path.clone()),
            max_file_bytes: 200,
            ..AuditConfig::default()
        });

        for n in 0..8 {
            logger.log(AuditEvent::now("tester", "store_content", &format!("c{n}")));
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        let rotated = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(std::result::Result::ok)
            .count();
        assert!(rotated >= 2, "expected the file to have rotated");
    }

    #[tokio::test]
    async fn disabled_logger_is_a_no_op() {
        let logger = AuditLogger::disabled();
        logger.log(AuditEvent::now("tester", "noop", "r"));
        assert_eq!(logger.dropped(), 0);
    }
}
