//! Inbox Watcher: polls a directory and feeds new files to the pipeline.
//!
//! The watcher is a thin caller. Idempotency, atomicity, and job recording
//! all live in [`EtlPipeline`]; the watcher only decides which files to
//! offer and when. Files that already have a `success` job come back as
//! `Skipped`; failed files are offered again on the next cycle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::pipeline::{EtlPipeline, Outcome};
use crate::source::extract_cliente_id;

pub struct InboxWatcher {
    pipeline: EtlPipeline,
    inbox_dir: PathBuf,
    default_cliente_id: String,
    poll_interval: Duration,
}

impl InboxWatcher {
    pub fn new(pipeline: EtlPipeline, config: &IngestConfig) -> Self {
        Self {
            pipeline,
            inbox_dir: PathBuf::from(&config.inbox_dir),
            default_cliente_id: config.default_cliente_id.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        }
    }

    /// Poll the inbox until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            inbox = %self.inbox_dir.display(),
            interval_secs = self.poll_interval.as_secs(),
            default_cliente = %self.default_cliente_id,
            "inbox watcher started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.scan_once(&cancel).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {},
            }
        }

        info!("inbox watcher stopped");
    }

    /// One pass over the inbox directory.
    pub async fn scan_once(&self, cancel: &CancellationToken) {
        let files = match list_source_files(&self.inbox_dir) {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    inbox = %self.inbox_dir.display(),
                    error = %e,
                    "inbox directory not readable, waiting"
                );
                return;
            },
        };

        if files.is_empty() {
            debug!(inbox = %self.inbox_dir.display(), "no source files found");
            return;
        }

        for path in files {
            if cancel.is_cancelled() {
                break;
            }

            let cliente_id = extract_cliente_id(&path, &self.default_cliente_id);
            match self.pipeline.ingest_file(&cliente_id, &path, cancel).await {
                Ok(Outcome::Ingested { job_id, rows_imported }) => {
                    info!(%job_id, cliente_id, file = %path.display(), rows_imported, "file ingested");
                },
                Ok(Outcome::Skipped) => {
                    debug!(cliente_id, file = %path.display(), "file already processed");
                },
                Ok(Outcome::Failed { job_id, error_message }) => {
                    warn!(%job_id, cliente_id, file = %path.display(), error_message, "file failed, will retry next cycle");
                },
                Err(e) => {
                    // Could not even record an attempt; leave the file for
                    // the next cycle.
                    error!(cliente_id, file = %path.display(), error = %e, "ingestion attempt not recorded");
                },
            }
        }
    }
}

/// CSV files in the inbox, sorted by name for a deterministic processing
/// order.
fn list_source_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_source_files_filters_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("b__fev.csv"), "a\n1\n").expect("write");
        std::fs::write(dir.path().join("a__jan.CSV"), "a\n1\n").expect("write");
        std::fs::write(dir.path().join("notas.txt"), "ignorar").expect("write");
        std::fs::create_dir(dir.path().join("sub.csv")).expect("mkdir");

        let files = list_source_files(dir.path()).expect("list");
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();

        assert_eq!(
            names,
            vec![
                Some("a__jan.CSV".to_string()),
                Some("b__fev.csv".to_string())
            ]
        );
    }

    #[test]
    fn test_list_source_files_missing_dir_errors() {
        assert!(list_source_files(Path::new("/definitely/not/here")).is_err());
    }
}
