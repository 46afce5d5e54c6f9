//! Per-source JSON snapshot of every extracted article.
//!
//! The snapshot is both the crawl's memory (its URLs seed the seen set) and
//! one of the two article sinks.
//!
//! # Lifecycle
//!
//! ```text
//! load()      -> read {snapshot_dir}/{sanitized base url}.json
//! append()    -> write `<record>,\n` fragments while the crawl runs
//! finalize()  -> replace the file with one JSON array of all records
//! ```
//!
//! Between the first `append` and `finalize` the file is not valid JSON. A
//! file that fails to parse on the next `load` counts as "no prior data".

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::models::ArticleRecord;
use crate::utils::snapshot_filename;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Snapshot file for one source.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl SnapshotStore {
    /// Snapshot for the source at `base_url`, stored in `dir`.
    pub fn new(dir: impl AsRef<Path>, base_url: &str) -> Self {
        Self {
            path: dir.as_ref().join(snapshot_filename(base_url)),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read prior records and the set of their URLs.
    ///
    /// A missing or unparsable file yields empty results. Objects in a valid
    /// array are kept whatever fields they carry; only a string `url` feeds
    /// the seen set.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> (Vec<ArticleRecord>, HashSet<String>) {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No snapshot yet; first run for this source");
                return (Vec::new(), HashSet::new());
            }
            Err(e) => {
                warn!(error = %e, "Could not read snapshot; starting without prior articles");
                return (Vec::new(), HashSet::new());
            }
        };

        let entries = match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Snapshot is not a valid JSON array; starting without prior articles");
                return (Vec::new(), HashSet::new());
            }
        };

        let mut records = Vec::with_capacity(entries.len());
        let mut seen = HashSet::new();
        for entry in entries {
            match entry {
                Value::Object(fields) => {
                    let record = ArticleRecord::from_object(fields);
                    match record.url() {
                        Some(url) => {
                            seen.insert(url.to_string());
                        }
                        None => warn!("Snapshot record has no url; keeping it without deduplication"),
                    }
                    records.push(record);
                }
                other => warn!(entry = %other, "Dropping non-object snapshot entry"),
            }
        }
        info!(records = records.len(), urls = seen.len(), "Loaded snapshot");
        (records, seen)
    }

    /// Append one record as a `<json>,\n` fragment.
    ///
    /// Concurrent callers are serialized so fragments never interleave.
    pub async fn append(&self, record: &ArticleRecord) -> Result<(), SnapshotError> {
        let mut fragment = to_pretty_json(record)?;
        fragment.extend_from_slice(b",\n");

        let _guard = self.append_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| self.io_error(source))?;
        file.write_all(&fragment)
            .await
            .map_err(|source| self.io_error(source))?;
        file.flush().await.map_err(|source| self.io_error(source))?;
        debug!(url = record.url().unwrap_or_default(), path = %self.path.display(), "Appended article to snapshot");
        Ok(())
    }

    /// Replace the snapshot with a valid JSON array of `records`.
    ///
    /// The array is written to a temp file next to the snapshot and renamed
    /// over it.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn finalize(&self, records: &[ArticleRecord]) -> Result<(), SnapshotError> {
        let json = to_pretty_json(&records)?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = self.path.with_file_name(format!(".{file_name}.tmp"));

        let _guard = self.append_lock.lock().await;
        fs::write(&temp_path, &json)
            .await
            .map_err(|source| SnapshotError::Io {
                path: temp_path.clone(),
                source,
            })?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|source| self.io_error(source))?;

        info!("Saved {} articles to {}", records.len(), self.path.display());
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Pretty JSON with a four-space indent; non-ASCII is written as-is.
fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    Ok(buf)
}
