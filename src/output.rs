//! Artifact encoding and atomic publication to a local directory.
//!
//! An artifact is a CSV file with a `productid,avg_rating` header and one row
//! per product. Publication writes a uniquely named staging file next to the
//! canonical path, verifies it, and renames it over the canonical path.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::analyzers::types::AggregateRow;
use crate::config::Period;
use crate::error::{PipelineError, Result};
use crate::services::publisher::{ArtifactPublisher, PublishReceipt};

/// Header row of every artifact.
pub const HEADER: [&str; 2] = ["productid", "avg_rating"];

/// Serializes `rows` as CSV. The header is written even when `rows` is empty.
pub fn encode_artifact(rows: &[AggregateRow]) -> csv::Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false) // header is written by hand so empty sets still get one
        .from_writer(Vec::new());

    writer.write_record(HEADER)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Checks that `bytes` is a complete artifact holding `expected_rows` rows.
pub fn verify_artifact(bytes: &[u8], expected_rows: usize) -> std::result::Result<(), String> {
    if bytes.last() != Some(&b'\n') {
        return Err(format!(
            "artifact is truncated ({} bytes, no trailing newline)",
            bytes.len()
        ));
    }

    let mut reader = csv::Reader::from_reader(bytes);
    let headers = reader.headers().map_err(|e| e.to_string())?;
    if headers.iter().ne(HEADER.iter().copied()) {
        return Err(format!("unexpected header {:?}", headers));
    }

    let mut rows = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        if record.len() != HEADER.len() {
            return Err(format!("row {} has {} fields", rows + 1, record.len()));
        }
        rows += 1;
    }

    if rows != expected_rows {
        return Err(format!("expected {expected_rows} rows, found {rows}"));
    }
    Ok(())
}

/// Directory holding one current artifact per period.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    dir: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Canonical artifact path for `period`.
    pub fn artifact_path(&self, period: Period) -> PathBuf {
        self.dir.join(period.artifact_file_name())
    }

    /// Returns the current artifact bytes, or `None` if nothing was published.
    pub fn read_artifact(&self, period: Period) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.artifact_path(period)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Writes and verifies a staging file without touching the canonical path.
    ///
    /// Dropping the returned [`StagedArtifact`] deletes the staging file.
    pub fn stage(&self, period: Period, rows: &[AggregateRow]) -> Result<StagedArtifact> {
        let target = self.artifact_path(period);

        fs::create_dir_all(&self.dir).map_err(|e| PipelineError::publish(&target, e))?;

        let body = encode_artifact(rows).map_err(|e| PipelineError::publish(&target, e))?;

        let mut file = tempfile::Builder::new()
            .prefix(&format!(".tmp_ratings_month_{}_", period))
            .suffix(".csv")
            .tempfile_in(&self.dir)
            .map_err(|e| PipelineError::publish(&target, e))?;
        let staging = file.path().to_path_buf();
        debug!(staging = %staging.display(), "Writing staging artifact");

        file.write_all(&body)
            .map_err(|e| PipelineError::publish(&staging, e))?;
        file.as_file()
            .sync_all()
            .map_err(|e| PipelineError::publish(&staging, e))?;

        let written = fs::read(&staging).map_err(|e| PipelineError::publish(&staging, e))?;
        if written.len() != body.len() {
            return Err(PipelineError::publish(
                &staging,
                format!(
                    "staging file holds {} bytes, expected {}",
                    written.len(),
                    body.len()
                ),
            ));
        }
        verify_artifact(&written, rows.len())
            .map_err(|reason| PipelineError::publish(&staging, reason))?;

        Ok(StagedArtifact {
            file,
            target,
            bytes: body.len(),
            rows: rows.len(),
        })
    }
}

/// A verified artifact waiting to be promoted to its canonical path.
#[derive(Debug)]
pub struct StagedArtifact {
    file: NamedTempFile,
    target: PathBuf,
    bytes: usize,
    rows: usize,
}

impl StagedArtifact {
    pub fn staging_path(&self) -> &Path {
        self.file.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Renames the staging file over the canonical path.
    ///
    /// The rename replaces any previous artifact in one step, so the canonical
    /// path never disappears or holds a partial file.
    pub fn commit(self) -> Result<PublishReceipt> {
        let StagedArtifact {
            file,
            target,
            bytes,
            rows,
        } = self;

        // On failure the PersistError owns the temp file and deletes it on drop.
        file.persist(&target)
            .map_err(|e| PipelineError::publish(&target, e.error))?;

        if let Some(parent) = target.parent() {
            if let Err(e) = sync_dir(parent) {
                warn!(dir = %parent.display(), error = %e, "Failed to sync artifact directory");
            }
        }

        info!(path = %target.display(), bytes, rows, "Artifact published");
        Ok(PublishReceipt {
            location: target.display().to_string(),
            bytes,
            rows,
        })
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[async_trait::async_trait]
impl ArtifactPublisher for LocalArtifactStore {
    #[tracing::instrument(skip(self, rows), fields(dir = %self.dir.display(), rows = rows.len()))]
    async fn publish(&self, period: Period, rows: &[AggregateRow]) -> Result<PublishReceipt> {
        let store = self.clone();
        let rows = rows.to_vec();
        let target = self.artifact_path(period);

        // Once started the blocking task runs to completion even if this
        // future is dropped, and the rename is still the only visible change.
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || span.in_scope(|| store.stage(period, &rows)?.commit()))
            .await
            .map_err(|e| PipelineError::publish(target, e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(product: &str, avg: f64) -> AggregateRow {
        AggregateRow {
            product_id: product.to_string(),
            avg_rating: avg,
        }
    }

    fn june() -> Period {
        Period::new(6).unwrap()
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_encode_empty_is_header_only() {
        let bytes = encode_artifact(&[]).unwrap();
        assert_eq!(bytes, b"productid,avg_rating\n");
    }

    #[test]
    fn test_encode_rows() {
        let bytes = encode_artifact(&[row("p1", 4.0), row("p2", 2.5)]).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "productid,avg_rating\np1,4.0\np2,2.5\n"
        );
    }

    #[test]
    fn test_verify_accepts_encoded_artifact() {
        let rows = vec![row("p1", 4.0), row("p2", 1.0 / 3.0)];
        let bytes = encode_artifact(&rows).unwrap();
        assert!(verify_artifact(&bytes, 2).is_ok());
    }

    #[test]
    fn test_verify_rejects_wrong_row_count() {
        let bytes = encode_artifact(&[row("p1", 4.0)]).unwrap();
        let err = verify_artifact(&bytes, 2).unwrap_err();
        assert!(err.contains("expected 2 rows, found 1"));
    }

    #[test]
    fn test_verify_rejects_truncated_bytes() {
        let bytes = encode_artifact(&[row("p1", 4.0)]).unwrap();
        let truncated = &bytes[..bytes.len() - 3];
        assert!(verify_artifact(truncated, 1).is_err());
        assert!(verify_artifact(b"", 0).is_err());
    }

    #[test]
    fn test_verify_rejects_wrong_header() {
        assert!(verify_artifact(b"product,avg\np1,4.0\n", 1).is_err());
    }

    #[tokio::test]
    async fn test_publish_creates_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(tmp.path().join("output"));

        let receipt = store.publish(june(), &[row("p1", 4.0)]).await.unwrap();

        let path = store.artifact_path(june());
        assert_eq!(receipt.location, path.display().to_string());
        assert_eq!(receipt.rows, 1);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.len(), receipt.bytes);
        assert_eq!(content, "productid,avg_rating\np1,4.0\n");
        assert_eq!(
            dir_entries(store.dir()),
            vec!["aggregated_ratings_month_6.csv"]
        );
    }

    #[tokio::test]
    async fn test_publish_replaces_previous_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(tmp.path());

        store.publish(june(), &[row("old", 1.0)]).await.unwrap();
        store.publish(june(), &[row("new", 2.0)]).await.unwrap();

        let content = store.read_artifact(june()).unwrap().unwrap();
        assert_eq!(content, b"productid,avg_rating\nnew,2.0\n");
        assert_eq!(dir_entries(tmp.path()).len(), 1);
    }

    #[test]
    fn test_abandoned_stage_leaves_canonical_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(tmp.path());
        let path = store.artifact_path(june());
        fs::write(&path, "productid,avg_rating\nprior,3.0\n").unwrap();

        let staged = store.stage(june(), &[row("p1", 4.0)]).unwrap();
        let staging_path = staged.staging_path().to_path_buf();
        assert!(staging_path.exists());
        assert_ne!(staging_path, path);
        drop(staged);

        assert!(!staging_path.exists());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "productid,avg_rating\nprior,3.0\n"
        );
    }

    #[test]
    fn test_failed_commit_reports_publish_failed_and_cleans_staging() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(tmp.path());

        // A non-empty directory at the canonical path cannot be renamed over.
        let blocker = store.artifact_path(june());
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), "x").unwrap();

        let staged = store.stage(june(), &[row("p1", 4.0)]).unwrap();
        let err = staged.commit().unwrap_err();

        assert!(matches!(err, PipelineError::PublishFailed { .. }));
        assert!(blocker.join("keep").exists());
        assert_eq!(
            dir_entries(tmp.path()),
            vec!["aggregated_ratings_month_6.csv"]
        );
    }

    #[test]
    fn test_concurrent_reader_never_sees_partial_artifact() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let tmp = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(tmp.path());

        let small = vec![row("p1", 4.0)];
        let large: Vec<AggregateRow> = (0..2_000)
            .map(|i| row(&format!("product-{i:05}"), (i % 5) as f64 + 0.5))
            .collect();
        let small_bytes = encode_artifact(&small).unwrap();
        let large_bytes = encode_artifact(&large).unwrap();

        let path = store.artifact_path(june());
        fs::write(&path, &small_bytes).unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let reader = {
            let done = Arc::clone(&done);
            let path = path.clone();
            let (small_bytes, large_bytes) = (small_bytes.clone(), large_bytes.clone());
            thread::spawn(move || {
                let mut reads = 0usize;
                loop {
                    let finished = done.load(Ordering::Acquire);
                    if let Ok(bytes) = fs::read(&path) {
                        assert!(!bytes.is_empty(), "read an empty artifact");
                        assert!(
                            bytes == small_bytes || bytes == large_bytes,
                            "read a partial artifact of {} bytes",
                            bytes.len()
                        );
                        reads += 1;
                    }
                    if finished {
                        return reads;
                    }
                }
            })
        };

        for i in 0..50 {
            let rows = if i % 2 == 0 { &large } else { &small };
            store.stage(june(), rows).unwrap().commit().unwrap();
        }
        done.store(true, Ordering::Release);

        let reads = reader.join().unwrap();
        assert!(reads > 0);
        assert_eq!(fs::read(&path).unwrap(), small_bytes);
    }

    #[test]
    fn test_read_artifact_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(tmp.path());
        assert!(store.read_artifact(june()).unwrap().is_none());
    }
}
