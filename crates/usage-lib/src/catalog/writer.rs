//! Calendar-partitioned snapshot persistence
//!
//! Snapshots land under `<base>/period=<YYYYMMDD>-<YYYYMMDD>/` where the
//! period is the UTC calendar month covering the snapshot time.

use crate::models::Snapshot;
use chrono::{DateTime, Datelike, Months, TimeZone, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Errors raised while persisting a snapshot
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("snapshot time {time:?} is not a valid RFC 3339 timestamp")]
    InvalidTimestamp {
        time: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("no calendar month covers {0}")]
    OutOfRange(DateTime<Utc>),
    #[error("failed to create partition directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize snapshot")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write snapshot file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Start (inclusive) and end (exclusive) of the calendar month covering `at`
pub fn partition_period(at: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let begin = Utc
        .with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .single()?;
    let end = begin.checked_add_months(Months::new(1))?;
    Some((begin, end))
}

/// Partition directory name, e.g. `period=20240301-20240401`
pub fn partition_dir(begin: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("period={}-{}", begin.format("%Y%m%d"), end.format("%Y%m%d"))
}

/// Snapshot file name with every space replaced by an underscore
///
/// The timestamp is rendered in its human-readable UTC form
/// (`2024-03-05 12:00:00.123 UTC`), which contains spaces.
pub fn snapshot_filename(cluster_id: &str, at: DateTime<Utc>) -> String {
    format!("{}---{}.json", cluster_id, at).replace(' ', "_")
}

/// Writes snapshots into calendar-month partitions under a base path
pub struct PartitionedWriter {
    base_path: PathBuf,
    /// Serializes writes so that overlapping ticks never race on one cluster id
    lock: Mutex<()>,
}

impl PartitionedWriter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Full path a snapshot taken at `at` is written to
    pub fn snapshot_path(
        &self,
        cluster_id: &str,
        at: DateTime<Utc>,
    ) -> Result<PathBuf, WriteError> {
        let (begin, end) = partition_period(at).ok_or(WriteError::OutOfRange(at))?;
        Ok(self
            .base_path
            .join(partition_dir(begin, end))
            .join(snapshot_filename(cluster_id, at)))
    }

    /// Persist a snapshot, replacing any file with the same name
    ///
    /// Returns the path written.
    pub async fn write(
        &self,
        snapshot: &Snapshot,
        cluster_id: &str,
    ) -> Result<PathBuf, WriteError> {
        let at = DateTime::parse_from_rfc3339(&snapshot.time)
            .map_err(|source| WriteError::InvalidTimestamp {
                time: snapshot.time.clone(),
                source,
            })?
            .with_timezone(&Utc);
        let path = self.snapshot_path(cluster_id, at)?;
        let json = serde_json::to_vec(snapshot)?;

        let _guard = self.lock.lock().await;

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| WriteError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        // Write through a temp file so readers never see a partial snapshot
        let temp_path = path.with_extension("json.tmp");
        let written = match tokio::fs::write(&temp_path, &json).await {
            Ok(()) => tokio::fs::rename(&temp_path, &path).await,
            Err(e) => Err(e),
        };
        if let Err(source) = written {
            if let Err(e) = tokio::fs::remove_file(&temp_path).await {
                debug!(path = %temp_path.display(), error = %e, "Temp file not removed");
            }
            return Err(WriteError::Write { path, source });
        }

        debug!(path = %path.display(), bytes = json.len(), "Snapshot written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_partition_covers_timestamp() {
        let samples = [
            utc(2024, 3, 5, 12, 0, 0),
            utc(2024, 1, 1, 0, 0, 0),
            utc(2024, 2, 29, 23, 59, 59),
            utc(2023, 12, 31, 23, 59, 59),
            utc(2025, 7, 15, 6, 30, 0),
        ];

        for at in samples {
            let (begin, end) = partition_period(at).unwrap();
            assert!(begin <= at && at < end, "{at} not in [{begin}, {end})");
            assert_eq!(begin.day(), 1);
            assert_eq!(end, begin.checked_add_months(Months::new(1)).unwrap());
        }
    }

    #[test]
    fn test_partition_dir_names() {
        let (begin, end) = partition_period(utc(2024, 3, 5, 12, 0, 0)).unwrap();
        assert_eq!(partition_dir(begin, end), "period=20240301-20240401");

        let (begin, end) = partition_period(utc(2023, 12, 31, 23, 59, 59)).unwrap();
        assert_eq!(partition_dir(begin, end), "period=20231201-20240101");
    }

    #[test]
    fn test_filename_has_no_spaces() {
        let at = utc(2024, 3, 5, 12, 0, 0);
        assert!(at.to_string().contains(' '));

        let name = snapshot_filename("east-1", at);
        assert!(!name.contains(' '));
        assert_eq!(name, "east-1---2024-03-05_12:00:00_UTC.json");
    }

    #[test]
    fn test_filename_replaces_spaces_in_cluster_id() {
        let name = snapshot_filename("east 1", utc(2024, 3, 5, 12, 0, 0));
        assert!(name.starts_with("east_1---"));
    }

    #[tokio::test]
    async fn test_write_creates_partition_and_file() {
        let temp_dir = TempDir::new().unwrap();
        let writer = PartitionedWriter::new(temp_dir.path().join("logs"));

        let snapshot = Snapshot {
            cluster_id: "east-1".to_string(),
            time: "2024-03-05T12:00:00.250Z".to_string(),
            success: true,
            ..Default::default()
        };

        let path = writer.write(&snapshot, "east-1").await.unwrap();
        assert_eq!(
            path,
            temp_dir
                .path()
                .join("logs")
                .join("period=20240301-20240401")
                .join("east-1---2024-03-05_12:00:00.250_UTC.json")
        );

        let data = tokio::fs::read(&path).await.unwrap();
        let decoded: Snapshot = serde_json::from_slice(&data).unwrap();
        assert_eq!(decoded, snapshot);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_replaces_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let writer = PartitionedWriter::new(temp_dir.path());

        let mut snapshot = Snapshot {
            time: "2024-03-05T12:00:00Z".to_string(),
            ..Default::default()
        };
        writer.write(&snapshot, "east-1").await.unwrap();

        snapshot.error_message = "second".to_string();
        let path = writer.write(&snapshot, "east-1").await.unwrap();

        let decoded: Snapshot = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(decoded.error_message, "second");
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let writer = PartitionedWriter::new(temp_dir.path());
        let snapshot = Snapshot {
            time: "2024-03-05T12:00:00Z".to_string(),
            ..Default::default()
        };

        // A directory squatting on the target name makes the rename fail
        let target = writer
            .snapshot_path("east-1", utc(2024, 3, 5, 12, 0, 0))
            .unwrap();
        std::fs::create_dir_all(target.join("occupied")).unwrap();

        let result = writer.write(&snapshot, "east-1").await;
        assert!(matches!(result, Err(WriteError::Write { .. })));
        assert!(!target.with_extension("json.tmp").exists());
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn test_write_rejects_invalid_timestamp() {
        let temp_dir = TempDir::new().unwrap();
        let writer = PartitionedWriter::new(temp_dir.path());

        let snapshot = Snapshot {
            time: "yesterday".to_string(),
            ..Default::default()
        };
        let result = writer.write(&snapshot, "east-1").await;
        assert!(matches!(result, Err(WriteError::InvalidTimestamp { .. })));
    }

    #[tokio::test]
    async fn test_write_reports_unwritable_base_path() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let writer = PartitionedWriter::new(&blocker);
        let snapshot = Snapshot {
            time: "2024-03-05T12:00:00Z".to_string(),
            ..Default::default()
        };
        let result = writer.write(&snapshot, "east-1").await;
        assert!(matches!(result, Err(WriteError::CreateDir { .. })));
    }
}
