//! Records-mode input and the JSON manifest output.

use std::path::Path;

use anyhow::{Context, Result};

use crate::scraper::models::{DownloadRecord, ManifestEntry, MediaRecord};

/// Reads a records file: a JSON array of objects with `id`, `url` and any
/// extra metadata fields.
pub async fn load_records(path: &Path) -> Result<Vec<MediaRecord>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read records file {}", path.display()))?;

    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse records file {}", path.display()))
}

/// Pairs input records with their download outcomes, keeping only the
/// successes, in input order.
pub fn successful_entries(records: &[MediaRecord], results: &[DownloadRecord]) -> Vec<ManifestEntry> {
    records
        .iter()
        .zip(results)
        .filter(|(_, result)| result.success)
        .filter_map(|(record, result)| {
            result.resolved_local_path.as_ref().map(|path| ManifestEntry {
                record: record.clone(),
                local_path: path.display().to_string(),
            })
        })
        .collect()
}

/// Writes the manifest as a pretty-printed JSON array.
pub async fn write_manifest(path: &Path, entries: &[ManifestEntry]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write manifest {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::models::DownloadTask;
    use serde_json::{Map, Value, json};
    use std::path::PathBuf;

    fn record(id: &str, url: &str, extra: Map<String, Value>) -> MediaRecord {
        MediaRecord {
            id: id.to_string(),
            url: url.to_string(),
            extra,
        }
    }

    fn result(record: &MediaRecord, success: bool) -> DownloadRecord {
        let task = DownloadTask::for_record(record, Path::new("out"));
        let path = success.then(|| task.local_path.clone());
        DownloadRecord {
            task,
            success,
            resolved_local_path: path,
        }
    }

    #[tokio::test]
    async fn loads_records_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(
            &path,
            r#"[{"id": "1", "url": "https://host/a.jpg", "author": "someone"}]"#,
        )
        .unwrap();

        let records = load_records(&path).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "1");
        assert_eq!(records[0].extra["author"], "someone");
    }

    #[tokio::test]
    async fn rejects_a_malformed_records_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(load_records(&path).await.is_err());
    }

    #[test]
    fn manifest_keeps_only_successes_in_order() {
        let mut extra = Map::new();
        extra.insert("author".to_string(), json!("someone"));
        let records = vec![
            record("1", "https://host/a.jpg", extra),
            record("2", "https://host/b.jpg", Map::new()),
            record("3", "https://host/c.jpg", Map::new()),
        ];
        let results = vec![
            result(&records[0], true),
            result(&records[1], false),
            result(&records[2], true),
        ];

        let entries = successful_entries(&records, &results);
        let ids: Vec<&str> = entries.iter().map(|e| e.record.id.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
        assert_eq!(entries[0].record.extra["author"], "someone");
        assert_eq!(entries[0].local_path, PathBuf::from("out").join("1.jpg").display().to_string());
    }

    #[tokio::test]
    async fn manifest_round_trips_as_a_flat_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        let mut extra = Map::new();
        extra.insert("likes".to_string(), json!(7));
        let records = vec![record("1", "https://host/a.jpg", extra)];
        let results = vec![result(&records[0], true)];
        write_manifest(&path, &successful_entries(&records, &results))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        let entry = &parsed[0];
        assert_eq!(entry["id"], "1");
        assert_eq!(entry["url"], "https://host/a.jpg");
        assert_eq!(entry["likes"], 7);
        assert!(entry["local_path"].as_str().unwrap().ends_with(".jpg"));
    }
}
