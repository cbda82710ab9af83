use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// One unit of work: a single URL-to-file download.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub id: String,
    pub source_url: String,
    pub local_path: PathBuf,
}

impl DownloadTask {
    /// Task for a scanned media URL. The sanitized file name doubles as the
    /// identifier, so the local path is a pure function of it.
    pub fn for_media(file_name: &str, source_url: &str, out_dir: &Path) -> Self {
        Self {
            id: file_name.to_string(),
            source_url: source_url.to_string(),
            local_path: out_dir.join(file_name),
        }
    }

    /// Task for a caller-supplied record. The record id becomes the file
    /// stem; the extension is taken from the URL when it is a known image
    /// extension, falling back to `jpg`.
    pub fn for_record(record: &MediaRecord, out_dir: &Path) -> Self {
        let ext = known_extension(&record.url).unwrap_or("jpg");
        let file_name = sanitize_file_name(&format!("{}.{ext}", record.id));
        Self {
            id: record.id.clone(),
            source_url: record.url.clone(),
            local_path: out_dir.join(file_name),
        }
    }
}

/// The outcome of attempting one task. Created once, never mutated.
#[derive(Debug)]
pub struct DownloadRecord {
    pub task: DownloadTask,
    pub success: bool,
    /// Present iff the task succeeded.
    pub resolved_local_path: Option<PathBuf>,
}

/// A media URL discovered by the feed scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundMedia {
    /// Sanitized file name derived from the matched URL, unique per run.
    pub file_name: String,
    /// URL to fetch, with the full-size variant suffix appended.
    pub fetch_url: String,
}

/// Caller-supplied record for records mode: an identifier, a source URL and
/// any extra metadata fields, which are carried through to the manifest
/// untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: String,
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One line of the output manifest: the original record plus the local path
/// its image was downloaded to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(flatten)]
    pub record: MediaRecord,
    pub local_path: String,
}

/// Restricts a file name to a conservative character set.
pub(crate) fn sanitize_file_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn known_extension(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.strip_suffix(":orig").unwrap_or(path);
    let lower = path.to_ascii_lowercase();
    ["jpg", "jpeg", "png"]
        .into_iter()
        .find(|ext| lower.ends_with(&format!(".{ext}")))
}
