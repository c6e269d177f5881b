use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};

/// Directory title used when a record has none.
pub const UNTITLED: &str = "untitled";

/// `<ISO-8601 updated_at> - <record id> - <title>`
pub fn entry_dir_name(updated_at: DateTime<Utc>, record_id: &str, title: &str) -> String {
    let title = title.trim();
    let title = if title.is_empty() { UNTITLED } else { title };
    format!(
        "{} - {} - {}",
        updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        path_segment(record_id),
        path_segment(title),
    )
}

pub fn entry_dir(root: &Path, updated_at: DateTime<Utc>, record_id: &str, title: &str) -> PathBuf {
    root.join(entry_dir_name(updated_at, record_id, title))
}

pub fn asset_path(dir: &Path, asset_id: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}{extension}", path_segment(asset_id)))
}

/// Creates `dir` and any missing parents. An existing directory is success.
pub async fn ensure_dir(dir: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o777);
    builder
        .create(dir)
        .await
        .map_err(|err| Error::storage(format!("create directory: {}", dir.display()), err))
}

/// Keeps remote-supplied names from escaping their parent directory.
fn path_segment(raw: &str) -> String {
    raw.chars()
        .map(|ch| match ch {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect()
}
