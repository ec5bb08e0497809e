use std::path::Path;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::models::FileMetadata;

/// Recursively lists every regular file under the managed root. Names are
/// root-relative with `/` separators; ordering is whatever the walk yields.
pub async fn list_files(files_root: &Path) -> Result<Vec<FileMetadata>> {
  let root = files_root.to_path_buf();
  tokio::task::spawn_blocking(move || scan(&root)).await?
}

fn scan(root: &Path) -> Result<Vec<FileMetadata>> {
  let mut files = Vec::new();
  for entry in WalkDir::new(root) {
    let entry = entry.with_context(|| format!("error reading files root {}", root.display()))?;
    if !entry.file_type().is_file() {
      continue;
    }
    let meta = entry
      .metadata()
      .with_context(|| format!("error reading metadata for {}", entry.path().display()))?;
    let relative = entry.path().strip_prefix(root)?;
    let name = relative.to_string_lossy().replace('\\', "/");
    let modified: DateTime<Utc> = meta.modified()?.into();
    files.push(FileMetadata {
      name,
      size: meta.len(),
      modified,
    });
  }
  Ok(files)
}
