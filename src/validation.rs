use std::path::Path;
use regex::Regex;
use tracing::warn;

fn has_illegal_chars(path: &str) -> bool {
  let re = Regex::new(r#"[<>:"|?*\x00-\x1f]"#).unwrap();
  re.is_match(path)
}

pub fn is_valid_path(path: &str) -> bool {
  if path.trim().is_empty() {
    return false;
  }
  if has_illegal_chars(path) {
    return false;
  }

  let normalized = path.replace('\\', "/");
  if normalized.starts_with('/') {
    return false;
  }

  let segments: Vec<&str> = normalized.split('/').collect();
  if segments.iter().any(|s| s.trim().is_empty()) {
    return false;
  }
  if segments.iter().any(|s| *s == "..") {
    return false;
  }

  true
}

/// Checks that `path` names an existing regular file inside `files_root`.
/// The resolved path is canonicalized and compared against the canonical
/// root, so symlinks pointing outside the root are treated as absent.
pub async fn file_exists(files_root: &Path, path: &str) -> bool {
  if !is_valid_path(path) {
    return false;
  }

  let candidate = files_root.join(path.replace('\\', "/"));
  let root = match tokio::fs::canonicalize(files_root).await {
    Ok(p) => p,
    Err(_) => return false,
  };
  let resolved = match tokio::fs::canonicalize(&candidate).await {
    Ok(p) => p,
    Err(_) => return false,
  };

  if !resolved.starts_with(&root) {
    warn!("path traversal attempt detected: {}", path);
    return false;
  }

  match tokio::fs::metadata(&resolved).await {
    Ok(meta) => meta.is_file(),
    Err(_) => false,
  }
}
