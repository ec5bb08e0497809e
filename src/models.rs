use serde::{Serialize, Deserialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveStatus {
  Pending,
  Processing,
  Ready,
  Failed,
}

impl ArchiveStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, ArchiveStatus::Ready | ArchiveStatus::Failed)
  }
}

impl std::fmt::Display for ArchiveStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      ArchiveStatus::Pending => "pending",
      ArchiveStatus::Processing => "processing",
      ArchiveStatus::Ready => "ready",
      ArchiveStatus::Failed => "failed",
    };
    write!(f, "{}", s)
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveTask {
  pub id: Uuid,
  pub status: ArchiveStatus,
  pub progress: u8,
  pub message: Option<String>,
  pub files: Vec<String>,
  pub created_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  #[serde(skip)]
  pub file_path: Option<PathBuf>,
}

impl ArchiveTask {
  pub fn new(id: Uuid, files: Vec<String>) -> Self {
    Self {
      id,
      status: ArchiveStatus::Pending,
      progress: 0,
      message: None,
      files,
      created_at: Utc::now(),
      completed_at: None,
      file_path: None,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
  pub name: String,
  pub size: u64,
  pub modified: DateTime<Utc>,
}
