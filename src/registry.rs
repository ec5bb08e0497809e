use std::collections::HashMap;
use std::path::{Path, PathBuf};
use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{ArchiveStatus, ArchiveTask};
use crate::validation;

/// In-memory source of truth for archive tasks, plus the send side of the
/// bounded submission queue. One receiver (the worker) drains the queue;
/// every other caller only reads or point-mutates the map.
pub struct TaskRegistry {
  tasks: Mutex<HashMap<Uuid, ArchiveTask>>,
  queue: mpsc::Sender<Uuid>,
  files_root: PathBuf,
  archives_dir: PathBuf,
}

impl TaskRegistry {
  pub fn new(
    files_root: PathBuf,
    archives_dir: PathBuf,
    queue_capacity: usize,
  ) -> (Self, mpsc::Receiver<Uuid>) {
    let (tx, rx) = mpsc::channel(queue_capacity);
    let registry = Self {
      tasks: Mutex::new(HashMap::new()),
      queue: tx,
      files_root,
      archives_dir,
    };
    (registry, rx)
  }

  pub fn files_root(&self) -> &Path {
    &self.files_root
  }

  pub fn archives_dir(&self) -> &Path {
    &self.archives_dir
  }

  /// Records a new task and queues it for the worker. A task whose files
  /// cannot all be found is created already failed and never queued, so
  /// the caller still gets an id to poll. When the queue is full this
  /// suspends the submitter until capacity frees up.
  pub async fn create_task(&self, files: Vec<String>) -> Uuid {
    let id = Uuid::new_v4();
    self.tasks.lock().await.insert(id, ArchiveTask::new(id, files.clone()));

    for file in &files {
      if !validation::file_exists(&self.files_root, file).await {
        warn!("archive task {} failed: file {} not found", id, file);
        self
          .update_status(id, ArchiveStatus::Failed, 0, Some(format!("File not found: {}", file)))
          .await;
        return id;
      }
    }

    if self.queue.send(id).await.is_err() {
      error!("submission queue is closed, failing task {}", id);
      self
        .update_status(id, ArchiveStatus::Failed, 0, Some("Submission queue unavailable".into()))
        .await;
      return id;
    }

    info!("created archive task {} with {} files", id, files.len());
    id
  }

  pub async fn get_task(&self, id: Uuid) -> Option<ArchiveTask> {
    self.tasks.lock().await.get(&id).cloned()
  }

  pub async fn get_archive_path(&self, id: Uuid) -> Option<PathBuf> {
    self
      .tasks
      .lock()
      .await
      .get(&id)
      .filter(|task| task.status == ArchiveStatus::Ready)
      .and_then(|task| task.file_path.clone())
  }

  /// Removes the record and best-effort deletes its backing file. Returns
  /// whether the record was removed; file deletion failures are logged only.
  pub async fn delete_task(&self, id: Uuid) -> bool {
    let removed = self.tasks.lock().await.remove(&id);
    match removed {
      Some(task) => {
        if let Some(path) = task.file_path {
          match tokio::fs::remove_file(&path).await {
            Ok(()) => info!("deleted archive file {} for task {}", path.display(), id),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
              error!("error deleting archive file {} for task {}: {:?}", path.display(), id, e)
            }
          }
        }
        true
      }
      None => false,
    }
  }

  /// Point mutation of one task's status. Unknown ids are ignored (the
  /// task may have been deleted concurrently) and terminal states absorb.
  pub async fn update_status(
    &self,
    id: Uuid,
    status: ArchiveStatus,
    progress: u8,
    message: Option<String>,
  ) {
    let mut tasks = self.tasks.lock().await;
    if let Some(task) = tasks.get_mut(&id) {
      if task.status.is_terminal() {
        return;
      }
      task.status = status;
      task.progress = progress;
      task.message = message;
      if status.is_terminal() {
        task.completed_at = Some(Utc::now());
      }
      debug!("updated task {} status to {} with progress {}", id, status, progress);
    }
  }

  pub async fn set_file_path(&self, id: Uuid, path: PathBuf) {
    let mut tasks = self.tasks.lock().await;
    if let Some(task) = tasks.get_mut(&id) {
      debug!("set file path {} for task {}", path.display(), id);
      task.file_path = Some(path);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;
  use tokio_test::assert_ok;

  fn registry_for(root: &Path) -> (TaskRegistry, mpsc::Receiver<Uuid>) {
    TaskRegistry::new(root.to_path_buf(), root.join("archives"), 16)
  }

  #[tokio::test]
  async fn create_task_with_existing_files_is_pending_and_queued() {
    let root = tempdir().unwrap();
    assert_ok!(std::fs::write(root.path().join("a.txt"), b"aaa"));
    let (registry, mut rx) = registry_for(root.path());

    let id = registry.create_task(vec!["a.txt".into()]).await;
    let task = registry.get_task(id).await.unwrap();
    assert_eq!(task.status, ArchiveStatus::Pending);
    assert_eq!(task.progress, 0);
    assert!(task.completed_at.is_none());
    assert_eq!(rx.try_recv().unwrap(), id);
  }

  #[tokio::test]
  async fn create_task_with_missing_file_fails_immediately_and_is_never_queued() {
    let root = tempdir().unwrap();
    assert_ok!(std::fs::write(root.path().join("a.txt"), b"aaa"));
    let (registry, mut rx) = registry_for(root.path());

    let id = registry.create_task(vec!["a.txt".into(), "missing.txt".into()]).await;
    let task = registry.get_task(id).await.unwrap();
    assert_eq!(task.status, ArchiveStatus::Failed);
    assert!(task.message.unwrap().contains("missing.txt"));
    assert!(task.completed_at.is_some());
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn archive_path_is_only_visible_once_ready() {
    let root = tempdir().unwrap();
    assert_ok!(std::fs::write(root.path().join("a.txt"), b"aaa"));
    let (registry, _rx) = registry_for(root.path());

    let id = registry.create_task(vec!["a.txt".into()]).await;
    registry.set_file_path(id, root.path().join("archives/archive.zip")).await;
    assert!(registry.get_archive_path(id).await.is_none());

    registry.update_status(id, ArchiveStatus::Ready, 100, None).await;
    assert!(registry.get_archive_path(id).await.is_some());
  }

  #[tokio::test]
  async fn terminal_states_absorb_later_updates() {
    let root = tempdir().unwrap();
    assert_ok!(std::fs::write(root.path().join("a.txt"), b"aaa"));
    let (registry, _rx) = registry_for(root.path());

    let id = registry.create_task(vec!["a.txt".into()]).await;
    registry.update_status(id, ArchiveStatus::Failed, 0, Some("boom".into())).await;
    registry.update_status(id, ArchiveStatus::Processing, 50, None).await;

    let task = registry.get_task(id).await.unwrap();
    assert_eq!(task.status, ArchiveStatus::Failed);
    assert_eq!(task.message.as_deref(), Some("boom"));
  }

  #[tokio::test]
  async fn delete_task_removes_record_and_backing_file() {
    let root = tempdir().unwrap();
    assert_ok!(std::fs::write(root.path().join("a.txt"), b"aaa"));
    let archive = root.path().join("archive-test.zip");
    assert_ok!(std::fs::write(&archive, b"zipbytes"));
    let (registry, _rx) = registry_for(root.path());

    let id = registry.create_task(vec!["a.txt".into()]).await;
    registry.set_file_path(id, archive.clone()).await;
    registry.update_status(id, ArchiveStatus::Ready, 100, None).await;

    assert!(registry.delete_task(id).await);
    assert!(registry.get_task(id).await.is_none());
    assert!(!archive.exists());

    assert!(!registry.delete_task(id).await);
  }

  #[tokio::test]
  async fn update_status_for_unknown_id_is_a_noop() {
    let root = tempdir().unwrap();
    let (registry, _rx) = registry_for(root.path());
    registry.update_status(Uuid::new_v4(), ArchiveStatus::Ready, 100, None).await;
  }
}
