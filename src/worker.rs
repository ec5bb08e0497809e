use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::models::ArchiveStatus;
use crate::registry::TaskRegistry;

/// Sole consumer of the submission queue. Tasks are processed strictly in
/// FIFO order, one at a time; a failure inside one task is recorded on
/// that task and never takes the loop down.
pub async fn run(
  registry: Arc<TaskRegistry>,
  mut queue: mpsc::Receiver<Uuid>,
  shutdown: CancellationToken,
) {
  info!("archive worker started");
  loop {
    let task_id = tokio::select! {
      _ = shutdown.cancelled() => break,
      next = queue.recv() => match next {
        Some(id) => id,
        None => break,
      },
    };
    if let Err(e) = process_task(&registry, task_id, &shutdown).await {
      error!("error processing archive task {}: {:?}", task_id, e);
      registry
        .update_status(task_id, ArchiveStatus::Failed, 0, Some(e.to_string()))
        .await;
    }
  }
  info!("archive worker stopped");
}

async fn process_task(
  registry: &TaskRegistry,
  task_id: Uuid,
  shutdown: &CancellationToken,
) -> Result<()> {
  let Some(task) = registry.get_task(task_id).await else {
    warn!("task {} was deleted before processing, skipping", task_id);
    return Ok(());
  };
  info!("processing archive task {} with {} files", task_id, task.files.len());

  registry
    .update_status(task_id, ArchiveStatus::Processing, 0, Some("Starting archive creation".into()))
    .await;

  let final_path = registry.archives_dir().join(format!("archive-{}.zip", task_id));
  let temp_path = registry.archives_dir().join(format!("archive-{}.zip.tmp", task_id));

  if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
    info!("archive {} already exists, using cached version", task_id);
    registry.set_file_path(task_id, final_path).await;
    registry
      .update_status(task_id, ArchiveStatus::Ready, 100, Some("Archive ready (cached)".into()))
      .await;
    return Ok(());
  }

  if let Err(e) = build_and_publish(registry, task_id, &task.files, &temp_path, &final_path, shutdown).await {
    if let Err(remove_err) = tokio::fs::remove_file(&temp_path).await {
      if remove_err.kind() != io::ErrorKind::NotFound {
        warn!("failed to delete temp file {}: {:?}", temp_path.display(), remove_err);
      }
    }
    return Err(e);
  }

  registry.set_file_path(task_id, final_path.clone()).await;
  registry
    .update_status(task_id, ArchiveStatus::Ready, 100, Some("Archive ready".into()))
    .await;
  info!("created archive {} at {}", task_id, final_path.display());
  Ok(())
}

async fn build_and_publish(
  registry: &TaskRegistry,
  task_id: Uuid,
  files: &[String],
  temp_path: &Path,
  final_path: &Path,
  shutdown: &CancellationToken,
) -> Result<()> {
  let temp = temp_path.to_path_buf();
  let mut zip = tokio::task::spawn_blocking(move || -> Result<ZipWriter<File>> {
    let file = File::create(&temp).with_context(|| format!("failed to create {}", temp.display()))?;
    Ok(ZipWriter::new(file))
  })
  .await??;

  let total = files.len();
  for (index, relative) in files.iter().enumerate() {
    if shutdown.is_cancelled() {
      bail!("Archive creation cancelled");
    }

    let entry_name = relative.replace('\\', "/");
    let source = registry.files_root().join(&entry_name);
    if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
      bail!("File not found: {}", relative);
    }

    zip = tokio::task::spawn_blocking(move || -> Result<ZipWriter<File>> {
      zip.start_file(entry_name.as_str(), SimpleFileOptions::default())?;
      let mut reader = File::open(&source)?;
      io::copy(&mut reader, &mut zip)?;
      Ok(zip)
    })
    .await??;

    let processed = index + 1;
    let progress = ((processed as f64 / total as f64) * 100.0).round() as u8;
    registry
      .update_status(
        task_id,
        ArchiveStatus::Processing,
        progress,
        Some(format!("Processing file {}/{}: {}", processed, total, relative)),
      )
      .await;
    debug!("added file {} to archive {} ({}%)", relative, task_id, progress);
  }

  tokio::task::spawn_blocking(move || zip.finish())
    .await?
    .context("failed to finalize archive")?;

  // No partial file is ever visible at the final path.
  tokio::fs::rename(temp_path, final_path)
    .await
    .with_context(|| format!("failed to publish archive {}", final_path.display()))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Read;
  use std::time::Duration;
  use tempfile::{TempDir, tempdir};

  fn setup() -> (Arc<TaskRegistry>, mpsc::Receiver<Uuid>, TempDir, TempDir) {
    let files = tempdir().unwrap();
    let archives = tempdir().unwrap();
    let (registry, rx) =
      TaskRegistry::new(files.path().to_path_buf(), archives.path().to_path_buf(), 16);
    (Arc::new(registry), rx, files, archives)
  }

  #[tokio::test]
  async fn builds_archive_with_original_contents_and_marks_ready() {
    let (registry, mut rx, files, archives) = setup();
    std::fs::write(files.path().join("a.txt"), b"0123456789").unwrap();
    std::fs::create_dir(files.path().join("sub")).unwrap();
    std::fs::write(files.path().join("sub/b.txt"), b"bbbbbbbbbbbbbbbbbbbb").unwrap();

    let id = registry.create_task(vec!["a.txt".into(), "sub/b.txt".into()]).await;
    assert_eq!(rx.recv().await.unwrap(), id);

    process_task(&registry, id, &CancellationToken::new()).await.unwrap();

    let task = registry.get_task(id).await.unwrap();
    assert_eq!(task.status, ArchiveStatus::Ready);
    assert_eq!(task.progress, 100);
    assert!(task.completed_at.is_some());

    let path = registry.get_archive_path(id).await.unwrap();
    let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
    assert_eq!(archive.len(), 2);
    let mut content = String::new();
    archive.by_name("a.txt").unwrap().read_to_string(&mut content).unwrap();
    assert_eq!(content, "0123456789");
    content.clear();
    archive.by_name("sub/b.txt").unwrap().read_to_string(&mut content).unwrap();
    assert_eq!(content, "bbbbbbbbbbbbbbbbbbbb");

    assert!(!archives.path().join(format!("archive-{}.zip.tmp", id)).exists());
  }

  #[tokio::test]
  async fn source_vanishing_before_build_fails_the_task_without_artifacts() {
    let (registry, mut rx, files, archives) = setup();
    std::fs::write(files.path().join("a.txt"), b"aaa").unwrap();

    let id = registry.create_task(vec!["a.txt".into()]).await;
    assert_eq!(rx.recv().await.unwrap(), id);
    std::fs::remove_file(files.path().join("a.txt")).unwrap();

    let err = process_task(&registry, id, &CancellationToken::new()).await.unwrap_err();
    assert!(err.to_string().contains("a.txt"));

    assert!(!archives.path().join(format!("archive-{}.zip", id)).exists());
    assert!(!archives.path().join(format!("archive-{}.zip.tmp", id)).exists());
  }

  #[tokio::test]
  async fn existing_archive_is_reused_without_rebuilding() {
    let (registry, mut rx, files, archives) = setup();
    std::fs::write(files.path().join("a.txt"), b"aaa").unwrap();

    let id = registry.create_task(vec!["a.txt".into()]).await;
    assert_eq!(rx.recv().await.unwrap(), id);

    let final_path = archives.path().join(format!("archive-{}.zip", id));
    std::fs::write(&final_path, b"pre-existing bytes").unwrap();

    process_task(&registry, id, &CancellationToken::new()).await.unwrap();

    let task = registry.get_task(id).await.unwrap();
    assert_eq!(task.status, ArchiveStatus::Ready);
    assert_eq!(task.progress, 100);
    assert!(task.message.unwrap().contains("cached"));
    assert_eq!(std::fs::read(&final_path).unwrap(), b"pre-existing bytes");
  }

  #[tokio::test]
  async fn cancellation_fails_the_task_and_cleans_the_temp_file() {
    let (registry, mut rx, files, archives) = setup();
    std::fs::write(files.path().join("a.txt"), b"aaa").unwrap();

    let id = registry.create_task(vec!["a.txt".into()]).await;
    assert_eq!(rx.recv().await.unwrap(), id);

    let token = CancellationToken::new();
    token.cancel();
    let err = process_task(&registry, id, &token).await.unwrap_err();
    assert!(err.to_string().contains("cancelled"));
    assert!(!archives.path().join(format!("archive-{}.zip.tmp", id)).exists());
  }

  #[tokio::test]
  async fn worker_loop_survives_a_failing_task() {
    let (registry, rx, files, _archives) = setup();
    std::fs::write(files.path().join("a.txt"), b"aaa").unwrap();
    std::fs::write(files.path().join("b.txt"), b"bbb").unwrap();

    let doomed = registry.create_task(vec!["a.txt".into()]).await;
    std::fs::remove_file(files.path().join("a.txt")).unwrap();
    let healthy = registry.create_task(vec!["b.txt".into()]).await;

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(run(registry.clone(), rx, shutdown.clone()));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
      let task = registry.get_task(healthy).await.unwrap();
      if task.status.is_terminal() {
        break;
      }
      assert!(tokio::time::Instant::now() < deadline, "worker never finished the healthy task");
      tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(registry.get_task(healthy).await.unwrap().status, ArchiveStatus::Ready);
    let failed = registry.get_task(doomed).await.unwrap();
    assert_eq!(failed.status, ArchiveStatus::Failed);
    assert!(failed.message.unwrap().contains("a.txt"));

    shutdown.cancel();
    handle.await.unwrap();
  }
}
