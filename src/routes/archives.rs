use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;
use warp::Filter;
use warp::http::StatusCode;

use crate::models::ArchiveStatus;
use crate::registry::TaskRegistry;
use crate::routes::{ArchiveNotReady, EmptyFileList, InvalidFilePaths, ServerError, TaskNotFound};
use crate::validation;

#[derive(Deserialize)]
pub struct CreateArchiveRequest {
  pub files: Vec<String>,
}

#[derive(Serialize)]
pub struct CreateArchiveResponse {
  pub id: Uuid,
}

#[derive(Serialize)]
pub struct ArchiveStatusResponse {
  pub id: Uuid,
  pub status: ArchiveStatus,
  pub progress: u8,
  pub message: Option<String>,
}

#[derive(Serialize)]
pub struct DeleteArchiveResponse {
  pub deleted: bool,
}

fn with_registry(
  registry: Arc<TaskRegistry>,
) -> impl Filter<Extract = (Arc<TaskRegistry>,), Error = Infallible> + Clone {
  warp::any().map(move || registry.clone())
}

pub fn create_route(
  registry: Arc<TaskRegistry>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("archives")
    .and(warp::path::end())
    .and(warp::post())
    .and(warp::body::json())
    .and(with_registry(registry))
    .and_then(handle_create_archive)
}

pub fn status_route(
  registry: Arc<TaskRegistry>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("archives" / Uuid / "status")
    .and(warp::get())
    .and(with_registry(registry))
    .and_then(handle_archive_status)
}

pub fn download_route(
  registry: Arc<TaskRegistry>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("archives" / Uuid / "download")
    .and(warp::get())
    .and(with_registry(registry))
    .and_then(handle_download_archive)
}

pub fn delete_route(
  registry: Arc<TaskRegistry>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("archives" / Uuid)
    .and(warp::delete())
    .and(with_registry(registry))
    .and_then(handle_delete_archive)
}

async fn handle_create_archive(
  request: CreateArchiveRequest,
  registry: Arc<TaskRegistry>,
) -> Result<impl warp::Reply, warp::Rejection> {
  if request.files.is_empty() {
    return Err(warp::reject::custom(EmptyFileList));
  }

  let invalid: Vec<String> = request
    .files
    .iter()
    .filter(|f| !validation::is_valid_path(f))
    .cloned()
    .collect();
  if !invalid.is_empty() {
    warn!("rejected archive request with invalid paths: {:?}", invalid);
    return Err(warp::reject::custom(InvalidFilePaths { files: invalid }));
  }

  let id = registry.create_task(request.files).await;
  Ok(warp::reply::with_status(
    warp::reply::json(&CreateArchiveResponse { id }),
    StatusCode::ACCEPTED,
  ))
}

async fn handle_archive_status(
  id: Uuid,
  registry: Arc<TaskRegistry>,
) -> Result<impl warp::Reply, warp::Rejection> {
  match registry.get_task(id).await {
    Some(task) => Ok(warp::reply::json(&ArchiveStatusResponse {
      id: task.id,
      status: task.status,
      progress: task.progress,
      message: task.message,
    })),
    None => Err(warp::reject::custom(TaskNotFound)),
  }
}

async fn handle_download_archive(
  id: Uuid,
  registry: Arc<TaskRegistry>,
) -> Result<impl warp::Reply, warp::Rejection> {
  let task = registry
    .get_task(id)
    .await
    .ok_or_else(|| warp::reject::custom(TaskNotFound))?;
  if task.status != ArchiveStatus::Ready {
    return Err(warp::reject::custom(ArchiveNotReady { status: task.status }));
  }

  let path = registry
    .get_archive_path(id)
    .await
    .ok_or_else(|| warp::reject::custom(TaskNotFound))?;
  let file = match tokio::fs::File::open(&path).await {
    Ok(f) => f,
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      warn!("archive file {} is missing for ready task {}", path.display(), id);
      return Err(warp::reject::custom(TaskNotFound));
    }
    Err(e) => return Err(warp::reject::custom(ServerError { message: e.to_string() })),
  };

  info!("downloading archive {} from {}", id, path.display());
  let body = warp::hyper::Body::wrap_stream(ReaderStream::new(file));
  warp::http::Response::builder()
    .header("content-type", "application/zip")
    .header("content-disposition", format!("attachment; filename=\"archive-{}.zip\"", id))
    .body(body)
    .map_err(|e| warp::reject::custom(ServerError { message: e.to_string() }))
}

async fn handle_delete_archive(
  id: Uuid,
  registry: Arc<TaskRegistry>,
) -> Result<impl warp::Reply, warp::Rejection> {
  if registry.delete_task(id).await {
    Ok(warp::reply::json(&DeleteArchiveResponse { deleted: true }))
  } else {
    Err(warp::reject::custom(TaskNotFound))
  }
}
