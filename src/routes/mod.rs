use std::convert::Infallible;
use std::sync::Arc;
use serde_json::json;
use tracing::error;
use warp::Filter;
use warp::http::StatusCode;

use crate::models::ArchiveStatus;
use crate::registry::TaskRegistry;

pub mod files;
pub mod archives;
pub mod sse;

#[derive(Debug)]
pub struct EmptyFileList;
impl warp::reject::Reject for EmptyFileList {}

#[derive(Debug)]
pub struct InvalidFilePaths {
  pub files: Vec<String>,
}
impl warp::reject::Reject for InvalidFilePaths {}

#[derive(Debug)]
pub struct TaskNotFound;
impl warp::reject::Reject for TaskNotFound {}

#[derive(Debug)]
pub struct ArchiveNotReady {
  pub status: ArchiveStatus,
}
impl warp::reject::Reject for ArchiveNotReady {}

#[derive(Debug)]
pub struct InvalidTaskId;
impl warp::reject::Reject for InvalidTaskId {}

#[derive(Debug)]
pub struct ServerError {
  pub message: String,
}
impl warp::reject::Reject for ServerError {}

pub fn routes(
  registry: Arc<TaskRegistry>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  files::list_route(registry.clone())
    .or(archives::create_route(registry.clone()))
    .or(archives::status_route(registry.clone()))
    .or(archives::download_route(registry.clone()))
    .or(archives::delete_route(registry.clone()))
    .or(sse::sse_route(registry))
}

pub async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, Infallible> {
  let (code, body) = if err.is_not_found() {
    (StatusCode::NOT_FOUND, json!({"error": "Not found"}))
  } else if err.find::<TaskNotFound>().is_some() {
    (StatusCode::NOT_FOUND, json!({"error": "Archive task not found"}))
  } else if let Some(ArchiveNotReady { status }) = err.find() {
    (StatusCode::CONFLICT, json!({"error": "Archive is not ready", "status": status}))
  } else if let Some(InvalidFilePaths { files }) = err.find() {
    (StatusCode::BAD_REQUEST, json!({"error": "Invalid file paths", "files": files}))
  } else if err.find::<EmptyFileList>().is_some() {
    (StatusCode::BAD_REQUEST, json!({"error": "File list must not be empty"}))
  } else if err.find::<InvalidTaskId>().is_some() {
    (StatusCode::BAD_REQUEST, json!({"error": "Missing or invalid task_id"}))
  } else if let Some(ServerError { message }) = err.find() {
    error!("request failed: {}", message);
    (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "Internal server error"}))
  } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
    (StatusCode::BAD_REQUEST, json!({"error": "Invalid request body"}))
  } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
    (StatusCode::METHOD_NOT_ALLOWED, json!({"error": "Method not allowed"}))
  } else {
    error!("unhandled rejection: {:?}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "Internal server error"}))
  };
  Ok(warp::reply::with_status(warp::reply::json(&body), code))
}
