use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info};
use warp::Filter;

use crate::catalog;
use crate::registry::TaskRegistry;
use crate::routes::ServerError;

fn with_registry(
  registry: Arc<TaskRegistry>,
) -> impl Filter<Extract = (Arc<TaskRegistry>,), Error = Infallible> + Clone {
  warp::any().map(move || registry.clone())
}

pub fn list_route(
  registry: Arc<TaskRegistry>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("files")
    .and(warp::path::end())
    .and(warp::get())
    .and(with_registry(registry))
    .and_then(handle_list_files)
}

async fn handle_list_files(registry: Arc<TaskRegistry>) -> Result<impl warp::Reply, warp::Rejection> {
  match catalog::list_files(registry.files_root()).await {
    Ok(mut files) => {
      files.sort_by(|a, b| a.name.cmp(&b.name));
      info!("retrieved {} files from {}", files.len(), registry.files_root().display());
      Ok(warp::reply::json(&files))
    }
    Err(e) => {
      error!("error retrieving files: {:?}", e);
      Err(warp::reject::custom(ServerError { message: e.to_string() }))
    }
  }
}
