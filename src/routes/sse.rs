use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use futures::StreamExt;
use serde_json::json;
use tokio_stream::wrappers::IntervalStream;
use uuid::Uuid;
use warp::Filter;

use crate::registry::TaskRegistry;
use crate::routes::InvalidTaskId;

fn with_registry(
  registry: Arc<TaskRegistry>,
) -> impl Filter<Extract = (Arc<TaskRegistry>,), Error = Infallible> + Clone {
  warp::any().map(move || registry.clone())
}

pub fn sse_route(
  registry: Arc<TaskRegistry>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("sse")
    .and(warp::path::end())
    .and(warp::get())
    .and(warp::query::<HashMap<String, String>>())
    .and(with_registry(registry))
    .and_then(handle_sse)
}

/// Emits the task's status every two seconds. The stream ends after the
/// first terminal event, or immediately if the task is unknown.
async fn handle_sse(
  query: HashMap<String, String>,
  registry: Arc<TaskRegistry>,
) -> Result<impl warp::Reply, warp::Rejection> {
  let task_id = query
    .get("task_id")
    .and_then(|raw| Uuid::parse_str(raw).ok())
    .ok_or_else(|| warp::reject::custom(InvalidTaskId))?;

  let interval = tokio::time::interval(Duration::from_secs(2));
  let stream = IntervalStream::new(interval)
    .then(move |_| {
      let registry = registry.clone();
      async move { registry.get_task(task_id).await }
    })
    .scan(false, move |finished, task| {
      let next = match task {
        Some(task) if !*finished => {
          *finished = task.status.is_terminal();
          let event = warp::sse::Event::default().data(
            json!({"task_id": task_id, "status": task.status, "progress": task.progress})
              .to_string(),
          );
          Some(Ok::<_, Infallible>(event))
        }
        _ => None,
      };
      futures::future::ready(next)
    });

  Ok(warp::sse::reply(warp::sse::keep_alive().stream(stream)))
}
