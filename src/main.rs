use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use warp::Filter;
use zipq::{config::Config, registry::TaskRegistry, routes, worker};

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt::init();
  let config = Config::from_env();

  std::fs::create_dir_all(&config.files_root).expect("Failed to create files root");
  std::fs::create_dir_all(&config.archives_dir).expect("Failed to create archives directory");
  let files_root = std::fs::canonicalize(&config.files_root).expect("Failed to resolve files root");
  let archives_dir =
    std::fs::canonicalize(&config.archives_dir).expect("Failed to resolve archives directory");

  let (registry, queue) = TaskRegistry::new(files_root, archives_dir, config.queue_capacity);
  let registry = Arc::new(registry);

  let shutdown = CancellationToken::new();
  let worker_handle = tokio::spawn(worker::run(registry.clone(), queue, shutdown.clone()));

  let api = routes::routes(registry)
    .recover(routes::handle_rejection)
    .with(warp::log("zipq_api"));

  let signal = shutdown.clone();
  let (addr, server) = warp::serve(api).bind_with_graceful_shutdown(
    ([0, 0, 0, 0], config.server_port),
    async move {
      let _ = tokio::signal::ctrl_c().await;
      info!("shutdown signal received");
      signal.cancel();
    },
  );
  info!("listening on {}", addr);
  server.await;

  shutdown.cancel();
  let _ = worker_handle.await;
}
