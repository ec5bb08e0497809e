use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
  pub files_root: PathBuf,
  pub archives_dir: PathBuf,
  pub server_port: u16,
  pub queue_capacity: usize,
}

impl Config {
  pub fn from_env() -> Self {
    Self {
      files_root: env::var("FILES_ROOT")
        .unwrap_or_else(|_| "./files".into())
        .into(),
      archives_dir: env::var("ARCHIVES_DIR")
        .unwrap_or_else(|_| "./archives".into())
        .into(),
      server_port: env::var("SERVER_PORT")
        .unwrap_or_else(|_| "8080".into())
        .parse()
        .unwrap_or(8080),
      queue_capacity: env::var("QUEUE_CAPACITY")
        .unwrap_or_else(|_| "1000".into())
        .parse()
        .unwrap_or(1000),
    }
  }
}
