use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use uuid::Uuid;

use zipq::models::{ArchiveStatus, FileMetadata};

static MAX_RETRIES: usize = 3;
static DELAY: u64 = 200;

#[derive(Parser)]
#[command(name = "zipq", about = "Console utility for managing file archives")]
struct Cli {
  /// Base URL of the API server
  #[arg(short = 'u', long, global = true, default_value = "http://localhost:8080")]
  base_url: String,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// List the files available on the server
  List,
  /// Create an archive task from the given files
  Create {
    #[arg(required = true)]
    files: Vec<String>,
  },
  /// Show the status of an archive task
  Status { id: Uuid },
  /// Download a completed archive
  Download {
    id: Uuid,
    /// Output path for the archive file
    #[arg(short, long)]
    output: PathBuf,
  },
  /// Create an archive, wait for completion and download it
  Auto {
    #[arg(required = true)]
    files: Vec<String>,
    /// Output path for the archive file
    #[arg(short, long)]
    output: PathBuf,
    /// Polling interval in milliseconds
    #[arg(short = 'i', long, default_value_t = 2000)]
    poll_interval: u64,
    /// Timeout in milliseconds
    #[arg(short = 't', long, default_value_t = 300_000)]
    timeout: u64,
  },
}

#[derive(Deserialize)]
struct CreateArchiveResponse {
  id: Uuid,
}

#[derive(Deserialize)]
struct ArchiveStatusResponse {
  status: ArchiveStatus,
  progress: u8,
  message: Option<String>,
}

struct ApiClient {
  http: reqwest::Client,
  base_url: String,
}

impl ApiClient {
  fn new(base_url: String) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(600))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { http, base_url })
  }

  async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
    let url = format!("{}{}", self.base_url, path);
    let response = Retry::spawn(ExponentialBackoff::from_millis(DELAY).take(MAX_RETRIES), || async {
      self.http.get(&url).send().await
    })
    .await?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      bail!("request to {} failed ({}): {}", url, status, body);
    }
    Ok(response.json().await?)
  }

  async fn list_files(&self) -> Result<Vec<FileMetadata>> {
    self.get_json("/files").await
  }

  async fn create_archive(&self, files: &[String]) -> Result<Uuid> {
    let url = format!("{}/archives", self.base_url);
    let response = self
      .http
      .post(&url)
      .json(&serde_json::json!({ "files": files }))
      .send()
      .await?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      bail!("archive creation failed ({}): {}", status, body);
    }
    let created: CreateArchiveResponse = response.json().await?;
    Ok(created.id)
  }

  async fn get_status(&self, id: Uuid) -> Result<ArchiveStatusResponse> {
    self.get_json(&format!("/archives/{}/status", id)).await
  }

  async fn download(&self, id: Uuid, output: &Path) -> Result<()> {
    let url = format!("{}/archives/{}/download", self.base_url, id);
    let response = self.http.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      bail!("download failed ({}): {}", status, body);
    }

    let mut file = tokio::fs::File::create(output)
      .await
      .with_context(|| format!("failed to create {}", output.display()))?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
      file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let client = ApiClient::new(cli.base_url)?;

  match cli.command {
    Command::List => {
      let files = client.list_files().await?;
      for file in &files {
        println!(
          "{:>12}  {}  {}",
          file.size,
          file.modified.format("%Y-%m-%d %H:%M:%S"),
          file.name
        );
      }
      println!("{} files", files.len());
    }
    Command::Create { files } => {
      let id = client.create_archive(&files).await?;
      println!("Archive task created with ID: {}", id);
    }
    Command::Status { id } => {
      let status = client.get_status(id).await?;
      println!("Status: {} ({}%)", status.status, status.progress);
      if let Some(message) = status.message {
        println!("Message: {}", message);
      }
    }
    Command::Download { id, output } => {
      client.download(id, &output).await?;
      println!("Saved archive to {}", output.display());
    }
    Command::Auto { files, output, poll_interval, timeout } => {
      auto_archive(&client, &files, &output, poll_interval, timeout).await?;
    }
  }

  Ok(())
}

async fn auto_archive(
  client: &ApiClient,
  files: &[String],
  output: &Path,
  poll_interval_ms: u64,
  timeout_ms: u64,
) -> Result<()> {
  println!("Creating archive for {} files...", files.len());
  let id = client.create_archive(files).await?;
  println!("Archive task created with ID: {}", id);

  let bar = ProgressBar::new(100);
  bar.set_style(ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")?);

  let started = Instant::now();
  loop {
    let status = client.get_status(id).await?;
    bar.set_position(status.progress as u64);
    match status.status {
      ArchiveStatus::Pending => bar.set_message("pending"),
      ArchiveStatus::Processing => bar.set_message("processing"),
      ArchiveStatus::Ready => {
        bar.finish_with_message("ready");
        break;
      }
      ArchiveStatus::Failed => {
        bar.abandon_with_message("failed");
        bail!(
          "archive creation failed: {}",
          status.message.unwrap_or_else(|| "unknown error".into())
        );
      }
    }
    if started.elapsed() > Duration::from_millis(timeout_ms) {
      bar.abandon_with_message("timed out");
      bail!("timed out after {}ms waiting for archive {}", timeout_ms, id);
    }
    tokio::time::sleep(Duration::from_millis(poll_interval_ms)).await;
  }

  client.download(id, output).await?;
  println!("Saved archive to {}", output.display());
  Ok(())
}
