//! rally-closer server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered under
//! `RALLY_*` environment variables, opens an in-process SQLite store, and
//! serves the closure trigger and intake API over HTTP. With `--once` it runs
//! a single closure pass, prints the summary as JSON, and exits.

use std::{
  path::{Path, PathBuf},
  process::ExitCode,
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use rally_closer::{AppState, ServerConfig, closer::spawn_schedule};
use rally_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Rally match closure service")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Run one closure pass, print its summary, and exit.
  #[arg(long)]
  once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  // Logs go to stderr so `--once` output stays parseable.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("RALLY"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let state = AppState::new(
    Arc::new(store),
    server_cfg.close_settings(),
    server_cfg.auth_config(),
  );

  if cli.once {
    let summary = state.closer.run().await.context("closure run failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    return Ok(if summary.success { ExitCode::SUCCESS } else { ExitCode::FAILURE });
  }

  match server_cfg.schedule_interval() {
    Some(every) => {
      tracing::info!(every_secs = every.as_secs(), "scheduled closure enabled");
      spawn_schedule(state.closer.clone(), every);
    }
    None => tracing::info!("scheduled closure disabled"),
  }

  let grace = state.closer.settings().grace;
  let app = rally_closer::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!(grace_hours = grace.num_hours(), "Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(ExitCode::SUCCESS)
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
