//! mien-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered with
//! `MIEN_*` environment variables, opens the SQLite store and the configured
//! profile cache, and serves the HTTP API.
//!
//! # Password hash generation
//!
//! To produce an argon2 PHC string, e.g. for seeding an account by hand:
//!
//! ```
//! cargo run -p mien-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use clap::Parser;
use mien_cache::CacheBackend;
use mien_server::{AppState, FsBlobStore, ServerConfig, auth::hash_password_blocking};
use mien_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

/// How often expired sessions and cache entries are swept.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(author, version, about = "Mien profile and session server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let hash = hash_password_blocking(&password)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("MIEN")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let mut server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  server_cfg.store_path = expand_tilde(&server_cfg.store_path);
  server_cfg.avatar_dir = expand_tilde(&server_cfg.avatar_dir);

  let store = SqliteStore::open(&server_cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", server_cfg.store_path))?;

  let cache = CacheBackend::from_config(&server_cfg.cache)
    .await
    .context("failed to set up profile cache")?;
  info!(backend = ?server_cfg.cache.backend, ttl_secs = server_cfg.cache.ttl_secs, "profile cache ready");

  tokio::fs::create_dir_all(&server_cfg.avatar_dir)
    .await
    .with_context(|| format!("failed to create avatar dir {:?}", server_cfg.avatar_dir))?;
  let blobs = FsBlobStore::new(&server_cfg.avatar_dir, server_cfg.public_base_url.clone());

  spawn_purge_task(store.clone(), cache.clone());

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  let state = AppState::new(Arc::new(store), Arc::new(cache), Arc::new(blobs), server_cfg);
  let app = mien_server::router(state);

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  Ok(())
}

/// Periodically drop expired sessions from the store and expired entries from
/// an in-process cache.
fn spawn_purge_task(store: SqliteStore, cache: CacheBackend) {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(PURGE_INTERVAL);
    loop {
      ticker.tick().await;
      match store.purge_expired_sessions().await {
        Ok(0) => {}
        Ok(removed) => info!(removed, "purged expired sessions"),
        Err(e) => warn!(error = %e, "session purge failed"),
      }
      cache.purge_expired();
    }
  });
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!("shutting down");
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\r', '\n']).to_string())
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
