use async_trait::async_trait;
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use ianime::catalog::api_types::ApiAnimeListResponse;
use ianime::config::{self, Config};
use ianime::{
  AnimeDataRepository, CachedCatalogItem, CatalogClient, CatalogItem, FetchError,
  HttpCatalogClient, SqliteStore, TransportError, Worker,
};

#[derive(Parser, Debug)]
#[command(name = "ianime")]
#[command(about = "Anime catalog with a local offline cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/ianime/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch the remote catalog, ranked by rating
  Fetch,
  /// Replace the local cache with the remote catalog
  Sync,
  /// List cached entries
  List,
  /// Show one cached entry
  Show { id: String },
  /// Print a cached entry every time it changes (Ctrl-C to stop)
  Watch { id: String },
  /// Delete every cached entry
  Clear,
  /// Report whether the cache is empty
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = ianime::logging::init(&config::data_dir()?.join("logs"), &config.log.level)?;

  let worker = Worker::current();
  let store = SqliteStore::open(&config.cache_path()?, worker.clone())?;

  // Cache-only commands work without a catalog url.
  let needs_remote = matches!(args.command, Command::Fetch | Command::Sync);
  match HttpCatalogClient::new(&config) {
    Ok(client) => run(&AnimeDataRepository::new(client, store, worker), args.command).await,
    Err(e) if needs_remote => Err(e),
    Err(_) => run(&AnimeDataRepository::new(OfflineClient, store, worker), args.command).await,
  }
}

/// Catalog client used when no endpoint is configured. Fails without a
/// status code so nothing downstream mistakes it for a server answer.
struct OfflineClient;

#[async_trait]
impl CatalogClient for OfflineClient {
  async fn fetch(&self) -> Result<ApiAnimeListResponse, TransportError> {
    Err(TransportError::Unavailable("no catalog url configured".to_string()))
  }
}

async fn run<C: CatalogClient>(
  repo: &AnimeDataRepository<C, SqliteStore>,
  command: Command,
) -> Result<()> {
  match command {
    Command::Fetch => {
      let items = repo.fetch_remote_list().await.map_err(report_fetch_error)?;
      for (rank, item) in items.iter().enumerate() {
        println!("{:>3}. {}", rank + 1, format_item(item));
      }
    }
    Command::Sync => {
      let count = repo.refresh_cache().await.map_err(|e| match e.downcast::<FetchError>() {
        Ok(fetch) => report_fetch_error(fetch),
        Err(other) => other,
      })?;
      println!("Cached {} entries", count);
    }
    Command::List => {
      let rows = repo.load_all_snapshot().await?;
      if rows.is_empty() {
        println!("Cache is empty");
      }
      for row in &rows {
        println!("{}", format_cached(row));
      }
    }
    Command::Show { id } => {
      let row = repo
        .get_by_id(&id)
        .first()
        .await
        .ok_or_else(|| eyre!("Cache subscription closed"))??;
      match row {
        Some(row) => println!("{}\n\n{}", format_cached(&row), row.item.description),
        None => println!("No cached entry with id {}", id),
      }
    }
    Command::Watch { id } => {
      let mut sub = repo.get_by_id(&id);
      loop {
        tokio::select! {
          next = sub.next() => match next {
            Some(Ok(Some(row))) => println!("{}", format_cached(&row)),
            Some(Ok(None)) => println!("No cached entry with id {}", id),
            Some(Err(e)) => return Err(e),
            None => break,
          },
          _ = tokio::signal::ctrl_c() => break,
        }
      }
    }
    Command::Clear => {
      repo.clear_all().await?;
      println!("Cache cleared");
    }
    Command::Status => {
      if repo.is_empty()? {
        println!("Cache is empty");
      } else {
        println!("Cache has entries");
      }
    }
  }

  Ok(())
}

fn report_fetch_error(err: FetchError) -> color_eyre::Report {
  eyre!("{:?}: {}", err.kind(), err)
}

fn format_item(item: &CatalogItem) -> String {
  format!(
    "[{:>4.1}] {} ({}, {}, {}, {}) id={}",
    item.rating, item.title, item.release_year, item.status, item.country, item.genre, item.id
  )
}

fn format_cached(row: &CachedCatalogItem) -> String {
  format!("#{:<4} {}", row.key, format_item(&row.item))
}
