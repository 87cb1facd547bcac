use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use gallery_sync::config::Config;
use gallery_sync::domain::Domain;
use gallery_sync::fingerprint::LocalFile;
use gallery_sync::gallery::GalleryCollections;
use gallery_sync::remote::HttpGalleryApi;
use gallery_sync::selection::{Navigator, SelectedAlbumContext, schedule_redirect};
use gallery_sync::snapshot::{CacheKey, Snapshot, SnapshotCache};
use gallery_sync::store::FileStore;
use gallery_sync::upload::{UploadBatch, UploadOrchestrator};

#[derive(Parser)]
#[command(author, version, about = "Keep a local cache of a photo gallery fresh and upload photos to it")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize with a default config file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,

        /// Path to config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Bring one cached collection up to date
    Sync {
        /// albums, album-tags, featured-albums, geo-tagged-albums or travel-records
        domain: Domain,

        /// Refetch even when the cached snapshot is current
        #[arg(short, long)]
        force: bool,

        /// Path to config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Upload photos into an album
    Upload {
        /// Target album id
        #[arg(short, long)]
        album: String,

        /// Album year, defaults to the current year
        #[arg(short, long)]
        year: Option<String>,

        /// Replace photos that already exist in the album
        #[arg(long)]
        overwrite: bool,

        /// Files to upload
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Path to config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Show configuration and cached snapshots
    Status {
        /// Path to config file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

/// Prints the redirect target; a terminal has nowhere to navigate to
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate_to(&self, path: &str) {
        println!("Redirecting to {path}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force, config } => init_config(&config, force),
        Commands::Sync {
            domain,
            force,
            config,
        } => {
            let config_data = load_config(&config)?;
            sync_domain(&config_data, domain, force).await
        }
        Commands::Upload {
            album,
            year,
            overwrite,
            files,
            config,
        } => {
            let config_data = load_config(&config)?;
            let year = year.unwrap_or_else(|| Utc::now().year().to_string());
            upload_photos(&config_data, &album, &year, overwrite, &files).await
        }
        Commands::Status { config } => {
            let config_data = load_config(&config)?;
            show_status(&config_data);
            Ok(())
        }
    }
}

async fn sync_domain(config: &Config, domain: Domain, force: bool) -> Result<()> {
    let api = Arc::new(HttpGalleryApi::new(&config.api_base_url)?);
    let store = Arc::new(FileStore::open(&PathBuf::from(&config.cache_file)));
    let gallery = GalleryCollections::new(store, api.clone(), api);

    info!("Syncing {domain} from {}", config.api_base_url);
    let items = gallery
        .synchronizer()
        .sync_values(CacheKey::from(domain), force)
        .await
        .with_context(|| format!("Failed to sync {domain}"))?;

    let marker = gallery
        .synchronizer()
        .cache()
        .read::<Value>(&CacheKey::from(domain))
        .map(|snapshot| snapshot.marker.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("{domain}: {} items, marker {marker}", items.len());
    Ok(())
}

async fn upload_photos(
    config: &Config,
    album_id: &str,
    year: &str,
    overwrite: bool,
    paths: &[PathBuf],
) -> Result<()> {
    let api = Arc::new(HttpGalleryApi::new(&config.api_base_url)?);

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(LocalFile::from_path(path)?);
    }

    let store = Arc::new(FileStore::open(&PathBuf::from(&config.cache_file)));
    let context = SelectedAlbumContext::new(
        api.clone(),
        SnapshotCache::new(store),
        config.auth_redirect.policy(),
    );
    if let Err(error) = context.select(album_id, year).await {
        if error.is_unauthorized() {
            schedule_redirect(Arc::new(TerminalNavigator), config.auth_redirect.policy())
                .await
                .context("Redirect task failed")?;
        }
        return Err(error).with_context(|| format!("Failed to load photos of album {album_id}"));
    }

    let existing = context.photo_names();
    if existing.is_empty() {
        info!("Album {album_id} has no photos yet");
    } else {
        info!("Album {album_id} already holds {} photos", existing.len());
    }

    let batch = UploadBatch::new(files, &config.upload);
    let orchestrator = UploadOrchestrator::new(api, overwrite || config.overwrite);
    if orchestrator.overwrite() {
        info!("Existing photos in {album_id} will be replaced");
    }
    let summary = orchestrator.upload_files(&batch, album_id, &existing).await;

    for candidate in batch.candidates() {
        println!(
            "{}: {:?} ({})",
            candidate.remote_name(),
            candidate.status(),
            candidate.preview_url()
        );
    }
    println!(
        "Batch {}: {} uploaded, {} skipped, {} failed",
        batch.id(),
        summary.uploaded,
        summary.skipped,
        summary.failed
    );

    if summary.failed > 0 {
        warn!("{} of {} uploads failed", summary.failed, summary.total());
    }
    Ok(())
}

fn show_status(config: &Config) {
    println!("gallery-sync status");
    println!("API base URL: {}", config.api_base_url);
    println!(
        "Uploads: {} types, max {} bytes, overwrite {}",
        config.upload.allowed_types.len(),
        config.upload.max_size_bytes,
        config.overwrite
    );

    let store = Arc::new(FileStore::open(&PathBuf::from(&config.cache_file)));
    println!("Cache file: {}", store.path().display());
    let cache = SnapshotCache::new(store);

    println!("\nCached collections:");
    for domain in Domain::ALL {
        match cache.read::<Value>(&CacheKey::from(domain)) {
            Some(Snapshot {
                marker,
                items,
                fetched_at,
            }) => println!(
                "  {domain}: {} items, marker {marker}, fetched {}",
                items.len(),
                fetched_at.to_rfc3339()
            ),
            None => println!("  {domain}: not cached"),
        }
    }
}

fn init_config(config_path_opt: &Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = Config::get_config_path(config_path_opt);

    if config_path.exists() && !force {
        println!("Config file already exists at {}", config_path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    let config = Config::default();
    config
        .save_to_file(&config_path)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    println!("Created config file at {}", config_path.display());
    Ok(())
}

fn load_config(config_path_opt: &Option<PathBuf>) -> Result<Config> {
    let config_path = Config::get_config_path(config_path_opt);

    if !config_path.exists() {
        anyhow::bail!(
            "Config file not found at {}. Run 'gallery-sync init' to create one.",
            config_path.display()
        );
    }

    Config::load_from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))
}
