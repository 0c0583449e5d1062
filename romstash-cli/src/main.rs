//! romstash CLI
//!
//! Command-line interface for mirroring a game catalog service into a
//! local cache and reconciling save files against it.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use romstash_cache::{
    ArtworkCache, CacheKey, Freshness, Progress, TaskHandle, TaskState, populate,
    refresh_platform,
};
use romstash_remote::{Game, HttpCatalog};
use romstash_store::Store;
use romstash_sync::{PlatformDirs, SyncAction, attach_remote_saves, scan_all, sync_all};

mod settings;

use settings::Settings;

#[derive(Parser)]
#[command(name = "romstash")]
#[command(about = "Mirror a game catalog service into a local cache", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Populate the cache: platforms, games, firmware flags, collections
    Populate {
        /// Also download cover artwork for every cached game
        #[arg(long)]
        artwork: bool,
    },

    /// Re-fetch one platform's games
    Refresh {
        /// Platform id to refresh
        #[arg(long)]
        platform: i64,
    },

    /// Show cache counters and refresh stamps
    Stats,

    /// Remove cached data
    Clear {
        /// Remove games and their collection mappings
        #[arg(long)]
        games: bool,

        /// Remove collections and their game mappings
        #[arg(long)]
        collections: bool,

        /// Remove artwork metadata
        #[arg(long)]
        artwork: bool,

        /// Remove everything
        #[arg(long)]
        all: bool,
    },

    /// Re-index artwork from disk and sweep out invalid files
    ArtworkValidate,

    /// Reconcile local save files with the catalog service
    SyncSaves {
        /// Show decisions without transferring anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Probe each cached platform for drift against the remote
    Freshness,

    /// Keep the cache fresh with a periodic background sweep
    Watch {
        /// Seconds between sweeps
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set the catalog service URL
    SetUrl { url: String },
    /// Set the catalog service username
    SetUsername { username: String },
    /// Set the catalog service password
    SetPassword { password: String },
    /// Set the cache directory
    SetCacheDir { dir: String },
    /// Set the ROM root directory for save sync
    SetRomRoot { dir: String },
    /// Show the current settings file
    Show,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let settings = settings::load();

    match cli.command {
        Commands::Populate { artwork } => cmd_populate(&settings, artwork).await,
        Commands::Refresh { platform } => cmd_refresh(&settings, platform).await,
        Commands::Stats => cmd_stats(&settings),
        Commands::Clear {
            games,
            collections,
            artwork,
            all,
        } => cmd_clear(&settings, games, collections, artwork, all),
        Commands::ArtworkValidate => cmd_artwork_validate(&settings),
        Commands::SyncSaves { dry_run } => cmd_sync_saves(&settings, dry_run).await,
        Commands::Freshness => cmd_freshness(&settings).await,
        Commands::Watch { interval_secs } => cmd_watch(&settings, interval_secs).await,
        Commands::Config { action } => cmd_config(action),
    }
}

fn open_api(settings: &Settings) -> Result<HttpCatalog, Box<dyn Error>> {
    if settings.host.url.is_empty() {
        return Err("no catalog host configured; run `romstash config set-url <url>`".into());
    }
    Ok(HttpCatalog::new(settings.host.clone(), settings.timeout)?)
}

fn all_cached_games(store: &Store) -> Result<Vec<Game>, Box<dyn Error>> {
    let mut games = Vec::new();
    for platform in store.platforms()? {
        games.extend(store.platform_games(platform.id)?);
    }
    Ok(games)
}

async fn cmd_populate(settings: &Settings, artwork: bool) -> Result<(), Box<dyn Error>> {
    let api = open_api(settings)?;
    let store = Arc::new(Store::open(&settings.database_path())?);
    let progress = Progress::new();

    let bar = ProgressBar::new(1000);
    bar.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {percent:>3}%",
    )?);

    let run = populate(&api, &store, &progress);
    tokio::pin!(run);
    let stats = loop {
        tokio::select! {
            result = &mut run => break result?,
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                bar.set_position((progress.get() * 1000.0) as u64);
            }
        }
    };
    bar.finish_and_clear();

    println!(
        "Cached {} games across {} platforms, {} collections",
        stats.games, stats.platforms, stats.collections
    );
    if stats.failed_platforms > 0 {
        println!(
            "{}",
            format!("{} platform(s) failed", stats.failed_platforms)
                .if_supports_color(Stdout, |t| t.red().to_string())
        );
    }

    if artwork {
        let cache = ArtworkCache::new(Arc::clone(&store), settings.artwork_root());
        let games = cache.missing(&all_cached_games(&store)?)?;
        let art = cache.download_all(&api, &games).await?;
        println!(
            "Artwork: {} downloaded, {} skipped, {} failed",
            art.downloaded, art.skipped, art.failed
        );
    }
    Ok(())
}

async fn cmd_refresh(settings: &Settings, platform: i64) -> Result<(), Box<dyn Error>> {
    let api = open_api(settings)?;
    let store = Store::open(&settings.database_path())?;
    let progress = Progress::new();

    let bar = ProgressBar::new(1000);
    bar.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {percent:>3}%",
    )?);

    let run = refresh_platform(&api, &store, platform, Some(&progress));
    tokio::pin!(run);
    let count = loop {
        tokio::select! {
            result = &mut run => break result?,
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                bar.set_position((progress.get() * 1000.0) as u64);
            }
        }
    };
    bar.finish_and_clear();
    println!("Refreshed platform {platform}: {count} games");
    Ok(())
}

fn cmd_stats(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let store = Store::open(&settings.database_path())?;
    println!("Platforms:   {}", store.platform_count()?);
    println!("Games:       {}", store.game_count()?);
    println!("Collections: {}", store.collection_count()?);
    println!("Artwork:     {}", store.artwork_count()?);

    let stats = store.stats();
    println!(
        "Lookups:     {} hits / {} misses / {} errors",
        stats.hits, stats.misses, stats.errors
    );
    for (key, stamp) in store.all_refresh_times()? {
        match stamp {
            Some(at) => println!("{key}: {}", at.to_rfc3339()),
            None => println!("{key}: never"),
        }
    }
    Ok(())
}

fn cmd_clear(
    settings: &Settings,
    games: bool,
    collections: bool,
    artwork: bool,
    all: bool,
) -> Result<(), Box<dyn Error>> {
    if !(games || collections || artwork || all) {
        return Err("nothing to clear; pass --games, --collections, --artwork, or --all".into());
    }
    let store = Store::open(&settings.database_path())?;
    if all {
        store.clear_all()?;
        println!("Cache cleared");
        return Ok(());
    }
    if games {
        store.clear_games()?;
        println!("Games cleared");
    }
    if collections {
        store.clear_collections()?;
        println!("Collections cleared");
    }
    if artwork {
        store.clear_artwork()?;
        println!("Artwork metadata cleared");
    }
    Ok(())
}

fn cmd_artwork_validate(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let store = Arc::new(Store::open(&settings.database_path())?);
    let cache = ArtworkCache::new(store, settings.artwork_root());

    let added = cache.index_from_disk()?;
    let swept = cache.validate()?;
    println!(
        "Artwork: {} re-indexed, {} valid, {} removed",
        added, swept.valid, swept.removed
    );
    Ok(())
}

async fn cmd_sync_saves(settings: &Settings, dry_run: bool) -> Result<(), Box<dyn Error>> {
    let Some(rom_root) = settings.rom_root.clone() else {
        return Err("no ROM root configured; run `romstash config set-rom-root <dir>`".into());
    };
    let save_root = settings
        .save_root
        .clone()
        .unwrap_or_else(|| rom_root.join("saves"));

    let api = open_api(settings)?;
    let store = Store::open(&settings.database_path())?;

    let dirs: Vec<PlatformDirs> = store
        .platforms()?
        .into_iter()
        .map(|p| PlatformDirs {
            rom_dir: rom_root.join(&p.fs_slug),
            save_dir: save_root.join(&p.fs_slug),
            fs_slug: p.fs_slug,
        })
        .collect();

    for (slug, mut roms) in scan_all(dirs).await {
        attach_remote_saves(&api, &store, &mut roms).await?;
        let outcomes = sync_all(&api, &roms, dry_run).await;
        for outcome in outcomes {
            let label = match outcome.action {
                SyncAction::Upload => "upload"
                    .if_supports_color(Stdout, |t| t.green().to_string())
                    .to_string(),
                SyncAction::Download => "download"
                    .if_supports_color(Stdout, |t| t.cyan().to_string())
                    .to_string(),
                SyncAction::Skip => "skip".to_string(),
            };
            match outcome.result {
                Ok(()) => println!("[{slug}] {label:>8}  {}", outcome.file_name),
                Err(e) => println!(
                    "[{slug}] {label:>8}  {}  {}",
                    outcome.file_name,
                    format!("({e})").if_supports_color(Stdout, |t| t.red().to_string())
                ),
            }
        }
    }
    Ok(())
}

async fn cmd_freshness(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let api = open_api(settings)?;
    let store = Store::open(&settings.database_path())?;
    let freshness = Freshness::new(Duration::from_secs(300));

    for platform in store.platforms()? {
        let key = CacheKey::Platform(platform.id);
        let state = match freshness.probe_stale(&api, &store, &key).await {
            Ok(true) => "stale"
                .if_supports_color(Stdout, |t| t.yellow().to_string())
                .to_string(),
            Ok(false) => "fresh"
                .if_supports_color(Stdout, |t| t.green().to_string())
                .to_string(),
            Err(e) => format!("probe failed: {e}"),
        };
        println!(
            "{:30} {:>6} games  {state}",
            platform.display_name(),
            store.platform_game_count(platform.id)?
        );
    }
    Ok(())
}

async fn cmd_watch(settings: &Settings, interval_secs: u64) -> Result<(), Box<dyn Error>> {
    let api = Arc::new(open_api(settings)?);
    let store = Arc::new(Store::open(&settings.database_path())?);
    let freshness = Arc::new(Freshness::new(Duration::from_secs(interval_secs)));

    println!("Watching for drift every {interval_secs}s (Ctrl-C to stop)");
    let handle = TaskHandle::spawn("freshness-sweep", {
        let api = Arc::clone(&api);
        let store = Arc::clone(&store);
        let freshness = Arc::clone(&freshness);
        let interval = Duration::from_secs(interval_secs);
        async move {
            freshness
                .run_background(api.as_ref(), store.as_ref(), interval)
                .await
        }
    });

    match handle.wait().await {
        TaskState::Failed(e) => Err(e.into()),
        _ => Ok(()),
    }
}

fn cmd_config(action: ConfigAction) -> Result<(), Box<dyn Error>> {
    match action {
        ConfigAction::SetUrl { url } => settings::save_value("host", "url", &url)?,
        ConfigAction::SetUsername { username } => {
            settings::save_value("host", "username", &username)?
        }
        ConfigAction::SetPassword { password } => {
            settings::save_value("host", "password", &password)?
        }
        ConfigAction::SetCacheDir { dir } => settings::save_value("cache", "dir", &dir)?,
        ConfigAction::SetRomRoot { dir } => settings::save_value("sync", "rom_root", &dir)?,
        ConfigAction::Show => match settings::show() {
            Some(contents) => println!("{contents}"),
            None => println!("no settings file at {}", settings::settings_path().display()),
        },
    }
    Ok(())
}
