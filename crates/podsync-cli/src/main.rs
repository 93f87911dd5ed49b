//! podsync operator CLI.
//!
//! Runs one-off syncs in the foreground and inspects engine state without
//! going through the HTTP control plane.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use podsync_client::TubeClient;
use podsync_core::{
    CredentialPool, CredentialStore, JobControls, JobOptions, SessionStore, SyncConfig,
    SyncScheduler, TracingReporter, TriggerType, load_credentials_config, slugify,
};
use podsync_db::{CatalogRepository, CredentialRepository, SessionRepository};

#[derive(Debug, Parser)]
#[command(name = "podsync")]
#[command(author, version, about = "Operator CLI for the podsync engine")]
struct Cli {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Path to credentials.toml
    #[arg(long, env = "PODSYNC_CREDENTIALS")]
    credentials: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a full sync in the foreground (Ctrl+C stops cooperatively)
    Run {
        /// Episodes per write chunk
        #[arg(long, default_value = "100")]
        chunk_size: usize,

        /// Podcasts processed concurrently
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Record the session as a test run
        #[arg(long)]
        test: bool,
    },

    /// Show the latest session and credential usage
    Status,

    /// List recent sync sessions
    Sessions {
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Credential usage operations
    Credentials {
        /// Zero usage counters after an out-of-band quota reset
        #[arg(long)]
        reset: bool,
    },

    /// Register a podcast collection in the catalog
    AddPodcast {
        /// External collection id (the hosted playlist)
        collection_id: String,
        /// Podcast title (slug is derived from it)
        title: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cli.database_url)
        .await
        .context("Failed to connect to database")?;
    podsync_db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    match cli.command {
        Command::Run {
            chunk_size,
            concurrency,
            test,
        } => run_sync(&cli, pool, chunk_size, concurrency, test).await,
        Command::Status => show_status(pool).await,
        Command::Sessions { limit } => list_sessions(pool, limit).await,
        Command::Credentials { reset } => credentials(pool, reset).await,
        Command::AddPodcast {
            collection_id,
            title,
        } => add_podcast(pool, &collection_id, &title).await,
    }
}

async fn run_sync(
    cli: &Cli,
    pool: sqlx::PgPool,
    chunk_size: usize,
    concurrency: usize,
    test: bool,
) -> anyhow::Result<()> {
    let credentials_config = load_credentials_config(cli.credentials.as_deref())
        .context("Failed to load credentials configuration")?;

    let credential_repo = CredentialRepository::new(pool.clone());
    credential_repo
        .mirror_entries(&credentials_config.credentials)
        .await?;
    let usage = credential_repo.load_usage().await.unwrap_or_default();
    let usage_tx = CredentialPool::spawn_usage_writer(credential_repo);
    let credential_pool =
        CredentialPool::new(&credentials_config.credentials, &usage).with_usage_sink(usage_tx);

    let client = TubeClient::new(credential_pool.clone())?;
    let catalog = CatalogRepository::new(pool.clone());
    let sessions = SessionRepository::new(pool);

    let config = SyncConfig::default()
        .with_chunk_size(chunk_size)
        .with_max_concurrent_items(concurrency);

    // Fence off anything a crashed coordinator left behind.
    sessions.fail_stale_running(config.stale_heartbeat_after).await?;

    let trigger = if test {
        TriggerType::Test
    } else {
        TriggerType::Manual
    };
    let session = sessions.create_session(trigger).await?;
    let options = JobOptions::new(config, trigger);
    let controls = JobControls::new();

    // Ctrl+C requests a cooperative stop: the in-flight chunk commits and
    // the session freezes as `stopped`.
    {
        let controls = controls.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl+C received, stopping after the current chunk");
                controls.request_stop();
            }
        });
    }

    let scheduler = SyncScheduler::new(catalog, client, sessions);
    let outcome = scheduler
        .run(&session, &options, &controls, &TracingReporter)
        .await;

    println!(
        "sync {}: {} podcasts processed ({} failed), {} episodes ({} new, {} updated, {} failed)",
        outcome.final_state,
        outcome.stats.podcasts_processed,
        outcome.stats.podcasts_failed,
        outcome.stats.episodes_total(),
        outcome.stats.episodes_created,
        outcome.stats.episodes_updated,
        outcome.stats.episodes_failed,
    );
    if let Some(error) = outcome.error {
        anyhow::bail!(error);
    }
    Ok(())
}

async fn show_status(pool: sqlx::PgPool) -> anyhow::Result<()> {
    let sessions = SessionRepository::new(pool.clone());
    match sessions.latest_session().await? {
        Some(s) => {
            println!("latest session: {} ({})", s.id, s.trigger);
            println!("  status:     {}", s.status);
            println!("  started:    {}", s.started_at);
            if let Some(done) = s.completed_at {
                println!("  completed:  {done}");
            }
            println!("  checkpoint: {}", s.checkpoint);
            println!(
                "  episodes:   {} ({} new, {} updated, {} failed)",
                s.stats.episodes_total(),
                s.stats.episodes_created,
                s.stats.episodes_updated,
                s.stats.episodes_failed
            );
            if let Some(error) = s.error_message {
                println!("  error:      {error}");
            }
        }
        None => println!("no sync sessions yet"),
    }

    let credential_repo = CredentialRepository::new(pool);
    let usage = credential_repo.load_usage().await?;
    if !usage.is_empty() {
        println!("credential usage:");
        let mut ids: Vec<_> = usage.keys().collect();
        ids.sort();
        for id in ids {
            println!("  {}: {} units", id, usage[id]);
        }
    }
    Ok(())
}

async fn list_sessions(pool: sqlx::PgPool, limit: usize) -> anyhow::Result<()> {
    let sessions = SessionRepository::new(pool);
    for s in sessions.list_sessions(limit).await? {
        println!(
            "{}  {:9}  {:9}  {} podcasts / {} episodes{}",
            s.started_at.format("%Y-%m-%d %H:%M:%S"),
            s.trigger.as_str(),
            s.status.as_str(),
            s.stats.podcasts_processed,
            s.stats.episodes_total(),
            s.error_message
                .map(|e| format!("  [{e}]"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

async fn credentials(pool: sqlx::PgPool, reset: bool) -> anyhow::Result<()> {
    let repo = CredentialRepository::new(pool);
    if reset {
        let n = repo.reset_usage().await?;
        println!("reset usage counters for {n} credentials");
        return Ok(());
    }

    let usage = repo.load_usage().await?;
    if usage.is_empty() {
        println!("no credentials mirrored yet (run a sync first)");
        return Ok(());
    }
    let mut ids: Vec<_> = usage.keys().collect();
    ids.sort();
    for id in ids {
        println!("{}: {} units used", id, usage[id]);
    }
    Ok(())
}

async fn add_podcast(pool: sqlx::PgPool, collection_id: &str, title: &str) -> anyhow::Result<()> {
    let catalog = CatalogRepository::new(pool);

    // Same suffix probe the sync engine uses for episode slugs.
    let base = slugify(title);
    let mut slug = base.clone();
    for attempt in 1..50 {
        if !catalog.podcast_slug_exists(&slug).await? {
            break;
        }
        slug = format!("{base}-{attempt}");
    }

    let id = catalog.insert_podcast(collection_id, title, &slug).await?;
    println!("registered podcast {id} ({slug})");
    Ok(())
}
