//! MAL Fetcher CLI application.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mal_fetcher::api::{CredentialProvider, HttpTransport};
use mal_fetcher::{
    AniListResolver, AnimeCache, DocumentStore, MalClient, MalFetcher, ReqwestTransport,
    StatusFilter, StoredCredentials,
};
use serde::Serialize;
use shared::{Config, DataPaths};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// User bearer token; takes precedence over the environment and the
    /// stored token
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Most recently started title on a list
    Latest {
        /// ALL, CURRENT, PLANNING, COMPLETED, DROPPED, PAUSED or REPEATING
        #[arg(short, long, default_value = "ALL")]
        status: StatusFilter,
        /// Public list to read instead of the authenticated user's
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Every title on a list under the given statuses
    List {
        #[arg(short, long, num_args = 1.., default_value = "ALL")]
        status: Vec<StatusFilter>,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// A title as it appears on the authenticated user's list
    Entry { anime_id: String },
    /// Cached metadata for a title
    Info {
        anime_id: String,
        /// Bypass the cache
        #[arg(short, long)]
        force: bool,
    },
    /// Resolve a title id from a search query
    Search { query: String },
    /// Set the watched episode count of a title
    Update { anime_id: String, progress: u32 },
    /// Store the client id and user tokens
    Configure {
        #[arg(long)]
        client_id: Option<String>,
        #[arg(long)]
        access_token: Option<String>,
        #[arg(long)]
        refresh_token: Option<String>,
    },
    /// Exchange the stored refresh token for a new access token
    RefreshToken,
    /// Remove cached entries and searches
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Initialize logging
    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        config
            .logging
            .default_level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    };

    shared::logging::init(shared::LogConfig {
        log_dir: config.log_dir().to_string_lossy().to_string(),
        component: "mal-fetcher".to_string(),
        default_level: log_level,
        console: config.logging.console,
        file: config.logging.file,
        json_format: config.logging.json_format,
    })?;

    info!(config_file = %args.config.display(), "Loaded configuration");

    // Initialize data paths
    let data_paths = DataPaths::from_config(&config);
    data_paths
        .create_dirs()
        .context("Failed to create data directories")?;

    let store = Arc::new(DocumentStore::new(data_paths).context("Failed to open document store")?);
    let transport: Arc<dyn HttpTransport> = Arc::new(
        ReqwestTransport::new(Duration::from_secs(config.mal.request_timeout_secs))
            .context("Failed to create HTTP transport")?,
    );
    let credentials = Arc::new(StoredCredentials::new(
        store.clone(),
        transport.clone(),
        config.mal.oauth_url.clone(),
        config.mal.token_env_var.clone(),
    ));

    let mut client = MalClient::new(transport, credentials.clone(), (&config.mal).into());
    if let Some(token) = args.token {
        client = client.with_token(token);
    }

    let fetcher = MalFetcher::new(
        Arc::new(client),
        AnimeCache::new(store),
        AniListResolver::new(config.mal.anilist_url.clone()),
    )
    .with_page_size(config.mal.list_page_size);

    match args.command {
        Command::Latest { status, user } => {
            let latest = fetcher
                .fetch_latest_for_user(status, user.as_deref())
                .await?
                .map(|(id, entry)| BTreeMap::from([(id, entry)]));
            print_json(&latest)?;
        }
        Command::List { status, user } => {
            let entries = fetcher.fetch_all_for_user(&status, user.as_deref()).await?;
            info!(count = entries.len(), "List fetched");
            print_json(&entries)?;
        }
        Command::Entry { anime_id } => {
            print_json(&fetcher.fetch_single_entry(&anime_id).await?)?;
        }
        Command::Info { anime_id, force } => {
            print_json(&fetcher.fetch_title_info(&anime_id, force).await?)?;
        }
        Command::Search { query } => {
            print_json(&fetcher.resolve_id_by_name(&query).await?)?;
        }
        Command::Update { anime_id, progress } => {
            let update = fetcher.update_progress(&anime_id, progress).await?;
            print_json(&serde_json::json!({
                "status": update.status,
                "watched_ep": update.watched_episodes,
            }))?;
        }
        Command::Configure {
            client_id,
            access_token,
            refresh_token,
        } => {
            credentials.configure(
                client_id.as_deref(),
                access_token.as_deref(),
                refresh_token.as_deref(),
            )?;
        }
        Command::RefreshToken => {
            credentials.regenerate_token().await?;
            info!("Stored access token replaced");
        }
        Command::ClearCache => {
            fetcher.clear_cache()?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
