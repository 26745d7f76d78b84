use std::path::PathBuf;
use std::sync::Arc;

use buildpack_cache::cache::{
    CacheRoots, DownloadCache, HttpSettings, InternetAvailability, RootSources, sanitize_uri,
};
use buildpack_cache::config::{self, Config};
use buildpack_cache::logging;
use buildpack_cache::repository::{ItemConfiguration, RepositoryContext, find_item};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::debug;

#[derive(Parser)]
#[command(name = "buildpack-cache")]
#[command(version, about = "Resolve dependency versions and cache their artifacts")]
struct Cli {
    /// Configuration file (defaults to $XDG_CONFIG_HOME/buildpack-cache/config.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Build-scoped cache directory; takes precedence over $BUILDPACK_CACHE
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Never attempt remote downloads
    #[arg(long, global = true)]
    offline: bool,

    /// Directory for JSON logs (defaults to $XDG_DATA_HOME/buildpack-cache)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a version against a repository index
    Resolve {
        /// Repository root; may contain {default.repository.root}, {platform} and {architecture}
        #[arg(long)]
        repository_root: Option<String>,

        /// Requested version, e.g. 1.7.+ (defaults to the latest)
        #[arg(long)]
        version: Option<String>,

        /// Component name used in error messages
        #[arg(long, default_value = "component")]
        component: String,
    },
    /// Fetch an artifact into the cache
    Fetch {
        uri: String,

        /// Copy the cached artifact to this path
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Remove an artifact from the mutable cache
    Evict { uri: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_dir = config::log_dir(cli.log_dir.clone());
    let _guard = logging::init(Some(&log_dir), cli.verbose)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(config::config_path);
    let config = Config::load(&config_path)?;
    debug!("Loaded configuration from {}", config_path.display());

    let availability = Arc::new(InternetAvailability::from_config(&config.cache));
    if cli.offline {
        availability.mark_unavailable("Offline mode requested");
    }

    let roots = CacheRoots::select(RootSources::from_env(
        cli.cache_dir,
        config.cache.resources_directory.clone(),
    ));
    let cache = Arc::new(DownloadCache::new(
        roots,
        availability,
        &HttpSettings::from_config(&config.cache),
    )?);

    match cli.command {
        Command::Resolve {
            repository_root,
            version,
            component,
        } => {
            let context =
                RepositoryContext::new(cache, config.repository.default_repository_root.clone());
            let configuration = ItemConfiguration {
                repository_root,
                version,
            };
            let item = find_item(&component, &configuration, &context, None).await?;

            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "component": component,
                    "version": item.version.to_string(),
                    "uri": item.uri,
                }))?
            );
        }
        Command::Fetch { uri, output } => {
            let mut artifact = cache.get(&uri).await?;
            if let Some(output) = &output {
                let mut target = tokio::fs::File::create(output).await?;
                tokio::io::copy(&mut artifact.file, &mut target).await?;
            }

            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "uri": sanitize_uri(&uri),
                    "path": artifact.path,
                    "downloaded": artifact.downloaded,
                }))?
            );
        }
        Command::Evict { uri } => {
            cache.evict(&uri).await?;
            println!("Evicted {}", sanitize_uri(&uri));
        }
    }

    Ok(())
}
