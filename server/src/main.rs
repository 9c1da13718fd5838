use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::join;

use reel_server::config;

/// Chunked video ingest server.
#[derive(Debug, Parser)]
#[clap(version)]
#[clap(propagate_version = true)]
struct Opts {
    /// Path to the config file.
    #[clap(short = 'f', long)]
    config: Option<PathBuf>,

    /// Socket address to listen on.
    ///
    /// This overrides `listen` in the config.
    #[clap(short = 'l', long)]
    listen: Option<SocketAddr>,

    /// Mode to run.
    #[clap(long, default_value = "monolithic")]
    mode: ServerMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ServerMode {
    /// Run all components.
    Monolithic,

    /// Run the API server.
    ApiServer,

    /// Run the staging-directory sweeper periodically.
    Sweeper,

    /// Run the database migrations then exit.
    DbMigrations,

    /// Run the staging-directory sweeper then exit.
    SweeperOnce,

    /// Check the configuration then exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    dump_version();

    let opts = Opts::parse();
    let config = if let Some(config_path) = &opts.config {
        config::load_config_from_path(config_path)?
    } else if config::config_env_is_set() {
        config::load_config_from_env()?
    } else {
        // Config from XDG
        let config_path = config::get_xdg_config_path()?;

        if !config_path.exists() {
            eprintln!("You haven't specified a config file (--config/-f), and the XDG config file doesn't exist.");
            eprintln!(
                "Hint: Write your configuration to {} or set REEL_SERVER_CONFIG_BASE64.",
                config_path.display()
            );
        }

        config::load_config_from_path(&config_path)?
    };

    match opts.mode {
        ServerMode::Monolithic => {
            reel_server::run_migrations(config.clone()).await?;

            let (api_server, _) = join!(
                reel_server::run_api_server(opts.listen, config.clone()),
                reel_server::gc::run_garbage_collection(config.clone()),
            );

            api_server?;
        }
        ServerMode::ApiServer => {
            reel_server::run_api_server(opts.listen, config).await?;
        }
        ServerMode::Sweeper => {
            reel_server::gc::run_garbage_collection(config).await;
        }
        ServerMode::DbMigrations => {
            reel_server::run_migrations(config).await?;
        }
        ServerMode::SweeperOnce => {
            reel_server::gc::run_garbage_collection_once(config).await?;
        }
        ServerMode::CheckConfig => {
            // config is valid, let's just exit :)
        }
    }

    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt::init();
}

fn dump_version() {
    #[cfg(debug_assertions)]
    eprintln!("Reel Server {} (debug)", env!("CARGO_PKG_VERSION"));

    #[cfg(not(debug_assertions))]
    eprintln!("Reel Server {} (release)", env!("CARGO_PKG_VERSION"));
}
