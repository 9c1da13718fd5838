#![deny(
    asm_sub_register,
    deprecated,
    missing_abi,
    unsafe_code,
    unused_macros,
    unused_must_use,
    unused_unsafe
)]
#![deny(clippy::from_over_into, clippy::needless_question_mark)]
#![cfg_attr(
    not(debug_assertions),
    deny(unused_imports, unused_mut, unused_variables,)
)]

//! The Reel ingest server.
//!
//! Each replica is stateless: all per-upload state lives in the shared
//! session store, so the edge router is free to spray chunks of the same
//! upload across the whole fleet. The replica that records the last chunk
//! of an upload is elected by the store to assemble the final artifact.

pub mod access;
mod api;
pub mod config;
pub mod database;
mod error;
pub mod gc;
mod media;
mod middleware;
mod search;
mod session;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{extract::Extension, http::Uri, Router};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use tokio::sync::OnceCell;
use tokio::time;
use tower_http::catch_panic::CatchPanicLayer;

use access::http::apply_auth;
use config::Config;
use database::migration::{Migrator, MigratorTrait};
use error::{ServerError, ServerResult};
use media::MediaProcessor;
use middleware::apply_cors;
use search::SearchIndexer;
use session::{RedisSessionStore, SessionStore};
use storage::ChunkStore;

type State = Arc<StateInner>;

/// Global server state.
#[derive(Debug)]
pub struct StateInner {
    /// The Reel Server configuration.
    config: Config,

    /// Handle to the catalog database.
    database: OnceCell<DatabaseConnection>,

    /// Handle to the shared session store.
    sessions: OnceCell<Arc<Box<dyn SessionStore>>>,

    /// Handle to the search indexer.
    search: OnceCell<Arc<SearchIndexer>>,

    /// Handle to the chunk store.
    chunk_store: OnceCell<Arc<ChunkStore>>,

    /// The media tool wrapper.
    media: MediaProcessor,
}

impl StateInner {
    async fn new(config: Config) -> State {
        let media = MediaProcessor::new(config.media.clone(), config.upload_dir.clone());

        Arc::new(Self {
            config,
            database: OnceCell::new(),
            sessions: OnceCell::new(),
            search: OnceCell::new(),
            chunk_store: OnceCell::new(),
            media,
        })
    }

    /// Returns a handle to the catalog database.
    async fn database(&self) -> ServerResult<&DatabaseConnection> {
        self.database
            .get_or_try_init(|| async {
                let mut options = ConnectOptions::new(self.config.database.url.clone());
                options
                    .max_connections(self.config.database.max_connections)
                    .min_connections(1)
                    .idle_timeout(self.config.database.idle_timeout)
                    .acquire_timeout(Duration::from_secs(30))
                    .sqlx_logging(false);

                let connection = Database::connect(options)
                    .await
                    .map_err(ServerError::database_error)?;
                database::apply_engine_configuration(&connection).await?;

                Ok(connection)
            })
            .await
    }

    /// Returns a handle to the session store.
    async fn sessions(&self) -> ServerResult<&Arc<Box<dyn SessionStore>>> {
        self.sessions
            .get_or_try_init(|| async {
                let store = RedisSessionStore::new(&self.config.session_store).await?;
                let boxed: Box<dyn SessionStore> = Box::new(store);
                Ok(Arc::new(boxed))
            })
            .await
    }

    /// Returns a handle to the search indexer.
    async fn search(&self) -> ServerResult<&Arc<SearchIndexer>> {
        self.search
            .get_or_try_init(|| async {
                let indexer = SearchIndexer::new(&self.config.search)?;
                Ok(Arc::new(indexer))
            })
            .await
    }

    /// Returns a handle to the chunk store.
    async fn chunk_store(&self) -> ServerResult<&Arc<ChunkStore>> {
        self.chunk_store
            .get_or_try_init(|| async {
                let store = ChunkStore::new(self.config.upload_dir.clone()).await?;
                Ok(Arc::new(store))
            })
            .await
    }

    /// Sends periodic heartbeat queries to the database.
    async fn run_db_heartbeat(&self) -> ServerResult<()> {
        let db = self.database().await?;
        let stmt =
            Statement::from_string(db.get_database_backend(), "SELECT 'heartbeat';".to_string());

        loop {
            let _ = db.execute(stmt.clone()).await;
            time::sleep(Duration::from_secs(60)).await;
        }
    }
}

/// The fallback route.
#[axum_macros::debug_handler]
async fn fallback(_: Uri) -> ServerResult<()> {
    Err(ServerError::NotFound)
}

/// Runs the API server.
pub async fn run_api_server(cli_listen: Option<SocketAddr>, config: Config) -> Result<()> {
    eprintln!("Starting API server...");

    let state = StateInner::new(config).await;

    let listen = if let Some(cli_listen) = cli_listen {
        cli_listen
    } else {
        state.config.listen.to_owned()
    };

    let rest = Router::new()
        .merge(api::get_router())
        .fallback(fallback)
        // middlewares
        .layer(axum::middleware::from_fn(apply_auth))
        .layer(axum::middleware::from_fn(apply_cors))
        .layer(Extension(state.clone()))
        .layer(CatchPanicLayer::new());

    eprintln!("Listening on {:?}...", listen);

    let (server_ret, _) = tokio::join!(
        axum::Server::bind(&listen).serve(rest.into_make_service()),
        async {
            if state.config.database.heartbeat {
                let _ = state.run_db_heartbeat().await;
            }
        },
    );

    server_ret?;

    Ok(())
}

/// Runs database migrations.
pub async fn run_migrations(config: Config) -> Result<()> {
    eprintln!("Running migrations...");

    let state = StateInner::new(config).await;
    let db = state.database().await?;
    Migrator::up(db, None).await?;

    Ok(())
}
