//! Garbage collection.
//!
//! Abandoned uploads leave a staging directory behind after the session
//! store expires their session. The sweeper removes any staging
//! directory whose session is gone and whose last write is older than
//! the grace period. Directories of failed assemblies also have no
//! session left and are reaped the same way once old enough.

use std::time::Duration;

use anyhow::Result;
use tokio::fs;
use tokio::time;
use tracing::instrument;

use super::{State, StateInner};
use crate::config::Config;
use crate::error::ServerError;
use reel::file_id::FileId;

/// Runs garbage collection periodically.
pub async fn run_garbage_collection(config: Config) {
    let interval = config.garbage_collection.interval;

    if interval == Duration::ZERO {
        // disabled
        return;
    }

    loop {
        // We don't stop even if it errors
        if let Err(e) = run_garbage_collection_once(config.clone()).await {
            tracing::warn!("Garbage collection failed: {}", e);
        }

        time::sleep(interval).await;
    }
}

/// Runs garbage collection once.
#[instrument(skip_all)]
pub async fn run_garbage_collection_once(config: Config) -> Result<()> {
    tracing::info!("Running garbage collection...");

    let state = StateInner::new(config).await;
    sweep_staging_directories(&state).await
}

#[instrument(skip_all)]
async fn sweep_staging_directories(state: &State) -> Result<()> {
    let sessions = state.sessions().await?;
    let grace_period = state.config.garbage_collection.grace_period;

    let mut entries = fs::read_dir(&state.config.upload_dir).await?;
    let mut removed = 0usize;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }

        // staging directories are named after the file ID; everything
        // else in the upload directory is a final artifact
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Ok(file_id) = name.parse::<FileId>() else {
            continue;
        };

        match sessions.load(&file_id).await {
            // the upload is still alive
            Ok(_) => continue,
            Err(ServerError::InvalidSession) => {}
            Err(e) => return Err(e.into()),
        }

        let modified = entry.metadata().await?.modified()?;
        match modified.elapsed() {
            Ok(age) if age >= grace_period => {}
            _ => continue,
        }

        tracing::info!("Removing orphaned staging directory {}", name);
        fs::remove_dir_all(entry.path()).await?;
        removed += 1;
    }

    if removed > 0 {
        tracing::info!("Removed {} orphaned staging directories", removed);
    }

    Ok(())
}
