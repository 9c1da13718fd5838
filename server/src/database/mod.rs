//! The catalog database.
//!
//! The catalog is a durable audit trail of chunk arrivals and final
//! files in a local embedded SQL database. It is deliberately off the
//! correctness path: writes are best-effort and the caller logs and
//! continues when they fail, because the session store is the authority
//! on protocol state.

pub mod entity;
pub mod migration;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::ActiveValue::Set;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait, Statement};

use crate::error::{ServerError, ServerResult};
use entity::chunk_record::{self, Entity as ChunkRecord};
use entity::final_record::{self, Entity as FinalRecord};
use reel::file_id::FileId;

#[async_trait]
pub trait ReelDatabase: Send + Sync {
    /// Records the arrival of a chunk. Insert-or-replace.
    async fn upsert_chunk(
        &self,
        file_id: &FileId,
        total_chunks: u32,
        chunk_id: u32,
        chunk_path: &Path,
    ) -> ServerResult<()>;

    /// Records an assembled final file. Insert-or-replace.
    async fn upsert_final(
        &self,
        file_id: &FileId,
        file_size: u64,
        file_path: &Path,
    ) -> ServerResult<()>;
}

#[async_trait]
impl ReelDatabase for DatabaseConnection {
    async fn upsert_chunk(
        &self,
        file_id: &FileId,
        total_chunks: u32,
        chunk_id: u32,
        chunk_path: &Path,
    ) -> ServerResult<()> {
        let now = Utc::now();

        let model = chunk_record::ActiveModel {
            file_id: Set(file_id.as_str().to_owned()),
            total_chunks: Set(total_chunks as i32),
            chunk_id: Set(chunk_id as i32),
            chunk_locations: Set(Some(chunk_path.to_string_lossy().into_owned())),
            created_at: Set(now),
            updated_at: Set(now),
            is_complete: Set(true),
        };

        ChunkRecord::insert(model)
            .on_conflict(
                OnConflict::columns([
                    chunk_record::Column::FileId,
                    chunk_record::Column::ChunkId,
                ])
                .update_columns([
                    chunk_record::Column::TotalChunks,
                    chunk_record::Column::ChunkLocations,
                    chunk_record::Column::UpdatedAt,
                    chunk_record::Column::IsComplete,
                ])
                .to_owned(),
            )
            .exec(self)
            .await
            .map_err(ServerError::database_error)?;

        Ok(())
    }

    async fn upsert_final(
        &self,
        file_id: &FileId,
        file_size: u64,
        file_path: &Path,
    ) -> ServerResult<()> {
        let model = final_record::ActiveModel {
            file_id: Set(file_id.as_str().to_owned()),
            file_size: Set(file_size as i64),
            file_locations: Set(Some(file_path.to_string_lossy().into_owned())),
            created_at: Set(Utc::now()),
        };

        FinalRecord::insert(model)
            .on_conflict(
                OnConflict::column(final_record::Column::FileId)
                    .update_columns([
                        final_record::Column::FileSize,
                        final_record::Column::FileLocations,
                    ])
                    .to_owned(),
            )
            .exec(self)
            .await
            .map_err(ServerError::database_error)?;

        Ok(())
    }
}

/// Applies the required engine configuration to an SQLite catalog.
///
/// Write-ahead logging lets concurrent handler threads write without
/// serializing on the whole database, and the busy timeout makes
/// contended writes wait instead of failing.
pub(crate) async fn apply_engine_configuration(db: &DatabaseConnection) -> ServerResult<()> {
    if db.get_database_backend() != DatabaseBackend::Sqlite {
        return Ok(());
    }

    for pragma in [
        "PRAGMA journal_mode = WAL;",
        "PRAGMA busy_timeout = 5000;",
        "PRAGMA synchronous = NORMAL;",
    ] {
        db.execute(Statement::from_string(
            db.get_database_backend(),
            pragma.to_string(),
        ))
        .await
        .map_err(ServerError::database_error)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{ConnectOptions, Database, PaginatorTrait};

    async fn test_database() -> DatabaseConnection {
        // a pool of in-memory SQLite connections would be a pool of
        // separate databases
        let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
        options.max_connections(1);

        let db = Database::connect(options).await.unwrap();
        apply_engine_configuration(&db).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_upsert_chunk_is_idempotent() {
        let db = test_database().await;
        let file_id = FileId::generate();

        db.upsert_chunk(&file_id, 3, 0, Path::new("/uploads/x/chunk_0"))
            .await
            .unwrap();
        db.upsert_chunk(&file_id, 3, 0, Path::new("/uploads/x/chunk_0"))
            .await
            .unwrap();
        db.upsert_chunk(&file_id, 3, 1, Path::new("/uploads/x/chunk_1"))
            .await
            .unwrap();

        // one row per (file_id, chunk_id)
        let count = ChunkRecord::find().count(&db).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_upsert_final() {
        let db = test_database().await;
        let file_id = FileId::generate();

        db.upsert_final(&file_id, 3_000_000, Path::new("/uploads/movie.mp4"))
            .await
            .unwrap();
        db.upsert_final(&file_id, 3_000_001, Path::new("/uploads/movie.mp4"))
            .await
            .unwrap();

        let row = FinalRecord::find_by_id(file_id.as_str().to_owned())
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.file_size, 3_000_001);
    }
}
