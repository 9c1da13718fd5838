//! A received chunk of an in-flight upload.

use sea_orm::entity::prelude::*;

/// A received chunk of an in-flight upload.
///
/// Rows are written once per accepted chunk as a durable audit trail.
/// The session store, not this table, is the authority on protocol
/// state: a failed write here is logged and the upload carries on.
#[derive(Debug, Clone, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "video_chunk_data")]
pub struct Model {
    /// The upload this chunk belongs to.
    #[sea_orm(primary_key, auto_increment = false)]
    pub file_id: String,

    /// Total number of chunks of the upload.
    pub total_chunks: i32,

    /// Index of this chunk.
    #[sea_orm(primary_key, auto_increment = false)]
    pub chunk_id: i32,

    /// Path of the chunk blob in the staging directory.
    pub chunk_locations: Option<String>,

    /// Timestamp when the row was created.
    pub created_at: ChronoDateTimeUtc,

    /// Timestamp of the last upsert.
    pub updated_at: ChronoDateTimeUtc,

    /// Whether the chunk bytes were fully received.
    pub is_complete: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
