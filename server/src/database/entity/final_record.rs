//! An assembled final file.

use sea_orm::entity::prelude::*;

/// An assembled final file.
///
/// Written exactly once per successful assembly, by the replica that
/// was elected to finalize the upload.
#[derive(Debug, Clone, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "video_final_data")]
pub struct Model {
    /// The upload the file was assembled from.
    #[sea_orm(primary_key, auto_increment = false)]
    pub file_id: String,

    /// Size of the assembled file in bytes.
    pub file_size: i64,

    /// Path of the final artifact.
    pub file_locations: Option<String>,

    /// Timestamp when the row was created.
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
