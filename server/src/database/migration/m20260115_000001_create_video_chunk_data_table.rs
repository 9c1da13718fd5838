use sea_orm_migration::prelude::*;

use crate::database::entity::chunk_record::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260115_000001_create_video_chunk_data_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Entity)
                    .col(ColumnDef::new(Column::FileId).string().not_null())
                    .col(ColumnDef::new(Column::TotalChunks).integer().not_null())
                    .col(
                        ColumnDef::new(Column::ChunkId)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Column::ChunkLocations).string().null())
                    .col(
                        ColumnDef::new(Column::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Column::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Column::IsComplete)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk-video-chunk-data")
                            .col(Column::FileId)
                            .col(Column::ChunkId),
                    )
                    .to_owned(),
            )
            .await
    }
}
