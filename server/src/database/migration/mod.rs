//! Database migrations.

pub use sea_orm_migration::*;

mod m20260115_000001_create_video_chunk_data_table;
mod m20260115_000002_create_video_final_data_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260115_000001_create_video_chunk_data_table::Migration),
            Box::new(m20260115_000002_create_video_final_data_table::Migration),
        ]
    }
}
