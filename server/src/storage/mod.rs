//! Chunk staging and final artifact storage.
//!
//! Chunks are staged as `<upload_dir>/<file_id>/chunk_<index>` and the
//! assembled artifact lands at `<upload_dir>/<file_name>`. The upload
//! directory must be a shared volume when replicas run on multiple
//! hosts: chunks of one upload arrive on different replicas and the
//! assembling replica reads all of them.

use std::path::{Path, PathBuf};

use anyhow::anyhow;
use tokio::fs::{self, File};
use tokio::io;

use crate::error::{ServerError, ServerResult};
use reel::file_id::FileId;

#[derive(Debug)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    pub async fn new(root: PathBuf) -> ServerResult<Self> {
        fs::create_dir_all(&root).await.map_err(|e| {
            ServerError::StorageError(anyhow!(
                "Failed to create upload directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self { root })
    }

    /// Returns the staging directory of an upload.
    pub fn staging_dir(&self, file_id: &FileId) -> PathBuf {
        self.root.join(file_id.as_str())
    }

    /// Returns the blob path of one chunk.
    pub fn chunk_path(&self, file_id: &FileId, chunk_index: u32) -> PathBuf {
        self.staging_dir(file_id)
            .join(format!("chunk_{}", chunk_index))
    }

    /// Returns the path of the assembled artifact.
    pub fn final_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Creates the staging directory of an upload. Idempotent.
    pub async fn create_staging(&self, file_id: &FileId) -> ServerResult<()> {
        fs::create_dir_all(self.staging_dir(file_id))
            .await
            .map_err(ServerError::storage_error)?;

        Ok(())
    }

    /// Writes one chunk blob, truncating any previous content so a
    /// retried delivery overwrites cleanly.
    pub async fn write_chunk(
        &self,
        file_id: &FileId,
        chunk_index: u32,
        bytes: &[u8],
    ) -> ServerResult<PathBuf> {
        let path = self.chunk_path(file_id, chunk_index);
        fs::write(&path, bytes)
            .await
            .map_err(ServerError::storage_error)?;

        Ok(path)
    }

    /// Concatenates chunks `0..total_chunks` into the final artifact.
    ///
    /// The bytes are staged in a hidden sibling file and renamed into
    /// place only once every chunk has been appended, so a crash mid-way
    /// never leaves a half-written file under the advertised name. Chunk
    /// blobs are deleted as they are consumed.
    ///
    /// Returns the size of the assembled file.
    pub async fn assemble(
        &self,
        file_id: &FileId,
        file_name: &str,
        total_chunks: u32,
    ) -> ServerResult<u64> {
        let part_path = self.root.join(format!(".{}.part", file_name));

        match self.concatenate(file_id, total_chunks, &part_path).await {
            Ok(size) => {
                fs::rename(&part_path, self.final_path(file_name))
                    .await
                    .map_err(ServerError::assembly_error)?;
                Ok(size)
            }
            Err(e) => {
                let _ = fs::remove_file(&part_path).await;
                Err(e)
            }
        }
    }

    async fn concatenate(
        &self,
        file_id: &FileId,
        total_chunks: u32,
        part_path: &Path,
    ) -> ServerResult<u64> {
        let mut output = File::create(part_path)
            .await
            .map_err(ServerError::assembly_error)?;
        let mut total = 0u64;

        for index in 0..total_chunks {
            let chunk_path = self.chunk_path(file_id, index);
            let mut chunk = File::open(&chunk_path).await.map_err(|e| {
                ServerError::AssemblyError(anyhow!(
                    "Chunk {} of upload {} is missing or unreadable: {}",
                    index,
                    file_id,
                    e
                ))
            })?;

            total += io::copy(&mut chunk, &mut output)
                .await
                .map_err(ServerError::assembly_error)?;

            fs::remove_file(&chunk_path)
                .await
                .map_err(ServerError::assembly_error)?;
        }

        output
            .sync_all()
            .await
            .map_err(ServerError::assembly_error)?;

        Ok(total)
    }

    /// Removes the staging directory of an upload. Idempotent.
    pub async fn remove_staging(&self, file_id: &FileId) -> ServerResult<()> {
        match fs::remove_dir_all(self.staging_dir(file_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServerError::storage_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel::testing::get_fake_data;

    async fn test_store() -> (tempfile::TempDir, ChunkStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path().to_owned()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_assembly_concatenates_in_order() {
        let (_dir, store) = test_store().await;
        let file_id = FileId::generate();
        store.create_staging(&file_id).await.unwrap();

        let data = get_fake_data(2500);

        // chunks written out of order
        store.write_chunk(&file_id, 2, &data[2048..]).await.unwrap();
        store.write_chunk(&file_id, 0, &data[..1024]).await.unwrap();
        store.write_chunk(&file_id, 1, &data[1024..2048]).await.unwrap();

        let size = store.assemble(&file_id, "movie.mp4", 3).await.unwrap();
        assert_eq!(size, 2500);

        let assembled = fs::read(store.final_path("movie.mp4")).await.unwrap();
        assert_eq!(assembled, data);

        // blobs are consumed and the part file is gone
        assert!(!store.chunk_path(&file_id, 0).exists());
        assert!(!_dir.path().join(".movie.mp4.part").exists());

        store.remove_staging(&file_id).await.unwrap();
        assert!(!store.staging_dir(&file_id).exists());
    }

    #[tokio::test]
    async fn test_duplicate_chunk_overwrites() {
        let (_dir, store) = test_store().await;
        let file_id = FileId::generate();
        store.create_staging(&file_id).await.unwrap();

        let data = get_fake_data(512);
        store.write_chunk(&file_id, 0, &data).await.unwrap();
        store.write_chunk(&file_id, 0, &data).await.unwrap();

        let size = store.assemble(&file_id, "dup.bin", 1).await.unwrap();
        assert_eq!(size, 512);
        assert_eq!(fs::read(store.final_path("dup.bin")).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_assembly_aborts_on_missing_chunk() {
        let (dir, store) = test_store().await;
        let file_id = FileId::generate();
        store.create_staging(&file_id).await.unwrap();

        store
            .write_chunk(&file_id, 0, &get_fake_data(1024))
            .await
            .unwrap();
        // chunk 1 never arrives

        let result = store.assemble(&file_id, "partial.mp4", 2).await;
        assert!(matches!(result, Err(ServerError::AssemblyError(_))));

        // no artifact appears under the advertised name, and the
        // staging directory survives for inspection
        assert!(!store.final_path("partial.mp4").exists());
        assert!(!dir.path().join(".partial.mp4.part").exists());
        assert!(store.staging_dir(&file_id).exists());
    }

    #[tokio::test]
    async fn test_remove_staging_is_idempotent() {
        let (_dir, store) = test_store().await;
        let file_id = FileId::generate();

        store.remove_staging(&file_id).await.unwrap();

        store.create_staging(&file_id).await.unwrap();
        store.remove_staging(&file_id).await.unwrap();
        store.remove_staging(&file_id).await.unwrap();
    }
}
