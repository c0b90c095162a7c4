use std::path::PathBuf;

use async_trait::async_trait;

use crate::{Error, Result};

/// Object storage contract: fetch every chunk of one synced file and return
/// the merged bytes. Implementations must be idempotent; the scheduler calls
/// this on every recompute.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn download_and_merge(
        &self,
        user_id: &str,
        external_id: &str,
        name: &str,
    ) -> Result<Vec<u8>>;
}

/// Filesystem-backed blob store. A synced file lives either as a plain file
/// `<root>/<user>/<external>/<name>` (already merged) or as a chunk directory
/// of the same path whose entries concatenate in name order.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, user_id: &str, external_id: &str, name: &str) -> PathBuf {
        self.root.join(user_id).join(external_id).join(name)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn download_and_merge(
        &self,
        user_id: &str,
        external_id: &str,
        name: &str,
    ) -> Result<Vec<u8>> {
        let path = self.object_path(user_id, external_id, name);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|err| Error::Blob(format!("{}: {}", path.display(), err)))?;

        if metadata.is_file() {
            return Ok(tokio::fs::read(&path).await?);
        }

        let mut chunk_names = Vec::new();
        let mut entries = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                chunk_names.push(entry.file_name());
            }
        }
        chunk_names.sort();

        let mut merged = Vec::new();
        for chunk in chunk_names {
            let bytes = tokio::fs::read(path.join(&chunk)).await?;
            merged.extend_from_slice(&bytes);
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_plain_file() {
        let dir = TempDir::new().unwrap();
        let object = dir.path().join("u1/ext1");
        std::fs::create_dir_all(&object).unwrap();
        std::fs::write(object.join("main.jsonl"), b"line\n").unwrap();

        let store = FsBlobStore::new(dir.path());
        let bytes = store.download_and_merge("u1", "ext1", "main.jsonl").await.unwrap();
        assert_eq!(bytes, b"line\n");
    }

    #[tokio::test]
    async fn merges_chunks_in_name_order() {
        let dir = TempDir::new().unwrap();
        let object = dir.path().join("u1/ext1/main.jsonl");
        std::fs::create_dir_all(&object).unwrap();
        std::fs::write(object.join("000002.chunk"), b"second\n").unwrap();
        std::fs::write(object.join("000001.chunk"), b"first\n").unwrap();

        let store = FsBlobStore::new(dir.path());
        let bytes = store.download_and_merge("u1", "ext1", "main.jsonl").await.unwrap();
        assert_eq!(bytes, b"first\nsecond\n");
    }

    #[tokio::test]
    async fn missing_object_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(
            store
                .download_and_merge("u1", "ext1", "missing.jsonl")
                .await
                .is_err()
        );
    }
}
