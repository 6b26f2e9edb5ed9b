//! Bounded ingestion: persists incoming payloads without ever exceeding the
//! configured ceiling, writing in fixed increments and yielding to the
//! runtime between them so large uploads do not starve other tasks.

use std::fs;

use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::store::{sanitize_file_name, ArtifactStore, Origin, StoredArtifact};

#[derive(Debug, Clone)]
pub struct Ingestor<'a> {
    store: &'a ArtifactStore,
    max_size: u64,
    chunk_size: usize,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a ArtifactStore, limits: &Limits) -> Self {
        Self {
            store,
            max_size: limits.max_file_size,
            chunk_size: limits.chunk_size.max(1),
        }
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Rejects payloads above the ceiling. The bound is inclusive.
    pub fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_size {
            error!(size, limit = self.max_size, "Payload exceeds size limit");
            return Err(Error::TooLarge {
                size,
                limit: self.max_size,
            });
        }
        Ok(())
    }

    /// Persists `bytes` to scratch storage as a scoped artifact.
    ///
    /// `target_name` only contributes a sanitised suffix to the generated
    /// file name.
    pub async fn ingest(&self, bytes: &[u8], target_name: &str) -> Result<StoredArtifact> {
        self.check_size(bytes.len() as u64)?;
        let (file, mut artifact) = self.store.reserve(Origin::Scratch, "upload_", target_name)?;
        self.write_chunked(file, bytes, &artifact).await?;
        artifact.refresh_size()?;
        info!(
            path = %artifact.path().display(),
            size = artifact.size(),
            "Ingested payload into scratch storage"
        );
        Ok(artifact)
    }

    /// Persists `bytes` into the uploads directory under the sanitised
    /// `target_name`, replacing any previous upload of that name.
    pub async fn ingest_upload(&self, bytes: &[u8], target_name: &str) -> Result<StoredArtifact> {
        self.check_size(bytes.len() as u64)?;
        let final_name = sanitize_file_name(target_name);
        let (file, partial) = self.store.reserve(Origin::Upload, ".partial_", &final_name)?;
        self.write_chunked(file, bytes, &partial).await?;

        let dest = self.store.dir(Origin::Upload).join(&final_name);
        if let Err(e) = fs::rename(partial.path(), &dest) {
            error!(error = ?e, to = %dest.display(), "Failed to move upload into place");
            return Err(e.into());
        }
        let stored = StoredArtifact::describe(&dest, Origin::Upload)?;
        info!(path = %stored.path().display(), size = stored.size(), "Stored upload");
        Ok(stored)
    }

    async fn write_chunked(
        &self,
        file: fs::File,
        bytes: &[u8],
        target: &StoredArtifact,
    ) -> Result<()> {
        let mut file = tokio::fs::File::from_std(file);
        for (index, chunk) in bytes.chunks(self.chunk_size).enumerate() {
            if let Err(e) = file.write_all(chunk).await {
                error!(error = ?e, path = %target.path().display(), chunk = index, "Chunk write failed");
                return Err(e.into());
            }
            debug!(chunk = index, len = chunk.len(), "Wrote chunk");
            tokio::task::yield_now().await;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}
