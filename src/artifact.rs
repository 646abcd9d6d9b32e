//! Scoped ownership of generated images.
//!
//! Images that arrive as bytes are written under the store root and deleted
//! when their handle is released, explicitly or when the last clone drops.
//! Remote artifacts are never touched.

use crate::{
    error::{ImageSynthesisError, Result},
    models::{ArtifactLocation, ImageArtifact},
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` to a fresh file under the store root.
    pub async fn materialize(&self, bytes: Vec<u8>, extension: &str) -> Result<ImageArtifact> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ImageSynthesisError::Storage(e.to_string()))?;

        let extension = extension.trim_start_matches('.');
        let path = self
            .root
            .join(format!("image-{}.{}", Uuid::new_v4(), extension));

        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ImageSynthesisError::Storage(format!("{}: {}", path.display(), e)))?;

        log::debug!("Materialized {} bytes at {}", bytes.len(), path.display());
        Ok(ImageArtifact::local(path, Some(bytes)))
    }

    pub fn acquire(&self, artifact: ImageArtifact) -> ArtifactHandle {
        log::debug!("Acquired artifact {}", artifact.location);
        ArtifactHandle {
            inner: Arc::new(HandleInner {
                artifact,
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Returns `Ok(true)` only for the call that actually deleted a local file.
    pub fn release(&self, handle: &ArtifactHandle) -> io::Result<bool> {
        handle.release()
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    artifact: ImageArtifact,
    released: AtomicBool,
}

impl ArtifactHandle {
    pub fn artifact(&self) -> &ImageArtifact {
        &self.inner.artifact
    }

    pub fn location(&self) -> &ArtifactLocation {
        &self.inner.artifact.location
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    pub fn release(&self) -> io::Result<bool> {
        self.inner.release()
    }
}

impl HandleInner {
    fn release(&self) -> io::Result<bool> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        match &self.artifact.location {
            ArtifactLocation::Remote(_) => Ok(false),
            ArtifactLocation::Local(path) => match std::fs::remove_file(path) {
                Ok(()) => {
                    log::debug!("Deleted artifact {}", path.display());
                    Ok(true)
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e),
            },
        }
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!(
                "Failed to delete artifact {} on drop: {}",
                self.artifact.location,
                e
            );
        }
    }
}
