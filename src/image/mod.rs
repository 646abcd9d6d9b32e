pub mod stability;

use crate::{
    config::ApiKey,
    error::Result,
    models::{EnrichedPrompt, ImageArtifact},
};
use async_trait::async_trait;

pub use stability::StabilityClient;

/// One-shot text-to-image generation.
///
/// Implementations send exactly one request per call and never retry. Failures
/// are reported as `PipelineError::ImageSynthesis`.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    async fn synthesize(&self, credentials: &ApiKey, prompt: &EnrichedPrompt)
        -> Result<ImageArtifact>;
}
