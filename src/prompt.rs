use crate::{
    error::{PipelineError, Result},
    models::{EnrichedPrompt, GenerationRequest},
};
use async_trait::async_trait;
use std::sync::Arc;

pub const STYLE_SUFFIX: &str = ", detailed, vibrant, high resolution";

/// External text generation used to rewrite prompts and captions.
#[async_trait]
pub trait PromptEnricher: Send + Sync {
    async fn complete(&self, instruction: &str) -> Result<String>;

    fn name(&self) -> &str {
        "enricher"
    }
}

/// Deterministic prompt rewrite: trims the base prompt and appends the style suffix.
pub fn transform(base_prompt: &str) -> Result<EnrichedPrompt> {
    let base = base_prompt.trim();
    if base.is_empty() {
        return Err(PipelineError::InvalidInput(
            "base prompt must not be empty".into(),
        ));
    }
    Ok(EnrichedPrompt::new(format!("{}{}", base, STYLE_SUFFIX)))
}

pub fn fallback_caption(base_prompt: &str) -> String {
    format!(
        "Check out this amazing image and video based on: '{}'!",
        base_prompt.trim()
    )
}

#[derive(Clone, Default)]
pub struct PromptTransformer {
    enricher: Option<Arc<dyn PromptEnricher>>,
}

impl PromptTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enricher(enricher: Arc<dyn PromptEnricher>) -> Self {
        Self {
            enricher: Some(enricher),
        }
    }

    pub fn has_enricher(&self) -> bool {
        self.enricher.is_some()
    }

    pub fn enricher(&self) -> Option<Arc<dyn PromptEnricher>> {
        self.enricher.clone()
    }

    pub fn transform(&self, base_prompt: &str) -> Result<EnrichedPrompt> {
        transform(base_prompt)
    }

    /// Enriches through the backend when one is configured. Backend errors
    /// and blank completions fall back to [`transform`].
    pub async fn prepare(&self, request: &GenerationRequest) -> Result<EnrichedPrompt> {
        let fallback = transform(request.base_prompt())?;

        let Some(enricher) = &self.enricher else {
            log::info!("Using fallback prompt modification");
            return Ok(fallback);
        };

        let instruction = format!(
            "Enhance this prompt for image generation: {}",
            request.base_prompt().trim()
        );
        match enricher.complete(&instruction).await {
            Ok(text) if !text.trim().is_empty() => {
                log::debug!("Prompt enriched by {}", enricher.name());
                Ok(EnrichedPrompt::new(text.trim().to_string()))
            }
            Ok(_) => {
                log::warn!(
                    "{} returned an empty prompt, using fallback prompt modification",
                    enricher.name()
                );
                Ok(fallback)
            }
            Err(e) => {
                log::warn!(
                    "Prompt enrichment via {} failed ({}), using fallback prompt modification",
                    enricher.name(),
                    e
                );
                Ok(fallback)
            }
        }
    }

    /// Short social caption for the finished run. Never fails.
    pub async fn caption(&self, request: &GenerationRequest) -> String {
        let base = request.base_prompt();
        let Some(enricher) = &self.enricher else {
            return fallback_caption(base);
        };

        let instruction = format!(
            "Write a short and catchy caption for this post: {}",
            base.trim()
        );
        match enricher.complete(&instruction).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => fallback_caption(base),
            Err(e) => {
                log::warn!("Caption generation failed ({}), using default caption", e);
                fallback_caption(base)
            }
        }
    }
}
