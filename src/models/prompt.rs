use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    base_prompt: String,
}

impl GenerationRequest {
    pub fn new(base_prompt: impl Into<String>) -> Result<Self> {
        let base_prompt = base_prompt.into();
        if base_prompt.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "base prompt must not be empty".into(),
            ));
        }
        Ok(Self { base_prompt })
    }

    pub fn base_prompt(&self) -> &str {
        &self.base_prompt
    }
}

/// Prompt text handed to the image service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrichedPrompt(String);

impl EnrichedPrompt {
    pub(crate) fn new(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EnrichedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
