use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Ordered steps of a run, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Prompt,
    Image,
    VideoSubmit,
    VideoPoll,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prompt => "prompt",
            Stage::Image => "image",
            Stage::VideoSubmit => "video-submit",
            Stage::VideoPoll => "video-poll",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Start,
    PromptReady,
    ImageReady,
    VideoSubmitted,
    VideoTerminal,
    Done,
    Failed,
}

impl PipelineState {
    /// The forward state reached when the given stage succeeds.
    pub fn after(stage: Stage) -> Self {
        match stage {
            Stage::Prompt => PipelineState::PromptReady,
            Stage::Image => PipelineState::ImageReady,
            Stage::VideoSubmit => PipelineState::VideoSubmitted,
            Stage::VideoPoll => PipelineState::VideoTerminal,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutput {
    pub run_id: Uuid,
    pub image_reference: String,
    pub video_reference: String,
    pub video_outputs: Vec<String>,
    pub caption: String,
}

/// First failure of a run, tagged with the stage that produced it.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}

impl StageFailure {
    pub fn new(stage: Stage, error: PipelineError) -> Self {
        Self { stage, error }
    }
}

pub type PipelineResult = std::result::Result<PipelineOutput, StageFailure>;
