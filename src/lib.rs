//! Prompt-to-image-to-video generation.
//!
//! A [`Pipeline`] enriches a text prompt, renders an image, submits it for
//! animation and polls the video task until it settles. Every run ends in a
//! [`PipelineOutput`] or a [`StageFailure`] naming the stage that failed.

pub mod artifact;
pub mod bedrock;
pub mod cancel;
pub mod config;
pub mod error;
pub mod image;
pub mod logger;
pub mod mock;
pub mod models;
pub mod pipeline;
pub mod prompt;
#[cfg(feature = "server")]
pub mod server;
pub mod video;

pub use artifact::{ArtifactHandle, ArtifactStore};
pub use bedrock::BedrockEnricher;
pub use cancel::CancelSignal;
pub use config::{ApiKey, Config, Credentials, PollingConfig};
pub use error::{ImageSynthesisError, PipelineError, PollingError, Result, SubmissionError};
pub use image::{ImageSynthesizer, StabilityClient};
pub use models::{
    GenerationRequest, PipelineOutput, PipelineResult, PipelineState, Stage, StageFailure,
    TaskStatus, VideoTask,
};
pub use pipeline::Pipeline;
pub use prompt::{PromptEnricher, PromptTransformer};
pub use video::{RunwayClient, VideoService, VideoTaskPoller};
