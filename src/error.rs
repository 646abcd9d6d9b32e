use crate::models::Stage;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing credential: {0} is not configured")]
    MissingCredential(&'static str),

    #[error("Image synthesis error: {0}")]
    ImageSynthesis(#[from] ImageSynthesisError),

    #[error("Video submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Video polling error: {0}")]
    Polling(#[from] PollingError),

    #[error("Task {task_id} reported success without any output")]
    InconsistentSuccess { task_id: String },

    #[error("Run cancelled during {stage} stage")]
    Cancelled { stage: Stage },

    #[error("Internal error during {stage} stage: {message}")]
    Internal { stage: Stage, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Enrichment error: {0}")]
    Enrichment(String),
}

#[derive(Debug, Error)]
pub enum ImageSynthesisError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("service returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("service reported success but returned no artifact")]
    NoArtifact,

    #[error("image was rejected by the service content filter")]
    ContentFiltered,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("could not store artifact: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("service returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("image could not be prepared for submission: {0}")]
    InvalidImage(String),
}

#[derive(Debug, Error)]
pub enum PollingError {
    #[error("status request failed: {0}")]
    Transport(String),

    #[error("service returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("malformed status response: {0}")]
    Malformed(String),

    #[error("task {task_id} failed: {}", reason.as_deref().unwrap_or("no reason given"))]
    Failed {
        task_id: String,
        reason: Option<String>,
    },

    #[error("task {task_id} was cancelled by the service")]
    Cancelled { task_id: String },

    #[error("task {task_id} did not finish within {waited:?}")]
    TimedOut { task_id: String, waited: Duration },

    #[error("waiting for task {task_id} was aborted")]
    Aborted { task_id: String },
}

impl PipelineError {
    /// Short machine-readable name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::MissingCredential(_) => "missing_credential",
            PipelineError::ImageSynthesis(_) => "image_synthesis",
            PipelineError::Submission(_) => "submission",
            PipelineError::Polling(PollingError::TimedOut { .. }) => "polling_timeout",
            PipelineError::Polling(_) => "polling",
            PipelineError::InconsistentSuccess { .. } => "inconsistent_success",
            PipelineError::Cancelled { .. } => "cancelled",
            PipelineError::Internal { .. } => "internal",
            PipelineError::Config(_) => "config",
            PipelineError::Enrichment(_) => "enrichment",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
