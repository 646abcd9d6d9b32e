//! Image-to-video submission and task polling.

pub mod runway;

use crate::{
    artifact::ArtifactHandle,
    cancel::CancelSignal,
    config::{ApiKey, PollingConfig, VideoServiceConfig},
    error::{PollingError, Result, SubmissionError},
    models::{ArtifactLocation, VideoDuration, VideoTask, VideoTaskRequest},
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

pub use runway::RunwayClient;

/// Remote asynchronous video generation service.
///
/// `create_task` failures are `PipelineError::Submission`, `retrieve_task`
/// failures are `PipelineError::Polling`.
#[async_trait]
pub trait VideoService: Send + Sync {
    async fn create_task(&self, credentials: &ApiKey, request: &VideoTaskRequest)
        -> Result<VideoTask>;

    async fn retrieve_task(&self, credentials: &ApiKey, task_id: &str) -> Result<VideoTask>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOptions {
    pub model: String,
    pub prompt_text: String,
    pub duration: VideoDuration,
    pub ratio: Option<String>,
}

impl VideoOptions {
    /// Uses the configured driving text, or `default_text` when none is set.
    pub fn from_config(config: &VideoServiceConfig, default_text: &str) -> Self {
        Self {
            model: config.model.clone(),
            prompt_text: config
                .prompt_text
                .clone()
                .unwrap_or_else(|| default_text.to_string()),
            duration: config.duration,
            ratio: config.ratio.clone(),
        }
    }
}

#[derive(Clone)]
pub struct VideoTaskPoller {
    service: Arc<dyn VideoService>,
    polling: PollingConfig,
}

impl VideoTaskPoller {
    pub fn new(service: Arc<dyn VideoService>, polling: PollingConfig) -> Self {
        Self { service, polling }
    }

    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    pub fn polling(&self) -> &PollingConfig {
        &self.polling
    }

    /// Sends exactly one creation request. The returned task is pending.
    pub async fn submit(
        &self,
        credentials: &ApiKey,
        image: &ArtifactHandle,
        options: &VideoOptions,
    ) -> Result<VideoTask> {
        let request = VideoTaskRequest {
            model: options.model.clone(),
            prompt_image: prompt_image(image).await?,
            prompt_text: options.prompt_text.clone(),
            duration: options.duration,
            ratio: options.ratio.clone(),
        };

        log::info!(
            "Submitting video task: model={} duration={}s",
            request.model,
            request.duration.seconds()
        );
        let task = self.service.create_task(credentials, &request).await?;
        log::info!("Task started successfully. Task ID: {}", task.id);
        Ok(task)
    }

    /// Polls until the task is terminal and maps the terminal status:
    /// succeeded with output is returned, anything else is an error.
    ///
    /// Bounded by `PollingConfig::max_wait` and aborted by `cancel`.
    pub async fn await_completion(
        &self,
        credentials: &ApiKey,
        task: VideoTask,
        cancel: &CancelSignal,
    ) -> Result<VideoTask> {
        if task.status.is_terminal() {
            return task.into_outcome();
        }

        let task_id = task.id.clone();
        let max_wait = self.polling.max_wait;
        let poll = tokio::time::timeout(max_wait, self.poll_until_terminal(credentials, task));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::warn!("Stopped waiting for task {}: cancelled by caller", task_id);
                Err(PollingError::Aborted { task_id }.into())
            }
            outcome = poll => match outcome {
                Ok(polled) => polled?.into_outcome(),
                Err(_) => {
                    log::error!("Task {} still pending after {:?}", task_id, max_wait);
                    Err(PollingError::TimedOut { task_id, waited: max_wait }.into())
                }
            },
        }
    }

    async fn poll_until_terminal(
        &self,
        credentials: &ApiKey,
        mut task: VideoTask,
    ) -> Result<VideoTask> {
        let mut queries = 0u32;
        while !task.status.is_terminal() {
            tokio::time::sleep(self.polling.interval).await;
            task = self.service.retrieve_task(credentials, &task.id).await?;
            queries += 1;
            log::info!("Current status: {} (query {})", task.status.as_str(), queries);
        }
        Ok(task)
    }
}

/// Remote images are passed by URL, local ones inline as a data URI.
async fn prompt_image(image: &ArtifactHandle) -> Result<String> {
    match image.location() {
        ArtifactLocation::Remote(url) => Ok(url.clone()),
        ArtifactLocation::Local(path) => {
            let bytes = match &image.artifact().byte_content {
                Some(bytes) => bytes.clone(),
                None => tokio::fs::read(path).await.map_err(|e| {
                    SubmissionError::InvalidImage(format!("{}: {}", path.display(), e))
                })?,
            };
            if bytes.is_empty() {
                return Err(SubmissionError::InvalidImage(format!(
                    "{} is empty",
                    path.display()
                ))
                .into());
            }
            let subtype = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| match ext {
                    "jpg" => "jpeg",
                    "svg" => "svg+xml",
                    other => other,
                })
                .unwrap_or("png");
            Ok(format!(
                "data:image/{};base64,{}",
                subtype,
                STANDARD.encode(bytes)
            ))
        }
    }
}
