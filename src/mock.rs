//! Scripted stand-ins for the external services.
//!
//! Every mock records the calls it receives so tests can assert ordering and
//! call counts without touching the network.

use crate::{
    artifact::ArtifactStore,
    config::ApiKey,
    error::{ImageSynthesisError, PipelineError, PollingError, Result, SubmissionError},
    image::ImageSynthesizer,
    models::{EnrichedPrompt, ImageArtifact, TaskStatus, VideoTask, VideoTaskRequest},
    prompt::PromptEnricher,
    video::VideoService,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// What the mock image service does on each call.
#[derive(Debug, Clone)]
pub enum MockImageOutcome {
    /// Write these bytes through the artifact store.
    Local(Vec<u8>),
    Remote(String),
    Status(u16, String),
    NoArtifact,
    Panic,
    /// Never answers.
    Hang,
}

pub struct MockImageSynthesizer {
    outcome: MockImageOutcome,
    store: ArtifactStore,
    prompts: Mutex<Vec<String>>,
}

impl MockImageSynthesizer {
    pub fn new(outcome: MockImageOutcome, store: ArtifactStore) -> Self {
        Self {
            outcome,
            store,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImageSynthesizer for MockImageSynthesizer {
    async fn synthesize(
        &self,
        _credentials: &ApiKey,
        prompt: &EnrichedPrompt,
    ) -> Result<ImageArtifact> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.as_str().to_string());
        }

        match &self.outcome {
            MockImageOutcome::Local(bytes) => self.store.materialize(bytes.clone(), "webp").await,
            MockImageOutcome::Remote(url) => Ok(ImageArtifact::remote(url.clone())),
            MockImageOutcome::Status(status, detail) => Err(ImageSynthesisError::Status {
                status: *status,
                detail: detail.clone(),
            }
            .into()),
            MockImageOutcome::NoArtifact => Err(ImageSynthesisError::NoArtifact.into()),
            MockImageOutcome::Panic => panic!("image backend crashed"),
            MockImageOutcome::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug, Clone)]
enum ScriptStep {
    Status(TaskStatus),
    Succeed(Vec<String>),
    Fail(String),
    QueryError(u16, String),
}

/// Video service that answers status queries from a script, then stays pending.
pub struct MockVideoService {
    task_id: String,
    rejection: Option<(u16, String)>,
    script: Mutex<VecDeque<ScriptStep>>,
    submissions: Mutex<Vec<VideoTaskRequest>>,
    queries: AtomicUsize,
}

impl MockVideoService {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            rejection: None,
            script: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(Vec::new()),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn reject_submission(mut self, status: u16, detail: impl Into<String>) -> Self {
        self.rejection = Some((status, detail.into()));
        self
    }

    pub fn then_status(self, status: TaskStatus) -> Self {
        self.push(ScriptStep::Status(status))
    }

    pub fn then_succeed(self, output: Vec<String>) -> Self {
        self.push(ScriptStep::Succeed(output))
    }

    pub fn then_fail(self, reason: impl Into<String>) -> Self {
        self.push(ScriptStep::Fail(reason.into()))
    }

    pub fn then_query_error(self, status: u16, detail: impl Into<String>) -> Self {
        self.push(ScriptStep::QueryError(status, detail.into()))
    }

    fn push(mut self, step: ScriptStep) -> Self {
        if let Ok(script) = self.script.get_mut() {
            script.push_back(step);
        }
        self
    }

    pub fn submissions(&self) -> Vec<VideoTaskRequest> {
        self.submissions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn status_queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoService for MockVideoService {
    async fn create_task(
        &self,
        _credentials: &ApiKey,
        request: &VideoTaskRequest,
    ) -> Result<VideoTask> {
        if let Ok(mut submissions) = self.submissions.lock() {
            submissions.push(request.clone());
        }
        match &self.rejection {
            Some((status, detail)) => Err(SubmissionError::Status {
                status: *status,
                detail: detail.clone(),
            }
            .into()),
            None => Ok(VideoTask::pending(self.task_id.clone())),
        }
    }

    async fn retrieve_task(&self, _credentials: &ApiKey, task_id: &str) -> Result<VideoTask> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().ok().and_then(|mut s| s.pop_front());

        let mut task = VideoTask::pending(task_id);
        match step {
            None => {}
            Some(ScriptStep::Status(status)) => task.status = status,
            Some(ScriptStep::Succeed(output)) => {
                task.status = TaskStatus::Succeeded;
                task.output = output;
            }
            Some(ScriptStep::Fail(reason)) => {
                task.status = TaskStatus::Failed;
                task.failure_reason = Some(reason);
            }
            Some(ScriptStep::QueryError(status, detail)) => {
                return Err(PollingError::Status { status, detail }.into())
            }
        }
        Ok(task)
    }
}

/// Text backend returning a fixed reply, or failing every call.
pub struct MockEnricher {
    reply: Option<String>,
    instructions: Mutex<Vec<String>>,
}

impl MockEnricher {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            instructions: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            instructions: Mutex::new(Vec::new()),
        }
    }

    pub fn instructions(&self) -> Vec<String> {
        self.instructions
            .lock()
            .map(|i| i.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PromptEnricher for MockEnricher {
    async fn complete(&self, instruction: &str) -> Result<String> {
        if let Ok(mut instructions) = self.instructions.lock() {
            instructions.push(instruction.to_string());
        }
        self.reply
            .clone()
            .ok_or_else(|| PipelineError::Enrichment("model unavailable".into()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
