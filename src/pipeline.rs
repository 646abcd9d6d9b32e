//! End-to-end run: prompt, image, video submission, video polling.
//!
//! Each stage runs only after the previous one succeeded. The first failure
//! ends the run as a [`StageFailure`]; the image artifact is released on
//! every path before the run returns.

use crate::{
    artifact::{ArtifactHandle, ArtifactStore},
    bedrock::BedrockEnricher,
    cancel::CancelSignal,
    config::{ApiKey, Config, Credentials, PollingConfig, VideoServiceConfig},
    error::{PipelineError, Result},
    image::{ImageSynthesizer, StabilityClient},
    logger,
    models::{
        EnrichedPrompt, GenerationRequest, PipelineOutput, PipelineResult, PipelineState, Stage,
        StageFailure, VideoTask,
    },
    prompt::PromptTransformer,
    video::{RunwayClient, VideoOptions, VideoService, VideoTaskPoller},
};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct Pipeline {
    transformer: PromptTransformer,
    image: Arc<dyn ImageSynthesizer>,
    poller: VideoTaskPoller,
    store: ArtifactStore,
    credentials: Credentials,
    video: VideoServiceConfig,
}

impl Pipeline {
    pub fn new(
        image: Arc<dyn ImageSynthesizer>,
        video: Arc<dyn VideoService>,
        store: ArtifactStore,
        credentials: Credentials,
    ) -> Self {
        Self {
            transformer: PromptTransformer::new(),
            image,
            poller: VideoTaskPoller::new(video, PollingConfig::default()),
            store,
            credentials,
            video: VideoServiceConfig::default(),
        }
    }

    /// Wires the Stability and Runway clients, plus Bedrock enrichment when enabled.
    pub async fn from_config(config: &Config) -> Self {
        let store = ArtifactStore::new(&config.artifact_dir);
        let image = StabilityClient::new(config.image.clone(), store.clone());
        let video = RunwayClient::new(config.video.clone());

        let transformer = if config.enrichment.enabled {
            let enricher = BedrockEnricher::new(config.enrichment.clone()).await;
            PromptTransformer::with_enricher(Arc::new(enricher))
        } else {
            PromptTransformer::new()
        };

        Self::new(
            Arc::new(image),
            Arc::new(video),
            store,
            config.credentials.clone(),
        )
        .with_transformer(transformer)
        .with_polling(config.polling)
        .with_video_config(config.video.clone())
    }

    pub fn with_transformer(mut self, transformer: PromptTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.poller = self.poller.with_polling(polling);
        self
    }

    pub fn with_video_config(mut self, video: VideoServiceConfig) -> Self {
        self.video = video;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn transformer(&self) -> &PromptTransformer {
        &self.transformer
    }

    /// Validates `base_prompt` and runs the pipeline.
    pub async fn generate(&self, base_prompt: &str) -> PipelineResult {
        let request = GenerationRequest::new(base_prompt)
            .map_err(|e| StageFailure::new(Stage::Prompt, e))?;
        self.run(request).await
    }

    pub async fn run(&self, request: GenerationRequest) -> PipelineResult {
        self.run_with_cancel(request, &CancelSignal::new()).await
    }

    pub async fn run_with_cancel(
        &self,
        request: GenerationRequest,
        cancel: &CancelSignal,
    ) -> PipelineResult {
        let mut run = RunTracker::new();
        log::info!("[run {}] Starting pipeline", run.id);

        let image_key = self
            .credentials
            .image_key()
            .map_err(|e| run.fail(Stage::Image, e))?;
        let video_key = self
            .credentials
            .video_key()
            .map_err(|e| run.fail(Stage::VideoSubmit, e))?;

        let prompt = run
            .cancellable(Stage::Prompt, cancel, self.transformer.prepare(&request))
            .await?;
        log::info!("[run {}] Modified prompt: {}", run.id, prompt);

        let artifact = run
            .cancellable(Stage::Image, cancel, self.image.synthesize(image_key, &prompt))
            .await?;
        let handle = self.store.acquire(artifact);
        let image_reference = handle.artifact().reference();

        let outcome = self
            .animate(&mut run, video_key, &handle, &prompt, cancel)
            .await;
        self.release(&run, &handle);
        let task = outcome?;

        let video_outputs = task.output.clone();
        let video_reference = task
            .primary_output()
            .map(String::from)
            .ok_or_else(|| {
                run.fail(
                    Stage::VideoPoll,
                    PipelineError::InconsistentSuccess {
                        task_id: task.id.clone(),
                    },
                )
            })?;

        let caption = self.transformer.caption(&request).await;
        run.finish();

        Ok(PipelineOutput {
            run_id: run.id,
            image_reference,
            video_reference,
            video_outputs,
            caption,
        })
    }

    async fn animate(
        &self,
        run: &mut RunTracker,
        key: &ApiKey,
        handle: &ArtifactHandle,
        prompt: &EnrichedPrompt,
        cancel: &CancelSignal,
    ) -> std::result::Result<VideoTask, StageFailure> {
        // A dropped submission could still create the remote task, so it is
        // never raced against `cancel`; it is only skipped once cancelled.
        if cancel.is_cancelled() {
            return Err(run.cancelled(Stage::VideoSubmit));
        }
        let options = VideoOptions::from_config(&self.video, prompt.as_str());
        let task = run
            .stage(Stage::VideoSubmit, self.poller.submit(key, handle, &options))
            .await?;
        run.stage(
            Stage::VideoPoll,
            self.poller.await_completion(key, task, cancel),
        )
        .await
    }

    fn release(&self, run: &RunTracker, handle: &ArtifactHandle) {
        match self.store.release(handle) {
            Ok(true) => log::info!(
                "[run {}] Deleted local artifact {}",
                run.id,
                handle.location()
            ),
            Ok(false) => {}
            Err(e) => log::warn!(
                "[run {}] Could not delete artifact {}: {}",
                run.id,
                handle.location(),
                e
            ),
        }
    }
}

struct RunTracker {
    id: Uuid,
    state: PipelineState,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: PipelineState::Start,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        log::debug!("[run {}] {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    fn fail(&mut self, stage: Stage, error: PipelineError) -> StageFailure {
        log::error!("[run {}] {} stage failed: {}", self.id, stage, error);
        self.advance(PipelineState::Failed);
        StageFailure::new(stage, error)
    }

    fn cancelled(&mut self, stage: Stage) -> StageFailure {
        self.fail(stage, PipelineError::Cancelled { stage })
    }

    fn finish(&mut self) {
        self.advance(PipelineState::Done);
        log::info!("[run {}] Workflow complete", self.id);
    }

    /// Runs one stage, converting errors and panics into a tagged failure.
    async fn stage<T, F>(&mut self, stage: Stage, work: F) -> std::result::Result<T, StageFailure>
    where
        F: Future<Output = Result<T>>,
    {
        let _timer = logger::timer(&format!("{} stage", stage));
        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(value)) => {
                self.advance(PipelineState::after(stage));
                Ok(value)
            }
            Ok(Err(error)) => Err(self.fail(stage, error)),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                Err(self.fail(stage, PipelineError::Internal { stage, message }))
            }
        }
    }

    /// Like [`RunTracker::stage`], but gives up as soon as `cancel` fires.
    async fn cancellable<T, F>(
        &mut self,
        stage: Stage,
        cancel: &CancelSignal,
        work: F,
    ) -> std::result::Result<T, StageFailure>
    where
        F: Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            return Err(self.cancelled(stage));
        }
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = self.stage(stage, work) => Some(outcome),
        };
        match outcome {
            Some(outcome) => outcome,
            None => Err(self.cancelled(stage)),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock::{MockEnricher, MockImageOutcome, MockImageSynthesizer, MockVideoService},
        models::TaskStatus,
    };
    use std::time::Duration;

    fn credentials() -> Credentials {
        Credentials::new()
            .with_image_key("sk-img")
            .with_video_key("rw-vid")
    }

    fn fast() -> PollingConfig {
        PollingConfig::new()
            .with_interval(Duration::from_millis(5))
            .with_max_wait(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_enriched_prompt_drives_both_services() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let image = Arc::new(MockImageSynthesizer::new(
            MockImageOutcome::Remote("https://cdn.example/a.webp".into()),
            store.clone(),
        ));
        let video = Arc::new(MockVideoService::new("t-1").then_succeed(vec!["v1".into()]));
        let pipeline = Pipeline::new(image.clone(), video.clone(), store, credentials())
            .with_polling(fast())
            .with_transformer(PromptTransformer::with_enricher(Arc::new(
                MockEnricher::replying("a crimson bicycle"),
            )));

        let output = pipeline.generate("a red bicycle").await.unwrap();

        assert_eq!(image.prompts(), vec!["a crimson bicycle".to_string()]);
        assert_eq!(video.submissions()[0].prompt_text, "a crimson bicycle");
        assert_eq!(output.caption, "a crimson bicycle");
    }

    #[tokio::test]
    async fn test_configured_video_text_overrides_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let image = Arc::new(MockImageSynthesizer::new(
            MockImageOutcome::Remote("https://cdn.example/a.webp".into()),
            store.clone(),
        ));
        let video = Arc::new(MockVideoService::new("t-1").then_succeed(vec!["v1".into()]));
        let pipeline = Pipeline::new(image, video.clone(), store, credentials())
            .with_polling(fast())
            .with_video_config(
                VideoServiceConfig::new().with_prompt_text("The bunny is eating a carrot"),
            );

        pipeline.generate("a red bicycle").await.unwrap();

        assert_eq!(
            video.submissions()[0].prompt_text,
            "The bunny is eating a carrot"
        );
    }

    #[tokio::test]
    async fn test_blank_prompt_fails_at_prompt_stage() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let image = Arc::new(MockImageSynthesizer::new(
            MockImageOutcome::NoArtifact,
            store.clone(),
        ));
        let video = Arc::new(MockVideoService::new("t-1"));
        let pipeline = Pipeline::new(image.clone(), video, store, credentials());

        let failure = pipeline.generate("   ").await.unwrap_err();

        assert_eq!(failure.stage, Stage::Prompt);
        assert!(matches!(failure.error, PipelineError::InvalidInput(_)));
        assert_eq!(image.calls(), 0);
    }

    #[tokio::test]
    async fn test_image_panic_becomes_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let image = Arc::new(MockImageSynthesizer::new(MockImageOutcome::Panic, store.clone()));
        let video = Arc::new(MockVideoService::new("t-1"));
        let pipeline = Pipeline::new(image, video.clone(), store, credentials());

        let failure = pipeline.generate("a red bicycle").await.unwrap_err();

        assert_eq!(failure.stage, Stage::Image);
        match failure.error {
            PipelineError::Internal { stage, message } => {
                assert_eq!(stage, Stage::Image);
                assert!(message.contains("image backend crashed"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(video.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_polling_releases_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let image = Arc::new(MockImageSynthesizer::new(
            MockImageOutcome::Local(b"img".to_vec()),
            store.clone(),
        ));
        let video = Arc::new(MockVideoService::new("t-1").then_status(TaskStatus::Pending));
        let pipeline = Pipeline::new(image, video, store, credentials()).with_polling(
            PollingConfig::new()
                .with_interval(Duration::from_millis(5))
                .with_max_wait(Duration::from_secs(600)),
        );

        let cancel = CancelSignal::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let request = GenerationRequest::new("a red bicycle").unwrap();
        let failure = pipeline.run_with_cancel(request, &cancel).await.unwrap_err();

        assert_eq!(failure.stage, Stage::VideoPoll);
        assert!(matches!(
            failure.error,
            PipelineError::Polling(crate::error::PollingError::Aborted { .. })
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_never_reaches_services() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let image = Arc::new(MockImageSynthesizer::new(
            MockImageOutcome::Remote("https://cdn.example/a.webp".into()),
            store.clone(),
        ));
        let video = Arc::new(MockVideoService::new("t-1").then_status(TaskStatus::Pending));
        let pipeline =
            Pipeline::new(image.clone(), video.clone(), store, credentials()).with_polling(fast());

        let cancel = CancelSignal::new();
        cancel.cancel();
        let request = GenerationRequest::new("a red bicycle").unwrap();
        let failure = pipeline.run_with_cancel(request, &cancel).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Prompt);
        assert_eq!(failure.error.kind(), "cancelled");
        assert_eq!(image.calls(), 0);
        assert_eq!(video.submissions().len(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_image_skips_submission() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let image = Arc::new(MockImageSynthesizer::new(MockImageOutcome::Hang, store.clone()));
        let video = Arc::new(MockVideoService::new("t-1").then_succeed(vec!["v1".into()]));
        let pipeline =
            Pipeline::new(image.clone(), video.clone(), store, credentials()).with_polling(fast());

        let cancel = CancelSignal::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let request = GenerationRequest::new("a red bicycle").unwrap();
        let failure = tokio::time::timeout(
            Duration::from_secs(2),
            pipeline.run_with_cancel(request, &cancel),
        )
        .await
        .expect("cancel should interrupt the image stage")
        .unwrap_err();

        assert_eq!(failure.stage, Stage::Image);
        assert!(matches!(
            failure.error,
            PipelineError::Cancelled {
                stage: Stage::Image
            }
        ));
        assert_eq!(image.calls(), 1);
        assert!(video.submissions().is_empty());
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
