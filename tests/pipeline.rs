use genreel::{
    config::{ImageServiceConfig, VideoServiceConfig},
    mock::{MockEnricher, MockImageOutcome, MockImageSynthesizer, MockVideoService},
    ArtifactStore, Credentials, ImageSynthesisError, Pipeline, PipelineError, PollingConfig,
    PollingError, PromptTransformer, RunwayClient, Stage, StabilityClient, SubmissionError,
    TaskStatus,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials() -> Credentials {
    Credentials::new()
        .with_image_key("sk-img")
        .with_video_key("rw-vid")
}

fn fast_polling() -> PollingConfig {
    PollingConfig::new()
        .with_interval(Duration::from_millis(5))
        .with_max_wait(Duration::from_secs(5))
}

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

struct Harness {
    pipeline: Pipeline,
    image: Arc<MockImageSynthesizer>,
    video: Arc<MockVideoService>,
    dir: tempfile::TempDir,
}

fn harness(
    outcome: MockImageOutcome,
    video: MockVideoService,
    credentials: Credentials,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let image = Arc::new(MockImageSynthesizer::new(outcome, store.clone()));
    let video = Arc::new(video);
    let pipeline = Pipeline::new(image.clone(), video.clone(), store, credentials)
        .with_polling(fast_polling());
    Harness {
        pipeline,
        image,
        video,
        dir,
    }
}

#[tokio::test]
async fn test_local_image_animated_and_cleaned_up() {
    let h = harness(
        MockImageOutcome::Local(b"webp-bytes".to_vec()),
        MockVideoService::new("T")
            .then_status(TaskStatus::Pending)
            .then_status(TaskStatus::Pending)
            .then_succeed(vec!["v1".into()]),
        credentials(),
    );

    let output = h.pipeline.generate("a red bicycle").await.unwrap();

    assert_eq!(output.video_reference, "v1");
    assert_eq!(output.video_outputs, vec!["v1".to_string()]);
    assert!(output
        .image_reference
        .starts_with(&h.dir.path().display().to_string()));
    assert!(!Path::new(&output.image_reference).exists());
    assert_eq!(files_in(h.dir.path()), 0);

    assert_eq!(h.image.calls(), 1);
    assert_eq!(h.video.submissions().len(), 1);
    assert_eq!(h.video.status_queries(), 3);
    assert!(h.video.submissions()[0]
        .prompt_image
        .starts_with("data:image/webp;base64,"));
    assert_eq!(
        output.caption,
        "Check out this amazing image and video based on: 'a red bicycle'!"
    );
}

#[tokio::test]
async fn test_image_failure_skips_video() {
    let h = harness(
        MockImageOutcome::Status(500, "server error".into()),
        MockVideoService::new("T"),
        credentials(),
    );

    let failure = h.pipeline.generate("a red bicycle").await.unwrap_err();

    assert_eq!(failure.stage, Stage::Image);
    assert!(matches!(
        failure.error,
        PipelineError::ImageSynthesis(ImageSynthesisError::Status { status: 500, .. })
    ));
    assert!(h.video.submissions().is_empty());
    assert_eq!(files_in(h.dir.path()), 0);
}

#[tokio::test]
async fn test_failed_task_reports_reason_and_releases_image() {
    let h = harness(
        MockImageOutcome::Local(b"webp-bytes".to_vec()),
        MockVideoService::new("T").then_fail("model overloaded"),
        credentials(),
    );

    let failure = h.pipeline.generate("a red bicycle").await.unwrap_err();

    assert_eq!(failure.stage, Stage::VideoPoll);
    match &failure.error {
        PipelineError::Polling(PollingError::Failed { task_id, reason }) => {
            assert_eq!(task_id, "T");
            assert_eq!(reason.as_deref(), Some("model overloaded"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(failure.to_string().contains("model overloaded"));
    assert_eq!(files_in(h.dir.path()), 0);
}

#[tokio::test]
async fn test_missing_video_key_fails_before_image_call() {
    let h = harness(
        MockImageOutcome::Remote("https://cdn.example/a.webp".into()),
        MockVideoService::new("T"),
        Credentials::new().with_image_key("sk-img"),
    );

    let failure = h.pipeline.generate("a red bicycle").await.unwrap_err();

    assert_eq!(failure.stage, Stage::VideoSubmit);
    assert!(matches!(
        failure.error,
        PipelineError::MissingCredential("RUNWAY_API_KEY")
    ));
    assert_eq!(h.image.calls(), 0);
    assert!(h.video.submissions().is_empty());
}

#[tokio::test]
async fn test_missing_image_key_tagged_image() {
    let h = harness(
        MockImageOutcome::Remote("https://cdn.example/a.webp".into()),
        MockVideoService::new("T"),
        Credentials::new().with_video_key("rw-vid"),
    );

    let failure = h.pipeline.generate("a red bicycle").await.unwrap_err();

    assert_eq!(failure.stage, Stage::Image);
    assert_eq!(failure.error.kind(), "missing_credential");
    assert_eq!(h.image.calls(), 0);
}

#[tokio::test]
async fn test_zero_artifacts_is_image_failure() {
    let h = harness(
        MockImageOutcome::NoArtifact,
        MockVideoService::new("T"),
        credentials(),
    );

    let failure = h.pipeline.generate("a red bicycle").await.unwrap_err();

    assert_eq!(failure.stage, Stage::Image);
    assert!(matches!(
        failure.error,
        PipelineError::ImageSynthesis(ImageSynthesisError::NoArtifact)
    ));
    assert!(h.video.submissions().is_empty());
}

#[tokio::test]
async fn test_rejected_submission_releases_image() {
    let h = harness(
        MockImageOutcome::Local(b"webp-bytes".to_vec()),
        MockVideoService::new("T").reject_submission(400, "promptImage is invalid"),
        credentials(),
    );

    let failure = h.pipeline.generate("a red bicycle").await.unwrap_err();

    assert_eq!(failure.stage, Stage::VideoSubmit);
    assert!(matches!(
        failure.error,
        PipelineError::Submission(SubmissionError::Status { status: 400, .. })
    ));
    assert_eq!(h.video.submissions().len(), 1);
    assert_eq!(h.video.status_queries(), 0);
    assert_eq!(files_in(h.dir.path()), 0);
}

#[tokio::test]
async fn test_polling_timeout_is_tagged_video_poll() {
    let h = harness(
        MockImageOutcome::Remote("https://cdn.example/a.webp".into()),
        MockVideoService::new("T"),
        credentials(),
    );
    let pipeline = h.pipeline.clone().with_polling(
        PollingConfig::new()
            .with_interval(Duration::from_millis(5))
            .with_max_wait(Duration::from_millis(60)),
    );

    let failure = pipeline.generate("a red bicycle").await.unwrap_err();

    assert_eq!(failure.stage, Stage::VideoPoll);
    assert_eq!(failure.error.kind(), "polling_timeout");
}

#[tokio::test]
async fn test_succeeded_without_outputs_is_inconsistent() {
    let h = harness(
        MockImageOutcome::Remote("https://cdn.example/a.webp".into()),
        MockVideoService::new("T").then_succeed(Vec::new()),
        credentials(),
    );

    let failure = h.pipeline.generate("a red bicycle").await.unwrap_err();

    assert_eq!(failure.stage, Stage::VideoPoll);
    assert!(matches!(
        failure.error,
        PipelineError::InconsistentSuccess { .. }
    ));
}

#[tokio::test]
async fn test_enrichment_failure_falls_back_to_rule() {
    let h = harness(
        MockImageOutcome::Remote("https://cdn.example/a.webp".into()),
        MockVideoService::new("T").then_succeed(vec!["v1".into()]),
        credentials(),
    );
    let pipeline = h
        .pipeline
        .clone()
        .with_transformer(PromptTransformer::with_enricher(Arc::new(
            MockEnricher::failing(),
        )));

    let output = pipeline.generate("a red bicycle").await.unwrap();

    assert_eq!(output.image_reference, "https://cdn.example/a.webp");
    assert_eq!(
        h.image.prompts(),
        vec!["a red bicycle, detailed, vibrant, high resolution".to_string()]
    );
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let image = Arc::new(MockImageSynthesizer::new(
        MockImageOutcome::Local(b"webp-bytes".to_vec()),
        store.clone(),
    ));

    let first = Pipeline::new(
        image.clone(),
        Arc::new(MockVideoService::new("A").then_succeed(vec!["video-a".into()])),
        store.clone(),
        credentials(),
    )
    .with_polling(fast_polling());
    let second = Pipeline::new(
        image.clone(),
        Arc::new(MockVideoService::new("B").then_fail("quota exceeded")),
        store,
        credentials(),
    )
    .with_polling(fast_polling());

    let (a, b) = tokio::join!(
        first.generate("a red bicycle"),
        second.generate("a blue boat")
    );

    let a = a.unwrap();
    assert_eq!(a.video_reference, "video-a");
    let b = b.unwrap_err();
    assert_eq!(b.stage, Stage::VideoPoll);
    assert_eq!(image.calls(), 2);
    assert_eq!(files_in(dir.path()), 0);
}

#[tokio::test]
async fn test_real_clients_against_stubbed_services() {
    let stability = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2beta/stable-image/generate/ultra"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "url": "https://cdn.example/a.webp" })),
        )
        .expect(1)
        .mount(&stability)
        .await;

    let runway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/image_to_video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "task-1" })))
        .expect(1)
        .mount(&runway)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/task-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "task-1", "status": "RUNNING" })),
        )
        .up_to_n_times(1)
        .mount(&runway)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/task-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "task-1",
            "status": "SUCCEEDED",
            "output": ["https://cdn.example/v.mp4"]
        })))
        .mount(&runway)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let image = StabilityClient::new(
        ImageServiceConfig::new().with_endpoint(format!(
            "{}/v2beta/stable-image/generate/ultra",
            stability.uri()
        )),
        store.clone(),
    );
    let video_config = VideoServiceConfig::new().with_base_url(runway.uri());
    let pipeline = Pipeline::new(
        Arc::new(image),
        Arc::new(RunwayClient::new(video_config.clone())),
        store,
        credentials(),
    )
    .with_polling(fast_polling())
    .with_video_config(video_config);

    let output = pipeline.generate("a red bicycle").await.unwrap();

    assert_eq!(output.image_reference, "https://cdn.example/a.webp");
    assert_eq!(output.video_reference, "https://cdn.example/v.mp4");
    assert_eq!(files_in(pipeline.store().root()), 0);
}

#[tokio::test]
async fn test_dropped_run_still_deletes_local_image() {
    let h = harness(
        MockImageOutcome::Local(b"webp-bytes".to_vec()),
        MockVideoService::new("T"),
        credentials(),
    );
    let pipeline = h.pipeline.clone().with_polling(
        PollingConfig::new()
            .with_interval(Duration::from_millis(5))
            .with_max_wait(Duration::from_secs(600)),
    );

    let outcome =
        tokio::time::timeout(Duration::from_millis(100), pipeline.generate("a red bicycle")).await;

    assert!(outcome.is_err(), "video task never settles");
    assert_eq!(h.video.submissions().len(), 1);
    assert!(h.video.status_queries() > 0);
    assert_eq!(files_in(h.dir.path()), 0);
}
