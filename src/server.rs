//! HTTP front end for the pipeline.

use crate::{
    bedrock::BedrockEnricher,
    config::{Config, EnrichmentConfig},
    error::{PipelineError, PollingError},
    models::{Stage, StageFailure},
    pipeline::Pipeline,
    prompt::{PromptEnricher, PromptTransformer},
};
use actix_web::{
    get,
    http::StatusCode,
    post,
    web::{self, Data, Json},
    App, HttpResponse, HttpServer, ResponseError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;

const DEFAULT_PORT: u16 = 8080;

#[derive(Clone)]
pub struct AppState {
    pipeline: Pipeline,
    enricher: Arc<OnceCell<Arc<dyn PromptEnricher>>>,
    /// Backend settings for building an enricher on the first opt-in request.
    lazy_enrichment: Option<EnrichmentConfig>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, enricher: Option<Arc<dyn PromptEnricher>>) -> Self {
        Self {
            pipeline,
            enricher: Arc::new(OnceCell::new_with(enricher)),
            lazy_enrichment: None,
        }
    }

    /// Reuses the pipeline's own enricher when it has one.
    pub fn from_pipeline(pipeline: Pipeline) -> Self {
        let enricher = pipeline.transformer().enricher();
        Self::new(pipeline, enricher)
    }

    pub fn with_lazy_enrichment(mut self, config: EnrichmentConfig) -> Self {
        self.lazy_enrichment = Some(config);
        self
    }

    async fn enricher(&self) -> Option<Arc<dyn PromptEnricher>> {
        if let Some(enricher) = self.enricher.get() {
            return Some(enricher.clone());
        }
        let config = self.lazy_enrichment.as_ref()?;
        let enricher = self
            .enricher
            .get_or_init(|| async {
                log::info!("Building enrichment backend {}", config.model_id);
                Arc::new(BedrockEnricher::new(config.clone()).await) as Arc<dyn PromptEnricher>
            })
            .await;
        Some(enricher.clone())
    }

    /// Per-request enrichment override; `None` keeps the configured behaviour.
    async fn pipeline_for(&self, use_enrichment: Option<bool>) -> Pipeline {
        match use_enrichment {
            None => self.pipeline.clone(),
            Some(false) => self
                .pipeline
                .clone()
                .with_transformer(PromptTransformer::new()),
            Some(true) => match self.enricher().await {
                Some(enricher) => self
                    .pipeline
                    .clone()
                    .with_transformer(PromptTransformer::with_enricher(enricher)),
                None => {
                    log::warn!("Enrichment requested but no backend is available");
                    self.pipeline.clone()
                }
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub base_prompt: String,
    #[serde(default)]
    pub use_enrichment: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateReply {
    pub image_url: String,
    pub video_url: String,
    pub caption: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
    pub stage: Stage,
    pub kind: String,
}

impl ResponseError for StageFailure {
    fn status_code(&self) -> StatusCode {
        match &self.error {
            PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PipelineError::Polling(PollingError::TimedOut { .. }) => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::ImageSynthesis(_)
            | PipelineError::Submission(_)
            | PipelineError::Polling(_)
            | PipelineError::InconsistentSuccess { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::MissingCredential(_)
            | PipelineError::Config(_)
            | PipelineError::Internal { .. }
            | PipelineError::Enrichment(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorReply {
            error: self.error.to_string(),
            stage: self.stage,
            kind: self.error.kind().to_string(),
        })
    }
}

#[post("/api/generate")]
async fn generate(
    state: Data<AppState>,
    body: Json<GenerateBody>,
) -> Result<Json<GenerateReply>, StageFailure> {
    let body = body.into_inner();
    let pipeline = state.pipeline_for(body.use_enrichment).await;

    let output = pipeline.generate(&body.base_prompt).await?;
    log::info!("[run {}] Served generation request", output.run_id);

    Ok(Json(GenerateReply {
        image_url: output.image_reference,
        video_url: output.video_reference,
        caption: output.caption,
    }))
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(generate).service(health);
}

/// Serves on `PORT` (default 8080) until interrupted.
pub async fn run(config: Config) -> std::io::Result<()> {
    let pipeline = Pipeline::from_config(&config).await;
    let state = Data::new(
        AppState::from_pipeline(pipeline).with_lazy_enrichment(config.enrichment.clone()),
    );

    let port = config.port.unwrap_or(DEFAULT_PORT);
    log::info!("🌐 Server will run on http://0.0.0.0:{}", port);

    HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind(("0.0.0.0", port))?
        .run()
        .await
}
