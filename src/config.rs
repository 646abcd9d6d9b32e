use crate::{
    error::{PipelineError, Result},
    models::VideoDuration,
};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_STABILITY_URL: &str =
    "https://api.stability.ai/v2beta/stable-image/generate/ultra";
pub const DEFAULT_RUNWAY_URL: &str = "https://api.dev.runwayml.com";
pub const DEFAULT_RUNWAY_VERSION: &str = "2024-11-06";
pub const DEFAULT_VIDEO_MODEL: &str = "gen3a_turbo";
pub const DEFAULT_ENRICHMENT_MODEL: &str = "meta.llama3-8b-instruct-v1:0";

/// Opaque service credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for blank input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub image: Option<ApiKey>,
    pub video: Option<ApiKey>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image_key(mut self, key: impl Into<String>) -> Self {
        self.image = ApiKey::new(key);
        self
    }

    pub fn with_video_key(mut self, key: impl Into<String>) -> Self {
        self.video = ApiKey::new(key);
        self
    }

    pub fn image_key(&self) -> Result<&ApiKey> {
        self.image
            .as_ref()
            .ok_or(PipelineError::MissingCredential("STABILITY_API_KEY"))
    }

    pub fn video_key(&self) -> Result<&ApiKey> {
        self.video
            .as_ref()
            .ok_or(PipelineError::MissingCredential("RUNWAY_API_KEY"))
    }
}

#[derive(Debug, Clone)]
pub struct ImageServiceConfig {
    pub endpoint: String,
    pub output_format: String,
}

impl Default for ImageServiceConfig {
    fn default() -> Self {
        ImageServiceConfig {
            endpoint: DEFAULT_STABILITY_URL.to_string(),
            output_format: "webp".to_string(),
        }
    }
}

impl ImageServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct VideoServiceConfig {
    pub base_url: String,
    pub api_version: String,
    pub model: String,
    pub duration: VideoDuration,
    /// Driving text for the video. The enriched prompt is used when unset.
    pub prompt_text: Option<String>,
    pub ratio: Option<String>,
}

impl Default for VideoServiceConfig {
    fn default() -> Self {
        VideoServiceConfig {
            base_url: DEFAULT_RUNWAY_URL.to_string(),
            api_version: DEFAULT_RUNWAY_VERSION.to_string(),
            model: DEFAULT_VIDEO_MODEL.to_string(),
            duration: VideoDuration::Five,
            prompt_text: None,
            ratio: None,
        }
    }
}

impl VideoServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_duration(mut self, duration: VideoDuration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_prompt_text(mut self, text: impl Into<String>) -> Self {
        self.prompt_text = Some(text.into());
        self
    }

    pub fn with_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.ratio = Some(ratio.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        PollingConfig {
            interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(600),
        }
    }
}

impl PollingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub model_id: String,
    pub region: Option<String>,
    pub max_tokens: i32,
    pub temperature: f32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        EnrichmentConfig {
            enabled: false,
            model_id: DEFAULT_ENRICHMENT_MODEL.to_string(),
            region: None,
            max_tokens: 64,
            temperature: 0.7,
        }
    }
}

impl EnrichmentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: Option<u16>,
    pub credentials: Credentials,
    pub image: ImageServiceConfig,
    pub video: VideoServiceConfig,
    pub polling: PollingConfig,
    pub enrichment: EnrichmentConfig,
    pub artifact_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: None,
            credentials: Credentials::default(),
            image: ImageServiceConfig::default(),
            video: VideoServiceConfig::default(),
            polling: PollingConfig::default(),
            enrichment: EnrichmentConfig::default(),
            artifact_dir: env::temp_dir().join("genreel"),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map_or(false, |val| val == "true");
        let mut config = Config::default();

        config.port = parse_opt(&lookup, "PORT")?;
        config.credentials = Credentials {
            image: lookup("STABILITY_API_KEY").and_then(ApiKey::new),
            video: lookup("RUNWAY_API_KEY").and_then(ApiKey::new),
        };

        if let Some(url) = lookup("STABILITY_API_URL") {
            config.image.endpoint = url;
        }
        if let Some(format) = lookup("IMAGE_OUTPUT_FORMAT") {
            config.image.output_format = format;
        }

        if let Some(url) = lookup("RUNWAY_API_URL") {
            config.video.base_url = url;
        }
        if let Some(version) = lookup("RUNWAY_API_VERSION") {
            config.video.api_version = version;
        }
        if let Some(model) = lookup("VIDEO_MODEL") {
            config.video.model = model;
        }
        if let Some(seconds) = parse_opt::<u8, _>(&lookup, "VIDEO_DURATION")? {
            config.video.duration =
                VideoDuration::try_from(seconds).map_err(PipelineError::Config)?;
        }
        config.video.prompt_text = lookup("VIDEO_PROMPT_TEXT").filter(|t| !t.trim().is_empty());
        config.video.ratio = lookup("VIDEO_RATIO");

        if let Some(secs) = parse_opt::<u64, _>(&lookup, "POLL_INTERVAL_SECS")? {
            config.polling.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_opt::<u64, _>(&lookup, "POLL_TIMEOUT_SECS")? {
            config.polling.max_wait = Duration::from_secs(secs);
        }

        config.enrichment.enabled = flag("USE_ENRICHMENT");
        if let Some(model) = lookup("ENRICHMENT_MODEL_ID") {
            config.enrichment.model_id = model;
        }
        config.enrichment.region = lookup("AWS_REGION").or_else(|| lookup("AWS_DEFAULT_REGION"));

        if let Some(dir) = lookup("ARTIFACT_DIR") {
            config.artifact_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_image(mut self, config: ImageServiceConfig) -> Self {
        self.image = config;
        self
    }

    pub fn with_video(mut self, config: VideoServiceConfig) -> Self {
        self.video = config;
        self
    }

    pub fn with_polling(mut self, config: PollingConfig) -> Self {
        self.polling = config;
        self
    }

    pub fn with_enrichment(mut self, config: EnrichmentConfig) -> Self {
        self.enrichment = config;
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }
}

fn parse_opt<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| PipelineError::Config(format!("{}: {}", key, e))),
    }
}
