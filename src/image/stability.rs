use crate::{
    artifact::ArtifactStore,
    config::{ApiKey, ImageServiceConfig},
    error::{ImageSynthesisError, Result},
    image::ImageSynthesizer,
    models::{EnrichedPrompt, ImageArtifact, StabilityErrorBody, StabilityImageResponse},
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header, multipart::Form, Client};

#[derive(Clone)]
pub struct StabilityClient {
    client: Client,
    config: ImageServiceConfig,
    store: ArtifactStore,
}

impl StabilityClient {
    pub fn new(config: ImageServiceConfig, store: ArtifactStore) -> Self {
        Self::with_client(Client::new(), config, store)
    }

    pub fn with_client(client: Client, config: ImageServiceConfig, store: ArtifactStore) -> Self {
        Self {
            client,
            config,
            store,
        }
    }

    fn error_detail(body: String) -> String {
        match serde_json::from_str::<StabilityErrorBody>(&body) {
            Ok(parsed) if parsed.name.is_some() || !parsed.errors.is_empty() => parsed.summary(),
            _ => body,
        }
    }
}

#[async_trait]
impl ImageSynthesizer for StabilityClient {
    async fn synthesize(
        &self,
        credentials: &ApiKey,
        prompt: &EnrichedPrompt,
    ) -> Result<ImageArtifact> {
        let form = Form::new()
            .text("prompt", prompt.as_str().to_string())
            .text("output_format", self.config.output_format.clone());

        log::info!("Generating image via {}", self.config.endpoint);
        log::debug!("Image prompt: {}", prompt);

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(credentials.expose())
            .header(header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| ImageSynthesisError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = Self::error_detail(body);
            log::error!("Failed to generate image: {} {}", status.as_u16(), detail);
            return Err(ImageSynthesisError::Status {
                status: status.as_u16(),
                detail,
            }
            .into());
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageSynthesisError::Transport(e.to_string()))?;

        if bytes.is_empty() {
            return Err(ImageSynthesisError::NoArtifact.into());
        }

        if let Some(subtype) = content_type.strip_prefix("image/") {
            let extension = file_extension(subtype, &self.config.output_format);
            return self.store.materialize(bytes.to_vec(), extension).await;
        }

        let body: StabilityImageResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ImageSynthesisError::Malformed(e.to_string()))?;

        if body.finish_reason.as_deref() == Some("CONTENT_FILTERED") {
            return Err(ImageSynthesisError::ContentFiltered.into());
        }

        if let Some(url) = body.url.filter(|u| !u.trim().is_empty()) {
            log::info!("Image generated and available at {}", url);
            return Ok(ImageArtifact::remote(url));
        }

        match body.image.filter(|i| !i.trim().is_empty()) {
            Some(encoded) => {
                let decoded = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| ImageSynthesisError::Malformed(format!("image payload: {}", e)))?;
                if let Some(seed) = body.seed {
                    log::debug!("Image seed: {}", seed);
                }
                self.store
                    .materialize(decoded, &self.config.output_format)
                    .await
            }
            None => Err(ImageSynthesisError::NoArtifact.into()),
        }
    }
}

/// Maps an `image/*` subtype to a file extension, falling back to the
/// requested output format for anything that is not a plain token.
fn file_extension<'a>(subtype: &'a str, fallback: &'a str) -> &'a str {
    let subtype = subtype.split(';').next().unwrap_or_default().trim();
    match subtype {
        "jpeg" | "pjpeg" => "jpg",
        "svg+xml" => "svg",
        "" => fallback,
        other if other.chars().all(|c| c.is_ascii_alphanumeric()) => other,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::PipelineError, models::ArtifactLocation, prompt::transform};
    use serde_json::json;
    use wiremock::matchers::{header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ENDPOINT: &str = "/v2beta/stable-image/generate/ultra";

    fn client_for(server: &MockServer, dir: &std::path::Path) -> StabilityClient {
        StabilityClient::new(
            ImageServiceConfig::new().with_endpoint(format!("{}{}", server.uri(), ENDPOINT)),
            ArtifactStore::new(dir),
        )
    }

    fn key() -> ApiKey {
        ApiKey::new("sk-test").unwrap()
    }

    #[tokio::test]
    async fn test_base64_image_is_materialized_locally() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .and(header_eq("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "image": STANDARD.encode(b"fake-webp"),
                "finish_reason": "SUCCESS",
                "seed": 42
            })))
            .expect(1)
            .mount(&server)
            .await;

        let artifact = client_for(&server, dir.path())
            .synthesize(&key(), &transform("a red bicycle").unwrap())
            .await
            .unwrap();

        let path = artifact.location.local_path().expect("local artifact");
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(path).unwrap(), b"fake-webp");
    }

    #[tokio::test]
    async fn test_hosted_url_stays_remote() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "url": "https://cdn.example/img.webp" })),
            )
            .mount(&server)
            .await;

        let artifact = client_for(&server, dir.path())
            .synthesize(&key(), &transform("a red bicycle").unwrap())
            .await
            .unwrap();

        assert_eq!(
            artifact.location,
            ArtifactLocation::Remote("https://cdn.example/img.webp".into())
        );
    }

    #[tokio::test]
    async fn test_raw_image_body_is_materialized() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"raw-png".to_vec(), "image/png"),
            )
            .mount(&server)
            .await;

        let artifact = client_for(&server, dir.path())
            .synthesize(&key(), &transform("a red bicycle").unwrap())
            .await
            .unwrap();

        let path = artifact.location.local_path().unwrap();
        assert_eq!(path.extension().unwrap(), "png");
    }

    #[tokio::test]
    async fn test_jpeg_body_gets_jpg_extension() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"raw-jpeg".to_vec(), "image/jpeg"),
            )
            .mount(&server)
            .await;

        let artifact = client_for(&server, dir.path())
            .synthesize(&key(), &transform("a red bicycle").unwrap())
            .await
            .unwrap();

        let path = artifact.location.local_path().unwrap();
        assert_eq!(path.extension().unwrap(), "jpg");
    }

    #[test]
    fn test_file_extension_mapping() {
        assert_eq!(file_extension("png", "webp"), "png");
        assert_eq!(file_extension("jpeg; charset=binary", "webp"), "jpg");
        assert_eq!(file_extension("svg+xml", "webp"), "svg");
        assert_eq!(file_extension("x-icon+foo", "webp"), "webp");
        assert_eq!(file_extension("", "webp"), "webp");
    }

    #[tokio::test]
    async fn test_error_status_carries_service_body() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "id": "abc",
                "name": "payment_required",
                "errors": ["insufficient credits"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server, dir.path())
            .synthesize(&key(), &transform("a red bicycle").unwrap())
            .await
            .unwrap_err();

        match err {
            PipelineError::ImageSynthesis(ImageSynthesisError::Status { status, detail }) => {
                assert_eq!(status, 402);
                assert_eq!(detail, "payment_required: insufficient credits");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success_without_artifact_is_reported() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "seed": 1 })))
            .mount(&server)
            .await;

        let err = client_for(&server, dir.path())
            .synthesize(&key(), &transform("a red bicycle").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::ImageSynthesis(ImageSynthesisError::NoArtifact)
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_content_filtered_is_reported() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "image": STANDARD.encode(b"blurred"),
                "finish_reason": "CONTENT_FILTERED"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, dir.path())
            .synthesize(&key(), &transform("a red bicycle").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::ImageSynthesis(ImageSynthesisError::ContentFiltered)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = StabilityClient::new(
            ImageServiceConfig::new().with_endpoint("http://127.0.0.1:9/unreachable"),
            ArtifactStore::new(dir.path()),
        );

        let err = client
            .synthesize(&key(), &transform("a red bicycle").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::ImageSynthesis(ImageSynthesisError::Transport(_))
        ));
    }
}
