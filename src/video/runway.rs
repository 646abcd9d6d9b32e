use crate::{
    config::{ApiKey, VideoServiceConfig},
    error::{PollingError, Result, SubmissionError},
    models::{TaskCreatedResponse, VideoTask, VideoTaskRequest},
    video::VideoService,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

const VERSION_HEADER: &str = "X-Runway-Version";

#[derive(Clone)]
pub struct RunwayClient {
    client: Client,
    config: VideoServiceConfig,
}

impl RunwayClient {
    pub fn new(config: VideoServiceConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: VideoServiceConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, builder: RequestBuilder, credentials: &ApiKey) -> RequestBuilder {
        builder
            .bearer_auth(credentials.expose())
            .header(VERSION_HEADER, &self.config.api_version)
    }

    /// Runway reports errors as `{"error": "..."}`; anything else is kept raw.
    fn error_detail(body: String) -> String {
        serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from))
            .unwrap_or(body)
    }
}

#[async_trait]
impl VideoService for RunwayClient {
    async fn create_task(
        &self,
        credentials: &ApiKey,
        request: &VideoTaskRequest,
    ) -> Result<VideoTask> {
        let response = self
            .authorize(self.client.post(self.url("/v1/image_to_video")), credentials)
            .json(request)
            .send()
            .await
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = Self::error_detail(response.text().await.unwrap_or_default());
            log::error!("Error creating task: {} {}", status.as_u16(), detail);
            return Err(SubmissionError::Status {
                status: status.as_u16(),
                detail,
            }
            .into());
        }

        let created: TaskCreatedResponse = response
            .json()
            .await
            .map_err(|e| SubmissionError::Malformed(e.to_string()))?;
        Ok(VideoTask::pending(created.id))
    }

    async fn retrieve_task(&self, credentials: &ApiKey, task_id: &str) -> Result<VideoTask> {
        let response = self
            .authorize(
                self.client.get(self.url(&format!("/v1/tasks/{}", task_id))),
                credentials,
            )
            .send()
            .await
            .map_err(|e| PollingError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = Self::error_detail(response.text().await.unwrap_or_default());
            return Err(PollingError::Status {
                status: status.as_u16(),
                detail,
            }
            .into());
        }

        response
            .json::<VideoTask>()
            .await
            .map_err(|e| PollingError::Malformed(e.to_string()).into())
    }
}
