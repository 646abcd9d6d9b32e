use crate::error::{PipelineError, Result};
use aws_sdk_bedrockruntime::{error::ProvideErrorMetadata, primitives::Blob, Client};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct TextGenerationRequest {
    pub prompt: String,
    pub model_id: String,
    pub max_tokens: i32,
    pub temperature: f32,
}

#[derive(Clone)]
pub struct TextClient {
    client: Client,
}

impl TextClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn generate(&self, request: &TextGenerationRequest) -> Result<String> {
        let payload = build_request_payload(request)?;
        let request_json = serde_json::to_string(&payload)
            .map_err(|e| PipelineError::Enrichment(e.to_string()))?;

        log::info!("Invoking model: {}", request.model_id);
        log::debug!("Text generation request payload: {}", request_json);

        let response = self
            .client
            .invoke_model()
            .model_id(&request.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(request_json.into_bytes()))
            .send()
            .await
            .map_err(|e| {
                if let Some(service_error) = e.as_service_error() {
                    PipelineError::Enrichment(format!(
                        "Bedrock service error: {} - {}",
                        service_error.code().unwrap_or("unknown"),
                        service_error.message().unwrap_or("no message")
                    ))
                } else {
                    PipelineError::Enrichment(format!("AWS SDK error: {}", e))
                }
            })?;

        let body: Value = serde_json::from_slice(response.body.as_ref())
            .map_err(|e| PipelineError::Enrichment(e.to_string()))?;
        parse_output_text(&request.model_id, &body)
    }
}

fn build_request_payload(request: &TextGenerationRequest) -> Result<Value> {
    let payload = match request.model_id.as_str() {
        id if id.starts_with("amazon.titan") => json!({
            "inputText": request.prompt,
            "textGenerationConfig": {
                "maxTokenCount": request.max_tokens,
                "temperature": request.temperature,
                "topP": 0.9
            }
        }),
        id if id.starts_with("meta.llama") => json!({
            "prompt": request.prompt,
            "max_gen_len": request.max_tokens,
            "temperature": request.temperature,
            "top_p": 0.9
        }),
        id if id.starts_with("mistral.mistral") => json!({
            "prompt": request.prompt,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": 0.9
        }),
        id if id.starts_with("anthropic.claude") || id.starts_with("arn:aws:bedrock") => json!({
            "messages": [
                {
                    "role": "user",
                    "content": request.prompt
                }
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "anthropic_version": "bedrock-2023-05-31"
        }),
        other => {
            return Err(PipelineError::Enrichment(format!(
                "Unsupported model ID: {}",
                other
            )))
        }
    };

    Ok(payload)
}

fn parse_output_text(model_id: &str, body: &Value) -> Result<String> {
    let text = match model_id {
        id if id.starts_with("amazon.titan") => body["results"][0]["outputText"].as_str(),
        id if id.starts_with("meta.llama") => body["generation"].as_str(),
        id if id.starts_with("mistral.mistral") => body["outputs"][0]["text"].as_str(),
        _ => body["content"][0]["text"].as_str(),
    };

    text.map(|t| t.trim().to_string())
        .ok_or_else(|| PipelineError::Enrichment(format!("No text in {} response", model_id)))
}
