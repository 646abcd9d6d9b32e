pub mod text_client;

use crate::{config::EnrichmentConfig, error::Result, prompt::PromptEnricher};
use async_trait::async_trait;
use aws_sdk_bedrockruntime::{config::Region, Client};

pub use text_client::{TextClient, TextGenerationRequest};

/// Prompt enrichment backed by a Bedrock text model.
#[derive(Clone)]
pub struct BedrockEnricher {
    text_client: TextClient,
    config: EnrichmentConfig,
}

impl BedrockEnricher {
    pub async fn new(config: EnrichmentConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let aws_config = loader.load().await;

        Self {
            text_client: TextClient::new(Client::new(&aws_config)),
            config,
        }
    }

    pub fn text(&self) -> &TextClient {
        &self.text_client
    }
}

#[async_trait]
impl PromptEnricher for BedrockEnricher {
    async fn complete(&self, instruction: &str) -> Result<String> {
        let request = TextGenerationRequest {
            prompt: instruction.to_string(),
            model_id: self.config.model_id.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        self.text_client.generate(&request).await
    }

    fn name(&self) -> &str {
        &self.config.model_id
    }
}
