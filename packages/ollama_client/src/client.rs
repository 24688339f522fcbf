use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::stream::GenerationStream;
use crate::types::{GenerateRequest, GenerationConfig, Model, TagsResponse};

/// Catalog endpoint, relative to the provider base URL.
const TAGS_PATH: &str = "/api/tags";

/// Thin wrapper over a shared `reqwest::Client`. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct OllamaClient {
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Start a streaming generation.
    ///
    /// Nothing is sent until the returned stream is first polled. The stream
    /// ends on the final chunk, when the body closes, on the first unparsable
    /// line, or once `cancel` fires. Replacing the caller's context buffer with
    /// the final chunk's `context` is the caller's job.
    pub fn generate(
        &self,
        config: &GenerationConfig,
        prompt: &str,
        context: &[i64],
        cancel: CancellationToken,
    ) -> GenerationStream {
        debug!(
            model = %config.model,
            context_len = context.len(),
            "Preparing generate request to {}",
            config.url()
        );
        let request = self
            .http
            .post(config.url())
            .json(&GenerateRequest::new(config, prompt, context));
        GenerationStream::new(request, cancel)
    }

    /// Fetch the provider catalog. Best effort: any failure is logged and
    /// yields an empty list.
    pub async fn list_models(&self, base_url: &str) -> Vec<Model> {
        match self.try_list_models(base_url).await {
            Ok(models) => models,
            Err(e) => {
                warn!("[list_models] {}", e);
                Vec::new()
            }
        }
    }

    pub async fn try_list_models(&self, base_url: &str) -> Result<Vec<Model>, ClientError> {
        let response = self
            .http
            .get(format!("{}{}", base_url, TAGS_PATH))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }

        let body = response.bytes().await?;
        let tags: TagsResponse = serde_json::from_slice(&body)?;
        debug!("Provider catalog lists {} models", tags.models.len());
        Ok(tags.models)
    }
}
