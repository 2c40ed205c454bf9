use async_trait::async_trait;
use serde::Serialize;

/// Sampling controls forwarded to the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingOptions {
    pub temperature: f32,
}

/// One completion request: which model, what prompt, how to sample.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub options: SamplingOptions,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run a single non-streaming completion and return the raw response text.
    async fn generate(&self, request: GenerateRequest) -> Result<String, LlmError>;

    /// Names of the models the service can currently serve.
    async fn list_models(&self) -> Result<Vec<String>, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
