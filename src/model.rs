use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::transcript::Transcript;

/// Incremental response fragments, in arrival order. The channel closes when
/// the response is complete.
pub type FragmentReceiver = mpsc::Receiver<Result<String, ModelError>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(String),

    #[error("model API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed model stream: {0}")]
    Stream(String),
}

/// Text-generation backend that turns a transcript into a response.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Start generating a response. Fragments arrive on the returned channel.
    async fn stream(
        &self,
        transcript: &Transcript,
        params: &GenerationParams,
    ) -> Result<FragmentReceiver, ModelError>;
}
