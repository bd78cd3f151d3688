use async_trait::async_trait;

use crate::errors::CompletionError;
use crate::messages::ChatTurn;

/// Everything the completion service needs for one generation call.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    /// Prior history, oldest first, ending with the new user turn.
    pub contents: Vec<ChatTurn>,
    pub system_instruction: String,
    pub temperature: f32,
}

/// A remote (or scripted) text generator.
#[async_trait]
pub trait CompletionService: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}
