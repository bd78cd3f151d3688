use nexus_core::errors::CompletionError;
use nexus_store::StoreError;

/// Why one pipeline run failed. The connection that sent the input keeps
/// serving either way.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Completion(#[from] CompletionError),

    #[error("vault: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Completion(e) => e.error_kind(),
            Self::Store(_) => "store",
        }
    }
}
