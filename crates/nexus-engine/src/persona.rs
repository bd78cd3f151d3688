use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use nexus_core::{PersonaModule, PersonaTextProvider};

/// Name of the text shared by every persona.
pub const IDENTITY_NAME: &str = "main_identity";

/// Reads `<dir>/<name>.txt` on every call, so edits apply to the next turn.
#[derive(Clone, Debug)]
pub struct FilePersonaSource {
    dir: PathBuf,
}

impl FilePersonaSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl PersonaTextProvider for FilePersonaSource {
    async fn resolve(&self, name: &str) -> String {
        let path = self.dir.join(format!("{name}.txt"));
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "persona text unavailable");
                String::new()
            }
        }
    }
}

/// Fixed persona texts, for tests and embedded setups.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPersonaSource {
    texts: HashMap<String, String>,
}

impl InMemoryPersonaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.texts.insert(name.into(), text.into());
        self
    }
}

#[async_trait]
impl PersonaTextProvider for InMemoryPersonaSource {
    async fn resolve(&self, name: &str) -> String {
        self.texts.get(name).cloned().unwrap_or_default()
    }
}

/// Builds the system instruction for the active module.
#[derive(Clone)]
pub struct PersonaPromptAssembler {
    provider: Arc<dyn PersonaTextProvider>,
    identity_name: String,
}

impl PersonaPromptAssembler {
    pub fn new(provider: impl PersonaTextProvider + 'static) -> Self {
        Self::with_identity(provider, IDENTITY_NAME)
    }

    pub fn with_identity(
        provider: impl PersonaTextProvider + 'static,
        identity_name: impl Into<String>,
    ) -> Self {
        Self {
            provider: Arc::new(provider),
            identity_name: identity_name.into(),
        }
    }

    /// `<identity>\n\n[PROTOCOL: <module>]\n<module text>`. Missing texts are empty.
    pub async fn assemble(&self, module: PersonaModule) -> String {
        let identity = self.provider.resolve(&self.identity_name).await;
        let body = self.provider.resolve(module.as_str()).await;
        format!("{identity}\n\n[PROTOCOL: {module}]\n{body}")
    }
}
