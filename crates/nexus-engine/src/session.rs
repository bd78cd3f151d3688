use parking_lot::RwLock;
use serde::Serialize;

use nexus_core::PersonaModule;

/// A consistent copy of the shared session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub active_module: PersonaModule,
    pub model_id: String,
}

/// The one session every connection shares.
///
/// Reads return whole snapshots; writes are serialized and the last one wins.
#[derive(Debug)]
pub struct SessionState {
    inner: RwLock<SessionSnapshot>,
}

impl SessionState {
    pub fn new(active_module: PersonaModule, model_id: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(SessionSnapshot {
                active_module,
                model_id: model_id.into(),
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().clone()
    }

    pub fn active_module(&self) -> PersonaModule {
        self.inner.read().active_module
    }

    /// Returns the module that was active before.
    pub fn set_module(&self, module: PersonaModule) -> PersonaModule {
        std::mem::replace(&mut self.inner.write().active_module, module)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(PersonaModule::default(), "gemini-2.0-flash")
    }
}
