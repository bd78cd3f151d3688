//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file only needs the keys it wants to change.

use nexus_core::security::ApiKey;
use nexus_core::PersonaModule;
use serde::{Deserialize, Serialize};

/// Root settings for the bridge.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "session": { "historyWindow": 20 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NexusSettings {
    pub name: String,
    pub server: ServerSettings,
    pub session: SessionSettings,
    pub storage: StorageSettings,
    pub persona: PersonaSettings,
    pub completion: CompletionSettings,
    pub logging: LoggingSettings,
}

impl Default for NexusSettings {
    fn default() -> Self {
        Self {
            name: "nexus".to_string(),
            server: ServerSettings::default(),
            session: SessionSettings::default(),
            storage: StorageSettings::default(),
            persona: PersonaSettings::default(),
            completion: CompletionSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Network and connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    pub port: u16,
    /// Front-end document served at `/`.
    pub index_path: String,
    /// Per-connection outbound queue depth. A full queue drops the message
    /// for that connection only.
    pub max_send_queue: usize,
    pub heartbeat_interval_secs: u64,
    /// Connections with no pong for this long are unregistered.
    pub client_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            index_path: "index.html".to_string(),
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
        }
    }
}

/// Shared session defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Persona active at startup.
    pub default_module: PersonaModule,
    pub model_id: String,
    /// Number of prior turns sent as context.
    pub history_window: usize,
    pub temperature: f32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_module: PersonaModule::Scholar,
            model_id: "gemini-2.0-flash".to_string(),
            history_window: 10,
            temperature: 0.2,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    pub database_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "koda_vault.db".to_string(),
        }
    }
}

/// Where persona text files live.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonaSettings {
    /// Directory holding `<name>.txt` files.
    pub modules_dir: String,
    /// File stem of the base identity text.
    pub identity_name: String,
}

impl Default for PersonaSettings {
    fn default() -> Self {
        Self {
            modules_dir: "modules".to_string(),
            identity_name: "main_identity".to_string(),
        }
    }
}

/// Completion API endpoint. The key never round-trips through the file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionSettings {
    pub base_url: String,
    #[serde(skip)]
    pub api_key: Option<ApiKey>,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` still wins when set.
    pub level: String,
    /// Persist warn+ events to a SQLite file.
    pub log_to_sqlite: bool,
    pub log_db_path: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_sqlite: false,
            log_db_path: "nexus-logs.db".to_string(),
        }
    }
}
