use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use nexus_core::security::ApiKey;
use nexus_core::CompletionService;
use nexus_engine::{FilePersonaSource, PersonaPromptAssembler, SessionState};
use nexus_llm::GeminiProvider;
use nexus_server::{BridgeServices, PipelineConfig, ServerConfig};
use nexus_settings::NexusSettings;
use nexus_store::{Database, SqliteConversationStore};
use nexus_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "nexus", version, about = "Shared-session conversational bridge")]
struct Cli {
    /// Settings file (defaults to ~/.nexus/settings.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Run the bridge (default)")]
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    #[command(about = "List models that support generateContent")]
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => nexus_settings::load_settings_from_path(path),
        None => nexus_settings::load_settings(),
    }
    .context("loading settings")?;

    let _telemetry = init_telemetry(TelemetryConfig {
        log_to_sqlite: loaded.settings.logging.log_to_sqlite,
        log_db_path: PathBuf::from(&loaded.settings.logging.log_db_path),
        ..TelemetryConfig::default().with_level_name(&loaded.settings.logging.level)
    });
    loaded.log_diagnostics();
    let mut settings = loaded.settings;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            if let Some(port) = port {
                settings.server.port = port;
            }
            serve(settings).await
        }
        Command::Models => list_models(&settings).await,
    }
}

fn provider(settings: &NexusSettings) -> anyhow::Result<GeminiProvider> {
    let Some(key) = settings.completion.api_key.clone() else {
        bail!("GEMINI_API_KEY is not set");
    };
    Ok(GeminiProvider::new(key, &settings.completion.base_url)?)
}

async fn serve(settings: NexusSettings) -> anyhow::Result<()> {
    let api_key = settings.completion.api_key.clone().unwrap_or_else(|| {
        tracing::warn!("GEMINI_API_KEY is not set; every generation will fault");
        ApiKey::new("")
    });
    let completion = GeminiProvider::new(api_key, &settings.completion.base_url)?;
    let provider_name = completion.name().to_string();

    let db_path = PathBuf::from(&settings.storage.database_path);
    let db = Database::open(&db_path)
        .with_context(|| format!("opening vault at {}", db_path.display()))?;

    let session = Arc::new(SessionState::new(
        settings.session.default_module,
        settings.session.model_id.clone(),
    ));

    let services = BridgeServices {
        session,
        store: Arc::new(SqliteConversationStore::new(db)),
        completion: Arc::new(completion),
        persona: PersonaPromptAssembler::with_identity(
            FilePersonaSource::new(&settings.persona.modules_dir),
            settings.persona.identity_name.clone(),
        ),
        pipeline: PipelineConfig {
            history_window: settings.session.history_window,
            temperature: settings.session.temperature,
        },
    };

    let config = ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        index_path: PathBuf::from(&settings.server.index_path),
        max_send_queue: settings.server.max_send_queue,
        heartbeat_interval: Duration::from_secs(settings.server.heartbeat_interval_secs),
        client_timeout: Duration::from_secs(settings.server.client_timeout_secs),
    };

    let handle = nexus_server::start(config, services)
        .await
        .context("starting server")?;

    tracing::info!(
        port = handle.port,
        provider = %provider_name,
        module = %settings.session.default_module,
        model = %settings.session.model_id,
        "nexus bridge ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown(Duration::from_secs(5)).await;
    Ok(())
}

async fn list_models(settings: &NexusSettings) -> anyhow::Result<()> {
    let models = provider(settings)?.list_models().await?;
    if models.is_empty() {
        println!("No models with generateContent are visible to this key.");
    }
    for model in models {
        println!("{}\t{}", model.id(), model.display_name);
    }
    Ok(())
}
