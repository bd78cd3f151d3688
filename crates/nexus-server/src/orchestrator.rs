//! The per-message pipeline shared by every connection.
//!
//! A `/name` command goes to the switchboard. Anything else is persisted,
//! sent to the completion service with the recent history and the active
//! persona, and the reply is persisted and broadcast. Failures become a
//! fault notice on the same broadcast channel.

use std::sync::Arc;

use tracing::{error, info, instrument};

use nexus_core::provider::{CompletionRequest, CompletionService};
use nexus_core::ChatTurn;
use nexus_engine::error::EngineError;
use nexus_engine::persona::PersonaPromptAssembler;
use nexus_engine::session::SessionState;
use nexus_engine::switchboard::{self, SwitchOutcome};
use nexus_store::ConversationStore;

use crate::client::ConnectionRegistry;

/// Pipeline knobs that come from settings.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Prior turns sent as context.
    pub history_window: usize,
    pub temperature: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_window: 10,
            temperature: 0.2,
        }
    }
}

/// What one inbound text unit turned into.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    Switched(SwitchOutcome),
    Replied(String),
    Faulted(String),
}

pub fn fault_notice(detail: &str) -> String {
    format!("⚠️ INTERNAL_FAULT: {detail}")
}

pub struct ConversationOrchestrator {
    session: Arc<SessionState>,
    store: Arc<dyn ConversationStore>,
    completion: Arc<dyn CompletionService>,
    persona: PersonaPromptAssembler,
    registry: Arc<ConnectionRegistry>,
    config: PipelineConfig,
}

impl ConversationOrchestrator {
    pub fn new(
        session: Arc<SessionState>,
        store: Arc<dyn ConversationStore>,
        completion: Arc<dyn CompletionService>,
        persona: PersonaPromptAssembler,
        registry: Arc<ConnectionRegistry>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            session,
            store,
            completion,
            persona,
            registry,
            config,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Process one inbound text unit to completion, including its broadcast.
    pub async fn handle(&self, text: &str) -> TurnOutcome {
        if switchboard::is_command(text) {
            let outcome = switchboard::apply(&self.session, text);
            self.registry.broadcast(&outcome.notice());
            return TurnOutcome::Switched(outcome);
        }

        match self.generate(text).await {
            Ok(reply) => {
                let report = self.registry.broadcast(&reply);
                info!(delivered = report.delivered, failed = report.failed, "reply broadcast");
                TurnOutcome::Replied(reply)
            }
            Err(e) => {
                error!(
                    error = %e,
                    kind = e.error_kind(),
                    provider = self.completion.name(),
                    "pipeline failed"
                );
                let detail = e.to_string();
                self.registry.broadcast(&fault_notice(&detail));
                TurnOutcome::Faulted(detail)
            }
        }
    }

    #[instrument(skip_all, fields(len = text.len()))]
    async fn generate(&self, text: &str) -> Result<String, EngineError> {
        let mut contents = self.store.recent(self.config.history_window).await?;

        let user_turn = ChatTurn::user(text);
        self.store.append(&user_turn).await?;
        contents.push(user_turn);

        let snapshot = self.session.snapshot();
        let request = CompletionRequest {
            model: snapshot.model_id,
            contents,
            system_instruction: self.persona.assemble(snapshot.active_module).await,
            temperature: self.config.temperature,
        };

        let reply = self.completion.complete(&request).await?;
        self.store.append(&ChatTurn::model(reply.as_str())).await?;
        Ok(reply)
    }
}
