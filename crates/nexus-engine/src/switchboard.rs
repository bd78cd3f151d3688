//! In-band persona switching.
//!
//! Any inbound text starting with `/` is a command. The rest of the text,
//! trimmed and lower-cased, must name a persona module.

use tracing::info;

use nexus_core::PersonaModule;

use crate::session::SessionState;

pub const COMMAND_PREFIX: char = '/';

pub fn is_command(text: &str) -> bool {
    text.starts_with(COMMAND_PREFIX)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched { module: PersonaModule },
    Rejected { token: String },
}

impl SwitchOutcome {
    /// The notice broadcast to every connection.
    pub fn notice(&self) -> String {
        match self {
            Self::Switched { module } => format!(
                "🔄 SYSTEM_SYNC: Module [{}] online.",
                module.as_str().to_uppercase()
            ),
            Self::Rejected { token } => format!("❌ ERROR: Module [{token}] unknown."),
        }
    }
}

/// Apply a `/name` command to the session.
///
/// An unknown name leaves the active module untouched. Switching to the
/// module that is already active still succeeds.
pub fn apply(state: &SessionState, command: &str) -> SwitchOutcome {
    let token = command
        .strip_prefix(COMMAND_PREFIX)
        .unwrap_or(command)
        .trim()
        .to_lowercase();

    match token.parse::<PersonaModule>() {
        Ok(module) => {
            let previous = state.set_module(module);
            info!(from = %previous, to = %module, "persona module switched");
            SwitchOutcome::Switched { module }
        }
        Err(_) => {
            info!(token = %token, "persona switch rejected");
            SwitchOutcome::Rejected { token }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_module_is_switchable() {
        let state = SessionState::default();
        for module in PersonaModule::ALL {
            let outcome = apply(&state, &format!("/{module}"));
            assert_eq!(outcome, SwitchOutcome::Switched { module });
            assert_eq!(state.active_module(), module);
            assert!(outcome.notice().contains(&module.as_str().to_uppercase()));
        }
    }

    #[test]
    fn name_is_case_folded() {
        let state = SessionState::default();
        let outcome = apply(&state, "/AlChEmIsT");
        assert_eq!(outcome.notice(), "🔄 SYSTEM_SYNC: Module [ALCHEMIST] online.");
        assert_eq!(state.active_module(), PersonaModule::Alchemist);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let state = SessionState::default();
        apply(&state, "/fixer \n");
        assert_eq!(state.active_module(), PersonaModule::Fixer);
    }

    #[test]
    fn unknown_module_is_rejected() {
        let state = SessionState::new(PersonaModule::Designer, "m");
        let outcome = apply(&state, "/unknownthing");
        assert_eq!(outcome.notice(), "❌ ERROR: Module [unknownthing] unknown.");
        assert_eq!(state.active_module(), PersonaModule::Designer);
    }

    #[test]
    fn bare_slash_is_rejected() {
        let state = SessionState::default();
        let outcome = apply(&state, "/");
        assert_eq!(outcome, SwitchOutcome::Rejected { token: String::new() });
        assert_eq!(state.active_module(), PersonaModule::Scholar);
    }

    #[test]
    fn command_detection() {
        assert!(is_command("/scholar"));
        assert!(!is_command(" /scholar"));
        assert!(!is_command("hello /scholar"));
    }
}
