pub mod error;
pub mod persona;
pub mod session;
pub mod switchboard;

pub use error::EngineError;
pub use persona::{FilePersonaSource, InMemoryPersonaSource, PersonaPromptAssembler};
pub use session::{SessionSnapshot, SessionState};
pub use switchboard::SwitchOutcome;
