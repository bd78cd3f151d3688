pub mod errors;
pub mod ids;
pub mod messages;
pub mod persona;
pub mod provider;
pub mod security;

pub use errors::CompletionError;
pub use ids::ConnectionId;
pub use messages::{ChatTurn, Role};
pub use persona::{PersonaModule, PersonaTextProvider};
pub use provider::{CompletionRequest, CompletionService};
