pub mod converter;
pub mod models;
pub mod provider;

pub mod mock;

pub use mock::{MockCompletion, MockResponse};
pub use models::ModelInfo;
pub use provider::{GeminiProvider, DEFAULT_BASE_URL};
