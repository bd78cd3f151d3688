pub mod conversation;
pub mod database;
pub mod error;
pub mod history;
pub mod row_helpers;
pub mod schema;

pub use conversation::{ConversationStore, SqliteConversationStore};
pub use database::Database;
pub use error::StoreError;
pub use history::{HistoryRepo, StoredMessage};
