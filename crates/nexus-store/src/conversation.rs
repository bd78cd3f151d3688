use async_trait::async_trait;

use nexus_core::ChatTurn;

use crate::database::Database;
use crate::error::StoreError;
use crate::history::HistoryRepo;

/// The conversation log as the pipeline sees it.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Up to `limit` most recent turns, oldest first.
    async fn recent(&self, limit: usize) -> Result<Vec<ChatTurn>, StoreError>;

    /// Durably append one turn. Returns its row id.
    async fn append(&self, turn: &ChatTurn) -> Result<i64, StoreError>;
}

/// `ConversationStore` over the SQLite vault.
///
/// Each call runs on the blocking pool and holds the connection only for
/// the duration of that call.
#[derive(Clone)]
pub struct SqliteConversationStore {
    db: Database,
}

impl SqliteConversationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn recent(&self, limit: usize) -> Result<Vec<ChatTurn>, StoreError> {
        let repo = HistoryRepo::new(self.db.clone());
        let rows = tokio::task::spawn_blocking(move || repo.recent(limit)).await??;
        Ok(rows.iter().map(|m| m.to_turn()).collect())
    }

    async fn append(&self, turn: &ChatTurn) -> Result<i64, StoreError> {
        let repo = HistoryRepo::new(self.db.clone());
        let turn = turn.clone();
        tokio::task::spawn_blocking(move || repo.append(turn.role, &turn.content)).await?
    }
}
