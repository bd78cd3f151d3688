use chrono::{DateTime, Utc};
use tracing::instrument;

use nexus_core::{ChatTurn, Role};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{get, parse_enum, parse_timestamp};

/// A persisted conversation turn.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredMessage {
    pub id: i64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    pub fn to_turn(&self) -> ChatTurn {
        ChatTurn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Append-only access to the `history` table.
pub struct HistoryRepo {
    db: Database,
}

impl HistoryRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append one turn and return its row id.
    #[instrument(skip(self, content), fields(len = content.len()))]
    pub fn append(&self, role: Role, content: &str) -> Result<i64, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO history (role, content, timestamp) VALUES (?1, ?2, ?3)",
                rusqlite::params![role.as_str(), content, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// The `limit` most recent turns, oldest first.
    #[instrument(skip(self))]
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredMessage>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, role, content, timestamp FROM history
                 ORDER BY id DESC LIMIT ?1",
            )?;
            let mut rows = stmt.query([limit])?;
            let mut messages = Vec::new();
            while let Some(row) = rows.next()? {
                messages.push(row_to_message(row)?);
            }
            messages.reverse();
            Ok(messages)
        })
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?)
        })
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<StoredMessage, StoreError> {
    let role: String = get(row, 1, "history", "role")?;
    let timestamp: String = get(row, 3, "history", "timestamp")?;
    Ok(StoredMessage {
        id: get(row, 0, "history", "id")?,
        role: parse_enum(&role, "history", "role")?,
        content: get(row, 2, "history", "content")?,
        timestamp: parse_timestamp(&timestamp, "history", "timestamp")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> HistoryRepo {
        HistoryRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn append_assigns_increasing_ids() {
        let repo = repo();
        let a = repo.append(Role::User, "one").unwrap();
        let b = repo.append(Role::Model, "two").unwrap();
        assert!(b > a);
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn recent_on_empty_history() {
        assert!(repo().recent(10).unwrap().is_empty());
    }

    #[test]
    fn recent_is_bounded_and_oldest_first() {
        let repo = repo();
        for i in 0..15 {
            let role = if i % 2 == 0 { Role::User } else { Role::Model };
            repo.append(role, &format!("msg {i}")).unwrap();
        }

        let window = repo.recent(10).unwrap();
        assert_eq!(window.len(), 10);
        assert_eq!(window[0].content, "msg 5");
        assert_eq!(window[9].content, "msg 14");
        assert!(window.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn recent_with_fewer_rows_than_window() {
        let repo = repo();
        repo.append(Role::User, "only").unwrap();
        let window = repo.recent(10).unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].to_turn(), ChatTurn::user("only"));
    }

    #[test]
    fn corrupt_role_is_reported() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO history (role, content, timestamp) VALUES ('robot', 'x', ?1)",
                [Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .unwrap();

        let err = HistoryRepo::new(db).recent(5).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRow { column: "role", .. }));
    }
}
