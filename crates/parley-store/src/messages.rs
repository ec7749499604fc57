use tracing::instrument;

use parley_core::{ChatAddr, HistoryEntry};

use crate::database::Database;
use crate::error::StoreError;

/// Append-only message log keyed by client address.
///
/// There is no delete and no update; rows accumulate across restarts and a
/// history read replays them in insertion order.
pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append one message under an address.
    ///
    /// The sender label is client-supplied and stored verbatim; a missing
    /// label is stored as SQL NULL.
    #[instrument(skip(self, content, sender), fields(addr = %addr))]
    pub fn append(
        &self,
        addr: &ChatAddr,
        content: &str,
        sender: Option<&str>,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (ip, content, sender) VALUES (?1, ?2, ?3)",
                rusqlite::params![addr.as_str(), content, sender],
            )?;
            Ok(())
        })
    }

    /// All messages stored under an address, in insertion order.
    /// No pagination and no limit.
    #[instrument(skip(self), fields(addr = %addr))]
    pub fn history(&self, addr: &ChatAddr) -> Result<Vec<HistoryEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT content, sender FROM messages WHERE ip = ?1 ORDER BY rowid ASC",
            )?;
            let mut rows = stmt.query([addr.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(HistoryEntry {
                    content: row.get(0)?,
                    sender: row.get(1)?,
                });
            }
            Ok(results)
        })
    }

    /// Total number of stored messages, across all addresses.
    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?)
        })
    }
}
