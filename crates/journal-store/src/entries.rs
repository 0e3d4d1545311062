use journal_core::time::now_timestamp;
use journal_core::PublicId;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;
use crate::public_id::{self, assign_unique, IdGenerator};
use crate::row_helpers;

/// One line of a session's journal listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRow {
    pub public_id: PublicId,
    pub body: String,
    pub created_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub public_id: PublicId,
    pub session_id: String,
    pub body: String,
    pub created_at: String,
}

/// Chronological neighbours of an entry within its session.
/// `prev` is older, `next` is newer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryNeighbors {
    pub prev_public_id: Option<PublicId>,
    pub next_public_id: Option<PublicId>,
}

pub struct EntryRepo {
    db: Database,
    generate: IdGenerator,
}

impl EntryRepo {
    pub fn new(db: Database) -> Self {
        Self::with_generator(db, public_id::default_generator())
    }

    pub fn with_generator(db: Database, generate: IdGenerator) -> Self {
        Self { db, generate }
    }

    /// Create an entry stamped with the current time.
    #[instrument(skip(self, body), fields(body_len = body.len()))]
    pub fn create_entry(&self, session_id: &str, body: &str) -> Result<PublicId, StoreError> {
        self.insert_at(session_id, body, &now_timestamp())
    }

    fn insert_at(
        &self,
        session_id: &str,
        body: &str,
        created_at: &str,
    ) -> Result<PublicId, StoreError> {
        self.db.with_conn(|conn| {
            let (public_id, _) = assign_unique(self.generate.as_ref(), |candidate| {
                conn.execute(
                    "INSERT INTO entries (session_id, public_id, body, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![session_id, candidate.as_str(), body, created_at],
                )
            })?;
            Ok(public_id)
        })
    }

    /// All entries of a session, newest first.
    #[instrument(skip(self))]
    pub fn list_entries(&self, session_id: &str) -> Result<Vec<EntryRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT public_id, body, created_at FROM entries
                 WHERE session_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let mut rows = stmt.query([session_id])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(EntryRow {
                    public_id: row_helpers::get_public_id(row, 0, "entries")?,
                    body: row_helpers::get(row, 1, "entries", "body")?,
                    created_at: row_helpers::get(row, 2, "entries", "created_at")?,
                });
            }
            Ok(results)
        })
    }

    #[instrument(skip(self))]
    pub fn count_entries(&self, session_id: &str) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entries WHERE session_id = ?1",
                [session_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Look up one entry. An id owned by another session is reported as
    /// absent, same as an unknown one.
    #[instrument(skip(self, public_id), fields(public_id = %public_id))]
    pub fn get_entry(
        &self,
        session_id: &str,
        public_id: &PublicId,
    ) -> Result<Option<Entry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT public_id, session_id, body, created_at FROM entries
                 WHERE session_id = ?1 AND public_id = ?2",
            )?;
            let mut rows = stmt.query([session_id, public_id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(Entry {
                    public_id: row_helpers::get_public_id(row, 0, "entries")?,
                    session_id: row_helpers::get(row, 1, "entries", "session_id")?,
                    body: row_helpers::get(row, 2, "entries", "body")?,
                    created_at: row_helpers::get(row, 3, "entries", "created_at")?,
                })),
                None => Ok(None),
            }
        })
    }

    /// Previous (older) and next (newer) entry in the session, ordered by
    /// `(created_at, id)`. Unknown targets have no neighbours.
    #[instrument(skip(self, public_id), fields(public_id = %public_id))]
    pub fn get_entry_neighbors(
        &self,
        session_id: &str,
        public_id: &PublicId,
    ) -> Result<EntryNeighbors, StoreError> {
        self.db.with_conn(|conn| {
            let current: Option<(i64, String)> = conn
                .query_row(
                    "SELECT id, created_at FROM entries
                     WHERE session_id = ?1 AND public_id = ?2",
                    [session_id, public_id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((id, created_at)) = current else {
                return Ok(EntryNeighbors::default());
            };

            let next: Option<String> = conn
                .query_row(
                    "SELECT public_id FROM entries
                     WHERE session_id = ?1 AND (created_at > ?2 OR (created_at = ?2 AND id > ?3))
                     ORDER BY created_at ASC, id ASC LIMIT 1",
                    rusqlite::params![session_id, created_at, id],
                    |row| row.get(0),
                )
                .optional()?;

            let prev: Option<String> = conn
                .query_row(
                    "SELECT public_id FROM entries
                     WHERE session_id = ?1 AND (created_at < ?2 OR (created_at = ?2 AND id < ?3))
                     ORDER BY created_at DESC, id DESC LIMIT 1",
                    rusqlite::params![session_id, created_at, id],
                    |row| row.get(0),
                )
                .optional()?;

            Ok(EntryNeighbors {
                prev_public_id: prev.map(PublicId::from_raw),
                next_public_id: next.map(PublicId::from_raw),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::public_id::scripted;

    const S: &str = "did:plc:alice";
    const S2: &str = "did:plc:bob";

    fn repo() -> EntryRepo {
        EntryRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn create_then_list() {
        let repo = repo();
        let id = repo.create_entry(S, "hello journal").unwrap();

        let entries = repo.list_entries(S).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].public_id, id);
        assert_eq!(entries[0].body, "hello journal");
        assert!(id.is_well_formed());
        assert!(entries[0].created_at.ends_with('Z'));
    }

    #[test]
    fn list_empty_session() {
        let repo = repo();
        repo.create_entry(S, "mine").unwrap();
        assert!(repo.list_entries("did:plc:nobody").unwrap().is_empty());
        assert_eq!(repo.count_entries("did:plc:nobody").unwrap(), 0);
        assert_eq!(repo.count_entries(S).unwrap(), 1);
    }

    #[test]
    fn list_newest_first_with_id_tiebreak() {
        let repo = repo();
        let a = repo.insert_at(S, "a", "2026-01-01T00:00:00.000Z").unwrap();
        let b = repo.insert_at(S, "b", "2026-01-02T00:00:00.000Z").unwrap();
        let c = repo.insert_at(S, "c", "2026-01-02T00:00:00.000Z").unwrap();
        let d = repo.insert_at(S, "d", "2026-01-03T00:00:00.000Z").unwrap();

        let ids = |repo: &EntryRepo| -> Vec<PublicId> {
            repo.list_entries(S)
                .unwrap()
                .into_iter()
                .map(|e| e.public_id)
                .collect()
        };
        assert_eq!(ids(&repo), vec![d.clone(), c.clone(), b.clone(), a.clone()]);

        // Later inserts don't reorder what was already there.
        repo.insert_at(S, "e", "2026-01-02T00:00:00.000Z").unwrap();
        let kept: Vec<PublicId> = ids(&repo)
            .into_iter()
            .filter(|id| [&a, &b, &c, &d].contains(&id))
            .collect();
        assert_eq!(kept, vec![d, c, b, a]);
    }

    #[test]
    fn get_entry_by_public_id() {
        let repo = repo();
        let id = repo.create_entry(S, "body text").unwrap();
        let entry = repo.get_entry(S, &id).unwrap().unwrap();
        assert_eq!(entry.public_id, id);
        assert_eq!(entry.session_id, S);
        assert_eq!(entry.body, "body text");
    }

    #[test]
    fn get_entry_other_session_is_not_found() {
        let repo = repo();
        let id = repo.create_entry(S, "private").unwrap();
        assert!(repo.get_entry(S2, &id).unwrap().is_none());
        assert!(repo.get_entry(S, &PublicId::from_raw("nonexistent")).unwrap().is_none());
    }

    #[test]
    fn neighbors_of_middle_entry() {
        let repo = repo();
        let e1 = repo.insert_at(S, "one", "2026-01-01T00:00:01.000Z").unwrap();
        let e2 = repo.insert_at(S, "two", "2026-01-01T00:00:02.000Z").unwrap();
        let e3 = repo.insert_at(S, "three", "2026-01-01T00:00:03.000Z").unwrap();

        let n = repo.get_entry_neighbors(S, &e2).unwrap();
        assert_eq!(n.prev_public_id, Some(e1.clone()));
        assert_eq!(n.next_public_id, Some(e3.clone()));

        let first = repo.get_entry_neighbors(S, &e1).unwrap();
        assert_eq!(first.prev_public_id, None);
        assert_eq!(first.next_public_id, Some(e2.clone()));

        let last = repo.get_entry_neighbors(S, &e3).unwrap();
        assert_eq!(last.prev_public_id, Some(e2));
        assert_eq!(last.next_public_id, None);
    }

    #[test]
    fn neighbors_break_timestamp_ties_by_insertion() {
        let repo = repo();
        let ts = "2026-01-01T00:00:00.000Z";
        let a = repo.insert_at(S, "a", ts).unwrap();
        let b = repo.insert_at(S, "b", ts).unwrap();
        let c = repo.insert_at(S, "c", ts).unwrap();

        let n = repo.get_entry_neighbors(S, &b).unwrap();
        assert_eq!(n.prev_public_id, Some(a));
        assert_eq!(n.next_public_id, Some(c));
    }

    #[test]
    fn neighbors_stay_within_session() {
        let repo = repo();
        repo.insert_at(S2, "bob early", "2026-01-01T00:00:00.000Z").unwrap();
        let mine = repo.insert_at(S, "alice", "2026-01-02T00:00:00.000Z").unwrap();
        repo.insert_at(S2, "bob late", "2026-01-03T00:00:00.000Z").unwrap();

        assert_eq!(repo.get_entry_neighbors(S, &mine).unwrap(), EntryNeighbors::default());
        // Someone else's id is unknown from this session.
        assert_eq!(repo.get_entry_neighbors(S2, &mine).unwrap(), EntryNeighbors::default());
    }

    #[test]
    fn neighbors_of_unknown_entry() {
        let repo = repo();
        repo.create_entry(S, "something").unwrap();
        let n = repo.get_entry_neighbors(S, &PublicId::from_raw("nonexistent")).unwrap();
        assert_eq!(n.prev_public_id, None);
        assert_eq!(n.next_public_id, None);
    }

    #[test]
    fn create_retries_on_public_id_collision() {
        let taken = "abcabcabcabcabcabcabcabc";
        let fresh = "def0def0def0def0def0def0";
        let repo = EntryRepo::with_generator(
            Database::in_memory().unwrap(),
            scripted(&[taken, taken, fresh]),
        );

        assert_eq!(repo.create_entry(S, "first").unwrap().as_str(), taken);
        assert_eq!(repo.create_entry(S, "second").unwrap().as_str(), fresh);
        assert_eq!(repo.list_entries(S).unwrap().len(), 2);
    }

    #[test]
    fn many_creates_have_unique_ids() {
        let repo = repo();
        for i in 0..10_000 {
            repo.create_entry(S, &format!("entry {i}")).unwrap();
        }
        let entries = repo.list_entries(S).unwrap();
        let unique: std::collections::HashSet<_> = entries.iter().map(|e| &e.public_id).collect();
        assert_eq!(entries.len(), 10_000);
        assert_eq!(unique.len(), 10_000);
    }

    #[test]
    fn storage_failures_surface_as_database_errors() {
        let db = Database::in_memory().unwrap();
        let repo = EntryRepo::new(db.clone());
        let id = repo.create_entry(S, "kept").unwrap();
        db.with_conn(|conn| Ok(conn.execute_batch("DROP TABLE entries")?))
            .unwrap();

        let errors = [
            repo.create_entry(S, "lost").unwrap_err(),
            repo.list_entries(S).unwrap_err(),
            repo.count_entries(S).unwrap_err(),
            repo.get_entry(S, &id).unwrap_err(),
            repo.get_entry_neighbors(S, &id).unwrap_err(),
        ];
        for err in errors {
            assert!(matches!(err, StoreError::Database(_)), "{err:?}");
            assert!(err.is_unavailable());
        }
    }

    #[test]
    fn entry_serializes_camel_case() {
        let row = EntryRow {
            public_id: PublicId::from_raw("0123456789abcdef01234567"),
            body: "b".into(),
            created_at: "2026-01-01T00:00:00.000Z".into(),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["publicId"], "0123456789abcdef01234567");
        assert_eq!(json["createdAt"], "2026-01-01T00:00:00.000Z");
    }
}
