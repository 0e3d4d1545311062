//! Collision-retrying assignment of public entry ids.
//!
//! Shared by entry creation and the startup backfill: each attempt draws a
//! fresh id and runs one statement; only a unique-constraint failure on
//! `public_id` is retried.

use std::sync::Arc;

use journal_core::PublicId;
use tracing::debug;

use crate::error::StoreError;

/// Upper bound on draws. With 96 bits per id this is never reached unless
/// the generator itself is broken.
pub const MAX_ATTEMPTS: u32 = 1024;

/// Source of candidate ids.
pub type IdGenerator = Arc<dyn Fn() -> PublicId + Send + Sync>;

pub fn default_generator() -> IdGenerator {
    Arc::new(PublicId::generate)
}

/// Whether `err` is the unique index on `public_id` rejecting a duplicate.
pub fn is_public_id_collision(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, msg) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                && msg.as_deref().map_or(true, |m| m.contains("public_id"))
        }
        _ => false,
    }
}

/// Run `attempt` with fresh candidates until one is accepted.
///
/// Returns the accepted id together with the statement's result.
pub fn assign_unique<T, F>(
    generate: &dyn Fn() -> PublicId,
    mut attempt: F,
) -> Result<(PublicId, T), StoreError>
where
    F: FnMut(&PublicId) -> rusqlite::Result<T>,
{
    for n in 1..=MAX_ATTEMPTS {
        let candidate = generate();
        match attempt(&candidate) {
            Ok(value) => return Ok((candidate, value)),
            Err(e) if is_public_id_collision(&e) => {
                debug!(attempt = n, public_id = %candidate, "public id collision, regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(StoreError::Conflict(format!(
        "no unused public id after {MAX_ATTEMPTS} attempts"
    )))
}

/// Generator that replays `ids` in order, then falls back to random ids.
#[cfg(test)]
pub(crate) fn scripted(ids: &[&str]) -> IdGenerator {
    let queue = parking_lot::Mutex::new(
        ids.iter()
            .map(|s| PublicId::from_raw(*s))
            .collect::<std::collections::VecDeque<_>>(),
    );
    Arc::new(move || queue.lock().pop_front().unwrap_or_else(PublicId::generate))
}
