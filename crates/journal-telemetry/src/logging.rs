//! Warning log: WARN and ERROR events written to their own SQLite file.
//!
//! Each row carries the session (account DID) and public entry id the event
//! happened under, taken from the event itself or from an enclosing
//! `#[instrument]` span, so a failing request can be traced back to one
//! journal and one entry.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use journal_core::time::{format_timestamp, now_timestamp};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{span, Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

const WARNINGS_SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
CREATE TABLE IF NOT EXISTS warnings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded_at TEXT NOT NULL,
    level TEXT NOT NULL,
    target TEXT NOT NULL,
    message TEXT NOT NULL,
    fields TEXT,
    session_id TEXT,
    public_id TEXT
);
CREATE INDEX IF NOT EXISTS idx_warnings_recorded ON warnings(recorded_at);
";

/// Append-only store behind [`WarnLogLayer`]. Separate from the entry
/// database so a broken journal file cannot also lose the errors about it.
pub struct WarnLog {
    conn: Mutex<Connection>,
}

impl WarnLog {
    /// Open (creating if needed) and drop rows older than `retain_days`.
    pub fn open(path: &Path, retain_days: u32) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(WARNINGS_SCHEMA)?;

        let cutoff = format_timestamp(Utc::now() - Duration::days(i64::from(retain_days)));
        conn.execute("DELETE FROM warnings WHERE recorded_at < ?1", [&cutoff])?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn append(&self, level: Level, target: &str, fields: EventFields) {
        let extra = if fields.extra.is_empty() {
            None
        } else {
            serde_json::to_string(&fields.extra).ok()
        };
        // A logging failure has nowhere to be logged to.
        let _ = self.conn.lock().execute(
            "INSERT INTO warnings
                 (recorded_at, level, target, message, fields, session_id, public_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                now_timestamp(),
                level.as_str(),
                target,
                fields.message,
                extra,
                fields.session_id,
                fields.public_id,
            ],
        );
    }
}

/// Journal-specific fields pulled out of an event or span.
#[derive(Default)]
struct EventFields {
    message: String,
    session_id: Option<String>,
    public_id: Option<String>,
    extra: Map<String, Value>,
}

impl EventFields {
    fn put(&mut self, name: &str, value: Value) {
        match (name, value) {
            ("message", Value::String(s)) => self.message = s,
            ("session_id", Value::String(s)) => self.session_id = Some(s),
            ("public_id", Value::String(s)) => self.public_id = Some(s),
            (name, value) => {
                self.extra.insert(name.to_owned(), value);
            }
        }
    }

    fn has_ids(&self) -> bool {
        self.session_id.is_some() || self.public_id.is_some()
    }
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let text = format!("{value:?}");
        let text = if field.name() == "message" {
            text
        } else {
            text.trim_matches('"').to_owned()
        };
        self.put(field.name(), Value::String(text));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field.name(), Value::String(value.to_owned()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field.name(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field.name(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field.name(), value.into());
    }
}

/// Ids recorded on a span, kept in its extensions for child events.
struct SpanIds {
    session_id: Option<String>,
    public_id: Option<String>,
}

/// `tracing` layer that sends WARN and ERROR events to a [`WarnLog`].
pub struct WarnLogLayer {
    log: Arc<WarnLog>,
}

impl WarnLogLayer {
    pub fn new(log: Arc<WarnLog>) -> Self {
        Self { log }
    }
}

impl<S> Layer<S> for WarnLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut fields = EventFields::default();
        attrs.record(&mut fields);
        if !fields.has_ids() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanIds {
                session_id: fields.session_id,
                public_id: fields.public_id,
            });
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::WARN {
            return;
        }

        let mut fields = EventFields::default();
        event.record(&mut fields);

        for span in ctx.event_scope(event).into_iter().flatten() {
            if fields.session_id.is_some() && fields.public_id.is_some() {
                break;
            }
            if let Some(ids) = span.extensions().get::<SpanIds>() {
                if fields.session_id.is_none() {
                    fields.session_id.clone_from(&ids.session_id);
                }
                if fields.public_id.is_none() {
                    fields.public_id.clone_from(&ids.public_id);
                }
            }
        }

        self.log.append(level, event.metadata().target(), fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tracing_subscriber::layer::SubscriberExt;

    type Row = (String, String, Option<String>, Option<String>, Option<String>);

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("journal-warnlog-{}", uuid::Uuid::now_v7()))
            .join("logs.sqlite")
    }

    fn rows(path: &Path) -> Vec<Row> {
        let conn = Connection::open(path).unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT level, message, fields, session_id, public_id
                 FROM warnings ORDER BY id",
            )
            .unwrap();
        stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn only_warn_and_error_are_kept() {
        let path = temp_path();
        let log = Arc::new(WarnLog::open(&path, 30).unwrap());
        let subscriber = tracing_subscriber::registry().with(WarnLogLayer::new(log));

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("noise");
            tracing::info!("entry created");
            tracing::warn!("slow backfill");
            tracing::error!("disk full");
        });

        let levels: Vec<String> = rows(&path).into_iter().map(|r| r.0).collect();
        assert_eq!(levels, vec!["WARN", "ERROR"]);
    }

    #[test]
    fn ids_come_from_enclosing_spans() {
        let path = temp_path();
        let log = Arc::new(WarnLog::open(&path, 30).unwrap());
        let subscriber = tracing_subscriber::registry().with(WarnLogLayer::new(log));

        tracing::subscriber::with_default(subscriber, || {
            let outer = tracing::info_span!("request", session_id = "did:plc:span");
            let _o = outer.enter();
            let inner = tracing::info_span!("get_entry", public_id = "0123456789abcdef01234567");
            let _i = inner.enter();
            tracing::warn!(attempt = 3u64, "public id collision");
        });

        let rows = rows(&path);
        assert_eq!(rows.len(), 1);
        let (level, message, fields, session_id, public_id) = &rows[0];
        assert_eq!(level, "WARN");
        assert_eq!(message, "public id collision");
        assert_eq!(fields.as_deref(), Some(r#"{"attempt":3}"#));
        assert_eq!(session_id.as_deref(), Some("did:plc:span"));
        assert_eq!(public_id.as_deref(), Some("0123456789abcdef01234567"));
    }

    #[test]
    fn event_fields_win_over_span_fields() {
        let path = temp_path();
        let log = Arc::new(WarnLog::open(&path, 30).unwrap());
        let subscriber = tracing_subscriber::registry().with(WarnLogLayer::new(log));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("request", session_id = "did:plc:outer");
            let _g = span.enter();
            tracing::error!(session_id = "did:plc:event", "revocation failed");
        });

        assert_eq!(rows(&path)[0].3.as_deref(), Some("did:plc:event"));
    }

    #[test]
    fn open_drops_rows_past_retention() {
        let path = temp_path();
        drop(WarnLog::open(&path, 30).unwrap());
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "INSERT INTO warnings (recorded_at, level, target, message)
                 VALUES ('2001-01-01T00:00:00.000Z', 'WARN', 't', 'ancient');",
            )
            .unwrap();
            conn.execute(
                "INSERT INTO warnings (recorded_at, level, target, message)
                 VALUES (?1, 'WARN', 't', 'recent')",
                [now_timestamp()],
            )
            .unwrap();
        }

        drop(WarnLog::open(&path, 30).unwrap());

        let messages: Vec<String> = rows(&path).into_iter().map(|r| r.1).collect();
        assert_eq!(messages, vec!["recent"]);
    }
}
