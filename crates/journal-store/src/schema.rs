/// SQL for the a7journal store.
/// WAL mode is set at connection time; schema changes live in `migrations`.
pub const DB_FILE_NAME: &str = "a7journal.sqlite";

pub const ENTRIES_TABLE: &str = "entries";

/// Shape of the table before public ids existed. Kept verbatim so databases
/// created by older builds and fresh ones converge through the same steps.
pub const CREATE_ENTRIES: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entries_session_created ON entries(session_id, created_at, id);
"#;

pub const ADD_PUBLIC_ID_COLUMN: &str = "ALTER TABLE entries ADD COLUMN public_id TEXT";

/// Empty strings would trip the unique index; treat them as missing.
pub const NORMALIZE_EMPTY_PUBLIC_IDS: &str =
    "UPDATE entries SET public_id = NULL WHERE public_id = ''";

pub const CREATE_PUBLIC_ID_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_entries_public_id ON entries(public_id)";

pub const CREATE_MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
