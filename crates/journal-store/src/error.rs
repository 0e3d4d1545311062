#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl StoreError {
    /// Storage-level failure the caller cannot fix by changing input.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Io(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_classification() {
        assert!(StoreError::Database("disk full".into()).is_unavailable());
        assert!(StoreError::Io("permission denied".into()).is_unavailable());
        assert!(!StoreError::Conflict("public_id".into()).is_unavailable());
    }

    #[test]
    fn corrupt_row_display() {
        let err = StoreError::CorruptRow {
            table: "entries",
            column: "body",
            detail: "invalid type".into(),
        };
        assert_eq!(err.to_string(), "corrupt row in entries.body: invalid type");
    }
}
