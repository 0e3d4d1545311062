use journal_core::PublicId;

use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get a public id column. Rows are only read after the backfill, so a
/// NULL or empty value means the table was modified behind our back.
pub fn get_public_id(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
) -> Result<PublicId, StoreError> {
    let raw: Option<String> = get(row, idx, table, "public_id")?;
    match raw {
        Some(s) if !s.is_empty() => Ok(PublicId::from_raw(s)),
        _ => Err(StoreError::CorruptRow {
            table,
            column: "public_id",
            detail: "missing public id".into(),
        }),
    }
}
