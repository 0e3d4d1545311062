pub mod database;
pub mod entries;
pub mod error;
pub mod migrations;
pub mod public_id;
pub mod row_helpers;
pub mod schema;

pub use database::Database;
pub use entries::{Entry, EntryNeighbors, EntryRepo, EntryRow};
pub use error::StoreError;
