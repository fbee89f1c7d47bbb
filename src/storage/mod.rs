pub mod postgres;
pub mod sqlite;
pub mod trait_def;

pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{PostAudit, Storage, StorageError, StorageResult};

pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
