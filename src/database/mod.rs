//! The content-addressable cache.
//!
//! [`Store`] owns the SQLite connection. [`DigestStore`], [`PathIndex`] and
//! [`TagGraph`] are borrowed views over either that connection or an open
//! transaction, so the same operations serve one-off calls and batched
//! ingestion alike.

pub mod digests;
pub mod models;
pub mod paths;
pub mod query;
pub mod schema;
pub mod store;
pub mod tags;

use rusqlite::Connection;
use tracing::warn;

use crate::error::Result;

pub use digests::DigestStore;
pub use models::{
    AttrType, AttrValue, Attribute, Digest, NewDigestRecord, Node, PathRecord, PathStat, Tag,
    Thumbnail,
};
pub use paths::PathIndex;
pub use query::DigestReport;
pub use store::Store;
pub use tags::TagGraph;

/// Run `f` inside a savepoint: its writes land together or not at all.
///
/// Savepoints nest inside an enclosing transaction, so this works both on a
/// bare connection and on a [`rusqlite::Transaction`].
pub(crate) fn atomically<T>(conn: &Connection, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    conn.execute_batch(&format!("SAVEPOINT {name}"))?;
    match f() {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name}"))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}")) {
                warn!("Failed to roll back savepoint {}: {}", name, rollback);
            }
            Err(err)
        }
    }
}
