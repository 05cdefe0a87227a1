//! Favorites table definition and the schema transaction applied on open.

use rusqlite::{Connection, TransactionBehavior};
use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};

/// Value stamped into `PRAGMA user_version` once the schema is in place.
pub const SCHEMA_VERSION: i64 = 1;

/// How many times a failed schema transaction is retried from scratch.
const SCHEMA_ATTEMPTS: usize = 3;

const CREATE_FAVORITES_TABLE: &str = "CREATE TABLE IF NOT EXISTS favorites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    songId TEXT NOT NULL,
    addedAt INTEGER NOT NULL
)";

/// Files written before the uniqueness guard existed may hold duplicates.
const DEDUPLICATE_FAVORITES: &str = "DELETE FROM favorites
    WHERE id NOT IN (SELECT MIN(id) FROM favorites GROUP BY songId)";

const CREATE_SONG_ID_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS favorites_song_id ON favorites (songId)";

/// Create (or repair) the favorites schema inside one immediate transaction.
/// A failed attempt rolls back completely, so every retry starts from the
/// state the file had before the first one.
pub fn ensure_schema(conn: &mut Connection) -> StoreResult<()> {
    let mut last_error = None;
    for attempt in 1..=SCHEMA_ATTEMPTS {
        match apply_schema(conn) {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!(
                    "Favorites schema attempt {}/{} failed: {}",
                    attempt, SCHEMA_ATTEMPTS, err
                );
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(err) => Err(StoreError::Schema(err)),
        None => Ok(()),
    }
}

fn apply_schema(conn: &mut Connection) -> rusqlite::Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let version: i64 = tx.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION && has_favorites_table(&tx)? {
        return Ok(());
    }

    info!("Creating favorites schema at version {}", SCHEMA_VERSION);
    tx.execute(CREATE_FAVORITES_TABLE, [])?;
    let removed = tx.execute(DEDUPLICATE_FAVORITES, [])?;
    if removed > 0 {
        warn!("Removed {} duplicate favorites rows", removed);
    }
    tx.execute(CREATE_SONG_ID_INDEX, [])?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()
}

/// Whether the connection's main database has a `favorites` table.
pub fn has_favorites_table(conn: &Connection) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'favorites'",
        [],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
