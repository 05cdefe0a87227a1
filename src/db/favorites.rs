use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::connection::PersistenceCoordinator;
use crate::error::StoreResult;
use crate::models::FavoriteEntry;

/// Insert guarded by the unique index on `songId`. `addedAt` never goes
/// below the newest stored value, so the column stays non-decreasing even if
/// the clock steps backwards.
const INSERT_FAVORITE: &str = "INSERT OR IGNORE INTO favorites (songId, addedAt)
    SELECT ?1, MAX(?2, COALESCE((SELECT MAX(addedAt) FROM favorites), 0))";
const DELETE_FAVORITE: &str = "DELETE FROM favorites WHERE songId = ?1";
const FAVORITE_EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM favorites WHERE songId = ?1)";
const LIST_FAVORITES: &str = "SELECT id, songId, addedAt FROM favorites ORDER BY addedAt, id";
const COUNT_FAVORITES: &str = "SELECT COUNT(*) FROM favorites";

/// Durable set of favorite song ids.
///
/// Every write is one statement, so two processes racing on the same file
/// converge without extra locking. When storage fails the store keeps working
/// from an in-memory set for the rest of the session: the failing call returns
/// the error once, and later calls succeed against the in-memory copy.
pub struct FavoritesStore {
    coordinator: Arc<PersistenceCoordinator>,
    inner: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    volatile: Option<VolatileFavorites>,
    last_known: Vec<FavoriteEntry>,
    seen_version: Option<i64>,
}

impl FavoritesStore {
    pub fn new(coordinator: Arc<PersistenceCoordinator>) -> Self {
        Self {
            coordinator,
            inner: Mutex::new(StoreState::default()),
        }
    }

    pub fn coordinator(&self) -> &Arc<PersistenceCoordinator> {
        &self.coordinator
    }

    /// Whether the store has fallen back to session-only favorites.
    pub async fn is_degraded(&self) -> bool {
        self.inner.lock().await.volatile.is_some()
    }

    /// Favorite `song_id`. Adding an existing favorite changes nothing.
    pub async fn add(&self, song_id: &str) -> StoreResult<()> {
        let added_at = Utc::now().timestamp_millis();
        let id = song_id.to_string();
        let inserted = self
            .execute(
                move |conn| {
                    let inserted = conn
                        .prepare_cached(INSERT_FAVORITE)?
                        .execute(params![id, added_at])?;
                    Ok(inserted > 0)
                },
                |volatile| volatile.add(song_id, added_at),
                |known, inserted| {
                    if *inserted && !known.iter().any(|entry| entry.song_id == song_id) {
                        known.push(FavoriteEntry {
                            id: 0,
                            song_id: song_id.to_string(),
                            added_at,
                        });
                    }
                },
            )
            .await?;
        debug!("Favorite add {} (inserted: {})", song_id, inserted);
        Ok(())
    }

    /// Remove every row for `song_id`. Removing a missing favorite is a no-op.
    pub async fn remove(&self, song_id: &str) -> StoreResult<()> {
        let id = song_id.to_string();
        let removed = self
            .execute(
                move |conn| Ok(conn.prepare_cached(DELETE_FAVORITE)?.execute(params![id])?),
                |volatile| volatile.remove(song_id),
                |known, _| known.retain(|entry| entry.song_id != song_id),
            )
            .await?;
        debug!("Favorite remove {} (rows: {})", song_id, removed);
        Ok(())
    }

    pub async fn is_favorite(&self, song_id: &str) -> StoreResult<bool> {
        let id = song_id.to_string();
        self.execute(
            move |conn| {
                Ok(conn
                    .prepare_cached(FAVORITE_EXISTS)?
                    .query_row(params![id], |row| row.get(0))?)
            },
            |volatile| volatile.contains(song_id),
            |_, _| {},
        )
        .await
    }

    /// Favorited song ids, oldest first.
    pub async fn list(&self) -> StoreResult<Vec<String>> {
        let entries = self.list_entries().await?;
        Ok(entries.into_iter().map(|entry| entry.song_id).collect())
    }

    /// Full favorite rows, oldest first.
    pub async fn list_entries(&self) -> StoreResult<Vec<FavoriteEntry>> {
        self.execute(
            |conn| {
                let mut stmt = conn.prepare_cached(LIST_FAVORITES)?;
                let entries = stmt
                    .query_map([], |row| {
                        Ok(FavoriteEntry {
                            id: row.get(0)?,
                            song_id: row.get(1)?,
                            added_at: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            },
            |volatile| volatile.entries.clone(),
            |known, entries| *known = entries.clone(),
        )
        .await
    }

    pub async fn count(&self) -> StoreResult<usize> {
        self.execute(
            |conn| Ok(conn.query_row(COUNT_FAVORITES, [], |row| row.get(0))?),
            |volatile| volatile.entries.len(),
            |_, _| {},
        )
        .await
    }

    /// Flip the favorite state of `song_id`, returning the new state.
    pub async fn toggle(&self, song_id: &str) -> StoreResult<bool> {
        if self.is_favorite(song_id).await? {
            self.remove(song_id).await?;
            Ok(false)
        } else {
            self.add(song_id).await?;
            Ok(true)
        }
    }

    /// Whether another context committed to the database since the last call.
    /// Writes from other contexts are never pushed; callers poll this and
    /// re-read the list when it returns true.
    pub async fn has_external_changes(&self) -> StoreResult<bool> {
        let version = self
            .execute(
                |conn| Ok(Some(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)),
                |_| None,
                |_, _| {},
            )
            .await?;

        let Some(version) = version else {
            return Ok(false);
        };
        let mut inner = self.inner.lock().await;
        let changed = inner.seen_version.is_some_and(|seen| seen != version);
        inner.seen_version = Some(version);
        Ok(changed)
    }

    /// Run `persistent` against the database, or `volatile` against the
    /// session set once the store has degraded. `remember` mirrors successful
    /// results into the last known list used to seed the session set.
    async fn execute<T, P, V, R>(&self, persistent: P, volatile: V, remember: R) -> StoreResult<T>
    where
        P: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        V: FnOnce(&mut VolatileFavorites) -> T,
        R: FnOnce(&mut Vec<FavoriteEntry>, &T),
        T: Send + 'static,
    {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.volatile.as_mut() {
            return Ok(volatile(session));
        }

        match self.coordinator.run(persistent).await {
            Ok(value) => {
                remember(&mut inner.last_known, &value);
                Ok(value)
            }
            Err(err) => {
                warn!(
                    "Favorites storage failed, keeping favorites in memory for this session: {}",
                    err
                );
                let mut session = VolatileFavorites::seeded(&inner.last_known);
                volatile(&mut session);
                inner.volatile = Some(session);
                Err(err)
            }
        }
    }
}

/// Session-only favorites used after storage failed.
struct VolatileFavorites {
    entries: Vec<FavoriteEntry>,
    next_id: i64,
}

impl VolatileFavorites {
    fn seeded(known: &[FavoriteEntry]) -> Self {
        let mut session = Self {
            entries: Vec::with_capacity(known.len()),
            next_id: 1,
        };
        for entry in known {
            session.add(&entry.song_id, entry.added_at);
        }
        session
    }

    fn add(&mut self, song_id: &str, added_at: i64) -> bool {
        if self.contains(song_id) {
            return false;
        }
        let floor = self.entries.last().map_or(added_at, |last| last.added_at);
        self.entries.push(FavoriteEntry {
            id: self.next_id,
            song_id: song_id.to_string(),
            added_at: added_at.max(floor),
        });
        self.next_id += 1;
        true
    }

    fn remove(&mut self, song_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.song_id != song_id);
        before - self.entries.len()
    }

    fn contains(&self, song_id: &str) -> bool {
        self.entries.iter().any(|entry| entry.song_id == song_id)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::db::ConnectionState;
    use crate::error::StoreError;

    fn store_in(dir: &tempfile::TempDir) -> FavoritesStore {
        let coordinator = PersistenceCoordinator::new(dir.path().join("favorites.sqlite"));
        FavoritesStore::new(Arc::new(coordinator))
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.add("misty").await.unwrap();
        store.add("misty").await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.list().await.unwrap(), vec!["misty".to_string()]);
    }

    #[tokio::test]
    async fn add_then_remove_clears_the_favorite() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.add("solar").await.unwrap();
        assert!(store.is_favorite("solar").await.unwrap());
        store.remove("solar").await.unwrap();
        assert!(!store.is_favorite("solar").await.unwrap());
        store.remove("solar").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_is_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        for id in ["four", "cherokee", "misty"] {
            store.add(id).await.unwrap();
        }
        store.add("four").await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["four", "cherokee", "misty"]);
        let entries = store.list_entries().await.unwrap();
        assert!(entries.windows(2).all(|pair| pair[0].added_at <= pair[1].added_at));
    }

    #[tokio::test]
    async fn added_at_never_decreases() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let future = Utc::now().timestamp_millis() + 60_000;
        store
            .coordinator()
            .run(move |conn| {
                Ok(conn.execute(
                    "INSERT INTO favorites (songId, addedAt) VALUES ('from-the-future', ?1)",
                    params![future],
                )?)
            })
            .await
            .unwrap();

        store.add("misty").await.unwrap();
        let entries = store.list_entries().await.unwrap();
        assert_eq!(entries[1].song_id, "misty");
        assert_eq!(entries[1].added_at, future);
    }

    #[tokio::test]
    async fn toggle_flips_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert!(store.toggle("giant-steps").await.unwrap());
        assert!(!store.toggle("giant-steps").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn degrades_to_memory_once_and_keeps_working() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"not a directory").unwrap();
        let coordinator = PersistenceCoordinator::new(blocker.join("favorites.sqlite"));
        let store = FavoritesStore::new(Arc::new(coordinator));

        let first = store.add("blue-monk").await;
        assert!(matches!(first, Err(StoreError::StorageUnavailable { .. })));
        assert!(store.is_degraded().await);

        store.add("blue-monk").await.unwrap();
        store.add("misty").await.unwrap();
        assert!(store.is_favorite("blue-monk").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);
        store.remove("misty").await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["blue-monk"]);
        assert!(!store.has_external_changes().await.unwrap());
        assert_eq!(store.coordinator().state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn degraded_session_starts_from_last_known_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.add("misty").await.unwrap();
        store.add("solar").await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 2);

        store.coordinator().close().await.unwrap();
        fs::remove_file(store.coordinator().path()).unwrap();
        fs::create_dir(store.coordinator().path()).unwrap();

        assert!(store.add("four").await.is_err());
        assert_eq!(store.list().await.unwrap(), vec!["misty", "solar", "four"]);
    }

    #[tokio::test]
    async fn notices_writes_from_another_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.sqlite");
        let ours = FavoritesStore::new(Arc::new(PersistenceCoordinator::new(&path)));
        let theirs = FavoritesStore::new(Arc::new(PersistenceCoordinator::new(&path)));

        assert!(!ours.has_external_changes().await.unwrap());
        ours.add("misty").await.unwrap();
        assert!(!ours.has_external_changes().await.unwrap());

        theirs.add("solar").await.unwrap();
        assert!(ours.has_external_changes().await.unwrap());
        assert!(!ours.has_external_changes().await.unwrap());
        assert_eq!(ours.list().await.unwrap(), vec!["misty", "solar"]);
    }
}
