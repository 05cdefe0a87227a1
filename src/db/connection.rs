use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OpenFlags, TransactionBehavior};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::schema::{ensure_schema, has_favorites_table};
use crate::error::{StoreError, StoreResult};
use crate::models::FavoriteEntry;

/// How long a statement waits for another context holding the write lock
/// before giving up with `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of the coordinator's single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Opening,
    Ready,
    /// The last open attempt or operation hit a connection-level fault. The
    /// next call reopens the file.
    Failed,
}

/// Owns the one database connection used by this process.
///
/// Calls are queued on a fair mutex and run one at a time, in submission
/// order, on tokio's blocking pool. Other processes opening the same file get
/// their own coordinator; consistency between them relies on every write
/// being a single SQL statement rather than on any lock held here.
pub struct PersistenceCoordinator {
    path: PathBuf,
    slot: Mutex<Option<Connection>>,
    state: watch::Sender<ConnectionState>,
    opens: AtomicUsize,
}

impl PersistenceCoordinator {
    /// Create a handle for the database at `path`. Nothing touches the disk
    /// until the first call.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            path: path.into(),
            slot: Mutex::new(None),
            state,
            opens: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Number of physical opens performed so far, reopens included.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Open (or create) the database and apply the schema. Calling this while
    /// the connection is already ready is a no-op.
    pub async fn open(&self) -> StoreResult<()> {
        let mut slot = self.slot.lock().await;
        self.ensure_open(&mut slot).await
    }

    /// Close the connection. A later call opens it again.
    pub async fn close(&self) -> StoreResult<()> {
        let mut slot = self.slot.lock().await;
        let Some(conn) = slot.take() else {
            self.state.send_replace(ConnectionState::Closed);
            return Ok(());
        };

        let closed = tokio::task::spawn_blocking(move || conn.close()).await;
        self.state.send_replace(ConnectionState::Closed);
        match closed {
            Ok(Ok(())) => {
                info!("Closed favorites database {}", self.path.display());
                Ok(())
            }
            Ok(Err((_conn, err))) => Err(StoreError::StorageIo(err)),
            Err(err) => Err(StoreError::Worker(err.to_string())),
        }
    }

    /// Run `op` against the connection, opening it first when needed.
    ///
    /// Connection-level faults drop the connection and mark it failed so the
    /// next call starts from a fresh open.
    pub async fn run<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut slot = self.slot.lock().await;
        self.ensure_open(&mut slot).await?;
        let Some(mut conn) = slot.take() else {
            return Err(StoreError::Worker("connection missing after open".into()));
        };

        let outcome = tokio::task::spawn_blocking(move || {
            let result = op(&mut conn);
            (conn, result)
        })
        .await;

        match outcome {
            Ok((conn, Ok(value))) => {
                *slot = Some(conn);
                Ok(value)
            }
            Ok((conn, Err(err))) => {
                if is_connection_fault(&err) {
                    warn!(
                        "Dropping favorites connection after fault, will reopen: {}",
                        err
                    );
                    drop(conn);
                    self.state.send_replace(ConnectionState::Failed);
                } else {
                    *slot = Some(conn);
                }
                Err(err)
            }
            Err(err) => {
                self.state.send_replace(ConnectionState::Failed);
                Err(StoreError::Worker(err.to_string()))
            }
        }
    }

    /// Serialize the whole database into a byte blob.
    pub async fn export(&self) -> StoreResult<Vec<u8>> {
        self.run(|conn| {
            let dir = tempfile::tempdir()?;
            let target = dir.path().join("snapshot.sqlite");
            conn.execute(
                "VACUUM INTO ?1",
                params![target.to_string_lossy().into_owned()],
            )?;
            let bytes = fs::read(&target)?;
            debug!("Exported favorites snapshot of {} bytes", bytes.len());
            Ok(bytes)
        })
        .await
    }

    /// Replace the favorites table with the rows held in `blob`, which must
    /// come from [`PersistenceCoordinator::export`] (or any database with a
    /// compatible favorites table). Returns the number of rows restored.
    pub async fn import_from(&self, blob: Vec<u8>) -> StoreResult<usize> {
        self.run(move |conn| {
            let dir = tempfile::tempdir()?;
            let source = dir.path().join("import.sqlite");
            fs::write(&source, &blob)?;
            let rows = read_snapshot(&source)?;

            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute("DELETE FROM favorites", [])?;
            let mut restored = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO favorites (id, songId, addedAt) VALUES (?1, ?2, ?3)",
                )?;
                for row in &rows {
                    restored += stmt.execute(params![row.id, row.song_id, row.added_at])?;
                }
            }
            tx.commit()?;
            info!("Imported {} favorites from snapshot", restored);
            Ok(restored)
        })
        .await
    }

    /// SQLite's `data_version`, which changes whenever another connection
    /// commits to the file.
    pub async fn data_version(&self) -> StoreResult<i64> {
        self.run(|conn| Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?))
            .await
    }

    async fn ensure_open(&self, slot: &mut Option<Connection>) -> StoreResult<()> {
        if slot.is_some() {
            return Ok(());
        }

        self.state.send_replace(ConnectionState::Opening);
        self.opens.fetch_add(1, Ordering::SeqCst);
        let path = self.path.clone();
        let opened = tokio::task::spawn_blocking(move || open_connection(&path)).await;

        match opened {
            Ok(Ok(conn)) => {
                *slot = Some(conn);
                self.state.send_replace(ConnectionState::Ready);
                info!("Opened favorites database {}", self.path.display());
                Ok(())
            }
            Ok(Err(err)) => {
                self.state.send_replace(ConnectionState::Failed);
                warn!("Failed to open favorites database: {}", err);
                Err(err)
            }
            Err(err) => {
                self.state.send_replace(ConnectionState::Failed);
                Err(StoreError::Worker(err.to_string()))
            }
        }
    }
}

fn open_connection(path: &Path) -> StoreResult<Connection> {
    let unavailable = |reason: String| StoreError::StorageUnavailable {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| unavailable(format!("failed to create data directory: {err}")))?;
    }

    let mut conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| unavailable(err.to_string()))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|err| unavailable(err.to_string()))?;

    // SQLite opens lazily; a file that is not a database only fails on read.
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })
    .map_err(|err| unavailable(err.to_string()))?;

    if let Err(err) = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
        row.get::<_, String>(0)
    }) {
        warn!("Could not switch favorites database to WAL: {}", err);
    }

    ensure_schema(&mut conn)?;
    Ok(conn)
}

/// Read every favorites row out of a snapshot file.
fn read_snapshot(path: &Path) -> StoreResult<Vec<FavoriteEntry>> {
    let invalid = |err: rusqlite::Error| StoreError::InvalidSnapshot(err.to_string());

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(invalid)?;
    if !has_favorites_table(&conn).map_err(invalid)? {
        return Err(StoreError::InvalidSnapshot(
            "no favorites table in snapshot".into(),
        ));
    }

    let mut stmt = conn
        .prepare("SELECT id, songId, addedAt FROM favorites ORDER BY id")
        .map_err(invalid)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FavoriteEntry {
                id: row.get(0)?,
                song_id: row.get(1)?,
                added_at: row.get(2)?,
            })
        })
        .map_err(invalid)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(invalid)?;
    Ok(rows)
}

/// Faults that make the connection itself suspect, as opposed to a single
/// statement failing.
fn is_connection_fault(err: &StoreError) -> bool {
    match err {
        StoreError::StorageIo(sql) => matches!(
            sql.sqlite_error_code(),
            Some(
                ErrorCode::DatabaseCorrupt
                    | ErrorCode::NotADatabase
                    | ErrorCode::DiskFull
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::CannotOpen
                    | ErrorCode::ReadOnly
            )
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn coordinator(dir: &tempfile::TempDir) -> PersistenceCoordinator {
        PersistenceCoordinator::new(dir.path().join("nested").join("favorites.sqlite"))
    }

    async fn row_count(coordinator: &PersistenceCoordinator) -> i64 {
        coordinator
            .run(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM favorites", [], |r| r.get(0))?))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn opens_lazily_and_creates_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        assert_eq!(coordinator.state(), ConnectionState::Closed);
        assert!(!coordinator.path().exists());

        assert_eq!(row_count(&coordinator).await, 0);
        assert_eq!(coordinator.state(), ConnectionState::Ready);
        assert!(coordinator.path().exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_opens_share_one_physical_open() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = Arc::new(coordinator(&dir));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move { coordinator.open().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(coordinator.open_count(), 1);
        assert_eq!(coordinator.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn close_then_reuse_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        coordinator.open().await.unwrap();
        coordinator.close().await.unwrap();
        assert_eq!(coordinator.state(), ConnectionState::Closed);

        assert_eq!(row_count(&coordinator).await, 0);
        assert_eq!(coordinator.open_count(), 2);
    }

    #[tokio::test]
    async fn unopenable_path_is_unavailable_and_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"plain file").unwrap();
        let coordinator = PersistenceCoordinator::new(blocker.join("favorites.sqlite"));

        let err = coordinator.open().await.unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable { .. }));
        assert_eq!(coordinator.state(), ConnectionState::Failed);

        fs::remove_file(&blocker).unwrap();
        coordinator.open().await.unwrap();
        assert_eq!(coordinator.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn garbage_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.sqlite");
        fs::write(&path, vec![0xAB; 4096]).unwrap();

        let coordinator = PersistenceCoordinator::new(&path);
        assert!(matches!(
            coordinator.open().await,
            Err(StoreError::StorageUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn failed_schema_marks_the_connection_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.sqlite");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("CREATE TABLE favorites_song_id (x INTEGER)", [])
                .unwrap();
        }

        let coordinator = PersistenceCoordinator::new(&path);
        assert!(matches!(
            coordinator.open().await,
            Err(StoreError::Schema(_))
        ));
        assert_eq!(coordinator.state(), ConnectionState::Failed);

        let conn = Connection::open(&path).unwrap();
        assert!(!has_favorites_table(&conn).unwrap());
    }

    #[tokio::test]
    async fn statement_errors_keep_the_connection() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);

        let result = coordinator
            .run(|conn| Ok(conn.execute("INSERT INTO missing_table VALUES (1)", [])?))
            .await;
        assert!(matches!(result, Err(StoreError::StorageIo(_))));
        assert_eq!(coordinator.state(), ConnectionState::Ready);
        assert_eq!(coordinator.open_count(), 1);
    }

    #[tokio::test]
    async fn export_and_import_round_trip_rows() {
        let dir = tempfile::tempdir().unwrap();
        let source = coordinator(&dir);
        source
            .run(|conn| {
                for i in 0..5 {
                    conn.execute(
                        "INSERT INTO favorites (songId, addedAt) VALUES (?1, ?2)",
                        params![format!("song-{i}"), i],
                    )?;
                }
                Ok(())
            })
            .await
            .unwrap();

        let blob = source.export().await.unwrap();
        assert!(blob.starts_with(b"SQLite format 3\0"));

        let target = PersistenceCoordinator::new(dir.path().join("restored.sqlite"));
        assert_eq!(target.import_from(blob).await.unwrap(), 5);
        assert_eq!(row_count(&target).await, 5);
    }

    #[tokio::test]
    async fn import_rejects_invalid_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);

        let garbage = coordinator.import_from(vec![0x42; 2048]).await;
        assert!(matches!(garbage, Err(StoreError::InvalidSnapshot(_))));

        let empty = coordinator.import_from(Vec::new()).await;
        assert!(matches!(empty, Err(StoreError::InvalidSnapshot(_))));

        assert_eq!(coordinator.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn data_version_moves_when_another_connection_commits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.sqlite");
        let first = PersistenceCoordinator::new(&path);
        let second = PersistenceCoordinator::new(&path);
        first.open().await.unwrap();
        second.open().await.unwrap();

        let before = first.data_version().await.unwrap();
        second
            .run(|conn| {
                Ok(conn.execute(
                    "INSERT INTO favorites (songId, addedAt) VALUES ('misty', 1)",
                    [],
                )?)
            })
            .await
            .unwrap();
        let after = first.data_version().await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn state_changes_are_observable() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir);
        let mut states = coordinator.subscribe();

        coordinator.open().await.unwrap();
        states.changed().await.unwrap();
        assert_eq!(*states.borrow_and_update(), ConnectionState::Ready);
    }
}
