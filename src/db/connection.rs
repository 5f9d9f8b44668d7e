use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::{mpsc as async_mpsc, oneshot};

use super::{
    live::{LiveQueries, NightsStream},
    migrations::run_migrations,
};

/// Whether a finished task changed stored rows. Committed tasks trigger a live-query publish.
enum TaskOutcome {
    Unchanged,
    Committed,
}

type DbTask = Box<dyn FnOnce(&mut Connection) -> TaskOutcome + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Subscribe {
        sender: async_mpsc::UnboundedSender<super::NightsSnapshot>,
        ready: oneshot::Sender<Result<()>>,
    },
    CountSubscribers(oneshot::Sender<usize>),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

enum Location {
    File(PathBuf),
    Memory,
}

/// Handle to the SQLite worker thread. Cheap to clone; the thread exits when the
/// last clone drops.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Option<Arc<PathBuf>>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let inner = Self::spawn_worker(Location::File(db_path.clone()))?;
        info!("Sleep database initialized at {}", db_path.display());

        Ok(Self {
            inner,
            db_path: Some(Arc::new(db_path)),
        })
    }

    /// Private in-memory store; contents vanish with the last handle.
    pub fn in_memory() -> Result<Self> {
        let inner = Self::spawn_worker(Location::Memory)?;
        Ok(Self {
            inner,
            db_path: None,
        })
    }

    fn spawn_worker(location: Location) -> Result<Arc<DatabaseInner>> {
        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("sleeplog-db".into())
            .spawn(move || {
                let opened = match &location {
                    Location::File(path) => Connection::open(path),
                    Location::Memory => Connection::open_in_memory(),
                };
                let mut conn = match opened {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Location::File(_) = location {
                    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                        error!("Failed to enable WAL mode: {err}");
                    }
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                let mut live = LiveQueries::new();

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            if let TaskOutcome::Committed = task(&mut conn) {
                                live.publish(&conn);
                            }
                        }
                        DbCommand::Subscribe { sender, ready } => {
                            let result = live.subscribe(&conn, sender);
                            if ready.send(result).is_err() {
                                error!("Live query subscriber dropped before registration");
                            }
                        }
                        DbCommand::CountSubscribers(reply) => {
                            let _ = reply.send(live.active_count());
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        Ok(Arc::new(DatabaseInner {
            sender: command_tx,
            worker: Mutex::new(Some(worker)),
        }))
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref().map(PathBuf::as_path)
    }

    async fn dispatch<F, T>(&self, task: F, notify_on_success: bool) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            let outcome = if notify_on_success && result.is_ok() {
                TaskOutcome::Committed
            } else {
                TaskOutcome::Unchanged
            };
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
            outcome
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Runs a read-only task on the DB thread.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.dispatch(task, false).await
    }

    /// Runs a mutating task; on success every live-query subscriber receives a fresh
    /// snapshot before the next queued task runs.
    pub async fn execute_write<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.dispatch(task, true).await
    }

    pub async fn subscribe_nights(&self) -> Result<NightsStream> {
        let (sender, receiver) = async_mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        self.inner
            .sender
            .send(DbCommand::Subscribe {
                sender,
                ready: ready_tx,
            })
            .map_err(|err| anyhow!("failed to send subscription to DB thread: {err}"))?;

        ready_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))??;

        Ok(NightsStream::new(receiver))
    }

    /// Number of live-query streams still attached to the history query.
    pub async fn live_subscriber_count(&self) -> Result<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .sender
            .send(DbCommand::CountSubscribers(reply_tx))
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_parent_directory_and_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("nights.sqlite3");

        let db = Database::new(path.clone()).unwrap();

        assert!(path.exists());
        assert_eq!(db.path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn failed_write_is_not_published() {
        let db = Database::in_memory().unwrap();
        let mut stream = db.subscribe_nights().await.unwrap();
        assert!(stream.next().await.unwrap().is_empty());

        let result: Result<()> = db
            .execute_write(|_conn| Err(anyhow!("simulated failure")))
            .await;
        assert!(result.is_err());

        db.execute_write(|conn| {
            conn.execute(
                "INSERT INTO daily_sleep_quality (start_time_milli, end_time_milli)
                 VALUES (1, 1)",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        // The next emission reflects the successful insert, not the failed task.
        assert_eq!(stream.next().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dropped_stream_is_no_longer_counted() {
        let db = Database::in_memory().unwrap();
        let stream = db.subscribe_nights().await.unwrap();
        assert_eq!(db.live_subscriber_count().await.unwrap(), 1);

        drop(stream);
        assert_eq!(db.live_subscriber_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reads_do_not_publish() {
        let db = Database::in_memory().unwrap();
        let mut stream = db.subscribe_nights().await.unwrap();
        let _ = stream.next().await;

        db.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM daily_sleep_quality", [], |row| row.get(0))?;
            Ok(count)
        })
        .await
        .unwrap();

        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(50), stream.next()).await;
        assert!(pending.is_err(), "read-only task must not emit");
    }
}
