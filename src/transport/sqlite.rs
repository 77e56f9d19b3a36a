//! SQLite-backed queue transport.
//!
//! Messages live in one table keyed by queue name. A fetch claims the oldest
//! pending message of a queue inside an immediate transaction, so several
//! worker processes can share one database file. Ack deletes the row, reject
//! marks it failed. Claimed messages that were never acked become pending
//! again after the redelivery timeout.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use crate::error::{Result, WorkerError};
use crate::id::now_micros;
use crate::transport::envelope::Envelope;
use crate::transport::receiver::{Receiver, ReceiverMap};

/// Redelivery timeout for claimed but unacknowledged messages.
pub const DEFAULT_REDELIVER_TIMEOUT: Duration = Duration::from_secs(3600);

/// Lifecycle of a queued message row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Pending,
    Delivered,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Failed => "failed",
        }
    }
}

pub struct SqliteTransport {
    path: PathBuf,
    db: Mutex<Connection>,
    redeliver_timeout: Duration,
}

impl std::fmt::Debug for SqliteTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTransport")
            .field("path", &self.path)
            .field("redeliver_timeout", &self.redeliver_timeout)
            .finish_non_exhaustive()
    }
}

impl SqliteTransport {
    /// Open or create the queue database under `dir` (as `queue.db`).
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join("queue.db");

        let db = Connection::open(&path).map_err(transport_err)?;
        db.busy_timeout(Duration::from_secs(5)).map_err(transport_err)?;
        Self::init_schema(&db)?;

        debug!("Opened queue transport at {}", path.display());
        Ok(Self {
            path,
            db: Mutex::new(db),
            redeliver_timeout: DEFAULT_REDELIVER_TIMEOUT,
        })
    }

    pub fn with_redeliver_timeout(mut self, timeout: Duration) -> Self {
        self.redeliver_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                queue_name TEXT NOT NULL,
                message_type TEXT NOT NULL,
                body TEXT NOT NULL,
                bus_name TEXT,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                delivered_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_messages_queue_status
                ON messages(queue_name, status, created_at);
            "#,
        )
        .map_err(transport_err)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| WorkerError::Transport(e.to_string()))
    }

    /// Enqueue a message on `queue`.
    pub fn send(&self, queue: &str, envelope: &Envelope) -> Result<()> {
        let body = serde_json::to_string(&envelope.body)?;
        self.lock()?
            .execute(
                r#"
                INSERT INTO messages
                (id, queue_name, message_type, body, bus_name, status, created_at, delivered_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)
                "#,
                params![
                    envelope.id,
                    queue,
                    envelope.message_type,
                    body,
                    envelope.bus_name,
                    MessageStatus::Pending.as_str(),
                    now_micros(),
                ],
            )
            .map_err(transport_err)?;

        debug!("Queued message {} on {}", envelope.id, queue);
        Ok(())
    }

    /// Claim the oldest deliverable message on `queue`, if any.
    pub fn claim(&self, queue: &str) -> Result<Option<Envelope>> {
        let now = now_micros();
        let redeliver_before =
            now - i64::try_from(self.redeliver_timeout.as_micros()).unwrap_or(i64::MAX);

        let mut db = self.lock()?;
        let tx = db
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(transport_err)?;

        let row = tx
            .query_row(
                r#"
                SELECT id, message_type, body, bus_name FROM messages
                WHERE queue_name = ?1
                  AND (status = ?2 OR (status = ?3 AND delivered_at < ?4))
                ORDER BY created_at, id
                LIMIT 1
                "#,
                params![
                    queue,
                    MessageStatus::Pending.as_str(),
                    MessageStatus::Delivered.as_str(),
                    redeliver_before,
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(transport_err)?;

        let Some((id, message_type, body, bus_name)) = row else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE messages SET status = ?1, delivered_at = ?2 WHERE id = ?3",
            params![MessageStatus::Delivered.as_str(), now, id],
        )
        .map_err(transport_err)?;
        tx.commit().map_err(transport_err)?;

        Ok(Some(Envelope {
            id,
            message_type,
            body: serde_json::from_str(&body)?,
            received_from: None,
            bus_name,
        }))
    }

    /// Remove a handled message.
    pub fn ack(&self, id: &str) -> Result<()> {
        self.lock()?
            .execute("DELETE FROM messages WHERE id = ?1", params![id])
            .map_err(transport_err)?;
        Ok(())
    }

    /// Park a failed message so it is not redelivered.
    pub fn reject(&self, id: &str) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE messages SET status = ?1 WHERE id = ?2",
                params![MessageStatus::Failed.as_str(), id],
            )
            .map_err(transport_err)?;
        Ok(())
    }

    /// Count messages on `queue` with the given status.
    pub fn count(&self, queue: &str, status: MessageStatus) -> Result<u64> {
        let count = self
            .lock()?
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE queue_name = ?1 AND status = ?2",
                params![queue, status.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .map_err(transport_err)?;
        u64::try_from(count).map_err(|e| WorkerError::Transport(e.to_string()))
    }
}

/// Receiver over one named queue of a shared transport.
#[derive(Debug, Clone)]
pub struct QueueReceiver {
    transport: Arc<SqliteTransport>,
    queue: String,
}

impl QueueReceiver {
    pub fn new(transport: Arc<SqliteTransport>, queue: impl Into<String>) -> Self {
        Self {
            transport,
            queue: queue.into(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl Receiver for QueueReceiver {
    async fn get(&self) -> Result<Vec<Envelope>> {
        Ok(self.transport.claim(&self.queue)?.into_iter().collect())
    }

    async fn ack(&self, envelope: &Envelope) -> Result<()> {
        self.transport.ack(&envelope.id)
    }

    async fn reject(&self, envelope: &Envelope) -> Result<()> {
        self.transport.reject(&envelope.id)
    }
}

/// Locator exposing each queue name as a receiver of the same name.
pub fn queue_locator<S: AsRef<str>>(transport: &Arc<SqliteTransport>, queues: &[S]) -> ReceiverMap {
    let mut map = ReceiverMap::new();
    for queue in queues {
        let queue = queue.as_ref();
        map.insert(queue, Arc::new(QueueReceiver::new(transport.clone(), queue)));
    }
    map
}

fn transport_err(err: rusqlite::Error) -> WorkerError {
    WorkerError::Transport(err.to_string())
}
