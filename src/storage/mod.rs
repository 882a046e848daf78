use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::config::StorageOptions;
use crate::store::Snapshot;

mod schema;

/// Durable home of the state snapshot. Every save replaces the whole record.
pub trait SnapshotBackend {
    fn load(&self) -> Result<Option<Snapshot>>;
    fn save(&self, snapshot: &Snapshot) -> Result<()>;
    fn describe(&self) -> String;
}

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn record_name(&self) -> &str {
        &self.options.record_name
    }

    pub fn read_record(&self, name: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("reading record '{name}'"))
        })
    }

    pub fn write_record(&self, name: &str, value: &str) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn
                .unchecked_transaction()
                .context("starting record write transaction")?;
            tx.execute(
                "INSERT INTO kv_store (name, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at",
                params![name, value, OffsetDateTime::now_utc().unix_timestamp()],
            )
            .with_context(|| format!("writing record '{name}'"))?;
            tx.commit().context("committing record write")?;
            Ok(())
        })
    }

    pub fn record_updated_at(&self, name: &str) -> Result<Option<OffsetDateTime>> {
        let epoch: Option<i64> = self.with_connection(|conn| {
            conn.query_row(
                "SELECT updated_at FROM kv_store WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .context("reading record timestamp")
        })?;
        epoch
            .map(|epoch| {
                OffsetDateTime::from_unix_timestamp(epoch)
                    .with_context(|| format!("invalid record timestamp {epoch}"))
            })
            .transpose()
    }
}

impl SnapshotBackend for StorageHandle {
    fn load(&self) -> Result<Option<Snapshot>> {
        let name = self.record_name();
        let Some(raw) = self.read_record(name)? else {
            return Ok(None);
        };
        let snapshot = Snapshot::from_json(&raw)
            .with_context(|| format!("parsing stored snapshot '{name}'"))?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let json = snapshot.to_json().context("serialising state snapshot")?;
        self.write_record(self.record_name(), &json)
    }

    fn describe(&self) -> String {
        format!("{}#{}", self.db_path.display(), self.record_name())
    }
}

/// Process-local backend; snapshots live as JSON text so loads go through
/// the same serde path as the SQLite record.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryRecord>>,
}

#[derive(Debug, Default)]
struct MemoryRecord {
    value: Option<String>,
    writes: usize,
    fail_writes: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far.
    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }

    /// Makes subsequent saves fail until switched back off.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }
}

impl SnapshotBackend for MemoryStorage {
    fn load(&self) -> Result<Option<Snapshot>> {
        let raw = self.inner.lock().value.clone();
        raw.map(|raw| Snapshot::from_json(&raw).context("parsing in-memory snapshot"))
            .transpose()
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let json = snapshot.to_json().context("serialising state snapshot")?;
        let mut record = self.inner.lock();
        if record.fail_writes {
            bail!("in-memory storage rejected the write");
        }
        record.value = Some(json);
        record.writes += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

pub fn init(storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = &storage.database_path;
    if db_path.as_os_str().is_empty() {
        bail!("storage database path is not configured");
    }
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    tracing::debug!(path = %db_path.display(), "storage initialised");
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.busy_timeout(Duration::from_millis(storage.busy_timeout_ms))
        .context("setting busy timeout")?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}
