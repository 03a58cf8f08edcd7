// Shadow index store: one LMDB environment behind two access paths.
//
// Shared path: bounded concurrent readers (queries, existence checks).
// Exclusive path: a single writer at a time (table creation, row writes).
use heed::byteorder::BE;
use heed::types::{Bytes, Str, U64};
use heed::{Database, Env, EnvOpenOptions};
use parking_lot::{Mutex, RwLock};
use shadowvec_core::{Deadline, Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedMutexGuard, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub(crate) type TableDb = Database<U64<BE>, Bytes>;
pub(crate) type CatalogDb = Database<Str, Bytes>;

/// Catalog of shadow tables: table name -> encoded table schema.
const CATALOG_DB: &str = "__vss_catalog";

#[derive(Debug, Clone)]
pub struct ShadowPoolConfig {
    /// Concurrent operations on the shared path.
    pub max_readers: usize,
    /// Idle period after which stale reader slots are reclaimed.
    pub idle_timeout: Duration,
    /// LMDB map size in bytes.
    pub map_size: usize,
    /// Upper bound on shadow tables (one per vector-enabled collection).
    pub max_tables: u32,
    /// Empty every shadow table and the catalog on open. Needed whenever the
    /// primary store does not outlive the process, since its row ids restart.
    pub reset_on_open: bool,
}

impl Default for ShadowPoolConfig {
    fn default() -> Self {
        Self {
            max_readers: 16,
            idle_timeout: Duration::from_secs(5 * 60),
            map_size: 10 * 1024 * 1024 * 1024,
            max_tables: 1024,
            reset_on_open: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub available_readers: usize,
    pub active_writers: usize,
    pub peak_writers: usize,
    pub tables: usize,
    pub closed: bool,
}

/// Connection handed to shared-path operations.
pub struct ReadConn {
    env: Env,
    catalog: CatalogDb,
    tables: Arc<RwLock<HashMap<String, TableDb>>>,
}

impl ReadConn {
    #[inline]
    pub(crate) fn env(&self) -> &Env {
        &self.env
    }

    #[inline]
    pub(crate) fn catalog(&self) -> CatalogDb {
        self.catalog
    }

    pub(crate) fn table(&self, name: &str) -> Option<TableDb> {
        self.tables.read().get(name).cloned()
    }
}

/// Connection handed to exclusive-path operations. Only one exists at a time.
pub struct WriteConn {
    env: Env,
    catalog: CatalogDb,
    tables: Arc<RwLock<HashMap<String, TableDb>>>,
    deadline: Deadline,
}

impl WriteConn {
    #[inline]
    pub(crate) fn env(&self) -> &Env {
        &self.env
    }

    #[inline]
    pub(crate) fn catalog(&self) -> CatalogDb {
        self.catalog
    }

    pub(crate) fn table(&self, name: &str) -> Option<TableDb> {
        self.tables.read().get(name).cloned()
    }

    /// Make a table handle visible to later operations. Call only after the
    /// transaction that created it has committed.
    pub(crate) fn register_table(&self, name: &str, db: TableDb) {
        self.tables.write().insert(name.to_string(), db);
    }

    /// Commit unless the deadline has passed, in which case the transaction is
    /// aborted and the write has no effect.
    pub(crate) fn commit(&self, wtxn: heed::RwTxn<'_>) -> Result<()> {
        if self.deadline.is_expired() {
            wtxn.abort();
            return Err(Error::Timeout);
        }
        wtxn.commit().map_err(|e| Error::Storage(e.to_string()))
    }
}

/// Held by the blocking task for as long as a write closure runs.
struct WriterSlot {
    _guard: OwnedMutexGuard<()>,
    active: Arc<AtomicUsize>,
}

impl WriterSlot {
    fn enter(guard: OwnedMutexGuard<()>, active: Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self {
            _guard: guard,
            active,
        }
    }
}

impl Drop for WriterSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Process-wide shadow index store.
pub struct ShadowPool {
    env: RwLock<Option<Env>>,
    catalog: CatalogDb,
    tables: Arc<RwLock<HashMap<String, TableDb>>>,
    config: ShadowPoolConfig,
    readers: Arc<Semaphore>,
    writer: Arc<tokio::sync::Mutex<()>>,
    active_writers: Arc<AtomicUsize>,
    peak_writers: Arc<AtomicUsize>,
    last_activity: Mutex<Instant>,
    closed: AtomicBool,
}

impl ShadowPool {
    pub fn open<P: AsRef<Path>>(path: P, config: ShadowPoolConfig) -> Result<Self> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(config.map_size)
                .max_dbs(config.max_tables + 1)
                .open(path.as_ref())
                .map_err(|e| Error::Storage(e.to_string()))?
        };

        let mut wtxn = env.write_txn().map_err(|e| Error::Storage(e.to_string()))?;
        let catalog: CatalogDb = env
            .create_database(&mut wtxn, Some(CATALOG_DB))
            .map_err(|e| Error::Storage(e.to_string()))?;

        let names = catalog
            .iter(&wtxn)
            .map_err(|e| Error::Storage(e.to_string()))?
            .map(|entry| entry.map(|(name, _)| name.to_string()))
            .collect::<heed::Result<Vec<String>>>()
            .map_err(|e| Error::Storage(e.to_string()))?;

        let mut tables = HashMap::with_capacity(names.len());
        for name in names {
            let db: TableDb = env
                .create_database(&mut wtxn, Some(&name))
                .map_err(|e| Error::Storage(e.to_string()))?;
            if config.reset_on_open {
                db.clear(&mut wtxn).map_err(|e| Error::Storage(e.to_string()))?;
            } else {
                tables.insert(name, db);
            }
        }
        if config.reset_on_open {
            catalog
                .clear(&mut wtxn)
                .map_err(|e| Error::Storage(e.to_string()))?;
        }
        wtxn.commit().map_err(|e| Error::Storage(e.to_string()))?;

        info!(
            path = %path.as_ref().display(),
            tables = tables.len(),
            max_readers = config.max_readers,
            reset = config.reset_on_open,
            "shadow pool opened"
        );

        Ok(Self {
            env: RwLock::new(Some(env)),
            catalog,
            tables: Arc::new(RwLock::new(tables)),
            readers: Arc::new(Semaphore::new(config.max_readers)),
            config,
            writer: Arc::new(tokio::sync::Mutex::new(())),
            active_writers: Arc::new(AtomicUsize::new(0)),
            peak_writers: Arc::new(AtomicUsize::new(0)),
            last_activity: Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn config(&self) -> &ShadowPoolConfig {
        &self.config
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn env(&self) -> Result<Env> {
        if self.is_closed() {
            return Err(pool_closed());
        }
        self.env.read().clone().ok_or_else(pool_closed)
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Run `op` on the shared path.
    pub async fn read<T, F>(&self, op_name: &'static str, deadline: Deadline, op: F) -> Result<T>
    where
        F: FnOnce(&ReadConn) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(pool_closed());
        }
        let permit = deadline
            .run(self.readers.clone().acquire_owned())
            .await?
            .map_err(|_| pool_closed())?;

        let conn = ReadConn {
            env: self.env()?,
            catalog: self.catalog,
            tables: self.tables.clone(),
        };
        self.touch();

        let started = Instant::now();
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            op(&conn)
        });
        let result = deadline
            .run(task)
            .await?
            .map_err(|e| Error::Storage(format!("shadow read task failed: {}", e)))?;

        debug!(
            op = op_name,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            ok = result.is_ok(),
            "shadow read"
        );
        result
    }

    /// Run `op` on the exclusive path.
    ///
    /// The deadline bounds the wait for the writer slot; once `op` is running
    /// it is only consulted at commit time (see [`WriteConn`]), so a write
    /// either commits in full or leaves no trace. The slot stays taken until
    /// `op` returns, even if the returned future is dropped first.
    pub async fn write<T, F>(&self, op_name: &'static str, deadline: Deadline, op: F) -> Result<T>
    where
        F: FnOnce(&WriteConn) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(pool_closed());
        }
        let guard = deadline.run(self.writer.clone().lock_owned()).await?;
        let env = self.env()?;
        let active = self.active_writers.clone();
        let peak = self.peak_writers.clone();

        let conn = WriteConn {
            env,
            catalog: self.catalog,
            tables: self.tables.clone(),
            deadline,
        };
        self.touch();

        let started = Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            let _slot = WriterSlot::enter(guard, active, &peak);
            op(&conn)
        })
        .await
        .map_err(|e| Error::Storage(format!("shadow write task failed: {}", e)))?;

        debug!(
            op = op_name,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            ok = result.is_ok(),
            "shadow write"
        );
        result
    }

    /// Release stale reader slots once both paths have been idle for the
    /// configured period. Returns the number of slots released.
    pub fn reclaim_idle(&self) -> usize {
        let busy = self.readers.available_permits() < self.config.max_readers
            || self.active_writers.load(Ordering::SeqCst) > 0;
        if busy || self.idle_for() < self.config.idle_timeout {
            return 0;
        }
        let Ok(env) = self.env() else {
            return 0;
        };
        match env.clear_stale_readers() {
            Ok(released) => {
                debug!(released, "reclaimed idle shadow readers");
                released
            }
            Err(e) => {
                warn!(error = %e, "failed to reclaim idle shadow readers");
                0
            }
        }
    }

    /// Periodically call [`ShadowPool::reclaim_idle`] until the pool is closed or dropped.
    pub fn spawn_idle_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let pool: Weak<ShadowPool> = Arc::downgrade(self);
        let period = (self.config.idle_timeout / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(pool) = pool.upgrade() else {
                    break;
                };
                if pool.is_closed() {
                    break;
                }
                pool.reclaim_idle();
            }
        })
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            available_readers: self.readers.available_permits(),
            active_writers: self.active_writers.load(Ordering::SeqCst),
            peak_writers: self.peak_writers.load(Ordering::SeqCst),
            tables: self.tables.read().len(),
            closed: self.is_closed(),
        }
    }

    /// Wait for in-flight operations, reject new ones and close the environment.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let _writer = self.writer.lock().await;
        let all_readers = u32::try_from(self.config.max_readers).unwrap_or(u32::MAX);
        let _readers = self.readers.acquire_many(all_readers).await;
        self.readers.close();

        let env = self.env.write().take();
        if let Some(env) = env {
            let closing = env.prepare_for_closing();
            tokio::task::spawn_blocking(move || closing.wait())
                .await
                .ok();
        }
        info!("shadow pool closed");
    }
}

fn pool_closed() -> Error {
    Error::Storage("shadow pool is closed".to_string())
}
