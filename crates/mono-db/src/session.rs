//! Scoped unit-of-work sessions handed out per operation.
//!
//! A [`ScopedSession`] wraps one database transaction on a pooled connection.
//! Callers finish it through [`ScopedSession::finish`], which commits on `Ok`
//! and rolls back on `Err`. A session dropped before it is finished (request
//! cancelled, task aborted, panic) rolls back as part of the drop and the
//! connection goes back to the pool; the provider counts every release.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use sqlx::{Any, AnyConnection, AnyPool, Transaction};
use tracing::{debug, warn};

use crate::{error::DbError, profile::Backend, DatabaseRole};

/// Hands out independent sessions against one database.
#[derive(Debug, Clone)]
pub struct SessionProvider {
    role: DatabaseRole,
    backend: Backend,
    pool: AnyPool,
    counters: Arc<SessionCounters>,
}

impl SessionProvider {
    pub(crate) fn new(role: DatabaseRole, backend: Backend, pool: AnyPool) -> Self {
        Self {
            role,
            backend,
            pool,
            counters: Arc::new(SessionCounters::default()),
        }
    }

    pub fn role(&self) -> DatabaseRole {
        self.role
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Exposes the underlying pool for start-up tasks such as schema bootstrap.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    /// Opens a new unit of work. Waits at most the profile's `pool_timeout`
    /// for a free connection.
    pub async fn acquire(&self) -> Result<ScopedSession, DbError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|err| map_acquire_error(self.role, err))?;
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        debug!(role = %self.role, "session acquired");

        Ok(ScopedSession {
            tx,
            backend: self.backend,
            guard: ReleaseGuard {
                role: self.role,
                counters: self.counters.clone(),
                finished: false,
            },
        })
    }

    /// Round-trips `SELECT 1` outside of any transaction.
    pub async fn ping(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|err| map_acquire_error(self.role, err))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn map_acquire_error(role: DatabaseRole, err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::PoolTimedOut => DbError::PoolTimeout { role },
        other => DbError::Sqlx(other),
    }
}

/// One unit of work against one database. Never shared between operations.
#[derive(Debug)]
pub struct ScopedSession {
    tx: Transaction<'static, Any>,
    backend: Backend,
    guard: ReleaseGuard,
}

impl ScopedSession {
    pub fn role(&self) -> DatabaseRole {
        self.guard.role
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Connection to run statements on; all of them share this transaction.
    pub fn conn(&mut self) -> &mut AnyConnection {
        &mut self.tx
    }

    /// Commits when `result` is `Ok`, rolls back otherwise, and returns the
    /// original result. A failed commit replaces an `Ok` with the commit error.
    pub async fn finish<T>(self, result: Result<T, DbError>) -> Result<T, DbError> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let role = self.role();
                if let Err(rollback_err) = self.rollback().await {
                    warn!(%role, error = %rollback_err, "rollback failed after operation error");
                }
                Err(err)
            }
        }
    }

    pub async fn commit(self) -> Result<(), DbError> {
        let Self { tx, mut guard, .. } = self;
        match tx.commit().await {
            Ok(()) => {
                guard.finish(Outcome::Committed);
                Ok(())
            }
            Err(err) => {
                guard.finish(Outcome::RolledBack);
                Err(DbError::Sqlx(err))
            }
        }
    }

    pub async fn rollback(self) -> Result<(), DbError> {
        let Self { tx, mut guard, .. } = self;
        guard.finish(Outcome::RolledBack);
        tx.rollback().await.map_err(DbError::Sqlx)
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Committed,
    RolledBack,
}

#[derive(Debug)]
struct ReleaseGuard {
    role: DatabaseRole,
    counters: Arc<SessionCounters>,
    finished: bool,
}

impl ReleaseGuard {
    fn finish(&mut self, outcome: Outcome) {
        self.finished = true;
        match outcome {
            Outcome::Committed => self.counters.committed.fetch_add(1, Ordering::SeqCst),
            Outcome::RolledBack => self.counters.rolled_back.fetch_add(1, Ordering::SeqCst),
        };
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.finished {
            // The transaction field is dropped first and queues its own rollback.
            self.counters.abandoned.fetch_add(1, Ordering::SeqCst);
            warn!(role = %self.role, "session dropped before completion; rolled back");
        }
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct SessionCounters {
    acquired: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    abandoned: AtomicU64,
    released: AtomicU64,
}

impl SessionCounters {
    fn snapshot(&self) -> SessionStats {
        SessionStats {
            acquired: self.acquired.load(Ordering::SeqCst),
            committed: self.committed.load(Ordering::SeqCst),
            rolled_back: self.rolled_back.load(Ordering::SeqCst),
            abandoned: self.abandoned.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time session accounting for one provider.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub acquired: u64,
    pub committed: u64,
    pub rolled_back: u64,
    /// Sessions dropped without commit or rollback (cancellation, panic).
    pub abandoned: u64,
    pub released: u64,
}

impl SessionStats {
    pub fn in_flight(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}
