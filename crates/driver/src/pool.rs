//! Bounded pool of sessions bound to one ledger.
//!
//! [`SessionPool::acquire`] hands out a [`PooledSession`] guard. Dropping the
//! guard returns the session to the idle list. A session the holder marked
//! invalid, or one released after the pool closed, is ended on a background
//! task instead, and the next `acquire` opens a fresh one. A semaphore bounds
//! the number of sessions checked out at once.

use std::{
    fmt,
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use quickstart_ledger::{LedgerError, LedgerName, Session, SessionService};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{
    config::PoolConfig,
    error::{DriverError, DriverResult},
};

struct PoolInner {
    service: Arc<dyn SessionService>,
    ledger: LedgerName,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn Session>>>,
    closed: AtomicBool,
}

/// A bounded pool of sessions for one ledger.
///
/// Cloning is cheap; clones share the same sessions.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("ledger", &self.inner.ledger)
            .field("config", &self.inner.config)
            .field("idle", &self.idle_count())
            .field("available", &self.available())
            .finish_non_exhaustive()
    }
}

impl SessionPool {
    /// Creates an empty pool. Sessions are opened lazily.
    #[must_use]
    pub fn new(service: Arc<dyn SessionService>, ledger: LedgerName, config: PoolConfig) -> Self {
        // Unvalidated configs must not panic inside tokio
        let permits = Arc::new(Semaphore::new(config.max_sessions().min(Semaphore::MAX_PERMITS)));
        Self {
            inner: Arc::new(PoolInner {
                service,
                ledger,
                config,
                permits,
                idle: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Number of idle sessions ready for reuse.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Number of sessions that can be checked out without waiting.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Checks out a session, reusing an idle one when possible.
    ///
    /// # Errors
    ///
    /// - [`DriverError::SessionAcquireTimeout`] if no session frees up within the
    ///   configured `acquire_timeout`
    /// - [`LedgerError::InvalidSession`] if the pool is closed
    /// - any error from opening a new session
    #[tracing::instrument(skip(self), fields(ledger = %self.inner.ledger))]
    pub async fn acquire(&self) -> DriverResult<PooledSession> {
        let waited = self.inner.config.acquire_timeout();
        let permit =
            tokio::time::timeout(waited, Arc::clone(&self.inner.permits).acquire_owned()).await;
        let permit = match permit {
            Ok(Ok(permit)) => permit,
            Ok(Err(_closed)) => {
                return Err(LedgerError::invalid_session("session pool is closed").into());
            },
            Err(_elapsed) => {
                tracing::warn!(waited_ms = waited.as_millis() as u64, "session acquire timed out");
                return Err(DriverError::SessionAcquireTimeout {
                    ledger: self.inner.ledger.to_string(),
                    waited,
                });
            },
        };

        let reused = self.inner.idle.lock().pop();
        let session = match reused {
            Some(session) => session,
            None => {
                let session = self.inner.service.start_session(self.inner.ledger.as_str()).await?;
                tracing::debug!(session = session.id(), "opened new session");
                session
            },
        };

        Ok(PooledSession {
            session: Some(session),
            pool: Arc::clone(&self.inner),
            discard: false,
            _permit: permit,
        })
    }

    /// Closes the pool and ends every idle session.
    ///
    /// Sessions still checked out are ended when their guards are released.
    #[tracing::instrument(skip(self), fields(ledger = %self.inner.ledger))]
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.permits.close();
        let idle = std::mem::take(&mut *self.inner.idle.lock());
        for session in idle {
            if let Err(err) = session.end().await {
                tracing::warn!(session = session.id(), error = %err, "failed to end session");
            }
        }
    }
}

/// A session checked out of a [`SessionPool`].
///
/// Dereferences to the session. Returned to the pool on drop, or ended if it
/// was discarded or the pool has closed.
pub struct PooledSession {
    session: Option<Box<dyn Session>>,
    pool: Arc<PoolInner>,
    discard: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    /// Marks the session as unusable so it is dropped instead of reused.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSession")
            .field("id", &self.session.as_ref().map(|s| s.id().to_owned()))
            .field("discard", &self.discard)
            .finish_non_exhaustive()
    }
}

impl Deref for PooledSession {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the session out.
        match &self.session {
            Some(session) => session.as_ref(),
            None => unreachable!("pooled session used after release"),
        }
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if !self.discard {
            // Checked under the idle lock; `close` sets the flag before draining
            let mut idle = self.pool.idle.lock();
            if !self.pool.closed.load(Ordering::SeqCst) {
                idle.push(session);
                return;
            }
        }
        end_detached(session);
    }
}

/// Ends a session that will not return to the pool.
fn end_detached(session: Box<dyn Session>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(err) = session.end().await {
                    tracing::debug!(session = session.id(), error = %err, "failed to end session");
                }
            });
        },
        Err(_) => {
            tracing::warn!(session = session.id(), "no runtime to end session, dropping it");
        },
    }
}
