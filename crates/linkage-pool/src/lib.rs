//! Connection pooling and scoped sessions for linkage.
//!
//! Relation operations that are not handed an explicit connection check one
//! out of a [`SessionSource`] for the duration of a single call. The checkout is
//! a [`PooledConnection`] guard: dropping it returns the connection, so the
//! connection is released on success, on error and on cancellation alike.

use asupersync::{Cx, Outcome};
use linkage_core::{Connection, Error, PoolError, PoolErrorKind, Result};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Something that can lend out a connection for one operation.
pub trait SessionSource: Send + Sync {
    /// The connection type lent out.
    type Conn: Connection;

    /// Guard giving access to the connection; releases it when dropped.
    type Session<'a>: std::ops::Deref<Target = Self::Conn> + Send
    where
        Self: 'a;

    /// Check out a connection.
    fn acquire(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Session<'_>, Error>> + Send;
}

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections allowed
    pub max_connections: usize,
    /// Maximum number of idle connections kept for reuse
    pub max_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            max_idle: 10,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with the given max connections.
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            max_idle: max_connections,
        }
    }

    /// Set the idle connection cap.
    pub fn max_idle(mut self, n: usize) -> Self {
        self.max_idle = n;
        self
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of open connections (active + idle)
    pub total_connections: usize,
    /// Number of idle connections
    pub idle_connections: usize,
    /// Number of checked-out connections
    pub active_connections: usize,
    /// Checkouts since the pool was created
    pub acquired: usize,
    /// Returns since the pool was created
    pub released: usize,
}

type Factory<C> = Box<dyn Fn() -> Result<C> + Send + Sync>;

/// A connection pool filled on demand by a factory.
pub struct Pool<C> {
    config: PoolConfig,
    factory: Factory<C>,
    idle: Mutex<Vec<C>>,
    total_connections: AtomicUsize,
    active_connections: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl<C: Connection> Pool<C> {
    /// Create a new pool that opens connections with `factory`.
    pub fn new(config: PoolConfig, factory: impl Fn() -> Result<C> + Send + Sync + 'static) -> Self {
        Self {
            config,
            factory: Box::new(factory),
            idle: Mutex::new(Vec::new()),
            total_connections: AtomicUsize::new(0),
            active_connections: AtomicUsize::new(0),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Get the current pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            idle_connections: self.idle.lock().unwrap_or_else(|e| e.into_inner()).len(),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
        }
    }

    /// Check if the pool is at capacity.
    pub fn at_capacity(&self) -> bool {
        self.total_connections.load(Ordering::Relaxed) >= self.config.max_connections
    }

    fn checkout(&self) -> Result<C> {
        let reused = self.idle.lock().unwrap_or_else(|e| e.into_inner()).pop();
        if let Some(conn) = reused {
            return Ok(conn);
        }

        // Reserve a slot before calling the factory so concurrent checkouts
        // cannot overshoot max_connections.
        let reserved = self
            .total_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.config.max_connections).then_some(n + 1)
            });
        if reserved.is_err() {
            return Err(Error::Pool(PoolError {
                kind: PoolErrorKind::Exhausted,
                message: format!(
                    "all {} connections are checked out",
                    self.config.max_connections
                ),
                source: None,
            }));
        }

        (self.factory)().map_err(|e| {
            self.total_connections.fetch_sub(1, Ordering::AcqRel);
            match e {
                Error::Pool(p) => Error::Pool(p),
                other => Error::Pool(PoolError {
                    kind: PoolErrorKind::Factory,
                    message: format!("failed to open connection: {}", other),
                    source: Some(Box::new(other)),
                }),
            }
        })
    }

    fn release(&self, conn: C) {
        self.active_connections.fetch_sub(1, Ordering::AcqRel);
        self.released.fetch_add(1, Ordering::Relaxed);
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        if idle.len() < self.config.max_idle {
            idle.push(conn);
        } else {
            drop(idle);
            self.total_connections.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!("Closing surplus idle connection");
        }
    }
}

impl<C: Connection> SessionSource for Pool<C> {
    type Conn = C;
    type Session<'a>
        = PooledConnection<'a, C>
    where
        Self: 'a;

    fn acquire(&self, _cx: &Cx) -> impl Future<Output = Outcome<Self::Session<'_>, Error>> + Send {
        // Checkout and guard construction happen in one poll with no await in
        // between, so a future dropped unpolled holds nothing.
        async move {
            match self.checkout() {
                Ok(conn) => {
                    self.active_connections.fetch_add(1, Ordering::AcqRel);
                    self.acquired.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!("Connection checked out");
                    Outcome::Ok(PooledConnection {
                        conn: Some(conn),
                        pool: self,
                    })
                }
                Err(e) => Outcome::Err(e),
            }
        }
    }
}

/// A connection borrowed from the pool.
///
/// Returned to the pool when dropped.
pub struct PooledConnection<'a, C: Connection> {
    conn: Option<C>,
    pool: &'a Pool<C>,
}

impl<C: Connection> std::ops::Deref for PooledConnection<'_, C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("connection is only taken in Drop"),
        }
    }
}

impl<C: Connection> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
            tracing::trace!("Connection returned to pool");
        }
    }
}
