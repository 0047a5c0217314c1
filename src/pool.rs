//! Connection pool for socket transports.
//!
//! Idle connections are reused LIFO so recently used sockets stay warm. When
//! every slot is checked out, `acquire` opens a temporary connection instead
//! of blocking, so the pool size is a soft cap: it bounds idle connections,
//! while active ones may exceed it under load.
//!
//! # Example
//!
//! ```no_run
//! use transcoder_client::config::{PoolConfig, TransportConfig};
//! use transcoder_client::pool::ConnectionPool;
//!
//! let pool = ConnectionPool::new(TransportConfig::default(), PoolConfig::default())?;
//! let alive = pool.with_connection(|transport| transport.ping())?;
//! assert!(alive);
//! # Ok::<(), transcoder_client::TranscoderError>(())
//! ```

use std::collections::HashMap;
use std::os::unix::net::UnixStream;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;

use crate::config::{PoolConfig, TransportConfig};
use crate::error::Result;
use crate::transport::{SocketTransport, Stream};

/// A transport checked out of (or parked in) a pool.
#[derive(Debug)]
pub struct PooledConnection {
    id: u64,
    transport: SocketTransport,
    last_used: Instant,
    temporary: bool,
}

impl PooledConnection {
    /// Pool-unique id, assigned in creation order.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn transport(&self) -> &SocketTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut SocketTransport {
        &mut self.transport
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// True if created while the pool was saturated.
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub idle: usize,
    pub active: usize,
    pub total_created: u64,
    pub temporary_created: u64,
    pub max_pool_size: usize,
}

/// Bookkeeping for a checked-out connection.
struct ActiveEntry {
    /// Clone of the socket, used by `close_all` to force it closed.
    /// `None` while the connection is still being opened.
    handle: Option<UnixStream>,
}

struct PoolInner {
    idle: Vec<PooledConnection>,
    active: HashMap<u64, ActiveEntry>,
    next_id: u64,
    total_created: u64,
    temporary_created: u64,
}

/// Thread-safe pool of connections to one socket path.
pub struct ConnectionPool {
    transport_config: TransportConfig,
    config: PoolConfig,
    inner: Mutex<PoolInner>,
}

impl ConnectionPool {
    pub fn new(transport_config: TransportConfig, config: PoolConfig) -> Result<Self> {
        transport_config.validate()?;
        config.validate()?;

        tracing::info!(
            socket_path = %transport_config.socket_path.display(),
            max_pool_size = config.max_pool_size,
            idle_timeout = ?config.idle_timeout,
            "Connection pool created"
        );

        Ok(Self {
            transport_config,
            config,
            inner: Mutex::new(PoolInner {
                idle: Vec::new(),
                active: HashMap::new(),
                next_id: 1,
                total_created: 0,
                temporary_created: 0,
            }),
        })
    }

    /// Check out a connection.
    ///
    /// 1. Reuse the most recently parked idle connection that is still valid,
    ///    closing stale or dead ones along the way.
    /// 2. Otherwise open a new one; if the pool is saturated it is marked
    ///    temporary.
    ///
    /// Connecting happens outside the pool lock.
    pub fn acquire(&self) -> Result<PooledConnection> {
        let (id, temporary) = {
            let mut inner = self.lock();

            while let Some(mut conn) = inner.idle.pop() {
                if self.is_valid(&conn) {
                    conn.last_used = Instant::now();
                    let handle = conn.transport.shutdown_handle();
                    inner.active.insert(conn.id, ActiveEntry { handle });

                    tracing::debug!(
                        connection_id = conn.id,
                        idle = inner.idle.len(),
                        active = inner.active.len(),
                        "Reusing idle connection"
                    );
                    return Ok(conn);
                }

                tracing::debug!(connection_id = conn.id, "Closing invalid idle connection");
                conn.transport.disconnect();
            }

            let temporary = inner.active.len() >= self.config.max_pool_size;
            if temporary {
                tracing::warn!(
                    max_pool_size = self.config.max_pool_size,
                    active = inner.active.len(),
                    "Pool exhausted, creating temporary connection"
                );
            }

            // Reserve the id and the slot before connecting.
            let id = inner.next_id;
            inner.next_id += 1;
            inner.active.insert(id, ActiveEntry { handle: None });
            (id, temporary)
        };

        let transport = match SocketTransport::open(self.transport_config.clone()) {
            Ok(transport) => transport,
            Err(e) => {
                self.lock().active.remove(&id);
                return Err(e);
            }
        };

        let mut inner = self.lock();
        inner.total_created += 1;
        if temporary {
            inner.temporary_created += 1;
        }
        if let Some(entry) = inner.active.get_mut(&id) {
            entry.handle = transport.shutdown_handle();
        }

        tracing::info!(
            connection_id = id,
            temporary,
            total_created = inner.total_created,
            active = inner.active.len(),
            "New pooled connection created"
        );

        Ok(PooledConnection {
            id,
            transport,
            last_used: Instant::now(),
            temporary,
        })
    }

    /// Check a connection back in.
    ///
    /// It is parked as idle if still valid and the idle set has room;
    /// otherwise it is closed. Connections retired by [`close_all`](Self::close_all)
    /// are always closed.
    pub fn release(&self, mut conn: PooledConnection) {
        let mut inner = self.lock();

        let reason = if inner.active.remove(&conn.id).is_none() {
            Some("retired")
        } else if !self.is_valid(&conn) {
            Some("invalid")
        } else if inner.idle.len() >= self.config.max_pool_size {
            Some("pool_full")
        } else {
            None
        };

        match reason {
            None => {
                conn.last_used = Instant::now();
                tracing::debug!(
                    connection_id = conn.id,
                    idle = inner.idle.len() + 1,
                    "Connection returned to pool"
                );
                inner.idle.push(conn);
            }
            Some(reason) => {
                drop(inner);
                tracing::debug!(connection_id = conn.id, reason, "Closing connection");
                conn.transport.disconnect();
            }
        }
    }

    /// Run `f` on a checked-out transport and release it afterwards, also
    /// when `f` fails or panics. Errors from `f` are returned unchanged.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SocketTransport) -> Result<T>,
    {
        let mut conn = self.acquire()?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&mut conn.transport)));
        self.release(conn);

        match outcome {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Close idle connections unused for longer than the idle timeout.
    ///
    /// Returns the number closed.
    pub fn close_idle(&self) -> usize {
        let mut inner = self.lock();
        let idle_timeout = self.config.idle_timeout;

        let (stale, fresh): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.idle)
            .into_iter()
            .partition(|conn| conn.last_used.elapsed() > idle_timeout);
        inner.idle = fresh;
        drop(inner);

        let closed = stale.len();
        for mut conn in stale {
            conn.transport.disconnect();
        }
        if closed > 0 {
            tracing::debug!(closed, "Closed stale idle connections");
        }
        closed
    }

    /// Close every idle and active connection. Safe to call repeatedly.
    ///
    /// Active connections are shut down through their socket handle; their
    /// owners get an error on the next exchange, and `release` closes them.
    pub fn close_all(&self) {
        let mut inner = self.lock();
        let idle = std::mem::take(&mut inner.idle);
        let active = std::mem::take(&mut inner.active);
        let total_created = inner.total_created;
        drop(inner);

        let (idle_closed, active_closed) = (idle.len(), active.len());
        for mut conn in idle {
            conn.transport.disconnect();
        }
        for entry in active.into_values() {
            if let Some(handle) = entry.handle {
                Stream::shutdown(&handle);
            }
        }

        if idle_closed + active_closed > 0 {
            tracing::info!(
                idle_closed,
                active_closed,
                total_created,
                "Connection pool closed all connections"
            );
        }
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.lock();
        PoolStats {
            idle: inner.idle.len(),
            active: inner.active.len(),
            total_created: inner.total_created,
            temporary_created: inner.temporary_created,
            max_pool_size: self.config.max_pool_size,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn is_valid(&self, conn: &PooledConnection) -> bool {
        conn.last_used.elapsed() <= self.config.idle_timeout && conn.transport.is_connected()
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("socket_path", &self.transport_config.socket_path)
            .field("stats", &self.stats())
            .finish()
    }
}
