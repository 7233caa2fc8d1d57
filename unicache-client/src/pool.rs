//! # Connection Pool
//!
//! Purpose: Reuse TCP connections for the drivers to reduce handshake
//! latency and allocation churn.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving idle connections.
//! 3. **Fail Fast**: Exceeding the pool limit returns an error immediately.
//! 4. **Cache-Friendly Buffers**: Each connection reuses its own buffers.
//! 5. **Scoped Release**: `PooledConnection` returns itself on drop, so every
//!    exit path of a command releases its connection.

use std::collections::VecDeque;
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cmd::Cmd;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::pipeline::Pipeline;
use crate::resp::{read_response, RespValue};

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
}

struct PoolInner {
    config: ClientConfig,
    state: Mutex<PoolState>,
}

/// Connection pool handle for one server node.
///
/// Cloning is cheap and shares the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates a new connection pool. Connections are opened lazily.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        if config.max_total == 0 {
            return Err(ClientError::InvalidAddress(format!(
                "{}: max_total must be at least 1",
                config.addr
            )));
        }
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
        };
        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
            }),
        })
    }

    /// Address this pool connects to.
    pub fn addr(&self) -> &str {
        &self.inner.config.addr
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Acquires a connection from the pool.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        if let Some(conn) = self.pop_idle() {
            return Ok(PooledConnection::new(self.inner.clone(), conn));
        }

        if !self.try_reserve() {
            return Err(ClientError::PoolExhausted {
                addr: self.inner.config.addr.clone(),
            });
        }

        match Connection::connect(&self.inner.config) {
            Ok(conn) => Ok(PooledConnection::new(self.inner.clone(), conn)),
            Err(err) => {
                self.release_slot();
                Err(err)
            }
        }
    }

    /// Acquires a connection and wraps it in a pipeline.
    pub fn pipeline(&self) -> ClientResult<Pipeline> {
        Ok(Pipeline::new(self.acquire()?))
    }

    /// Drops every idle connection. In-use connections close when released.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        let dropped = state.idle.len();
        state.total = state.total.saturating_sub(dropped);
        state.idle.clear();
        debug!(addr = %self.inner.config.addr, dropped, "pool closed");
    }

    /// Number of connections currently open (idle + in-use).
    pub fn open_connections(&self) -> usize {
        self.inner.state.lock().total
    }

    fn pop_idle(&self) -> Option<Connection> {
        let mut state = self.inner.state.lock();
        state.idle.pop_front()
    }

    fn try_reserve(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.total >= self.inner.config.max_total {
            return false;
        }
        state.total += 1;
        true
    }

    fn release_slot(&self) {
        let mut state = self.inner.state.lock();
        state.total = state.total.saturating_sub(1);
    }

    fn return_connection(&self, conn: Connection) {
        let mut state = self.inner.state.lock();
        if state.idle.len() < self.inner.config.max_idle {
            state.idle.push_back(conn);
        } else {
            state.total = state.total.saturating_sub(1);
        }
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Executes one command and returns the parsed response.
    ///
    /// Error replies are returned as `RespValue::Error`; callers decide how
    /// to surface them.
    pub fn exec(&mut self, cmd: &Cmd) -> ClientResult<RespValue> {
        let result = match self.conn.as_mut() {
            Some(conn) => conn.exec_batch(std::slice::from_ref(cmd)),
            None => Err(ClientError::Protocol("connection already released")),
        };
        self.track(result)
            .map(|mut replies| replies.pop().unwrap_or(RespValue::Bulk(None)))
    }

    /// Writes every command in one flush, then reads one reply per command.
    pub fn exec_batch(&mut self, cmds: &[Cmd]) -> ClientResult<Vec<RespValue>> {
        let result = match self.conn.as_mut() {
            Some(conn) => conn.exec_batch(cmds),
            None => Err(ClientError::Protocol("connection already released")),
        };
        self.track(result)
    }

    pub fn addr(&self) -> &str {
        &self.pool.config.addr
    }

    fn track<T>(&mut self, result: ClientResult<T>) -> ClientResult<T> {
        if let Err(err) = &result {
            if err.breaks_connection() {
                // If IO/protocol fails, do not return this connection to the pool.
                self.valid = false;
            }
        }
        result
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        let pool = ConnectionPool {
            inner: self.pool.clone(),
        };

        if self.valid {
            pool.return_connection(conn);
        } else {
            warn!(addr = %self.pool.config.addr, "discarding broken connection");
            pool.release_slot();
        }
    }
}

/// Single TCP connection with reusable buffers.
///
/// The buffers are stored on the connection to avoid per-call allocations.
pub struct Connection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl Connection {
    fn connect(config: &ClientConfig) -> ClientResult<Self> {
        let stream = connect_stream(config)?;
        if let Some(timeout) = config.read_timeout {
            stream.set_read_timeout(Some(timeout))?;
        }
        if let Some(timeout) = config.write_timeout {
            stream.set_write_timeout(Some(timeout))?;
        }
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;

        let mut conn = Connection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
        };
        conn.handshake(config)?;
        debug!(addr = %config.addr, "connection established");
        Ok(conn)
    }

    fn handshake(&mut self, config: &ClientConfig) -> ClientResult<()> {
        if let Some(password) = &config.password {
            let auth = match &config.username {
                Some(user) => Cmd::new("AUTH").arg(user).arg(password),
                None => Cmd::new("AUTH").arg(password),
            };
            self.exec_checked(&auth)?;
        }
        if config.database != 0 {
            self.exec_checked(&Cmd::new("SELECT").uint(u64::from(config.database)))?;
        }
        Ok(())
    }

    fn exec_checked(&mut self, cmd: &Cmd) -> ClientResult<()> {
        let mut replies = self.exec_batch(std::slice::from_ref(cmd))?;
        match replies.pop() {
            Some(RespValue::Simple(_)) => Ok(()),
            Some(RespValue::Error(message)) => Err(ClientError::Server { message }),
            _ => Err(ClientError::unexpected(cmd.name())),
        }
    }

    fn exec_batch(&mut self, cmds: &[Cmd]) -> ClientResult<Vec<RespValue>> {
        self.write_buf.clear();
        for cmd in cmds {
            cmd.encode(&mut self.write_buf);
        }

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        let mut replies = Vec::with_capacity(cmds.len());
        for _ in cmds {
            replies.push(read_response(&mut self.reader, &mut self.line_buf)?);
        }
        Ok(replies)
    }
}

fn connect_stream(config: &ClientConfig) -> ClientResult<TcpStream> {
    let addr = resolve(&config.addr)?;
    let stream = match config.connect_timeout {
        Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
        None => TcpStream::connect(addr)?,
    };
    Ok(stream)
}

fn resolve(addr: &str) -> ClientResult<SocketAddr> {
    if let Ok(parsed) = addr.parse() {
        return Ok(parsed);
    }
    addr.to_socket_addrs()
        .map_err(|_| ClientError::InvalidAddress(addr.to_string()))?
        .next()
        .ok_or_else(|| ClientError::InvalidAddress(addr.to_string()))
}

