//! # Connection-Factory Template
//!
//! Purpose: A higher-level command layer over any store reachable through a
//! `ConnectionFactory`, with per-type operation handles bound to one key.
//!
//! ## Design Principles
//! 1. **Factory Seam**: The template only needs something that hands out a
//!    `RawConnection`; the built-in `ConnectionPool` is one such factory, an
//!    in-memory fake is another.
//! 2. **Callback Escape Hatch**: `execute` lends one connection to a closure
//!    for commands the bound handles do not cover.
//! 3. **Scoped Connections**: A connection lives exactly as long as one
//!    handle call or one `execute` closure.

mod driver;
mod ops;

use std::sync::Arc;

use crate::cmd::Cmd;
use crate::error::ClientResult;
use crate::pool::{ConnectionPool, PooledConnection};
use crate::reply::{self, Converter};
use crate::resp::RespValue;

pub(crate) use driver::GenericDriver;
pub use ops::{BoundHashOps, BoundListOps, BoundSetOps, BoundZSetOps, ValueOps};

/// A connection that accepts a command name plus raw arguments.
pub trait RawConnection {
    /// Sends one command and returns its reply, error replies included.
    fn execute(&mut self, command: &str, args: &[&[u8]]) -> ClientResult<RespValue>;
}

/// Source of connections for the template.
pub trait ConnectionFactory: Send + Sync {
    fn get_connection(&self) -> ClientResult<Box<dyn RawConnection + '_>>;

    /// Releases pooled resources. Default: nothing to release.
    fn close(&self) {}
}

impl RawConnection for PooledConnection {
    fn execute(&mut self, command: &str, args: &[&[u8]]) -> ClientResult<RespValue> {
        self.exec(&Cmd::new(command).args(args))
    }
}

impl ConnectionFactory for ConnectionPool {
    fn get_connection(&self) -> ClientResult<Box<dyn RawConnection + '_>> {
        Ok(Box::new(self.acquire()?))
    }

    fn close(&self) {
        ConnectionPool::close(self);
    }
}

/// Command template over a shared connection factory.
#[derive(Clone)]
pub struct CacheTemplate {
    factory: Arc<dyn ConnectionFactory>,
}

impl CacheTemplate {
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        CacheTemplate { factory }
    }

    pub fn factory(&self) -> &Arc<dyn ConnectionFactory> {
        &self.factory
    }

    /// Lends one connection to `action`; it is released when `action` returns.
    pub fn execute<T, F>(&self, action: F) -> ClientResult<T>
    where
        F: FnOnce(&mut dyn RawConnection) -> ClientResult<T>,
    {
        let mut conn = self.factory.get_connection()?;
        action(conn.as_mut())
    }

    pub(crate) fn call<T>(
        &self,
        command: &str,
        args: &[&[u8]],
        converter: Converter<T>,
    ) -> ClientResult<T> {
        let reply = self.execute(|conn| conn.execute(command, args))?;
        reply::convert(command.as_bytes(), reply, converter)
    }

    pub fn ops_for_value(&self) -> ValueOps<'_> {
        ValueOps::new(self)
    }

    pub fn bound_hash_ops<'a>(&'a self, key: &'a [u8]) -> BoundHashOps<'a> {
        BoundHashOps::new(self, key)
    }

    pub fn bound_set_ops<'a>(&'a self, key: &'a [u8]) -> BoundSetOps<'a> {
        BoundSetOps::new(self, key)
    }

    pub fn bound_zset_ops<'a>(&'a self, key: &'a [u8]) -> BoundZSetOps<'a> {
        BoundZSetOps::new(self, key)
    }

    pub fn bound_list_ops<'a>(&'a self, key: &'a [u8]) -> BoundListOps<'a> {
        BoundListOps::new(self, key)
    }

    // ---- key-level -------------------------------------------------------

    pub fn has_key(&self, key: &[u8]) -> ClientResult<bool> {
        self.call("EXISTS", &[key], reply::boolean)
    }

    pub fn delete(&self, keys: &[&[u8]]) -> ClientResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.call("DEL", keys, reply::count)
    }

    pub fn expire_millis(&self, key: &[u8], millis: u64) -> ClientResult<bool> {
        let millis = millis.to_string();
        self.call("PEXPIRE", &[key, millis.as_bytes()], reply::boolean)
    }

    pub fn expire_at_millis(&self, key: &[u8], unix_millis: u64) -> ClientResult<bool> {
        let at = unix_millis.to_string();
        self.call("PEXPIREAT", &[key, at.as_bytes()], reply::boolean)
    }

    /// Raw PTTL reply: milliseconds, -1 without expiry, -2 when missing.
    pub fn pttl(&self, key: &[u8]) -> ClientResult<i64> {
        self.call("PTTL", &[key], reply::integer)
    }

    pub fn persist(&self, key: &[u8]) -> ClientResult<bool> {
        self.call("PERSIST", &[key], reply::boolean)
    }

    pub fn keys(&self, pattern: &[u8]) -> ClientResult<Vec<Vec<u8>>> {
        self.call("KEYS", &[pattern], reply::bulks)
    }

    pub fn flush_db(&self) -> ClientResult<()> {
        self.call("FLUSHDB", &[], reply::ok)
    }

    pub fn publish(&self, channel: &[u8], message: &[u8]) -> ClientResult<u64> {
        self.call("PUBLISH", &[channel, message], reply::count)
    }

    pub fn ping(&self) -> ClientResult<()> {
        self.call("PING", &[], reply::ok)
    }

    // ---- scripting -------------------------------------------------------

    /// EVAL; error replies stay in the returned value.
    pub fn eval(&self, source: &str, keys: &[&[u8]], args: &[&[u8]]) -> ClientResult<RespValue> {
        self.run_script("EVAL", source.as_bytes(), keys, args)
    }

    /// EVALSHA; error replies (NOSCRIPT included) stay in the returned value.
    pub fn eval_sha(&self, sha: &str, keys: &[&[u8]], args: &[&[u8]]) -> ClientResult<RespValue> {
        self.run_script("EVALSHA", sha.as_bytes(), keys, args)
    }

    pub fn script_load(&self, source: &str) -> ClientResult<String> {
        self.call("SCRIPT", &[b"LOAD".as_slice(), source.as_bytes()], reply::status)
    }

    fn run_script(
        &self,
        command: &str,
        script: &[u8],
        keys: &[&[u8]],
        args: &[&[u8]],
    ) -> ClientResult<RespValue> {
        let numkeys = keys.len().to_string();
        let mut argv: Vec<&[u8]> = Vec::with_capacity(2 + keys.len() + args.len());
        argv.push(script);
        argv.push(numkeys.as_bytes());
        argv.extend_from_slice(keys);
        argv.extend_from_slice(args);
        self.execute(|conn| conn.execute(command, &argv))
    }
}
