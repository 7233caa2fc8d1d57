//! # Command Contract
//!
//! Purpose: The backend-agnostic operation set every driver implements.
//!
//! Keys, fields and values cross this trait already encoded; the typed
//! `RedisClient` facade owns the codecs. Drivers only decide how each command
//! reaches the store and which commands they refuse.
//!
//! ## Conventions
//! - `bool` results mean "the operation had an effect".
//! - Counts are `u64`; set-shaped replies are deduplicated by the caller.
//! - Range and list replies keep server order.
//! - Times are `Duration`/`Expiry`, never bare integers.
//! - Capability and argument failures are raised before any network call.

use std::time::Duration;

use unicache_common::{CacheResult, Expiry, Script, SetCondition, Ttl};

use crate::resp::RespValue;

/// Set algebra operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Diff,
    Inter,
    Union,
}

impl SetOp {
    pub(crate) fn command(self) -> &'static str {
        match self {
            SetOp::Diff => "SDIFF",
            SetOp::Inter => "SINTER",
            SetOp::Union => "SUNION",
        }
    }

    pub(crate) fn store_command(self) -> &'static str {
        match self {
            SetOp::Diff => "SDIFFSTORE",
            SetOp::Inter => "SINTERSTORE",
            SetOp::Union => "SUNIONSTORE",
        }
    }
}

/// List end a push or pop operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEnd {
    Left,
    Right,
}

impl ListEnd {
    pub(crate) fn push_command(self, only_if_present: bool) -> &'static str {
        match (self, only_if_present) {
            (ListEnd::Left, false) => "LPUSH",
            (ListEnd::Left, true) => "LPUSHX",
            (ListEnd::Right, false) => "RPUSH",
            (ListEnd::Right, true) => "RPUSHX",
        }
    }

    pub(crate) fn pop_command(self) -> &'static str {
        match self {
            ListEnd::Left => "LPOP",
            ListEnd::Right => "RPOP",
        }
    }

    pub(crate) fn blocking_pop_command(self) -> &'static str {
        match self {
            ListEnd::Left => "BLPOP",
            ListEnd::Right => "BRPOP",
        }
    }
}

/// Byte-level command surface shared by the direct, cluster and generic drivers.
pub trait Commands: Send + Sync {
    /// Short driver name used in diagnostics ("direct", "cluster", "generic").
    fn driver_name(&self) -> &'static str;

    // ---- strings ---------------------------------------------------------

    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>>;

    fn set(&self, key: &[u8], value: &[u8]) -> CacheResult<()>;

    /// SET with an optional NX/XX condition and optional expiry.
    ///
    /// Returns false when the condition prevented the write.
    fn set_with(
        &self,
        key: &[u8],
        value: &[u8],
        condition: SetCondition,
        expiry: Option<Expiry>,
    ) -> CacheResult<bool>;

    /// Writes `value` and returns the previous value.
    fn get_set(&self, key: &[u8], value: &[u8]) -> CacheResult<Option<Vec<u8>>>;

    fn mget(&self, keys: &[&[u8]]) -> CacheResult<Vec<Option<Vec<u8>>>>;

    fn mset(&self, pairs: &[(&[u8], &[u8])]) -> CacheResult<()>;

    /// Writes all pairs only if none of the keys exist.
    fn mset_nx(&self, pairs: &[(&[u8], &[u8])]) -> CacheResult<bool>;

    fn incr_by(&self, key: &[u8], delta: i64) -> CacheResult<i64>;

    fn incr_by_float(&self, key: &[u8], delta: f64) -> CacheResult<f64>;

    // ---- hashes ----------------------------------------------------------

    fn hget(&self, key: &[u8], field: &[u8]) -> CacheResult<Option<Vec<u8>>>;

    fn hmget(&self, key: &[u8], fields: &[&[u8]]) -> CacheResult<Vec<Option<Vec<u8>>>>;

    /// Returns true when the field was created rather than overwritten.
    fn hset(&self, key: &[u8], field: &[u8], value: &[u8]) -> CacheResult<bool>;

    fn hset_nx(&self, key: &[u8], field: &[u8], value: &[u8]) -> CacheResult<bool>;

    fn hset_all(&self, key: &[u8], pairs: &[(&[u8], &[u8])]) -> CacheResult<()>;

    /// Sets one field and then the key's TTL. Not atomic.
    fn hset_with_expiry(
        &self,
        key: &[u8],
        field: &[u8],
        value: &[u8],
        expiry: Expiry,
    ) -> CacheResult<()>;

    fn hdel(&self, key: &[u8], fields: &[&[u8]]) -> CacheResult<u64>;

    fn hexists(&self, key: &[u8], field: &[u8]) -> CacheResult<bool>;

    fn hvals(&self, key: &[u8]) -> CacheResult<Vec<Vec<u8>>>;

    fn hkeys(&self, key: &[u8]) -> CacheResult<Vec<Vec<u8>>>;

    fn hlen(&self, key: &[u8]) -> CacheResult<u64>;

    // ---- sets ------------------------------------------------------------

    fn sadd(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64>;

    fn srem(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64>;

    fn smembers(&self, key: &[u8]) -> CacheResult<Vec<Vec<u8>>>;

    /// Positive `count` returns distinct members, negative allows repeats.
    fn srandmember(&self, key: &[u8], count: i64) -> CacheResult<Vec<Vec<u8>>>;

    fn spop(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>>;

    fn smove(&self, source: &[u8], destination: &[u8], member: &[u8]) -> CacheResult<bool>;

    /// Requires at least two keys.
    fn set_algebra(&self, op: SetOp, keys: &[&[u8]]) -> CacheResult<Vec<Vec<u8>>>;

    /// Requires at least two source keys. Returns the size of `destination`.
    fn set_algebra_store(&self, op: SetOp, destination: &[u8], keys: &[&[u8]])
        -> CacheResult<u64>;

    fn scard(&self, key: &[u8]) -> CacheResult<u64>;

    // ---- sorted sets -----------------------------------------------------

    /// Returns how many members were newly added.
    fn zadd(&self, key: &[u8], members: &[(&[u8], f64)]) -> CacheResult<u64>;

    fn zincr_by(&self, key: &[u8], member: &[u8], delta: f64) -> CacheResult<f64>;

    fn zscore(&self, key: &[u8], member: &[u8]) -> CacheResult<Option<f64>>;

    fn zrange(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<Vec<Vec<u8>>>;

    fn zrange_with_scores(&self, key: &[u8], start: i64, stop: i64)
        -> CacheResult<Vec<(Vec<u8>, f64)>>;

    fn zrange_by_score(&self, key: &[u8], min: f64, max: f64) -> CacheResult<Vec<Vec<u8>>>;

    fn zrem(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64>;

    fn zrem_range_by_rank(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<u64>;

    fn zrem_range_by_score(&self, key: &[u8], min: f64, max: f64) -> CacheResult<u64>;

    fn zcard(&self, key: &[u8]) -> CacheResult<u64>;

    fn zcount(&self, key: &[u8], min: f64, max: f64) -> CacheResult<u64>;

    // ---- lists -----------------------------------------------------------

    /// Returns the list length after the push. With `only_if_present`, a
    /// missing key is left alone and 0 is returned.
    fn push(&self, end: ListEnd, key: &[u8], values: &[&[u8]], only_if_present: bool)
        -> CacheResult<u64>;

    fn pop(&self, end: ListEnd, key: &[u8]) -> CacheResult<Option<Vec<u8>>>;

    /// Blocks up to `timeout`, rounded up to whole seconds. `Duration::ZERO`
    /// waits forever.
    fn blocking_pop(&self, end: ListEnd, key: &[u8], timeout: Duration)
        -> CacheResult<Option<Vec<u8>>>;

    fn lrange(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<Vec<Vec<u8>>>;

    fn ltrim(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<()>;

    fn lindex(&self, key: &[u8], index: i64) -> CacheResult<Option<Vec<u8>>>;

    fn lset(&self, key: &[u8], index: i64, value: &[u8]) -> CacheResult<()>;

    /// LREM semantics: positive `count` from the head, negative from the
    /// tail, zero removes every occurrence.
    fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> CacheResult<u64>;

    fn llen(&self, key: &[u8]) -> CacheResult<u64>;

    /// Returns the new length, -1 when `pivot` is absent, 0 when the key is.
    fn linsert_before(&self, key: &[u8], pivot: &[u8], value: &[u8]) -> CacheResult<i64>;

    // ---- keys ------------------------------------------------------------

    fn exists(&self, key: &[u8]) -> CacheResult<bool>;

    /// Returns how many keys were removed.
    fn del(&self, keys: &[&[u8]]) -> CacheResult<u64>;

    fn expire(&self, key: &[u8], expiry: Expiry) -> CacheResult<bool>;

    fn expire_at(&self, key: &[u8], unix_millis: u64) -> CacheResult<bool>;

    fn ttl(&self, key: &[u8]) -> CacheResult<Ttl>;

    fn persist(&self, key: &[u8]) -> CacheResult<bool>;

    // ---- scripting -------------------------------------------------------

    /// Runs the script source with EVAL.
    fn eval(&self, script: &Script, keys: &[&[u8]], args: &[&[u8]]) -> CacheResult<RespValue>;

    /// Runs the script by digest, loading it when the server lacks it.
    fn eval_cached(&self, script: &Script, keys: &[&[u8]], args: &[&[u8]])
        -> CacheResult<RespValue>;

    // ---- administrative --------------------------------------------------

    /// Keys matching `pattern`. Drivers may refuse with `Unsupported`.
    fn keys(&self, pattern: &[u8]) -> CacheResult<Vec<Vec<u8>>>;

    /// Drops every key of the current database. Drivers may refuse.
    fn flush_db(&self) -> CacheResult<()>;

    /// Returns the number of subscribers that received the message.
    fn publish(&self, channel: &[u8], message: &[u8]) -> CacheResult<u64>;

    fn ping(&self) -> CacheResult<()>;

    /// Releases pooled connections. Later calls reconnect lazily.
    fn close(&self);
}

/// Shared argument check for bulk writes that the server rejects when empty.
pub(crate) fn require_non_empty<T>(items: &[T], what: &str) -> CacheResult<()> {
    if items.is_empty() {
        return Err(unicache_common::CacheError::illegal_argument(format!(
            "{what} requires at least one element"
        )));
    }
    Ok(())
}

/// Set algebra needs two inputs to mean anything.
pub(crate) fn require_set_keys(op: SetOp, keys: &[&[u8]]) -> CacheResult<()> {
    if keys.len() < 2 {
        return Err(unicache_common::CacheError::illegal_argument(format!(
            "{} requires at least two keys, got {}",
            op.command(),
            keys.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_commands_by_end() {
        assert_eq!(ListEnd::Left.push_command(true), "LPUSHX");
        assert_eq!(ListEnd::Right.push_command(false), "RPUSH");
        assert_eq!(ListEnd::Right.blocking_pop_command(), "BRPOP");
    }

    #[test]
    fn set_algebra_needs_two_keys() {
        let err = require_set_keys(SetOp::Union, &[b"a".as_slice()]).unwrap_err();
        assert!(err.is_illegal_argument());
        assert!(err.message().contains("SUNION"));
        assert!(require_set_keys(SetOp::Diff, &[b"a".as_slice(), b"b".as_slice()]).is_ok());
    }

    #[test]
    fn empty_bulk_write_is_illegal() {
        let members: [&[u8]; 0] = [];
        assert!(require_non_empty(&members, "SADD").unwrap_err().is_illegal_argument());
    }
}
