//! # Direct Single-Node Driver
//!
//! Purpose: Run the command contract against one server through a
//! `ConnectionPool`.
//!
//! ## Design Principles
//! 1. **Scoped Acquisition**: Each operation acquires a `PooledConnection`
//!    whose drop guard releases it on every exit path, errors included.
//! 2. **Pipelines for Compound Writes**: Operations with no native atomic
//!    command are queued on one connection and flushed together. This orders
//!    them back-to-back on that socket; it is not a transaction.
//! 3. **No Retries**: Failures are surfaced as `CacheError` and left to the
//!    caller.

use std::time::Duration;

use tracing::debug;

use unicache_common::{CacheResult, Expiry, Script, SetCondition, Ttl};

use crate::cmd::{self, Cmd};
use crate::contract::{require_non_empty, require_set_keys, Commands, ListEnd, SetOp};
use crate::pool::ConnectionPool;
use crate::reply::{self, Converter};
use crate::resp::RespValue;

/// Driver bound to a single node.
pub struct DirectDriver {
    pool: ConnectionPool,
}

impl DirectDriver {
    pub fn new(pool: ConnectionPool) -> Self {
        DirectDriver { pool }
    }

    fn run<T>(&self, cmd: Cmd, converter: Converter<T>) -> CacheResult<T> {
        let mut conn = self.pool.acquire()?;
        let reply = conn.exec(&cmd)?;
        Ok(reply::convert(cmd.name(), reply, converter)?)
    }

    fn run_raw(&self, cmd: Cmd) -> CacheResult<RespValue> {
        let mut conn = self.pool.acquire()?;
        Ok(conn.exec(&cmd)?.into_result()?)
    }
}

impl Commands for DirectDriver {
    fn driver_name(&self) -> &'static str {
        "direct"
    }

    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        self.run(cmd::get(key), reply::bulk)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> CacheResult<()> {
        self.run(cmd::set(key, value), reply::ok)
    }

    fn set_with(
        &self,
        key: &[u8],
        value: &[u8],
        condition: SetCondition,
        expiry: Option<Expiry>,
    ) -> CacheResult<bool> {
        self.run(
            cmd::set_with_options(key, value, condition, expiry),
            reply::set_flag,
        )
    }

    fn get_set(&self, key: &[u8], value: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        self.run(cmd::getset(key, value), reply::bulk)
    }

    fn mget(&self, keys: &[&[u8]]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.run(cmd::mget(keys), reply::optional_bulks)
    }

    fn mset(&self, pairs: &[(&[u8], &[u8])]) -> CacheResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        self.run(cmd::mset(pairs), reply::ok)
    }

    fn mset_nx(&self, pairs: &[(&[u8], &[u8])]) -> CacheResult<bool> {
        require_non_empty(pairs, "MSETNX")?;
        self.run(cmd::msetnx(pairs), reply::boolean)
    }

    fn incr_by(&self, key: &[u8], delta: i64) -> CacheResult<i64> {
        self.run(cmd::incr_by(key, delta), reply::integer)
    }

    fn incr_by_float(&self, key: &[u8], delta: f64) -> CacheResult<f64> {
        self.run(cmd::incr_by_float(key, delta), reply::float)
    }

    fn hget(&self, key: &[u8], field: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        self.run(cmd::hget(key, field), reply::bulk)
    }

    fn hmget(&self, key: &[u8], fields: &[&[u8]]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        self.run(cmd::hmget(key, fields), reply::optional_bulks)
    }

    fn hset(&self, key: &[u8], field: &[u8], value: &[u8]) -> CacheResult<bool> {
        self.run(cmd::hset(key, field, value), reply::boolean)
    }

    fn hset_nx(&self, key: &[u8], field: &[u8], value: &[u8]) -> CacheResult<bool> {
        self.run(cmd::hsetnx(key, field, value), reply::boolean)
    }

    fn hset_all(&self, key: &[u8], pairs: &[(&[u8], &[u8])]) -> CacheResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        self.run(cmd::hset_all(key, pairs), reply::count).map(|_| ())
    }

    fn hset_with_expiry(
        &self,
        key: &[u8],
        field: &[u8],
        value: &[u8],
        expiry: Expiry,
    ) -> CacheResult<()> {
        let mut pipeline = self.pool.pipeline()?;
        pipeline
            .add(cmd::hset(key, field, value))
            .add(cmd::expire(key, expiry));
        pipeline.sync_checked()?;
        Ok(())
    }

    fn hdel(&self, key: &[u8], fields: &[&[u8]]) -> CacheResult<u64> {
        require_non_empty(fields, "HDEL")?;
        self.run(cmd::hdel(key, fields), reply::count)
    }

    fn hexists(&self, key: &[u8], field: &[u8]) -> CacheResult<bool> {
        self.run(cmd::hexists(key, field), reply::boolean)
    }

    fn hvals(&self, key: &[u8]) -> CacheResult<Vec<Vec<u8>>> {
        self.run(cmd::hvals(key), reply::bulks)
    }

    fn hkeys(&self, key: &[u8]) -> CacheResult<Vec<Vec<u8>>> {
        self.run(cmd::hkeys(key), reply::bulks)
    }

    fn hlen(&self, key: &[u8]) -> CacheResult<u64> {
        self.run(cmd::hlen(key), reply::count)
    }

    fn sadd(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64> {
        require_non_empty(members, "SADD")?;
        self.run(cmd::sadd(key, members), reply::count)
    }

    fn srem(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64> {
        require_non_empty(members, "SREM")?;
        self.run(cmd::srem(key, members), reply::count)
    }

    fn smembers(&self, key: &[u8]) -> CacheResult<Vec<Vec<u8>>> {
        self.run(cmd::smembers(key), reply::bulks)
    }

    fn srandmember(&self, key: &[u8], count: i64) -> CacheResult<Vec<Vec<u8>>> {
        self.run(cmd::srandmember(key, count), reply::bulks)
    }

    fn spop(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        self.run(cmd::spop(key), reply::bulk)
    }

    fn smove(&self, source: &[u8], destination: &[u8], member: &[u8]) -> CacheResult<bool> {
        self.run(cmd::smove(source, destination, member), reply::boolean)
    }

    fn set_algebra(&self, op: SetOp, keys: &[&[u8]]) -> CacheResult<Vec<Vec<u8>>> {
        require_set_keys(op, keys)?;
        self.run(cmd::set_algebra(op.command(), keys), reply::bulks)
    }

    fn set_algebra_store(
        &self,
        op: SetOp,
        destination: &[u8],
        keys: &[&[u8]],
    ) -> CacheResult<u64> {
        require_set_keys(op, keys)?;
        self.run(
            cmd::set_algebra_store(op.store_command(), destination, keys),
            reply::count,
        )
    }

    fn scard(&self, key: &[u8]) -> CacheResult<u64> {
        self.run(cmd::scard(key), reply::count)
    }

    fn zadd(&self, key: &[u8], members: &[(&[u8], f64)]) -> CacheResult<u64> {
        require_non_empty(members, "ZADD")?;
        self.run(cmd::zadd(key, members), reply::count)
    }

    fn zincr_by(&self, key: &[u8], member: &[u8], delta: f64) -> CacheResult<f64> {
        self.run(cmd::zincrby(key, member, delta), reply::float)
    }

    fn zscore(&self, key: &[u8], member: &[u8]) -> CacheResult<Option<f64>> {
        self.run(cmd::zscore(key, member), reply::optional_float)
    }

    fn zrange(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<Vec<Vec<u8>>> {
        self.run(cmd::zrange(key, start, stop, false), reply::bulks)
    }

    fn zrange_with_scores(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> CacheResult<Vec<(Vec<u8>, f64)>> {
        self.run(cmd::zrange(key, start, stop, true), reply::scored)
    }

    fn zrange_by_score(&self, key: &[u8], min: f64, max: f64) -> CacheResult<Vec<Vec<u8>>> {
        self.run(cmd::zrangebyscore(key, min, max), reply::bulks)
    }

    fn zrem(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64> {
        require_non_empty(members, "ZREM")?;
        self.run(cmd::zrem(key, members), reply::count)
    }

    fn zrem_range_by_rank(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<u64> {
        self.run(cmd::zremrangebyrank(key, start, stop), reply::count)
    }

    fn zrem_range_by_score(&self, key: &[u8], min: f64, max: f64) -> CacheResult<u64> {
        self.run(cmd::zremrangebyscore(key, min, max), reply::count)
    }

    fn zcard(&self, key: &[u8]) -> CacheResult<u64> {
        self.run(cmd::zcard(key), reply::count)
    }

    fn zcount(&self, key: &[u8], min: f64, max: f64) -> CacheResult<u64> {
        self.run(cmd::zcount(key, min, max), reply::count)
    }

    fn push(
        &self,
        end: ListEnd,
        key: &[u8],
        values: &[&[u8]],
        only_if_present: bool,
    ) -> CacheResult<u64> {
        let name = end.push_command(only_if_present);
        require_non_empty(values, name)?;
        self.run(cmd::push(name, key, values), reply::count)
    }

    fn pop(&self, end: ListEnd, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        self.run(cmd::pop(end.pop_command(), key), reply::bulk)
    }

    fn blocking_pop(
        &self,
        end: ListEnd,
        key: &[u8],
        timeout: Duration,
    ) -> CacheResult<Option<Vec<u8>>> {
        self.run(
            cmd::blocking_pop(end.blocking_pop_command(), key, timeout),
            reply::blocking_pop,
        )
    }

    fn lrange(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<Vec<Vec<u8>>> {
        self.run(cmd::lrange(key, start, stop), reply::bulks)
    }

    fn ltrim(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<()> {
        self.run(cmd::ltrim(key, start, stop), reply::ok)
    }

    fn lindex(&self, key: &[u8], index: i64) -> CacheResult<Option<Vec<u8>>> {
        self.run(cmd::lindex(key, index), reply::bulk)
    }

    fn lset(&self, key: &[u8], index: i64, value: &[u8]) -> CacheResult<()> {
        self.run(cmd::lset(key, index, value), reply::ok)
    }

    fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> CacheResult<u64> {
        self.run(cmd::lrem(key, count, value), reply::count)
    }

    fn llen(&self, key: &[u8]) -> CacheResult<u64> {
        self.run(cmd::llen(key), reply::count)
    }

    fn linsert_before(&self, key: &[u8], pivot: &[u8], value: &[u8]) -> CacheResult<i64> {
        self.run(cmd::linsert_before(key, pivot, value), reply::integer)
    }

    fn exists(&self, key: &[u8]) -> CacheResult<bool> {
        self.run(cmd::exists(key), reply::boolean)
    }

    fn del(&self, keys: &[&[u8]]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.run(cmd::del(keys), reply::count)
    }

    fn expire(&self, key: &[u8], expiry: Expiry) -> CacheResult<bool> {
        self.run(cmd::expire(key, expiry), reply::boolean)
    }

    fn expire_at(&self, key: &[u8], unix_millis: u64) -> CacheResult<bool> {
        self.run(cmd::pexpireat(key, unix_millis), reply::boolean)
    }

    fn ttl(&self, key: &[u8]) -> CacheResult<Ttl> {
        self.run(cmd::pttl(key), reply::integer).map(Ttl::from_pttl)
    }

    fn persist(&self, key: &[u8]) -> CacheResult<bool> {
        self.run(cmd::persist(key), reply::boolean)
    }

    fn eval(&self, script: &Script, keys: &[&[u8]], args: &[&[u8]]) -> CacheResult<RespValue> {
        self.run_raw(cmd::eval(script.source(), keys, args))
    }

    fn eval_cached(
        &self,
        script: &Script,
        keys: &[&[u8]],
        args: &[&[u8]],
    ) -> CacheResult<RespValue> {
        // The server-side script cache may have been flushed since the last
        // call, so the load step always runs.
        let mut conn = self.pool.acquire()?;
        let load = cmd::script_load(script.source());
        let loaded = conn.exec(&load)?;
        let sha = reply::convert(load.name(), loaded, reply::status)?;
        debug!(sha = %sha, "script loaded");
        script.remember_sha(sha.as_str());
        Ok(conn.exec(&cmd::evalsha(&sha, keys, args))?.into_result()?)
    }

    fn keys(&self, pattern: &[u8]) -> CacheResult<Vec<Vec<u8>>> {
        self.run(cmd::keys(pattern), reply::bulks)
    }

    fn flush_db(&self) -> CacheResult<()> {
        self.run(cmd::flushdb(), reply::ok)
    }

    fn publish(&self, channel: &[u8], message: &[u8]) -> CacheResult<u64> {
        self.run(cmd::publish(channel, message), reply::count)
    }

    fn ping(&self) -> CacheResult<()> {
        self.run(cmd::ping(), reply::ok)
    }

    fn close(&self) {
        self.pool.close();
    }
}
