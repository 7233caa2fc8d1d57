//! Command contract over a `ClusterConnection`.
//!
//! Single-key commands route by the key's slot. Multi-key reads and deletes
//! fan out per slot; multi-key writes that must be atomic (MSETNX, set
//! algebra, SMOVE, scripts) are refused unless every key shares one slot.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

use unicache_common::{CacheError, CacheResult, Expiry, Script, SetCondition, Ttl};

use crate::cluster::{hash_slot, ClusterConnection};
use crate::cmd::{self, Cmd};
use crate::contract::{require_non_empty, require_set_keys, Commands, ListEnd, SetOp};
use crate::error::ClientError;
use crate::reply::{self, Converter};
use crate::resp::RespValue;

/// Driver for a sharded deployment.
pub struct ClusterDriver {
    conn: ClusterConnection,
}

impl ClusterDriver {
    pub fn new(conn: ClusterConnection) -> Self {
        ClusterDriver { conn }
    }

    fn run<T>(&self, key: &[u8], cmd: Cmd, converter: Converter<T>) -> CacheResult<T> {
        let reply = self.conn.exec(key, &cmd)?;
        Ok(reply::convert(cmd.name(), reply, converter)?)
    }

    fn run_on_slot<T>(&self, slot: u16, cmd: Cmd, converter: Converter<T>) -> CacheResult<T> {
        let reply = self.conn.exec_on_slot(slot, &cmd)?;
        Ok(reply::convert(cmd.name(), reply, converter)?)
    }

    fn run_any<T>(&self, cmd: Cmd, converter: Converter<T>) -> CacheResult<T> {
        let reply = self.conn.exec_any(&cmd)?;
        Ok(reply::convert(cmd.name(), reply, converter)?)
    }

    /// The one key a script may touch.
    fn script_key<'a>(&self, keys: &[&'a [u8]]) -> CacheResult<&'a [u8]> {
        match keys {
            [key] => Ok(*key),
            _ => Err(CacheError::unsupported(format!(
                "cluster mode runs scripts with exactly one key, got {}",
                keys.len()
            ))),
        }
    }
}

/// Slot shared by every key, or `Unsupported` naming the command.
fn single_slot(command: &str, keys: &[&[u8]]) -> CacheResult<u16> {
    let mut slots = keys.iter().map(|key| hash_slot(key));
    let first = slots.next().unwrap_or(0);
    if slots.all(|slot| slot == first) {
        Ok(first)
    } else {
        Err(CacheError::unsupported(format!(
            "{command} keys must hash to the same slot in cluster mode"
        )))
    }
}

/// Indices of `keys` grouped by slot, in slot order.
fn group_by_slot(keys: &[&[u8]]) -> BTreeMap<u16, Vec<usize>> {
    let mut groups: BTreeMap<u16, Vec<usize>> = BTreeMap::new();
    for (idx, key) in keys.iter().enumerate() {
        groups.entry(hash_slot(key)).or_default().push(idx);
    }
    groups
}

impl Commands for ClusterDriver {
    fn driver_name(&self) -> &'static str {
        "cluster"
    }

    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        self.run(key, cmd::get(key), reply::bulk)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> CacheResult<()> {
        self.run(key, cmd::set(key, value), reply::ok)
    }

    fn set_with(
        &self,
        key: &[u8],
        value: &[u8],
        condition: SetCondition,
        expiry: Option<Expiry>,
    ) -> CacheResult<bool> {
        self.run(
            key,
            cmd::set_with_options(key, value, condition, expiry),
            reply::set_flag,
        )
    }

    fn get_set(&self, key: &[u8], value: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        self.run(key, cmd::getset(key, value), reply::bulk)
    }

    fn mget(&self, keys: &[&[u8]]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        let mut values = vec![None; keys.len()];
        for (slot, indices) in group_by_slot(keys) {
            let group: Vec<&[u8]> = indices.iter().map(|&idx| keys[idx]).collect();
            let found = self.run_on_slot(slot, cmd::mget(&group), reply::optional_bulks)?;
            if found.len() != indices.len() {
                return Err(ClientError::unexpected(b"MGET").into());
            }
            for (idx, value) in indices.into_iter().zip(found) {
                values[idx] = value;
            }
        }
        Ok(values)
    }

    fn mset(&self, pairs: &[(&[u8], &[u8])]) -> CacheResult<()> {
        let keys: Vec<&[u8]> = pairs.iter().map(|(key, _)| *key).collect();
        for (slot, indices) in group_by_slot(&keys) {
            let group: Vec<(&[u8], &[u8])> = indices.iter().map(|&idx| pairs[idx]).collect();
            self.run_on_slot(slot, cmd::mset(&group), reply::ok)?;
        }
        Ok(())
    }

    fn mset_nx(&self, pairs: &[(&[u8], &[u8])]) -> CacheResult<bool> {
        require_non_empty(pairs, "MSETNX")?;
        let keys: Vec<&[u8]> = pairs.iter().map(|(key, _)| *key).collect();
        let slot = single_slot("MSETNX", &keys)?;
        self.run_on_slot(slot, cmd::msetnx(pairs), reply::boolean)
    }

    fn incr_by(&self, key: &[u8], delta: i64) -> CacheResult<i64> {
        self.run(key, cmd::incr_by(key, delta), reply::integer)
    }

    fn incr_by_float(&self, key: &[u8], delta: f64) -> CacheResult<f64> {
        self.run(key, cmd::incr_by_float(key, delta), reply::float)
    }

    fn hget(&self, key: &[u8], field: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        self.run(key, cmd::hget(key, field), reply::bulk)
    }

    fn hmget(&self, key: &[u8], fields: &[&[u8]]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        self.run(key, cmd::hmget(key, fields), reply::optional_bulks)
    }

    fn hset(&self, key: &[u8], field: &[u8], value: &[u8]) -> CacheResult<bool> {
        self.run(key, cmd::hset(key, field, value), reply::boolean)
    }

    fn hset_nx(&self, key: &[u8], field: &[u8], value: &[u8]) -> CacheResult<bool> {
        self.run(key, cmd::hsetnx(key, field, value), reply::boolean)
    }

    fn hset_all(&self, key: &[u8], pairs: &[(&[u8], &[u8])]) -> CacheResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        self.run(key, cmd::hset_all(key, pairs), reply::count).map(|_| ())
    }

    fn hset_with_expiry(
        &self,
        key: &[u8],
        field: &[u8],
        value: &[u8],
        expiry: Expiry,
    ) -> CacheResult<()> {
        // Same key, same slot: two calls land on the same node.
        self.run(key, cmd::hset(key, field, value), reply::count)?;
        self.run(key, cmd::expire(key, expiry), reply::boolean)?;
        Ok(())
    }

    fn hdel(&self, key: &[u8], fields: &[&[u8]]) -> CacheResult<u64> {
        require_non_empty(fields, "HDEL")?;
        self.run(key, cmd::hdel(key, fields), reply::count)
    }

    fn hexists(&self, key: &[u8], field: &[u8]) -> CacheResult<bool> {
        self.run(key, cmd::hexists(key, field), reply::boolean)
    }

    fn hvals(&self, key: &[u8]) -> CacheResult<Vec<Vec<u8>>> {
        self.run(key, cmd::hvals(key), reply::bulks)
    }

    fn hkeys(&self, key: &[u8]) -> CacheResult<Vec<Vec<u8>>> {
        self.run(key, cmd::hkeys(key), reply::bulks)
    }

    fn hlen(&self, key: &[u8]) -> CacheResult<u64> {
        self.run(key, cmd::hlen(key), reply::count)
    }

    fn sadd(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64> {
        require_non_empty(members, "SADD")?;
        self.run(key, cmd::sadd(key, members), reply::count)
    }

    fn srem(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64> {
        require_non_empty(members, "SREM")?;
        self.run(key, cmd::srem(key, members), reply::count)
    }

    fn smembers(&self, key: &[u8]) -> CacheResult<Vec<Vec<u8>>> {
        self.run(key, cmd::smembers(key), reply::bulks)
    }

    fn srandmember(&self, key: &[u8], count: i64) -> CacheResult<Vec<Vec<u8>>> {
        self.run(key, cmd::srandmember(key, count), reply::bulks)
    }

    fn spop(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        self.run(key, cmd::spop(key), reply::bulk)
    }

    fn smove(&self, source: &[u8], destination: &[u8], member: &[u8]) -> CacheResult<bool> {
        let slot = single_slot("SMOVE", &[source, destination])?;
        self.run_on_slot(slot, cmd::smove(source, destination, member), reply::boolean)
    }

    fn set_algebra(&self, op: SetOp, keys: &[&[u8]]) -> CacheResult<Vec<Vec<u8>>> {
        require_set_keys(op, keys)?;
        let slot = single_slot(op.command(), keys)?;
        self.run_on_slot(slot, cmd::set_algebra(op.command(), keys), reply::bulks)
    }

    fn set_algebra_store(
        &self,
        op: SetOp,
        destination: &[u8],
        keys: &[&[u8]],
    ) -> CacheResult<u64> {
        require_set_keys(op, keys)?;
        let mut all = Vec::with_capacity(keys.len() + 1);
        all.push(destination);
        all.extend_from_slice(keys);
        let slot = single_slot(op.store_command(), &all)?;
        self.run_on_slot(
            slot,
            cmd::set_algebra_store(op.store_command(), destination, keys),
            reply::count,
        )
    }

    fn scard(&self, key: &[u8]) -> CacheResult<u64> {
        self.run(key, cmd::scard(key), reply::count)
    }

    fn zadd(&self, key: &[u8], members: &[(&[u8], f64)]) -> CacheResult<u64> {
        require_non_empty(members, "ZADD")?;
        self.run(key, cmd::zadd(key, members), reply::count)
    }

    fn zincr_by(&self, key: &[u8], member: &[u8], delta: f64) -> CacheResult<f64> {
        self.run(key, cmd::zincrby(key, member, delta), reply::float)
    }

    fn zscore(&self, key: &[u8], member: &[u8]) -> CacheResult<Option<f64>> {
        self.run(key, cmd::zscore(key, member), reply::optional_float)
    }

    fn zrange(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<Vec<Vec<u8>>> {
        self.run(key, cmd::zrange(key, start, stop, false), reply::bulks)
    }

    fn zrange_with_scores(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> CacheResult<Vec<(Vec<u8>, f64)>> {
        self.run(key, cmd::zrange(key, start, stop, true), reply::scored)
    }

    fn zrange_by_score(&self, key: &[u8], min: f64, max: f64) -> CacheResult<Vec<Vec<u8>>> {
        self.run(key, cmd::zrangebyscore(key, min, max), reply::bulks)
    }

    fn zrem(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64> {
        require_non_empty(members, "ZREM")?;
        self.run(key, cmd::zrem(key, members), reply::count)
    }

    fn zrem_range_by_rank(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<u64> {
        self.run(key, cmd::zremrangebyrank(key, start, stop), reply::count)
    }

    fn zrem_range_by_score(&self, key: &[u8], min: f64, max: f64) -> CacheResult<u64> {
        self.run(key, cmd::zremrangebyscore(key, min, max), reply::count)
    }

    fn zcard(&self, key: &[u8]) -> CacheResult<u64> {
        self.run(key, cmd::zcard(key), reply::count)
    }

    fn zcount(&self, key: &[u8], min: f64, max: f64) -> CacheResult<u64> {
        self.run(key, cmd::zcount(key, min, max), reply::count)
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
        self.run(key, cmd::push(name, key, values), reply::count)
    }

    fn pop(&self, end: ListEnd, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        self.run(key, cmd::pop(end.pop_command(), key), reply::bulk)
    }

    fn blocking_pop(
        &self,
        end: ListEnd,
        key: &[u8],
        timeout: Duration,
    ) -> CacheResult<Option<Vec<u8>>> {
        self.run(
            key,
            cmd::blocking_pop(end.blocking_pop_command(), key, timeout),
            reply::blocking_pop,
        )
    }

    fn lrange(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<Vec<Vec<u8>>> {
        self.run(key, cmd::lrange(key, start, stop), reply::bulks)
    }

    fn ltrim(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<()> {
        self.run(key, cmd::ltrim(key, start, stop), reply::ok)
    }

    fn lindex(&self, key: &[u8], index: i64) -> CacheResult<Option<Vec<u8>>> {
        self.run(key, cmd::lindex(key, index), reply::bulk)
    }

    fn lset(&self, key: &[u8], index: i64, value: &[u8]) -> CacheResult<()> {
        self.run(key, cmd::lset(key, index, value), reply::ok)
    }

    fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> CacheResult<u64> {
        self.run(key, cmd::lrem(key, count, value), reply::count)
    }

    fn llen(&self, key: &[u8]) -> CacheResult<u64> {
        self.run(key, cmd::llen(key), reply::count)
    }

    fn linsert_before(&self, key: &[u8], pivot: &[u8], value: &[u8]) -> CacheResult<i64> {
        self.run(key, cmd::linsert_before(key, pivot, value), reply::integer)
    }

    fn exists(&self, key: &[u8]) -> CacheResult<bool> {
        self.run(key, cmd::exists(key), reply::boolean)
    }

    fn del(&self, keys: &[&[u8]]) -> CacheResult<u64> {
        let mut removed = 0;
        for (slot, indices) in group_by_slot(keys) {
            let group: Vec<&[u8]> = indices.iter().map(|&idx| keys[idx]).collect();
            removed += self.run_on_slot(slot, cmd::del(&group), reply::count)?;
        }
        Ok(removed)
    }

    fn expire(&self, key: &[u8], expiry: Expiry) -> CacheResult<bool> {
        self.run(key, cmd::expire(key, expiry), reply::boolean)
    }

    fn expire_at(&self, key: &[u8], unix_millis: u64) -> CacheResult<bool> {
        self.run(key, cmd::pexpireat(key, unix_millis), reply::boolean)
    }

    fn ttl(&self, key: &[u8]) -> CacheResult<Ttl> {
        self.run(key, cmd::pttl(key), reply::integer).map(Ttl::from_pttl)
    }

    fn persist(&self, key: &[u8]) -> CacheResult<bool> {
        self.run(key, cmd::persist(key), reply::boolean)
    }

    fn eval(&self, script: &Script, keys: &[&[u8]], args: &[&[u8]]) -> CacheResult<RespValue> {
        let key = self.script_key(keys)?;
        let cmd = cmd::eval(script.source(), keys, args);
        Ok(self.conn.exec(key, &cmd)?.into_result()?)
    }

    fn eval_cached(
        &self,
        script: &Script,
        keys: &[&[u8]],
        args: &[&[u8]],
    ) -> CacheResult<RespValue> {
        let key = self.script_key(keys)?;
        // Load on the node owning the key, so EVALSHA finds it there.
        let sha = self.run(key, cmd::script_load(script.source()), reply::status)?;
        debug!(sha = %sha, "script loaded on key owner");
        script.remember_sha(sha.as_str());
        let cmd = cmd::evalsha(&sha, keys, args);
        Ok(self.conn.exec(key, &cmd)?.into_result()?)
    }

    fn keys(&self, _pattern: &[u8]) -> CacheResult<Vec<Vec<u8>>> {
        Err(CacheError::unsupported("KEYS is not supported in cluster mode"))
    }

    fn flush_db(&self) -> CacheResult<()> {
        Err(CacheError::unsupported("FLUSHDB is not supported in cluster mode"))
    }

    fn publish(&self, channel: &[u8], message: &[u8]) -> CacheResult<u64> {
        self.run_any(cmd::publish(channel, message), reply::count)
    }

    fn ping(&self) -> CacheResult<()> {
        self.run_any(cmd::ping(), reply::ok)
    }

    fn close(&self) {
        self.conn.close();
    }
}
