//! Command contract over a `CacheTemplate`.
//!
//! Most operations map onto a bound operation handle. Conditional writes with
//! a TTL have no handle method, so they drop down to `execute` and build the
//! `SET key value NX|XX PX millis` arguments by hand rather than lose the TTL.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use unicache_common::{CacheResult, Expiry, Script, SetCondition, Ttl};

use crate::contract::{require_non_empty, require_set_keys, Commands, ListEnd, SetOp};
use crate::reply;
use crate::resp::RespValue;
use crate::template::{CacheTemplate, ConnectionFactory};

/// Driver for any store reachable through a `ConnectionFactory`.
pub struct GenericDriver {
    template: CacheTemplate,
}

impl GenericDriver {
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        GenericDriver {
            template: CacheTemplate::new(factory),
        }
    }

    /// Conditional SET through the raw callback, TTL included.
    fn set_raw(
        &self,
        key: &[u8],
        value: &[u8],
        condition: SetCondition,
        expiry: Option<Expiry>,
    ) -> CacheResult<bool> {
        let millis = expiry.map(|expiry| expiry.as_millis().to_string());
        let mut args: Vec<&[u8]> = vec![key, value];
        if let Some(token) = condition.token() {
            args.push(token);
        }
        if let Some(millis) = &millis {
            args.push(b"PX");
            args.push(millis.as_bytes());
        }
        let reply = self.template.execute(|conn| conn.execute("SET", &args))?;
        Ok(reply::convert(b"SET", reply, reply::set_flag)?)
    }
}

impl Commands for GenericDriver {
    fn driver_name(&self) -> &'static str {
        "generic"
    }

    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.template.ops_for_value().get(key)?)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> CacheResult<()> {
        Ok(self.template.ops_for_value().set(key, value)?)
    }

    fn set_with(
        &self,
        key: &[u8],
        value: &[u8],
        condition: SetCondition,
        expiry: Option<Expiry>,
    ) -> CacheResult<bool> {
        let ops = self.template.ops_for_value();
        let written = match (condition, expiry) {
            (SetCondition::Always, None) => {
                ops.set(key, value)?;
                true
            }
            (SetCondition::Always, Some(expiry)) => {
                ops.set_with_ttl(key, value, expiry.as_millis())?;
                true
            }
            (SetCondition::IfAbsent, None) => ops.set_if_absent(key, value)?,
            // No handle method takes a condition plus a TTL.
            (_, expiry) => return self.set_raw(key, value, condition, expiry),
        };
        Ok(written)
    }

    fn get_set(&self, key: &[u8], value: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.template.ops_for_value().get_and_set(key, value)?)
    }

    fn mget(&self, keys: &[&[u8]]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        Ok(self.template.ops_for_value().multi_get(keys)?)
    }

    fn mset(&self, pairs: &[(&[u8], &[u8])]) -> CacheResult<()> {
        Ok(self.template.ops_for_value().multi_set(pairs)?)
    }

    fn mset_nx(&self, pairs: &[(&[u8], &[u8])]) -> CacheResult<bool> {
        require_non_empty(pairs, "MSETNX")?;
        Ok(self.template.ops_for_value().multi_set_if_absent(pairs)?)
    }

    fn incr_by(&self, key: &[u8], delta: i64) -> CacheResult<i64> {
        Ok(self.template.ops_for_value().increment(key, delta)?)
    }

    fn incr_by_float(&self, key: &[u8], delta: f64) -> CacheResult<f64> {
        Ok(self.template.ops_for_value().increment_float(key, delta)?)
    }

    fn hget(&self, key: &[u8], field: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.template.bound_hash_ops(key).get(field)?)
    }

    fn hmget(&self, key: &[u8], fields: &[&[u8]]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        Ok(self.template.bound_hash_ops(key).multi_get(fields)?)
    }

    fn hset(&self, key: &[u8], field: &[u8], value: &[u8]) -> CacheResult<bool> {
        Ok(self.template.bound_hash_ops(key).put(field, value)?)
    }

    fn hset_nx(&self, key: &[u8], field: &[u8], value: &[u8]) -> CacheResult<bool> {
        Ok(self.template.bound_hash_ops(key).put_if_absent(field, value)?)
    }

    fn hset_all(&self, key: &[u8], pairs: &[(&[u8], &[u8])]) -> CacheResult<()> {
        Ok(self.template.bound_hash_ops(key).put_all(pairs)?)
    }

    fn hset_with_expiry(
        &self,
        key: &[u8],
        field: &[u8],
        value: &[u8],
        expiry: Expiry,
    ) -> CacheResult<()> {
        self.template.bound_hash_ops(key).put(field, value)?;
        self.template.expire_millis(key, expiry.as_millis())?;
        Ok(())
    }

    fn hdel(&self, key: &[u8], fields: &[&[u8]]) -> CacheResult<u64> {
        require_non_empty(fields, "HDEL")?;
        Ok(self.template.bound_hash_ops(key).delete(fields)?)
    }

    fn hexists(&self, key: &[u8], field: &[u8]) -> CacheResult<bool> {
        Ok(self.template.bound_hash_ops(key).has_key(field)?)
    }

    fn hvals(&self, key: &[u8]) -> CacheResult<Vec<Vec<u8>>> {
        Ok(self.template.bound_hash_ops(key).values()?)
    }

    fn hkeys(&self, key: &[u8]) -> CacheResult<Vec<Vec<u8>>> {
        Ok(self.template.bound_hash_ops(key).keys()?)
    }

    fn hlen(&self, key: &[u8]) -> CacheResult<u64> {
        Ok(self.template.bound_hash_ops(key).size()?)
    }

    fn sadd(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64> {
        require_non_empty(members, "SADD")?;
        Ok(self.template.bound_set_ops(key).add(members)?)
    }

    fn srem(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64> {
        require_non_empty(members, "SREM")?;
        Ok(self.template.bound_set_ops(key).remove(members)?)
    }

    fn smembers(&self, key: &[u8]) -> CacheResult<Vec<Vec<u8>>> {
        Ok(self.template.bound_set_ops(key).members()?)
    }

    fn srandmember(&self, key: &[u8], count: i64) -> CacheResult<Vec<Vec<u8>>> {
        Ok(self.template.bound_set_ops(key).random_members(count)?)
    }

    fn spop(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.template.bound_set_ops(key).pop()?)
    }

    fn smove(&self, source: &[u8], destination: &[u8], member: &[u8]) -> CacheResult<bool> {
        Ok(self.template.bound_set_ops(source).move_to(destination, member)?)
    }

    fn set_algebra(&self, op: SetOp, keys: &[&[u8]]) -> CacheResult<Vec<Vec<u8>>> {
        require_set_keys(op, keys)?;
        let (first, others) = split_first(keys);
        Ok(self.template.bound_set_ops(first).combine(op.command(), others)?)
    }

    fn set_algebra_store(
        &self,
        op: SetOp,
        destination: &[u8],
        keys: &[&[u8]],
    ) -> CacheResult<u64> {
        require_set_keys(op, keys)?;
        let (first, others) = split_first(keys);
        Ok(self
            .template
            .bound_set_ops(first)
            .combine_and_store(op.store_command(), others, destination)?)
    }

    fn scard(&self, key: &[u8]) -> CacheResult<u64> {
        Ok(self.template.bound_set_ops(key).size()?)
    }

    fn zadd(&self, key: &[u8], members: &[(&[u8], f64)]) -> CacheResult<u64> {
        require_non_empty(members, "ZADD")?;
        Ok(self.template.bound_zset_ops(key).add_all(members)?)
    }

    fn zincr_by(&self, key: &[u8], member: &[u8], delta: f64) -> CacheResult<f64> {
        Ok(self.template.bound_zset_ops(key).increment_score(member, delta)?)
    }

    fn zscore(&self, key: &[u8], member: &[u8]) -> CacheResult<Option<f64>> {
        Ok(self.template.bound_zset_ops(key).score(member)?)
    }

    fn zrange(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<Vec<Vec<u8>>> {
        Ok(self.template.bound_zset_ops(key).range(start, stop)?)
    }

    fn zrange_with_scores(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> CacheResult<Vec<(Vec<u8>, f64)>> {
        Ok(self.template.bound_zset_ops(key).range_with_scores(start, stop)?)
    }

    fn zrange_by_score(&self, key: &[u8], min: f64, max: f64) -> CacheResult<Vec<Vec<u8>>> {
        Ok(self.template.bound_zset_ops(key).range_by_score(min, max)?)
    }

    fn zrem(&self, key: &[u8], members: &[&[u8]]) -> CacheResult<u64> {
        require_non_empty(members, "ZREM")?;
        Ok(self.template.bound_zset_ops(key).remove(members)?)
    }

    fn zrem_range_by_rank(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<u64> {
        Ok(self.template.bound_zset_ops(key).remove_range(start, stop)?)
    }

    fn zrem_range_by_score(&self, key: &[u8], min: f64, max: f64) -> CacheResult<u64> {
        Ok(self.template.bound_zset_ops(key).remove_range_by_score(min, max)?)
    }

    fn zcard(&self, key: &[u8]) -> CacheResult<u64> {
        Ok(self.template.bound_zset_ops(key).size()?)
    }

    fn zcount(&self, key: &[u8], min: f64, max: f64) -> CacheResult<u64> {
        Ok(self.template.bound_zset_ops(key).count(min, max)?)
    }

    fn push(
        &self,
        end: ListEnd,
        key: &[u8],
        values: &[&[u8]],
        only_if_present: bool,
    ) -> CacheResult<u64> {
        require_non_empty(values, end.push_command(only_if_present))?;
        let ops = self.template.bound_list_ops(key);
        let pushed = match (end, only_if_present) {
            (ListEnd::Left, false) => ops.left_push_all(values)?,
            (ListEnd::Right, false) => ops.right_push_all(values)?,
            // The handles push one value at a time when the key must exist.
            (ListEnd::Left, true) => {
                let mut len = 0;
                for value in values {
                    len = ops.left_push_if_present(value)?;
                }
                len
            }
            (ListEnd::Right, true) => {
                let mut len = 0;
                for value in values {
                    len = ops.right_push_if_present(value)?;
                }
                len
            }
        };
        Ok(pushed)
    }

    fn pop(&self, end: ListEnd, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        let ops = self.template.bound_list_ops(key);
        let popped = match end {
            ListEnd::Left => ops.left_pop()?,
            ListEnd::Right => ops.right_pop()?,
        };
        Ok(popped)
    }

    fn blocking_pop(
        &self,
        end: ListEnd,
        key: &[u8],
        timeout: Duration,
    ) -> CacheResult<Option<Vec<u8>>> {
        let ops = self.template.bound_list_ops(key);
        let popped = match end {
            ListEnd::Left => ops.left_pop_timeout(timeout)?,
            ListEnd::Right => ops.right_pop_timeout(timeout)?,
        };
        Ok(popped)
    }

    fn lrange(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<Vec<Vec<u8>>> {
        Ok(self.template.bound_list_ops(key).range(start, stop)?)
    }

    fn ltrim(&self, key: &[u8], start: i64, stop: i64) -> CacheResult<()> {
        Ok(self.template.bound_list_ops(key).trim(start, stop)?)
    }

    fn lindex(&self, key: &[u8], index: i64) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.template.bound_list_ops(key).index(index)?)
    }

    fn lset(&self, key: &[u8], index: i64, value: &[u8]) -> CacheResult<()> {
        Ok(self.template.bound_list_ops(key).set(index, value)?)
    }

    fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> CacheResult<u64> {
        Ok(self.template.bound_list_ops(key).remove(count, value)?)
    }

    fn llen(&self, key: &[u8]) -> CacheResult<u64> {
        Ok(self.template.bound_list_ops(key).size()?)
    }

    fn linsert_before(&self, key: &[u8], pivot: &[u8], value: &[u8]) -> CacheResult<i64> {
        Ok(self.template.bound_list_ops(key).left_push_before(pivot, value)?)
    }

    fn exists(&self, key: &[u8]) -> CacheResult<bool> {
        Ok(self.template.has_key(key)?)
    }

    fn del(&self, keys: &[&[u8]]) -> CacheResult<u64> {
        Ok(self.template.delete(keys)?)
    }

    fn expire(&self, key: &[u8], expiry: Expiry) -> CacheResult<bool> {
        Ok(self.template.expire_millis(key, expiry.as_millis())?)
    }

    fn expire_at(&self, key: &[u8], unix_millis: u64) -> CacheResult<bool> {
        Ok(self.template.expire_at_millis(key, unix_millis)?)
    }

    fn ttl(&self, key: &[u8]) -> CacheResult<Ttl> {
        Ok(Ttl::from_pttl(self.template.pttl(key)?))
    }

    fn persist(&self, key: &[u8]) -> CacheResult<bool> {
        Ok(self.template.persist(key)?)
    }

    fn eval(&self, script: &Script, keys: &[&[u8]], args: &[&[u8]]) -> CacheResult<RespValue> {
        Ok(self.template.eval(script.source(), keys, args)?.into_result()?)
    }

    fn eval_cached(
        &self,
        script: &Script,
        keys: &[&[u8]],
        args: &[&[u8]],
    ) -> CacheResult<RespValue> {
        if let Some(sha) = script.cached_sha() {
            match self.template.eval_sha(sha, keys, args)?.into_result() {
                Err(err) if err.is_noscript() => {
                    debug!(sha, "script missing on server, reloading");
                }
                other => return Ok(other?),
            }
        }
        let sha = self.template.script_load(script.source())?;
        script.remember_sha(sha.as_str());
        Ok(self.template.eval_sha(&sha, keys, args)?.into_result()?)
    }

    fn keys(&self, pattern: &[u8]) -> CacheResult<Vec<Vec<u8>>> {
        Ok(self.template.keys(pattern)?)
    }

    fn flush_db(&self) -> CacheResult<()> {
        Ok(self.template.flush_db()?)
    }

    fn publish(&self, channel: &[u8], message: &[u8]) -> CacheResult<u64> {
        Ok(self.template.publish(channel, message)?)
    }

    fn ping(&self) -> CacheResult<()> {
        Ok(self.template.ping()?)
    }

    fn close(&self) {
        self.template.factory().close();
    }
}

fn split_first<'a, 'b>(keys: &'b [&'a [u8]]) -> (&'a [u8], &'b [&'a [u8]]) {
    match keys.split_first() {
        Some((first, rest)) => (*first, rest),
        None => (&[], keys),
    }
}
