//! Operation handles returned by `CacheTemplate`.
//!
//! `ValueOps` covers string commands across keys; the `Bound*Ops` handles
//! carry one key and expose the commands of its data type.

use std::time::Duration;

use crate::cmd::{blocking_timeout_secs, format_float};
use crate::error::ClientResult;
use crate::reply;
use crate::template::CacheTemplate;

/// String commands.
pub struct ValueOps<'a> {
    template: &'a CacheTemplate,
}

impl<'a> ValueOps<'a> {
    pub(crate) fn new(template: &'a CacheTemplate) -> Self {
        ValueOps { template }
    }

    pub fn get(&self, key: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        self.template.call("GET", &[key], reply::bulk)
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        self.template.call("SET", &[key, value], reply::ok)
    }

    /// PSETEX: value plus a TTL in milliseconds.
    pub fn set_with_ttl(&self, key: &[u8], value: &[u8], millis: u64) -> ClientResult<()> {
        let millis = millis.to_string();
        self.template
            .call("PSETEX", &[key, millis.as_bytes(), value], reply::ok)
    }

    /// SETNX. No TTL variant exists at this level.
    pub fn set_if_absent(&self, key: &[u8], value: &[u8]) -> ClientResult<bool> {
        self.template.call("SETNX", &[key, value], reply::boolean)
    }

    pub fn get_and_set(&self, key: &[u8], value: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        self.template.call("GETSET", &[key, value], reply::bulk)
    }

    pub fn multi_get(&self, keys: &[&[u8]]) -> ClientResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.template.call("MGET", keys, reply::optional_bulks)
    }

    pub fn multi_set(&self, pairs: &[(&[u8], &[u8])]) -> ClientResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        self.template.call("MSET", &flatten(pairs), reply::ok)
    }

    pub fn multi_set_if_absent(&self, pairs: &[(&[u8], &[u8])]) -> ClientResult<bool> {
        self.template.call("MSETNX", &flatten(pairs), reply::boolean)
    }

    pub fn increment(&self, key: &[u8], delta: i64) -> ClientResult<i64> {
        let delta = delta.to_string();
        self.template
            .call("INCRBY", &[key, delta.as_bytes()], reply::integer)
    }

    pub fn increment_float(&self, key: &[u8], delta: f64) -> ClientResult<f64> {
        let delta = format_float(delta);
        self.template
            .call("INCRBYFLOAT", &[key, delta.as_bytes()], reply::float)
    }
}

/// Hash commands bound to one key.
pub struct BoundHashOps<'a> {
    template: &'a CacheTemplate,
    key: &'a [u8],
}

impl<'a> BoundHashOps<'a> {
    pub(crate) fn new(template: &'a CacheTemplate, key: &'a [u8]) -> Self {
        BoundHashOps { template, key }
    }

    pub fn get(&self, field: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        self.template.call("HGET", &[self.key, field], reply::bulk)
    }

    pub fn multi_get(&self, fields: &[&[u8]]) -> ClientResult<Vec<Option<Vec<u8>>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        self.template
            .call("HMGET", &self.with_key(fields), reply::optional_bulks)
    }

    pub fn put(&self, field: &[u8], value: &[u8]) -> ClientResult<bool> {
        self.template
            .call("HSET", &[self.key, field, value], reply::boolean)
    }

    pub fn put_if_absent(&self, field: &[u8], value: &[u8]) -> ClientResult<bool> {
        self.template
            .call("HSETNX", &[self.key, field, value], reply::boolean)
    }

    pub fn put_all(&self, pairs: &[(&[u8], &[u8])]) -> ClientResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        self.template
            .call("HSET", &self.with_key(&flatten(pairs)), reply::count)
            .map(|_| ())
    }

    pub fn delete(&self, fields: &[&[u8]]) -> ClientResult<u64> {
        self.template.call("HDEL", &self.with_key(fields), reply::count)
    }

    pub fn has_key(&self, field: &[u8]) -> ClientResult<bool> {
        self.template
            .call("HEXISTS", &[self.key, field], reply::boolean)
    }

    pub fn values(&self) -> ClientResult<Vec<Vec<u8>>> {
        self.template.call("HVALS", &[self.key], reply::bulks)
    }

    pub fn keys(&self) -> ClientResult<Vec<Vec<u8>>> {
        self.template.call("HKEYS", &[self.key], reply::bulks)
    }

    pub fn size(&self) -> ClientResult<u64> {
        self.template.call("HLEN", &[self.key], reply::count)
    }

    fn with_key<'b>(&'b self, rest: &[&'b [u8]]) -> Vec<&'b [u8]> {
        prepend(self.key, rest)
    }
}

/// Set commands bound to one key.
pub struct BoundSetOps<'a> {
    template: &'a CacheTemplate,
    key: &'a [u8],
}

impl<'a> BoundSetOps<'a> {
    pub(crate) fn new(template: &'a CacheTemplate, key: &'a [u8]) -> Self {
        BoundSetOps { template, key }
    }

    pub fn add(&self, members: &[&[u8]]) -> ClientResult<u64> {
        self.template
            .call("SADD", &prepend(self.key, members), reply::count)
    }

    pub fn remove(&self, members: &[&[u8]]) -> ClientResult<u64> {
        self.template
            .call("SREM", &prepend(self.key, members), reply::count)
    }

    pub fn members(&self) -> ClientResult<Vec<Vec<u8>>> {
        self.template.call("SMEMBERS", &[self.key], reply::bulks)
    }

    pub fn random_members(&self, count: i64) -> ClientResult<Vec<Vec<u8>>> {
        let count = count.to_string();
        self.template
            .call("SRANDMEMBER", &[self.key, count.as_bytes()], reply::bulks)
    }

    pub fn pop(&self) -> ClientResult<Option<Vec<u8>>> {
        self.template.call("SPOP", &[self.key], reply::bulk)
    }

    pub fn move_to(&self, destination: &[u8], member: &[u8]) -> ClientResult<bool> {
        self.template
            .call("SMOVE", &[self.key, destination, member], reply::boolean)
    }

    /// SDIFF / SINTER / SUNION of this key with `others`.
    pub fn combine(&self, command: &str, others: &[&[u8]]) -> ClientResult<Vec<Vec<u8>>> {
        self.template
            .call(command, &prepend(self.key, others), reply::bulks)
    }

    /// SDIFFSTORE / SINTERSTORE / SUNIONSTORE of this key with `others`.
    pub fn combine_and_store(
        &self,
        command: &str,
        others: &[&[u8]],
        destination: &[u8],
    ) -> ClientResult<u64> {
        let mut args = Vec::with_capacity(others.len() + 2);
        args.push(destination);
        args.push(self.key);
        args.extend_from_slice(others);
        self.template.call(command, &args, reply::count)
    }

    pub fn size(&self) -> ClientResult<u64> {
        self.template.call("SCARD", &[self.key], reply::count)
    }
}

/// Sorted-set commands bound to one key.
pub struct BoundZSetOps<'a> {
    template: &'a CacheTemplate,
    key: &'a [u8],
}

impl<'a> BoundZSetOps<'a> {
    pub(crate) fn new(template: &'a CacheTemplate, key: &'a [u8]) -> Self {
        BoundZSetOps { template, key }
    }

    pub fn add(&self, member: &[u8], score: f64) -> ClientResult<bool> {
        self.add_all(&[(member, score)]).map(|added| added > 0)
    }

    pub fn add_all(&self, members: &[(&[u8], f64)]) -> ClientResult<u64> {
        let scores: Vec<String> = members.iter().map(|(_, score)| format_float(*score)).collect();
        let mut args: Vec<&[u8]> = Vec::with_capacity(1 + members.len() * 2);
        args.push(self.key);
        for ((member, _), score) in members.iter().zip(&scores) {
            args.push(score.as_bytes());
            args.push(member);
        }
        self.template.call("ZADD", &args, reply::count)
    }

    pub fn increment_score(&self, member: &[u8], delta: f64) -> ClientResult<f64> {
        let delta = format_float(delta);
        self.template
            .call("ZINCRBY", &[self.key, delta.as_bytes(), member], reply::float)
    }

    pub fn score(&self, member: &[u8]) -> ClientResult<Option<f64>> {
        self.template
            .call("ZSCORE", &[self.key, member], reply::optional_float)
    }

    pub fn range(&self, start: i64, stop: i64) -> ClientResult<Vec<Vec<u8>>> {
        let (start, stop) = (start.to_string(), stop.to_string());
        self.template.call(
            "ZRANGE",
            &[self.key, start.as_bytes(), stop.as_bytes()],
            reply::bulks,
        )
    }

    pub fn range_with_scores(&self, start: i64, stop: i64) -> ClientResult<Vec<(Vec<u8>, f64)>> {
        let (start, stop) = (start.to_string(), stop.to_string());
        self.template.call(
            "ZRANGE",
            &[self.key, start.as_bytes(), stop.as_bytes(), b"WITHSCORES"],
            reply::scored,
        )
    }

    pub fn range_by_score(&self, min: f64, max: f64) -> ClientResult<Vec<Vec<u8>>> {
        let (min, max) = (format_float(min), format_float(max));
        self.template.call(
            "ZRANGEBYSCORE",
            &[self.key, min.as_bytes(), max.as_bytes()],
            reply::bulks,
        )
    }

    pub fn remove(&self, members: &[&[u8]]) -> ClientResult<u64> {
        self.template
            .call("ZREM", &prepend(self.key, members), reply::count)
    }

    pub fn remove_range(&self, start: i64, stop: i64) -> ClientResult<u64> {
        let (start, stop) = (start.to_string(), stop.to_string());
        self.template.call(
            "ZREMRANGEBYRANK",
            &[self.key, start.as_bytes(), stop.as_bytes()],
            reply::count,
        )
    }

    pub fn remove_range_by_score(&self, min: f64, max: f64) -> ClientResult<u64> {
        let (min, max) = (format_float(min), format_float(max));
        self.template.call(
            "ZREMRANGEBYSCORE",
            &[self.key, min.as_bytes(), max.as_bytes()],
            reply::count,
        )
    }

    pub fn size(&self) -> ClientResult<u64> {
        self.template.call("ZCARD", &[self.key], reply::count)
    }

    pub fn count(&self, min: f64, max: f64) -> ClientResult<u64> {
        let (min, max) = (format_float(min), format_float(max));
        self.template.call(
            "ZCOUNT",
            &[self.key, min.as_bytes(), max.as_bytes()],
            reply::count,
        )
    }
}

/// List commands bound to one key.
pub struct BoundListOps<'a> {
    template: &'a CacheTemplate,
    key: &'a [u8],
}

impl<'a> BoundListOps<'a> {
    pub(crate) fn new(template: &'a CacheTemplate, key: &'a [u8]) -> Self {
        BoundListOps { template, key }
    }

    pub fn left_push_all(&self, values: &[&[u8]]) -> ClientResult<u64> {
        self.template
            .call("LPUSH", &prepend(self.key, values), reply::count)
    }

    pub fn right_push_all(&self, values: &[&[u8]]) -> ClientResult<u64> {
        self.template
            .call("RPUSH", &prepend(self.key, values), reply::count)
    }

    pub fn left_push_if_present(&self, value: &[u8]) -> ClientResult<u64> {
        self.template
            .call("LPUSHX", &[self.key, value], reply::count)
    }

    pub fn right_push_if_present(&self, value: &[u8]) -> ClientResult<u64> {
        self.template
            .call("RPUSHX", &[self.key, value], reply::count)
    }

    /// LINSERT BEFORE `pivot`.
    pub fn left_push_before(&self, pivot: &[u8], value: &[u8]) -> ClientResult<i64> {
        self.template.call(
            "LINSERT",
            &[self.key, b"BEFORE", pivot, value],
            reply::integer,
        )
    }

    pub fn left_pop(&self) -> ClientResult<Option<Vec<u8>>> {
        self.template.call("LPOP", &[self.key], reply::bulk)
    }

    pub fn right_pop(&self) -> ClientResult<Option<Vec<u8>>> {
        self.template.call("RPOP", &[self.key], reply::bulk)
    }

    pub fn left_pop_timeout(&self, timeout: Duration) -> ClientResult<Option<Vec<u8>>> {
        self.blocking_pop("BLPOP", timeout)
    }

    pub fn right_pop_timeout(&self, timeout: Duration) -> ClientResult<Option<Vec<u8>>> {
        self.blocking_pop("BRPOP", timeout)
    }

    pub fn range(&self, start: i64, stop: i64) -> ClientResult<Vec<Vec<u8>>> {
        let (start, stop) = (start.to_string(), stop.to_string());
        self.template.call(
            "LRANGE",
            &[self.key, start.as_bytes(), stop.as_bytes()],
            reply::bulks,
        )
    }

    pub fn trim(&self, start: i64, stop: i64) -> ClientResult<()> {
        let (start, stop) = (start.to_string(), stop.to_string());
        self.template.call(
            "LTRIM",
            &[self.key, start.as_bytes(), stop.as_bytes()],
            reply::ok,
        )
    }

    pub fn index(&self, index: i64) -> ClientResult<Option<Vec<u8>>> {
        let index = index.to_string();
        self.template
            .call("LINDEX", &[self.key, index.as_bytes()], reply::bulk)
    }

    pub fn set(&self, index: i64, value: &[u8]) -> ClientResult<()> {
        let index = index.to_string();
        self.template
            .call("LSET", &[self.key, index.as_bytes(), value], reply::ok)
    }

    pub fn remove(&self, count: i64, value: &[u8]) -> ClientResult<u64> {
        let count = count.to_string();
        self.template
            .call("LREM", &[self.key, count.as_bytes(), value], reply::count)
    }

    pub fn size(&self) -> ClientResult<u64> {
        self.template.call("LLEN", &[self.key], reply::count)
    }

    fn blocking_pop(&self, command: &str, timeout: Duration) -> ClientResult<Option<Vec<u8>>> {
        let secs = blocking_timeout_secs(timeout).to_string();
        self.template
            .call(command, &[self.key, secs.as_bytes()], reply::blocking_pop)
    }
}

fn flatten<'b>(pairs: &[(&'b [u8], &'b [u8])]) -> Vec<&'b [u8]> {
    pairs
        .iter()
        .flat_map(|(first, second)| [*first, *second])
        .collect()
}

fn prepend<'b>(key: &'b [u8], rest: &[&'b [u8]]) -> Vec<&'b [u8]> {
    let mut args = Vec::with_capacity(rest.len() + 1);
    args.push(key);
    args.extend_from_slice(rest);
    args
}
