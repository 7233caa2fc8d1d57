//! # Typed Client API
//!
//! Purpose: The handle application code uses. Keys are text, values are any
//! serde type; both are encoded here and the bytes handed to whichever driver
//! the factory selected.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `RedisClient` hides the driver behind `Commands`.
//! 2. **Injected Codec**: The value codec is a type parameter chosen at
//!    construction; the key codec is fixed UTF-8.
//! 3. **Explicit Units**: TTLs and timeouts are `Duration`/`SystemTime`;
//!    a zero TTL is rejected instead of being sent.
//! 4. **Sets Are Sets**: Set-shaped replies come back as `HashSet`, ranges
//!    and lists as `Vec` in server order.

use std::collections::HashSet;
use std::hash::Hash;
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::Serialize;

use unicache_common::{
    unix_millis, CacheError, CacheResult, Expiry, JsonCodec, KeyCodec, ReturnType, Script,
    ScriptValue, SetCondition, Ttl, ValueCodec,
};

use crate::contract::{Commands, ListEnd, SetOp};
use crate::error::ClientError;
use crate::resp::RespValue;

/// Cache client bound to one driver and one value codec.
pub struct RedisClient<C: ValueCodec = JsonCodec> {
    driver: Box<dyn Commands>,
    codec: C,
}

impl<C: ValueCodec> RedisClient<C> {
    pub(crate) fn new(driver: Box<dyn Commands>, codec: C) -> Self {
        RedisClient { driver, codec }
    }

    /// "direct", "cluster" or "generic".
    pub fn driver_name(&self) -> &'static str {
        self.driver.driver_name()
    }

    pub fn driver(&self) -> &dyn Commands {
        self.driver.as_ref()
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Bytes sent for `key`.
    pub fn raw_key(&self, key: &str) -> Vec<u8> {
        KeyCodec::encode(key).to_vec()
    }

    /// Bytes sent for `value` with this client's codec.
    pub fn raw_value<V: Serialize + ?Sized>(&self, value: &V) -> CacheResult<Vec<u8>> {
        self.encode(value)
    }

    // ---- strings ---------------------------------------------------------

    pub fn get<V: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<V>> {
        let raw = self.driver.get(KeyCodec::encode(key))?;
        self.decode_opt(raw)
    }

    pub fn set<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> CacheResult<()> {
        let value = self.encode(value)?;
        self.driver.set(KeyCodec::encode(key), &value)
    }

    /// Writes `value` with a TTL.
    pub fn set_ex<V: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &V,
        ttl: Duration,
    ) -> CacheResult<()> {
        self.set_with(key, value, SetCondition::Always, Some(ttl))
            .map(|_| ())
    }

    /// Returns true only if the key was absent and is now written.
    pub fn set_if_absent<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> CacheResult<bool> {
        self.set_with(key, value, SetCondition::IfAbsent, None)
    }

    pub fn set_if_absent_ex<V: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &V,
        ttl: Duration,
    ) -> CacheResult<bool> {
        self.set_with(key, value, SetCondition::IfAbsent, Some(ttl))
    }

    /// General SET. `ttl` of `Some(Duration::ZERO)` is an illegal argument.
    pub fn set_with<V: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &V,
        condition: SetCondition,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        let expiry = ttl.map(Expiry::from_duration).transpose()?;
        let value = self.encode(value)?;
        self.driver
            .set_with(KeyCodec::encode(key), &value, condition, expiry)
    }

    pub fn get_and_set<V: Serialize + DeserializeOwned>(
        &self,
        key: &str,
        value: &V,
    ) -> CacheResult<Option<V>> {
        let value = self.encode(value)?;
        let old = self.driver.get_set(KeyCodec::encode(key), &value)?;
        self.decode_opt(old)
    }

    /// Values in key order; `None` for missing keys.
    pub fn multi_get<V: DeserializeOwned>(&self, keys: &[&str]) -> CacheResult<Vec<Option<V>>> {
        let raw = self.driver.mget(&encode_keys(keys))?;
        raw.into_iter().map(|value| self.decode_opt(value)).collect()
    }

    pub fn multi_set<V: Serialize>(&self, entries: &[(&str, V)]) -> CacheResult<()> {
        let encoded = self.encode_entries(entries)?;
        self.driver.mset(&pair_refs(&encoded))
    }

    /// Writes every entry only if none of the keys exist.
    pub fn multi_set_if_absent<V: Serialize>(&self, entries: &[(&str, V)]) -> CacheResult<bool> {
        let encoded = self.encode_entries(entries)?;
        self.driver.mset_nx(&pair_refs(&encoded))
    }

    pub fn incr(&self, key: &str) -> CacheResult<i64> {
        self.incr_by(key, 1)
    }

    pub fn incr_by(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.driver.incr_by(KeyCodec::encode(key), delta)
    }

    pub fn incr_by_float(&self, key: &str, delta: f64) -> CacheResult<f64> {
        self.driver.incr_by_float(KeyCodec::encode(key), delta)
    }

    // ---- hashes ----------------------------------------------------------

    pub fn hget<V: DeserializeOwned>(&self, key: &str, field: &str) -> CacheResult<Option<V>> {
        let raw = self
            .driver
            .hget(KeyCodec::encode(key), KeyCodec::encode(field))?;
        self.decode_opt(raw)
    }

    pub fn hmulti_get<V: DeserializeOwned>(
        &self,
        key: &str,
        fields: &[&str],
    ) -> CacheResult<Vec<Option<V>>> {
        let raw = self
            .driver
            .hmget(KeyCodec::encode(key), &encode_keys(fields))?;
        raw.into_iter().map(|value| self.decode_opt(value)).collect()
    }

    /// Returns true when the field is new.
    pub fn hput<V: Serialize + ?Sized>(&self, key: &str, field: &str, value: &V) -> CacheResult<bool> {
        let value = self.encode(value)?;
        self.driver
            .hset(KeyCodec::encode(key), KeyCodec::encode(field), &value)
    }

    pub fn hput_if_absent<V: Serialize + ?Sized>(
        &self,
        key: &str,
        field: &str,
        value: &V,
    ) -> CacheResult<bool> {
        let value = self.encode(value)?;
        self.driver
            .hset_nx(KeyCodec::encode(key), KeyCodec::encode(field), &value)
    }

    pub fn hput_all<V: Serialize>(&self, key: &str, entries: &[(&str, V)]) -> CacheResult<()> {
        let encoded = self.encode_entries(entries)?;
        self.driver
            .hset_all(KeyCodec::encode(key), &pair_refs(&encoded))
    }

    /// Sets one field, then the TTL of the whole hash.
    ///
    /// The two writes are not atomic: a reader may briefly see the field
    /// without the new TTL.
    pub fn hput_with_expiry<V: Serialize + ?Sized>(
        &self,
        key: &str,
        field: &str,
        value: &V,
        ttl: Duration,
    ) -> CacheResult<()> {
        let expiry = Expiry::from_duration(ttl)?;
        let value = self.encode(value)?;
        self.driver.hset_with_expiry(
            KeyCodec::encode(key),
            KeyCodec::encode(field),
            &value,
            expiry,
        )
    }

    pub fn hdelete(&self, key: &str, fields: &[&str]) -> CacheResult<u64> {
        self.driver
            .hdel(KeyCodec::encode(key), &encode_keys(fields))
    }

    pub fn hexists(&self, key: &str, field: &str) -> CacheResult<bool> {
        self.driver
            .hexists(KeyCodec::encode(key), KeyCodec::encode(field))
    }

    pub fn hvalues<V: DeserializeOwned>(&self, key: &str) -> CacheResult<Vec<V>> {
        let raw = self.driver.hvals(KeyCodec::encode(key))?;
        self.decode_all(raw)
    }

    pub fn hkeys(&self, key: &str) -> CacheResult<HashSet<String>> {
        let raw = self.driver.hkeys(KeyCodec::encode(key))?;
        decode_keys(raw)
    }

    pub fn hsize(&self, key: &str) -> CacheResult<u64> {
        self.driver.hlen(KeyCodec::encode(key))
    }

    // ---- sets ------------------------------------------------------------

    /// Returns how many members were new.
    pub fn sadd<V: Serialize>(&self, key: &str, members: &[V]) -> CacheResult<u64> {
        let encoded = self.encode_all(members)?;
        self.driver.sadd(KeyCodec::encode(key), &slice_refs(&encoded))
    }

    pub fn sremove<V: Serialize>(&self, key: &str, members: &[V]) -> CacheResult<u64> {
        let encoded = self.encode_all(members)?;
        self.driver.srem(KeyCodec::encode(key), &slice_refs(&encoded))
    }

    pub fn smembers<V>(&self, key: &str) -> CacheResult<HashSet<V>>
    where
        V: DeserializeOwned + Eq + Hash,
    {
        let raw = self.driver.smembers(KeyCodec::encode(key))?;
        self.decode_set(raw)
    }

    /// Positive `count`: distinct members. Negative: may repeat.
    pub fn srandom_members<V: DeserializeOwned>(&self, key: &str, count: i64) -> CacheResult<Vec<V>> {
        let raw = self.driver.srandmember(KeyCodec::encode(key), count)?;
        self.decode_all(raw)
    }

    pub fn spop<V: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<V>> {
        let raw = self.driver.spop(KeyCodec::encode(key))?;
        self.decode_opt(raw)
    }

    pub fn smove<V: Serialize + ?Sized>(
        &self,
        source: &str,
        destination: &str,
        member: &V,
    ) -> CacheResult<bool> {
        let member = self.encode(member)?;
        self.driver.smove(
            KeyCodec::encode(source),
            KeyCodec::encode(destination),
            &member,
        )
    }

    pub fn sdiff<V>(&self, keys: &[&str]) -> CacheResult<HashSet<V>>
    where
        V: DeserializeOwned + Eq + Hash,
    {
        self.set_algebra(SetOp::Diff, keys)
    }

    pub fn sdiff_store(&self, destination: &str, keys: &[&str]) -> CacheResult<u64> {
        self.set_algebra_store(SetOp::Diff, destination, keys)
    }

    pub fn sintersect<V>(&self, keys: &[&str]) -> CacheResult<HashSet<V>>
    where
        V: DeserializeOwned + Eq + Hash,
    {
        self.set_algebra(SetOp::Inter, keys)
    }

    pub fn sintersect_store(&self, destination: &str, keys: &[&str]) -> CacheResult<u64> {
        self.set_algebra_store(SetOp::Inter, destination, keys)
    }

    pub fn sunion<V>(&self, keys: &[&str]) -> CacheResult<HashSet<V>>
    where
        V: DeserializeOwned + Eq + Hash,
    {
        self.set_algebra(SetOp::Union, keys)
    }

    pub fn sunion_store(&self, destination: &str, keys: &[&str]) -> CacheResult<u64> {
        self.set_algebra_store(SetOp::Union, destination, keys)
    }

    pub fn ssize(&self, key: &str) -> CacheResult<u64> {
        self.driver.scard(KeyCodec::encode(key))
    }

    fn set_algebra<V>(&self, op: SetOp, keys: &[&str]) -> CacheResult<HashSet<V>>
    where
        V: DeserializeOwned + Eq + Hash,
    {
        let raw = self.driver.set_algebra(op, &encode_keys(keys))?;
        self.decode_set(raw)
    }

    fn set_algebra_store(&self, op: SetOp, destination: &str, keys: &[&str]) -> CacheResult<u64> {
        self.driver
            .set_algebra_store(op, KeyCodec::encode(destination), &encode_keys(keys))
    }

    // ---- sorted sets -----------------------------------------------------

    /// Returns true when `member` is new.
    pub fn zadd<V: Serialize + ?Sized>(&self, key: &str, member: &V, score: f64) -> CacheResult<bool> {
        let member = self.encode(member)?;
        self.driver
            .zadd(KeyCodec::encode(key), &[(member.as_slice(), score)])
            .map(|added| added > 0)
    }

    /// Adds or rescores every member; returns how many were new.
    pub fn zadd_multi<V: Serialize>(&self, key: &str, members: &[(V, f64)]) -> CacheResult<u64> {
        let encoded = members
            .iter()
            .map(|(member, score)| Ok((self.encode(member)?, *score)))
            .collect::<CacheResult<Vec<_>>>()?;
        let refs: Vec<(&[u8], f64)> = encoded
            .iter()
            .map(|(member, score)| (member.as_slice(), *score))
            .collect();
        self.driver.zadd(KeyCodec::encode(key), &refs)
    }

    pub fn zincr_score<V: Serialize + ?Sized>(
        &self,
        key: &str,
        member: &V,
        delta: f64,
    ) -> CacheResult<f64> {
        let member = self.encode(member)?;
        self.driver.zincr_by(KeyCodec::encode(key), &member, delta)
    }

    pub fn zscore<V: Serialize + ?Sized>(&self, key: &str, member: &V) -> CacheResult<Option<f64>> {
        let member = self.encode(member)?;
        self.driver.zscore(KeyCodec::encode(key), &member)
    }

    /// Members by rank, ascending score.
    pub fn zrange<V: DeserializeOwned>(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<V>> {
        let raw = self.driver.zrange(KeyCodec::encode(key), start, stop)?;
        self.decode_all(raw)
    }

    pub fn zrange_with_scores<V: DeserializeOwned>(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> CacheResult<Vec<(V, f64)>> {
        let raw = self
            .driver
            .zrange_with_scores(KeyCodec::encode(key), start, stop)?;
        raw.into_iter()
            .map(|(member, score)| Ok((self.decode(&member)?, score)))
            .collect()
    }

    /// Members with `min <= score <= max`; infinities are allowed.
    pub fn zrange_by_score<V: DeserializeOwned>(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> CacheResult<Vec<V>> {
        let raw = self.driver.zrange_by_score(KeyCodec::encode(key), min, max)?;
        self.decode_all(raw)
    }

    pub fn zremove<V: Serialize>(&self, key: &str, members: &[V]) -> CacheResult<u64> {
        let encoded = self.encode_all(members)?;
        self.driver.zrem(KeyCodec::encode(key), &slice_refs(&encoded))
    }

    pub fn zremove_range(&self, key: &str, start: i64, stop: i64) -> CacheResult<u64> {
        self.driver
            .zrem_range_by_rank(KeyCodec::encode(key), start, stop)
    }

    pub fn zremove_by_score(&self, key: &str, min: f64, max: f64) -> CacheResult<u64> {
        self.driver
            .zrem_range_by_score(KeyCodec::encode(key), min, max)
    }

    pub fn zsize(&self, key: &str) -> CacheResult<u64> {
        self.driver.zcard(KeyCodec::encode(key))
    }

    pub fn zcount(&self, key: &str, min: f64, max: f64) -> CacheResult<u64> {
        self.driver.zcount(KeyCodec::encode(key), min, max)
    }

    // ---- lists -----------------------------------------------------------

    /// Returns the list length after the push.
    pub fn lpush<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> CacheResult<u64> {
        self.push_one(ListEnd::Left, key, value, false)
    }

    pub fn lpush_all<V: Serialize>(&self, key: &str, values: &[V]) -> CacheResult<u64> {
        self.push_many(ListEnd::Left, key, values)
    }

    /// Pushes only when the list already exists; returns 0 otherwise.
    pub fn lpush_if_present<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> CacheResult<u64> {
        self.push_one(ListEnd::Left, key, value, true)
    }

    pub fn rpush<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> CacheResult<u64> {
        self.push_one(ListEnd::Right, key, value, false)
    }

    pub fn rpush_all<V: Serialize>(&self, key: &str, values: &[V]) -> CacheResult<u64> {
        self.push_many(ListEnd::Right, key, values)
    }

    pub fn rpush_if_present<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> CacheResult<u64> {
        self.push_one(ListEnd::Right, key, value, true)
    }

    pub fn lpop<V: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<V>> {
        let raw = self.driver.pop(ListEnd::Left, KeyCodec::encode(key))?;
        self.decode_opt(raw)
    }

    pub fn rpop<V: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<V>> {
        let raw = self.driver.pop(ListEnd::Right, KeyCodec::encode(key))?;
        self.decode_opt(raw)
    }

    /// Waits up to `timeout` for a value. The timeout is rounded up to whole
    /// seconds; `Duration::ZERO` waits forever.
    pub fn lblock_pop<V: DeserializeOwned>(&self, key: &str, timeout: Duration) -> CacheResult<Option<V>> {
        let raw = self
            .driver
            .blocking_pop(ListEnd::Left, KeyCodec::encode(key), timeout)?;
        self.decode_opt(raw)
    }

    pub fn rblock_pop<V: DeserializeOwned>(&self, key: &str, timeout: Duration) -> CacheResult<Option<V>> {
        let raw = self
            .driver
            .blocking_pop(ListEnd::Right, KeyCodec::encode(key), timeout)?;
        self.decode_opt(raw)
    }

    pub fn lrange<V: DeserializeOwned>(&self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<V>> {
        let raw = self.driver.lrange(KeyCodec::encode(key), start, stop)?;
        self.decode_all(raw)
    }

    pub fn ltrim(&self, key: &str, start: i64, stop: i64) -> CacheResult<()> {
        self.driver.ltrim(KeyCodec::encode(key), start, stop)
    }

    pub fn lindex<V: DeserializeOwned>(&self, key: &str, index: i64) -> CacheResult<Option<V>> {
        let raw = self.driver.lindex(KeyCodec::encode(key), index)?;
        self.decode_opt(raw)
    }

    pub fn lset<V: Serialize + ?Sized>(&self, key: &str, index: i64, value: &V) -> CacheResult<()> {
        let value = self.encode(value)?;
        self.driver.lset(KeyCodec::encode(key), index, &value)
    }

    /// Removes up to `count` occurrences of `value`: from the head when
    /// positive, from the tail when negative, all of them when zero.
    pub fn lremove<V: Serialize + ?Sized>(&self, key: &str, count: i64, value: &V) -> CacheResult<u64> {
        let value = self.encode(value)?;
        self.driver.lrem(KeyCodec::encode(key), count, &value)
    }

    pub fn lremove_all<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> CacheResult<u64> {
        self.lremove(key, 0, value)
    }

    pub fn lsize(&self, key: &str) -> CacheResult<u64> {
        self.driver.llen(KeyCodec::encode(key))
    }

    /// Returns the new length, -1 if `pivot` is absent, 0 if the list is.
    pub fn linsert_before<P, V>(&self, key: &str, pivot: &P, value: &V) -> CacheResult<i64>
    where
        P: Serialize + ?Sized,
        V: Serialize + ?Sized,
    {
        let pivot = self.encode(pivot)?;
        let value = self.encode(value)?;
        self.driver
            .linsert_before(KeyCodec::encode(key), &pivot, &value)
    }

    fn push_one<V: Serialize + ?Sized>(
        &self,
        end: ListEnd,
        key: &str,
        value: &V,
        only_if_present: bool,
    ) -> CacheResult<u64> {
        let value = self.encode(value)?;
        self.driver
            .push(end, KeyCodec::encode(key), &[value.as_slice()], only_if_present)
    }

    fn push_many<V: Serialize>(&self, end: ListEnd, key: &str, values: &[V]) -> CacheResult<u64> {
        let encoded = self.encode_all(values)?;
        self.driver
            .push(end, KeyCodec::encode(key), &slice_refs(&encoded), false)
    }

    // ---- keys ------------------------------------------------------------

    pub fn exists(&self, key: &str) -> CacheResult<bool> {
        self.driver.exists(KeyCodec::encode(key))
    }

    /// Returns true when the key existed.
    pub fn delete(&self, key: &str) -> CacheResult<bool> {
        self.driver
            .del(&[KeyCodec::encode(key)])
            .map(|removed| removed > 0)
    }

    pub fn delete_many(&self, keys: &[&str]) -> CacheResult<u64> {
        self.driver.del(&encode_keys(keys))
    }

    /// Sets a TTL. Sub-second durations are sent in milliseconds.
    pub fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let expiry = Expiry::from_duration(ttl)?;
        self.driver.expire(KeyCodec::encode(key), expiry)
    }

    /// Expires the key at `deadline`; a past deadline deletes it.
    pub fn expire_at(&self, key: &str, deadline: SystemTime) -> CacheResult<bool> {
        self.driver
            .expire_at(KeyCodec::encode(key), unix_millis(deadline))
    }

    pub fn ttl(&self, key: &str) -> CacheResult<Ttl> {
        self.driver.ttl(KeyCodec::encode(key))
    }

    /// Removes the TTL; returns true when one was removed.
    pub fn persist(&self, key: &str) -> CacheResult<bool> {
        self.driver.persist(KeyCodec::encode(key))
    }

    // ---- scripting -------------------------------------------------------

    /// Runs `script` by source. Keys use the key codec; arguments and the
    /// result use this client's value codec.
    pub fn run_script<V, A>(&self, script: &Script, keys: &[&str], args: &[A]) -> CacheResult<ScriptValue<V>>
    where
        V: DeserializeOwned,
        A: Serialize,
    {
        self.run_script_with_codec(script, keys, args, &self.codec)
    }

    /// Like `run_script`, decoding the result with `result_codec`.
    pub fn run_script_with_codec<V, A, D>(
        &self,
        script: &Script,
        keys: &[&str],
        args: &[A],
        result_codec: &D,
    ) -> CacheResult<ScriptValue<V>>
    where
        V: DeserializeOwned,
        A: Serialize,
        D: ValueCodec,
    {
        let args = self.encode_all(args)?;
        let reply = self
            .driver
            .eval(script, &encode_keys(keys), &slice_refs(&args))?;
        decode_script(reply, script.return_type(), result_codec)
    }

    /// Runs `script` by digest, loading it first when needed.
    pub fn run_cached_script<V, A>(
        &self,
        script: &Script,
        keys: &[&str],
        args: &[A],
    ) -> CacheResult<ScriptValue<V>>
    where
        V: DeserializeOwned,
        A: Serialize,
    {
        self.run_cached_script_with_codec(script, keys, args, &self.codec)
    }

    pub fn run_cached_script_with_codec<V, A, D>(
        &self,
        script: &Script,
        keys: &[&str],
        args: &[A],
        result_codec: &D,
    ) -> CacheResult<ScriptValue<V>>
    where
        V: DeserializeOwned,
        A: Serialize,
        D: ValueCodec,
    {
        let args = self.encode_all(args)?;
        let reply = self
            .driver
            .eval_cached(script, &encode_keys(keys), &slice_refs(&args))?;
        decode_script(reply, script.return_type(), result_codec)
    }

    // ---- administrative --------------------------------------------------

    /// Keys matching `pattern`. The cluster driver refuses this.
    pub fn keys(&self, pattern: &str) -> CacheResult<HashSet<String>> {
        let raw = self.driver.keys(KeyCodec::encode(pattern))?;
        decode_keys(raw)
    }

    /// Drops every key in the current database. The cluster driver refuses this.
    pub fn flush_db(&self) -> CacheResult<()> {
        self.driver.flush_db()
    }

    /// Publishes `message` as plain UTF-8; returns the receiver count.
    pub fn publish(&self, channel: &str, message: &str) -> CacheResult<u64> {
        self.driver
            .publish(KeyCodec::encode(channel), KeyCodec::encode(message))
    }

    pub fn ping(&self) -> CacheResult<()> {
        self.driver.ping()
    }

    pub fn close(&self) {
        self.driver.close();
    }

    // ---- codec helpers ---------------------------------------------------

    fn encode<V: Serialize + ?Sized>(&self, value: &V) -> CacheResult<Vec<u8>> {
        Ok(self.codec.encode(value)?)
    }

    fn encode_all<V: Serialize>(&self, values: &[V]) -> CacheResult<Vec<Vec<u8>>> {
        values.iter().map(|value| self.encode(value)).collect()
    }

    fn encode_entries<V: Serialize>(&self, entries: &[(&str, V)]) -> CacheResult<Vec<(Vec<u8>, Vec<u8>)>> {
        entries
            .iter()
            .map(|(key, value)| Ok((KeyCodec::encode(key).to_vec(), self.encode(value)?)))
            .collect()
    }

    fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> CacheResult<V> {
        Ok(self.codec.decode(bytes)?)
    }

    fn decode_opt<V: DeserializeOwned>(&self, bytes: Option<Vec<u8>>) -> CacheResult<Option<V>> {
        bytes.map(|bytes| self.decode(&bytes)).transpose()
    }

    fn decode_all<V: DeserializeOwned>(&self, raw: Vec<Vec<u8>>) -> CacheResult<Vec<V>> {
        raw.iter().map(|bytes| self.decode(bytes)).collect()
    }

    fn decode_set<V>(&self, raw: Vec<Vec<u8>>) -> CacheResult<HashSet<V>>
    where
        V: DeserializeOwned + Eq + Hash,
    {
        raw.iter().map(|bytes| self.decode(bytes)).collect()
    }
}

fn encode_keys<'a>(keys: &[&'a str]) -> Vec<&'a [u8]> {
    keys.iter().map(|key| KeyCodec::encode(key)).collect()
}

fn slice_refs(values: &[Vec<u8>]) -> Vec<&[u8]> {
    values.iter().map(Vec::as_slice).collect()
}

fn pair_refs(pairs: &[(Vec<u8>, Vec<u8>)]) -> Vec<(&[u8], &[u8])> {
    pairs
        .iter()
        .map(|(first, second)| (first.as_slice(), second.as_slice()))
        .collect()
}

fn decode_keys(raw: Vec<Vec<u8>>) -> CacheResult<HashSet<String>> {
    raw.iter()
        .map(|bytes| Ok(KeyCodec::decode(bytes)?))
        .collect()
}

/// Shapes a script reply according to its declared return type.
fn decode_script<V, D>(reply: RespValue, return_type: ReturnType, codec: &D) -> CacheResult<ScriptValue<V>>
where
    V: DeserializeOwned,
    D: ValueCodec,
{
    let decode_item = |item: RespValue| -> CacheResult<Option<V>> {
        match item {
            RespValue::Bulk(None) => Ok(None),
            RespValue::Bulk(Some(bytes)) | RespValue::Simple(bytes) => Ok(Some(codec.decode(&bytes)?)),
            RespValue::Integer(value) => Ok(Some(codec.decode(value.to_string().as_bytes())?)),
            _ => Err(unexpected_script_reply()),
        }
    };

    let value = match (return_type, reply) {
        (_, RespValue::Bulk(None)) if return_type != ReturnType::Boolean => ScriptValue::Nil,
        (ReturnType::Boolean, RespValue::Bulk(None)) => ScriptValue::Boolean(false),
        (ReturnType::Boolean, RespValue::Integer(value)) => ScriptValue::Boolean(value != 0),
        (ReturnType::Integer, RespValue::Integer(value)) => ScriptValue::Integer(value),
        (ReturnType::Status, RespValue::Simple(text) | RespValue::Bulk(Some(text))) => {
            ScriptValue::Status(String::from_utf8_lossy(&text).into_owned())
        }
        (ReturnType::Value, item) => match decode_item(item)? {
            Some(value) => ScriptValue::Value(value),
            None => ScriptValue::Nil,
        },
        (ReturnType::MultiValue, RespValue::Array(items)) => ScriptValue::Values(
            items
                .into_iter()
                .map(decode_item)
                .collect::<CacheResult<Vec<_>>>()?,
        ),
        _ => return Err(unexpected_script_reply()),
    };
    Ok(value)
}

fn unexpected_script_reply() -> CacheError {
    ClientError::unexpected(b"EVAL").into()
}
