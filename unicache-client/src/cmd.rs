//! # Command Builder
//!
//! Purpose: Build RESP command argument vectors once, so the direct and
//! cluster drivers send byte-identical commands and differ only in routing.
//!
//! ## Design Principles
//! 1. **Builder Pattern**: `Cmd::new("HSET").arg(key).arg(field)` reads like the
//!    wire command it produces.
//! 2. **Exact Numbers**: Integers and floats are formatted so the server parses
//!    the same value the caller passed (`+inf`/`-inf` for infinities).
//! 3. **Units Made Explicit**: Expiries arrive as `Expiry`, blocking timeouts
//!    as `Duration`; nothing here guesses a unit.

use std::time::Duration;

use unicache_common::{Expiry, SetCondition};

use crate::resp::encode_command;

/// One command: name followed by binary-safe arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    args: Vec<Vec<u8>>,
}

impl Cmd {
    pub fn new(name: &str) -> Self {
        let mut args = Vec::with_capacity(4);
        args.push(name.as_bytes().to_vec());
        Cmd { args }
    }

    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.args.extend(args.into_iter().map(|arg| arg.as_ref().to_vec()));
        self
    }

    pub fn int(self, value: i64) -> Self {
        self.arg(value.to_string())
    }

    pub fn uint(self, value: u64) -> Self {
        self.arg(value.to_string())
    }

    pub fn float(self, value: f64) -> Self {
        self.arg(format_float(value))
    }

    /// Command name as sent (first argument).
    pub fn name(&self) -> &[u8] {
        &self.args[0]
    }

    pub fn as_args(&self) -> &[Vec<u8>] {
        &self.args
    }

    /// Appends the RESP2 encoding of this command to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        encode_command(&self.args, out);
    }
}

/// Formats a score or increment the way the server parses doubles.
pub fn format_float(value: f64) -> String {
    if value.is_infinite() {
        if value > 0.0 {
            "+inf".to_string()
        } else {
            "-inf".to_string()
        }
    } else {
        value.to_string()
    }
}

/// Blocking-pop timeout in whole seconds, rounded up.
///
/// Rounding down would turn a sub-second timeout into 0, which the server
/// reads as "block forever". `Duration::ZERO` does mean block forever.
pub fn blocking_timeout_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs();
    if timeout.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

// ---- strings -------------------------------------------------------------

pub fn get(key: &[u8]) -> Cmd {
    Cmd::new("GET").arg(key)
}

pub fn set(key: &[u8], value: &[u8]) -> Cmd {
    Cmd::new("SET").arg(key).arg(value)
}

/// SET with optional NX/XX and optional EX/PX.
pub fn set_with_options(
    key: &[u8],
    value: &[u8],
    condition: SetCondition,
    expiry: Option<Expiry>,
) -> Cmd {
    let mut cmd = set(key, value);
    if let Some(token) = condition.token() {
        cmd = cmd.arg(token);
    }
    if let Some(expiry) = expiry {
        let (option, amount) = expiry.set_option();
        cmd = cmd.arg(option).uint(amount);
    }
    cmd
}

pub fn getset(key: &[u8], value: &[u8]) -> Cmd {
    Cmd::new("GETSET").arg(key).arg(value)
}

pub fn mget(keys: &[&[u8]]) -> Cmd {
    Cmd::new("MGET").args(keys)
}

pub fn mset(pairs: &[(&[u8], &[u8])]) -> Cmd {
    pairs
        .iter()
        .fold(Cmd::new("MSET"), |cmd, (key, value)| cmd.arg(key).arg(value))
}

pub fn msetnx(pairs: &[(&[u8], &[u8])]) -> Cmd {
    pairs
        .iter()
        .fold(Cmd::new("MSETNX"), |cmd, (key, value)| cmd.arg(key).arg(value))
}

pub fn incr_by(key: &[u8], delta: i64) -> Cmd {
    Cmd::new("INCRBY").arg(key).int(delta)
}

pub fn incr_by_float(key: &[u8], delta: f64) -> Cmd {
    Cmd::new("INCRBYFLOAT").arg(key).float(delta)
}

// ---- hashes --------------------------------------------------------------

pub fn hget(key: &[u8], field: &[u8]) -> Cmd {
    Cmd::new("HGET").arg(key).arg(field)
}

pub fn hmget(key: &[u8], fields: &[&[u8]]) -> Cmd {
    Cmd::new("HMGET").arg(key).args(fields)
}

pub fn hset(key: &[u8], field: &[u8], value: &[u8]) -> Cmd {
    Cmd::new("HSET").arg(key).arg(field).arg(value)
}

pub fn hsetnx(key: &[u8], field: &[u8], value: &[u8]) -> Cmd {
    Cmd::new("HSETNX").arg(key).arg(field).arg(value)
}

pub fn hset_all(key: &[u8], pairs: &[(&[u8], &[u8])]) -> Cmd {
    pairs
        .iter()
        .fold(Cmd::new("HSET").arg(key), |cmd, (field, value)| cmd.arg(field).arg(value))
}

pub fn hdel(key: &[u8], fields: &[&[u8]]) -> Cmd {
    Cmd::new("HDEL").arg(key).args(fields)
}

pub fn hexists(key: &[u8], field: &[u8]) -> Cmd {
    Cmd::new("HEXISTS").arg(key).arg(field)
}

pub fn hvals(key: &[u8]) -> Cmd {
    Cmd::new("HVALS").arg(key)
}

pub fn hkeys(key: &[u8]) -> Cmd {
    Cmd::new("HKEYS").arg(key)
}

pub fn hlen(key: &[u8]) -> Cmd {
    Cmd::new("HLEN").arg(key)
}

// ---- sets ----------------------------------------------------------------

pub fn sadd(key: &[u8], members: &[&[u8]]) -> Cmd {
    Cmd::new("SADD").arg(key).args(members)
}

pub fn srem(key: &[u8], members: &[&[u8]]) -> Cmd {
    Cmd::new("SREM").arg(key).args(members)
}

pub fn smembers(key: &[u8]) -> Cmd {
    Cmd::new("SMEMBERS").arg(key)
}

pub fn srandmember(key: &[u8], count: i64) -> Cmd {
    Cmd::new("SRANDMEMBER").arg(key).int(count)
}

pub fn spop(key: &[u8]) -> Cmd {
    Cmd::new("SPOP").arg(key)
}

pub fn smove(source: &[u8], destination: &[u8], member: &[u8]) -> Cmd {
    Cmd::new("SMOVE").arg(source).arg(destination).arg(member)
}

/// SDIFF / SINTER / SUNION over `keys`.
pub fn set_algebra(name: &str, keys: &[&[u8]]) -> Cmd {
    Cmd::new(name).args(keys)
}

/// SDIFFSTORE / SINTERSTORE / SUNIONSTORE into `destination`.
pub fn set_algebra_store(name: &str, destination: &[u8], keys: &[&[u8]]) -> Cmd {
    Cmd::new(name).arg(destination).args(keys)
}

pub fn scard(key: &[u8]) -> Cmd {
    Cmd::new("SCARD").arg(key)
}

// ---- sorted sets ---------------------------------------------------------

pub fn zadd(key: &[u8], members: &[(&[u8], f64)]) -> Cmd {
    members
        .iter()
        .fold(Cmd::new("ZADD").arg(key), |cmd, (member, score)| {
            cmd.float(*score).arg(member)
        })
}

pub fn zincrby(key: &[u8], member: &[u8], delta: f64) -> Cmd {
    Cmd::new("ZINCRBY").arg(key).float(delta).arg(member)
}

pub fn zscore(key: &[u8], member: &[u8]) -> Cmd {
    Cmd::new("ZSCORE").arg(key).arg(member)
}

pub fn zrange(key: &[u8], start: i64, stop: i64, with_scores: bool) -> Cmd {
    let cmd = Cmd::new("ZRANGE").arg(key).int(start).int(stop);
    if with_scores {
        cmd.arg("WITHSCORES")
    } else {
        cmd
    }
}

pub fn zrangebyscore(key: &[u8], min: f64, max: f64) -> Cmd {
    Cmd::new("ZRANGEBYSCORE").arg(key).float(min).float(max)
}

pub fn zrem(key: &[u8], members: &[&[u8]]) -> Cmd {
    Cmd::new("ZREM").arg(key).args(members)
}

pub fn zremrangebyrank(key: &[u8], start: i64, stop: i64) -> Cmd {
    Cmd::new("ZREMRANGEBYRANK").arg(key).int(start).int(stop)
}

pub fn zremrangebyscore(key: &[u8], min: f64, max: f64) -> Cmd {
    Cmd::new("ZREMRANGEBYSCORE").arg(key).float(min).float(max)
}

pub fn zcard(key: &[u8]) -> Cmd {
    Cmd::new("ZCARD").arg(key)
}

pub fn zcount(key: &[u8], min: f64, max: f64) -> Cmd {
    Cmd::new("ZCOUNT").arg(key).float(min).float(max)
}

// ---- lists ---------------------------------------------------------------

/// LPUSH / RPUSH / LPUSHX / RPUSHX.
pub fn push(name: &str, key: &[u8], values: &[&[u8]]) -> Cmd {
    Cmd::new(name).arg(key).args(values)
}

/// LPOP / RPOP.
pub fn pop(name: &str, key: &[u8]) -> Cmd {
    Cmd::new(name).arg(key)
}

/// BLPOP / BRPOP on a single key.
pub fn blocking_pop(name: &str, key: &[u8], timeout: Duration) -> Cmd {
    Cmd::new(name).arg(key).uint(blocking_timeout_secs(timeout))
}

pub fn lrange(key: &[u8], start: i64, stop: i64) -> Cmd {
    Cmd::new("LRANGE").arg(key).int(start).int(stop)
}

pub fn ltrim(key: &[u8], start: i64, stop: i64) -> Cmd {
    Cmd::new("LTRIM").arg(key).int(start).int(stop)
}

pub fn lindex(key: &[u8], index: i64) -> Cmd {
    Cmd::new("LINDEX").arg(key).int(index)
}

pub fn lset(key: &[u8], index: i64, value: &[u8]) -> Cmd {
    Cmd::new("LSET").arg(key).int(index).arg(value)
}

pub fn lrem(key: &[u8], count: i64, value: &[u8]) -> Cmd {
    Cmd::new("LREM").arg(key).int(count).arg(value)
}

pub fn llen(key: &[u8]) -> Cmd {
    Cmd::new("LLEN").arg(key)
}

pub fn linsert_before(key: &[u8], pivot: &[u8], value: &[u8]) -> Cmd {
    Cmd::new("LINSERT").arg(key).arg("BEFORE").arg(pivot).arg(value)
}

// ---- keys ----------------------------------------------------------------

pub fn exists(key: &[u8]) -> Cmd {
    Cmd::new("EXISTS").arg(key)
}

pub fn del(keys: &[&[u8]]) -> Cmd {
    Cmd::new("DEL").args(keys)
}

pub fn expire(key: &[u8], expiry: Expiry) -> Cmd {
    match expiry {
        Expiry::Seconds(secs) => Cmd::new("EXPIRE").arg(key).uint(secs),
        Expiry::Millis(millis) => Cmd::new("PEXPIRE").arg(key).uint(millis),
    }
}

pub fn pexpireat(key: &[u8], unix_millis: u64) -> Cmd {
    Cmd::new("PEXPIREAT").arg(key).uint(unix_millis)
}

pub fn pttl(key: &[u8]) -> Cmd {
    Cmd::new("PTTL").arg(key)
}

pub fn persist(key: &[u8]) -> Cmd {
    Cmd::new("PERSIST").arg(key)
}

// ---- scripting and admin -------------------------------------------------

pub fn eval(source: &str, keys: &[&[u8]], args: &[&[u8]]) -> Cmd {
    Cmd::new("EVAL")
        .arg(source)
        .uint(keys.len() as u64)
        .args(keys)
        .args(args)
}

pub fn evalsha(sha: &str, keys: &[&[u8]], args: &[&[u8]]) -> Cmd {
    Cmd::new("EVALSHA")
        .arg(sha)
        .uint(keys.len() as u64)
        .args(keys)
        .args(args)
}

pub fn script_load(source: &str) -> Cmd {
    Cmd::new("SCRIPT").arg("LOAD").arg(source)
}

pub fn keys(pattern: &[u8]) -> Cmd {
    Cmd::new("KEYS").arg(pattern)
}

pub fn flushdb() -> Cmd {
    Cmd::new("FLUSHDB")
}

pub fn publish(channel: &[u8], message: &[u8]) -> Cmd {
    Cmd::new("PUBLISH").arg(channel).arg(message)
}

pub fn ping() -> Cmd {
    Cmd::new("PING")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Cmd) -> Vec<String> {
        cmd.as_args()
            .iter()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect()
    }

    #[test]
    fn set_if_absent_with_millis() {
        let cmd = set_with_options(
            b"k",
            b"v",
            SetCondition::IfAbsent,
            Some(Expiry::Millis(1500)),
        );
        assert_eq!(args(&cmd), ["SET", "k", "v", "NX", "PX", "1500"]);
    }

    #[test]
    fn nx_without_expiry_is_plain_nx() {
        let cmd = set_with_options(b"k", b"v", SetCondition::IfAbsent, None);
        assert_eq!(args(&cmd), ["SET", "k", "v", "NX"]);
    }

    #[test]
    fn zadd_puts_score_before_member() {
        let cmd = zadd(b"z", &[(b"x".as_slice(), 1.0), (b"y".as_slice(), 2.5)]);
        assert_eq!(args(&cmd), ["ZADD", "z", "1", "x", "2.5", "y"]);
    }

    #[test]
    fn infinite_scores_use_server_tokens() {
        let cmd = zcount(b"z", f64::NEG_INFINITY, f64::INFINITY);
        assert_eq!(args(&cmd), ["ZCOUNT", "z", "-inf", "+inf"]);
    }

    #[test]
    fn blocking_timeout_rounds_up() {
        assert_eq!(blocking_timeout_secs(Duration::from_millis(500)), 1);
        assert_eq!(blocking_timeout_secs(Duration::from_secs(2)), 2);
        assert_eq!(blocking_timeout_secs(Duration::ZERO), 0);
    }

    #[test]
    fn blocking_timeout_saturates_at_max() {
        assert_eq!(blocking_timeout_secs(Duration::MAX), u64::MAX);
    }

    #[test]
    fn eval_counts_keys() {
        let cmd = eval("return 1", &[b"a".as_slice()], &[b"x".as_slice(), b"y".as_slice()]);
        assert_eq!(args(&cmd), ["EVAL", "return 1", "1", "a", "x", "y"]);
    }

    #[test]
    fn expire_picks_unit_command() {
        assert_eq!(args(&expire(b"k", Expiry::Seconds(5))), ["EXPIRE", "k", "5"]);
        assert_eq!(args(&expire(b"k", Expiry::Millis(5))), ["PEXPIRE", "k", "5"]);
    }
}
