use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use unicache_client::template::{CacheTemplate, ConnectionFactory, RawConnection};
use unicache_client::{
    ClientResult, ConnectionDescriptor, ListEnd, RedisClient, RedisClientFactory, RespValue,
    ReturnType, Script, ScriptValue, SetCondition, Ttl,
};

const SHA: &str = "9b1d3b1c4b6a1d0d7d4a2f6e8c2f1e0a5b4c3d2e";

/// In-memory store understanding just enough commands for the template.
#[derive(Default)]
struct Store {
    strings: HashMap<Vec<u8>, Vec<u8>>,
    hashes: HashMap<Vec<u8>, BTreeMap<Vec<u8>, Vec<u8>>>,
    lists: HashMap<Vec<u8>, VecDeque<Vec<u8>>>,
    zsets: HashMap<Vec<u8>, Vec<(Vec<u8>, f64)>>,
    ttls: HashMap<Vec<u8>, i64>,
    script_loaded: bool,
    log: Vec<Vec<String>>,
}

impl Store {
    fn exists(&self, key: &[u8]) -> bool {
        self.strings.contains_key(key)
            || self.hashes.contains_key(key)
            || self.lists.contains_key(key)
            || self.zsets.contains_key(key)
    }

    fn apply(&mut self, command: &str, args: &[&[u8]]) -> RespValue {
        match command {
            "GET" => RespValue::Bulk(self.strings.get(args[0]).cloned()),
            "EXISTS" => RespValue::Integer(i64::from(self.exists(args[0]))),
            "SET" => self.set(args),
            "SETNX" => {
                if self.exists(args[0]) {
                    return RespValue::Integer(0);
                }
                self.strings.insert(args[0].to_vec(), args[1].to_vec());
                RespValue::Integer(1)
            }
            "PSETEX" => {
                self.strings.insert(args[0].to_vec(), args[2].to_vec());
                self.ttls.insert(args[0].to_vec(), number(args[1]));
                ok()
            }
            "HSET" => {
                let hash = self.hashes.entry(args[0].to_vec()).or_default();
                let fresh = hash.insert(args[1].to_vec(), args[2].to_vec()).is_none();
                RespValue::Integer(i64::from(fresh))
            }
            "HGET" => RespValue::Bulk(
                self.hashes
                    .get(args[0])
                    .and_then(|hash| hash.get(args[1]))
                    .cloned(),
            ),
            "PEXPIRE" => {
                if !self.exists(args[0]) {
                    return RespValue::Integer(0);
                }
                self.ttls.insert(args[0].to_vec(), number(args[1]));
                RespValue::Integer(1)
            }
            "PTTL" => RespValue::Integer(match self.ttls.get(args[0]) {
                Some(ttl) => *ttl,
                None if self.exists(args[0]) => -1,
                None => -2,
            }),
            "LPUSH" | "RPUSH" | "LPUSHX" | "RPUSHX" => {
                if command.ends_with('X') && !self.lists.contains_key(args[0]) {
                    return RespValue::Integer(0);
                }
                let list = self.lists.entry(args[0].to_vec()).or_default();
                for value in &args[1..] {
                    if command.starts_with('R') {
                        list.push_back(value.to_vec());
                    } else {
                        list.push_front(value.to_vec());
                    }
                }
                RespValue::Integer(list.len() as i64)
            }
            "LLEN" => RespValue::Integer(self.lists.get(args[0]).map_or(0, |list| list.len() as i64)),
            "LRANGE" => RespValue::Array(
                self.lists
                    .get(args[0])
                    .map(|list| list.iter().map(|v| RespValue::Bulk(Some(v.clone()))).collect())
                    .unwrap_or_default(),
            ),
            "LINDEX" => {
                let list = self.lists.get(args[0]);
                let item = list.and_then(|list| {
                    position(list.len(), number(args[1])).and_then(|at| list.get(at).cloned())
                });
                RespValue::Bulk(item)
            }
            "LSET" => {
                let Some(list) = self.lists.get_mut(args[0]) else {
                    return RespValue::Error(b"ERR no such key".to_vec());
                };
                match position(list.len(), number(args[1])) {
                    Some(at) => {
                        list[at] = args[2].to_vec();
                        ok()
                    }
                    None => RespValue::Error(b"ERR index out of range".to_vec()),
                }
            }
            "LREM" => {
                let Some(list) = self.lists.get_mut(args[0]) else {
                    return RespValue::Integer(0);
                };
                let count = number(args[1]);
                let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
                let mut removed = 0;
                let mut kept = VecDeque::new();
                if count >= 0 {
                    for item in list.drain(..) {
                        if removed < limit && item == args[2] {
                            removed += 1;
                        } else {
                            kept.push_back(item);
                        }
                    }
                } else {
                    for item in list.drain(..).rev() {
                        if removed < limit && item == args[2] {
                            removed += 1;
                        } else {
                            kept.push_front(item);
                        }
                    }
                }
                *list = kept;
                RespValue::Integer(removed as i64)
            }
            "LTRIM" => {
                if let Some(list) = self.lists.get_mut(args[0]) {
                    *list = match span(list.len(), number(args[1]), number(args[2])) {
                        Some((first, last)) => list.range(first..=last).cloned().collect(),
                        None => VecDeque::new(),
                    };
                }
                ok()
            }
            "LINSERT" => {
                assert_eq!(args[1], b"BEFORE");
                let Some(list) = self.lists.get_mut(args[0]) else {
                    return RespValue::Integer(0);
                };
                match list.iter().position(|item| item == args[2]) {
                    Some(at) => {
                        list.insert(at, args[3].to_vec());
                        RespValue::Integer(list.len() as i64)
                    }
                    None => RespValue::Integer(-1),
                }
            }
            "INCRBYFLOAT" => {
                let current = self
                    .strings
                    .get(args[0])
                    .map_or(0.0, |value| score(value));
                let next = current + score(args[1]);
                self.strings.insert(args[0].to_vec(), next.to_string().into_bytes());
                RespValue::Bulk(Some(next.to_string().into_bytes()))
            }
            "ZADD" => {
                let zset = self.zsets.entry(args[0].to_vec()).or_default();
                let mut added = 0;
                for pair in args[1..].chunks(2) {
                    match zset.iter_mut().find(|(member, _)| member == pair[1]) {
                        Some(entry) => entry.1 = score(pair[0]),
                        None => {
                            zset.push((pair[1].to_vec(), score(pair[0])));
                            added += 1;
                        }
                    }
                }
                zset.sort_by(|a, b| a.1.total_cmp(&b.1));
                RespValue::Integer(added)
            }
            "ZINCRBY" => {
                let zset = self.zsets.entry(args[0].to_vec()).or_default();
                let delta = score(args[1]);
                let next = match zset.iter_mut().find(|(member, _)| member == args[2]) {
                    Some(entry) => {
                        entry.1 += delta;
                        entry.1
                    }
                    None => {
                        zset.push((args[2].to_vec(), delta));
                        delta
                    }
                };
                zset.sort_by(|a, b| a.1.total_cmp(&b.1));
                RespValue::Bulk(Some(next.to_string().into_bytes()))
            }
            "ZSCORE" => RespValue::Bulk(
                self.zsets
                    .get(args[0])
                    .and_then(|zset| zset.iter().find(|(member, _)| member == args[1]))
                    .map(|(_, value)| value.to_string().into_bytes()),
            ),
            "ZRANGEBYSCORE" | "ZCOUNT" => {
                let (min, max) = (score(args[1]), score(args[2]));
                let members: Vec<RespValue> = self
                    .zsets
                    .get(args[0])
                    .map(|zset| {
                        zset.iter()
                            .filter(|(_, value)| (min..=max).contains(value))
                            .map(|(member, _)| RespValue::Bulk(Some(member.clone())))
                            .collect()
                    })
                    .unwrap_or_default();
                if command == "ZCOUNT" {
                    RespValue::Integer(members.len() as i64)
                } else {
                    RespValue::Array(members)
                }
            }
            "ZREMRANGEBYRANK" => {
                let Some(zset) = self.zsets.get_mut(args[0]) else {
                    return RespValue::Integer(0);
                };
                match span(zset.len(), number(args[1]), number(args[2])) {
                    Some((first, last)) => RespValue::Integer(zset.drain(first..=last).count() as i64),
                    None => RespValue::Integer(0),
                }
            }
            "ZREMRANGEBYSCORE" => {
                let Some(zset) = self.zsets.get_mut(args[0]) else {
                    return RespValue::Integer(0);
                };
                let (min, max) = (score(args[1]), score(args[2]));
                let before = zset.len();
                zset.retain(|(_, value)| !(min..=max).contains(value));
                RespValue::Integer((before - zset.len()) as i64)
            }
            "PEXPIREAT" => {
                if !self.exists(args[0]) {
                    return RespValue::Integer(0);
                }
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .expect("clock")
                    .as_millis() as i64;
                self.ttls.insert(args[0].to_vec(), (number(args[1]) - now).max(0));
                RespValue::Integer(1)
            }
            "PERSIST" => RespValue::Integer(i64::from(self.ttls.remove(args[0]).is_some())),
            "SCRIPT" => {
                self.script_loaded = true;
                RespValue::Bulk(Some(SHA.as_bytes().to_vec()))
            }
            "EVALSHA" if !self.script_loaded => {
                RespValue::Error(b"NOSCRIPT No matching script. Please use EVAL.".to_vec())
            }
            "EVALSHA" => RespValue::Integer(self.strings.len() as i64),
            "KEYS" => RespValue::Array(
                self.strings
                    .keys()
                    .map(|key| RespValue::Bulk(Some(key.clone())))
                    .collect(),
            ),
            "FLUSHDB" => {
                self.strings.clear();
                self.hashes.clear();
                self.lists.clear();
                self.zsets.clear();
                self.ttls.clear();
                ok()
            }
            other => RespValue::Error(format!("ERR unknown command '{other}'").into_bytes()),
        }
    }

    fn set(&mut self, args: &[&[u8]]) -> RespValue {
        let mut only_if_absent = false;
        let mut ttl = None;
        let mut options = args[2..].iter();
        while let Some(option) = options.next() {
            match *option {
                b"NX" => only_if_absent = true,
                b"PX" => ttl = options.next().map(|millis| number(millis)),
                _ => {}
            }
        }
        if only_if_absent && self.exists(args[0]) {
            return RespValue::Bulk(None);
        }
        self.strings.insert(args[0].to_vec(), args[1].to_vec());
        match ttl {
            Some(ttl) => self.ttls.insert(args[0].to_vec(), ttl),
            None => self.ttls.remove(args[0]),
        };
        ok()
    }
}

fn ok() -> RespValue {
    RespValue::Simple(b"OK".to_vec())
}

fn number(arg: &[u8]) -> i64 {
    std::str::from_utf8(arg).expect("utf8").parse().expect("number")
}

fn score(arg: &[u8]) -> f64 {
    match arg {
        b"-inf" => f64::NEG_INFINITY,
        b"+inf" | b"inf" => f64::INFINITY,
        _ => std::str::from_utf8(arg).expect("utf8").parse().expect("score"),
    }
}

/// Resolves a possibly negative index against `len`.
fn position(len: usize, index: i64) -> Option<usize> {
    let at = if index < 0 { len as i64 + index } else { index };
    (0..len as i64).contains(&at).then_some(at as usize)
}

/// Inclusive index range `start..=stop`, clamped the way LTRIM clamps it.
fn span(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let first = (if start < 0 { len + start } else { start }).max(0);
    let last = (if stop < 0 { len + stop } else { stop }).min(len - 1);
    (first <= last).then_some((first as usize, last as usize))
}

#[derive(Default)]
struct MemoryFactory {
    store: Mutex<Store>,
    closed: AtomicBool,
}

impl MemoryFactory {
    fn log(&self) -> Vec<Vec<String>> {
        self.store.lock().expect("store").log.clone()
    }

    fn names(&self) -> Vec<String> {
        self.log().into_iter().map(|args| args[0].clone()).collect()
    }

    fn forget_scripts(&self) {
        self.store.lock().expect("store").script_loaded = false;
    }
}

struct MemoryConnection<'a> {
    store: &'a Mutex<Store>,
}

impl RawConnection for MemoryConnection<'_> {
    fn execute(&mut self, command: &str, args: &[&[u8]]) -> ClientResult<RespValue> {
        let mut store = self.store.lock().expect("store");
        let mut entry = vec![command.to_string()];
        entry.extend(args.iter().map(|arg| String::from_utf8_lossy(arg).into_owned()));
        store.log.push(entry);
        Ok(store.apply(command, args))
    }
}

impl ConnectionFactory for MemoryFactory {
    fn get_connection(&self) -> ClientResult<Box<dyn RawConnection + '_>> {
        Ok(Box::new(MemoryConnection { store: &self.store }))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn generic_client() -> (RedisClient, Arc<MemoryFactory>) {
    let factory = Arc::new(MemoryFactory::default());
    let client = RedisClientFactory::create(ConnectionDescriptor::Generic(factory.clone()))
        .expect("client");
    (client, factory)
}

#[test]
fn set_if_absent_first_write_wins() {
    let (client, factory) = generic_client();

    assert!(client.set_if_absent("greeting", "v1").expect("first"));
    assert!(!client.set_if_absent("greeting", "v2").expect("second"));
    let value: Option<String> = client.get("greeting").expect("get");
    assert_eq!(value.as_deref(), Some("v1"));
    assert_eq!(factory.names(), vec!["SETNX", "SETNX", "GET"]);
    assert_eq!(client.driver_name(), "generic");
}

#[test]
fn conditional_ttl_write_uses_raw_callback() {
    let (client, factory) = generic_client();

    assert!(client
        .set_if_absent_ex("job", &1, Duration::from_secs(2))
        .expect("first"));
    assert!(!client
        .set_if_absent_ex("job", &2, Duration::from_secs(2))
        .expect("second"));
    assert_eq!(factory.log()[0], vec!["SET", "job", "1", "NX", "PX", "2000"]);
    assert_eq!(
        client.ttl("job").expect("ttl"),
        Ttl::ExpiresIn(Duration::from_secs(2))
    );
}

#[test]
fn plain_ttl_write_uses_psetex() {
    let (client, factory) = generic_client();

    client
        .set_ex("session", "abc", Duration::from_millis(250))
        .expect("set");
    assert_eq!(factory.log()[0], vec!["PSETEX", "session", "250", "\"abc\""]);
    assert!(client
        .set_with("session", "def", SetCondition::Always, None)
        .expect("overwrite"));
    assert_eq!(client.ttl("session").expect("ttl"), Ttl::NoExpiry);
}

#[test]
fn hash_field_with_expiry() {
    let (client, factory) = generic_client();

    let ttl = Duration::from_secs(30);
    client
        .hput_with_expiry("profile", "name", "ann", ttl)
        .expect("hput");
    let name: Option<String> = client.hget("profile", "name").expect("hget");
    assert_eq!(name.as_deref(), Some("ann"));
    let left = client.ttl("profile").expect("ttl").remaining().expect("has ttl");
    assert!(left <= ttl);
    assert_eq!(factory.names(), vec!["HSET", "PEXPIRE", "HGET", "PTTL"]);
}

#[test]
fn push_if_present_goes_one_value_at_a_time() {
    let (client, factory) = generic_client();

    let pushed = client
        .driver()
        .push(ListEnd::Right, b"queue", &[b"a".as_slice(), b"b".as_slice()], true)
        .expect("rpushx");
    assert_eq!(pushed, 0);

    client.lpush("queue", "first").expect("lpush");
    let pushed = client
        .driver()
        .push(ListEnd::Right, b"queue", &[b"a".as_slice(), b"b".as_slice()], true)
        .expect("rpushx");
    assert_eq!(pushed, 3);
    assert_eq!(
        factory.names(),
        vec!["RPUSHX", "RPUSHX", "LPUSH", "RPUSHX", "RPUSHX"]
    );
}

#[test]
fn cached_script_reloads_after_noscript() {
    let (client, factory) = generic_client();
    let script = Script::new("return #redis.call('keys', '*')", ReturnType::Integer);
    client.set("a", &1).expect("set");

    let count: ScriptValue<()> = client
        .run_cached_script(&script, &["a"], &[] as &[String])
        .expect("first run");
    assert_eq!(count.as_integer(), Some(1));
    assert_eq!(script.cached_sha(), Some(SHA));

    client
        .run_cached_script::<(), String>(&script, &["a"], &[])
        .expect("cached run");

    factory.forget_scripts();
    client
        .run_cached_script::<(), String>(&script, &["a"], &[])
        .expect("reload");

    assert_eq!(
        factory.names(),
        vec!["SET", "SCRIPT", "EVALSHA", "EVALSHA", "EVALSHA", "SCRIPT", "EVALSHA"]
    );
}

#[test]
fn keyspace_commands_are_available() {
    let (client, _factory) = generic_client();

    client.set("a", &1).expect("set");
    client.set("b", &2).expect("set");
    let keys = client.keys("*").expect("keys");
    assert_eq!(keys, HashSet::from(["a".to_string(), "b".to_string()]));
    client.flush_db().expect("flush");
    assert!(client.keys("*").expect("keys").is_empty());
}

#[test]
fn close_reaches_factory() {
    let (client, factory) = generic_client();
    client.close();
    assert!(factory.closed.load(Ordering::SeqCst));
}

#[test]
fn template_callback_lends_one_connection() {
    let factory = Arc::new(MemoryFactory::default());
    let template = CacheTemplate::new(factory.clone());

    let reply = template
        .execute(|conn| {
            conn.execute("SET", &[b"k".as_slice(), b"v".as_slice()])?;
            conn.execute("GET", &[b"k".as_slice()])
        })
        .expect("execute");
    assert_eq!(reply, RespValue::Bulk(Some(b"v".to_vec())));
    assert!(template.has_key(b"k").expect("exists"));
    assert_eq!(template.bound_list_ops(b"missing").size().expect("llen"), 0);
    assert_eq!(factory.names(), vec!["SET", "GET", "EXISTS", "LLEN"]);
}

#[test]
fn list_editing_follows_list_semantics() {
    let (client, factory) = generic_client();

    assert_eq!(client.rpush_all("queue", &["a", "b", "a", "c", "a"]).expect("rpush"), 5);
    assert_eq!(client.lremove("queue", -1, "a").expect("lrem tail"), 1);
    let last: Option<String> = client.lindex("queue", -1).expect("lindex");
    assert_eq!(last.as_deref(), Some("c"));
    client.lset("queue", 1, "z").expect("lset");
    assert_eq!(client.linsert_before("queue", "c", "y").expect("linsert"), 5);
    assert_eq!(client.linsert_before("queue", "gone", "y").expect("linsert"), -1);
    assert_eq!(client.lremove_all("queue", "a").expect("lrem all"), 2);
    client.ltrim("queue", 0, 1).expect("ltrim");

    let items: Vec<String> = client.lrange("queue", 0, -1).expect("lrange");
    assert_eq!(items, vec!["z", "y"]);
    assert_eq!(client.lsize("queue").expect("llen"), 2);

    let log = factory.log();
    let find = |name: &str| log.iter().find(|entry| entry[0] == name).cloned().expect(name);
    assert_eq!(find("LINSERT"), vec!["LINSERT", "queue", "BEFORE", "\"c\"", "\"y\""]);
    assert_eq!(find("LSET"), vec!["LSET", "queue", "1", "\"z\""]);
    assert_eq!(find("LTRIM"), vec!["LTRIM", "queue", "0", "1"]);
    assert!(log.contains(&vec!["LREM".to_string(), "queue".into(), "0".into(), "\"a\"".into()]));
}

#[test]
fn sorted_set_ranges_by_score_and_rank() {
    let (client, factory) = generic_client();

    let added = client
        .zadd_multi("board", &[("ann", 1.0), ("bob", 2.5), ("cy", 4.0)])
        .expect("zadd");
    assert_eq!(added, 3);
    assert_eq!(client.zincr_score("board", "ann", 2.0).expect("zincrby"), 3.0);

    let low: Vec<String> = client
        .zrange_by_score("board", f64::NEG_INFINITY, 3.0)
        .expect("zrangebyscore");
    assert_eq!(low, vec!["bob", "ann"]);
    assert_eq!(client.zcount("board", 3.0, f64::INFINITY).expect("zcount"), 2);
    assert_eq!(client.zremove_range("board", 0, 0).expect("by rank"), 1);
    assert_eq!(client.zremove_by_score("board", 4.0, f64::INFINITY).expect("by score"), 1);
    assert_eq!(client.zscore("board", "ann").expect("zscore"), Some(3.0));
    assert_eq!(client.zscore("board", "bob").expect("zscore"), None);

    let log = factory.log();
    assert_eq!(log[1], vec!["ZINCRBY", "board", "2", "\"ann\""]);
    assert_eq!(log[2], vec!["ZRANGEBYSCORE", "board", "-inf", "3"]);
    assert_eq!(log[3], vec!["ZCOUNT", "board", "3", "+inf"]);
    assert_eq!(log[4], vec!["ZREMRANGEBYRANK", "board", "0", "0"]);
    assert_eq!(log[5], vec!["ZREMRANGEBYSCORE", "board", "4", "+inf"]);
}

#[test]
fn float_counter_deadline_and_persist() {
    let (client, factory) = generic_client();

    client.set("total", &10.5).expect("set");
    assert_eq!(client.incr_by_float("total", 0.25).expect("incrbyfloat"), 10.75);
    assert_eq!(factory.log()[1], vec!["INCRBYFLOAT", "total", "0.25"]);

    let deadline = SystemTime::now() + Duration::from_secs(60);
    assert!(client.expire_at("total", deadline).expect("pexpireat"));
    assert!(!client.expire_at("absent", deadline).expect("pexpireat"));
    let left = client.ttl("total").expect("ttl").remaining().expect("has ttl");
    assert!(left <= Duration::from_secs(60));

    assert!(client.persist("total").expect("persist"));
    assert!(!client.persist("total").expect("persist again"));
    assert_eq!(client.ttl("total").expect("ttl"), Ttl::NoExpiry);
}
