//! # UniCache Client
//!
//! Purpose: One typed cache API over three ways of reaching a Redis-compatible
//! store: a single node through a connection pool, a slot-sharded cluster, or
//! any user-supplied connection factory.
//!
//! ## Design Principles
//! 1. **One Contract**: Every driver implements the byte-level `Commands`
//!    trait; `RedisClient` adds key/value encoding on top.
//! 2. **Closed Selection**: `ConnectionDescriptor` names the driver; the
//!    factory is the only place drivers are built.
//! 3. **One Error**: Every public operation returns `CacheError`, with the
//!    transport cause kept as its source.
//! 4. **Protocol Clarity**: RESP2 is encoded and parsed explicitly.

mod client;
mod cluster;
pub mod cmd;
mod config;
mod contract;
mod direct;
mod error;
mod factory;
mod lock;
mod pipeline;
mod pool;
mod registry;
mod reply;
mod resp;
pub mod template;

pub use client::RedisClient;
pub use cluster::{hash_slot, ClusterConnection, SlotMap, SLOT_COUNT};
pub use cmd::Cmd;
pub use config::{ClientConfig, ClusterConfig};
pub use contract::{Commands, ListEnd, SetOp};
pub use error::{ClientError, ClientResult};
pub use factory::{ConnectionDescriptor, RedisClientFactory};
pub use lock::{RedisLock, LOCK_KEY_PREFIX};
pub use pipeline::Pipeline;
pub use pool::{ConnectionPool, PooledConnection};
pub use registry::{global as global_registry, ClientRegistry};
pub use resp::RespValue;
pub use unicache_common::{
    BincodeCodec, CacheError, CacheResult, ErrorKind, Expiry, JsonCodec, KeyCodec, ReturnType,
    Script, ScriptValue, SetCondition, Ttl, ValueCodec,
};
