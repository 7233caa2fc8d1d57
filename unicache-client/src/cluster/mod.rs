//! # Cluster Routing
//!
//! Purpose: Send each command to the node owning its key's hash slot, keeping
//! one `ConnectionPool` per node.
//!
//! ## Design Principles
//! 1. **Lazy Topology**: Nothing touches the network until the first routed
//!    command; the slot table is then fetched with `CLUSTER SLOTS` from the
//!    seed nodes.
//! 2. **Redirects Are Routing**: `MOVED` repoints the slot and re-sends,
//!    `ASK` re-sends once to the target behind `ASKING`. Both count against
//!    `max_redirects`. Failed commands are never retried.
//! 3. **Shared Handle**: Cloning a `ClusterConnection` shares its pools and
//!    slot table.

mod driver;
pub mod slots;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::cmd::Cmd;
use crate::config::ClusterConfig;
use crate::error::{ClientError, ClientResult};
use crate::pool::ConnectionPool;
use crate::resp::RespValue;

pub(crate) use driver::ClusterDriver;
pub use slots::{hash_slot, SlotMap, SLOT_COUNT};

struct ClusterInner {
    config: ClusterConfig,
    slots: RwLock<Option<SlotMap>>,
    pools: Mutex<HashMap<String, ConnectionPool>>,
}

/// Slot-aware handle over every node of one cluster.
#[derive(Clone)]
pub struct ClusterConnection {
    inner: Arc<ClusterInner>,
}

#[derive(Debug, PartialEq, Eq)]
enum Redirect {
    Moved { slot: u16, addr: String },
    Ask { addr: String },
}

impl ClusterConnection {
    /// Creates the handle. No connection is opened here.
    pub fn new(config: ClusterConfig) -> ClientResult<Self> {
        if config.seeds.is_empty() {
            return Err(ClientError::InvalidAddress(
                "cluster needs at least one seed node".to_string(),
            ));
        }
        Ok(ClusterConnection {
            inner: Arc::new(ClusterInner {
                config,
                slots: RwLock::new(None),
                pools: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    /// Runs `cmd` on the node owning `key`.
    pub fn exec(&self, key: &[u8], cmd: &Cmd) -> ClientResult<RespValue> {
        self.exec_on_slot(hash_slot(key), cmd)
    }

    /// Runs `cmd` on the owner of `slot`, following MOVED/ASK redirects.
    ///
    /// Error replies other than redirects are returned as `RespValue::Error`.
    pub fn exec_on_slot(&self, slot: u16, cmd: &Cmd) -> ClientResult<RespValue> {
        let mut addr = self.node_for_slot(slot)?;
        let mut asking = false;

        for _ in 0..=self.inner.config.max_redirects {
            let reply = self.send(&addr, cmd, asking)?;
            match parse_redirect(&reply) {
                Some(Redirect::Moved { slot: moved, addr: target }) => {
                    warn!(slot = moved, from = %addr, to = %target, "MOVED redirect");
                    if let Some(map) = self.inner.slots.write().as_mut() {
                        map.assign(moved, &target);
                    }
                    addr = target;
                    asking = false;
                }
                Some(Redirect::Ask { addr: target }) => {
                    debug!(slot, from = %addr, to = %target, "ASK redirect");
                    addr = target;
                    asking = true;
                }
                None => return Ok(reply),
            }
        }
        Err(ClientError::TooManyRedirects { slot })
    }

    /// Runs a keyless command on one master.
    pub fn exec_any(&self, cmd: &Cmd) -> ClientResult<RespValue> {
        let addr = self.any_master()?;
        self.send(&addr, cmd, false)
    }

    /// Re-reads the slot table from the seeds, then from the known masters.
    pub fn refresh_topology(&self) -> ClientResult<()> {
        let mut candidates = self.inner.config.seeds.clone();
        candidates.shuffle(&mut rand::rng());
        if let Some(map) = self.inner.slots.read().as_ref() {
            candidates.extend(map.masters());
        }

        let mut last_err = None;
        for node in candidates {
            match self.fetch_slots(&node) {
                Ok(map) => {
                    debug!(node = %node, masters = map.masters().len(), "cluster slots refreshed");
                    *self.inner.slots.write() = Some(map);
                    return Ok(());
                }
                Err(err) => {
                    warn!(node = %node, error = %err, "failed to fetch cluster slots");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            ClientError::InvalidAddress("cluster needs at least one seed node".to_string())
        }))
    }

    /// Closes every node pool and forgets the topology.
    pub fn close(&self) {
        let pools: Vec<ConnectionPool> = self.inner.pools.lock().drain().map(|(_, p)| p).collect();
        for pool in pools {
            pool.close();
        }
        *self.inner.slots.write() = None;
    }

    /// Number of node pools opened so far.
    pub fn known_nodes(&self) -> usize {
        self.inner.pools.lock().len()
    }

    fn send(&self, addr: &str, cmd: &Cmd, asking: bool) -> ClientResult<RespValue> {
        let mut conn = self.pool_for(addr)?.acquire()?;
        if !asking {
            return conn.exec(cmd);
        }
        let mut replies = conn.exec_batch(&[Cmd::new("ASKING"), cmd.clone()])?;
        replies
            .pop()
            .ok_or(ClientError::Protocol("missing reply after ASKING"))
    }

    fn fetch_slots(&self, node: &str) -> ClientResult<SlotMap> {
        let mut conn = self.pool_for(node)?.acquire()?;
        let reply = conn.exec(&Cmd::new("CLUSTER").arg("SLOTS"))?.into_result()?;
        SlotMap::from_slots_response(reply, node)
    }

    fn node_for_slot(&self, slot: u16) -> ClientResult<String> {
        if let Some(map) = self.inner.slots.read().as_ref() {
            return map
                .master_for_slot(slot)
                .map(str::to_string)
                .ok_or(ClientError::SlotUnassigned(slot));
        }
        self.refresh_topology()?;
        self.inner
            .slots
            .read()
            .as_ref()
            .and_then(|map| map.master_for_slot(slot).map(str::to_string))
            .ok_or(ClientError::SlotUnassigned(slot))
    }

    fn any_master(&self) -> ClientResult<String> {
        if self.inner.slots.read().is_none() {
            self.refresh_topology()?;
        }
        self.inner
            .slots
            .read()
            .as_ref()
            .and_then(|map| map.masters().into_iter().next())
            .ok_or(ClientError::SlotUnassigned(0))
    }

    fn pool_for(&self, addr: &str) -> ClientResult<ConnectionPool> {
        let mut pools = self.inner.pools.lock();
        if let Some(pool) = pools.get(addr) {
            return Ok(pool.clone());
        }
        let pool = ConnectionPool::new(self.inner.config.node_config(addr))?;
        pools.insert(addr.to_string(), pool.clone());
        Ok(pool)
    }
}

fn parse_redirect(reply: &RespValue) -> Option<Redirect> {
    let message = match reply {
        RespValue::Error(message) => std::str::from_utf8(message).ok()?,
        _ => return None,
    };
    let mut parts = message.split_whitespace();
    let kind = parts.next()?;
    let slot = parts.next()?.parse::<u16>().ok()?;
    let addr = parts.next()?.to_string();
    match kind {
        "MOVED" => Some(Redirect::Moved { slot, addr }),
        "ASK" => Some(Redirect::Ask { addr }),
        _ => None,
    }
}
