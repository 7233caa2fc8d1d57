//! Connection settings for the direct and cluster drivers.
//!
//! Both structs deserialize with every field optional, so bootstrap code can
//! load them from a JSON document holding only the values it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one node and its pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Maximum idle connections kept in the pool.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// ACL user; only sent together with `password`.
    pub username: Option<String>,
    /// Sent with AUTH right after the socket connects.
    pub password: Option<String>,
    /// Logical database selected on connect. Cluster nodes only accept 0.
    pub database: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:6379".to_string(),
            max_idle: 8,
            max_total: 16,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
            username: None,
            password: None,
            database: 0,
        }
    }
}

impl ClientConfig {
    /// Default settings pointed at `addr`.
    pub fn with_addr(addr: impl Into<String>) -> Self {
        ClientConfig {
            addr: addr.into(),
            ..ClientConfig::default()
        }
    }
}

/// Configuration for the cluster driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Nodes asked for the slot table, tried in order.
    pub seeds: Vec<String>,
    /// Upper bound on MOVED/ASK hops for one command.
    pub max_redirects: usize,
    /// Pool settings applied to every node; `addr` is ignored.
    pub node: ClientConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            seeds: Vec::new(),
            max_redirects: 5,
            node: ClientConfig::default(),
        }
    }
}

impl ClusterConfig {
    pub fn with_seeds<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ClusterConfig {
            seeds: seeds.into_iter().map(Into::into).collect(),
            ..ClusterConfig::default()
        }
    }

    /// Node settings for one cluster member.
    pub(crate) fn node_config(&self, addr: &str) -> ClientConfig {
        ClientConfig {
            addr: addr.to_string(),
            ..self.node.clone()
        }
    }
}
