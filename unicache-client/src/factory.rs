//! Driver selection.
//!
//! A `ConnectionDescriptor` says which kind of backend to talk to; the
//! factory turns it into the matching driver behind `Box<dyn Commands>` and
//! wraps that in a typed `RedisClient`. Endpoint strings are parsed into a
//! descriptor first, so both paths reject bad input the same way.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use unicache_common::{CacheError, CacheResult, JsonCodec, ValueCodec};

use crate::client::RedisClient;
use crate::cluster::{ClusterConnection, ClusterDriver};
use crate::config::{ClientConfig, ClusterConfig};
use crate::contract::Commands;
use crate::direct::DirectDriver;
use crate::pool::ConnectionPool;
use crate::template::{ConnectionFactory, GenericDriver};

const DIRECT_SCHEME: &str = "redis://";
const CLUSTER_SCHEME: &str = "redis+cluster://";

/// What kind of backend a client connects to.
#[derive(Clone)]
pub enum ConnectionDescriptor {
    /// One server through a pool.
    Direct(ClientConfig),
    /// A slot-sharded cluster discovered from seed nodes.
    Cluster(ClusterConfig),
    /// Any connection factory, driven through the command template.
    Generic(Arc<dyn ConnectionFactory>),
}

impl ConnectionDescriptor {
    /// Parses `redis://host:port` or `redis+cluster://h1:p1,h2:p2`.
    ///
    /// `config` supplies pool and auth settings; its address is replaced by
    /// the endpoint's.
    pub fn parse(endpoint: &str, config: &ClientConfig) -> CacheResult<Self> {
        if let Some(nodes) = endpoint.strip_prefix(CLUSTER_SCHEME) {
            let seeds = split_nodes(nodes);
            if seeds.is_empty() {
                return Err(CacheError::illegal_argument(format!(
                    "cluster endpoint {endpoint:?} lists no nodes"
                )));
            }
            let cluster = ClusterConfig {
                seeds,
                node: config.clone(),
                ..ClusterConfig::default()
            };
            return Ok(ConnectionDescriptor::Cluster(cluster));
        }
        if let Some(node) = endpoint.strip_prefix(DIRECT_SCHEME) {
            let mut nodes = split_nodes(node);
            if nodes.len() != 1 {
                return Err(CacheError::illegal_argument(format!(
                    "direct endpoint {endpoint:?} must name exactly one node"
                )));
            }
            let direct = ClientConfig {
                addr: nodes.remove(0),
                ..config.clone()
            };
            return Ok(ConnectionDescriptor::Direct(direct));
        }
        Err(CacheError::illegal_argument(format!(
            "unrecognized connection endpoint {endpoint:?}"
        )))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionDescriptor::Direct(_) => "direct",
            ConnectionDescriptor::Cluster(_) => "cluster",
            ConnectionDescriptor::Generic(_) => "generic",
        }
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionDescriptor::Direct(config) => f.debug_tuple("Direct").field(config).finish(),
            ConnectionDescriptor::Cluster(config) => f.debug_tuple("Cluster").field(config).finish(),
            ConnectionDescriptor::Generic(_) => f.write_str("Generic(..)"),
        }
    }
}

/// Builds clients from descriptors.
pub struct RedisClientFactory;

impl RedisClientFactory {
    /// Client with the default JSON value codec.
    pub fn create(descriptor: ConnectionDescriptor) -> CacheResult<RedisClient<JsonCodec>> {
        Self::create_with_codec(descriptor, JsonCodec)
    }

    pub fn create_with_codec<C: ValueCodec>(
        descriptor: ConnectionDescriptor,
        codec: C,
    ) -> CacheResult<RedisClient<C>> {
        let kind = descriptor.kind();
        let driver = Self::driver_for(descriptor)?;
        debug!(driver = kind, codec = codec.name(), "cache client created");
        Ok(RedisClient::new(driver, codec))
    }

    /// Parses `endpoint` and creates a JSON-codec client for it.
    pub fn from_endpoint(endpoint: &str, config: &ClientConfig) -> CacheResult<RedisClient<JsonCodec>> {
        Self::create(ConnectionDescriptor::parse(endpoint, config)?)
    }

    fn driver_for(descriptor: ConnectionDescriptor) -> CacheResult<Box<dyn Commands>> {
        let driver: Box<dyn Commands> = match descriptor {
            ConnectionDescriptor::Direct(config) => {
                let pool = ConnectionPool::new(config).map_err(invalid_descriptor)?;
                Box::new(DirectDriver::new(pool))
            }
            ConnectionDescriptor::Cluster(config) => {
                let conn = ClusterConnection::new(config).map_err(invalid_descriptor)?;
                Box::new(ClusterDriver::new(conn))
            }
            ConnectionDescriptor::Generic(factory) => Box::new(GenericDriver::new(factory)),
        };
        Ok(driver)
    }
}

fn split_nodes(nodes: &str) -> Vec<String> {
    nodes
        .split(',')
        .map(|node| node.trim().trim_end_matches('/'))
        .filter(|node| !node.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid_descriptor(err: crate::error::ClientError) -> CacheError {
    CacheError::illegal_argument(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_direct_endpoint() {
        let config = ClientConfig {
            database: 2,
            ..ClientConfig::default()
        };
        match ConnectionDescriptor::parse("redis://10.1.2.3:6380", &config).unwrap() {
            ConnectionDescriptor::Direct(direct) => {
                assert_eq!(direct.addr, "10.1.2.3:6380");
                assert_eq!(direct.database, 2);
            }
            other => panic!("unexpected descriptor {other:?}"),
        }
    }

    #[test]
    fn parses_cluster_seeds() {
        let descriptor =
            ConnectionDescriptor::parse("redis+cluster://a:7000, b:7001,", &ClientConfig::default())
                .unwrap();
        match descriptor {
            ConnectionDescriptor::Cluster(cluster) => {
                assert_eq!(cluster.seeds, vec!["a:7000".to_string(), "b:7001".to_string()]);
                assert_eq!(cluster.max_redirects, 5);
            }
            other => panic!("unexpected descriptor {other:?}"),
        }
    }

    #[test]
    fn unknown_scheme_is_illegal() {
        let err = ConnectionDescriptor::parse("memcached://host:11211", &ClientConfig::default())
            .unwrap_err();
        assert!(err.is_illegal_argument());
    }

    #[test]
    fn empty_cluster_is_illegal() {
        let err = ConnectionDescriptor::parse("redis+cluster://", &ClientConfig::default())
            .unwrap_err();
        assert!(err.is_illegal_argument());
    }

    #[test]
    fn direct_with_two_nodes_is_illegal() {
        let err = ConnectionDescriptor::parse("redis://a:1,b:2", &ClientConfig::default())
            .unwrap_err();
        assert!(err.is_illegal_argument());
    }

    #[test]
    fn cluster_descriptor_without_seeds_builds_nothing() {
        let err = RedisClientFactory::create(ConnectionDescriptor::Cluster(ClusterConfig::default()))
            .err()
            .expect("no client");
        assert!(err.is_illegal_argument());
    }

    #[test]
    fn factory_does_not_connect() {
        let client = RedisClientFactory::from_endpoint("redis://127.0.0.1:1", &ClientConfig::default())
            .unwrap();
        assert_eq!(client.driver_name(), "direct");
    }
}
