mod common;

use std::sync::Arc;

use common::{config_for, write_bulk, write_simple, MockServer};
use unicache_client::{
    global_registry, BincodeCodec, ClientConfig, ConnectionDescriptor, ErrorKind,
    RedisClientFactory, ValueCodec,
};

#[test]
fn injected_codec_shapes_the_wire_bytes() {
    let server = MockServer::start(|args, stream| match args[0].as_str() {
        "SET" => write_simple(stream, "OK"),
        "GET" => write_bulk(stream, "*\0\0\0"),
        other => panic!("unexpected {other}"),
    });
    let client = RedisClientFactory::create_with_codec(
        ConnectionDescriptor::Direct(config_for(&server.addr)),
        BincodeCodec,
    )
    .expect("client");

    client.set("answer", &42u32).expect("set");
    let value: Option<u32> = client.get("answer").expect("get");
    assert_eq!(value, Some(42));
    assert_eq!(server.commands()[0], vec!["SET", "answer", "*\0\0\0"]);
    assert_eq!(client.codec().name(), "bincode");
    assert_eq!(client.raw_value(&42u32).expect("encode"), vec![42, 0, 0, 0]);
    assert_eq!(client.raw_key("answer"), b"answer".to_vec());
}

#[test]
fn endpoint_string_selects_driver() {
    let server = MockServer::start(|_, stream| write_simple(stream, "PONG"));
    let endpoint = format!("redis://{}", server.addr);

    let client = RedisClientFactory::from_endpoint(&endpoint, &config_for("ignored:0")).expect("client");
    assert_eq!(client.driver_name(), "direct");
    client.ping().expect("ping");

    let cluster = RedisClientFactory::from_endpoint(
        "redis+cluster://127.0.0.1:1,127.0.0.1:2",
        &ClientConfig::default(),
    )
    .expect("cluster client");
    assert_eq!(cluster.driver_name(), "cluster");
}

#[test]
fn unrecognized_endpoint_builds_nothing() {
    for endpoint in ["memcached://127.0.0.1:11211", "127.0.0.1:6379", "redis+cluster://"] {
        let err = RedisClientFactory::from_endpoint(endpoint, &ClientConfig::default())
            .err()
            .expect("rejected");
        assert_eq!(err.kind(), ErrorKind::IllegalArgument, "{endpoint}");
    }
}

#[test]
fn global_registry_shares_named_clients() {
    let server = MockServer::start(|_, stream| write_simple(stream, "PONG"));
    let config = config_for(&server.addr);

    let first = global_registry()
        .get_or_create("factory-test", || {
            RedisClientFactory::create(ConnectionDescriptor::Direct(config.clone()))
        })
        .expect("first");
    let second = global_registry()
        .get_or_create("factory-test", || panic!("already registered"))
        .expect("second");
    assert!(Arc::ptr_eq(&first, &second));
    second.ping().expect("ping");
    assert!(global_registry().names().contains(&"factory-test".to_string()));
}
