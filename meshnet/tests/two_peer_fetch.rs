//! Scenario 2 (spec §8): one peer fetches a block from another over a
//! freshly dialed stream connection.

use std::time::Duration;

use meshnet::{derive_identity, Node, NodeConfig};

fn node() -> (tempfile::TempDir, std::sync::Arc<Node>) {
    let identity = derive_identity().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let config = NodeConfig::new(identity.identifier, identity.credential, dir.path());
    (dir, Node::new(config).unwrap())
}

#[test]
fn positive_fetch_block_from_connected_peer() {
    let (_dir_a, a) = node();
    let (_dir_b, b) = node();

    let b_addresses = b.listen_stream("127.0.0.1:0".parse().unwrap()).unwrap();
    let b_addr = match b_addresses[0] {
        meshnet_backend::Address::Socket(addr) => addr,
        other => panic!("expected a socket address, got {:?}", other),
    };
    a.listen_stream("127.0.0.1:0".parse().unwrap()).unwrap();

    let record = b.share_bytes("song.flac", b"some audio bytes").unwrap();
    let digest = record.block_digests[0];

    let peer = a.connect_stream(b_addr, None).unwrap();
    assert_eq!(peer, b.identifier());

    let bytes = a.fetch_block(peer, digest, Duration::from_secs(5)).unwrap();
    assert_eq!(bytes, b"some audio bytes");
}

#[test]
fn negative_fetch_from_unknown_peer_errors() {
    let (_dir_a, a) = node();
    let (_dir_b, b) = node();

    let digest = meshnet_util::Digest::from_bytes(b"never pushed anywhere");
    let result = a.fetch_block(b.identifier(), digest, Duration::from_millis(50));
    assert!(result.is_err());
}
