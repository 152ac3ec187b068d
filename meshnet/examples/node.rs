//! Minimal two-node demo: bind a stream backend, optionally dial a peer
//! given on the command line, and print every `Notify` that arrives.
//!
//! ```text
//! cargo run --example node -- 127.0.0.1:4001
//! cargo run --example node -- 127.0.0.1:4002 127.0.0.1:4001
//! ```

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::info;
use meshnet_peer::Listener;
use meshnet_util::Identifier;
use meshnet::{derive_identity, Node, NodeConfig};

struct PrintListener;

impl Listener for PrintListener {
    fn recv(&self, source: Identifier, payload: Vec<u8>) {
        info!("notify from {:?}: {}", source, String::from_utf8_lossy(&payload));
    }
}

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let bind_addr: SocketAddr = args
        .next()
        .expect("usage: node <bind-addr> [peer-addr]")
        .parse()
        .expect("bind address must be host:port");
    let peer_addr: Option<SocketAddr> = args.next().map(|s| s.parse().expect("peer address must be host:port"));

    let identity = derive_identity().expect("failed to generate node identity");
    info!("local identifier: {:?}", identity.identifier);

    let data_dir = env::temp_dir().join(format!("meshnet-{:?}", identity.identifier));
    let config = NodeConfig::new(identity.identifier, identity.credential, data_dir);
    let node = Node::new(config).expect("failed to start node");

    node.register_listener(Arc::new(PrintListener));

    let addresses = node.listen_stream(bind_addr).expect("failed to bind stream backend");
    info!("listening on {:?}", addresses);

    if let Some(peer_addr) = peer_addr {
        let peer = node.connect_stream(peer_addr, None).expect("failed to dial peer");
        info!("connected to {:?}", peer);
        node.notify_one(peer, b"hello from meshnet".to_vec(), true).unwrap();
    }

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}
