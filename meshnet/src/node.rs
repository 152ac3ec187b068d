//! The node facade (SPEC_FULL §4): wires identity, transport backends,
//! routing, pub/sub, and block storage into one object an embedder drives.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use log::warn;

use meshnet_backend::{
    Address, Backend, DatagramBackend, Locator, StreamBackend, Transport, TunnelBackend, TunnelSink,
};
use meshnet_peer::{Caller, CallerRegistry, Handler, Listener, TunnelDeliver};
use meshnet_pubsub::{Publisher, PubSubTable, Subscriber};
use meshnet_resource::{chunk_into_store, IndexRecord, Reader};
use meshnet_router::Router;
use meshnet_runtime::WorkerPool;
use meshnet_store::{BlockStore, NativeFileSystem};
use meshnet_transport::Credential;
use meshnet_util::{Digest, Identifier};
use meshnet_wire::{Content, Message, MessageType};

use crate::config::NodeConfig;
use crate::error::{NodeErrorKind, NodeResult};

type PeerHandler = Handler<NativeFileSystem, meshnet_backend::carrier::BoxedCarrier>;

/// Bridges `meshnet-backend`'s [`TunnelSink`] and `meshnet-peer`'s
/// [`TunnelDeliver`] to a [`Node`] without giving either side a strong
/// reference back to it: the node owns its tunnel backend through an
/// `Arc`, so a strong backreference here would leak the pair (spec §9's
/// cycle-avoidance note, applied one layer up from `Router`/`Handler`).
struct TunnelBridge(Weak<Node>);

impl TunnelSink for TunnelBridge {
    fn send_tunnel(&self, local: Identifier, remote: Identifier, bytes: &[u8]) -> io::Result<()> {
        let node = self
            .0
            .upgrade()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "node has been dropped"))?;
        let message = Message::new(MessageType::Tunnel, local, remote, Content::Tunnel { bytes: bytes.to_vec() });
        node.router
            .route(&message, None)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))
    }
}

impl TunnelDeliver for TunnelBridge {
    fn deliver_tunnel(&self, local: Identifier, remote: Identifier, bytes: Vec<u8>) {
        if let Some(node) = self.0.upgrade() {
            if let Some(backend) = node.tunnel_backend.lock().unwrap().as_ref() {
                backend.deliver_inbound(local, remote, &bytes);
            }
        }
    }
}

struct NoopCaller;
impl Caller for NoopCaller {
    fn on_arrived(&self, _digest: Digest) {}
}

/// A running mesh participant: its own identity, the peers it has
/// authenticated links to, and the routing/storage/pub-sub state shared
/// across them (spec §4.1-§4.8).
pub struct Node {
    config: NodeConfig,
    router: Arc<Router>,
    store: Arc<BlockStore<NativeFileSystem>>,
    pubsub: Arc<PubSubTable>,
    callers: Arc<CallerRegistry>,
    worker_pool: WorkerPool,
    handlers: Mutex<HashMap<Identifier, Arc<PeerHandler>>>,
    global_listeners: Mutex<Vec<Arc<dyn Listener>>>,
    tunnel_bridge: Arc<TunnelBridge>,
    stream_backend: Mutex<Option<Arc<StreamBackend>>>,
    datagram_backend: Mutex<Option<Arc<DatagramBackend>>>,
    tunnel_backend: Mutex<Option<Arc<TunnelBackend>>>,
}

impl Node {
    /// Build a node around `config`. No backend is started until one of
    /// `listen_stream`/`listen_datagram`/`listen_tunnel` is called.
    pub fn new(config: NodeConfig) -> NodeResult<Arc<Node>> {
        let router = Arc::new(Router::with_capacity(config.route_table_capacity));
        let store = Arc::new(BlockStore::open(config.data_dir.clone())?);
        let pubsub = Arc::new(PubSubTable::new());
        let callers = Arc::new(CallerRegistry::new());
        let worker_pool = WorkerPool::new(config.worker_pool.min, config.worker_pool.max, config.worker_pool.limit);

        Ok(Arc::new_cyclic(|weak| Node {
            config,
            router,
            store,
            pubsub,
            callers,
            worker_pool,
            handlers: Mutex::new(HashMap::new()),
            global_listeners: Mutex::new(Vec::new()),
            tunnel_bridge: Arc::new(TunnelBridge(weak.clone())),
            stream_backend: Mutex::new(None),
            datagram_backend: Mutex::new(None),
            tunnel_backend: Mutex::new(None),
        }))
    }

    pub fn identifier(&self) -> Identifier {
        self.config.identifier
    }

    /// Start (or restart) a TCP backend bound at `addr` and spawn its
    /// accept loop on the worker pool (spec §4.4).
    pub fn listen_stream(self: &Arc<Self>, addr: SocketAddr) -> NodeResult<Vec<Address>> {
        let backend = Arc::new(StreamBackend::bind(addr, self.config.credential.clone())?);
        let addresses = backend.addresses();
        *self.stream_backend.lock().unwrap() = Some(backend.clone());
        self.spawn_accept_loop(backend)?;
        Ok(addresses)
    }

    /// Start (or restart) a UDP backend bound at `addr` and spawn its
    /// accept loop on the worker pool (spec §4.4).
    pub fn listen_datagram(self: &Arc<Self>, addr: SocketAddr) -> NodeResult<Vec<Address>> {
        let backend = Arc::new(DatagramBackend::bind(addr, self.config.credential.clone())?);
        let addresses = backend.addresses();
        *self.datagram_backend.lock().unwrap() = Some(backend.clone());
        self.spawn_accept_loop(backend)?;
        Ok(addresses)
    }

    /// Enable tunneling overlay messages to peers with no direct transport
    /// (spec §4.4) and spawn its accept loop.
    pub fn listen_tunnel(self: &Arc<Self>) -> NodeResult<()> {
        let backend = Arc::new(TunnelBackend::new(
            self.config.identifier,
            self.tunnel_bridge.clone(),
            self.config.credential.clone(),
        ));
        *self.tunnel_backend.lock().unwrap() = Some(backend.clone());
        self.spawn_accept_loop(backend)?;
        Ok(())
    }

    fn spawn_accept_loop(self: &Arc<Self>, backend: Arc<dyn Backend>) -> NodeResult<()> {
        let node = self.clone();
        self.worker_pool.execute(move || loop {
            match backend.listen() {
                Ok(transport) => {
                    if let Err(err) = node.register_transport(transport, None) {
                        warn!("meshnet: failed to register inbound connection: {}", err);
                    }
                }
                Err(err) => {
                    warn!("meshnet: accept loop stopping: {}", err);
                    return;
                }
            }
        })?;
        Ok(())
    }

    /// Dial a peer over the stream backend started with `listen_stream`.
    /// `target` is the identifier the dial is expected to authenticate as;
    /// it is only required as a fallback for non-certificate credentials,
    /// since a certificate-mode handshake reports its own identifier.
    pub fn connect_stream(self: &Arc<Self>, addr: SocketAddr, target: Option<Identifier>) -> NodeResult<Identifier> {
        let backend = self
            .stream_backend
            .lock()
            .unwrap()
            .clone()
            .ok_or(NodeErrorKind::BackendNotListening { kind: "stream" })?;
        let locator = Locator::to_addresses("meshnet", vec![addr]);
        let transport = backend.dial(&locator)?;
        self.register_transport(transport, target)
    }

    /// Dial a peer over the datagram backend started with `listen_datagram`.
    pub fn connect_datagram(self: &Arc<Self>, addr: SocketAddr, target: Option<Identifier>) -> NodeResult<Identifier> {
        let backend = self
            .datagram_backend
            .lock()
            .unwrap()
            .clone()
            .ok_or(NodeErrorKind::BackendNotListening { kind: "datagram" })?;
        let locator = Locator::to_addresses("meshnet", vec![addr]);
        let transport = backend.dial(&locator)?;
        self.register_transport(transport, target)
    }

    /// Open a tunnel to `target` carried over overlay messages, started
    /// with `listen_tunnel`.
    pub fn connect_tunnel(self: &Arc<Self>, target: Identifier) -> NodeResult<Identifier> {
        let backend = self
            .tunnel_backend
            .lock()
            .unwrap()
            .clone()
            .ok_or(NodeErrorKind::BackendNotListening { kind: "tunnel" })?;
        let locator = Locator::to_identifier("meshnet", target);
        let transport = backend.dial(&locator)?;
        self.register_transport(transport, Some(target))
    }

    fn register_transport(self: &Arc<Self>, transport: Transport, hint: Option<Identifier>) -> NodeResult<Identifier> {
        let remote = transport
            .remote_identifier()
            .or(hint)
            .ok_or(NodeErrorKind::NoIdentifierForConnection)?;
        let transport = Arc::new(transport);

        let handler = Handler::with_backoff(
            self.config.identifier,
            remote,
            transport,
            self.router.clone(),
            self.store.clone(),
            self.pubsub.clone(),
            self.callers.clone(),
            Some(self.tunnel_bridge.clone() as Arc<dyn TunnelDeliver>),
            self.config.resend_delay,
            self.config.max_resend_attempts,
        );

        for listener in self.global_listeners.lock().unwrap().iter() {
            handler.register_listener(listener.clone());
        }

        self.router.add_neighbor(handler.clone());
        self.handlers.lock().unwrap().insert(remote, handler.clone());

        let node = self.clone();
        let run_handler = handler.clone();
        self.worker_pool.execute(move || {
            run_handler.run();
            node.handlers.lock().unwrap().remove(&remote);
        })?;

        Ok(remote)
    }

    fn handler_for(&self, peer: Identifier) -> NodeResult<Arc<PeerHandler>> {
        self.handlers
            .lock()
            .unwrap()
            .get(&peer)
            .cloned()
            .ok_or_else(|| NodeErrorKind::UnknownPeer { identifier: peer }.into())
    }

    /// Send a best-effort or reliable `Notify` to one connected peer (spec
    /// §4.5, §4.8).
    pub fn notify_one(&self, peer: Identifier, payload: Vec<u8>, ack: bool) -> NodeResult<()> {
        Ok(self.handler_for(peer)?.notify(peer, payload, ack)?)
    }

    /// Send a best-effort or reliable `Notify` to every currently connected
    /// peer (supplemented helper, SPEC_FULL §4).
    pub fn notify_all(&self, payload: Vec<u8>, ack: bool) {
        let handlers: Vec<_> = self.handlers.lock().unwrap().values().cloned().collect();
        for handler in handlers {
            let remote = handler.remote_identifier();
            if let Err(err) = handler.notify(remote, payload.clone(), ack) {
                warn!("meshnet: notify to {:?} failed: {}", remote, err);
            }
        }
    }

    /// Fetch a block from `peer`, blocking until it arrives or `timeout`
    /// elapses (spec §4.8's `Call`/`Data` exchange plus §4.5's caller
    /// registry, fronted by the block store's own condvar).
    pub fn fetch_block(&self, peer: Identifier, digest: Digest, timeout: Duration) -> NodeResult<Vec<u8>> {
        if self.store.has_block(&digest) {
            return Ok(self.store.get_block(&digest)?);
        }

        let caller: Arc<dyn Caller> = Arc::new(NoopCaller);
        let is_first = self.callers.register_caller(digest, caller.clone());
        if is_first {
            let handler = self.handler_for(peer)?;
            if let Err(err) = handler.send_call(peer, digest, 1) {
                self.callers.unregister_caller(digest, &caller);
                return Err(err.into());
            }
        }

        let result = self
            .store
            .wait_block(&digest, timeout)
            .map_err(|_| NodeErrorKind::FetchTimedOut { digest });
        self.callers.unregister_caller(digest, &caller);
        Ok(result?)
    }

    /// Chunk `bytes` into the local block store under `name` (spec §C2),
    /// so it can be announced through a [`Publisher`] and served to peers
    /// that `Call` one of its block digests.
    pub fn share_bytes(&self, name: &str, bytes: &[u8]) -> NodeResult<IndexRecord> {
        Ok(chunk_into_store(name, bytes, &self.store)?)
    }

    /// A seekable reader over a previously-shared resource's blocks (spec
    /// §C2, §4.2 step 2): a read past what's locally available suspends on
    /// the store rather than failing outright, so a concurrent
    /// [`Node::fetch_block`] call for the same digest unblocks it once the
    /// block lands.
    pub fn read_resource<'a>(&'a self, record: &'a IndexRecord) -> Reader<'a, NativeFileSystem> {
        Reader::new(record, &self.store)
    }

    /// File erasure notification (spec §4.1): drop every block `name` was
    /// the only referrer for. Blocks still shared with another
    /// `share_bytes`-registered name are left in place.
    pub fn erase_resource(&self, name: &str) -> NodeResult<()> {
        Ok(self.store.erase_file(name)?)
    }

    /// Register a process-wide publisher under `path` (spec §4.7), visible
    /// to `Subscribe`s arriving over every connected peer.
    pub fn register_publisher(&self, path: &str, publisher: Arc<dyn Publisher>) {
        self.pubsub.register_publisher(path, publisher);
    }

    /// Register a process-wide subscriber under `path` (spec §4.7).
    pub fn register_subscriber(&self, path: &str, subscriber: Arc<dyn Subscriber>) {
        self.pubsub.register_subscriber(path, subscriber);
    }

    /// Send a `Subscribe(path)` to `peer` (spec §4.7): the peer's own
    /// publisher table answers with a `Publish` of the digests it
    /// announces for any prefix of `path`.
    pub fn subscribe(&self, peer: Identifier, path: &str) -> NodeResult<()> {
        Ok(self.handler_for(peer)?.send_subscribe(peer, path)?)
    }

    /// Register `listener` to receive every `Notify` delivered over any
    /// currently-connected or future peer link.
    pub fn register_listener(&self, listener: Arc<dyn Listener>) {
        for handler in self.handlers.lock().unwrap().values() {
            handler.register_listener(listener.clone());
        }
        self.global_listeners.lock().unwrap().push(listener);
    }

    /// Fire `listener.seen(id)` the first time `id` becomes reachable,
    /// directly or via a route (spec §4.6's edge-triggered callback).
    pub fn register_seen_listener(&self, id: Identifier, listener: Arc<dyn meshnet_router::Listener>) {
        self.router.register_listener(id, listener);
    }
}
