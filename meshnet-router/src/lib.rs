//! Route table and message router (spec §4.6).
//!
//! The router never owns a `Handler` directly — to avoid the
//! shared-ownership cycles spec §9 flags (handlers owning senders owning
//! handlers), it only holds `Arc<dyn Link>` back-references, one per
//! connected neighbor, looked up by that neighbor's identifier.

#[macro_use]
extern crate error_chain;

pub mod error;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use meshnet_util::Identifier;
use meshnet_wire::Message;

use error::{RouterErrorKind, RouterResult};

/// A directly-connected neighbor the router can hand a message to.
pub trait Link: Send + Sync {
    fn remote_identifier(&self) -> Identifier;
    fn send(&self, message: &Message) -> RouterResult<()>;
}

/// Notified exactly once per "no route" → "has route" transition for an
/// identifier it was registered against (spec §4.6, supplemented by the
/// original's edge-triggered `seen(id)` callback, see SPEC_FULL §4).
pub trait Listener: Send + Sync {
    fn seen(&self, id: Identifier);
}

const DEFAULT_ROUTE_TABLE_CAPACITY: usize = 4096;

struct Inner {
    direct: HashMap<Identifier, Arc<dyn Link>>,
    routes: LruCache<Identifier, Identifier>,
    listeners: HashMap<Identifier, Vec<Arc<dyn Listener>>>,
}

/// The shared route table plus dispatch logic used by every peer handler
/// in a node.
pub struct Router {
    inner: Mutex<Inner>,
}

impl Router {
    pub fn new() -> Router {
        Router::with_capacity(DEFAULT_ROUTE_TABLE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Router {
        Router {
            inner: Mutex::new(Inner {
                direct: HashMap::new(),
                routes: LruCache::new(std::num::NonZeroUsize::new(capacity.max(1)).unwrap()),
                listeners: HashMap::new(),
            }),
        }
    }

    /// Register a newly-connected neighbor handler.
    pub fn add_neighbor(&self, link: Arc<dyn Link>) {
        let id = link.remote_identifier();
        let mut inner = self.lock();
        let was_reachable = inner.is_reachable(&id);
        inner.direct.insert(id, link);
        if !was_reachable {
            inner.notify_seen(id);
        }
    }

    /// Remove a neighbor once its handler has torn down.
    pub fn remove_neighbor(&self, id: &Identifier) {
        self.lock().direct.remove(id);
    }

    /// Register `listener` to fire once the next time `id` transitions
    /// from unreachable to reachable.
    pub fn register_listener(&self, id: Identifier, listener: Arc<dyn Listener>) {
        self.lock().listeners.entry(id).or_default().push(listener);
    }

    /// Record that a message arrived from `source` over `incoming_link`:
    /// `destination-of-that-message's-source → incoming_link` (spec §4.6).
    pub fn note_source(&self, source: Identifier, incoming_link: Identifier) {
        let mut inner = self.lock();
        let was_reachable = inner.is_reachable(&source);
        inner.routes.put(source, incoming_link);
        if !was_reachable {
            inner.notify_seen(source);
        }
    }

    /// Dispatch `message` per spec §4.6: direct neighbor, else route
    /// table, else split-horizon broadcast. Messages already past
    /// `MAX_HOPS` are dropped (spec §6, §8).
    pub fn route(&self, message: &Message, incoming_link: Option<Identifier>) -> RouterResult<()> {
        if message.is_expired() {
            return Ok(());
        }

        let destination = message.destination;
        let mut inner = self.lock();

        if let Some(link) = inner.direct.get(&destination).cloned() {
            drop(inner);
            return link.send(message);
        }

        if let Some(&next_hop) = inner.routes.get(&destination) {
            if let Some(link) = inner.direct.get(&next_hop).cloned() {
                drop(inner);
                return link.send(message);
            }
            inner.routes.pop(&destination);
        }

        let targets: Vec<Arc<dyn Link>> = inner
            .direct
            .iter()
            .filter(|(id, _)| Some(**id) != incoming_link)
            .map(|(_, link)| link.clone())
            .collect();
        drop(inner);

        if targets.is_empty() {
            return Err(RouterErrorKind::NoRoute.into());
        }
        for link in targets {
            link.send(message)?;
        }
        Ok(())
    }

    /// Unconditionally flood `message` to every neighbor except
    /// `incoming_link`, regardless of any direct/route-table entry for its
    /// destination. Used for `Broadcast`-type messages (spec §4.5), unlike
    /// [`Router::route`]'s split-horizon broadcast which is only a
    /// fallback for `Forward`/`Lookup` messages with no better next hop.
    pub fn broadcast(&self, message: &Message, incoming_link: Option<Identifier>) -> RouterResult<()> {
        if message.is_expired() {
            return Ok(());
        }

        let targets: Vec<Arc<dyn Link>> = {
            let inner = self.lock();
            inner
                .direct
                .iter()
                .filter(|(id, _)| Some(**id) != incoming_link)
                .map(|(_, link)| link.clone())
                .collect()
        };

        for link in targets {
            link.send(message)?;
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("meshnet-router: router mutex poisoned")
    }
}

impl Default for Router {
    fn default() -> Router {
        Router::new()
    }
}

impl Inner {
    fn is_reachable(&self, id: &Identifier) -> bool {
        self.direct.contains_key(id) || self.routes.contains(id)
    }

    fn notify_seen(&mut self, id: Identifier) {
        if let Some(listeners) = self.listeners.get(&id) {
            for listener in listeners {
                listener.seen(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshnet_wire::{Content, MessageType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingLink {
        id: Identifier,
        sent: Mutex<Vec<Identifier>>,
    }

    impl Link for RecordingLink {
        fn remote_identifier(&self) -> Identifier {
            self.id
        }

        fn send(&self, message: &Message) -> RouterResult<()> {
            self.sent.lock().unwrap().push(message.destination);
            Ok(())
        }
    }

    fn id(byte: u8) -> Identifier {
        let mut bytes = [0u8; meshnet_util::IDENTIFIER_LEN];
        bytes[0] = byte;
        Identifier::from_array(bytes)
    }

    fn message(destination: Identifier) -> Message {
        Message::new(
            MessageType::Forward,
            id(99),
            destination,
            Content::Cancel {
                target: meshnet_util::Digest::zero(),
            },
        )
    }

    #[test]
    fn positive_routes_to_direct_neighbor() {
        let router = Router::new();
        let neighbor = Arc::new(RecordingLink {
            id: id(1),
            sent: Mutex::new(Vec::new()),
        });
        router.add_neighbor(neighbor.clone());

        router.route(&message(id(1)), None).unwrap();
        assert_eq!(neighbor.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn positive_routes_via_route_table_next_hop() {
        let router = Router::new();
        let next_hop = Arc::new(RecordingLink {
            id: id(2),
            sent: Mutex::new(Vec::new()),
        });
        router.add_neighbor(next_hop.clone());
        router.note_source(id(3), id(2));

        router.route(&message(id(3)), None).unwrap();
        assert_eq!(next_hop.sent.lock().unwrap(), vec![id(3)]);
    }

    #[test]
    fn positive_unconditional_broadcast_floods_even_with_direct_route() {
        let router = Router::new();
        let direct = Arc::new(RecordingLink {
            id: id(4),
            sent: Mutex::new(Vec::new()),
        });
        let other = Arc::new(RecordingLink {
            id: id(5),
            sent: Mutex::new(Vec::new()),
        });
        router.add_neighbor(direct.clone());
        router.add_neighbor(other.clone());

        router.broadcast(&message(id(4)), None).unwrap();
        assert_eq!(direct.sent.lock().unwrap().len(), 1);
        assert_eq!(other.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn positive_broadcasts_with_split_horizon() {
        let router = Router::new();
        let a = Arc::new(RecordingLink {
            id: id(1),
            sent: Mutex::new(Vec::new()),
        });
        let b = Arc::new(RecordingLink {
            id: id(2),
            sent: Mutex::new(Vec::new()),
        });
        router.add_neighbor(a.clone());
        router.add_neighbor(b.clone());

        router.route(&message(id(9)), Some(id(1))).unwrap();
        assert!(a.sent.lock().unwrap().is_empty());
        assert_eq!(b.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn positive_seen_fires_once_on_transition() {
        let router = Router::new();
        let count = Arc::new(AtomicUsize::new(0));

        struct Counter(Arc<AtomicUsize>);
        impl Listener for Counter {
            fn seen(&self, _id: Identifier) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        router.register_listener(id(5), Arc::new(Counter(count.clone())));
        router.note_source(id(5), id(1));
        router.note_source(id(5), id(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn negative_expired_message_is_dropped() {
        let router = Router::new();
        let mut msg = message(id(1));
        msg.hops = meshnet_util::MAX_HOPS + 1;
        router.route(&msg, None).unwrap();
    }

    #[test]
    fn negative_no_route_when_no_neighbors() {
        let router = Router::new();
        assert!(router.route(&message(id(1)), None).is_err());
    }
}
