//! Publish/subscribe engine with longest-prefix matching (spec §4.7).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use meshnet_util::{Digest, Identifier};

/// Registered under one or more paths; `announce` is asked for the block
/// digests it claims correspond to a subscribed path. It is the
/// publisher's own responsibility to have those digests retrievable
/// (typically by having already pushed them into the block store).
pub trait Publisher: Send + Sync {
    fn announce(&self, source: Identifier, path: &str) -> Vec<Digest>;
}

/// Registered under one or more paths; notified with the *full* advertised
/// path whenever a matching `Publish` arrives, even if the subscription
/// itself was registered at a shorter prefix.
pub trait Subscriber: Send + Sync {
    fn incoming(&self, path: &str, digest: Digest);
}

/// The longest-prefix sequence spec §4.7 walks for a path: `/a/b/c`,
/// `/a/b`, `/a`, `/`.
pub fn path_prefixes(path: &str) -> Vec<String> {
    if path == "/" {
        return vec!["/".to_owned()];
    }

    let mut result = vec![path.to_owned()];
    let mut current = path;
    loop {
        match current.rfind('/') {
            Some(0) => {
                result.push("/".to_owned());
                break;
            }
            Some(pos) => {
                current = &current[..pos];
                result.push(current.to_owned());
            }
            None => break,
        }
    }
    result
}

#[derive(Default)]
struct Tables {
    publishers: HashMap<String, Vec<Arc<dyn Publisher>>>,
    subscribers: HashMap<String, Vec<Arc<dyn Subscriber>>>,
}

/// Per-handler publish/subscribe tables (spec §4.5: "local subscription
/// table"). A node keeps one of these per connected peer plus, typically,
/// one process-wide instance for locally-registered publishers/subscribers
/// such as the filesystem indexer (spec §6.4).
pub struct PubSubTable {
    tables: Mutex<Tables>,
}

impl PubSubTable {
    pub fn new() -> PubSubTable {
        PubSubTable {
            tables: Mutex::new(Tables::default()),
        }
    }

    pub fn register_publisher(&self, path: &str, publisher: Arc<dyn Publisher>) {
        self.lock().publishers.entry(path.to_owned()).or_default().push(publisher);
    }

    pub fn register_subscriber(&self, path: &str, subscriber: Arc<dyn Subscriber>) {
        self.lock()
            .subscribers
            .entry(path.to_owned())
            .or_default()
            .push(subscriber);
    }

    /// A `Subscribe(path)` arrived from `source`: walk the prefix sequence
    /// of `path` against the publisher table, call `announce(source,
    /// path)` on every match, and return the union of digests so the
    /// caller can emit one aggregated `Publish(path, digests)` reply.
    pub fn on_subscribe(&self, source: Identifier, path: &str) -> Vec<Digest> {
        let tables = self.lock();
        let mut digests = Vec::new();
        for prefix in path_prefixes(path) {
            if let Some(publishers) = tables.publishers.get(&prefix) {
                for publisher in publishers {
                    digests.extend(publisher.announce(source, path));
                }
            }
        }
        digests
    }

    /// A `Publish(path, digests)` arrived: walk the prefix sequence of
    /// `path` against the subscriber table and deliver every digest to
    /// every matched subscriber, with the full path.
    pub fn on_publish(&self, path: &str, digests: &[Digest]) {
        let tables = self.lock();
        for prefix in path_prefixes(path) {
            if let Some(subscribers) = tables.subscribers.get(&prefix) {
                for subscriber in subscribers {
                    for &digest in digests {
                        subscriber.incoming(path, digest);
                    }
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().expect("meshnet-pubsub: table mutex poisoned")
    }
}

impl Default for PubSubTable {
    fn default() -> PubSubTable {
        PubSubTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn identifier(byte: u8) -> Identifier {
        let mut bytes = [0u8; meshnet_util::IDENTIFIER_LEN];
        bytes[0] = byte;
        Identifier::from_array(bytes)
    }

    struct FixedPublisher(Digest);
    impl Publisher for FixedPublisher {
        fn announce(&self, _source: Identifier, _path: &str) -> Vec<Digest> {
            vec![self.0]
        }
    }

    struct RecordingSubscriber {
        seen: StdMutex<Vec<(String, Digest)>>,
    }
    impl Subscriber for RecordingSubscriber {
        fn incoming(&self, path: &str, digest: Digest) {
            self.seen.lock().unwrap().push((path.to_owned(), digest));
        }
    }

    #[test]
    fn positive_path_prefixes_walk_to_root() {
        assert_eq!(
            path_prefixes("/a/b/c"),
            vec!["/a/b/c".to_owned(), "/a/b".to_owned(), "/a".to_owned(), "/".to_owned()]
        );
    }

    #[test]
    fn positive_longest_prefix_announce_called_with_full_path() {
        let table = PubSubTable::new();
        let digest = Digest::from_bytes(b"song");
        table.register_publisher("/music", Arc::new(FixedPublisher(digest)));

        let digests = table.on_subscribe(identifier(1), "/music/rock/song.mp3");
        assert_eq!(digests, vec![digest]);
    }

    #[test]
    fn positive_publish_delivers_full_path_to_subscriber() {
        let table = PubSubTable::new();
        let subscriber = Arc::new(RecordingSubscriber {
            seen: StdMutex::new(Vec::new()),
        });
        table.register_subscriber("/a", subscriber.clone());

        let digest = Digest::from_bytes(b"x");
        table.on_publish("/a/b/c", &[digest]);

        assert_eq!(subscriber.seen.lock().unwrap().as_slice(), &[("/a/b/c".to_owned(), digest)]);
    }

    #[test]
    fn negative_no_publisher_returns_empty() {
        let table = PubSubTable::new();
        assert!(table.on_subscribe(identifier(1), "/nothing/here").is_empty());
    }
}
