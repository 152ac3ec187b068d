use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use meshnet_runtime::Alarm;
use meshnet_store::{BlockStore, FileSystem};
use meshnet_util::{Digest, Identifier};
use meshnet_wire::{Content, Message, MessageType};

use crate::error::PeerResult;

/// Hands a fully-built overlay `Message` off to whatever owns the wire
/// connection. A `Handler` implements this over its transport; every
/// `Sender` it creates shares the same sink, since all of a handler's
/// senders multiplex over its single physical link (spec §4.5).
pub trait MessageSink: Send + Sync {
    fn send(&self, message: Message) -> PeerResult<()>;
}

/// Defaults matching the original's fixed backoff; [`Sender::new`] accepts
/// an override via `NodeConfig::resend_backoff` (SPEC_FULL §3).
pub const DEFAULT_RESEND_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_RESEND_ATTEMPTS: u32 = 5;

struct UnackedNotify {
    payload: Vec<u8>,
    attempts: u32,
    alarm: Alarm,
}

struct SenderState {
    targets: HashMap<Digest, u16>,
    unacked: HashMap<u32, UnackedNotify>,
}

/// The credit-based `Call`/`Data` server and reliable `Notify`/`Ack`
/// client for one logical destination identifier reachable over a
/// handler's link (spec §4.8).
pub struct Sender<F> {
    local: Identifier,
    remote: Identifier,
    sink: Arc<dyn MessageSink>,
    store: Arc<BlockStore<F>>,
    state: Mutex<SenderState>,
    next_sequence: AtomicU32,
    resend_delay: Duration,
    max_resend_attempts: u32,
}

impl<F: FileSystem + Send + Sync + 'static> Sender<F> {
    pub fn new(local: Identifier, remote: Identifier, sink: Arc<dyn MessageSink>, store: Arc<BlockStore<F>>) -> Arc<Sender<F>> {
        Sender::with_backoff(local, remote, sink, store, DEFAULT_RESEND_DELAY, DEFAULT_MAX_RESEND_ATTEMPTS)
    }

    pub fn with_backoff(
        local: Identifier,
        remote: Identifier,
        sink: Arc<dyn MessageSink>,
        store: Arc<BlockStore<F>>,
        resend_delay: Duration,
        max_resend_attempts: u32,
    ) -> Arc<Sender<F>> {
        Arc::new(Sender {
            local,
            remote,
            sink,
            store,
            state: Mutex::new(SenderState {
                targets: HashMap::new(),
                unacked: HashMap::new(),
            }),
            next_sequence: AtomicU32::new(1),
            resend_delay,
            max_resend_attempts,
        })
    }

    /// Inbound `Call(target, tokens)`: record the credit and immediately
    /// serve whatever of it we already have locally.
    pub fn add_target(self: &Arc<Self>, digest: Digest, tokens: u16) {
        {
            let mut state = self.lock();
            let entry = state.targets.entry(digest).or_insert(0);
            *entry = entry.saturating_add(tokens);
        }
        self.serve_targets();
    }

    /// Inbound `Cancel(target)`: the caller is no longer interested.
    pub fn remove_target(&self, digest: Digest) {
        self.lock().targets.remove(&digest);
    }

    /// Whether `digest` still has outstanding credit registered against it.
    pub fn has_target(&self, digest: &Digest) -> bool {
        self.lock().targets.contains_key(digest)
    }

    /// Push a `Data` message for every target we have credit and bytes
    /// for (spec §4.8 step 2).
    fn serve_targets(self: &Arc<Self>) {
        let ready: Vec<Digest> = {
            let state = self.lock();
            state
                .targets
                .iter()
                .filter(|(digest, &tokens)| tokens > 0 && self.store.has_block(digest))
                .map(|(digest, _)| *digest)
                .collect()
        };

        for digest in ready {
            let bytes = match self.store.get_block(&digest) {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };
            let message = Message::new(
                MessageType::Forward,
                self.local,
                self.remote,
                Content::Data { target: digest, bytes },
            );
            if self.sink.send(message).is_err() {
                continue;
            }
            let mut state = self.lock();
            if let Some(tokens) = state.targets.get_mut(&digest) {
                *tokens = tokens.saturating_sub(1);
                if *tokens == 0 {
                    state.targets.remove(&digest);
                }
            }
        }
    }

    /// `notify(dst, payload, ack)` (spec §4.8): `ack=false` is
    /// fire-and-forget (sequence 0); `ack=true` assigns a nonzero
    /// sequence, stores the payload in `unacked`, and schedules a resend
    /// with fixed backoff until an `Ack` with the matching sequence
    /// arrives or the attempt budget is exhausted.
    pub fn notify(self: &Arc<Self>, payload: Vec<u8>, ack: bool) -> PeerResult<()> {
        if !ack {
            let message = Message::new(
                MessageType::Forward,
                self.local,
                self.remote,
                Content::Notify { sequence: 0, payload },
            );
            return self.sink.send(message);
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let message = Message::new(
            MessageType::Forward,
            self.local,
            self.remote,
            Content::Notify {
                sequence,
                payload: payload.clone(),
            },
        );
        self.sink.send(message)?;

        let alarm = Alarm::new();
        self.arm_resend(&alarm, sequence);
        self.lock().unacked.insert(
            sequence,
            UnackedNotify {
                payload,
                attempts: 1,
                alarm,
            },
        );
        Ok(())
    }

    fn arm_resend(self: &Arc<Self>, alarm: &Alarm, sequence: u32) {
        let weak_self: Weak<Sender<F>> = Arc::downgrade(self);
        alarm.schedule(self.resend_delay, move || {
            if let Some(sender) = weak_self.upgrade() {
                sender.resend(sequence);
            }
        });
    }

    fn resend(self: &Arc<Self>, sequence: u32) {
        let payload = {
            let mut state = self.lock();
            match state.unacked.get_mut(&sequence) {
                Some(entry) if entry.attempts < self.max_resend_attempts => {
                    entry.attempts += 1;
                    Some(entry.payload.clone())
                }
                Some(_) => {
                    state.unacked.remove(&sequence);
                    None
                }
                None => None,
            }
        };

        let payload = match payload {
            Some(payload) => payload,
            None => return,
        };

        let message = Message::new(
            MessageType::Forward,
            self.local,
            self.remote,
            Content::Notify { sequence, payload },
        );
        let _ = self.sink.send(message);

        let state = self.lock();
        if let Some(entry) = state.unacked.get(&sequence) {
            self.arm_resend(&entry.alarm, sequence);
        }
    }

    /// Inbound `Ack(sequence, ..)`: the notify has been delivered, stop
    /// resending it.
    pub fn ack(&self, sequence: u32) {
        if let Some(entry) = self.lock().unacked.remove(&sequence) {
            entry.alarm.cancel();
        }
    }

    fn lock(&self) -> MutexGuard<'_, SenderState> {
        self.state.lock().expect("meshnet-peer: sender mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshnet_store::NativeFileSystem;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration as StdDuration;

    fn ids() -> (Identifier, Identifier) {
        let mut local = [0u8; meshnet_util::IDENTIFIER_LEN];
        local[0] = 1;
        let mut remote = [0u8; meshnet_util::IDENTIFIER_LEN];
        remote[0] = 2;
        (Identifier::from_array(local), Identifier::from_array(remote))
    }

    struct RecordingSink {
        sent: StdMutex<Vec<Message>>,
    }
    impl MessageSink for RecordingSink {
        fn send(&self, message: Message) -> PeerResult<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn store() -> (tempfile::TempDir, Arc<BlockStore<NativeFileSystem>>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BlockStore::open(dir.path()).unwrap());
        (dir, store)
    }

    #[test]
    fn positive_serves_data_immediately_when_block_present() {
        let (local, remote) = ids();
        let (_dir, store) = store();
        let digest = store.push(b"block bytes").unwrap();

        let sink = Arc::new(RecordingSink { sent: StdMutex::new(Vec::new()) });
        let sender = Sender::new(local, remote, sink.clone(), store);

        sender.add_target(digest, 1);

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        match &sent[0].content {
            Content::Data { target, bytes } => {
                assert_eq!(*target, digest);
                assert_eq!(bytes, b"block bytes");
            }
            other => panic!("expected Data, got {:?}", other),
        }
    }

    #[test]
    fn negative_no_credit_no_data_sent() {
        let (local, remote) = ids();
        let (_dir, store) = store();
        let digest = store.push(b"block bytes").unwrap();

        let sink = Arc::new(RecordingSink { sent: StdMutex::new(Vec::new()) });
        let sender = Sender::new(local, remote, sink.clone(), store);

        sender.remove_target(digest); // no-op, nothing registered
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn positive_ack_cancels_resend() {
        let (local, remote) = ids();
        let (_dir, store) = store();
        let sink = Arc::new(RecordingSink { sent: StdMutex::new(Vec::new()) });
        let sender = Sender::new(local, remote, sink.clone(), store);

        sender.notify(b"hello".to_vec(), true).unwrap();
        assert_eq!(sink.sent.lock().unwrap().len(), 1);

        sender.ack(1);
        std::thread::sleep(StdDuration::from_millis(700));
        // cancelled before the 500ms resend fired, so still exactly one send
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn positive_unacked_notify_resends_on_backoff() {
        let (local, remote) = ids();
        let (_dir, store) = store();
        let sink = Arc::new(RecordingSink { sent: StdMutex::new(Vec::new()) });
        let sender = Sender::new(local, remote, sink.clone(), store);

        sender.notify(b"hello".to_vec(), true).unwrap();
        std::thread::sleep(StdDuration::from_millis(700));
        assert!(sink.sent.lock().unwrap().len() >= 2);
    }
}
