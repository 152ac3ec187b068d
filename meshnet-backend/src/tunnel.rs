use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

use meshnet_transport::{CertificateVerifier, Credential, NameVerifier, Role, SecureTransport};
use meshnet_util::Identifier;

use crate::address::{Address, Locator, LocatorTarget};
use crate::credential_for_dial;
use crate::duplex::{ByteDuplex, DuplexHandle};
use crate::error::{BackendErrorKind, BackendResult};
use crate::{Backend, Transport};

/// Delivers a `Tunnel`-content overlay message to `remote`, addressed as
/// coming from `local`; plugged in by the per-peer handler/router layer
/// that actually owns the wire connection (spec §4.4, §4.5).
pub trait TunnelSink: Send + Sync {
    fn send_tunnel(&self, local: Identifier, remote: Identifier, bytes: &[u8]) -> std::io::Result<()>;
}

struct Shared {
    wrappers: Mutex<HashMap<(Identifier, Identifier), Arc<ByteDuplex>>>,
    pending: Mutex<VecDeque<(Identifier, Identifier)>>,
    pending_cond: Condvar,
}

/// A datagram carrier synthesized over Tunnel-type overlay messages
/// instead of a socket (spec §4.4). Each `(local, remote)` identifier pair
/// gets its own wrapper; a new inbound pair opens a new session that
/// `listen()` will pick up.
pub struct TunnelBackend {
    local: Identifier,
    sink: Arc<dyn TunnelSink>,
    shared: Arc<Shared>,
    credential: Credential,
    name_verifier: Option<Arc<dyn NameVerifier>>,
    cert_verifier: Option<Arc<dyn CertificateVerifier>>,
}

impl TunnelBackend {
    pub fn new(local: Identifier, sink: Arc<dyn TunnelSink>, credential: Credential) -> TunnelBackend {
        TunnelBackend {
            local,
            sink,
            shared: Arc::new(Shared {
                wrappers: Mutex::new(HashMap::new()),
                pending: Mutex::new(VecDeque::new()),
                pending_cond: Condvar::new(),
            }),
            credential,
            name_verifier: None,
            cert_verifier: None,
        }
    }

    pub fn with_name_verifier(mut self, verifier: Arc<dyn NameVerifier>) -> TunnelBackend {
        self.name_verifier = Some(verifier);
        self
    }

    pub fn with_cert_verifier(mut self, verifier: Arc<dyn CertificateVerifier>) -> TunnelBackend {
        self.cert_verifier = Some(verifier);
        self
    }

    /// Called by the per-peer handler when a `Tunnel` message whose
    /// `(destination, source)` is `(dst, src)` arrives. Delivers to the
    /// existing wrapper for that pair or opens a new inbound session.
    pub fn deliver_inbound(&self, dst: Identifier, src: Identifier, bytes: &[u8]) {
        let key = (dst, src);
        let is_new = !self
            .shared
            .wrappers
            .lock()
            .expect("meshnet-backend: tunnel wrapper map poisoned")
            .contains_key(&key);
        let channel = self.channel_for(key);
        if is_new {
            self.shared
                .pending
                .lock()
                .expect("meshnet-backend: tunnel pending queue poisoned")
                .push_back(key);
            self.shared.pending_cond.notify_all();
        }
        channel.deliver(bytes);
    }

    fn channel_for(&self, key: (Identifier, Identifier)) -> Arc<ByteDuplex> {
        let (local, remote) = key;
        let sink = self.sink.clone();
        self.shared
            .wrappers
            .lock()
            .expect("meshnet-backend: tunnel wrapper map poisoned")
            .entry(key)
            .or_insert_with(|| Arc::new(ByteDuplex::new(move |bytes: &[u8]| sink.send_tunnel(local, remote, bytes))))
            .clone()
    }
}

impl Backend for TunnelBackend {
    fn listen(&self) -> BackendResult<Transport> {
        let key = {
            let mut pending = self.shared.pending.lock().expect("meshnet-backend: tunnel pending queue poisoned");
            loop {
                if let Some(key) = pending.pop_front() {
                    break key;
                }
                pending = self
                    .shared
                    .pending_cond
                    .wait(pending)
                    .expect("meshnet-backend: tunnel pending queue poisoned");
            }
        };

        let channel = self.channel_for(key);
        let carrier: crate::carrier::BoxedCarrier = Box::new(DuplexHandle(channel));
        let transport = SecureTransport::handshake(
            carrier,
            Role::Server,
            &self.credential,
            self.name_verifier.as_deref(),
            self.cert_verifier.as_deref(),
        )?;
        Ok(transport)
    }

    fn dial(&self, locator: &Locator) -> BackendResult<Transport> {
        let remote = match &locator.target {
            LocatorTarget::Identifier(identifier) => *identifier,
            LocatorTarget::Addresses(_) => return Err(BackendErrorKind::UnknownLocatorTarget.into()),
        };

        let channel = self.channel_for((self.local, remote));
        let carrier: crate::carrier::BoxedCarrier = Box::new(DuplexHandle(channel));
        let credential = credential_for_dial(locator, &self.credential);
        let transport = SecureTransport::handshake(
            carrier,
            Role::Client,
            &credential,
            self.name_verifier.as_deref(),
            self.cert_verifier.as_deref(),
        )?;
        Ok(transport)
    }

    fn addresses(&self) -> Vec<Address> {
        vec![Address::Overlay(self.local)]
    }
}
