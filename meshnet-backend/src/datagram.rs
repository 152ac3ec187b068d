use std::collections::{HashMap, VecDeque};
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use log::warn;
use meshnet_transport::{CertificateVerifier, Credential, NameVerifier, Role, SecureTransport};

use crate::address::{Address, Locator, LocatorTarget};
use crate::credential_for_dial;
use crate::duplex::{ByteDuplex, DuplexHandle};
use crate::error::{BackendErrorKind, BackendResult};
use crate::{ensure_not_empty, Backend, Transport};

const RECV_BUF_LEN: usize = 64 * 1024;

struct Shared {
    channels: Mutex<HashMap<SocketAddr, Arc<ByteDuplex>>>,
    pending: Mutex<VecDeque<SocketAddr>>,
    pending_cond: Condvar,
}

impl Shared {
    fn channel_for(socket: &Arc<UdpSocket>, shared: &Arc<Shared>, remote: SocketAddr) -> Arc<ByteDuplex> {
        let mut channels = shared.channels.lock().expect("meshnet-backend: datagram channel map poisoned");
        channels
            .entry(remote)
            .or_insert_with(|| {
                let socket = socket.clone();
                Arc::new(ByteDuplex::new(move |bytes: &[u8]| socket.send_to(bytes, remote).map(|_| ())))
            })
            .clone()
    }
}

/// A single UDP socket multiplexed into one secure-transport carrier per
/// remote address (spec §4.4).
pub struct DatagramBackend {
    socket: Arc<UdpSocket>,
    shared: Arc<Shared>,
    credential: Credential,
    name_verifier: Option<Arc<dyn NameVerifier>>,
    cert_verifier: Option<Arc<dyn CertificateVerifier>>,
}

impl DatagramBackend {
    pub fn bind(addr: SocketAddr, credential: Credential) -> BackendResult<DatagramBackend> {
        let socket = Arc::new(UdpSocket::bind(addr)?);
        let shared = Arc::new(Shared {
            channels: Mutex::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
            pending_cond: Condvar::new(),
        });

        spawn_receive_loop(socket.clone(), shared.clone());

        Ok(DatagramBackend {
            socket,
            shared,
            credential,
            name_verifier: None,
            cert_verifier: None,
        })
    }

    pub fn with_name_verifier(mut self, verifier: Arc<dyn NameVerifier>) -> DatagramBackend {
        self.name_verifier = Some(verifier);
        self
    }

    pub fn with_cert_verifier(mut self, verifier: Arc<dyn CertificateVerifier>) -> DatagramBackend {
        self.cert_verifier = Some(verifier);
        self
    }
}

fn spawn_receive_loop(socket: Arc<UdpSocket>, shared: Arc<Shared>) {
    thread::spawn(move || {
        let mut buf = vec![0u8; RECV_BUF_LEN];
        loop {
            let (n, remote) = match socket.recv_from(&mut buf) {
                Ok(pair) => pair,
                Err(err) => {
                    warn!("meshnet-backend: datagram receive loop stopping: {}", err);
                    return;
                }
            };

            let is_new = !shared
                .channels
                .lock()
                .expect("meshnet-backend: datagram channel map poisoned")
                .contains_key(&remote);
            let channel = Shared::channel_for(&socket, &shared, remote);
            if is_new {
                shared
                    .pending
                    .lock()
                    .expect("meshnet-backend: datagram pending queue poisoned")
                    .push_back(remote);
                shared.pending_cond.notify_all();
            }
            channel.deliver(&buf[..n]);
        }
    });
}

impl Backend for DatagramBackend {
    fn listen(&self) -> BackendResult<Transport> {
        let remote = {
            let mut pending = self.shared.pending.lock().expect("meshnet-backend: datagram pending queue poisoned");
            loop {
                if let Some(remote) = pending.pop_front() {
                    break remote;
                }
                pending = self
                    .shared
                    .pending_cond
                    .wait(pending)
                    .expect("meshnet-backend: datagram pending queue poisoned");
            }
        };

        let channel = Shared::channel_for(&self.socket, &self.shared, remote);
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
        let addrs = match &locator.target {
            LocatorTarget::Addresses(addrs) => addrs.clone(),
            LocatorTarget::Identifier(_) => return Err(BackendErrorKind::UnknownLocatorTarget.into()),
        };
        ensure_not_empty(&addrs)?;
        let remote = addrs[0];

        let channel = Shared::channel_for(&self.socket, &self.shared, remote);
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
        match self.socket.local_addr() {
            Ok(addr) => vec![Address::Socket(addr)],
            Err(_) => Vec::new(),
        }
    }
}
