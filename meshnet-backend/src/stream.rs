use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;

use meshnet_transport::{CertificateVerifier, Credential, NameVerifier, Role, SecureTransport};

use crate::address::{Address, Locator, LocatorTarget};
use crate::carrier::BoxedCarrier;
use crate::error::{BackendErrorKind, BackendResult};
use crate::{credential_for_dial, ensure_not_empty, Backend, Transport};

/// Accepts a raw socket whose first bytes look like an HTTP request and
/// returns a carrier usable in its place (spec §6.4). Plugged in by the
/// embedder; `StreamBackend` has no HTTP support of its own.
pub trait HttpTunnelAdapter: Send + Sync {
    fn adapt(&self, stream: TcpStream) -> BackendResult<BoxedCarrier>;
}

const PEEK_LEN: usize = 5;

/// TCP-backed `Backend`. Every accepted socket is peeked for an HTTP
/// request line before being wrapped in stream-mode secure transport
/// (spec §4.4).
pub struct StreamBackend {
    listener: TcpListener,
    credential: Credential,
    name_verifier: Option<Arc<dyn NameVerifier>>,
    cert_verifier: Option<Arc<dyn CertificateVerifier>>,
    http_adapter: Option<Arc<dyn HttpTunnelAdapter>>,
}

impl StreamBackend {
    pub fn bind(addr: SocketAddr, credential: Credential) -> BackendResult<StreamBackend> {
        let listener = TcpListener::bind(addr)?;
        Ok(StreamBackend {
            listener,
            credential,
            name_verifier: None,
            cert_verifier: None,
            http_adapter: None,
        })
    }

    pub fn with_name_verifier(mut self, verifier: Arc<dyn NameVerifier>) -> StreamBackend {
        self.name_verifier = Some(verifier);
        self
    }

    pub fn with_cert_verifier(mut self, verifier: Arc<dyn CertificateVerifier>) -> StreamBackend {
        self.cert_verifier = Some(verifier);
        self
    }

    pub fn with_http_adapter(mut self, adapter: Arc<dyn HttpTunnelAdapter>) -> StreamBackend {
        self.http_adapter = Some(adapter);
        self
    }

    fn looks_like_http(buf: &[u8; PEEK_LEN]) -> bool {
        &buf[..4] == b"GET " || buf == b"POST "
    }
}

impl Backend for StreamBackend {
    fn listen(&self) -> BackendResult<Transport> {
        loop {
            let (socket, _peer) = self.listener.accept()?;

            let mut peek_buf = [0u8; PEEK_LEN];
            let peeked = socket.peek(&mut peek_buf)?;

            let carrier: BoxedCarrier = if peeked == PEEK_LEN && StreamBackend::looks_like_http(&peek_buf) {
                let adapter = match &self.http_adapter {
                    Some(adapter) => adapter.clone(),
                    None => continue,
                };
                match adapter.adapt(socket) {
                    Ok(carrier) => carrier,
                    Err(_) => continue,
                }
            } else {
                Box::new(socket)
            };

            match SecureTransport::handshake(
                carrier,
                Role::Server,
                &self.credential,
                self.name_verifier.as_deref(),
                self.cert_verifier.as_deref(),
            ) {
                Ok(transport) => return Ok(transport),
                Err(_) => continue,
            }
        }
    }

    fn dial(&self, locator: &Locator) -> BackendResult<Transport> {
        let addrs = match &locator.target {
            LocatorTarget::Addresses(addrs) => addrs.clone(),
            LocatorTarget::Identifier(_) => {
                return Err(BackendErrorKind::UnknownLocatorTarget.into());
            }
        };
        ensure_not_empty(&addrs)?;

        let stream = TcpStream::connect(addrs.as_slice())?;
        let credential = credential_for_dial(locator, &self.credential);
        let carrier: BoxedCarrier = Box::new(stream);
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
        match self.listener.local_addr() {
            Ok(addr) => vec![Address::Socket(addr)],
            Err(_) => Vec::new(),
        }
    }
}
