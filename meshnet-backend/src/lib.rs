//! Connection backends sharing one `{listen, dial, addresses}` interface
//! (spec §4.4): a TCP stream backend, a UDP datagram backend, and a tunnel
//! backend that rides Tunnel-type overlay messages instead of a socket.

#[macro_use]
extern crate error_chain;

pub mod address;
pub mod carrier;
pub mod datagram;
mod duplex;
pub mod error;
pub mod stream;
pub mod tunnel;

use carrier::BoxedCarrier;
use meshnet_transport::{Credential, SecureTransport};

pub use address::{Address, Locator, LocatorTarget};
pub use datagram::DatagramBackend;
pub use stream::{HttpTunnelAdapter, StreamBackend};
pub use tunnel::{TunnelBackend, TunnelSink};

use error::{BackendErrorKind, BackendResult};

/// A fully handshaked, record-oriented channel, regardless of which
/// backend produced it.
pub type Transport = SecureTransport<BoxedCarrier>;

/// Shared interface implemented by `StreamBackend`, `DatagramBackend` and
/// `TunnelBackend` (spec §4.4).
pub trait Backend: Send + Sync {
    /// Block until the next inbound connection completes its handshake.
    fn listen(&self) -> BackendResult<Transport>;

    /// Connect out to `locator` and complete a handshake as the initiating
    /// side.
    fn dial(&self, locator: &Locator) -> BackendResult<Transport>;

    /// Local endpoints this backend can be reached at.
    fn addresses(&self) -> Vec<Address>;
}

/// A `Locator`'s `peering` field overrides the backend's own credential
/// for one dial; otherwise the backend dials with whatever credential it
/// was constructed with (spec §4.4, §4.3).
fn credential_for_dial<'a>(locator: &Locator, own: &'a Credential) -> std::borrow::Cow<'a, Credential> {
    match &locator.peering {
        Some((name, psk)) => std::borrow::Cow::Owned(Credential::PreSharedKey {
            name: name.clone(),
            secret: *psk,
        }),
        None => std::borrow::Cow::Borrowed(own),
    }
}

fn ensure_not_empty(addrs: &[std::net::SocketAddr]) -> BackendResult<()> {
    if addrs.is_empty() {
        return Err(BackendErrorKind::UnknownLocatorTarget.into());
    }
    Ok(())
}
