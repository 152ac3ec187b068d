use std::net::SocketAddr;

use meshnet_util::Identifier;

/// An endpoint a backend is reachable at, returned by `Backend::addresses`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Address {
    Socket(SocketAddr),
    Overlay(Identifier),
}

/// Selects credential mode and destination for a `Backend::dial` (spec
/// §4.4): either a known peer identifier (routed over the overlay or
/// resolved to an address by the caller) or a concrete address list, plus
/// an optional peering name and pre-shared key overriding the backend's
/// own credential for this one dial.
pub struct Locator {
    pub user: String,
    pub target: LocatorTarget,
    pub peering: Option<(String, [u8; 32])>,
}

pub enum LocatorTarget {
    Identifier(Identifier),
    Addresses(Vec<SocketAddr>),
}

impl Locator {
    pub fn to_identifier(user: impl Into<String>, identifier: Identifier) -> Locator {
        Locator {
            user: user.into(),
            target: LocatorTarget::Identifier(identifier),
            peering: None,
        }
    }

    pub fn to_addresses(user: impl Into<String>, addresses: Vec<SocketAddr>) -> Locator {
        Locator {
            user: user.into(),
            target: LocatorTarget::Addresses(addresses),
            peering: None,
        }
    }

    pub fn with_peering(mut self, name: impl Into<String>, psk: [u8; 32]) -> Locator {
        self.peering = Some((name.into(), psk));
        self
    }
}
