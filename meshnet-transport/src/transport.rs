use std::io::{Read, Write};
use std::sync::Mutex;

use meshnet_util::Identifier;

use crate::credential::{CertificateVerifier, Credential, NameVerifier};
use crate::handshake::{handshake, Role};
use crate::record::RecordCipher;
use crate::error::TransportResult;

/// A mutually-authenticated channel over a byte or datagram carrier.
///
/// `send`/`recv` operate on whole records rather than a raw byte stream:
/// that's what lets the same type back both `StreamBackend` (where a
/// record is just framed bytes on a TCP socket) and `DatagramBackend`
/// (where a record IS the UDP payload) per spec §4.4.
///
/// Read and write each take their own lock so concurrent readers and
/// writers on the same transport never interleave bytes (spec §4.5).
pub struct SecureTransport<C> {
    carrier: Mutex<C>,
    cipher: RecordCipher,
    remote_identifier: Option<Identifier>,
}

impl<C: Read + Write> SecureTransport<C> {
    /// Run the handshake over `carrier` and, on success, wrap it as an
    /// authenticated transport. On failure `carrier` is dropped with the
    /// error, matching spec §4.3's "on failure the transport is destroyed".
    pub fn handshake(
        mut carrier: C,
        role: Role,
        credential: &Credential,
        name_verifier: Option<&dyn NameVerifier>,
        cert_verifier: Option<&dyn CertificateVerifier>,
    ) -> TransportResult<SecureTransport<C>> {
        let (session_key, remote_identifier) = handshake(&mut carrier, role, credential, name_verifier, cert_verifier)?;
        Ok(SecureTransport {
            carrier: Mutex::new(carrier),
            cipher: RecordCipher::new(session_key),
            remote_identifier,
        })
    }

    /// Encrypt and send one record.
    pub fn send(&self, plaintext: &[u8]) -> TransportResult<()> {
        let mut carrier = self.carrier.lock().expect("meshnet-transport: carrier mutex poisoned");
        self.cipher.seal_to(plaintext, &mut *carrier)
    }

    /// Receive and decrypt the next record.
    pub fn recv(&self) -> TransportResult<Vec<u8>> {
        let mut carrier = self.carrier.lock().expect("meshnet-transport: carrier mutex poisoned");
        self.cipher.open_from(&mut *carrier)
    }

    /// The peer's identifier as verified during a certificate-mode
    /// handshake. `None` for anonymous and pre-shared-key transports, which
    /// have no stable peer identity to report.
    pub fn remote_identifier(&self) -> Option<Identifier> {
        self.remote_identifier
    }
}

/// Claimed remote identifier once a certificate-mode handshake has
/// completed; stream/datagram backends use this to key the per-peer
/// handler map (spec §4.5).
pub fn peer_identifier_from_credential(credential: &Credential) -> Option<Identifier> {
    match credential {
        Credential::Certificate { identifier, .. } => Some(*identifier),
        _ => None,
    }
}
