//! Mutually-authenticated secure transport (spec §4.3) over any carrier
//! implementing `Read + Write`.

#[macro_use]
extern crate error_chain;

pub mod error;
mod credential;
mod handshake;
mod record;
mod transport;

pub use credential::{identifier_for_public_key, AcceptAnyCertificate, CertificateVerifier, Credential, NameVerifier};
pub use handshake::Role;
pub use record::RecordCipher;
pub use transport::{peer_identifier_from_credential, SecureTransport};
