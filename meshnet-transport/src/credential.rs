use meshnet_util::Identifier;
use rsa::{RsaPrivateKey, RsaPublicKey};

/// One of the three key-agreement modes secure transport supports (spec
/// §4.3). Modeled as a tagged variant rather than a class hierarchy, per
/// the redesign note in spec §9.
#[derive(Clone)]
pub enum Credential {
    /// No authentication; only suitable for opportunistic transport
    /// upgrades between two otherwise-untrusted parties.
    Anonymous,
    /// Both sides hold the same 32-byte secret, indexed by a short name
    /// the server looks up via [`NameVerifier::verify_name`].
    PreSharedKey { name: String, secret: [u8; 32] },
    /// An RSA keypair whose public key hashes to `identifier`.
    Certificate {
        identifier: Identifier,
        private_key: Box<RsaPrivateKey>,
        public_key: RsaPublicKey,
    },
}

impl Credential {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Credential::Anonymous => 0,
            Credential::PreSharedKey { .. } => 1,
            Credential::Certificate { .. } => 2,
        }
    }
}

/// Looks up the pre-shared secret registered under a peering name, called
/// before accepting a PSK credential (spec §4.3, §6.4 `Listener::auth`).
pub trait NameVerifier: Send + Sync {
    fn verify_name(&self, name: &str) -> Option<[u8; 32]>;
}

/// Confirms a presented certificate's public key really is the one on file
/// for `identifier` (spec §4.3's `verify_certificate`). The caller has
/// already checked `digest(pubkey) == identifier`; this hook additionally
/// lets the embedder enforce an allow-list, revocation, etc.
pub trait CertificateVerifier: Send + Sync {
    fn verify_certificate(&self, identifier: &Identifier, public_key: &RsaPublicKey) -> bool;
}

/// A [`CertificateVerifier`] that accepts any certificate whose public key
/// hashes to its claimed identifier, deferring entirely to that check.
pub struct AcceptAnyCertificate;

impl CertificateVerifier for AcceptAnyCertificate {
    fn verify_certificate(&self, _identifier: &Identifier, _public_key: &RsaPublicKey) -> bool {
        true
    }
}

/// Recompute the identifier a certificate's public key should claim, per
/// spec §4.3: "the verifier recomputes the identifier from the
/// certificate's public key".
pub fn identifier_for_public_key(public_key: &RsaPublicKey) -> crate::error::TransportResult<Identifier> {
    use meshnet_util::Digest;
    use rsa::pkcs8::EncodePublicKey;

    let der = public_key
        .to_public_key_der()
        .map_err(|_| crate::error::TransportErrorKind::CertificateRejected {
            reason: "public key could not be DER-encoded",
        })?;
    let digest = Digest::from_bytes(der.as_bytes());
    Ok(Identifier::from_array(*digest.as_bytes()))
}
