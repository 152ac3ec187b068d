use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use meshnet_util::{Digest, Identifier};
use rand::RngCore;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::RsaPublicKey;
use sha3::Sha3_256;

use crate::credential::{identifier_for_public_key, CertificateVerifier, Credential, NameVerifier};
use crate::error::{TransportErrorKind, TransportResult};

/// Which side of the handshake this party is playing; only used to fix the
/// transcript byte order both sides hash and sign the same way.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

struct Hello {
    tag: u8,
    nonce: [u8; 32],
    name: Option<String>,
    public_key_der: Option<Vec<u8>>,
    identifier: Option<Identifier>,
}

impl Hello {
    fn write_to<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        w.write_u8(self.tag)?;
        w.write_all(&self.nonce)?;
        write_opt_str(&mut w, self.name.as_deref())?;
        write_opt_bytes(&mut w, self.public_key_der.as_deref())?;
        match &self.identifier {
            Some(id) => {
                w.write_u8(1)?;
                w.write_all(id.as_ref())?;
            }
            None => w.write_u8(0)?,
        }
        Ok(())
    }

    fn read_from<R: Read>(mut r: R) -> std::io::Result<Hello> {
        let tag = r.read_u8()?;
        let mut nonce = [0u8; 32];
        r.read_exact(&mut nonce)?;
        let name = read_opt_str(&mut r)?;
        let public_key_der = read_opt_bytes(&mut r)?;
        let identifier = if r.read_u8()? == 1 {
            let mut buf = [0u8; meshnet_util::IDENTIFIER_LEN];
            r.read_exact(&mut buf)?;
            Some(Identifier::from_array(buf))
        } else {
            None
        };
        Ok(Hello {
            tag,
            nonce,
            name,
            public_key_der,
            identifier,
        })
    }
}

fn write_opt_str<W: Write>(mut w: W, value: Option<&str>) -> std::io::Result<()> {
    match value {
        Some(s) => {
            w.write_u8(1)?;
            let bytes = s.as_bytes();
            w.write_u16::<BigEndian>(bytes.len() as u16)?;
            w.write_all(bytes)
        }
        None => w.write_u8(0),
    }
}

fn read_opt_str<R: Read>(mut r: R) -> std::io::Result<Option<String>> {
    if r.read_u8()? == 0 {
        return Ok(None);
    }
    let len = r.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(Some(
        String::from_utf8(buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
    ))
}

fn write_opt_bytes<W: Write>(mut w: W, value: Option<&[u8]>) -> std::io::Result<()> {
    match value {
        Some(bytes) => {
            w.write_u8(1)?;
            w.write_u16::<BigEndian>(bytes.len() as u16)?;
            w.write_all(bytes)
        }
        None => w.write_u8(0),
    }
}

fn read_opt_bytes<R: Read>(mut r: R) -> std::io::Result<Option<Vec<u8>>> {
    if r.read_u8()? == 0 {
        return Ok(None);
    }
    let len = r.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(Some(buf))
}

fn write_confirm<W: Write>(mut w: W, bytes: &[u8]) -> std::io::Result<()> {
    w.write_u16::<BigEndian>(bytes.len() as u16)?;
    w.write_all(bytes)
}

fn read_confirm<R: Read>(mut r: R) -> std::io::Result<Vec<u8>> {
    let len = r.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Run the handshake over `carrier`, returning the derived 32-byte session
/// key and, for a certificate-mode handshake, the peer's verified identifier
/// (spec §4.3: "the verifier recomputes the identifier from the
/// certificate's public key"). Anonymous and pre-shared-key handshakes never
/// learn a stable peer identifier, so the second element is `None`. On any
/// failure the caller must drop the transport (spec §4.3: "on failure the
/// transport is destroyed").
pub fn handshake<C: Read + Write>(
    carrier: &mut C,
    role: Role,
    credential: &Credential,
    name_verifier: Option<&dyn NameVerifier>,
    cert_verifier: Option<&dyn CertificateVerifier>,
) -> TransportResult<([u8; 32], Option<Identifier>)> {
    let mut nonce = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut nonce);

    let hello = build_hello(credential, nonce);
    hello.write_to(&mut *carrier)?;
    let peer_hello = Hello::read_from(&mut *carrier)?;

    let transcript = match role {
        Role::Client => concat_nonces(&nonce, &peer_hello.nonce),
        Role::Server => concat_nonces(&peer_hello.nonce, &nonce),
    };

    match credential {
        Credential::Anonymous => Ok((Digest::from_bytes(&transcript).into_array(), None)),
        Credential::PreSharedKey { name, secret } => {
            run_psk_confirm(carrier, name, secret, &transcript, peer_hello, name_verifier).map(|key| (key, None))
        }
        Credential::Certificate {
            identifier,
            private_key,
            public_key,
        } => run_certificate_confirm(
            carrier,
            *identifier,
            private_key,
            public_key,
            &transcript,
            peer_hello,
            cert_verifier,
        ),
    }
}

fn build_hello(credential: &Credential, nonce: [u8; 32]) -> Hello {
    match credential {
        Credential::Anonymous => Hello {
            tag: credential.tag(),
            nonce,
            name: None,
            public_key_der: None,
            identifier: None,
        },
        Credential::PreSharedKey { name, .. } => Hello {
            tag: credential.tag(),
            nonce,
            name: Some(name.clone()),
            public_key_der: None,
            identifier: None,
        },
        Credential::Certificate {
            identifier,
            public_key,
            ..
        } => {
            use rsa::pkcs8::EncodePublicKey;
            let der = public_key
                .to_public_key_der()
                .expect("meshnet-transport: failed to DER-encode RSA public key")
                .as_bytes()
                .to_vec();
            Hello {
                tag: credential.tag(),
                nonce,
                name: None,
                public_key_der: Some(der),
                identifier: Some(*identifier),
            }
        }
    }
}

fn concat_nonces(first: &[u8; 32], second: &[u8; 32]) -> Vec<u8> {
    let mut transcript = Vec::with_capacity(64);
    transcript.extend_from_slice(first);
    transcript.extend_from_slice(second);
    transcript
}

fn run_psk_confirm<C: Read + Write>(
    carrier: &mut C,
    name: &str,
    secret: &[u8; 32],
    transcript: &[u8],
    peer_hello: Hello,
    name_verifier: Option<&dyn NameVerifier>,
) -> TransportResult<[u8; 32]> {
    const PSK_TAG: u8 = 1;
    if peer_hello.tag != PSK_TAG {
        return Err(TransportErrorKind::HandshakeFailed {
            reason: "peer did not offer a pre-shared-key credential",
        }
        .into());
    }

    let peer_name = peer_hello.name.as_deref().unwrap_or("");
    if let Some(verifier) = name_verifier {
        let expected = verifier
            .verify_name(peer_name)
            .ok_or_else(|| TransportErrorKind::UnknownPeeringName {
                name: peer_name.to_owned(),
            })?;
        if &expected != secret {
            return Err(TransportErrorKind::HandshakeFailed {
                reason: "pre-shared key mismatch for peering name",
            }
            .into());
        }
    }

    let session_key = Digest::from_bytes(&[secret.as_slice(), transcript].concat()).into_array();

    let my_tag = confirm_tag(&session_key, name.as_bytes());
    write_confirm(&mut *carrier, &my_tag)?;
    let peer_tag = read_confirm(&mut *carrier)?;
    let expected_peer_tag = confirm_tag(&session_key, peer_name.as_bytes());
    if peer_tag != expected_peer_tag {
        return Err(TransportErrorKind::HandshakeFailed {
            reason: "pre-shared-key confirmation tag did not match",
        }
        .into());
    }

    Ok(session_key)
}

fn confirm_tag(session_key: &[u8; 32], label: &[u8]) -> Vec<u8> {
    Digest::from_bytes(&[session_key.as_slice(), label].concat())
        .as_bytes()
        .to_vec()
}

fn run_certificate_confirm<C: Read + Write>(
    carrier: &mut C,
    identifier: Identifier,
    private_key: &rsa::RsaPrivateKey,
    public_key: &RsaPublicKey,
    transcript: &[u8],
    peer_hello: Hello,
    cert_verifier: Option<&dyn CertificateVerifier>,
) -> TransportResult<([u8; 32], Option<Identifier>)> {
    let signing_key = SigningKey::<Sha3_256>::new(private_key.clone());
    let signature = signing_key.sign_with_rng(&mut rand::thread_rng(), transcript);
    write_confirm(&mut *carrier, &signature.to_bytes())?;
    let _ = (identifier, public_key);

    let peer_der = peer_hello
        .public_key_der
        .as_deref()
        .ok_or_else(|| TransportErrorKind::HandshakeFailed {
            reason: "peer did not present a certificate public key",
        })?;
    let peer_claimed_identifier = peer_hello
        .identifier
        .ok_or_else(|| TransportErrorKind::HandshakeFailed {
            reason: "peer did not present a claimed identifier",
        })?;

    use rsa::pkcs8::DecodePublicKey;
    let peer_public_key = RsaPublicKey::from_public_key_der(peer_der)
        .map_err(|_| TransportErrorKind::CertificateRejected {
            reason: "peer public key DER was malformed",
        })?;

    let recomputed = identifier_for_public_key(&peer_public_key)?;
    if recomputed != peer_claimed_identifier {
        return Err(TransportErrorKind::IdentifierMismatch.into());
    }

    if let Some(verifier) = cert_verifier {
        if !verifier.verify_certificate(&peer_claimed_identifier, &peer_public_key) {
            return Err(TransportErrorKind::CertificateRejected {
                reason: "application-level certificate verifier rejected the peer",
            }
            .into());
        }
    }

    let peer_signature_bytes = read_confirm(&mut *carrier)?;
    let peer_signature = Signature::try_from(peer_signature_bytes.as_slice()).map_err(|_| {
        TransportErrorKind::HandshakeFailed {
            reason: "peer signature could not be parsed",
        }
    })?;
    let verifying_key = VerifyingKey::<Sha3_256>::new(peer_public_key);
    verifying_key
        .verify(transcript, &peer_signature)
        .map_err(|_| TransportErrorKind::HandshakeFailed {
            reason: "peer signature over the handshake transcript did not verify",
        })?;

    Ok((Digest::from_bytes(transcript).into_array(), Some(peer_claimed_identifier)))
}
