use std::io;

error_chain! {
    types {
        TransportError, TransportErrorKind, TransportResultExt, TransportResult;
    }

    foreign_links {
        Io(io::Error);
    }

    errors {
        HandshakeFailed {
            reason: &'static str
        } {
            description("Handshake Failed")
            display("Handshake Failed: {}", reason)
        }

        UnknownPeeringName {
            name: String
        } {
            description("Pre-Shared Key Lookup Failed")
            display("No Pre-Shared Key Registered Under Peering Name {:?}", name)
        }

        CertificateRejected {
            reason: &'static str
        } {
            description("Certificate Rejected By Verifier")
            display("Certificate Rejected: {}", reason)
        }

        IdentifierMismatch {
        } {
            description("Certificate Public Key Does Not Hash To The Claimed Identifier")
        }

        DecryptFailed {
        } {
            description("AEAD Decryption Failed; Record Is Corrupt Or Replayed")
        }
    }
}
