error_chain! {
    types {
        BackendError, BackendErrorKind, BackendResultExt, BackendResult;
    }

    links {
        Transport(meshnet_transport::error::TransportError, meshnet_transport::error::TransportErrorKind);
    }

    foreign_links {
        Io(std::io::Error);
    }

    errors {
        NoCredentialForLocator {
        } {
            description("Locator Did Not Carry Enough Information To Select A Credential")
        }

        UnknownLocatorTarget {
        } {
            description("Locator Named Neither An Identifier Nor Any Addresses")
        }

        TunnelClosed {
        } {
            description("Tunnel Wrapper Was Torn Down While Waiting For Inbound Bytes")
        }
    }
}
