error_chain! {
    types {
        PeerError, PeerErrorKind, PeerResultExt, PeerResult;
    }

    links {
        Wire(meshnet_wire::error::WireError, meshnet_wire::error::WireErrorKind);
        Store(meshnet_store::error::StoreError, meshnet_store::error::StoreErrorKind);
        Router(meshnet_router::error::RouterError, meshnet_router::error::RouterErrorKind);
        Transport(meshnet_transport::error::TransportError, meshnet_transport::error::TransportErrorKind);
    }

    foreign_links {
        Io(std::io::Error);
    }

    errors {
        NotLocalDestination {
        } {
            description("Message Destination Is Not This Node's Local Identifier")
        }
    }
}
