use meshnet_util::{Digest, Identifier};

error_chain! {
    types {
        NodeError, NodeErrorKind, NodeResultExt, NodeResult;
    }

    links {
        Peer(meshnet_peer::PeerError, meshnet_peer::PeerErrorKind);
        Backend(meshnet_backend::error::BackendError, meshnet_backend::error::BackendErrorKind);
        Store(meshnet_store::error::StoreError, meshnet_store::error::StoreErrorKind);
        Router(meshnet_router::error::RouterError, meshnet_router::error::RouterErrorKind);
        Transport(meshnet_transport::error::TransportError, meshnet_transport::error::TransportErrorKind);
        Resource(meshnet_resource::error::ResourceError, meshnet_resource::error::ResourceErrorKind);
        Runtime(meshnet_runtime::error::RuntimeError, meshnet_runtime::error::RuntimeErrorKind);
    }

    foreign_links {
        Io(std::io::Error);
    }

    errors {
        IdentityGenerationFailed {
        } {
            description("Could Not Generate A Fresh Node Identity")
        }

        UnknownPeer {
            identifier: Identifier
        } {
            description("No Handler Is Registered For This Identifier")
            display("No Connected Peer Known Under Identifier {:?}", identifier)
        }

        NoIdentifierForConnection {
        } {
            description("Connection Completed But No Peer Identifier Could Be Determined")
        }

        BackendNotListening {
            kind: &'static str
        } {
            description("No Backend Of This Kind Has Been Started Yet")
            display("No {} Backend Is Listening; Call The Matching Listen Method First", kind)
        }

        FetchTimedOut {
            digest: Digest
        } {
            description("Timed Out Waiting For A Requested Block To Arrive")
            display("Timed Out Waiting For Block {} To Arrive", digest)
        }
    }
}
