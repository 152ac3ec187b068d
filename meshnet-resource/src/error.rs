use std::io;

error_chain! {
    types {
        ResourceError, ResourceErrorKind, ResourceResultExt, ResourceResult;
    }

    links {
        Store(meshnet_store::error::StoreError, meshnet_store::error::StoreErrorKind);
    }

    foreign_links {
        Io(io::Error);
    }

    errors {
        SeekPastEnd {
            offset: u64,
            size: u64
        } {
            description("Seek Offset Is Past The End Of The Resource")
            display("Seek Offset {} Is Past The End Of The Resource ({} Bytes)", offset, size)
        }

        EmptyName {
            description("Entry Name Must Not Be Empty")
        }
    }
}
