use std::io;
use std::path::PathBuf;

use meshnet_util::Digest;

error_chain! {
    types {
        StoreError, StoreErrorKind, StoreResultExt, StoreResult;
    }

    foreign_links {
        Io(io::Error);
    }

    errors {
        BlockNotFound {
            digest: Digest
        } {
            description("Block Not Present In Store")
            display("Block {} Is Not Present In The Store", digest)
        }

        BlockTooLarge {
            digest: Digest,
            len: usize
        } {
            description("Block Payload Exceeds The Maximum Block Size")
            display("Block {} Of {} Bytes Exceeds The Maximum Block Size", digest, len)
        }

        DigestMismatch {
            expected: Digest,
            actual: Digest
        } {
            description("Pushed Bytes Do Not Hash To The Expected Digest")
            display("Pushed Bytes Hash To {} But {} Was Expected", actual, expected)
        }

        WaitTimedOut {
            digest: Digest
        } {
            description("Timed Out Waiting For Block To Arrive")
            display("Timed Out Waiting For Block {} To Arrive", digest)
        }

        BadDataDirectory {
            path: PathBuf
        } {
            description("Data Directory Could Not Be Created Or Opened")
            display("Data Directory {:?} Could Not Be Created Or Opened", path)
        }
    }
}
