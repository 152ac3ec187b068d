use std::io;

error_chain! {
    types {
        WireError, WireErrorKind, WireResultExt, WireResult;
    }

    foreign_links {
        Io(io::Error);
    }

    errors {
        PayloadTooLarge {
            len: usize
        } {
            description("Message Payload Exceeds The Maximum Frame Size")
            display("Payload Of {} Bytes Exceeds The Maximum Of {} Bytes", len, u16::MAX as usize)
        }

        UnknownMessageType {
            byte: u8
        } {
            description("Unknown Message Type Byte In Header")
            display("Unknown Message Type Byte {}", byte)
        }

        UnknownContentType {
            byte: u8
        } {
            description("Unknown Content Type Byte In Header")
            display("Unknown Content Type Byte {}", byte)
        }

        Truncated {
            what: &'static str
        } {
            description("Message Payload Ended Before Expected Field")
            display("Payload Ended Before Reading {}", what)
        }
    }
}
