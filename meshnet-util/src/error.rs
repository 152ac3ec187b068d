use std::io;

error_chain! {
    types {
        UtilError, UtilErrorKind, UtilResultExt, UtilResult;
    }

    foreign_links {
        Io(io::Error);
    }

    errors {
        BadLength {
            expected: usize,
            actual: usize
        } {
            description("Value Has An Invalid Length")
            display("Expected A Length Of {} Bytes But Got {}", expected, actual)
        }
    }
}
