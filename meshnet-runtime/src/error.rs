error_chain! {
    types {
        RuntimeError, RuntimeErrorKind, RuntimeResultExt, RuntimeResult;
    }

    errors {
        QueueFull {
            limit: usize
        } {
            description("Worker Pool Queue Is At Its Limit")
            display("Worker Pool Queue Already Holds The Maximum Of {} Pending Tasks", limit)
        }
    }
}
