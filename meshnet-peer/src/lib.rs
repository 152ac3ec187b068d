//! Per-peer handler, credit-based sender, and caller registry (spec §4.5,
//! §4.8). This crate deliberately does not depend on `meshnet-backend`:
//! [`handler::TunnelDeliver`] is the seam a tunnel backend is wired to from
//! the root crate, avoiding a dependency cycle between the two.

#[macro_use]
extern crate error_chain;

pub mod caller;
pub mod error;
pub mod handler;
pub mod sender;

pub use caller::{Caller, CallerRegistry};
pub use error::{PeerError, PeerErrorKind, PeerResult};
pub use handler::{Handler, Listener, TunnelDeliver};
pub use sender::{MessageSink, Sender, DEFAULT_MAX_RESEND_ATTEMPTS, DEFAULT_RESEND_DELAY};
