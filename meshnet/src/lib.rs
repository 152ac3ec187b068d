//! Friend-to-friend overlay node: identity bootstrap, transport backends,
//! routing, pub/sub, and content-addressed block storage wired into one
//! facade (SPEC_FULL §4).

#[macro_use]
extern crate error_chain;

pub mod config;
pub mod error;
pub mod identity;
mod node;

pub use config::{NodeConfig, WorkerPoolConfig};
pub use error::{NodeError, NodeErrorKind, NodeResult};
pub use identity::{derive_identity, Identity};
pub use node::Node;
