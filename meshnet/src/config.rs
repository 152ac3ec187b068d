use std::path::PathBuf;
use std::time::Duration;

use meshnet_peer::{DEFAULT_MAX_RESEND_ATTEMPTS, DEFAULT_RESEND_DELAY};
use meshnet_transport::Credential;
use meshnet_util::Identifier;

/// Mirrors the private default in `meshnet_router::Router::new`; kept here
/// so a config built with `NodeConfig::new` and one built by calling
/// `Router::new()` directly end up with the same route table size.
const DEFAULT_ROUTE_TABLE_CAPACITY: usize = 4096;

/// Worker pool shape passed straight through to [`meshnet_runtime::WorkerPool::new`]
/// (SPEC_FULL §3: `[min, max, limit]`).
#[derive(Clone, Copy, Debug)]
pub struct WorkerPoolConfig {
    pub min: usize,
    pub max: usize,
    pub limit: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> WorkerPoolConfig {
        WorkerPoolConfig { min: 2, max: 16, limit: 256 }
    }
}

/// Everything a [`crate::Node`] needs to start: its own identity, the shape
/// of its worker pool, and the knobs the original exposes for the route
/// table and the reliable-notify backoff (SPEC_FULL §3).
pub struct NodeConfig {
    pub identifier: Identifier,
    pub credential: Credential,
    pub data_dir: PathBuf,
    pub route_table_capacity: usize,
    pub worker_pool: WorkerPoolConfig,
    pub resend_delay: Duration,
    pub max_resend_attempts: u32,
}

impl NodeConfig {
    /// Build a config around an already-derived identity, with every other
    /// knob at its default.
    pub fn new(identifier: Identifier, credential: Credential, data_dir: impl Into<PathBuf>) -> NodeConfig {
        NodeConfig {
            identifier,
            credential,
            data_dir: data_dir.into(),
            route_table_capacity: DEFAULT_ROUTE_TABLE_CAPACITY,
            worker_pool: WorkerPoolConfig::default(),
            resend_delay: DEFAULT_RESEND_DELAY,
            max_resend_attempts: DEFAULT_MAX_RESEND_ATTEMPTS,
        }
    }

    pub fn with_worker_pool(mut self, worker_pool: WorkerPoolConfig) -> NodeConfig {
        self.worker_pool = worker_pool;
        self
    }

    pub fn with_route_table_capacity(mut self, capacity: usize) -> NodeConfig {
        self.route_table_capacity = capacity;
        self
    }

    pub fn with_resend_backoff(mut self, delay: Duration, max_attempts: u32) -> NodeConfig {
        self.resend_delay = delay;
        self.max_resend_attempts = max_attempts;
        self
    }
}
