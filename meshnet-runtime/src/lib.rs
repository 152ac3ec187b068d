//! Background timers and a bounded worker pool (spec §C9).

#[macro_use]
extern crate error_chain;

mod alarm;
mod pool;

pub mod error;

pub use alarm::Alarm;
pub use pool::WorkerPool;
