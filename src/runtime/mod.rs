// src/runtime/mod.rs

//! Execution primitives: completion schedulers, the dedicated I/O queue and the close guard.

pub(crate) mod close_guard;
pub mod io_queue;
pub mod scheduler;

pub(crate) use close_guard::SocketCloseGuard;
pub use io_queue::IoQueue;
pub use scheduler::{CompletionScheduler, SchedulerKind};
