// src/io/mod.rs

//! Socket receive/send primitives and the shared sender pool.

pub mod receiver;
pub mod sender;
pub mod sender_pool;

pub use receiver::SocketReceiver;
pub use sender::{SocketSender, MAX_GATHER_SEGMENTS};
pub use sender_pool::{SenderPoolStats, SocketSenderPool, DEFAULT_MAX_POOLED_SENDERS};
