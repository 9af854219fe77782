// src/channel/mod.rs

//! Channels: the transport capability, the socket-backed implementation of it,
//! and the generic driver that pumps bytes between a transport and a codec.

pub mod options;
pub mod pipe;
pub mod socket_pipe;

pub use options::{ChannelOptions, TcpTransportConfig};
pub use pipe::PipeChannel;
pub use socket_pipe::SocketPipe;

use crate::error::ChannelError;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

static NEXT_CHANNEL_ID: AtomicUsize = AtomicUsize::new(1);

/// Allocates a process-unique channel id, used to correlate log events.
pub fn next_channel_id() -> usize {
  NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed)
}

/// The two I/O primitives a [`PipeChannel`] needs from a transport, plus its
/// close/teardown hooks and error policy.
///
/// `fill_buffer` is never called concurrently with itself, and neither is
/// `drain_buffer`; a fill and a drain may run at the same time.
#[async_trait]
pub trait PipeTransport: Send + Sync + 'static {
  fn channel_id(&self) -> usize;

  /// Appends bytes from the wire to `buf`'s spare capacity. `Ok(0)` is an orderly end of stream.
  async fn fill_buffer(&self, buf: &mut BytesMut) -> Result<usize, ChannelError>;

  /// Writes as much of `segments` as the wire accepts in one operation.
  async fn drain_buffer(&self, segments: &[Bytes]) -> Result<usize, ChannelError>;

  /// Starts closing the transport. Idempotent and safe to race; returns
  /// `Ok(true)` only for the call that actually performed the close. An error
  /// reports a failed shutdown step after which the handle was still released.
  fn close(&self) -> Result<bool, ChannelError>;

  /// Final teardown, run once after the driver has fully stopped.
  fn on_closed(&self);

  fn is_closed(&self) -> bool;

  /// Whether `e`, seen while the channel is going down, is routine rather than a fault.
  fn is_ignorable_error(&self, e: &ChannelError) -> bool {
    is_base_ignorable_error(e)
  }

  fn local_addr(&self) -> Option<SocketAddr> {
    None
  }

  fn remote_addr(&self) -> Option<SocketAddr> {
    None
  }
}

/// Errors every transport treats as routine: operating on an already closed channel.
pub fn is_base_ignorable_error(e: &ChannelError) -> bool {
  matches!(e, ChannelError::Closed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
  Open = 0,
  Faulted = 1,
  Closing = 2,
  Closed = 3,
}

impl ChannelState {
  pub(crate) fn from_u8(v: u8) -> Self {
    match v {
      0 => ChannelState::Open,
      1 => ChannelState::Faulted,
      2 => ChannelState::Closing,
      _ => ChannelState::Closed,
    }
  }
}

/// Why a channel stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
  /// Closed by this side.
  LocalClosing,
  /// The peer ended the stream, or reset it.
  RemoteClosing,
  /// The decoder rejected the byte stream.
  ProtocolError(String),
  /// An unexpected socket failure.
  SocketError(String),
  InternalError(String),
}

impl fmt::Display for CloseReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CloseReason::LocalClosing => f.write_str("closed locally"),
      CloseReason::RemoteClosing => f.write_str("closed by remote"),
      CloseReason::ProtocolError(msg) => write!(f, "protocol error: {}", msg),
      CloseReason::SocketError(msg) => write!(f, "socket error: {}", msg),
      CloseReason::InternalError(msg) => write!(f, "internal error: {}", msg),
    }
  }
}
