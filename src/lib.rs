//! sockpipe - Socket-backed duplex pipe channels for Tokio.
//!
//! A [`SocketPipe`] owns one connected stream socket and provides the two I/O
//! primitives a [`PipeChannel`] needs: filling a receive buffer and draining
//! send segments. Closing is idempotent and race-free; teardown errors that
//! only mean "the connection is going away" are told apart from real faults.

pub mod channel;
pub mod client;
pub mod error;
pub mod io;
pub mod runtime;
pub mod socket;
pub mod transport;

// Re-export core types for user convenience
pub use channel::{ChannelOptions, ChannelState, CloseReason, PipeChannel, PipeTransport, SocketPipe, TcpTransportConfig};
pub use client::{ClientOptions, Connector, EasyClient, TcpConnector};
pub use error::{ChannelError, SocketError, SocketResult};
pub use io::{SenderPoolStats, SocketReceiver, SocketSender, SocketSenderPool};
pub use runtime::{CompletionScheduler, IoQueue, SchedulerKind};
pub use socket::{is_ignorable_socket_error, PlatformFamily, SocketErrorCode, StreamSocket};
pub use transport::{ChannelCreator, ChannelCreatorFactory, ListenOptions, TcpChannel, TcpChannelCreator, TcpChannelCreatorFactory};

static_assertions::assert_impl_all!(SocketSenderPool: Send, Sync);
static_assertions::assert_impl_all!(SocketReceiver: Send, Sync);
static_assertions::assert_impl_all!(SocketPipe<tokio::net::TcpStream>: Send, Sync);
static_assertions::assert_impl_all!(ChannelError: Send, Sync);

// --- Top-Level Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

/// Returns the major version number of the library.
pub fn version_major() -> i32 {
  VERSION_MAJOR
}

/// Returns the minor version number of the library.
pub fn version_minor() -> i32 {
  VERSION_MINOR
}

/// Returns the patch version number of the library.
pub fn version_patch() -> i32 {
  VERSION_PATCH
}
