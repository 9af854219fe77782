// src/socket/error_code.rs

use std::fmt;
use std::io;

/// Portable socket error codes.
///
/// The two host families report the same logical condition with different raw
/// values (`ECONNRESET` vs `WSAECONNRESET`, ...). Everything above the socket
/// layer matches on this enum instead of raw numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketErrorCode {
  ConnectionReset,
  /// The socket was already shut down (`ESHUTDOWN`, or `EPIPE` on a write after shutdown).
  Shutdown,
  ConnectionAborted,
  OperationAborted,
  Interrupted,
  InvalidArgument,
  ConnectionRefused,
  NotConnected,
  TimedOut,
  WouldBlock,
  /// A second operation was started while one is still outstanding (`EALREADY`).
  AlreadyInProgress,
  /// Any other condition. Holds the raw OS code, or -1 when none was available.
  Other(i32),
}

#[cfg(unix)]
const RAW_CODES: &[(i32, SocketErrorCode)] = &[
  (libc::ECONNRESET, SocketErrorCode::ConnectionReset),
  (libc::ESHUTDOWN, SocketErrorCode::Shutdown),
  (libc::EPIPE, SocketErrorCode::Shutdown),
  (libc::ECONNABORTED, SocketErrorCode::ConnectionAborted),
  (libc::ECANCELED, SocketErrorCode::OperationAborted),
  (libc::EINTR, SocketErrorCode::Interrupted),
  (libc::EINVAL, SocketErrorCode::InvalidArgument),
  (libc::ECONNREFUSED, SocketErrorCode::ConnectionRefused),
  (libc::ENOTCONN, SocketErrorCode::NotConnected),
  (libc::ETIMEDOUT, SocketErrorCode::TimedOut),
  (libc::EAGAIN, SocketErrorCode::WouldBlock),
  (libc::EWOULDBLOCK, SocketErrorCode::WouldBlock),
  (libc::EALREADY, SocketErrorCode::AlreadyInProgress),
];

// Winsock values, see winerror.h.
#[cfg(windows)]
const RAW_CODES: &[(i32, SocketErrorCode)] = &[
  (10054, SocketErrorCode::ConnectionReset),   // WSAECONNRESET
  (10058, SocketErrorCode::Shutdown),          // WSAESHUTDOWN
  (10053, SocketErrorCode::ConnectionAborted), // WSAECONNABORTED
  (995, SocketErrorCode::OperationAborted),    // ERROR_OPERATION_ABORTED
  (10004, SocketErrorCode::Interrupted),       // WSAEINTR
  (10022, SocketErrorCode::InvalidArgument),   // WSAEINVAL
  (10061, SocketErrorCode::ConnectionRefused), // WSAECONNREFUSED
  (10057, SocketErrorCode::NotConnected),      // WSAENOTCONN
  (10060, SocketErrorCode::TimedOut),          // WSAETIMEDOUT
  (10035, SocketErrorCode::WouldBlock),        // WSAEWOULDBLOCK
  (10037, SocketErrorCode::AlreadyInProgress), // WSAEALREADY
];

#[cfg(not(any(unix, windows)))]
const RAW_CODES: &[(i32, SocketErrorCode)] = &[];

impl SocketErrorCode {
  /// Classifies an `io::Error`, preferring the raw OS code and falling back to its kind.
  pub fn from_io_error(e: &io::Error) -> Self {
    if let Some(raw) = e.raw_os_error() {
      return Self::from_raw_os_error(raw);
    }
    Self::from_io_kind(e.kind())
  }

  pub fn from_raw_os_error(raw: i32) -> Self {
    RAW_CODES
      .iter()
      .find(|(value, _)| *value == raw)
      .map(|(_, code)| *code)
      .unwrap_or(SocketErrorCode::Other(raw))
  }

  pub fn from_io_kind(kind: io::ErrorKind) -> Self {
    match kind {
      io::ErrorKind::ConnectionReset => SocketErrorCode::ConnectionReset,
      io::ErrorKind::BrokenPipe => SocketErrorCode::Shutdown,
      io::ErrorKind::ConnectionAborted => SocketErrorCode::ConnectionAborted,
      io::ErrorKind::Interrupted => SocketErrorCode::Interrupted,
      io::ErrorKind::InvalidInput => SocketErrorCode::InvalidArgument,
      io::ErrorKind::ConnectionRefused => SocketErrorCode::ConnectionRefused,
      io::ErrorKind::NotConnected => SocketErrorCode::NotConnected,
      io::ErrorKind::TimedOut => SocketErrorCode::TimedOut,
      io::ErrorKind::WouldBlock => SocketErrorCode::WouldBlock,
      _ => SocketErrorCode::Other(-1),
    }
  }

  /// The closest `io::ErrorKind`, used when synthesizing an `io::Error` for a code.
  pub fn io_kind(self) -> io::ErrorKind {
    match self {
      SocketErrorCode::ConnectionReset => io::ErrorKind::ConnectionReset,
      SocketErrorCode::Shutdown => io::ErrorKind::BrokenPipe,
      SocketErrorCode::ConnectionAborted => io::ErrorKind::ConnectionAborted,
      SocketErrorCode::Interrupted => io::ErrorKind::Interrupted,
      SocketErrorCode::InvalidArgument => io::ErrorKind::InvalidInput,
      SocketErrorCode::ConnectionRefused => io::ErrorKind::ConnectionRefused,
      SocketErrorCode::NotConnected => io::ErrorKind::NotConnected,
      SocketErrorCode::TimedOut => io::ErrorKind::TimedOut,
      SocketErrorCode::WouldBlock => io::ErrorKind::WouldBlock,
      SocketErrorCode::OperationAborted | SocketErrorCode::AlreadyInProgress | SocketErrorCode::Other(_) => {
        io::ErrorKind::Other
      }
    }
  }
}

impl fmt::Display for SocketErrorCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SocketErrorCode::ConnectionReset => f.write_str("connection reset"),
      SocketErrorCode::Shutdown => f.write_str("shutdown"),
      SocketErrorCode::ConnectionAborted => f.write_str("connection aborted"),
      SocketErrorCode::OperationAborted => f.write_str("operation aborted"),
      SocketErrorCode::Interrupted => f.write_str("interrupted"),
      SocketErrorCode::InvalidArgument => f.write_str("invalid argument"),
      SocketErrorCode::ConnectionRefused => f.write_str("connection refused"),
      SocketErrorCode::NotConnected => f.write_str("not connected"),
      SocketErrorCode::TimedOut => f.write_str("timed out"),
      SocketErrorCode::WouldBlock => f.write_str("would block"),
      SocketErrorCode::AlreadyInProgress => f.write_str("operation already in progress"),
      SocketErrorCode::Other(raw) => write!(f, "os error {}", raw),
    }
  }
}
