// src/error.rs

use crate::socket::SocketErrorCode;

use std::io;
use thiserror::Error;

/// A typed OS-level socket failure.
///
/// Carries the portable [`SocketErrorCode`] used by the teardown classification
/// alongside the original `io::Error` for display and diagnostics.
#[derive(Error, Debug)]
#[error("socket error ({code}): {source}")]
pub struct SocketError {
  code: SocketErrorCode,
  #[source]
  source: io::Error,
}

impl SocketError {
  pub fn new(code: SocketErrorCode, source: io::Error) -> Self {
    Self { code, source }
  }

  /// Builds a socket error with a synthetic `io::Error` for the given code.
  /// Used by test doubles and by paths that only know the logical condition.
  pub fn from_code(code: SocketErrorCode) -> Self {
    Self {
      code,
      source: io::Error::new(code.io_kind(), code.to_string()),
    }
  }

  pub fn code(&self) -> SocketErrorCode {
    self.code
  }

  pub fn io_error(&self) -> &io::Error {
    &self.source
  }

  pub fn into_io_error(self) -> io::Error {
    self.source
  }
}

impl From<io::Error> for SocketError {
  fn from(e: io::Error) -> Self {
    let code = SocketErrorCode::from_io_error(&e);
    Self { code, source: e }
  }
}

impl From<SocketError> for io::Error {
  fn from(e: SocketError) -> Self {
    e.into_io_error()
  }
}

/// Result of a single receiver/sender operation against the socket.
pub type SocketResult<T = usize> = Result<T, SocketError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ChannelError {
  // --- Socket Errors ---
  #[error(transparent)]
  Socket(#[from] SocketError),

  // --- State Errors ---
  #[error("Channel is closed")]
  Closed,
  #[error("A receive is already in flight on this channel")]
  ReceiveInProgress,
  #[error("A send is already in flight on this channel")]
  SendInProgress,
  #[error("Operation is invalid for the current channel state: {0}")]
  InvalidState(&'static str),

  // --- Protocol Errors ---
  #[error("Codec error: {0}")]
  Codec(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
  #[error("Package exceeds the maximum length ({size} > {max} bytes)")]
  PackageTooLarge { size: usize, max: usize },

  // --- Connection Errors ---
  #[error("Failed to connect to {endpoint}: {source}")]
  Connect {
    endpoint: String,
    #[source]
    source: io::Error,
  },
  #[error("The connection to {0} was cancelled")]
  Cancelled(String),
  #[error("Operation timed out")]
  Timeout,
  #[error("Connector reported success without a socket")]
  NullSocket,

  // --- Internal Errors ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

impl ChannelError {
  /// Maps a connection-establishment failure to a channel error tagged with the endpoint.
  pub fn from_io_endpoint(e: io::Error, endpoint: &str) -> Self {
    match e.kind() {
      io::ErrorKind::TimedOut => ChannelError::Timeout,
      _ => ChannelError::Connect {
        endpoint: endpoint.to_string(),
        source: e,
      },
    }
  }

  pub fn codec<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    ChannelError::Codec(Box::new(e))
  }

  /// Returns the underlying socket error code, if this is a socket failure.
  pub fn socket_code(&self) -> Option<SocketErrorCode> {
    match self {
      ChannelError::Socket(se) => Some(se.code()),
      _ => None,
    }
  }
}

impl From<io::Error> for ChannelError {
  fn from(e: io::Error) -> Self {
    ChannelError::Socket(SocketError::from(e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn io_error_is_classified_on_conversion() {
    let err: ChannelError = io::Error::from(io::ErrorKind::ConnectionReset).into();
    assert_eq!(err.socket_code(), Some(SocketErrorCode::ConnectionReset));
  }

  #[test]
  fn socket_error_hands_back_the_os_error() {
    let err = SocketError::from(io::Error::from(io::ErrorKind::ConnectionAborted));
    assert_eq!(err.code(), SocketErrorCode::ConnectionAborted);
    let io_err = err.into_io_error();
    assert_eq!(io_err.kind(), io::ErrorKind::ConnectionAborted);

    fn read_step() -> io::Result<usize> {
      let res: SocketResult = Err(SocketError::from_code(SocketErrorCode::TimedOut));
      Ok(res?)
    }
    assert_eq!(read_step().expect_err("timed out").kind(), io::ErrorKind::TimedOut);
  }

  #[test]
  fn connect_failure_keeps_endpoint() {
    let err = ChannelError::from_io_endpoint(io::Error::from(io::ErrorKind::ConnectionRefused), "127.0.0.1:1");
    match err {
      ChannelError::Connect { endpoint, .. } => assert_eq!(endpoint, "127.0.0.1:1"),
      other => panic!("unexpected error: {other:?}"),
    }
    let err = ChannelError::from_io_endpoint(io::Error::from(io::ErrorKind::TimedOut), "x");
    assert!(matches!(err, ChannelError::Timeout));
  }
}
