// src/socket/mod.rs

//! The stream-socket seam: the minimal set of OS socket operations the
//! receiver, the senders and the close path need, plus error classification.

pub mod classify;
pub mod error_code;
#[cfg(test)]
pub(crate) mod mock;

pub use classify::{is_ignorable_socket_error, PlatformFamily};
pub use error_code::SocketErrorCode;

use async_trait::async_trait;
use socket2::SockRef;
use std::io::{self, IoSlice};
use std::net::{Shutdown, SocketAddr};
use tokio::net::TcpStream;

/// A connected, non-blocking stream socket.
///
/// All operations take `&self` so the read and write directions can be driven
/// from independent tasks holding the same `Arc`.
#[async_trait]
pub trait StreamSocket: Send + Sync + 'static {
  /// Waits until the socket is readable, or reports an error/closed condition.
  async fn readable(&self) -> io::Result<()>;

  /// Attempts a single non-blocking read. `Ok(0)` means the peer shut down its write side.
  fn try_read(&self, buf: &mut [u8]) -> io::Result<usize>;

  async fn writable(&self) -> io::Result<()>;

  fn try_write_vectored(&self, bufs: &[IoSlice<'_>]) -> io::Result<usize>;

  fn shutdown(&self, how: Shutdown) -> io::Result<()>;

  fn local_addr(&self) -> Option<SocketAddr> {
    None
  }

  fn peer_addr(&self) -> Option<SocketAddr> {
    None
  }
}

#[async_trait]
impl StreamSocket for TcpStream {
  async fn readable(&self) -> io::Result<()> {
    TcpStream::readable(self).await
  }

  fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
    TcpStream::try_read(self, buf)
  }

  async fn writable(&self) -> io::Result<()> {
    TcpStream::writable(self).await
  }

  fn try_write_vectored(&self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
    TcpStream::try_write_vectored(self, bufs)
  }

  fn shutdown(&self, how: Shutdown) -> io::Result<()> {
    SockRef::from(self).shutdown(how)
  }

  fn local_addr(&self) -> Option<SocketAddr> {
    TcpStream::local_addr(self).ok()
  }

  fn peer_addr(&self) -> Option<SocketAddr> {
    TcpStream::peer_addr(self).ok()
  }
}

#[cfg(all(unix, feature = "ipc"))]
#[async_trait]
impl StreamSocket for tokio::net::UnixStream {
  async fn readable(&self) -> io::Result<()> {
    tokio::net::UnixStream::readable(self).await
  }

  fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
    tokio::net::UnixStream::try_read(self, buf)
  }

  async fn writable(&self) -> io::Result<()> {
    tokio::net::UnixStream::writable(self).await
  }

  fn try_write_vectored(&self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
    tokio::net::UnixStream::try_write_vectored(self, bufs)
  }

  fn shutdown(&self, how: Shutdown) -> io::Result<()> {
    SockRef::from(self).shutdown(how)
  }
}
