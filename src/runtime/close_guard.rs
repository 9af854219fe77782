// src/runtime/close_guard.rs

use std::sync::Arc;
use tracing::trace;

/// Releases a claimed socket handle when dropped.
///
/// The close path arms this guard before attempting shutdown, so the hard
/// close happens on every exit path, including a failed or panicking shutdown.
/// Operations still in flight hold their own clone; the OS handle is closed
/// once they observe the shutdown and let go.
pub(crate) struct SocketCloseGuard<S: ?Sized> {
  channel_id: usize,
  socket: Option<Arc<S>>,
}

impl<S: ?Sized> SocketCloseGuard<S> {
  pub fn new(channel_id: usize, socket: Arc<S>) -> Self {
    Self {
      channel_id,
      socket: Some(socket),
    }
  }

  pub fn socket(&self) -> Option<&S> {
    self.socket.as_deref()
  }
}

impl<S: ?Sized> Drop for SocketCloseGuard<S> {
  fn drop(&mut self) {
    if let Some(socket) = self.socket.take() {
      let in_flight = Arc::strong_count(&socket) - 1;
      drop(socket);
      trace!(
        channel_id = self.channel_id,
        in_flight,
        "Socket handle released"
      );
    }
  }
}
