// src/io/receiver.rs

use crate::error::{SocketError, SocketResult};
use crate::runtime::CompletionScheduler;
use crate::socket::{SocketErrorCode, StreamSocket};

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tracing::trace;

/// Awaitable "wait until readable" and "read into buffer" over one socket.
///
/// At most one operation is outstanding at a time. The in-flight marker travels
/// with the operation itself, so a caller that stops awaiting cannot start a
/// second read while the first is still pending under a spawning scheduler;
/// such a read fails with [`SocketErrorCode::AlreadyInProgress`].
#[derive(Debug)]
pub struct SocketReceiver {
  scheduler: CompletionScheduler,
  in_flight: Arc<AtomicBool>,
  disposed: AtomicBool,
}

impl SocketReceiver {
  pub fn new(scheduler: CompletionScheduler) -> Self {
    Self {
      scheduler,
      in_flight: Arc::new(AtomicBool::new(false)),
      disposed: AtomicBool::new(false),
    }
  }

  pub fn scheduler(&self) -> &CompletionScheduler {
    &self.scheduler
  }

  /// Suspends until `socket` reports data or an error condition. Consumes no bytes.
  pub async fn wait_for_data<S: StreamSocket>(&self, socket: &Arc<S>) -> SocketResult<()> {
    let marker = self.begin()?;
    let socket = socket.clone();
    let result = self
      .scheduler
      .run(async move {
        let _marker = marker;
        socket.readable().await
      })
      .await?;
    result.map_err(SocketError::from)
  }

  /// Reads into the spare capacity of `buf`, appending what was received.
  ///
  /// Returns the number of bytes appended; `0` means the peer shut down its
  /// write side. Existing contents of `buf` are left untouched.
  pub async fn receive<S: StreamSocket>(&self, socket: &Arc<S>, buf: &mut BytesMut) -> SocketResult<usize> {
    if buf.capacity() == buf.len() {
      return Err(SocketError::new(
        SocketErrorCode::InvalidArgument,
        io::Error::new(io::ErrorKind::InvalidInput, "receive buffer has no spare capacity"),
      ));
    }
    let marker = self.begin()?;
    let socket = socket.clone();
    let region = buf.split_off(buf.len());

    let (result, region) = self
      .scheduler
      .run(async move {
        let _marker = marker;
        read_into(socket, region).await
      })
      .await?;
    buf.unsplit(region);

    let n = result.map_err(SocketError::from)?;
    trace!(bytes = n, "Receive completed");
    Ok(n)
  }

  /// Marks the receiver unusable; later operations fail with [`SocketErrorCode::Shutdown`].
  pub fn dispose(&self) {
    self.disposed.store(true, Ordering::Release);
  }

  pub fn is_disposed(&self) -> bool {
    self.disposed.load(Ordering::Acquire)
  }

  /// True while a wait or receive is outstanding, including one whose caller stopped awaiting.
  pub fn is_busy(&self) -> bool {
    self.in_flight.load(Ordering::Acquire)
  }

  fn begin(&self) -> SocketResult<InFlight> {
    if self.is_disposed() {
      return Err(SocketError::from_code(SocketErrorCode::Shutdown));
    }
    if self
      .in_flight
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return Err(SocketError::from_code(SocketErrorCode::AlreadyInProgress));
    }
    Ok(InFlight(self.in_flight.clone()))
  }
}

struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

async fn read_into<S: StreamSocket>(socket: Arc<S>, mut region: BytesMut) -> (io::Result<usize>, BytesMut) {
  let capacity = region.capacity();
  region.resize(capacity, 0);
  loop {
    match socket.try_read(&mut region[..]) {
      Ok(n) => {
        region.truncate(n);
        return (Ok(n), region);
      }
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
        if let Err(e) = socket.readable().await {
          region.clear();
          return (Err(e), region);
        }
      }
      Err(e) => {
        region.clear();
        return (Err(e), region);
      }
    }
  }
}
