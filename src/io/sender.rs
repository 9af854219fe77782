// src/io/sender.rs

use crate::error::{SocketError, SocketResult};
use crate::runtime::CompletionScheduler;
use crate::socket::StreamSocket;

use std::io::{self, IoSlice};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{trace, warn};

/// Upper bound on segments handed to one vectored write; the remainder is
/// picked up by the caller's partial-write retry.
pub const MAX_GATHER_SEGMENTS: usize = 64;

/// Lifetime counters shared by a pool and every sender it created.
#[derive(Debug, Default)]
pub(crate) struct SenderCounters {
  pub created: AtomicUsize,
  pub rented: AtomicUsize,
  pub returned: AtomicUsize,
  pub disposed: AtomicUsize,
  pub leaked: AtomicUsize,
}

/// Reusable per-transfer send state: the gather list for one vectored write.
///
/// A sender is used for exactly one send between rent and return. It keeps no
/// payload between transfers; only the gather list's allocation is reused.
#[derive(Debug)]
pub struct SocketSender {
  id: usize,
  scheduler: CompletionScheduler,
  segments: Vec<Bytes>,
  transfers: u64,
  counters: Arc<SenderCounters>,
  disposed: bool,
}

impl SocketSender {
  pub(crate) fn new(id: usize, scheduler: CompletionScheduler, counters: Arc<SenderCounters>) -> Self {
    counters.created.fetch_add(1, Ordering::Relaxed);
    Self {
      id,
      scheduler,
      segments: Vec::new(),
      transfers: 0,
      counters,
      disposed: false,
    }
  }

  pub fn id(&self) -> usize {
    self.id
  }

  /// Number of vectored writes this sender has performed, successful or not.
  pub fn transfers(&self) -> u64 {
    self.transfers
  }

  /// True if the sender holds no payload from a previous transfer.
  pub fn is_clean(&self) -> bool {
    self.segments.is_empty()
  }

  /// Writes as much of `buffers` as the socket accepts in one vectored write.
  pub async fn send<S: StreamSocket>(&mut self, socket: &Arc<S>, buffers: &[Bytes]) -> SocketResult<usize> {
    self.segments.clear();
    self.segments.extend(
      buffers
        .iter()
        .filter(|b| !b.is_empty())
        .take(MAX_GATHER_SEGMENTS)
        .cloned(),
    );
    if self.segments.is_empty() {
      return Ok(0);
    }

    let segments = std::mem::take(&mut self.segments);
    let socket = socket.clone();
    let (result, mut segments) = self.scheduler.run(write_segments(socket, segments)).await?;
    segments.clear();
    self.segments = segments;
    self.transfers += 1;

    let n = result.map_err(SocketError::from)?;
    trace!(sender_id = self.id, bytes = n, "Send completed");
    Ok(n)
  }

  /// Drops any payload references so the next renter starts clean.
  pub(crate) fn reset(&mut self) {
    self.segments.clear();
  }

  /// Releases the per-transfer state. Consumes the sender, so it cannot be disposed twice.
  pub fn dispose(mut self) {
    self.segments = Vec::new();
    self.disposed = true;
    self.counters.disposed.fetch_add(1, Ordering::Relaxed);
    trace!(sender_id = self.id, transfers = self.transfers, "Sender disposed");
  }
}

impl Drop for SocketSender {
  fn drop(&mut self) {
    if !self.disposed {
      self.counters.leaked.fetch_add(1, Ordering::Relaxed);
      warn!(sender_id = self.id, "SocketSender dropped without being disposed");
    }
  }
}

async fn write_segments<S: StreamSocket>(socket: Arc<S>, segments: Vec<Bytes>) -> (io::Result<usize>, Vec<Bytes>) {
  let result = loop {
    let attempt = {
      let slices: Vec<IoSlice<'_>> = segments.iter().map(|b| IoSlice::new(b)).collect();
      socket.try_write_vectored(&slices)
    };
    match attempt {
      Ok(n) => break Ok(n),
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
        if let Err(e) = socket.writable().await {
          break Err(e);
        }
      }
      Err(e) => break Err(e),
    }
  };
  (result, segments)
}
