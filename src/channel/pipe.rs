// src/channel/pipe.rs

use super::{ChannelOptions, ChannelState, CloseReason, PipeTransport};
use crate::error::ChannelError;

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, error, info, trace, warn};

/// Drives a [`PipeTransport`]: a read loop that fills a buffer and decodes
/// packages into a bounded queue, and a sequential send path that drains
/// encoded segments with partial-write retry.
///
/// Teardown is owned by the read loop. Whatever stops the channel (a local
/// close, the peer, a fault) ends up as a failed or empty fill, after which the
/// loop closes the transport, waits for an in-flight send, and runs
/// `on_closed` exactly once.
pub struct PipeChannel<T: PipeTransport, D: Decoder> {
  shared: Arc<ChannelShared<T>>,
  packages: async_channel::Receiver<D::Item>,
}

struct ChannelShared<T> {
  channel_id: usize,
  transport: T,
  state: AtomicU8,
  close_requested: AtomicBool,
  torn_down: AtomicBool,
  /// Held for the duration of one logical send; teardown takes it to wait out an in-flight send.
  outbound: AsyncMutex<()>,
  fault: Mutex<Option<CloseReason>>,
  closed_tx: watch::Sender<Option<CloseReason>>,
  receive_buffer_size: usize,
  max_package_length: usize,
}

impl<T, D> PipeChannel<T, D>
where
  T: PipeTransport,
  D: Decoder + Send + 'static,
  D::Item: Send + 'static,
  D::Error: std::error::Error + Send + Sync + 'static,
{
  /// Starts the channel's read loop on the current Tokio runtime.
  pub fn start(transport: T, decoder: D, options: &ChannelOptions) -> Self {
    let channel_id = transport.channel_id();
    let (closed_tx, _) = watch::channel(None);
    let shared = Arc::new(ChannelShared {
      channel_id,
      transport,
      state: AtomicU8::new(ChannelState::Open as u8),
      close_requested: AtomicBool::new(false),
      torn_down: AtomicBool::new(false),
      outbound: AsyncMutex::new(()),
      fault: Mutex::new(None),
      closed_tx,
      receive_buffer_size: options.receive_buffer_size.max(1),
      max_package_length: options.max_package_length,
    });
    let (package_tx, packages) = async_channel::bounded(options.package_queue_capacity.max(1));

    tokio::spawn(read_loop(shared.clone(), decoder, package_tx));
    info!(
      channel_id,
      local_addr = ?shared.transport.local_addr(),
      remote_addr = ?shared.transport.remote_addr(),
      "Channel started"
    );

    Self { shared, packages }
  }
}

impl<T: PipeTransport, D: Decoder> PipeChannel<T, D> {
  pub fn channel_id(&self) -> usize {
    self.shared.channel_id
  }

  pub fn transport(&self) -> &T {
    &self.shared.transport
  }

  pub fn state(&self) -> ChannelState {
    self.shared.state()
  }

  pub fn local_addr(&self) -> Option<SocketAddr> {
    self.shared.transport.local_addr()
  }

  pub fn remote_addr(&self) -> Option<SocketAddr> {
    self.shared.transport.remote_addr()
  }

  /// Next decoded package, or `None` once the channel has stopped and the queue is drained.
  pub async fn receive(&self) -> Option<D::Item> {
    self.packages.recv().await.ok()
  }

  /// Sends one pre-encoded buffer.
  pub async fn send(&self, data: Bytes) -> Result<(), ChannelError> {
    self.send_segments(vec![data]).await
  }

  /// Sends `segments` in order as one logical write. Sends on one channel are sequential.
  pub async fn send_segments(&self, segments: Vec<Bytes>) -> Result<(), ChannelError> {
    self.shared.ensure_open()?;
    let _outbound = self.shared.outbound.lock().await;
    self.shared.ensure_open()?;

    let mut pending: VecDeque<Bytes> = segments.into_iter().filter(|b| !b.is_empty()).collect();
    let mut total = 0usize;
    while !pending.is_empty() {
      let n = match self.shared.transport.drain_buffer(pending.make_contiguous()).await {
        Ok(0) => return Err(self.shared.send_failed(ChannelError::Closed)),
        Ok(n) => n,
        Err(e) => return Err(self.shared.send_failed(e)),
      };
      advance(&mut pending, n);
      total += n;
    }
    trace!(channel_id = self.shared.channel_id, bytes = total, "Send completed");
    Ok(())
  }

  /// Encodes `item` with `encoder` and sends the result.
  pub async fn send_with<E, I>(&self, encoder: &mut E, item: I) -> Result<(), ChannelError>
  where
    E: Encoder<I>,
    E::Error: std::error::Error + Send + Sync + 'static,
  {
    let mut buf = BytesMut::new();
    encoder.encode(item, &mut buf).map_err(ChannelError::codec)?;
    self.send(buf.freeze()).await
  }

  /// Starts closing without waiting for teardown.
  pub fn request_close(&self) {
    if self.shared.close_requested.swap(true, Ordering::AcqRel) {
      return;
    }
    let _ = self.shared.state.compare_exchange(
      ChannelState::Open as u8,
      ChannelState::Closing as u8,
      Ordering::AcqRel,
      Ordering::Acquire,
    );
    debug!(channel_id = self.shared.channel_id, "Close requested");
    self.shared.close_transport();
    // Unblocks a read loop waiting on a full queue. Queued packages stay readable.
    self.packages.close();
  }

  /// Closes the channel and waits until teardown has finished.
  pub async fn close(&self) -> CloseReason {
    self.request_close();
    self.closed().await
  }

  /// Waits for the channel to stop and returns why it stopped.
  pub async fn closed(&self) -> CloseReason {
    let mut rx = self.shared.closed_tx.subscribe();
    let reason = match rx.wait_for(|r| r.is_some()).await {
      Ok(reason) => (*reason).clone(),
      Err(_) => None,
    };
    reason.unwrap_or_else(|| CloseReason::InternalError("close notification lost".into()))
  }

  /// The close reason, if the channel has already stopped.
  pub fn close_reason(&self) -> Option<CloseReason> {
    self.shared.closed_tx.borrow().clone()
  }

  /// A watch that turns `Some` once teardown has finished. Outlives the channel handle.
  pub(crate) fn close_signal(&self) -> watch::Receiver<Option<CloseReason>> {
    self.shared.closed_tx.subscribe()
  }
}

impl<T: PipeTransport, D: Decoder> Drop for PipeChannel<T, D> {
  fn drop(&mut self) {
    // The read loop owns teardown and finishes it on its own.
    self.request_close();
  }
}

impl<T: PipeTransport, D: Decoder> fmt::Debug for PipeChannel<T, D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PipeChannel")
      .field("channel_id", &self.shared.channel_id)
      .field("state", &self.shared.state())
      .field("queued_packages", &self.packages.len())
      .finish_non_exhaustive()
  }
}

impl<T: PipeTransport> ChannelShared<T> {
  fn state(&self) -> ChannelState {
    ChannelState::from_u8(self.state.load(Ordering::Acquire))
  }

  fn ensure_open(&self) -> Result<(), ChannelError> {
    if self.close_requested.load(Ordering::Acquire) {
      return Err(ChannelError::Closed);
    }
    match self.state() {
      ChannelState::Open => Ok(()),
      _ => Err(ChannelError::Closed),
    }
  }

  fn close_transport(&self) {
    match self.transport.close() {
      Ok(true) => trace!(channel_id = self.channel_id, "Transport closed"),
      Ok(false) => {}
      Err(e) if self.transport.is_ignorable_error(&e) => {
        debug!(channel_id = self.channel_id, error = %e, "Ignorable error while closing transport");
      }
      Err(e) => warn!(channel_id = self.channel_id, error = %e, "Error while closing transport"),
    }
  }

  /// Records the first fault. Later faults and local closes do not override it.
  fn record_fault(&self, reason: CloseReason) {
    let mut fault = self.fault.lock();
    if fault.is_none() {
      *fault = Some(reason);
      let _ = self.state.compare_exchange(
        ChannelState::Open as u8,
        ChannelState::Faulted as u8,
        Ordering::AcqRel,
        Ordering::Acquire,
      );
    }
  }

  fn send_failed(&self, e: ChannelError) -> ChannelError {
    if self.close_requested.load(Ordering::Acquire) || self.transport.is_ignorable_error(&e) {
      debug!(channel_id = self.channel_id, error = %e, "Send stopped by channel shutdown");
    } else {
      error!(channel_id = self.channel_id, error = %e, "Send failed");
      self.record_fault(CloseReason::SocketError(e.to_string()));
      self.close_transport();
    }
    e
  }

  async fn teardown(&self, reason: CloseReason) {
    if self.torn_down.swap(true, Ordering::AcqRel) {
      return;
    }
    if self.state() != ChannelState::Faulted {
      self.state.store(ChannelState::Closing as u8, Ordering::Release);
    }
    self.close_transport();

    let outbound = self.outbound.lock().await;
    self.transport.on_closed();
    drop(outbound);

    let reason = self.fault.lock().take().unwrap_or(reason);
    self.state.store(ChannelState::Closed as u8, Ordering::Release);
    info!(channel_id = self.channel_id, reason = %reason, "Channel closed");
    self.closed_tx.send_replace(Some(reason));
  }
}

async fn read_loop<T, D>(shared: Arc<ChannelShared<T>>, mut decoder: D, package_tx: async_channel::Sender<D::Item>)
where
  T: PipeTransport,
  D: Decoder,
  D::Error: std::error::Error + Send + Sync + 'static,
{
  let channel_id = shared.channel_id;
  let mut buf = BytesMut::with_capacity(shared.receive_buffer_size);

  let reason = 'pump: loop {
    buf.reserve(shared.receive_buffer_size);
    let n = match shared.transport.fill_buffer(&mut buf).await {
      Ok(n) => n,
      Err(e) => break 'pump classify_receive_error(&shared, e),
    };

    if n == 0 {
      trace!(channel_id, remaining = buf.len(), "End of stream");
      loop {
        match decoder.decode_eof(&mut buf) {
          Ok(Some(item)) => {
            if package_tx.send(item).await.is_err() {
              break;
            }
          }
          Ok(None) => break,
          Err(e) => break 'pump protocol_fault(&shared, ChannelError::codec(e)),
        }
      }
      break 'pump if shared.close_requested.load(Ordering::Acquire) {
        CloseReason::LocalClosing
      } else {
        CloseReason::RemoteClosing
      };
    }

    loop {
      match decoder.decode(&mut buf) {
        Ok(Some(item)) => {
          if package_tx.send(item).await.is_err() {
            debug!(channel_id, "Package queue closed");
            break 'pump CloseReason::LocalClosing;
          }
        }
        Ok(None) => break,
        Err(e) => break 'pump protocol_fault(&shared, ChannelError::codec(e)),
      }
    }

    if buf.len() > shared.max_package_length {
      let e = ChannelError::PackageTooLarge {
        size: buf.len(),
        max: shared.max_package_length,
      };
      break 'pump protocol_fault(&shared, e);
    }
  };

  package_tx.close();
  shared.teardown(reason).await;
}

fn classify_receive_error<T: PipeTransport>(shared: &ChannelShared<T>, e: ChannelError) -> CloseReason {
  let channel_id = shared.channel_id;
  if shared.close_requested.load(Ordering::Acquire) {
    debug!(channel_id, error = %e, "Receive stopped by local close");
    CloseReason::LocalClosing
  } else if shared.transport.is_ignorable_error(&e) {
    debug!(channel_id, error = %e, "Receive ended by remote");
    CloseReason::RemoteClosing
  } else {
    error!(channel_id, error = %e, "Receive failed");
    let reason = CloseReason::SocketError(e.to_string());
    shared.record_fault(reason.clone());
    reason
  }
}

fn protocol_fault<T: PipeTransport>(shared: &ChannelShared<T>, e: ChannelError) -> CloseReason {
  error!(channel_id = shared.channel_id, error = %e, "Protocol error");
  let reason = CloseReason::ProtocolError(e.to_string());
  shared.record_fault(reason.clone());
  reason
}

/// Drops the first `n` bytes from the front of `pending`.
fn advance(pending: &mut VecDeque<Bytes>, mut n: usize) {
  while n > 0 {
    match pending.front_mut() {
      Some(front) if front.len() <= n => {
        n -= front.len();
        pending.pop_front();
      }
      Some(front) => {
        front.advance(n);
        n = 0;
      }
      None => break,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn advance_spans_segments() {
    let mut pending: VecDeque<Bytes> = [
      Bytes::from_static(b"abc"),
      Bytes::from_static(b"de"),
      Bytes::from_static(b"fgh"),
    ]
    .into_iter()
    .collect();

    advance(&mut pending, 4);
    assert_eq!(pending.len(), 2);
    assert_eq!(&pending[0][..], b"e");

    advance(&mut pending, 1);
    assert_eq!(pending.len(), 1);
    assert_eq!(&pending[0][..], b"fgh");

    advance(&mut pending, 10);
    assert!(pending.is_empty());
  }
}
