// src/channel/socket_pipe.rs

use super::{is_base_ignorable_error, next_channel_id, ChannelOptions, PipeTransport};
use crate::error::ChannelError;
use crate::io::{SocketReceiver, SocketSender, SocketSenderPool};
use crate::runtime::{CompletionScheduler, SocketCloseGuard};
use crate::socket::{is_ignorable_socket_error, PlatformFamily, StreamSocket};

use std::fmt;
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// The socket-backed [`PipeTransport`].
///
/// Owns the socket handle, one receiver and a sender pool. The handle lives in
/// a single CAS slot: present while open, swapped to `None` by exactly one
/// `close` call, after which every operation fails with `ChannelError::Closed`.
pub struct SocketPipe<S: StreamSocket> {
  channel_id: usize,
  socket: ArcSwapOption<S>,
  receiver: SocketReceiver,
  sender_pool: Arc<SocketSenderPool>,
  owns_pool: bool,
  /// The sender of a send that did not complete successfully. Disposed at teardown.
  unreturned_sender: Mutex<Option<SocketSender>>,
  receiving: AtomicBool,
  sending: AtomicBool,
  torn_down: AtomicBool,
  platform: PlatformFamily,
  local_addr: Option<SocketAddr>,
  remote_addr: Option<SocketAddr>,
}

impl<S: StreamSocket> SocketPipe<S> {
  pub fn new(socket: S, options: &ChannelOptions) -> Result<Self, ChannelError> {
    Self::from_arc(Arc::new(socket), options)
  }

  pub fn from_arc(socket: Arc<S>, options: &ChannelOptions) -> Result<Self, ChannelError> {
    let channel_id = next_channel_id();
    let scheduler = CompletionScheduler::for_kind(options.scheduler)?;

    let (sender_pool, owns_pool) = match &options.sender_pool {
      Some(pool) => {
        if pool.scheduler().kind() != options.scheduler {
          debug!(
            channel_id,
            pool_scheduler = ?pool.scheduler().kind(),
            channel_scheduler = ?options.scheduler,
            "Rejecting shared sender pool with a different scheduler"
          );
          return Err(ChannelError::InvalidState(
            "shared sender pool uses a different completion scheduler",
          ));
        }
        (pool.clone(), false)
      }
      None => (Arc::new(SocketSenderPool::new(scheduler.clone())), true),
    };

    let local_addr = socket.local_addr();
    let remote_addr = socket.peer_addr();
    debug!(channel_id, ?local_addr, ?remote_addr, scheduler = ?options.scheduler, "Socket pipe created");

    Ok(Self {
      channel_id,
      socket: ArcSwapOption::new(Some(socket)),
      receiver: SocketReceiver::new(scheduler),
      sender_pool,
      owns_pool,
      unreturned_sender: Mutex::new(None),
      receiving: AtomicBool::new(false),
      sending: AtomicBool::new(false),
      torn_down: AtomicBool::new(false),
      platform: options.platform,
      local_addr,
      remote_addr,
    })
  }

  pub fn sender_pool(&self) -> &Arc<SocketSenderPool> {
    &self.sender_pool
  }

  /// True while a sender from a failed send is waiting for teardown.
  pub fn has_unreturned_sender(&self) -> bool {
    self.unreturned_sender.lock().is_some()
  }

  pub fn platform(&self) -> PlatformFamily {
    self.platform
  }

  fn current_socket(&self) -> Result<Arc<S>, ChannelError> {
    self.socket.load_full().ok_or(ChannelError::Closed)
  }

  fn retain_unreturned(&self, sender: SocketSender) {
    let previous = self.unreturned_sender.lock().replace(sender);
    if let Some(previous) = previous {
      warn!(
        channel_id = self.channel_id,
        sender_id = previous.id(),
        "Replacing an unreturned sender from an earlier failed send; disposing it"
      );
      previous.dispose();
    }
  }
}

#[async_trait]
impl<S: StreamSocket> PipeTransport for SocketPipe<S> {
  fn channel_id(&self) -> usize {
    self.channel_id
  }

  async fn fill_buffer(&self, buf: &mut BytesMut) -> Result<usize, ChannelError> {
    let _busy = BusyFlag::acquire(&self.receiving).ok_or(ChannelError::ReceiveInProgress)?;
    let socket = self.current_socket()?;
    if self.receiver.is_disposed() {
      return Err(ChannelError::Closed);
    }
    if buf.capacity() == buf.len() {
      return Err(ChannelError::InvalidState("receive buffer has no spare capacity"));
    }

    self.receiver.wait_for_data(&socket).await?;
    let n = self.receiver.receive(&socket, buf).await?;

    trace!(channel_id = self.channel_id, bytes = n, "Filled receive buffer");
    Ok(n)
  }

  async fn drain_buffer(&self, segments: &[Bytes]) -> Result<usize, ChannelError> {
    let _busy = BusyFlag::acquire(&self.sending).ok_or(ChannelError::SendInProgress)?;
    let socket = self.current_socket()?;

    let mut checked_out = CheckedOutSender {
      pipe: self,
      sender: Some(self.sender_pool.rent()),
    };
    let n = match checked_out.sender.as_mut() {
      Some(sender) => sender.send(&socket, segments).await?,
      None => return Err(ChannelError::Internal("sender missing after rent".into())),
    };

    // Only a successful send gives the sender back; on every other path the
    // guard parks it for disposal at teardown.
    if let Some(sender) = checked_out.sender.take() {
      self.sender_pool.return_sender(sender);
    }
    trace!(channel_id = self.channel_id, bytes = n, "Drained send buffer");
    Ok(n)
  }

  fn close(&self) -> Result<bool, ChannelError> {
    let current = self.socket.load_full();
    let socket = match &current {
      Some(socket) => socket.clone(),
      None => return Ok(false),
    };

    let previous = self.socket.compare_and_swap(&current, None::<Arc<S>>);
    let claimed = matches!(&*previous, Some(prev) if Arc::ptr_eq(prev, &socket));
    if !claimed {
      trace!(channel_id = self.channel_id, "Close already claimed by another caller");
      return Ok(false);
    }

    debug!(channel_id = self.channel_id, "Closing socket");
    let guard = SocketCloseGuard::new(self.channel_id, socket);
    let shutdown_result = match guard.socket() {
      Some(socket) => socket.shutdown(Shutdown::Both),
      None => Ok(()),
    };
    drop(guard);

    match shutdown_result {
      Ok(()) => Ok(true),
      Err(e) => Err(ChannelError::from(e)),
    }
  }

  fn on_closed(&self) {
    if self.torn_down.swap(true, Ordering::AcqRel) {
      return;
    }
    self.socket.store(None);
    if let Some(sender) = self.unreturned_sender.lock().take() {
      debug!(channel_id = self.channel_id, sender_id = sender.id(), "Disposing unreturned sender");
      sender.dispose();
    }
    self.receiver.dispose();
    if self.owns_pool {
      self.sender_pool.dispose();
    }
    debug!(channel_id = self.channel_id, "Socket pipe torn down");
  }

  fn is_closed(&self) -> bool {
    self.socket.load().is_none()
  }

  fn is_ignorable_error(&self, e: &ChannelError) -> bool {
    if is_base_ignorable_error(e) {
      return true;
    }
    match e {
      ChannelError::Socket(se) => is_ignorable_socket_error(se.code(), self.platform),
      _ => false,
    }
  }

  fn local_addr(&self) -> Option<SocketAddr> {
    self.local_addr
  }

  fn remote_addr(&self) -> Option<SocketAddr> {
    self.remote_addr
  }
}

impl<S: StreamSocket> Drop for SocketPipe<S> {
  fn drop(&mut self) {
    self.on_closed();
  }
}

impl<S: StreamSocket> fmt::Debug for SocketPipe<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SocketPipe")
      .field("channel_id", &self.channel_id)
      .field("closed", &self.is_closed())
      .field("scheduler", &self.receiver.scheduler().kind())
      .field("owns_pool", &self.owns_pool)
      .field("platform", &self.platform)
      .field("local_addr", &self.local_addr)
      .field("remote_addr", &self.remote_addr)
      .finish_non_exhaustive()
  }
}

/// A sender between rent and a successful send.
///
/// Dropping it with the sender still inside (failed or cancelled send) parks
/// the sender in the pipe's unreturned slot instead of the pool.
struct CheckedOutSender<'a, S: StreamSocket> {
  pipe: &'a SocketPipe<S>,
  sender: Option<SocketSender>,
}

impl<S: StreamSocket> Drop for CheckedOutSender<'_, S> {
  fn drop(&mut self) {
    if let Some(sender) = self.sender.take() {
      debug!(
        channel_id = self.pipe.channel_id,
        sender_id = sender.id(),
        "Send did not complete; keeping sender for teardown"
      );
      self.pipe.retain_unreturned(sender);
    }
  }
}

struct BusyFlag<'a>(&'a AtomicBool);

impl<'a> BusyFlag<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| BusyFlag(flag))
  }
}

impl Drop for BusyFlag<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}
