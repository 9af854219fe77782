// src/transport/tcp.rs

use super::{ChannelCreator, ChannelCreatorFactory};
use crate::channel::{ChannelOptions, PipeChannel, SocketPipe, TcpTransportConfig};
use crate::error::ChannelError;
use crate::io::SocketSenderPool;
use crate::runtime::CompletionScheduler;

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;

/// A started channel over an accepted TCP stream.
pub type TcpChannel<D> = PipeChannel<SocketPipe<TcpStream>, D>;

type DecoderFactory<D> = Arc<dyn Fn() -> D + Send + Sync>;
type SessionHandler<D> = Arc<dyn Fn(TcpChannel<D>) + Send + Sync>;

pub const DEFAULT_LISTEN_BACKLOG: i32 = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenOptions {
  pub addr: SocketAddr,
  pub backlog: i32,
  /// Live channels allowed at once. Accepting pauses while the limit is reached.
  pub max_connections: Option<usize>,
}

impl ListenOptions {
  pub fn new(addr: SocketAddr) -> Self {
    Self {
      addr,
      backlog: DEFAULT_LISTEN_BACKLOG,
      max_connections: None,
    }
  }

  pub fn with_backlog(mut self, backlog: i32) -> Self {
    self.backlog = backlog;
    self
  }

  pub fn with_max_connections(mut self, max: usize) -> Self {
    self.max_connections = Some(max.max(1));
    self
  }
}

/// Creates TCP listeners whose accepted sockets become [`TcpChannel`]s.
///
/// Every channel created through this factory rents senders from one
/// factory-owned pool. The pool is disposed when the factory is disposed or
/// dropped, never by the channels.
pub struct TcpChannelCreatorFactory<D: Decoder> {
  channel_options: ChannelOptions,
  sender_pool: Arc<SocketSenderPool>,
  new_decoder: DecoderFactory<D>,
  handler: SessionHandler<D>,
}

impl<D> TcpChannelCreatorFactory<D>
where
  D: Decoder + Send + 'static,
  D::Item: Send + 'static,
  D::Error: std::error::Error + Send + Sync + 'static,
{
  /// `new_decoder` builds a fresh decoder per connection; `handler` receives each started channel.
  pub fn new<F, H>(channel_options: ChannelOptions, new_decoder: F, handler: H) -> Result<Self, ChannelError>
  where
    F: Fn() -> D + Send + Sync + 'static,
    H: Fn(TcpChannel<D>) + Send + Sync + 'static,
  {
    let scheduler = CompletionScheduler::for_kind(channel_options.scheduler)?;
    let sender_pool = Arc::new(SocketSenderPool::new(scheduler));
    let channel_options = channel_options.with_sender_pool(sender_pool.clone());
    Ok(Self {
      channel_options,
      sender_pool,
      new_decoder: Arc::new(new_decoder),
      handler: Arc::new(handler),
    })
  }

  pub fn sender_pool(&self) -> &Arc<SocketSenderPool> {
    &self.sender_pool
  }

  pub fn dispose(&self) {
    self.sender_pool.dispose();
  }
}

impl<D: Decoder> Drop for TcpChannelCreatorFactory<D> {
  fn drop(&mut self) {
    self.sender_pool.dispose();
  }
}

#[async_trait]
impl<D> ChannelCreatorFactory for TcpChannelCreatorFactory<D>
where
  D: Decoder + Send + 'static,
  D::Item: Send + 'static,
  D::Error: std::error::Error + Send + Sync + 'static,
{
  type Creator = TcpChannelCreator;

  async fn create_channel_creator(&self, listen: ListenOptions) -> Result<TcpChannelCreator, ChannelError> {
    if self.sender_pool.is_disposed() {
      return Err(ChannelError::InvalidState("channel creator factory was disposed"));
    }
    let endpoint = listen.addr.to_string();
    let std_listener = bind_listener(&listen).map_err(|e| ChannelError::from_io_endpoint(e, &endpoint))?;
    let listener = TokioTcpListener::from_std(std_listener)?;
    let local_addr = listener.local_addr()?;
    tracing::info!(?local_addr, backlog = listen.backlog, max_connections = ?listen.max_connections, "TCP listener bound");

    let cancel = CancellationToken::new();
    let running = Arc::new(AtomicBool::new(true));
    let accept = AcceptLoop {
      listener,
      local_addr,
      channel_options: self.channel_options.clone(),
      new_decoder: self.new_decoder.clone(),
      handler: self.handler.clone(),
      limiter: listen.max_connections.map(|n| Arc::new(Semaphore::new(n))),
      cancel: cancel.clone(),
      running: running.clone(),
    };
    let task = tokio::spawn(accept.run());

    Ok(TcpChannelCreator {
      local_addr,
      cancel,
      running,
      task: Mutex::new(Some(task)),
    })
  }
}

/// A bound listener with its accept loop.
#[derive(Debug)]
pub struct TcpChannelCreator {
  local_addr: SocketAddr,
  cancel: CancellationToken,
  running: Arc<AtomicBool>,
  task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl ChannelCreator for TcpChannelCreator {
  fn local_addr(&self) -> SocketAddr {
    self.local_addr
  }

  fn is_running(&self) -> bool {
    self.running.load(Ordering::Acquire)
  }

  async fn stop(&self) {
    self.cancel.cancel();
    let task = self.task.lock().take();
    if let Some(task) = task {
      if let Err(e) = task.await {
        tracing::error!(local_addr = %self.local_addr, error = %e, "Accept loop task failed");
      }
    }
  }
}

impl Drop for TcpChannelCreator {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

struct AcceptLoop<D: Decoder> {
  listener: TokioTcpListener,
  local_addr: SocketAddr,
  channel_options: ChannelOptions,
  new_decoder: DecoderFactory<D>,
  handler: SessionHandler<D>,
  limiter: Option<Arc<Semaphore>>,
  cancel: CancellationToken,
  running: Arc<AtomicBool>,
}

impl<D> AcceptLoop<D>
where
  D: Decoder + Send + 'static,
  D::Item: Send + 'static,
  D::Error: std::error::Error + Send + Sync + 'static,
{
  async fn run(self) {
    let local_addr = self.local_addr;
    tracing::debug!(%local_addr, "TCP accept loop started");

    loop {
      let permit = match &self.limiter {
        Some(limiter) => tokio::select! {
          biased;
          _ = self.cancel.cancelled() => break,
          permit = limiter.clone().acquire_owned() => match permit {
            Ok(permit) => Some(permit),
            Err(_) => break,
          },
        },
        None => None,
      };

      let accepted = tokio::select! {
        biased;
        _ = self.cancel.cancelled() => break,
        accepted = self.listener.accept() => accepted,
      };

      match accepted {
        Ok((tcp_stream, peer_addr)) => {
          tracing::info!(%local_addr, peer = %peer_addr, "Accepted new TCP connection");
          if let Err(e) = apply_tcp_socket_options(&tcp_stream, &self.channel_options.tcp) {
            tracing::error!(peer = %peer_addr, error = %e, "Failed to apply TCP options. Dropping.");
            continue;
          }
          let pipe = match SocketPipe::new(tcp_stream, &self.channel_options) {
            Ok(pipe) => pipe,
            Err(e) => {
              tracing::error!(peer = %peer_addr, error = %e, "Failed to create socket pipe. Dropping.");
              continue;
            }
          };
          let channel = PipeChannel::start(pipe, (self.new_decoder)(), &self.channel_options);
          if let Some(permit) = permit {
            let mut closed = channel.close_signal();
            tokio::spawn(async move {
              let _permit = permit;
              let _ = closed.wait_for(|reason| reason.is_some()).await;
            });
          }
          (self.handler)(channel);
        }
        Err(e) => {
          tracing::error!(%local_addr, error = %e, "Error accepting TCP connection");
          if is_fatal_accept_error(&e) {
            tracing::error!(%local_addr, error = %e, "Fatal error in TCP accept loop, stopping.");
            break;
          }
          sleep(Duration::from_millis(100)).await;
        }
      }
    }

    self.running.store(false, Ordering::Release);
    tracing::debug!(%local_addr, "TCP accept loop finished");
  }
}

fn bind_listener(listen: &ListenOptions) -> io::Result<std::net::TcpListener> {
  let socket = Socket::new(Domain::for_address(listen.addr), Type::STREAM, Some(Protocol::TCP))?;
  socket.set_reuse_address(true)?;
  socket.bind(&listen.addr.into())?;
  socket.listen(listen.backlog)?;
  socket.set_nonblocking(true)?;
  Ok(socket.into())
}

/// Applies nodelay and keepalive settings to a connected stream.
pub fn apply_tcp_socket_options(stream: &TcpStream, config: &TcpTransportConfig) -> io::Result<()> {
  let socket_ref = SockRef::from(stream);
  socket_ref.set_nodelay(config.tcp_nodelay)?;
  tracing::trace!(nodelay = config.tcp_nodelay, "Applied TCP_NODELAY");

  if config.keepalive_enabled() {
    let mut keepalive = TcpKeepalive::new();
    if let Some(time) = config.keepalive_time {
      keepalive = keepalive.with_time(time);
    }
    #[cfg(any(unix, target_os = "windows"))]
    if let Some(interval) = config.keepalive_interval {
      keepalive = keepalive.with_interval(interval);
    }
    #[cfg(not(any(unix, target_os = "windows")))]
    if config.keepalive_interval.is_some() {
      tracing::warn!("TCP Keepalive Interval not supported on this platform.");
    }
    #[cfg(unix)]
    if let Some(count) = config.keepalive_count {
      keepalive = keepalive.with_retries(count);
    }
    #[cfg(not(unix))]
    if config.keepalive_count.is_some() {
      tracing::warn!("TCP Keepalive Count not supported on this platform.");
    }
    socket_ref.set_tcp_keepalive(&keepalive)?;
    tracing::debug!(?keepalive, "Applied TCP Keepalive settings");
  }
  Ok(())
}

fn is_fatal_accept_error(e: &io::Error) -> bool {
  matches!(e.kind(), io::ErrorKind::InvalidInput | io::ErrorKind::BrokenPipe)
}
