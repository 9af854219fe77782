// src/channel/options.rs

use crate::io::SocketSenderPool;
use crate::runtime::SchedulerKind;
use crate::socket::PlatformFamily;

use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 4 * 1024;
pub const DEFAULT_MAX_PACKAGE_LENGTH: usize = 1024 * 1024;
pub const DEFAULT_PACKAGE_QUEUE_CAPACITY: usize = 128;

/// TCP socket tuning applied to connected and accepted streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TcpTransportConfig {
  pub tcp_nodelay: bool,
  pub keepalive_time: Option<Duration>,
  pub keepalive_interval: Option<Duration>,
  pub keepalive_count: Option<u32>,
}

impl TcpTransportConfig {
  pub(crate) fn keepalive_enabled(&self) -> bool {
    self.keepalive_time.is_some() || self.keepalive_interval.is_some() || self.keepalive_count.is_some()
  }
}

/// Per-channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
  /// Spare capacity reserved before every fill.
  pub receive_buffer_size: usize,
  /// Undecoded bytes allowed to accumulate before the stream is rejected.
  pub max_package_length: usize,
  /// Decoded packages buffered ahead of the application. Bounds read-ahead.
  pub package_queue_capacity: usize,
  pub scheduler: SchedulerKind,
  /// Pool to rent senders from. `None` gives the channel a private pool that
  /// is disposed with it; a shared pool is left for its owner to dispose.
  /// A shared pool must use the same `scheduler` kind as the channel.
  pub sender_pool: Option<Arc<SocketSenderPool>>,
  /// Platform family used for teardown error classification.
  pub platform: PlatformFamily,
  pub tcp: TcpTransportConfig,
}

impl Default for ChannelOptions {
  fn default() -> Self {
    Self {
      receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
      max_package_length: DEFAULT_MAX_PACKAGE_LENGTH,
      package_queue_capacity: DEFAULT_PACKAGE_QUEUE_CAPACITY,
      scheduler: SchedulerKind::default(),
      sender_pool: None,
      platform: PlatformFamily::host(),
      tcp: TcpTransportConfig {
        tcp_nodelay: true,
        ..TcpTransportConfig::default()
      },
    }
  }
}

impl ChannelOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_receive_buffer_size(mut self, size: usize) -> Self {
    self.receive_buffer_size = size.max(1);
    self
  }

  pub fn with_max_package_length(mut self, len: usize) -> Self {
    self.max_package_length = len;
    self
  }

  pub fn with_package_queue_capacity(mut self, capacity: usize) -> Self {
    self.package_queue_capacity = capacity.max(1);
    self
  }

  pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
    self.scheduler = scheduler;
    self
  }

  pub fn with_sender_pool(mut self, pool: Arc<SocketSenderPool>) -> Self {
    self.sender_pool = Some(pool);
    self
  }

  pub fn with_platform(mut self, platform: PlatformFamily) -> Self {
    self.platform = platform;
    self
  }

  pub fn with_tcp(mut self, tcp: TcpTransportConfig) -> Self {
    self.tcp = tcp;
    self
  }
}
