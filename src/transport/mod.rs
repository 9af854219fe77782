// src/transport/mod.rs

//! Host integration: listeners that turn accepted sockets into running channels.

pub mod tcp;

pub use tcp::{apply_tcp_socket_options, ListenOptions, TcpChannel, TcpChannelCreator, TcpChannelCreatorFactory};

use crate::error::ChannelError;

use std::net::SocketAddr;

use async_trait::async_trait;

/// A running acceptor created by a [`ChannelCreatorFactory`].
#[async_trait]
pub trait ChannelCreator: Send + Sync {
  fn local_addr(&self) -> SocketAddr;

  fn is_running(&self) -> bool;

  /// Stops accepting. Channels already handed out keep running.
  async fn stop(&self);
}

/// What a server host plugs in to get channels for its listeners.
#[async_trait]
pub trait ChannelCreatorFactory: Send + Sync {
  type Creator: ChannelCreator;

  async fn create_channel_creator(&self, listen: ListenOptions) -> Result<Self::Creator, ChannelError>;
}
