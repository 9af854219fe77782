// src/client/connector.rs

use crate::channel::TcpTransportConfig;
use crate::socket::StreamSocket;
use crate::transport::tcp::apply_tcp_socket_options;

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

/// Establishes the connected socket an [`EasyClient`](super::EasyClient) wraps.
///
/// `Ok(None)` reports a connector that claimed success without producing a
/// socket; the client treats it as a fatal configuration fault.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
  type Socket: StreamSocket;

  async fn connect(&self, addr: SocketAddr) -> io::Result<Option<Self::Socket>>;
}

/// Plain TCP connector. Applies the configured TCP options to the new stream.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
  config: TcpTransportConfig,
}

impl TcpConnector {
  pub fn new(config: TcpTransportConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &TcpTransportConfig {
    &self.config
  }
}

#[async_trait]
impl Connector for TcpConnector {
  type Socket = TcpStream;

  async fn connect(&self, addr: SocketAddr) -> io::Result<Option<TcpStream>> {
    let stream = TcpStream::connect(addr).await?;
    apply_tcp_socket_options(&stream, &self.config)?;
    debug!(peer = %addr, local = ?stream.local_addr().ok(), "TCP connection established");
    Ok(Some(stream))
  }
}
