// src/client/mod.rs

//! A single-connection client over a socket pipe channel.

pub mod connector;

pub use connector::{Connector, TcpConnector};

use crate::channel::{ChannelOptions, ChannelState, CloseReason, PipeChannel, SocketPipe};
use crate::error::ChannelError;

use std::fmt;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientOptions {
  pub channel: ChannelOptions,
  /// `None` waits as long as the connector does.
  pub connect_timeout: Option<Duration>,
}

impl Default for ClientOptions {
  fn default() -> Self {
    Self {
      channel: ChannelOptions::default(),
      connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
    }
  }
}

impl ClientOptions {
  pub fn with_channel(mut self, channel: ChannelOptions) -> Self {
    self.channel = channel;
    self
  }

  pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.connect_timeout = timeout;
    self
  }
}

/// Connects once, then exchanges packages: inbound decoded with `D`, outbound
/// encoded with `E` from `P`.
pub struct EasyClient<D, E, P, C = TcpConnector>
where
  D: Decoder,
  C: Connector,
{
  connector: C,
  options: ClientOptions,
  decoder: Option<D>,
  encoder: AsyncMutex<E>,
  channel: Option<PipeChannel<SocketPipe<C::Socket>, D>>,
  _package: PhantomData<fn(P)>,
}

impl<D, E, P> EasyClient<D, E, P, TcpConnector>
where
  D: Decoder + Send + 'static,
  D::Item: Send + 'static,
  D::Error: std::error::Error + Send + Sync + 'static,
  E: Encoder<P> + Send,
  E::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(decoder: D, encoder: E) -> Self {
    Self::with_options(decoder, encoder, ClientOptions::default())
  }

  pub fn with_options(decoder: D, encoder: E, options: ClientOptions) -> Self {
    let connector = TcpConnector::new(options.channel.tcp.clone());
    Self::with_connector(decoder, encoder, connector, options)
  }
}

impl<D, E, P, C> EasyClient<D, E, P, C>
where
  D: Decoder + Send + 'static,
  D::Item: Send + 'static,
  D::Error: std::error::Error + Send + Sync + 'static,
  E: Encoder<P> + Send,
  E::Error: std::error::Error + Send + Sync + 'static,
  C: Connector,
{
  pub fn with_connector(decoder: D, encoder: E, connector: C, options: ClientOptions) -> Self {
    Self {
      connector,
      options,
      decoder: Some(decoder),
      encoder: AsyncMutex::new(encoder),
      channel: None,
      _package: PhantomData,
    }
  }

  /// Connects to `addr` and starts the channel.
  ///
  /// Fails with `Cancelled` if `cancel` fires before the channel is set up,
  /// `Connect`/`Timeout` if the connector fails, and `NullSocket` if the
  /// connector reports success without a socket.
  pub async fn connect(&mut self, addr: SocketAddr, cancel: &CancellationToken) -> Result<(), ChannelError> {
    if self.channel.is_some() || self.decoder.is_none() {
      return Err(ChannelError::InvalidState("client was already connected"));
    }
    let endpoint = addr.to_string();
    if cancel.is_cancelled() {
      warn!(peer = %endpoint, "The connection was cancelled before it started");
      return Err(ChannelError::Cancelled(endpoint));
    }

    let attempt = async {
      match self.options.connect_timeout {
        Some(limit) => match tokio::time::timeout(limit, self.connector.connect(addr)).await {
          Ok(result) => result.map_err(|e| ChannelError::from_io_endpoint(e, &endpoint)),
          Err(_) => Err(ChannelError::Timeout),
        },
        None => self
          .connector
          .connect(addr)
          .await
          .map_err(|e| ChannelError::from_io_endpoint(e, &endpoint)),
      }
    };

    let connected = tokio::select! {
      biased;
      _ = cancel.cancelled() => None,
      result = attempt => Some(result),
    };

    let socket = match connected {
      None => {
        warn!(peer = %endpoint, "The connection was cancelled");
        return Err(ChannelError::Cancelled(endpoint));
      }
      Some(Err(e)) => {
        error!(peer = %endpoint, error = %e, "Failed to connect");
        return Err(e);
      }
      Some(Ok(None)) => {
        error!(peer = %endpoint, "Connector returned no socket");
        return Err(ChannelError::NullSocket);
      }
      Some(Ok(Some(socket))) => socket,
    };
    if cancel.is_cancelled() {
      warn!(peer = %endpoint, "The connection was cancelled after it was established");
      return Err(ChannelError::Cancelled(endpoint));
    }

    let decoder = self
      .decoder
      .take()
      .ok_or(ChannelError::InvalidState("client was already connected"))?;
    let pipe = SocketPipe::new(socket, &self.options.channel)?;
    let channel = PipeChannel::start(pipe, decoder, &self.options.channel);
    info!(channel_id = channel.channel_id(), peer = %endpoint, "Client connected");
    self.channel = Some(channel);
    Ok(())
  }

  /// Encodes `package` with the client's encoder and sends it.
  pub async fn send(&self, package: P) -> Result<(), ChannelError> {
    let channel = self.channel()?;
    let mut encoder = self.encoder.lock().await;
    channel.send_with(&mut *encoder, package).await
  }

  /// Next decoded package; `None` once the connection has ended (or before it started).
  pub async fn receive(&self) -> Option<D::Item> {
    match &self.channel {
      Some(channel) => channel.receive().await,
      None => None,
    }
  }

  /// Closes the connection and waits for teardown.
  pub async fn close(&self) -> Option<CloseReason> {
    match &self.channel {
      Some(channel) => Some(channel.close().await),
      None => None,
    }
  }

  pub async fn closed(&self) -> Option<CloseReason> {
    match &self.channel {
      Some(channel) => Some(channel.closed().await),
      None => None,
    }
  }

  pub fn is_connected(&self) -> bool {
    matches!(&self.channel, Some(channel) if channel.state() == ChannelState::Open)
  }

  pub fn local_addr(&self) -> Option<SocketAddr> {
    self.channel.as_ref().and_then(|c| c.local_addr())
  }

  pub fn remote_addr(&self) -> Option<SocketAddr> {
    self.channel.as_ref().and_then(|c| c.remote_addr())
  }

  pub fn channel(&self) -> Result<&PipeChannel<SocketPipe<C::Socket>, D>, ChannelError> {
    self
      .channel
      .as_ref()
      .ok_or(ChannelError::InvalidState("client is not connected"))
  }
}

impl<D, E, P, C> fmt::Debug for EasyClient<D, E, P, C>
where
  D: Decoder,
  C: Connector,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EasyClient")
      .field("connected", &self.channel.is_some())
      .field("connect_timeout", &self.options.connect_timeout)
      .finish_non_exhaustive()
  }
}
