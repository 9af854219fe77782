// tests/common.rs
#![allow(dead_code)]

use sockpipe::ChannelError;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(200);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(5);

static TRACING_INIT: Once = Once::new();

/// Installs a test-writer subscriber once per test binary. `RUST_LOG` overrides the filter.
pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    let default_filter = "sockpipe=debug,warn";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer()
      .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

pub fn loopback() -> SocketAddr {
  "127.0.0.1:0".parse().expect("loopback addr")
}

/// A connected client/server pair over loopback TCP.
pub async fn tcp_pair() -> (TcpStream, TcpStream) {
  let listener = TcpListener::bind(loopback()).await.expect("bind");
  let addr = listener.local_addr().expect("local addr");
  let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
  let client = client.expect("connect");
  let (server, _) = accepted.expect("accept");
  (client, server)
}

/// Awaits `fut`, failing the test if it does not finish within `duration`.
pub async fn within<F: Future>(duration: Duration, fut: F) -> F::Output {
  timeout(duration, fut).await.expect("operation timed out")
}

pub async fn within_or_timeout<T, F>(duration: Duration, fut: F) -> Result<T, ChannelError>
where
  F: Future<Output = Result<T, ChannelError>>,
{
  match timeout(duration, fut).await {
    Ok(result) => result,
    Err(_) => Err(ChannelError::Timeout),
  }
}
