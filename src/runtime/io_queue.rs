// src/runtime/io_queue.rs

use crate::error::ChannelError;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

static SHARED_IO_QUEUE: OnceCell<IoQueue> = OnceCell::new();

/// A dedicated FIFO dispatch queue for I/O completions.
///
/// Backed by one OS thread running a current-thread Tokio runtime, so every
/// future spawned here is polled (and every completion resumes) on that single
/// thread in submission order. Cloning is cheap; the thread stops when the last
/// clone is dropped.
#[derive(Clone)]
pub struct IoQueue {
  inner: Arc<IoQueueInner>,
}

struct IoQueueInner {
  name: String,
  handle: Handle,
  shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl IoQueue {
  pub fn new(name: impl Into<String>) -> Result<Self, ChannelError> {
    let name = name.into();
    let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .map_err(|e| ChannelError::Internal(format!("Failed to build I/O queue runtime: {}", e)))?;
    let handle = runtime.handle().clone();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let thread_name = name.clone();
    std::thread::Builder::new()
      .name(name.clone())
      .spawn(move || {
        tracing::debug!(io_queue = %thread_name, "I/O queue thread started");
        runtime.block_on(async {
          let _ = shutdown_rx.await;
        });
        tracing::debug!(io_queue = %thread_name, "I/O queue thread stopped");
      })
      .map_err(|e| ChannelError::Internal(format!("Failed to spawn I/O queue thread: {}", e)))?;

    Ok(Self {
      inner: Arc::new(IoQueueInner {
        name,
        handle,
        shutdown_tx: Mutex::new(Some(shutdown_tx)),
      }),
    })
  }

  /// The process-wide queue used by channels configured with `SchedulerKind::IoQueue`.
  pub fn shared() -> Result<IoQueue, ChannelError> {
    SHARED_IO_QUEUE
      .get_or_try_init(|| IoQueue::new("sockpipe-io-queue"))
      .cloned()
  }

  pub fn name(&self) -> &str {
    &self.inner.name
  }

  pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
  where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
  {
    self.inner.handle.spawn(fut)
  }
}

impl fmt::Debug for IoQueue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("IoQueue").field("name", &self.inner.name).finish()
  }
}

impl Drop for IoQueueInner {
  fn drop(&mut self) {
    if let Some(tx) = self.shutdown_tx.lock().take() {
      let _ = tx.send(());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn completions_run_on_the_queue_thread() {
    let queue = IoQueue::new("test-io-queue").expect("queue");
    let thread_name = queue
      .spawn(async { std::thread::current().name().map(str::to_owned) })
      .await
      .expect("join");
    assert_eq!(thread_name.as_deref(), Some("test-io-queue"));
  }

  #[tokio::test]
  async fn submissions_complete_in_order() {
    let queue = IoQueue::new("test-io-queue-fifo").expect("queue");
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for i in 0..16 {
      let order = order.clone();
      handles.push(queue.spawn(async move {
        order.lock().push(i);
      }));
    }
    for h in handles {
      h.await.expect("join");
    }
    assert_eq!(*order.lock(), (0..16).collect::<Vec<_>>());
  }

  #[test]
  fn shared_queue_is_a_singleton() {
    let a = IoQueue::shared().expect("shared");
    let b = IoQueue::shared().expect("shared");
    assert!(Arc::ptr_eq(&a.inner, &b.inner));
  }
}
