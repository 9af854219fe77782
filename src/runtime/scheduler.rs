// src/runtime/scheduler.rs

use super::IoQueue;
use crate::error::{ChannelError, SocketError, SocketResult};
use crate::socket::SocketErrorCode;

use std::future::Future;
use std::io;
use tokio::task::JoinError;

/// Where I/O completions resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SchedulerKind {
  /// Resume on the task that awaited the operation.
  Inline,
  /// Resume on a runtime worker task.
  #[default]
  ThreadPool,
  /// Resume serialized through the shared dedicated I/O queue.
  IoQueue,
}

/// Executes socket operations under the configured completion context.
///
/// Only the execution context changes between variants; the outcome of an
/// operation never does.
#[derive(Debug, Clone)]
pub enum CompletionScheduler {
  Inline,
  ThreadPool,
  IoQueue(IoQueue),
}

impl CompletionScheduler {
  pub fn for_kind(kind: SchedulerKind) -> Result<Self, ChannelError> {
    Ok(match kind {
      SchedulerKind::Inline => CompletionScheduler::Inline,
      SchedulerKind::ThreadPool => CompletionScheduler::ThreadPool,
      SchedulerKind::IoQueue => CompletionScheduler::IoQueue(IoQueue::shared()?),
    })
  }

  pub fn kind(&self) -> SchedulerKind {
    match self {
      CompletionScheduler::Inline => SchedulerKind::Inline,
      CompletionScheduler::ThreadPool => SchedulerKind::ThreadPool,
      CompletionScheduler::IoQueue(_) => SchedulerKind::IoQueue,
    }
  }

  /// Runs `fut` to completion on this scheduler.
  ///
  /// For the spawning variants, dropping the returned future does not stop the
  /// spawned operation; it completes once the socket is shut down. A task that
  /// never completes (runtime shutdown, panic) is reported as a socket error.
  pub async fn run<F, T>(&self, fut: F) -> SocketResult<T>
  where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
  {
    match self {
      CompletionScheduler::Inline => Ok(fut.await),
      CompletionScheduler::ThreadPool => tokio::spawn(fut).await.map_err(map_join_error),
      CompletionScheduler::IoQueue(queue) => queue.spawn(fut).await.map_err(map_join_error),
    }
  }
}

fn map_join_error(e: JoinError) -> SocketError {
  if e.is_cancelled() {
    // The hosting runtime is shutting down.
    SocketError::new(
      SocketErrorCode::OperationAborted,
      io::Error::new(io::ErrorKind::Other, "I/O task cancelled"),
    )
  } else {
    SocketError::new(
      SocketErrorCode::Other(-1),
      io::Error::new(io::ErrorKind::Other, format!("I/O task panicked: {}", e)),
    )
  }
}
