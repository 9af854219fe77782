// src/socket/mock.rs

//! Scripted in-memory socket for unit tests.

use super::{SocketErrorCode, StreamSocket};

use std::collections::VecDeque;
use std::io::{self, IoSlice};
use std::net::Shutdown;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug)]
pub(crate) enum ReadStep {
  Data(Vec<u8>),
  Eof,
  Error(SocketErrorCode),
}

#[derive(Debug)]
pub(crate) enum WriteStep {
  /// Accept at most this many bytes.
  Accept(usize),
  Error(SocketErrorCode),
}

#[derive(Debug, Default)]
pub(crate) struct MockSocket {
  reads: Mutex<VecDeque<ReadStep>>,
  wait_errors: Mutex<VecDeque<SocketErrorCode>>,
  writes: Mutex<VecDeque<WriteStep>>,
  written: Mutex<Vec<u8>>,
  write_blocked: AtomicBool,
  shutdown_error: Mutex<Option<SocketErrorCode>>,
  is_shut_down: AtomicBool,
  notify: Notify,
  pub shutdown_calls: AtomicUsize,
  pub drops: Arc<AtomicUsize>,
}

impl MockSocket {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push_read(&self, step: ReadStep) {
    self.reads.lock().push_back(step);
    self.notify.notify_waiters();
  }

  pub fn push_wait_error(&self, code: SocketErrorCode) {
    self.wait_errors.lock().push_back(code);
    self.notify.notify_waiters();
  }

  pub fn push_write(&self, step: WriteStep) {
    self.writes.lock().push_back(step);
  }

  pub fn fail_shutdown_with(&self, code: SocketErrorCode) {
    *self.shutdown_error.lock() = Some(code);
  }

  /// Parks writers in `writable()` until `unblock_writes` is called.
  pub fn block_writes(&self) {
    self.write_blocked.store(true, Ordering::SeqCst);
  }

  pub fn unblock_writes(&self) {
    self.write_blocked.store(false, Ordering::SeqCst);
    self.notify.notify_waiters();
  }

  pub fn written(&self) -> Vec<u8> {
    self.written.lock().clone()
  }

  pub fn shutdown_count(&self) -> usize {
    self.shutdown_calls.load(Ordering::SeqCst)
  }

  fn is_shut_down(&self) -> bool {
    self.is_shut_down.load(Ordering::SeqCst)
  }

  fn io_error(code: SocketErrorCode) -> io::Error {
    match code {
      SocketErrorCode::Other(raw) if raw >= 0 => io::Error::from_raw_os_error(raw),
      #[cfg(unix)]
      SocketErrorCode::OperationAborted => io::Error::from_raw_os_error(libc::ECANCELED),
      _ => io::Error::new(code.io_kind(), code.to_string()),
    }
  }
}

#[async_trait]
impl StreamSocket for MockSocket {
  async fn readable(&self) -> io::Result<()> {
    loop {
      let notified = self.notify.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      if let Some(code) = self.wait_errors.lock().pop_front() {
        return Err(Self::io_error(code));
      }
      if self.is_shut_down() || !self.reads.lock().is_empty() {
        return Ok(());
      }
      notified.await;
    }
  }

  fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
    let mut reads = self.reads.lock();
    match reads.pop_front() {
      Some(ReadStep::Data(mut data)) => {
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        if n < data.len() {
          reads.push_front(ReadStep::Data(data.split_off(n)));
        }
        Ok(n)
      }
      Some(ReadStep::Eof) => {
        reads.push_front(ReadStep::Eof);
        Ok(0)
      }
      Some(ReadStep::Error(code)) => Err(Self::io_error(code)),
      None if self.is_shut_down() => Ok(0),
      None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
    }
  }

  async fn writable(&self) -> io::Result<()> {
    loop {
      let notified = self.notify.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      if self.is_shut_down() || !self.write_blocked.load(Ordering::SeqCst) {
        return Ok(());
      }
      notified.await;
    }
  }

  fn try_write_vectored(&self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
    if self.is_shut_down() {
      return Err(Self::io_error(SocketErrorCode::Shutdown));
    }
    if self.write_blocked.load(Ordering::SeqCst) {
      return Err(io::Error::from(io::ErrorKind::WouldBlock));
    }
    let total: usize = bufs.iter().map(|b| b.len()).sum();
    let limit = match self.writes.lock().pop_front() {
      Some(WriteStep::Accept(n)) => n.min(total),
      Some(WriteStep::Error(code)) => return Err(Self::io_error(code)),
      None => total,
    };
    let mut written = self.written.lock();
    let mut remaining = limit;
    for buf in bufs {
      if remaining == 0 {
        break;
      }
      let n = buf.len().min(remaining);
      written.extend_from_slice(&buf[..n]);
      remaining -= n;
    }
    Ok(limit)
  }

  fn shutdown(&self, _how: Shutdown) -> io::Result<()> {
    self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
    self.is_shut_down.store(true, Ordering::SeqCst);
    self.notify.notify_waiters();
    match *self.shutdown_error.lock() {
      Some(code) => Err(Self::io_error(code)),
      None => Ok(()),
    }
  }
}

impl Drop for MockSocket {
  fn drop(&mut self) {
    self.drops.fetch_add(1, Ordering::SeqCst);
  }
}
