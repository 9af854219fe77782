// src/io/sender_pool.rs

use super::sender::{SenderCounters, SocketSender};
use crate::error::ChannelError;
use crate::runtime::{CompletionScheduler, SchedulerKind};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Senders beyond this many idle instances are disposed on return.
pub const DEFAULT_MAX_POOLED_SENDERS: usize = 1024;

static SHARED_POOLS: Lazy<Mutex<HashMap<SchedulerKind, Arc<SocketSenderPool>>>> =
  Lazy::new(|| Mutex::new(HashMap::new()));

/// Point-in-time view of a pool's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderPoolStats {
  pub created: usize,
  pub rented: usize,
  pub returned: usize,
  pub disposed: usize,
  /// Senders dropped without `dispose`. Always zero unless something leaked.
  pub leaked: usize,
  pub idle: usize,
}

/// Pool of reusable senders for one completion-scheduler kind.
///
/// Safe for concurrent `rent`/`return_sender` from any number of channels.
/// Neither operation touches a socket or blocks on I/O.
#[derive(Debug)]
pub struct SocketSenderPool {
  scheduler: CompletionScheduler,
  idle: Mutex<Vec<SocketSender>>,
  max_idle: usize,
  next_id: AtomicUsize,
  disposed: AtomicBool,
  counters: Arc<SenderCounters>,
}

impl SocketSenderPool {
  pub fn new(scheduler: CompletionScheduler) -> Self {
    Self::with_max_idle(scheduler, DEFAULT_MAX_POOLED_SENDERS)
  }

  pub fn with_max_idle(scheduler: CompletionScheduler, max_idle: usize) -> Self {
    Self {
      scheduler,
      idle: Mutex::new(Vec::new()),
      max_idle,
      next_id: AtomicUsize::new(1),
      disposed: AtomicBool::new(false),
      counters: Arc::new(SenderCounters::default()),
    }
  }

  /// Returns the process-wide pool for `kind`, creating it on first use.
  /// A shared pool that was disposed is replaced by a fresh one.
  pub fn shared(kind: SchedulerKind) -> Result<Arc<SocketSenderPool>, ChannelError> {
    let mut pools = SHARED_POOLS.lock();
    if let Some(pool) = pools.get(&kind) {
      if !pool.is_disposed() {
        return Ok(pool.clone());
      }
    }
    let pool = Arc::new(SocketSenderPool::new(CompletionScheduler::for_kind(kind)?));
    pools.insert(kind, pool.clone());
    Ok(pool)
  }

  pub fn scheduler(&self) -> &CompletionScheduler {
    &self.scheduler
  }

  /// Hands out an idle sender, or a new one when none is idle. Never blocks on I/O.
  pub fn rent(&self) -> SocketSender {
    self.counters.rented.fetch_add(1, Ordering::Relaxed);
    if let Some(sender) = self.idle.lock().pop() {
      trace!(sender_id = sender.id(), "Rented pooled sender");
      return sender;
    }
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    trace!(sender_id = id, "Pool empty, created sender");
    SocketSender::new(id, self.scheduler.clone(), self.counters.clone())
  }

  /// Makes `sender` available again. Call only after a successful send.
  pub fn return_sender(&self, mut sender: SocketSender) {
    self.counters.returned.fetch_add(1, Ordering::Relaxed);
    sender.reset();
    if self.is_disposed() {
      sender.dispose();
      return;
    }
    let mut idle = self.idle.lock();
    if idle.len() >= self.max_idle {
      drop(idle);
      sender.dispose();
      return;
    }
    idle.push(sender);
  }

  /// Disposes every idle sender. Senders returned afterwards are disposed immediately.
  pub fn dispose(&self) {
    if self.disposed.swap(true, Ordering::AcqRel) {
      return;
    }
    let drained = std::mem::take(&mut *self.idle.lock());
    let count = drained.len();
    for sender in drained {
      sender.dispose();
    }
    debug!(scheduler = ?self.scheduler.kind(), disposed_senders = count, "Sender pool disposed");
  }

  pub fn is_disposed(&self) -> bool {
    self.disposed.load(Ordering::Acquire)
  }

  pub fn stats(&self) -> SenderPoolStats {
    SenderPoolStats {
      created: self.counters.created.load(Ordering::Relaxed),
      rented: self.counters.rented.load(Ordering::Relaxed),
      returned: self.counters.returned.load(Ordering::Relaxed),
      disposed: self.counters.disposed.load(Ordering::Relaxed),
      leaked: self.counters.leaked.load(Ordering::Relaxed),
      idle: self.idle.lock().len(),
    }
  }
}

impl Drop for SocketSenderPool {
  fn drop(&mut self) {
    self.dispose();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn returned_senders_are_reused() {
    let pool = SocketSenderPool::new(CompletionScheduler::Inline);
    let a = pool.rent();
    let id = a.id();
    pool.return_sender(a);
    let b = pool.rent();
    assert_eq!(b.id(), id);
    assert!(b.is_clean());
    pool.return_sender(b);

    let stats = pool.stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.rented, 2);
    assert_eq!(stats.idle, 1);
  }

  #[test]
  fn dispose_releases_idle_and_later_returns() {
    let pool = SocketSenderPool::new(CompletionScheduler::Inline);
    let a = pool.rent();
    let b = pool.rent();
    pool.return_sender(a);
    pool.dispose();
    pool.dispose();
    assert_eq!(pool.stats().disposed, 1);

    pool.return_sender(b);
    let stats = pool.stats();
    assert_eq!(stats.disposed, 2);
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.leaked, 0);
  }

  #[test]
  fn overflow_beyond_max_idle_is_disposed() {
    let pool = SocketSenderPool::with_max_idle(CompletionScheduler::Inline, 1);
    let a = pool.rent();
    let b = pool.rent();
    pool.return_sender(a);
    pool.return_sender(b);
    let stats = pool.stats();
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.disposed, 1);
  }

  #[test]
  fn shared_pool_is_keyed_by_scheduler_kind() {
    let a = SocketSenderPool::shared(SchedulerKind::Inline).expect("pool");
    let b = SocketSenderPool::shared(SchedulerKind::Inline).expect("pool");
    let c = SocketSenderPool::shared(SchedulerKind::ThreadPool).expect("pool");
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(c.scheduler().kind(), SchedulerKind::ThreadPool);
  }

  #[test]
  fn concurrent_renters_never_share_a_sender() {
    let pool = Arc::new(SocketSenderPool::new(CompletionScheduler::Inline));
    let checked_out = Arc::new(Mutex::new(HashSet::new()));
    let mut threads = Vec::new();
    for _ in 0..8 {
      let pool = pool.clone();
      let checked_out = checked_out.clone();
      threads.push(std::thread::spawn(move || {
        for _ in 0..500 {
          let sender = pool.rent();
          assert!(checked_out.lock().insert(sender.id()), "sender handed out twice");
          std::thread::yield_now();
          assert!(checked_out.lock().remove(&sender.id()));
          pool.return_sender(sender);
        }
      }));
    }
    for t in threads {
      t.join().expect("renter thread");
    }
    let stats = pool.stats();
    assert_eq!(stats.rented, 8 * 500);
    assert_eq!(stats.returned, 8 * 500);
    assert!(stats.created <= 8);
  }
}
