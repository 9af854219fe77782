// benches/sender_pool.rs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sockpipe::{CompletionScheduler, SocketSenderPool};
use std::sync::Arc;
use std::thread;

const RENTS_PER_THREAD: usize = 10_000;

fn rent_return_single_thread(c: &mut Criterion) {
  let pool = SocketSenderPool::new(CompletionScheduler::Inline);
  c.bench_function("sender_pool/rent_return", |b| {
    b.iter(|| {
      let sender = pool.rent();
      pool.return_sender(black_box(sender));
    })
  });
  pool.dispose();
}

fn rent_return_contended(c: &mut Criterion) {
  let mut group = c.benchmark_group("sender_pool/contended");
  for threads in [2usize, 4, 8] {
    group.throughput(Throughput::Elements((threads * RENTS_PER_THREAD) as u64));
    group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
      b.iter(|| {
        let pool = Arc::new(SocketSenderPool::new(CompletionScheduler::Inline));
        let workers: Vec<_> = (0..threads)
          .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || {
              for _ in 0..RENTS_PER_THREAD {
                let sender = pool.rent();
                pool.return_sender(black_box(sender));
              }
            })
          })
          .collect();
        for worker in workers {
          let _ = worker.join();
        }
        pool.dispose();
      })
    });
  }
  group.finish();
}

criterion_group!(benches, rent_return_single_thread, rent_return_contended);
criterion_main!(benches);
