use crate::{Error, Result};
use std::ops::Range;

/// Identity of one worker in a fixed-size distributed computation: its
/// rank and the agreed total worker count. Always passed explicitly so
/// the same code path runs under a simulated in-process topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub rank: usize,
    pub workers: usize,
}

impl Topology {
    pub fn new(rank: usize, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::UnknownBackend(
                "topology requires at least one worker".into(),
            ));
        }
        if rank >= workers {
            return Err(Error::UnknownBackend(format!(
                "rank {rank} out of range for {workers} workers"
            )));
        }
        Ok(Self { rank, workers })
    }

    /// This worker's contiguous share of `0..total`, partitioned so that
    /// the first `total % workers` ranks take one extra item.
    pub fn share(&self, total: usize) -> Range<usize> {
        partition(total, self.workers)
            .nth(self.rank)
            .unwrap_or(total..total)
    }
}

/// Static block partition of `0..total` into `workers` contiguous ranges.
/// Ranges are emitted in rank order; some may be empty when
/// `total < workers`.
pub fn partition(total: usize, workers: usize) -> impl Iterator<Item = Range<usize>> {
    let base = total / workers.max(1);
    let extra = total % workers.max(1);
    (0..workers).scan(0usize, move |start, rank| {
        let len = base + usize::from(rank < extra);
        let range = *start..*start + len;
        *start += len;
        Some(range)
    })
}

/// Run `workers` simulated worker processes, one OS thread each, and
/// gather their results in rank order. Any worker error or panic fails
/// the whole stage; partial results are discarded.
pub fn run_workers<T, F>(workers: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(Topology) -> Result<T> + Sync,
{
    if workers == 0 {
        return Err(Error::UnknownBackend(
            "topology requires at least one worker".into(),
        ));
    }
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|rank| {
                let f = &f;
                scope.spawn(move || f(Topology { rank, workers }))
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| {
                handle
                    .join()
                    .map_err(|_| Error::WorkerFailed(format!("worker {rank} panicked")))?
            })
            .collect()
    })
}

/// Build a fixed-size local rayon pool for the shared-memory strategy.
/// Pool size is part of the immutable configuration, never ambient
/// process state.
pub fn build_pool(threads: usize) -> Result<rayon::ThreadPool> {
    if threads == 0 {
        return Err(Error::UnknownBackend(
            "shared-memory topology requires at least one thread".into(),
        ));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::backend_unavailable(e.to_string()))
}
