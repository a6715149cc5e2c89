//! Cross-worker summation of the density buffer.
//!
//! After every worker has spread its own particle subset, each needs the
//! complete simulated density before scoring. The contract is a blocking
//! collective: every participating worker calls [`ParallelContext::sum_fields`]
//! exactly once per evaluation. Uneven call counts across workers hang or
//! corrupt the sum; that is a programming error, not a recoverable state.

use std::sync::{Arc, Barrier, Mutex};

/// Worker-group capability the restraint uses to reduce its density buffer.
/// A distributed host implements this over its own communicator.
pub trait ParallelContext {
    /// Number of workers holding a slice of the restrained particle set.
    fn num_workers(&self) -> usize;

    /// Element-wise sum of `field` across all workers; on return every
    /// worker holds the identical complete field. Blocks until the whole
    /// group has contributed.
    fn sum_fields(&self, field: &mut [f32]);
}

/// The no-reduction context for a host running on a single worker.
pub struct SingleWorker;

impl ParallelContext for SingleWorker {
    fn num_workers(&self) -> usize {
        1
    }

    fn sum_fields(&self, _field: &mut [f32]) {}
}

/// Shared-memory all-sum over a fixed group of OS threads. Every worker
/// thread holds one clone of the group handle.
#[derive(Clone)]
pub struct ThreadGroup {
    shared: Arc<ThreadGroupShared>,
}

struct ThreadGroupShared {
    workers: usize,
    barrier: Barrier,
    accumulator: Mutex<Vec<f32>>,
}

impl ThreadGroup {
    /// Create one handle per worker.
    pub fn new(workers: usize) -> Vec<ThreadGroup> {
        assert!(workers > 0, "a worker group cannot be empty");
        let shared = Arc::new(ThreadGroupShared {
            workers,
            barrier: Barrier::new(workers),
            accumulator: Mutex::new(Vec::new()),
        });
        (0..workers)
            .map(|_| ThreadGroup {
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl ParallelContext for ThreadGroup {
    fn num_workers(&self) -> usize {
        self.shared.workers
    }

    fn sum_fields(&self, field: &mut [f32]) {
        let shared = &*self.shared;

        // One worker prepares the accumulator once everyone has arrived.
        if shared.barrier.wait().is_leader() {
            let mut acc = shared.accumulator.lock().expect("reduction lock poisoned");
            acc.clear();
            acc.resize(field.len(), 0.0);
        }
        shared.barrier.wait();

        {
            let mut acc = shared.accumulator.lock().expect("reduction lock poisoned");
            assert_eq!(
                acc.len(),
                field.len(),
                "workers reduced fields of different lengths"
            );
            for (a, &v) in acc.iter_mut().zip(field.iter()) {
                *a += v;
            }
        }
        shared.barrier.wait();

        {
            let acc = shared.accumulator.lock().expect("reduction lock poisoned");
            field.copy_from_slice(&acc);
        }
        // Hold everyone until the last copy finishes, so a fast worker
        // cannot start the next round's clear early.
        shared.barrier.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_single_worker_leaves_field_untouched() {
        let mut field = vec![1.0, 2.0, 3.0];
        SingleWorker.sum_fields(&mut field);
        assert_eq!(field, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_thread_group_sums_across_workers() {
        for workers in [2usize, 4] {
            let handles = ThreadGroup::new(workers);
            let results: Vec<Vec<f32>> = thread::scope(|scope| {
                let mut joins = Vec::new();
                for (rank, group) in handles.into_iter().enumerate() {
                    joins.push(scope.spawn(move || {
                        let mut field = vec![rank as f32, 1.0, -2.0];
                        group.sum_fields(&mut field);
                        field
                    }));
                }
                joins.into_iter().map(|j| j.join().unwrap()).collect()
            });

            let rank_sum: f32 = (0..workers).map(|r| r as f32).sum();
            for field in results {
                assert_eq!(field[0], rank_sum);
                assert_eq!(field[1], workers as f32);
                assert_eq!(field[2], -2.0 * workers as f32);
            }
        }
    }

    #[test]
    fn test_thread_group_reusable_across_rounds() {
        let handles = ThreadGroup::new(2);
        let results: Vec<f32> = thread::scope(|scope| {
            let mut joins = Vec::new();
            for group in handles {
                joins.push(scope.spawn(move || {
                    let mut field = vec![1.0f32];
                    group.sum_fields(&mut field);
                    group.sum_fields(&mut field);
                    field[0]
                }));
            }
            joins.into_iter().map(|j| j.join().unwrap()).collect()
        });
        // 1+1 = 2 after round one, 2+2 = 4 after round two
        assert_eq!(results, vec![4.0, 4.0]);
    }
}
