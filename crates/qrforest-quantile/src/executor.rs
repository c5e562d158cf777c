//! Task executors for the per-tree importance reduction.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::QuantileError;

/// Maps a pure function over independent tasks.
///
/// Output `k` is the result for input `k`; execution order is unspecified.
pub trait TaskExecutor {
    /// Apply `f` to every task and collect results in input order.
    fn map<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync;
}

/// Runs tasks on a rayon pool.
///
/// Built either on a dedicated fixed-size pool or on the global pool.
#[derive(Debug)]
pub struct RayonExecutor {
    pool: Option<rayon::ThreadPool>,
}

impl RayonExecutor {
    /// Executor on a dedicated pool of `n_jobs` workers, or the global pool for `None`.
    ///
    /// # Errors
    ///
    /// Returns [`QuantileError::ThreadPool`] if the pool cannot be built.
    pub fn new(n_jobs: Option<usize>) -> Result<Self, QuantileError> {
        let pool = match n_jobs {
            Some(n) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|source| QuantileError::ThreadPool { source })?,
            ),
            None => None,
        };
        Ok(Self { pool })
    }

    /// Number of workers tasks are spread across.
    #[must_use]
    pub fn n_workers(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, rayon::ThreadPool::current_num_threads)
    }
}

impl TaskExecutor for RayonExecutor {
    fn map<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        let run = || -> Vec<R> { tasks.into_par_iter().map(&f).collect() };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }
}

/// Runs tasks one after another on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialExecutor;

impl TaskExecutor for SequentialExecutor {
    fn map<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        tasks.into_iter().map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rayon_preserves_task_order() {
        let executor = RayonExecutor::new(Some(3)).unwrap();
        assert_eq!(executor.n_workers(), 3);
        let out = executor.map((0..100).collect(), |i: u64| i * i);
        let expected: Vec<u64> = (0..100).map(|i| i * i).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn global_pool_executor_runs() {
        let executor = RayonExecutor::new(None).unwrap();
        assert!(executor.n_workers() >= 1);
        assert_eq!(executor.map(vec![1, 2, 3], |i: i32| i + 1), vec![2, 3, 4]);
    }

    #[test]
    fn sequential_matches_rayon() {
        let tasks: Vec<usize> = (0..17).collect();
        let seq = SequentialExecutor.map(tasks.clone(), |i| i % 5);
        let par = RayonExecutor::new(Some(2)).unwrap().map(tasks, |i| i % 5);
        assert_eq!(seq, par);
    }
}
