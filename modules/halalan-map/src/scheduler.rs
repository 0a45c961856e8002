// Bounded-concurrency driver for per-locality work.
//
// All item futures run inside the caller's task; nothing is spawned. The
// batch size is the only backpressure: at most that many workers are ever
// in flight.

use std::future::Future;

use futures::future::join_all;
use futures::stream::{self, StreamExt};

use crate::error::SchedulerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerMode {
    /// Fixed number of slots, each refilled as soon as its task settles.
    #[default]
    Pool,
    /// Consecutive chunks; chunk N+1 starts only after all of chunk N settle.
    Barrier,
}

#[derive(Debug, Clone)]
pub struct BatchScheduler {
    batch_size: usize,
    progress_every: usize,
    mode: SchedulerMode,
}

impl BatchScheduler {
    pub fn new(batch_size: usize) -> Result<Self, SchedulerError> {
        if batch_size == 0 {
            return Err(SchedulerError::InvalidBatchSize);
        }
        Ok(Self {
            batch_size,
            progress_every: 1,
            mode: SchedulerMode::default(),
        })
    }

    pub fn with_mode(mut self, mode: SchedulerMode) -> Self {
        self.mode = mode;
        self
    }

    /// Report progress every `n` batches (`n = 0` is treated as 1).
    pub fn with_progress_every(mut self, n: usize) -> Self {
        self.progress_every = n.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn mode(&self) -> SchedulerMode {
        self.mode
    }

    /// Run `worker` over every item, substituting `fallback(item, err)` for
    /// failures. Results come back in input order.
    pub async fn process<'a, T, R, E, W, Fut, F>(&self, items: &'a [T], worker: W, fallback: F) -> Vec<R>
    where
        W: Fn(&'a T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        F: Fn(&'a T, E) -> R,
    {
        self.run(items, worker, fallback, None::<fn(&[R])>).await
    }

    /// Like [`process`](Self::process), calling `on_progress` with the results
    /// so far (completion order) after every `progress_every` batches and once
    /// at the end. Never called for empty input.
    pub async fn process_with_progress<'a, T, R, E, W, Fut, F, P>(
        &self,
        items: &'a [T],
        worker: W,
        fallback: F,
        on_progress: P,
    ) -> Vec<R>
    where
        W: Fn(&'a T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        F: Fn(&'a T, E) -> R,
        P: FnMut(&[R]),
    {
        self.run(items, worker, fallback, Some(on_progress)).await
    }

    async fn run<'a, T, R, E, W, Fut, F, P>(
        &self,
        items: &'a [T],
        worker: W,
        fallback: F,
        on_progress: Option<P>,
    ) -> Vec<R>
    where
        W: Fn(&'a T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        F: Fn(&'a T, E) -> R,
        P: FnMut(&[R]),
    {
        if items.is_empty() {
            return Vec::new();
        }
        match self.mode {
            SchedulerMode::Pool => self.run_pool(items, worker, fallback, on_progress).await,
            SchedulerMode::Barrier => self.run_barrier(items, worker, fallback, on_progress).await,
        }
    }

    async fn run_pool<'a, T, R, E, W, Fut, F, P>(
        &self,
        items: &'a [T],
        worker: W,
        fallback: F,
        mut on_progress: Option<P>,
    ) -> Vec<R>
    where
        W: Fn(&'a T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        F: Fn(&'a T, E) -> R,
        P: FnMut(&[R]),
    {
        let cadence = self.batch_size.saturating_mul(self.progress_every);
        let mut completed: Vec<R> = Vec::with_capacity(items.len());
        let mut positions: Vec<usize> = Vec::with_capacity(items.len());
        let mut unreported = 0;

        let settled = stream::iter(items.iter().enumerate())
            .map(|(i, item)| {
                let fut = worker(item);
                async move { (i, item, fut.await) }
            })
            .buffer_unordered(self.batch_size);
        let mut settled = std::pin::pin!(settled);

        while let Some((i, item, outcome)) = settled.next().await {
            completed.push(outcome.unwrap_or_else(|e| fallback(item, e)));
            positions.push(i);
            unreported += 1;
            if unreported >= cadence {
                report(&mut on_progress, &completed);
                unreported = 0;
            }
        }
        if unreported > 0 {
            report(&mut on_progress, &completed);
        }

        let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(items.len()).collect();
        for (i, result) in positions.into_iter().zip(completed) {
            slots[i] = Some(result);
        }
        slots.into_iter().flatten().collect()
    }

    async fn run_barrier<'a, T, R, E, W, Fut, F, P>(
        &self,
        items: &'a [T],
        worker: W,
        fallback: F,
        mut on_progress: Option<P>,
    ) -> Vec<R>
    where
        W: Fn(&'a T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        F: Fn(&'a T, E) -> R,
        P: FnMut(&[R]),
    {
        let mut results: Vec<R> = Vec::with_capacity(items.len());
        let chunk_count = items.len().div_ceil(self.batch_size);

        for (n, chunk) in items.chunks(self.batch_size).enumerate() {
            let outcomes = join_all(chunk.iter().map(&worker)).await;
            for (item, outcome) in chunk.iter().zip(outcomes) {
                results.push(outcome.unwrap_or_else(|e| fallback(item, e)));
            }

            let is_last = n + 1 == chunk_count;
            if (n + 1) % self.progress_every == 0 || is_last {
                report(&mut on_progress, &results);
            }
        }
        results
    }
}

fn report<R, P: FnMut(&[R])>(on_progress: &mut Option<P>, results: &[R]) {
    if let Some(callback) = on_progress.as_mut() {
        callback(results);
    }
}
