use futures::future::join_all;
use std::future::Future;

/// Runs async tasks in sequential groups of at most `width`.
///
/// Each group is joined with a non-short-circuiting `join_all`, so one task
/// failing never cancels its siblings or later groups. Results come back in
/// input order. Futures are lazy: a task does not start until its group is
/// polled.
#[derive(Debug, Clone, Copy)]
pub struct BoundedBatchFetcher {
    width: usize,
}

impl BoundedBatchFetcher {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub async fn run<I, Fut, T, E>(&self, tasks: I) -> Vec<Result<T, E>>
    where
        I: IntoIterator<Item = Fut>,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut pending: Vec<Fut> = tasks.into_iter().collect();
        let mut results = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let rest = pending.split_off(self.width.min(pending.len()));
            let group = std::mem::replace(&mut pending, rest);
            results.extend(join_all(group).await);
        }

        results
    }
}

impl Default for BoundedBatchFetcher {
    fn default() -> Self {
        Self::new(4)
    }
}
