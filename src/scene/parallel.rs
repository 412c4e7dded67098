use std::ops::Range;
use std::sync::mpsc;
use std::sync::Arc;

use threadpool::ThreadPool;

/// Fixed pool of raster workers, reused by every stage of every frame.
pub struct Workers {
    pool: ThreadPool,
}

impl Workers {
    pub fn new(count: usize) -> Self {
        let pool = ThreadPool::with_name("raster-worker".into(), count.max(1));
        return Self { pool };
    }

    pub fn count(&self) -> usize {
        return self.pool.max_count();
    }

    /// Runs `job` on every item on the pool and waits for all of them. Results come back in the
    /// order of `items`. A job that panics makes this call panic once the others are done.
    pub fn fork_join<T, R, F>(&self, items: Vec<T>, job: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let count = items.len();
        let job = Arc::new(job);
        let (sender, receiver) = mpsc::channel();
        for (index, item) in items.into_iter().enumerate() {
            let sender = sender.clone();
            let job = Arc::clone(&job);
            self.pool.execute(move || {
                let result = job(item);
                // The receiver outlives the barrier, so this cannot fail.
                let _ = sender.send((index, result));
            });
        }
        drop(sender);
        self.pool.join();

        let mut results: Vec<Option<R>> = (0..count).map(|_| None).collect();
        for (index, result) in receiver.try_iter() {
            results[index] = Some(result);
        }
        return results
            .into_iter()
            .enumerate()
            .map(|(index, result)| match result {
                Some(result) => result,
                None => panic!("raster worker panicked on job {} of {}", index, count),
            })
            .collect();
    }
}

/// Splits 0..len into at most `chunks` contiguous ranges of near equal size.
pub fn chunk_ranges(len: usize, chunks: usize) -> Vec<Range<usize>> {
    let chunks = chunks.max(1).min(len.max(1));
    let size = (len + chunks - 1) / chunks;
    let mut ranges = Vec::with_capacity(chunks);
    let mut start = 0;
    while start < len {
        let end = (start + size).min(len);
        ranges.push(start..end);
        start = end;
    }
    return ranges;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_results_keep_input_order() {
        let workers = Workers::new(4);
        let items: Vec<u64> = (0..64).collect();
        let results = workers.fork_join(items, |item| {
            // Early items finish last.
            thread::sleep(Duration::from_micros(64 - item));
            return item * item;
        });
        assert_eq!(results, (0..64).map(|item| item * item).collect::<Vec<u64>>());
    }

    #[test]
    fn test_empty_input() {
        let workers = Workers::new(2);
        let results: Vec<u32> = workers.fork_join(Vec::<u32>::new(), |item| item);
        assert!(results.is_empty());
        assert_eq!(workers.count(), 2);
    }

    #[test]
    #[should_panic(expected = "raster worker panicked")]
    fn test_worker_panic_propagates() {
        let workers = Workers::new(2);
        workers.fork_join(vec![1, 2, 3], |item: i32| {
            if item == 2 {
                panic!("bad item");
            }
            return item;
        });
    }

    #[test]
    fn test_chunk_ranges_cover_everything() {
        let ranges = chunk_ranges(10, 3);
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
        assert_eq!(chunk_ranges(2, 8), vec![0..1, 1..2]);
        assert!(chunk_ranges(0, 4).is_empty());
    }
}
