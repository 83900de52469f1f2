//! Bounded worker admission.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fixed-capacity admission gate for transfer work.
///
/// Every asynchronous unit of work (one slice upload, one file transfer)
/// acquires a permit before starting; dropping the permit releases it
/// unconditionally, so the number of in-flight operations never exceeds the
/// pool's capacity regardless of tree fan-out.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> WorkerPool {
        WorkerPool {
            permits: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }

    /// Blocks until a permit is free. Hold the permit for the full lifetime
    /// of the work; it releases on drop.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .expect("worker pool semaphore closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrency_never_exceeds_capacity() {
        const CAPACITY: usize = 3;
        const TASKS: usize = 12;

        let pool = WorkerPool::new(CAPACITY);
        let active = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..TASKS {
            let permit = pool.acquire().await;
            let active = active.clone();
            let high_water = high_water.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                high_water.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(high_water.load(Ordering::SeqCst) <= CAPACITY);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn permit_released_on_task_failure() {
        let pool = WorkerPool::new(1);
        {
            let permit = pool.acquire().await;
            let handle = tokio::spawn(async move {
                let _permit = permit;
                panic!("worker died");
            });
            assert!(handle.await.is_err());
        }
        // The panicked task must have returned its permit.
        let _again = pool.acquire().await;
    }
}
