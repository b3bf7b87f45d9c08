use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::warn;
use tokio::sync::{mpsc, Mutex};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Bounded worker set for memory extraction/purge jobs (spec §9: "model as
/// a task submitted to a bounded worker set with drop-oldest overflow;
/// memory work must never back-pressure the dialogue path"). Jobs sit in a
/// fixed-capacity ring buffer; a `mpsc` doorbell channel wakes idle workers
/// via `try_send`, so `submit` itself never blocks or awaits a permit,
/// mirroring the teacher's "`tokio::spawn` plus a bounded channel, never an
/// unbounded queue" convention.
pub struct WorkerPool {
    queue: Arc<Mutex<VecDeque<Job>>>,
    capacity: usize,
    doorbell: mpsc::Sender<()>,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(worker_count: usize, queue_capacity: usize) -> Arc<Self> {
        let worker_count = worker_count.max(1);
        let (doorbell, receiver) = mpsc::channel(worker_count);
        let pool = Arc::new(Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            capacity: queue_capacity.max(1),
            doorbell,
            in_flight: Arc::new(AtomicUsize::new(0)),
        });
        let receiver = Arc::new(Mutex::new(receiver));
        for _ in 0..worker_count {
            pool.clone().spawn_worker(receiver.clone());
        }
        pool
    }

    fn spawn_worker(self: Arc<Self>, receiver: Arc<Mutex<mpsc::Receiver<()>>>) {
        tokio::spawn(async move {
            loop {
                if receiver.lock().await.recv().await.is_none() {
                    return;
                }
                while let Some(job) = self.queue.lock().await.pop_front() {
                    self.in_flight.fetch_add(1, Ordering::SeqCst);
                    job.await;
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            }
        });
    }

    /// Enqueues a job. Never blocks: if the ring buffer is already at
    /// capacity the oldest queued job is dropped (and logged) to make room
    /// for the new one, rather than applying back-pressure to the caller.
    pub async fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        {
            let mut queue = self.queue.lock().await;
            if queue.len() >= self.capacity {
                warn!(
                    "memory worker ring buffer at capacity ({}), dropping oldest job",
                    self.capacity
                );
                queue.pop_front();
            }
            queue.push_back(Box::pin(job));
        }
        // Doorbell is bounded; a `Full` here just means a wakeup is already
        // pending, which is exactly what we want, so the error is ignored.
        let _ = self.doorbell.try_send(());
    }

    /// Test helper: waits until the ring buffer is empty and no job is in
    /// flight, so extraction/purge tests don't need real sleeps.
    pub async fn flush(&self) {
        loop {
            let empty = self.queue.lock().await.is_empty();
            let idle = self.in_flight.load(Ordering::SeqCst) == 0;
            if empty && idle {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn submitted_jobs_all_run() {
        let pool = WorkerPool::new(2, 16);
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        }
        pool.flush().await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn overflow_drops_oldest_queued_job_not_the_newest() {
        // A single worker that blocks on the first job gives us a window to
        // overflow the ring buffer with the others while it still holds
        // them queued.
        let pool = WorkerPool::new(1, 2);
        let started = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        {
            let started = started.clone();
            let release = release.clone();
            pool.submit(async move {
                started.notify_one();
                release.notified().await;
            })
            .await;
        }
        started.notified().await;

        for i in 0..3 {
            let order = order.clone();
            pool.submit(async move {
                order.lock().await.push(i);
            })
            .await;
        }

        release.notify_one();
        pool.flush().await;

        // Capacity 2, three submissions (0,1,2) while the worker was busy:
        // 0 dropped, 1 and 2 survive and run in order.
        assert_eq!(*order.lock().await, vec![1, 2]);
    }
}
