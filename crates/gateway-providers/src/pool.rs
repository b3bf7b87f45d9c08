use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gateway_core::{Clock, Deadline, GatewayError, GatewayResult, SystemClock};
use log::{debug, error, warn};
use tokio::sync::{oneshot, Mutex};

/// Constructs and destroys the pooled resource. Generalizes
/// `gateway_adapters::AdapterFactory` to whatever `T` a `Pool<T>` holds, so
/// the pool itself stays adapter-agnostic.
#[async_trait]
pub trait ResourceFactory<T>: Send + Sync {
    async fn create(&self) -> anyhow::Result<T>;
    async fn destroy(&self, _value: T) {}
}

/// Bridges a `gateway_adapters::AdapterFactory` into a `ResourceFactory`
/// that produces `Box<dyn ProviderAdapter>`, calling `cleanup()` on destroy
/// so pool eviction always runs adapter teardown.
pub struct AdapterPoolFactory {
    inner: Arc<dyn gateway_adapters::AdapterFactory>,
}

impl AdapterPoolFactory {
    pub fn new(inner: Arc<dyn gateway_adapters::AdapterFactory>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ResourceFactory<Box<dyn gateway_adapters::ProviderAdapter>> for AdapterPoolFactory {
    async fn create(&self) -> anyhow::Result<Box<dyn gateway_adapters::ProviderAdapter>> {
        self.inner.create().await
    }

    async fn destroy(&self, mut value: Box<dyn gateway_adapters::ProviderAdapter>) {
        if let Err(err) = value.cleanup().await {
            error!("adapter cleanup failed during pool eviction: {err:#}");
        }
    }
}

struct IdleEntry<T> {
    value: T,
    released_at_ms: u64,
}

struct WaiterSlot<T> {
    id: u64,
    tx: oneshot::Sender<WaiterOutcome<T>>,
}

enum WaiterOutcome<T> {
    /// Handed an instance directly by a releaser (release algorithm step 2).
    Instance(T),
    /// Handed a reserved slot to construct in (freed by a destroyed instance).
    Slot,
}

struct PoolInner<T> {
    idle: Vec<IdleEntry<T>>,
    leased: usize,
    waiters: VecDeque<WaiterSlot<T>>,
    closed: bool,
}

/// A caller's exclusive right to use a provider instance until `release`.
/// Deliberately does *not* return the instance to the pool on `Drop` — spec
/// §8 invariant 7 requires `release` to be called exactly once per
/// successful `acquire`, and silently recycling on drop would hide that
/// bug instead of surfacing it. Dropping an unreleased lease still reclaims
/// the pool's accounting (as a leak-safety net, logged as an error) so a
/// caller bug degrades capacity rather than deadlocking the pool forever.
pub struct Lease<T> {
    value: Option<T>,
    pool: Arc<PoolState<T>>,
    released: bool,
}

impl<T> Lease<T> {
    pub fn get(&self) -> &T {
        self.value.as_ref().expect("lease value taken before release")
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("lease value taken before release")
    }

    pub fn key(&self) -> &str {
        &self.pool.key
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        if !self.released {
            error!(
                "lease for pool {} dropped without release() — forcing destroy to avoid leaking capacity",
                self.pool.key
            );
            if let Some(value) = self.value.take() {
                let pool = self.pool.clone();
                tokio::spawn(async move {
                    pool.release(value, false).await;
                });
            }
        }
    }
}

struct PoolState<T> {
    key: String,
    capacity: usize,
    max_idle_time: Duration,
    inner: Mutex<PoolInner<T>>,
    factory: Arc<dyn ResourceFactory<T>>,
    clock: Arc<dyn Clock>,
    next_waiter_id: AtomicU64,
}

impl<T: Send + 'static> PoolState<T> {
    async fn release(self: &Arc<Self>, value: T, ok: bool) {
        let mut inner = self.inner.lock().await;
        if !ok || inner.closed {
            inner.leased = inner.leased.saturating_sub(1);
            self.record_gauges(&inner);
            drop(inner);
            self.factory.destroy(value).await;
            self.wake_one_waiter_to_construct().await;
            return;
        }

        // Hand the instance directly to the next live waiter: ownership
        // transfers from this releaser to that waiter, `leased` unchanged.
        // A waiter that already timed out never held a reservation (its
        // slot is only taken on a confirmed send, see
        // `wake_one_waiter_to_construct`), so skipping one on a failed
        // send costs nothing; we just try the next. Only once no live
        // waiter claims it does the instance actually leave the leased
        // count and land in idle.
        let mut value = value;
        loop {
            match inner.waiters.pop_front() {
                Some(waiter) => match waiter.tx.send(WaiterOutcome::Instance(value)) {
                    Ok(()) => {
                        self.record_gauges(&inner);
                        return;
                    }
                    Err(WaiterOutcome::Instance(returned)) => {
                        value = returned;
                        continue;
                    }
                    Err(_) => unreachable!("send only fails by returning the value it was given"),
                },
                None => {
                    inner.leased = inner.leased.saturating_sub(1);
                    let now = self.clock.now_ms();
                    inner.idle.push(IdleEntry {
                        value,
                        released_at_ms: now,
                    });
                    self.record_gauges(&inner);
                    return;
                }
            }
        }
    }

    async fn wake_one_waiter_to_construct(self: &Arc<Self>) {
        loop {
            let mut inner = self.inner.lock().await;
            match inner.waiters.pop_front() {
                Some(waiter) => match waiter.tx.send(WaiterOutcome::Slot) {
                    Ok(()) => {
                        inner.leased += 1;
                        self.record_gauges(&inner);
                        return;
                    }
                    Err(_) => {
                        // Stale waiter, already timed out: no slot was ever
                        // reserved for it, so just try the next one.
                        continue;
                    }
                },
                None => return,
            }
        }
    }

    /// Removes a waiter by id from the queue, used when its own `acquire`
    /// times out so the slot doesn't linger for a future releaser to find.
    async fn remove_waiter(self: &Arc<Self>, id: u64) {
        let mut inner = self.inner.lock().await;
        inner.waiters.retain(|w| w.id != id);
    }

    async fn idle_sweep(self: &Arc<Self>) {
        let now = self.clock.now_ms();
        let max_idle_ms = self.max_idle_time.as_millis() as u64;
        let mut expired = Vec::new();
        {
            let mut inner = self.inner.lock().await;
            let mut keep = Vec::with_capacity(inner.idle.len());
            for entry in inner.idle.drain(..) {
                if now.saturating_sub(entry.released_at_ms) > max_idle_ms {
                    expired.push(entry.value);
                } else {
                    keep.push(entry);
                }
            }
            inner.idle = keep;
            self.record_gauges(&inner);
        }
        for value in expired {
            self.factory.destroy(value).await;
        }
    }

    /// Publishes the current idle/leased counts as gauges, labelled by pool
    /// key. Called with the inner lock already held so the snapshot is
    /// consistent with whatever mutation just happened.
    fn record_gauges(&self, inner: &PoolInner<T>) {
        metrics::gauge!("gateway_pool_idle", "pool" => self.key.clone()).set(inner.idle.len() as f64);
        metrics::gauge!("gateway_pool_leased", "pool" => self.key.clone()).set(inner.leased as f64);
    }
}

/// Per-`(category, name, version)` bounded pool of initialized provider
/// instances (C4, spec §4.3). Generalizes the teacher's unbounded
/// `ConnectionPool` into a strict-capacity, FIFO-fair, blocking pool.
pub struct Pool<T> {
    state: Arc<PoolState<T>>,
}

impl<T: Send + 'static> Pool<T> {
    pub fn new(
        key: impl Into<String>,
        capacity: usize,
        max_idle_time: Duration,
        factory: Arc<dyn ResourceFactory<T>>,
    ) -> Self {
        Self::with_clock(key, capacity, max_idle_time, factory, Arc::new(SystemClock))
    }

    pub fn with_clock(
        key: impl Into<String>,
        capacity: usize,
        max_idle_time: Duration,
        factory: Arc<dyn ResourceFactory<T>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        assert!(capacity >= 1, "pool capacity must be at least 1");
        Self {
            state: Arc::new(PoolState {
                key: key.into(),
                capacity,
                max_idle_time,
                inner: Mutex::new(PoolInner {
                    idle: Vec::new(),
                    leased: 0,
                    waiters: VecDeque::new(),
                    closed: false,
                }),
                factory,
                clock,
                next_waiter_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.state.key
    }

    pub async fn leased(&self) -> usize {
        self.state.inner.lock().await.leased
    }

    pub async fn idle_count(&self) -> usize {
        self.state.inner.lock().await.idle.len()
    }

    pub async fn acquire(&self, deadline: Deadline) -> GatewayResult<Lease<T>> {
        debug!("acquiring from pool {}", self.state.key);
        enum Decision<T> {
            Construct,
            Wait(u64, oneshot::Receiver<WaiterOutcome<T>>),
            Closed,
        }

        let decision = {
            let mut inner = self.state.inner.lock().await;
            if inner.closed {
                Decision::Closed
            } else if let Some(entry) = inner.idle.pop() {
                inner.leased += 1;
                self.state.record_gauges(&inner);
                metrics::counter!("gateway_pool_acquires_total", "pool" => self.state.key.clone()).increment(1);
                return Ok(Lease {
                    value: Some(entry.value),
                    pool: self.state.clone(),
                    released: false,
                });
            } else if inner.leased < self.state.capacity {
                inner.leased += 1;
                self.state.record_gauges(&inner);
                Decision::Construct
            } else {
                let id = self.state.next_waiter_id.fetch_add(1, Ordering::SeqCst);
                let (tx, rx) = oneshot::channel();
                inner.waiters.push_back(WaiterSlot { id, tx });
                Decision::Wait(id, rx)
            }
        };

        match decision {
            Decision::Closed => Err(GatewayError::Closed {
                key: self.state.key.clone(),
            }),
            Decision::Construct => match self.state.factory.create().await {
                Ok(value) => {
                    metrics::counter!("gateway_pool_acquires_total", "pool" => self.state.key.clone()).increment(1);
                    Ok(Lease {
                        value: Some(value),
                        pool: self.state.clone(),
                        released: false,
                    })
                }
                Err(source) => {
                    let mut inner = self.state.inner.lock().await;
                    inner.leased = inner.leased.saturating_sub(1);
                    self.state.record_gauges(&inner);
                    drop(inner);
                    self.state.wake_one_waiter_to_construct().await;
                    metrics::counter!("gateway_pool_factory_errors_total", "pool" => self.state.key.clone()).increment(1);
                    Err(GatewayError::factory(source))
                }
            },
            Decision::Wait(id, rx) => {
                let remaining = deadline.remaining();
                let waited_ms = remaining.as_millis() as u64;
                match tokio::time::timeout(remaining, rx).await {
                    Ok(Ok(WaiterOutcome::Instance(value))) => {
                        metrics::counter!("gateway_pool_acquires_total", "pool" => self.state.key.clone()).increment(1);
                        Ok(Lease {
                            value: Some(value),
                            pool: self.state.clone(),
                            released: false,
                        })
                    }
                    Ok(Ok(WaiterOutcome::Slot)) => match self.state.factory.create().await {
                        Ok(value) => {
                            metrics::counter!("gateway_pool_acquires_total", "pool" => self.state.key.clone()).increment(1);
                            Ok(Lease {
                                value: Some(value),
                                pool: self.state.clone(),
                                released: false,
                            })
                        }
                        Err(source) => {
                            let mut inner = self.state.inner.lock().await;
                            inner.leased = inner.leased.saturating_sub(1);
                            self.state.record_gauges(&inner);
                            drop(inner);
                            self.state.wake_one_waiter_to_construct().await;
                            metrics::counter!("gateway_pool_factory_errors_total", "pool" => self.state.key.clone()).increment(1);
                            Err(GatewayError::factory(source))
                        }
                    },
                    Ok(Err(_)) => {
                        self.state.remove_waiter(id).await;
                        Err(GatewayError::Cancelled)
                    }
                    Err(_) => {
                        self.state.remove_waiter(id).await;
                        warn!("acquire on pool {} timed out", self.state.key);
                        metrics::counter!("gateway_pool_acquire_timeouts_total", "pool" => self.state.key.clone()).increment(1);
                        Err(GatewayError::AcquireTimedOut {
                            key: self.state.key.clone(),
                            waited_ms,
                        })
                    }
                }
            }
        }
    }

    pub async fn release(&self, mut lease: Lease<T>, ok: bool) {
        if let Some(value) = lease.value.take() {
            lease.released = true;
            self.state.release(value, ok).await;
        }
    }

    pub async fn close(&self) {
        let idle = {
            let mut inner = self.state.inner.lock().await;
            inner.closed = true;
            std::mem::take(&mut inner.idle)
        };
        for entry in idle {
            self.state.factory.destroy(entry.value).await;
        }
    }

    pub async fn idle_sweep(&self) {
        self.state.idle_sweep().await;
    }

    /// Spawns the background idle sweeper, ticking every `max_idle_time / 2`
    /// as spec §4.3 specifies.
    pub fn spawn_idle_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()>
    where
        T: 'static,
    {
        let state = self.state.clone();
        let period = (self.state.max_idle_time / 2).max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                state.idle_sweep().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    struct CountingFactory {
        created: AtomicUsize,
    }

    #[async_trait]
    impl ResourceFactory<u32> for CountingFactory {
        async fn create(&self) -> anyhow::Result<u32> {
            Ok(self.created.fetch_add(1, Ordering::SeqCst) as u32)
        }
    }

    fn factory() -> Arc<CountingFactory> {
        Arc::new(CountingFactory {
            created: AtomicUsize::new(0),
        })
    }

    // Invariant 1: leased + idle <= capacity, always.
    #[tokio::test]
    async fn leased_plus_idle_never_exceeds_capacity() {
        let pool = Arc::new(Pool::new("k", 2, StdDuration::from_secs(60), factory()));
        let l1 = pool.acquire(Deadline::far_future()).await.unwrap();
        let l2 = pool.acquire(Deadline::far_future()).await.unwrap();
        assert_eq!(pool.leased().await + pool.idle_count().await, 2);
        pool.release(l1, true).await;
        assert_eq!(pool.leased().await + pool.idle_count().await, 2);
        pool.release(l2, true).await;
        assert_eq!(pool.leased().await + pool.idle_count().await, 2);
    }

    #[tokio::test]
    async fn third_acquire_beyond_capacity_times_out() {
        let pool = Pool::new("k", 1, StdDuration::from_secs(60), factory());
        let _l1 = pool.acquire(Deadline::far_future()).await.unwrap();
        let err = pool
            .acquire(Deadline::after(StdDuration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AcquireTimedOut { .. }));
    }

    // Regression for a stale-waiter accounting bug: a timed-out waiter must
    // not leave a dangling slot in the queue, and a releaser handing off to
    // one must decrement `leased` rather than leaking a phantom lease.
    // Invariant 1 (leased + idle <= capacity) must hold throughout.
    #[tokio::test]
    async fn release_after_waiter_times_out_does_not_overcount_leased() {
        let pool = Pool::new("k", 1, StdDuration::from_secs(60), factory());
        let l1 = pool.acquire(Deadline::far_future()).await.unwrap();
        let err = pool
            .acquire(Deadline::after(StdDuration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AcquireTimedOut { .. }));

        pool.release(l1, true).await;
        assert!(pool.leased().await + pool.idle_count().await <= 1);
        assert_eq!(pool.leased().await, 0);
        assert_eq!(pool.idle_count().await, 1);

        // capacity must still be usable afterwards.
        let l2 = pool.acquire(Deadline::after(StdDuration::from_millis(100))).await;
        assert!(l2.is_ok());
    }

    #[tokio::test]
    async fn release_false_destroys_instance_and_frees_capacity() {
        let pool = Pool::new("k", 1, StdDuration::from_secs(60), factory());
        let l1 = pool.acquire(Deadline::far_future()).await.unwrap();
        pool.release(l1, false).await;
        assert_eq!(pool.leased().await, 0);
        assert_eq!(pool.idle_count().await, 0);
        // capacity freed: a new acquire should succeed immediately.
        let l2 = pool.acquire(Deadline::after(StdDuration::from_millis(100))).await;
        assert!(l2.is_ok());
    }

    // S5: capacity 2, six concurrent acquirers, FIFO completion order.
    #[tokio::test]
    async fn s5_pool_fairness_fifo() {
        let pool = Arc::new(Pool::new("k", 2, StdDuration::from_secs(60), factory()));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..6u32 {
            let pool = pool.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let lease = pool.acquire(Deadline::after(StdDuration::from_secs(2))).await.unwrap();
                tokio::time::sleep(StdDuration::from_millis(10)).await;
                order.lock().await.push(i);
                pool.release(lease, true).await;
            }));
            // stagger spawns slightly so acquire order is deterministic
            tokio::time::sleep(StdDuration::from_millis(2)).await;
        }
        for h in handles {
            h.await.unwrap();
        }
        let completed = order.lock().await.clone();
        assert_eq!(completed, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn closed_pool_rejects_new_acquires() {
        let pool = Pool::new("k", 1, StdDuration::from_secs(60), factory());
        pool.close().await;
        let err = pool.acquire(Deadline::far_future()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Closed { .. }));
    }

    #[tokio::test]
    async fn idle_sweep_destroys_instances_past_max_idle_time() {
        let clock = Arc::new(gateway_core::FakeClock::new(0));
        let pool = Pool::with_clock(
            "k",
            1,
            StdDuration::from_millis(100),
            factory(),
            clock.clone(),
        );
        let lease = pool.acquire(Deadline::far_future()).await.unwrap();
        pool.release(lease, true).await;
        assert_eq!(pool.idle_count().await, 1);
        clock.advance(200);
        pool.idle_sweep().await;
        assert_eq!(pool.idle_count().await, 0);
    }
}
