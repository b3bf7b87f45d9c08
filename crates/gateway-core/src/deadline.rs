use std::time::Duration;
use tokio::time::Instant;

/// A deadline threaded through every blocking call (`pool.acquire`,
/// `grayscale.pick`'s first-load path, storage calls, `memory.query`), so
/// cancellation is uniform across the gateway rather than each call site
/// inventing its own timeout handling.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    pub fn at(instant: Instant) -> Self {
        Self { at: instant }
    }

    /// Deadline effectively in the infinite future; used where the caller
    /// explicitly opted into unbounded waiting.
    pub fn far_future() -> Self {
        Self::after(Duration::from_secs(60 * 60 * 24 * 365))
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn instant(&self) -> Instant {
        self.at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_after_is_not_immediately_expired() {
        let d = Deadline::after(Duration::from_millis(50));
        assert!(!d.is_expired());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(d.is_expired());
    }

    #[tokio::test]
    async fn remaining_shrinks_toward_zero() {
        let d = Deadline::after(Duration::from_millis(100));
        let first = d.remaining();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = d.remaining();
        assert!(second < first);
    }
}
