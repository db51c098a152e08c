//! Process-wide request pacing for the WS JSON-RPC client.
//!
//! Deribit enforces a global rate limit, not a per-connection one, so all
//! callers share one pacer. The lock is held across the sleep so concurrent
//! callers are serialized rather than released in a burst.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub struct RequestPacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Waits until at least `min_interval` has passed since the previous
    /// request from any caller, then claims the slot.
    pub async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_pace_enforces_minimum_spacing() {
        let pacer = RequestPacer::new(Duration::from_millis(20));
        let start = Instant::now();
        pacer.pace().await;
        pacer.pace().await;
        pacer.pace().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_pace_serializes_concurrent_callers() {
        let pacer = Arc::new(RequestPacer::new(Duration::from_millis(10)));
        let start = Instant::now();
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let pacer = pacer.clone();
                tokio::spawn(async move { pacer.pace().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
