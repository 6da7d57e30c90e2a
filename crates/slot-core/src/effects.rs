//! # Side Effects
//!
//! Best-effort work that follows a committed state change: calendar entries,
//! notifications, reference write-backs. Each effect runs on its own task
//! under a timeout. Failures are logged and never reach the caller.

use crate::error::BookingResult;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_EFFECT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug)]
pub struct SideEffects {
    timeout: Duration,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for SideEffects {
    fn default() -> Self {
        Self::new(DEFAULT_EFFECT_TIMEOUT)
    }
}

impl SideEffects {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Run `effect` in the background. Call only after the state change it
    /// follows has been stored.
    pub fn enqueue<F>(&self, name: &'static str, booking_id: &str, effect: F)
    where
        F: Future<Output = BookingResult<()>> + Send + 'static,
    {
        let timeout = self.timeout;
        let booking_id = booking_id.to_string();
        let handle = tokio::spawn(async move {
            match tokio::time::timeout(timeout, effect).await {
                Ok(Ok(())) => debug!(effect = name, booking_id = %booking_id, "Side effect done"),
                Ok(Err(e)) => warn!(effect = name, booking_id = %booking_id, error = %e, "Side effect failed"),
                Err(_) => warn!(
                    effect = name,
                    booking_id = %booking_id,
                    timeout_secs = timeout.as_secs(),
                    "Side effect timed out"
                ),
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every effect enqueued so far (tests, shutdown)
    pub async fn flush(&self) {
        loop {
            let batch: Vec<JoinHandle<()>> = {
                let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
                pending.drain(..).collect()
            };
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                if let Err(e) = handle.await {
                    warn!("Side effect task aborted: {}", e);
                }
            }
        }
    }

    /// Effects still tracked (finished ones are pruned lazily)
    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BookingError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_flush_waits_for_effects() {
        let effects = SideEffects::default();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = done.clone();
            effects.enqueue("count", "BK-TEST000001", async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        effects.flush().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(effects.pending(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_contained() {
        let effects = SideEffects::default();
        effects.enqueue("fail", "BK-TEST000001", async {
            Err(BookingError::NetworkError("relay down".into()))
        });
        effects.flush().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_effect_times_out() {
        let effects = SideEffects::new(Duration::from_secs(1));
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = finished.clone();
        effects.enqueue("slow", "BK-TEST000001", async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            flag.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        effects.flush().await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
