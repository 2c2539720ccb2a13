//! Per-runner-profile concurrency limiter: a fixed-size semaphore keyed by
//! profile name. A missing or zero limit means unlimited.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct ProviderLimiter {
    limits: HashMap<String, usize>,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

/// Held while a runner invocation is in flight; unlimited profiles hold no
/// permit at all.
pub enum LimiterGuard {
    Unlimited,
    Bounded(OwnedSemaphorePermit),
}

impl ProviderLimiter {
    pub fn new(limits: HashMap<String, usize>) -> Self {
        ProviderLimiter {
            limits,
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, runner: &str) -> LimiterGuard {
        let Some(&limit) = self.limits.get(runner).filter(|&&n| n > 0) else {
            return LimiterGuard::Unlimited;
        };

        let sem = {
            let mut sems = self.semaphores.lock().unwrap();
            sems.entry(runner.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(limit)))
                .clone()
        };

        let permit = sem
            .acquire_owned()
            .await
            .expect("provider semaphore is never closed");
        LimiterGuard::Bounded(permit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn unlimited_profile_never_blocks() {
        let limiter = ProviderLimiter::new(HashMap::new());
        let _g1 = limiter.acquire("free").await;
        let _g2 = limiter.acquire("free").await;
    }

    #[tokio::test]
    async fn bounded_profile_enforces_concurrency_cap() {
        let mut limits = HashMap::new();
        limits.insert("primary".to_string(), 1);
        let limiter = Arc::new(ProviderLimiter::new(limits));

        let g1 = limiter.acquire("primary").await;
        let limiter2 = limiter.clone();
        let waiter = tokio::spawn(async move { limiter2.acquire("primary").await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        drop(g1);
        let _g2 = waiter.await.unwrap();
    }
}
