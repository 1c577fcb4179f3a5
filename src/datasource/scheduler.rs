//! Fixed-spacing request scheduler: one call in flight, a minimum gap
//! between consecutive calls.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

#[derive(Debug)]
pub struct RequestScheduler {
    spacing: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl RequestScheduler {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last_start: Mutex::new(None),
        }
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Run `task` once the previous call has finished and the spacing has elapsed.
    pub async fn run<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            sleep_until(previous + self.spacing).await;
        }
        *last_start = Some(Instant::now());
        task().await
    }
}

impl Default for RequestScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(25))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn spaces_consecutive_calls() {
        let scheduler = RequestScheduler::new(Duration::from_millis(20));
        let started = std::time::Instant::now();
        for _ in 0..3 {
            scheduler.run(|| async {}).await;
        }
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn never_runs_two_tasks_at_once() {
        let scheduler = Arc::new(RequestScheduler::new(Duration::from_millis(1)));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let scheduler = scheduler.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                scheduler
                    .run(move || async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
