//! Single-flight execution: concurrent calls for the same key share one run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

/// Deduplicates concurrent work by key.
///
/// The first caller for a key runs the work; callers arriving while it runs
/// wait and receive a clone of its value. If the running work returns `Err`
/// or is dropped, nothing is stored and the next waiter runs the work itself.
/// Once a value is produced the key is forgotten, so later calls start fresh.
#[derive(Debug)]
pub struct SingleFlight<T> {
    inflight: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self { inflight: Mutex::new(HashMap::new()) }
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key`, or join a run already in progress.
    pub async fn run<F, Fut, E>(&self, key: &str, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let cell = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            inflight.entry(key.to_string()).or_default().clone()
        };

        // Runs on completion and when this future is dropped mid-run.
        let guard = ForgetOnDrop { flight: self, key, cell };
        let result = guard.cell.get_or_try_init(work).await.cloned();
        result
    }

    /// Keys with work currently registered.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn forget(&self, key: &str, cell: &Arc<OnceCell<T>>) {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        // A later run may already own the slot.
        if let Some(current) = inflight.get(key)
            && Arc::ptr_eq(current, cell)
            && (cell.initialized() || Arc::strong_count(cell) <= 2)
        {
            inflight.remove(key);
        }
    }
}

struct ForgetOnDrop<'a, T: Clone> {
    flight: &'a SingleFlight<T>,
    key: &'a str,
    cell: Arc<OnceCell<T>>,
}

impl<T: Clone> Drop for ForgetOnDrop<'_, T> {
    fn drop(&mut self) {
        self.flight.forget(self.key, &self.cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_share_one_run() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let flight = flight.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run("aapl", || async {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok::<_, ()>(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_run_again() {
        let flight = SingleFlight::<u32>::new();
        let runs = AtomicUsize::new(0);

        for _ in 0..2 {
            let value = flight
                .run("msft", || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(7)
                })
                .await;
            assert_eq!(value, Ok(7));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_is_not_stored() {
        let flight = SingleFlight::<u32>::new();
        let first = flight.run("nvda", || async { Err::<u32, _>("cancelled") }).await;
        assert_eq!(first, Err("cancelled"));

        let second = flight.run("nvda", || async { Ok::<_, &str>(3) }).await;
        assert_eq!(second, Ok(3));
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_takes_over_when_leader_fails() {
        let flight = Arc::new(SingleFlight::<u32>::new());

        let leader = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("tsla", || async {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Err::<u32, _>("cancelled")
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let waiter = {
            let flight = flight.clone();
            tokio::spawn(async move { flight.run("tsla", || async { Ok::<_, &str>(9) }).await })
        };

        assert_eq!(leader.await.unwrap(), Err("cancelled"));
        assert_eq!(waiter.await.unwrap(), Ok(9));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let flight = SingleFlight::<&'static str>::new();
        let a = flight.run("a", || async { Ok::<_, ()>("a") }).await;
        let b = flight.run("b", || async { Ok::<_, ()>("b") }).await;
        assert_eq!((a, b), (Ok("a"), Ok("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_run_is_forgotten() {
        let flight = SingleFlight::<u32>::new();
        let run = flight.run("amzn", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ()>(1)
        });

        let outcome = tokio::time::timeout(Duration::from_secs(1), run).await;
        assert!(outcome.is_err());
        assert_eq!(flight.in_flight(), 0);

        let value = flight.run("amzn", || async { Ok::<_, ()>(2) }).await;
        assert_eq!(value, Ok(2));
    }
}
