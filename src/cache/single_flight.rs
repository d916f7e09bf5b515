//! In-process de-duplication of concurrent refreshes.

use crate::{Error, ErrorContext, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type SharedFlight<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Slot map entry: flight id plus the shared outcome.
type Slots<T> = HashMap<String, (u64, SharedFlight<T>)>;

/// How a caller took part in a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightRole {
    /// Started the work.
    Leader,
    /// Joined work another caller had already started.
    Follower,
}

/// One in-flight computation per key.
///
/// The first caller for a key spawns the work on the runtime; callers
/// arriving while it is running await the same shared result and receive a
/// clone of its outcome, error included. The work runs to completion and
/// vacates its slot even if every caller stops waiting, so a later caller
/// never joins work that nobody is driving.
pub struct SingleFlight<T: Clone + Send + Sync + 'static> {
    inflight: Arc<Mutex<Slots<T>>>,
    next_id: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    fn slots(inflight: &Mutex<Slots<T>>) -> MutexGuard<'_, Slots<T>> {
        // The map holds no invariant a panicking holder could break.
        inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `work` unless a flight for `key` is already running, in which case
    /// that flight's outcome is awaited instead and `work` is never called.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn run<F>(&self, key: &str, work: F) -> (Result<T>, FlightRole)
    where
        F: FnOnce() -> BoxFuture<'static, Result<T>>,
    {
        let (flight, role) = {
            let mut slots = Self::slots(&self.inflight);
            match slots.get(key) {
                Some((_, existing)) => (existing.clone(), FlightRole::Follower),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let inflight = Arc::clone(&self.inflight);
                    let owned_key = key.to_string();
                    let fut = work();
                    let handle = tokio::spawn(async move {
                        let outcome = fut.await;
                        let mut slots = Self::slots(&inflight);
                        if slots.get(&owned_key).map(|(slot_id, _)| *slot_id) == Some(id) {
                            slots.remove(&owned_key);
                        }
                        outcome
                    });
                    let flight = handle
                        .map(|joined| {
                            joined.unwrap_or_else(|e| {
                                Err(Error::upstream(
                                    format!("refresh task failed: {}", e),
                                    ErrorContext::new().with_source("single_flight"),
                                ))
                            })
                        })
                        .boxed()
                        .shared();
                    slots.insert(key.to_string(), (id, flight.clone()));
                    (flight, FlightRole::Leader)
                }
            }
        };
        (flight.await, role)
    }

    /// Number of keys with work in progress.
    pub fn in_flight(&self) -> usize {
        Self::slots(&self.inflight).len()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, ErrorContext};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flights: SingleFlight<u32> = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let run = |calls: Arc<AtomicUsize>| {
            flights.run("agents", move || {
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(7)
                }
                .boxed()
            })
        };

        let results =
            futures::future::join_all((0..5).map(|_| run(Arc::clone(&calls)))).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|(r, _)| matches!(r, Ok(7))));
        let leaders = results
            .iter()
            .filter(|(_, role)| *role == FlightRole::Leader)
            .count();
        assert_eq!(leaders, 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn errors_are_shared_and_slot_is_released() {
        let flights: SingleFlight<u32> = SingleFlight::new();
        let (first, _) = flights
            .run("leads", || {
                async { Err(Error::upstream("boom", ErrorContext::new())) }.boxed()
            })
            .await;
        assert!(first.unwrap_err().is_upstream_failure());

        let (second, role) = flights.run("leads", || async { Ok(1) }.boxed()).await;
        assert_eq!(second.unwrap(), 1);
        assert_eq!(role, FlightRole::Leader);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_coalesce() {
        let flights: SingleFlight<&'static str> = SingleFlight::new();
        let (a, b) = tokio::join!(
            flights.run("a", || async { Ok("a") }.boxed()),
            flights.run("b", || async { Ok("b") }.boxed()),
        );
        assert_eq!(a.0.unwrap(), "a");
        assert_eq!(b.0.unwrap(), "b");
        assert_eq!(a.1, FlightRole::Leader);
        assert_eq!(b.1, FlightRole::Leader);
    }

    #[tokio::test]
    async fn abandoned_work_completes_and_frees_the_slot() {
        let flights: SingleFlight<u32> = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            flights.run("agents", move || {
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                }
                .boxed()
            }),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);

        let (next, role) = flights.run("agents", || async { Ok(2) }.boxed()).await;
        assert_eq!(next.unwrap(), 2);
        assert_eq!(role, FlightRole::Leader);
    }
}
