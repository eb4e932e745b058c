//! Request deduplication
//!
//! A [`Group`] runs at most one call per key at a time. Callers arriving
//! while a call is in flight wait for it and receive a clone of its result,
//! errors included. Nothing is remembered once the call finishes.

use std::future::Future;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::trace;

use crate::error::Result;

type Slot<V> = watch::Receiver<Option<Result<V>>>;

#[derive(Debug)]
pub struct Group<V> {
    calls: DashMap<String, Slot<V>>,
}

impl<V: Clone + Send + Sync> Default for Group<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync> Group<V> {
    pub fn new() -> Self {
        Self {
            calls: DashMap::new(),
        }
    }

    /// Run `f` for `key` unless a call for `key` is already in flight, in
    /// which case wait for that call's result instead.
    pub async fn work<F, Fut>(&self, key: &str, f: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let tx = loop {
            let mut rx = match self.calls.entry(key.to_string()) {
                Entry::Occupied(e) => e.get().clone(),
                Entry::Vacant(e) => {
                    let (tx, rx) = watch::channel(None);
                    e.insert(rx);
                    break tx;
                }
            };
            trace!("singleflight: joining in-flight call for {}", key);
            let shared = match rx.wait_for(Option::is_some).await {
                Ok(result) => result.clone(),
                Err(_) => None,
            };
            if let Some(result) = shared {
                return result;
            }
            // The leading caller was dropped before finishing; take over.
        };

        // Removes the key even if this future is dropped mid-call.
        let _in_flight = scopeguard::guard(&self.calls, |calls| {
            calls.remove(key);
        });
        let result = f().await;
        tx.send_replace(Some(result.clone()));
        result
    }

    /// Number of calls currently in flight
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::error::HubError;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_execution() {
        let group = Arc::new(Group::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let group = group.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    group
                        .work("/dir", move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(7)
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_error_is_shared_but_not_remembered() {
        let group = Group::<u32>::new();
        let err = group
            .work("/k", || async { Err(HubError::Backend("boom".to_string())) })
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Backend(_)));

        let ok = group.work("/k", || async { Ok(1) }).await.unwrap();
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let group = Group::<&'static str>::new();
        let (a, b) = tokio::join!(
            group.work("/a", || async { Ok("a") }),
            group.work("/b", || async { Ok("b") }),
        );
        assert_eq!(a.unwrap(), "a");
        assert_eq!(b.unwrap(), "b");
    }

    #[tokio::test]
    async fn test_follower_takes_over_when_leader_is_dropped() {
        let group = Arc::new(Group::<u32>::new());

        let leader = {
            let group = group.clone();
            tokio::spawn(async move {
                group
                    .work("/k", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(1)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let follower = {
            let group = group.clone();
            tokio::spawn(async move { group.work("/k", || async { Ok(2) }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        assert_eq!(follower.await.unwrap().unwrap(), 2);
    }
}
