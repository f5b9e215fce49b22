//! Correlation of dispatched check requests with their replies.
//!
//! Each dispatched request leaves one pending continuation keyed by its
//! correlation id. A reply consumes it at most once; entries nobody answers
//! expire at their deadline and are swept.
//!
//! Lock rule: the table lock is never held while a continuation runs, and
//! no code holds it while touching the validator registry.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::protocol::CheckReply;

/// Work to run with the matching reply
pub type Continuation = Box<dyn FnOnce(CheckReply) -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallbackError {
    #[error("correlation id {0} is already pending")]
    Duplicate(String),
}

/// A dispatched request awaiting its reply
pub struct PendingCallback {
    pub validator_id: String,
    pub target_id: String,
    pub deadline: Instant,
    continuation: Continuation,
}

impl PendingCallback {
    pub fn new(
        validator_id: String,
        target_id: String,
        deadline: Instant,
        continuation: Continuation,
    ) -> Self {
        Self { validator_id, target_id, deadline, continuation }
    }
}

impl std::fmt::Debug for PendingCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCallback")
            .field("validator_id", &self.validator_id)
            .field("target_id", &self.target_id)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// A pending request that expired without a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissedObservation {
    pub correlation_id: String,
    pub validator_id: String,
    pub target_id: String,
}

#[derive(Debug, Default)]
pub struct CallbackTable {
    pending: Mutex<HashMap<String, PendingCallback>>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a continuation; a live duplicate id is rejected
    pub async fn register(
        &self,
        correlation_id: String,
        callback: PendingCallback,
    ) -> Result<(), CallbackError> {
        let mut pending = self.pending.lock().await;
        if pending.contains_key(&correlation_id) {
            return Err(CallbackError::Duplicate(correlation_id));
        }
        pending.insert(correlation_id, callback);
        Ok(())
    }

    /// Run the continuation for `correlation_id` with `reply`.
    ///
    /// Returns `false` without effect for unknown, already-resolved or
    /// expired ids.
    pub async fn resolve(&self, correlation_id: &str, reply: CheckReply) -> bool {
        let callback = self.pending.lock().await.remove(correlation_id);

        match callback {
            Some(callback) => {
                (callback.continuation)(reply).await;
                true
            }
            None => {
                debug!(correlation_id, "Reply for unknown correlation id discarded");
                false
            }
        }
    }

    /// Drop a pending entry without running it
    pub async fn withdraw(&self, correlation_id: &str) -> bool {
        self.pending.lock().await.remove(correlation_id).is_some()
    }

    /// Remove every entry whose deadline is at or before `now`
    pub async fn evict_expired(&self, now: Instant) -> Vec<MissedObservation> {
        let mut pending = self.pending.lock().await;
        let expired: Vec<String> = pending
            .iter()
            .filter(|(_, cb)| cb.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                pending.remove(&id).map(|cb| MissedObservation {
                    correlation_id: id,
                    validator_id: cb.validator_id,
                    target_id: cb.target_id,
                })
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Number of entries dispatched to `validator_id` that are still open
    pub async fn pending_for(&self, validator_id: &str) -> usize {
        self.pending.lock().await.values().filter(|cb| cb.validator_id == validator_id).count()
    }

    /// Periodically evict expired entries, logging each as a missed observation
    pub fn start_sweeper(
        self: std::sync::Arc<Self>,
        every: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let missed = self.evict_expired(Instant::now()).await;
                for m in &missed {
                    info!(
                        correlation_id = %m.correlation_id,
                        validator_id = %m.validator_id,
                        target_id = %m.target_id,
                        "Check request expired without reply (missed observation)"
                    );
                }
                if !missed.is_empty() {
                    debug!(count = missed.len(), "Swept expired pending requests");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CheckOutcome;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn reply(correlation_id: &str) -> CheckReply {
        CheckReply {
            correlation_id: correlation_id.into(),
            validator_id: "V1".into(),
            target_id: "T1".into(),
            outcome: CheckOutcome::Good,
            latency_millis: 5,
            signature: String::new(),
        }
    }

    fn counting(counter: &Arc<AtomicUsize>, deadline: Instant) -> PendingCallback {
        let counter = counter.clone();
        PendingCallback::new(
            "V1".into(),
            "T1".into(),
            deadline,
            Box::new(move |_reply: CheckReply| {
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                .boxed()
            }),
        )
    }

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn test_resolve_runs_once() {
        let table = CallbackTable::new();
        let counter = Arc::new(AtomicUsize::new(0));
        table.register("cb-1".into(), counting(&counter, later())).await.unwrap();

        assert!(table.resolve("cb-1", reply("cb-1")).await);
        assert!(!table.resolve("cb-1", reply("cb-1")).await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_id_has_no_effect() {
        let table = CallbackTable::new();
        let counter = Arc::new(AtomicUsize::new(0));
        table.register("cb-1".into(), counting(&counter, later())).await.unwrap();

        assert!(!table.resolve("cb-forged", reply("cb-forged")).await);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let table = CallbackTable::new();
        let counter = Arc::new(AtomicUsize::new(0));
        table.register("cb-1".into(), counting(&counter, later())).await.unwrap();

        let err = table.register("cb-1".into(), counting(&counter, later())).await;
        assert_eq!(err, Err(CallbackError::Duplicate("cb-1".into())));
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_evicted_and_not_resolvable() {
        let table = CallbackTable::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let now = Instant::now();
        table.register("old".into(), counting(&counter, now)).await.unwrap();
        table.register("fresh".into(), counting(&counter, later())).await.unwrap();

        let missed = table.evict_expired(now).await;
        assert_eq!(missed.len(), 1);
        assert_eq!(missed[0].correlation_id, "old");
        assert_eq!(missed[0].target_id, "T1");

        assert!(!table.resolve("old", reply("old")).await);
        assert!(table.resolve("fresh", reply("fresh")).await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_in_background() {
        let table = Arc::new(CallbackTable::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let deadline = Instant::now() + Duration::from_secs(5);
        table.register("cb".into(), counting(&counter, deadline)).await.unwrap();

        let sweeper = table.clone().start_sweeper(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(7)).await;

        assert!(table.is_empty().await);
        sweeper.abort();
    }

    #[tokio::test]
    async fn test_withdraw() {
        let table = CallbackTable::new();
        let counter = Arc::new(AtomicUsize::new(0));
        table.register("cb".into(), counting(&counter, later())).await.unwrap();

        assert!(table.withdraw("cb").await);
        assert!(!table.withdraw("cb").await);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_and_resolve() {
        let table = Arc::new(CallbackTable::new());
        let counters: Vec<Arc<AtomicUsize>> =
            (0..200).map(|_| Arc::new(AtomicUsize::new(0))).collect();

        let mut registrations = Vec::new();
        for (i, counter) in counters.iter().enumerate() {
            let table = table.clone();
            let callback = counting(counter, later());
            registrations.push(tokio::spawn(async move {
                table.register(format!("cb-{i}"), callback).await
            }));
        }
        for task in registrations {
            task.await.unwrap().unwrap();
        }
        assert_eq!(table.len().await, 200);

        // Three racing replies per id for the first 150; the rest stay pending
        let mut resolvers = Vec::new();
        for i in 0..150 {
            for _ in 0..3 {
                let table = table.clone();
                resolvers.push(tokio::spawn(async move {
                    let id = format!("cb-{i}");
                    table.resolve(&id, reply(&id)).await
                }));
            }
        }

        let mut resolved = 0;
        for task in resolvers {
            if task.await.unwrap() {
                resolved += 1;
            }
        }

        assert_eq!(resolved, 150);
        for counter in &counters[..150] {
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
        for counter in &counters[150..] {
            assert_eq!(counter.load(Ordering::SeqCst), 0);
        }
        assert_eq!(table.len().await, 50);
    }
}
