//! Periodic cycle triggering.
//!
//! Each tick spawns one reconciliation cycle as its own task. The reconciler
//! sits behind an async mutex and a tick only starts a cycle if it can take
//! the lock immediately, so cycles never overlap: a tick that arrives while
//! the previous cycle is still running is skipped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::reconciler::{CycleReport, Reconciler};

/// Result of asking the scheduler to start a cycle.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A cycle was spawned.
    Started(JoinHandle<CycleReport>),
    /// The previous cycle still holds the reconciler.
    Skipped,
}

/// Runs reconciliation cycles on a fixed period.
pub struct CycleScheduler {
    reconciler: Arc<Mutex<Reconciler>>,
    interval: Duration,
}

impl CycleScheduler {
    pub fn new(reconciler: Reconciler, interval: Duration) -> Self {
        Self {
            reconciler: Arc::new(Mutex::new(reconciler)),
            interval,
        }
    }

    /// Start a cycle unless one is already running.
    pub fn trigger(&self) -> TriggerOutcome {
        match Arc::clone(&self.reconciler).try_lock_owned() {
            Ok(mut reconciler) => {
                TriggerOutcome::Started(tokio::spawn(async move { reconciler.run_cycle().await }))
            }
            Err(_) => {
                tracing::warn!("previous reconciliation cycle still running, skipping tick");
                TriggerOutcome::Skipped
            }
        }
    }

    /// Tick until `shutdown` resolves. The first tick fires immediately.
    ///
    /// A cycle that is still running at shutdown is left to finish on its own
    /// task.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(interval_secs = self.interval.as_secs(), "cycle scheduler started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("cycle scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let TriggerOutcome::Started(cycle) = self.trigger() {
                        tokio::spawn(async move {
                            if let Err(e) = cycle.await {
                                tracing::error!(error = %e, "reconciliation cycle aborted");
                            }
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::ReconcilerConfig;
    use async_trait::async_trait;
    use bouncer_types::config::MessagesConfig;
    use bouncer_types::errors::BouncerError;
    use bouncer_types::traits::{IdentityRegistry, PlatformClient};
    use bouncer_types::{
        GroupId, IdentityId, MessageTarget, UpdateEvent, VerifiedIdentitySnapshot,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{oneshot, Semaphore};

    /// Platform whose `fetch_updates` waits for a permit from `gate`.
    struct GatedPlatform {
        gate: Semaphore,
        fetches: AtomicUsize,
    }

    impl GatedPlatform {
        fn new(permits: usize) -> Self {
            Self {
                gate: Semaphore::new(permits),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PlatformClient for GatedPlatform {
        async fn fetch_updates(
            &self,
            _offset: i64,
            _timeout: Duration,
        ) -> Result<Vec<UpdateEvent>, BouncerError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| BouncerError::Internal(e.to_string()))?;
            permit.forget();
            Ok(Vec::new())
        }

        async fn approve_join_request(
            &self,
            _group: &GroupId,
            _identity: IdentityId,
        ) -> Result<(), BouncerError> {
            Ok(())
        }

        async fn remove_member(
            &self,
            _group: &GroupId,
            _identity: IdentityId,
        ) -> Result<(), BouncerError> {
            Ok(())
        }

        async fn send_message(
            &self,
            _target: &MessageTarget,
            _text: &str,
        ) -> Result<(), BouncerError> {
            Ok(())
        }
    }

    struct EmptyRegistry;

    #[async_trait]
    impl IdentityRegistry for EmptyRegistry {
        async fn list_verified_identities(
            &self,
        ) -> Result<VerifiedIdentitySnapshot, BouncerError> {
            Ok(VerifiedIdentitySnapshot::empty())
        }
    }

    fn scheduler(platform: Arc<GatedPlatform>, interval: Duration) -> CycleScheduler {
        let templates = MessagesConfig {
            info: "{title}".to_string(),
            welcome: "{title}".to_string(),
            help_url: String::new(),
            rules_url: String::new(),
        }
        .compile()
        .unwrap();
        let reconciler = Reconciler::new(
            platform,
            Arc::new(EmptyRegistry),
            templates,
            ReconcilerConfig::default(),
        );
        CycleScheduler::new(reconciler, interval)
    }

    #[tokio::test]
    async fn test_trigger_skips_while_cycle_running() {
        let platform = Arc::new(GatedPlatform::new(0));
        let scheduler = scheduler(platform.clone(), Duration::from_secs(60));

        let first = match scheduler.trigger() {
            TriggerOutcome::Started(handle) => handle,
            TriggerOutcome::Skipped => panic!("first trigger must start a cycle"),
        };
        assert!(matches!(scheduler.trigger(), TriggerOutcome::Skipped));

        platform.gate.add_permits(1);
        let report = first.await.unwrap();
        assert_eq!(report.updates, 0);

        platform.gate.add_permits(1);
        match scheduler.trigger() {
            TriggerOutcome::Started(handle) => {
                handle.await.unwrap();
            }
            TriggerOutcome::Skipped => panic!("lock must be free after the cycle"),
        }
        assert_eq!(platform.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_never_overlaps_cycles() {
        let platform = Arc::new(GatedPlatform::new(0));
        let scheduler = scheduler(platform.clone(), Duration::from_millis(10));
        let (stop, stopped) = oneshot::channel::<()>();

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = stop.send(());
        });
        scheduler
            .run(async {
                let _ = stopped.await;
            })
            .await;
        stopper.await.unwrap();

        assert_eq!(platform.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_repeats_cycles_until_shutdown() {
        let platform = Arc::new(GatedPlatform::new(Semaphore::MAX_PERMITS));
        let scheduler = scheduler(platform.clone(), Duration::from_millis(10));

        scheduler
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await;

        assert!(platform.fetches.load(Ordering::SeqCst) >= 2);
    }
}
