//! Background job supervision and periodic work
//!
//! The scheduler owns the process-wide shutdown signal and restarts any
//! panicked background task after a backoff. The SLO recompute tick runs
//! here and delegates the actual recomputation to a capability; SLO
//! storage itself lives outside this system.

use async_trait::async_trait;
use relops_adapters::MetricsAdapter;
use relops_common::Result;
use relops_store::Gateway;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Wait before restarting a panicked background task
const RESTART_BACKOFF: Duration = Duration::from_secs(60);

/// Window the availability sweep recomputes over
const SWEEP_WINDOW_DAYS: u32 = 30;

/// Recomputes service-level objectives on the scheduler's tick
#[async_trait]
pub trait SloRecalculator: Send + Sync {
    async fn recalculate_all(&self) -> Result<()>;
}

/// SLO recompute against the metrics store: sweeps the service catalog
/// and reports each service's windowed availability. Persistence of the
/// results is the external SLO collaborator's concern.
pub struct AvailabilitySweep {
    store: Arc<dyn Gateway>,
    metrics: Arc<dyn MetricsAdapter>,
}

impl AvailabilitySweep {
    pub fn new(store: Arc<dyn Gateway>, metrics: Arc<dyn MetricsAdapter>) -> Self {
        Self { store, metrics }
    }
}

#[async_trait]
impl SloRecalculator for AvailabilitySweep {
    async fn recalculate_all(&self) -> Result<()> {
        let services = self.store.services().await?;
        for service in services {
            match self
                .metrics
                .availability(&service.name, SWEEP_WINDOW_DAYS)
                .await
            {
                Ok(availability) => info!(
                    "SLO sweep: service {} availability {:.3}% over {}d",
                    service.name, availability, SWEEP_WINDOW_DAYS
                ),
                Err(e) => warn!("SLO sweep failed for service {}: {e}", service.name),
            }
        }
        Ok(())
    }
}

/// Owns the shutdown signal and supervises background tasks
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    restart_backoff: Duration,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_restart_backoff(RESTART_BACKOFF)
    }

    pub fn with_restart_backoff(restart_backoff: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            restart_backoff,
        }
    }

    /// A receiver that flips to true when shutdown begins
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Flip the shutdown signal; all supervised tasks wind down
    pub fn begin_shutdown(&self) {
        info!("Shutdown signal raised");
        let _ = self.shutdown_tx.send(true);
    }

    /// Spawn a task that is restarted after a backoff if it panics. A
    /// clean return ends supervision.
    pub fn spawn_supervised<F, Fut>(&self, name: &'static str, factory: F) -> JoinHandle<()>
    where
        F: Fn(watch::Receiver<bool>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown_tx.subscribe();
        let backoff = self.restart_backoff;

        tokio::spawn(async move {
            let mut observer = shutdown.clone();
            loop {
                let task = tokio::spawn(factory(shutdown.clone()));
                match task.await {
                    Ok(()) => break,
                    Err(e) if e.is_panic() => {
                        error!("Background task '{name}' panicked, restarting in {backoff:?}");
                        tokio::select! {
                            _ = tokio::time::sleep(backoff) => {}
                            _ = observer.changed() => {}
                        }
                        if *observer.borrow() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        })
    }

    /// Run the SLO recompute on a fixed cadence until shutdown
    pub fn spawn_slo_job(
        &self,
        interval: Duration,
        slo: Arc<dyn SloRecalculator>,
    ) -> JoinHandle<()> {
        self.spawn_supervised("slo_recompute", move |mut shutdown| {
            let slo = slo.clone();
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // Skip the immediate first tick; recompute starts one
                // interval after boot
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = slo.recalculate_all().await {
                                warn!("SLO recompute failed: {e}");
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                    }
                }
            }
        })
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn supervised_task_restarts_after_panic() {
        let scheduler = Scheduler::with_restart_backoff(Duration::from_millis(10));
        let runs = Arc::new(AtomicU32::new(0));

        let runs_clone = runs.clone();
        let handle = scheduler.spawn_supervised("flaky", move |_shutdown| {
            let runs = runs_clone.clone();
            async move {
                if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first run dies");
                }
                // Second run completes cleanly
            }
        });

        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_supervised_tasks() {
        let scheduler = Scheduler::with_restart_backoff(Duration::from_millis(10));

        let handle = scheduler.spawn_supervised("looping", |mut shutdown| async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(3600)) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });

        scheduler.begin_shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task should end on shutdown")
            .unwrap();
    }

    struct CountingSlo {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SloRecalculator for CountingSlo {
        async fn recalculate_all(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn slo_job_ticks_until_shutdown() {
        let scheduler = Scheduler::with_restart_backoff(Duration::from_millis(10));
        let slo = Arc::new(CountingSlo {
            calls: AtomicU32::new(0),
        });

        let handle = scheduler.spawn_slo_job(Duration::from_millis(20), slo.clone());
        tokio::time::sleep(Duration::from_millis(90)).await;
        scheduler.begin_shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;

        assert!(slo.calls.load(Ordering::SeqCst) >= 2);
    }
}
