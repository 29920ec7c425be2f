//! Scheduling of registry refresh passes.
//!
//! A pass runs every `interval` and immediately whenever the network comes
//! back up. At most one pass runs at a time; a trigger arriving while one is
//! in progress is dropped rather than queued.

use clientauth_authentication::{RefreshOutcome, RegistryRefresher};
use clientauth_core::effects::{NetworkMonitor, NetworkState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Shortest accepted refresh interval.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

fn clamp_interval(interval: Duration) -> Duration {
    if interval < MIN_REFRESH_INTERVAL {
        tracing::warn!(
            interval_ms = interval.as_millis() as u64,
            "Refresh interval too short, using the minimum"
        );
        MIN_REFRESH_INTERVAL
    } else {
        interval
    }
}

struct RunningLoop {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the refresh schedule for one [`RegistryRefresher`].
pub struct BackgroundRefresh {
    refresher: Arc<RegistryRefresher>,
    network: Arc<NetworkMonitor>,
    interval: Mutex<Duration>,
    in_progress: Arc<tokio::sync::Mutex<()>>,
    running: Mutex<Option<RunningLoop>>,
}

impl BackgroundRefresh {
    /// Create a stopped schedule. Intervals below [`MIN_REFRESH_INTERVAL`]
    /// are raised to it.
    pub fn new(
        refresher: Arc<RegistryRefresher>,
        network: Arc<NetworkMonitor>,
        interval: Duration,
    ) -> Self {
        Self {
            refresher,
            network,
            interval: Mutex::new(clamp_interval(interval)),
            in_progress: Arc::new(tokio::sync::Mutex::new(())),
            running: Mutex::new(None),
        }
    }

    /// Start the schedule. Returns false if it was already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }

        let interval = *self.interval.lock();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(refresh_loop(
            self.refresher.clone(),
            self.in_progress.clone(),
            self.network.subscribe(),
            shutdown_rx,
            interval,
        ));
        *running = Some(RunningLoop {
            shutdown_tx,
            handle,
        });
        tracing::info!(interval_secs = interval.as_secs(), "Started background registry refresh");
        true
    }

    /// Stop the schedule. A pass already in progress runs to completion.
    /// Returns false if it was not running.
    pub fn stop(&self) -> bool {
        let Some(running) = self.running.lock().take() else {
            return false;
        };
        let _ = running.shutdown_tx.send(true);
        running.handle.abort();
        tracing::info!("Stopped background registry refresh");
        true
    }

    /// Whether the schedule is started.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Current interval between scheduled passes.
    pub fn interval(&self) -> Duration {
        *self.interval.lock()
    }

    /// Change the interval, restarting the schedule if it is running.
    /// Intervals below [`MIN_REFRESH_INTERVAL`] are raised to it.
    pub fn set_interval(&self, interval: Duration) {
        let interval = clamp_interval(interval);
        let previous = std::mem::replace(&mut *self.interval.lock(), interval);
        if previous != interval && self.stop() {
            self.start();
        }
    }

    /// Run a pass now unless one is already in progress.
    pub async fn trigger(&self) -> Option<RefreshOutcome> {
        run_exclusive(&self.refresher, &self.in_progress).await
    }
}

impl Drop for BackgroundRefresh {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            let _ = running.shutdown_tx.send(true);
            running.handle.abort();
        }
    }
}

impl std::fmt::Debug for BackgroundRefresh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRefresh")
            .field("interval", &self.interval())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

async fn run_exclusive(
    refresher: &RegistryRefresher,
    in_progress: &tokio::sync::Mutex<()>,
) -> Option<RefreshOutcome> {
    let Ok(_guard) = in_progress.try_lock() else {
        tracing::debug!("Registry refresh already in progress, dropping trigger");
        return None;
    };
    Some(refresher.run_once().await)
}

fn spawn_pass(refresher: &Arc<RegistryRefresher>, in_progress: &Arc<tokio::sync::Mutex<()>>) {
    let refresher = refresher.clone();
    let in_progress = in_progress.clone();
    tokio::spawn(async move {
        run_exclusive(&refresher, &in_progress).await;
    });
}

async fn refresh_loop(
    refresher: Arc<RegistryRefresher>,
    in_progress: Arc<tokio::sync::Mutex<()>>,
    mut network_rx: watch::Receiver<NetworkState>,
    mut shutdown_rx: watch::Receiver<bool>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {
                tracing::debug!("Scheduled registry refresh");
                spawn_pass(&refresher, &in_progress);
            }
            changed = network_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if network_rx.borrow_and_update().is_up() {
                    tracing::debug!("Network is up, refreshing registries");
                    spawn_pass(&refresher, &in_progress);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clientauth_authentication::{CertificateRegistry, ThingRegistry};
    use clientauth_core::effects::{CloudError, CloudIdentityEffects};
    use clientauth_core::TrustWindow;
    use clientauth_testkit::{FakeCloudIdentity, ManualClock};

    const HOUR: Duration = Duration::from_secs(60 * 60);

    /// Cloud whose thing listing takes a while.
    struct SlowListing(FakeCloudIdentity);

    #[async_trait]
    impl CloudIdentityEffects for SlowListing {
        async fn get_active_certificate_id(&self, pem: &str) -> Result<Option<String>, CloudError> {
            self.0.get_active_certificate_id(pem).await
        }

        async fn is_thing_attached_to_certificate(
            &self,
            thing_name: &str,
            certificate_id: &str,
        ) -> Result<bool, CloudError> {
            self.0
                .is_thing_attached_to_certificate(thing_name, certificate_id)
                .await
        }

        async fn get_things_associated_with_core_device(&self) -> Result<Vec<String>, CloudError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            self.0.get_things_associated_with_core_device().await
        }
    }

    fn background(
        cloud: Arc<dyn CloudIdentityEffects>,
        initial: NetworkState,
    ) -> (BackgroundRefresh, Arc<NetworkMonitor>) {
        let clock = Arc::new(ManualClock::starting_now());
        let network = Arc::new(NetworkMonitor::new(initial));
        let window = TrustWindow::from_hours(24);
        let certificates = Arc::new(CertificateRegistry::new(cloud.clone(), clock.clone(), window));
        let things = Arc::new(ThingRegistry::new(cloud.clone(), clock.clone(), window));
        let refresher = Arc::new(RegistryRefresher::new(
            cloud,
            clock,
            network.clone(),
            certificates,
            things,
        ));
        (BackgroundRefresh::new(refresher, network.clone(), HOUR), network)
    }

    #[tokio::test(start_paused = true)]
    async fn runs_on_schedule() {
        let cloud = Arc::new(FakeCloudIdentity::new());
        let (bg, _network) = background(cloud.clone(), NetworkState::Up);

        assert!(bg.start());
        tokio::time::sleep(HOUR / 2).await;
        assert_eq!(cloud.list_calls(), 0);

        tokio::time::sleep(HOUR).await;
        assert_eq!(cloud.list_calls(), 1);

        tokio::time::sleep(HOUR).await;
        assert_eq!(cloud.list_calls(), 2);
        assert!(bg.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn network_up_triggers_an_immediate_pass() {
        let cloud = Arc::new(FakeCloudIdentity::new());
        let (bg, network) = background(cloud.clone(), NetworkState::Down);
        bg.start();

        network.set_state(NetworkState::Up);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cloud.list_calls(), 1);

        network.set_state(NetworkState::Down);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cloud.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_pass_is_skipped_while_network_is_down() {
        let cloud = Arc::new(FakeCloudIdentity::new());
        let (bg, _network) = background(cloud.clone(), NetworkState::Down);
        bg.start();

        tokio::time::sleep(HOUR * 3).await;
        assert_eq!(cloud.list_calls(), 0);
        assert!(bg.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_trigger_is_dropped() {
        let cloud = Arc::new(SlowListing(FakeCloudIdentity::new()));
        let (bg, _network) = background(cloud.clone(), NetworkState::Up);

        let (first, second) = tokio::join!(bg.trigger(), bg.trigger());
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(cloud.0.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn network_recovery_after_the_loop_is_idle_triggers_a_pass() {
        let cloud = Arc::new(FakeCloudIdentity::new());
        let (bg, network) = background(cloud.clone(), NetworkState::Down);
        bg.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        network.set_state(NetworkState::Up);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cloud.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_raised_to_the_minimum() {
        let cloud = Arc::new(FakeCloudIdentity::new());
        let (bg, _network) = background(cloud.clone(), NetworkState::Up);

        bg.set_interval(Duration::ZERO);
        assert_eq!(bg.interval(), MIN_REFRESH_INTERVAL);
        assert!(bg.start());

        tokio::time::sleep(MIN_REFRESH_INTERVAL * 3 + Duration::from_millis(500)).await;
        assert_eq!(cloud.list_calls(), 3);
        bg.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_are_idempotent() {
        let cloud = Arc::new(FakeCloudIdentity::new());
        let (bg, _network) = background(cloud.clone(), NetworkState::Up);

        assert!(bg.start());
        assert!(!bg.start());
        assert!(bg.stop());
        assert!(!bg.stop());

        tokio::time::sleep(HOUR * 2).await;
        assert_eq!(cloud.list_calls(), 0);
    }
}
