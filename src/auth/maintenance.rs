//! Background sweeps for idle sessions and elapsed account locks.

use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info};

use super::{config::AuthConfig, service::AuthService};

#[derive(Debug)]
pub struct MaintenanceScheduler {
    service: Arc<AuthService>,
    session_sweep_interval: Duration,
    lock_sweep_interval: Duration,
}

/// Owns the two sweep tasks. Dropping the handle leaves them running; call
/// [`shutdown`](Self::shutdown) to stop them.
#[derive(Debug)]
pub struct MaintenanceHandle {
    session_sweep: JoinHandle<()>,
    lock_sweep: JoinHandle<()>,
}

impl MaintenanceScheduler {
    #[must_use]
    pub fn new(service: Arc<AuthService>, config: &AuthConfig) -> Self {
        let config = config.normalize();
        Self {
            service,
            session_sweep_interval: config.session_sweep_interval(),
            lock_sweep_interval: config.lock_sweep_interval(),
        }
    }

    /// Start both sweeps on the current tokio runtime. The first pass of each
    /// runs immediately.
    #[must_use]
    pub fn spawn(self) -> MaintenanceHandle {
        info!(
            session_sweep_secs = self.session_sweep_interval.as_secs(),
            lock_sweep_secs = self.lock_sweep_interval.as_secs(),
            "starting maintenance sweeps"
        );
        MaintenanceHandle {
            session_sweep: spawn_session_sweep(
                Arc::clone(&self.service),
                self.session_sweep_interval,
            ),
            lock_sweep: spawn_lock_sweep(self.service, self.lock_sweep_interval),
        }
    }
}

impl MaintenanceHandle {
    pub fn shutdown(self) {
        self.session_sweep.abort();
        self.lock_sweep.abort();
        debug!("maintenance sweeps stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.session_sweep.is_finished() && !self.lock_sweep.is_finished()
    }
}

fn spawn_session_sweep(service: Arc<AuthService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let expired = service.expire_idle_sessions();
            debug!(expired, "session sweep finished");
        }
    })
}

fn spawn_lock_sweep(service: Arc<AuthService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match service.unlock_elapsed_accounts().await {
                Ok(unlocked) => debug!(unlocked, "lock sweep finished"),
                Err(err) => error!("lock sweep failed: {err:#}"),
            }
        }
    })
}
