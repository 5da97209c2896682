//! Periodic pool health checks.
//!
//! # Invariants
//! - One background thread per monitor; it exits promptly on `stop()`.
//! - Each pool is checked independently; a failing pool never delays or
//!   marks another pool.

use crate::db::pool::ConnectionPool;
use log::{debug, error, info};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

pub struct HealthMonitor {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Spawns the monitor thread. The first check runs after one `interval`.
    pub fn start(pools: Vec<ConnectionPool>, interval: Duration) -> std::io::Result<Self> {
        let signal = Arc::new(StopSignal::default());
        let worker_signal = Arc::clone(&signal);

        let handle = std::thread::Builder::new()
            .name("pool-health".to_string())
            .spawn(move || run(&pools, interval, &worker_signal))?;

        info!(
            "event=health_monitor module=routing status=start interval_ms={}",
            interval.as_millis()
        );
        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Stops the thread and waits for it. Idempotent.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        *self.signal.stopped.lock() = true;
        self.signal.wake.notify_all();
        if handle.join().is_err() {
            error!("event=health_monitor module=routing status=error error=worker_panicked");
            return;
        }
        info!("event=health_monitor module=routing status=stopped");
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(pools: &[ConnectionPool], interval: Duration, signal: &StopSignal) {
    let mut stopped = signal.stopped.lock();
    loop {
        if *stopped {
            return;
        }
        signal.wake.wait_for(&mut stopped, interval);
        if *stopped {
            return;
        }

        drop(stopped);
        for pool in pools {
            let healthy = pool.health_check();
            debug!(
                "event=pool_health module=routing status=checked pool={} healthy={}",
                pool.name(),
                healthy
            );
        }
        stopped = signal.stopped.lock();
    }
}
