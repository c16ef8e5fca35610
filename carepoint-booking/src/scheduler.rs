use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Shortest period a scheduler will tick at.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Work run on every tick. Failures are the job's to log; a tick never ends
/// the loop.
pub type RefreshJob = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Cancelable periodic refresh.
pub trait RefreshScheduler: Send {
    /// Start ticking. Replaces any loop already running.
    fn start(&mut self, job: RefreshJob);

    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Fixed-period scheduler on the tokio runtime. The first tick fires one
/// period after `start`, and a slow tick delays the next one instead of
/// bunching missed ticks.
pub struct IntervalScheduler {
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl IntervalScheduler {
    /// Periods shorter than [`MIN_PERIOD`] are raised to it.
    pub fn new(period: Duration) -> Self {
        if period < MIN_PERIOD {
            warn!("Refresh period {:?} is too short, using {:?}", period, MIN_PERIOD);
        }
        Self {
            period: period.max(MIN_PERIOD),
            handle: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl RefreshScheduler for IntervalScheduler {
    fn start(&mut self, job: RefreshJob) {
        self.stop();

        let period = self.period;
        info!("Refresh loop started, every {:?}", period);
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                debug!("Refresh tick");
                job().await;
            }
        }));
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            info!("Refresh loop stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
