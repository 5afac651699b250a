//! Fixed-cadence tick task.
//!
//! The poller owns a tokio task that calls a tick function on every interval
//! tick. Ticks do blocking store I/O and run consumer callbacks, so each one
//! runs on the blocking pool and the interval task awaits it before the next
//! tick. It never holds a strong reference to what it drives: the tick
//! returns `false` once its target is gone and the task ends. Dropping the
//! poller aborts the task; a tick already running finishes on its own.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior};

use crate::constants::MIN_POLL_INTERVAL_MS;
use crate::error::EventsError;

pub(crate) struct Poller {
    handle: JoinHandle<()>,
    period: Duration,
}

impl Poller {
    /// Spawn the tick task on the current tokio runtime.
    ///
    /// # Errors
    /// `EventsError::NoRuntime` when called outside a runtime.
    pub(crate) fn spawn(
        period: Duration,
        mut tick: impl FnMut() -> bool + Send + 'static,
    ) -> Result<Self, EventsError> {
        let runtime = Handle::try_current().map_err(|_| EventsError::NoRuntime)?;
        let period = period.max(Duration::from_millis(MIN_POLL_INTERVAL_MS));

        let handle = runtime.spawn(async move {
            let mut ticker = time::interval(period);
            // A slow drain must not cause a burst of catch-up ticks
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let outcome = task::spawn_blocking(move || {
                    let keep_going = tick();
                    (tick, keep_going)
                })
                .await;
                match outcome {
                    Ok((returned, true)) => tick = returned,
                    Ok((_, false)) => {
                        tracing::debug!("[queue] poll target dropped; poller exiting");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "[queue] poll tick failed; poller exiting");
                        break;
                    }
                }
            }
        });

        Ok(Self { handle, period })
    }

    pub(crate) fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
