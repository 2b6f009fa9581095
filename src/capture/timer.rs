use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Whole seconds since recording started, published once per second
///
/// The ticker task belongs to this value; dropping it stops the ticker.
pub(crate) struct ElapsedCounter {
    started_at: Instant,
    ticker: Option<JoinHandle<()>>,
    seconds: watch::Sender<u64>,
}

impl ElapsedCounter {
    /// Reset the published value to 0 and start ticking
    pub(crate) fn start(seconds: watch::Sender<u64>) -> Self {
        let started_at = Instant::now();
        seconds.send_replace(0);

        let tx = seconds.clone();
        let ticker = tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut interval = tokio::time::interval_at(started_at + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                tx.send_replace(started_at.elapsed().as_secs());
            }
        });

        Self {
            started_at,
            ticker: Some(ticker),
            seconds,
        }
    }

    /// Stop ticking and publish the exact final value
    pub(crate) fn stop(mut self) -> u64 {
        self.halt()
    }

    fn halt(&mut self) -> u64 {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        let elapsed = self.started_at.elapsed().as_secs();
        self.seconds.send_replace(elapsed);
        elapsed
    }
}

impl Drop for ElapsedCounter {
    fn drop(&mut self) {
        if self.ticker.is_some() {
            self.halt();
        }
    }
}

/// `m:ss`, as shown next to the recording indicator
pub fn format_elapsed(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
