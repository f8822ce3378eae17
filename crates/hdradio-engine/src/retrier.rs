//! Background follow-up work: subchannel lock retries and signal polling
//!
//! Both are plain timer tasks that post jobs back to the scheduler. They are
//! tied to an [`Epoch`] generation: a new tune, seek, subchannel request or
//! power off advances the epoch and everything armed under an older
//! generation quietly stops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use crate::scheduler::Job;

/// Generation counter for cancellable follow-up work
#[derive(Debug, Clone, Default)]
pub struct Epoch(Arc<AtomicU64>);

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Invalidate all outstanding work and return the new generation
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

/// Post the next subchannel check after `delay`
pub(crate) fn schedule_subchannel_check(
    jobs: UnboundedSender<Job>,
    delay: Duration,
    generation: u64,
    subchannel: i32,
    attempt: u32,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = jobs.send(Job::Subchannel {
            generation,
            subchannel,
            attempt,
        });
    });
}

/// Post a signal poll every `interval` until the epoch moves on
pub(crate) fn spawn_signal_poller(
    jobs: UnboundedSender<Job>,
    epoch: Epoch,
    interval: Duration,
    generation: u64,
) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if !epoch.is_current(generation) {
                break;
            }
            if jobs.send(Job::SignalPoll { generation }).is_err() {
                break;
            }
        }
        trace!("Signal poller for generation {} stopped", generation);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_epoch() {
        let epoch = Epoch::new();
        let first = epoch.current();
        assert!(epoch.is_current(first));
        let second = epoch.advance();
        assert_eq!(second, first + 1);
        assert!(!epoch.is_current(first));
        assert!(epoch.clone().is_current(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subchannel_check_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        schedule_subchannel_check(tx, Duration::from_millis(500), 7, 2, 3);

        let job = rx.recv().await.unwrap();
        assert!(matches!(
            job,
            Job::Subchannel {
                generation: 7,
                subchannel: 2,
                attempt: 3
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_poller_stops_on_new_epoch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let epoch = Epoch::new();
        let generation = epoch.current();
        spawn_signal_poller(tx, epoch.clone(), Duration::from_secs(10), generation);

        assert!(matches!(rx.recv().await, Some(Job::SignalPoll { .. })));
        assert!(matches!(rx.recv().await, Some(Job::SignalPoll { .. })));

        epoch.advance();
        // the poller exits and drops its sender
        assert!(rx.recv().await.is_none());
    }
}
