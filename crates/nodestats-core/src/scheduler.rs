//! Repeating summary refresh.
//!
//! The scheduler owns at most one timer task. Reconfiguring aborts the old
//! task before spawning the new one, so two timers can never fire for the
//! same scheduler. Fetches are spawned and report back through the session
//! queue tagged with a sequence number; they are never cancelled.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::event::SessionEvent;
use crate::query::Query;
use crate::service::StatsService;

/// Owner of the summary refresh timer.
pub struct RefreshScheduler {
    service: Arc<dyn StatsService>,
    events: mpsc::UnboundedSender<SessionEvent>,
    interval_ms: u64,
    timer: Option<JoinHandle<()>>,
    next_seq: u64,
}

impl RefreshScheduler {
    /// A scheduler with no timer armed.
    pub fn new(service: Arc<dyn StatsService>, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            service,
            events,
            interval_ms: 0,
            timer: None,
            next_seq: 0,
        }
    }

    /// Replace the refresh interval. `0` leaves no timer armed.
    ///
    /// The timer first fires one full interval after this call.
    pub fn configure(&mut self, interval_ms: u64) {
        self.cancel_timer();
        self.interval_ms = interval_ms;

        if interval_ms == 0 {
            debug!("Summary refresh disabled");
            return;
        }

        let period = Duration::from_millis(interval_ms);
        let events = self.events.clone();
        debug!(interval_ms, "Arming summary refresh timer");

        self.timer = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                trace!("Summary refresh tick");
                if events.send(SessionEvent::Tick).is_err() {
                    break;
                }
            }
        }));
    }

    /// Re-arm the timer at the last configured interval.
    pub fn rearm(&mut self) {
        self.configure(self.interval_ms);
    }

    /// Issue a summary fetch for `query`; returns its sequence number.
    pub fn reload(&mut self, query: &Query) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        let service = Arc::clone(&self.service);
        let events = self.events.clone();
        let query = query.clone();

        trace!(seq, sort = %query.sort_field, offset = query.offset, "Issuing summary fetch");
        tokio::spawn(async move {
            let result = service.fetch_summary(&query).await;
            // The session may already be gone; the result is moot then.
            let _ = events.send(SessionEvent::SummaryLoaded { seq, result });
        });
        seq
    }

    /// Cancel the timer. Idempotent; the interval is remembered for [`rearm`](Self::rearm).
    pub fn stop(&mut self) {
        self.cancel_timer();
    }

    /// Whether a repeating timer is armed.
    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Last configured interval in milliseconds.
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            debug!(interval_ms = self.interval_ms, "Cancelling summary refresh timer");
            timer.abort();
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeStatsService, page_of};
    use proptest::prelude::*;

    fn scheduler() -> (
        RefreshScheduler,
        mpsc::UnboundedReceiver<SessionEvent>,
        Arc<FakeStatsService>,
    ) {
        let service = Arc::new(FakeStatsService::with_page(page_of(&["a", "b"])));
        let (tx, rx) = mpsc::unbounded_channel();
        (RefreshScheduler::new(service.clone(), tx), rx, service)
    }

    async fn count_ticks(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> usize {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        let mut ticks = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, SessionEvent::Tick) {
                ticks += 1;
            }
        }
        ticks
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let (mut s, mut rx, _) = scheduler();
        s.configure(5000);
        assert!(s.is_armed());

        time::advance(Duration::from_millis(4999)).await;
        assert_eq!(count_ticks(&mut rx).await, 0);
        time::advance(Duration::from_millis(1)).await;
        assert_eq!(count_ticks(&mut rx).await, 1);
        time::advance(Duration::from_millis(5000)).await;
        assert_eq!(count_ticks(&mut rx).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_replaces_timer() {
        let (mut s, mut rx, _) = scheduler();
        s.configure(1000);
        s.configure(1000);

        time::advance(Duration::from_millis(1000)).await;
        assert_eq!(count_ticks(&mut rx).await, 1);

        s.configure(3000);
        time::advance(Duration::from_millis(2000)).await;
        assert_eq!(count_ticks(&mut rx).await, 0);
        time::advance(Duration::from_millis(1000)).await;
        assert_eq!(count_ticks(&mut rx).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_disarms() {
        let (mut s, mut rx, _) = scheduler();
        s.configure(1000);
        s.configure(0);
        assert!(!s.is_armed());

        time::advance(Duration::from_secs(60)).await;
        assert_eq!(count_ticks(&mut rx).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_rearm_restores() {
        let (mut s, mut rx, _) = scheduler();
        s.configure(2000);
        s.stop();
        s.stop();
        assert!(!s.is_armed());
        assert_eq!(s.interval_ms(), 2000);

        time::advance(Duration::from_secs(10)).await;
        assert_eq!(count_ticks(&mut rx).await, 0);

        s.rearm();
        time::advance(Duration::from_millis(2000)).await;
        assert_eq!(count_ticks(&mut rx).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_reports_sequenced_result() {
        let (mut s, mut rx, service) = scheduler();
        let first = s.reload(&Query::default());
        let second = s.reload(&Query::default());
        assert!(second > first);

        let mut seen = Vec::new();
        for _ in 0..2 {
            match rx.recv().await {
                Some(SessionEvent::SummaryLoaded { seq, result }) => {
                    assert_eq!(result.unwrap().data.len(), 2);
                    seen.push(seq);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![first, second]);
        assert_eq!(service.summary_calls(), 2);
        assert!(!s.is_armed());
    }

    proptest! {
        #[test]
        fn prop_configure_twice_leaves_one_timer(first in 0u64..20_000, second in 1u64..20_000) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            rt.block_on(async {
                let (mut s, mut rx, _) = scheduler();
                s.configure(first);
                s.configure(second);
                prop_assert!(s.is_armed());

                time::advance(Duration::from_millis(second)).await;
                prop_assert_eq!(count_ticks(&mut rx).await, 1);
                Ok(())
            })?;
        }

        #[test]
        fn prop_zero_leaves_no_timer(first in 0u64..20_000) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            rt.block_on(async {
                let (mut s, mut rx, _) = scheduler();
                s.configure(first);
                s.configure(0);
                prop_assert!(!s.is_armed());
                time::advance(Duration::from_millis(first.max(1) * 3)).await;
                prop_assert_eq!(count_ticks(&mut rx).await, 0);
                Ok(())
            })?;
        }
    }
}
