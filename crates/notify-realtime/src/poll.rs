//! REST polling used once push has failed.

use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

use crate::api::{ListPage, ListQuery, NotificationApi};
use crate::types::{ConnectionState, Result};

/// Result of one poll round, handed back to the session task.
#[derive(Debug)]
pub(crate) struct PollOutcome {
    pub unread: u32,
    pub page: Option<ListPage>,
}

/// Poll timer plus the last unread count observed through it.
pub(crate) struct PollFallback {
    period: Duration,
    always_list: bool,
    page_size: u32,
    timer: Option<Interval>,
    last_unread: Option<u32>,
    in_flight: bool,
}

impl PollFallback {
    pub(crate) fn new(period: Duration, always_list: bool, page_size: u32) -> Self {
        Self {
            period,
            always_list,
            page_size,
            timer: None,
            last_unread: None,
            in_flight: false,
        }
    }

    /// Start polling. The first round fires immediately. No-op if already active.
    pub(crate) fn activate(&mut self) {
        if self.timer.is_some() {
            return;
        }
        let mut timer = tokio::time::interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.timer = Some(timer);
    }

    /// Stop polling. A round still in flight is abandoned by the caller.
    pub(crate) fn deactivate(&mut self) {
        self.timer = None;
        self.in_flight = false;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.timer.is_some()
    }

    /// Re-checked when the timer fires, since state may have moved on since
    /// it was scheduled.
    pub(crate) fn should_fire(&self, state: ConnectionState) -> bool {
        self.is_active() && state != ConnectionState::Connected && !self.in_flight
    }

    /// Mark a round as started and return the inputs the round needs.
    pub(crate) fn begin(&mut self) -> PollRound {
        self.in_flight = true;
        PollRound {
            last_unread: self.last_unread,
            always_list: self.always_list,
            page_size: self.page_size,
        }
    }

    /// Record a finished round. Returns `true` if the unread count changed.
    pub(crate) fn finish(&mut self, unread: Option<u32>) -> bool {
        self.in_flight = false;
        let Some(unread) = unread else {
            return false;
        };
        let changed = self.last_unread != Some(unread);
        self.last_unread = Some(unread);
        changed
    }

    pub(crate) fn timer_mut(&mut self) -> &mut Option<Interval> {
        &mut self.timer
    }
}

/// Inputs for one poll round, copied out so the round can run off the session task.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PollRound {
    last_unread: Option<u32>,
    always_list: bool,
    page_size: u32,
}

impl PollRound {
    /// Fetch the list when the count rose, or on every non-zero count when
    /// `always_list` is set.
    fn wants_list(&self, unread: u32) -> bool {
        let rose = match self.last_unread {
            Some(prev) => unread > prev,
            None => unread > 0,
        };
        rose || (self.always_list && unread > 0)
    }

    pub(crate) async fn run(self, api: NotificationApi) -> Result<PollOutcome> {
        let unread = api.unread_count().await?;
        let page = if self.wants_list(unread) {
            let query = ListQuery {
                per_page: self.page_size,
                ..Default::default()
            };
            Some(api.list(&query).await?)
        } else {
            None
        };
        debug!(unread, fetched_list = page.is_some(), "poll round complete");
        Ok(PollOutcome { unread, page })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(last_unread: Option<u32>, always_list: bool) -> PollRound {
        PollRound {
            last_unread,
            always_list,
            page_size: 20,
        }
    }

    #[test]
    fn list_fetched_when_count_rises() {
        assert!(round(None, false).wants_list(1));
        assert!(round(Some(2), false).wants_list(3));
        assert!(!round(Some(3), false).wants_list(3));
        assert!(!round(Some(3), false).wants_list(1));
        assert!(!round(None, false).wants_list(0));
    }

    #[test]
    fn always_list_fetches_on_any_nonzero_count() {
        assert!(round(Some(3), true).wants_list(3));
        assert!(round(Some(3), true).wants_list(1));
        assert!(!round(Some(3), true).wants_list(0));
    }

    #[tokio::test(start_paused = true)]
    async fn never_fires_while_connected() {
        let mut poll = PollFallback::new(Duration::from_secs(30), false, 20);
        assert!(!poll.should_fire(ConnectionState::Failed));

        poll.activate();
        assert!(poll.should_fire(ConnectionState::Failed));
        assert!(poll.should_fire(ConnectionState::Connecting));
        assert!(!poll.should_fire(ConnectionState::Connected));

        poll.deactivate();
        assert!(!poll.should_fire(ConnectionState::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_rounds_are_suppressed() {
        let mut poll = PollFallback::new(Duration::from_secs(30), false, 20);
        poll.activate();
        let _round = poll.begin();
        assert!(!poll.should_fire(ConnectionState::Failed));
        assert!(poll.finish(Some(2)));
        assert!(poll.should_fire(ConnectionState::Failed));
        assert!(!poll.finish(Some(2)));
        assert!(!poll.finish(None));
    }

    #[tokio::test(start_paused = true)]
    async fn activate_is_idempotent_and_fires_immediately() {
        let mut poll = PollFallback::new(Duration::from_secs(30), false, 20);
        poll.activate();
        poll.activate();
        let started = tokio::time::Instant::now();
        crate::heartbeat::next_tick(poll.timer_mut()).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
