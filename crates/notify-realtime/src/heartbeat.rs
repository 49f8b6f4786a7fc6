//! Keep-alive timer for the push channel.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// What the session should do on a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeartbeatTick {
    /// Send a `heartbeat` frame.
    Send,
    /// No ack within the configured number of intervals; treat the socket as dead.
    Stale,
}

/// Emits keep-alive ticks while connected.
///
/// Acks only reset the ack marker. Staleness is reported solely when
/// `timeout_ticks` is configured; otherwise dead peers are left to the
/// transport's own close signal.
pub(crate) struct HeartbeatMonitor {
    period: Duration,
    timeout_ticks: Option<u32>,
    timer: Option<Interval>,
    unacked_ticks: u32,
    last_ack: Option<Instant>,
}

impl HeartbeatMonitor {
    pub(crate) fn new(period: Duration, timeout_ticks: Option<u32>) -> Self {
        Self {
            period,
            timeout_ticks,
            timer: None,
            unacked_ticks: 0,
            last_ack: None,
        }
    }

    /// Start (or restart) the timer. The first tick fires one period from now.
    pub(crate) fn start(&mut self) {
        let mut timer = tokio::time::interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.timer = Some(timer);
        self.unacked_ticks = 0;
        self.last_ack = None;
    }

    pub(crate) fn stop(&mut self) {
        self.timer = None;
        self.unacked_ticks = 0;
    }

    pub(crate) fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    pub(crate) fn on_ack(&mut self) {
        self.last_ack = Some(Instant::now());
        self.unacked_ticks = 0;
    }

    pub(crate) fn last_ack(&self) -> Option<Instant> {
        self.last_ack
    }

    pub(crate) fn on_tick(&mut self) -> HeartbeatTick {
        if let Some(limit) = self.timeout_ticks {
            if self.unacked_ticks >= limit {
                return HeartbeatTick::Stale;
            }
        }
        self.unacked_ticks += 1;
        HeartbeatTick::Send
    }

    pub(crate) fn timer_mut(&mut self) -> &mut Option<Interval> {
        &mut self.timer
    }
}

/// Wait for the next tick of an optional interval, or pend forever if it is unset.
///
/// Free function so the borrow stays on the timer field inside `tokio::select!`.
pub(crate) async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}
