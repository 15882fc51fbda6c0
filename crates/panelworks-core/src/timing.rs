//! Per-entry render timing state machine.
//!
//! Enforces the minimum inter-render interval `R`:
//!
//! - A render request inside the window is **deferred**: `awaiting_render`
//!   is set and nothing is rendered.
//! - The periodic tick resolves a deferral once the window has passed, so a
//!   deferred request is committed within `R + tick` of being due.
//! - Panels with an automatic-render period `D` are re-rendered by the tick
//!   once `D` has elapsed since their last commit.
//!
//! Times are monotonic milliseconds supplied by the caller.

use std::time::Duration;

/// Default minimum interval between committed renders of one panel.
pub const DEFAULT_MIN_RENDER_INTERVAL_MS: u64 = 5_000;

/// Render timing state carried by each registry entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderTiming {
    /// When the last render was committed. `None` before the first commit.
    pub last_render_ms: Option<u64>,
    /// A render was requested but deferred by the rate limit.
    pub awaiting_render: bool,
}

/// Outcome of a render request against the rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderGate {
    /// Outside the window: render now.
    Proceed,
    /// Inside the window: `awaiting_render` has been set.
    Deferred,
}

/// Why the tick wants a panel rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReason {
    /// A deferred request has become due.
    Deferred,
    /// The panel's automatic-render period has elapsed.
    Automatic,
}

impl RenderTiming {
    /// Timing for an entry whose document was committed at `now_ms`.
    pub fn committed_at(now_ms: u64) -> Self {
        Self {
            last_render_ms: Some(now_ms),
            awaiting_render: false,
        }
    }

    /// Earliest time the next render may be committed.
    pub fn next_allowed_ms(&self, min_interval_ms: u64) -> u64 {
        self.last_render_ms
            .map_or(0, |last| last.saturating_add(min_interval_ms))
    }

    pub fn window_open(&self, now_ms: u64, min_interval_ms: u64) -> bool {
        now_ms >= self.next_allowed_ms(min_interval_ms)
    }

    /// Check a render request against the rate limit.
    ///
    /// Deferring sets `awaiting_render`; proceeding clears it, since the
    /// render about to happen satisfies any outstanding request.
    pub fn gate(&mut self, now_ms: u64, min_interval_ms: u64) -> RenderGate {
        if self.window_open(now_ms, min_interval_ms) {
            self.awaiting_render = false;
            RenderGate::Proceed
        } else {
            self.awaiting_render = true;
            RenderGate::Deferred
        }
    }

    /// Record a committed render.
    pub fn commit(&mut self, now_ms: u64) {
        self.last_render_ms = Some(now_ms);
        self.awaiting_render = false;
    }

    /// Decide whether the periodic tick should trigger a render.
    ///
    /// A due deferral takes precedence over the automatic period.
    pub fn tick(
        &self,
        now_ms: u64,
        min_interval_ms: u64,
        automatic: Option<Duration>,
    ) -> Option<TickReason> {
        if self.awaiting_render && self.window_open(now_ms, min_interval_ms) {
            return Some(TickReason::Deferred);
        }
        let period = automatic?;
        let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        let due = self
            .last_render_ms
            .is_none_or(|last| now_ms >= last.saturating_add(period_ms));
        due.then_some(TickReason::Automatic)
    }
}

/// Default tick interval: half the render interval, never zero.
pub fn default_tick_interval_ms(min_interval_ms: u64) -> u64 {
    (min_interval_ms / 2).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: u64 = 5_000;

    #[test]
    fn first_request_proceeds() {
        let mut t = RenderTiming::default();
        assert_eq!(t.gate(0, R), RenderGate::Proceed);
        assert!(!t.awaiting_render);
    }

    #[test]
    fn request_inside_window_is_deferred() {
        let mut t = RenderTiming::committed_at(0);
        assert_eq!(t.gate(1_000, R), RenderGate::Deferred);
        assert!(t.awaiting_render);
        // Deferral does not move the window.
        assert_eq!(t.last_render_ms, Some(0));
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let mut t = RenderTiming::committed_at(1_000);
        assert_eq!(t.gate(5_999, R), RenderGate::Deferred);
        assert_eq!(t.gate(6_000, R), RenderGate::Proceed);
        assert!(!t.awaiting_render);
    }

    #[test]
    fn commit_clears_awaiting() {
        let mut t = RenderTiming::committed_at(0);
        t.gate(100, R);
        t.commit(5_000);
        assert_eq!(t, RenderTiming::committed_at(5_000));
    }

    /// Trigger at 0 commits, trigger at 1000 defers, tick at 2500 keeps
    /// waiting, tick at 5000 resolves.
    #[test]
    fn deferral_resolved_by_tick_scenario() {
        let mut t = RenderTiming::default();
        assert_eq!(t.gate(0, R), RenderGate::Proceed);
        t.commit(0);

        assert_eq!(t.gate(1_000, R), RenderGate::Deferred);
        assert_eq!(t.tick(2_500, R, None), None);
        assert_eq!(t.tick(5_000, R, None), Some(TickReason::Deferred));
        assert_eq!(t.gate(5_000, R), RenderGate::Proceed);
    }

    #[test]
    fn tick_idle_without_request_or_period() {
        let t = RenderTiming::committed_at(0);
        assert_eq!(t.tick(100_000, R, None), None);
    }

    #[test]
    fn automatic_period_triggers_tick() {
        let t = RenderTiming::committed_at(10_000);
        let period = Some(Duration::from_secs(30));
        assert_eq!(t.tick(39_999, R, period), None);
        assert_eq!(t.tick(40_000, R, period), Some(TickReason::Automatic));
    }

    #[test]
    fn deferral_wins_over_automatic() {
        let mut t = RenderTiming::committed_at(0);
        t.gate(10, R);
        assert_eq!(
            t.tick(6_000, R, Some(Duration::from_secs(1))),
            Some(TickReason::Deferred)
        );
    }

    #[test]
    fn default_tick_is_half_interval() {
        assert_eq!(default_tick_interval_ms(5_000), 2_500);
        assert_eq!(default_tick_interval_ms(1), 1);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Commits driven through the gate are never closer than R.
        #[test]
        fn commits_respect_min_interval(
            min_interval in 1u64..10_000,
            mut requests in proptest::collection::vec(0u64..100_000, 1..50),
        ) {
            requests.sort_unstable();
            let mut t = RenderTiming::default();
            let mut commits: Vec<u64> = Vec::new();
            for now in requests {
                if t.gate(now, min_interval) == RenderGate::Proceed {
                    t.commit(now);
                    commits.push(now);
                }
            }
            for pair in commits.windows(2) {
                prop_assert!(pair[1] - pair[0] >= min_interval);
            }
        }

        /// Any deferred request is due again by the time the window closes.
        #[test]
        fn deferred_request_becomes_due(
            min_interval in 1u64..10_000,
            last in 0u64..100_000,
            offset in 0u64..10_000,
        ) {
            let mut t = RenderTiming::committed_at(last);
            let now = last + offset % min_interval;
            prop_assert_eq!(t.gate(now, min_interval), RenderGate::Deferred);
            prop_assert_eq!(
                t.tick(last + min_interval, min_interval, None),
                Some(TickReason::Deferred)
            );
        }
    }
}
