use pagepulse_types::entries::{LongTaskEntry, NetworkRequestEntry};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STEP_MS: f64 = 50.0;
pub const DEFAULT_MAX_ACTIVE_REQUESTS: usize = 2;

/// Half-open span `[start, end)` with no long task and low network activity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuietWindow {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuietWindowSearch {
    pub step_ms: f64,
    pub max_active_requests: usize,
}

impl Default for QuietWindowSearch {
    fn default() -> Self {
        Self {
            step_ms: DEFAULT_STEP_MS,
            max_active_requests: DEFAULT_MAX_ACTIVE_REQUESTS,
        }
    }
}

impl QuietWindowSearch {
    pub fn new(step_ms: f64, max_active_requests: usize) -> Self {
        Self {
            step_ms,
            max_active_requests,
        }
    }

    /// Earliest window of `duration` at or after `start_time` that ends no later than `now`.
    pub fn find(
        &self,
        start_time: f64,
        duration: f64,
        now: f64,
        long_tasks: &[LongTaskEntry],
        requests: &[NetworkRequestEntry],
    ) -> Option<QuietWindow> {
        if !(self.step_ms > 0.0) || !start_time.is_finite() || !duration.is_finite() {
            return None;
        }

        let mut step = 0u64;
        loop {
            let time = start_time + step as f64 * self.step_ms;
            let end = time + duration;
            if end > now {
                return None;
            }
            if self.is_quiet(time, end, long_tasks, requests) {
                return Some(QuietWindow { start: time, end });
            }
            step += 1;
        }
    }

    fn is_quiet(
        &self,
        start: f64,
        end: f64,
        long_tasks: &[LongTaskEntry],
        requests: &[NetworkRequestEntry],
    ) -> bool {
        let task_in_window = long_tasks
            .iter()
            .any(|task| task.start_time >= start && task.start_time < end);
        if task_in_window {
            return false;
        }
        requests
            .iter()
            .filter(|request| request.overlaps(start, end))
            .count()
            <= self.max_active_requests
    }
}

/// Searches with the default 50ms step and two-request allowance.
pub fn find_quiet_window(
    start_time: f64,
    duration: f64,
    now: f64,
    long_tasks: &[LongTaskEntry],
    requests: &[NetworkRequestEntry],
) -> Option<QuietWindow> {
    QuietWindowSearch::default().find(start_time, duration, now, long_tasks, requests)
}

/// Most recently recorded long task that started before `end_time`.
pub fn find_last_long_task_before(end_time: f64, long_tasks: &[LongTaskEntry]) -> Option<&LongTaskEntry> {
    long_tasks
        .iter()
        .rev()
        .find(|task| task.start_time < end_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_timeline_is_quiet_immediately() {
        for (start, now) in [(0.0, 5_000.0), (500.0, 9_000.0), (1_234.5, 6_234.5)] {
            let window = find_quiet_window(start, 5_000.0, now, &[], &[]).expect("quiet window");
            assert_eq!(window, QuietWindow { start, end: start + 5_000.0 });
        }
    }

    #[test]
    fn window_must_end_before_now() {
        assert!(find_quiet_window(500.0, 5_000.0, 5_499.0, &[], &[]).is_none());
    }

    #[test]
    fn long_task_in_window_moves_search_forward() {
        let tasks = [LongTaskEntry::new(1_000.0, 5_000.0)];
        let window = find_quiet_window(1_000.0, 5_000.0, 20_000.0, &tasks, &[]).expect("window");
        assert_eq!(window.start, 1_050.0);

        // Only the first candidate fits before `now`, and it is blocked.
        assert!(find_quiet_window(1_000.0, 5_000.0, 6_020.0, &tasks, &[]).is_none());
    }

    #[test]
    fn busy_network_blocks_window() {
        let requests = [
            NetworkRequestEntry::new(0.0, 1_200.0),
            NetworkRequestEntry::new(100.0, 1_000.0),
            NetworkRequestEntry::new(200.0, 1_100.0),
        ];
        let window = find_quiet_window(0.0, 500.0, 10_000.0, &[], &requests).expect("window");
        // Two requests are tolerated once the shortest one completes.
        assert_eq!(window.start, 1_000.0);

        let strict = QuietWindowSearch::new(50.0, 0);
        let window = strict
            .find(0.0, 500.0, 10_000.0, &[], &requests)
            .expect("window");
        assert_eq!(window.start, 1_200.0);
    }

    #[test]
    fn invalid_step_finds_nothing() {
        let search = QuietWindowSearch::new(0.0, 2);
        assert!(search.find(0.0, 100.0, 1_000.0, &[], &[]).is_none());
        assert!(find_quiet_window(f64::NAN, 100.0, 1_000.0, &[], &[]).is_none());
    }

    #[test]
    fn last_long_task_before_scans_from_most_recent() {
        let tasks = [
            LongTaskEntry::new(10.0, 60.0),
            LongTaskEntry::new(50.0, 60.0),
            LongTaskEntry::new(90.0, 60.0),
        ];
        let found = find_last_long_task_before(60.0, &tasks).expect("task");
        assert_eq!(found.start_time, 50.0);
        assert!(find_last_long_task_before(5.0, &tasks).is_none());
        assert!(find_last_long_task_before(100.0, &[]).is_none());
    }
}
