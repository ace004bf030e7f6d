//! Process-wide sliding-window limiter for provider requests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Enforces a requests-per-window and tokens-per-window budget.
///
/// A slot is reserved at admission time, so concurrent callers cannot both
/// squeeze through the last free slot.
pub struct RateLimiter {
    max_requests: usize,
    max_tokens: usize,
    window: Duration,
    entries: Mutex<VecDeque<(Instant, usize)>>,
}

impl RateLimiter {
    pub fn per_minute(max_requests: usize, max_tokens: usize) -> Self {
        Self::new(max_requests, max_tokens, Duration::from_secs(60))
    }

    pub fn new(max_requests: usize, max_tokens: usize, window: Duration) -> Self {
        Self {
            max_requests,
            max_tokens,
            window,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Reserves a slot for a request estimated at `tokens`, or returns false.
    ///
    /// A single request larger than the whole token budget is still admitted
    /// into an empty window.
    pub fn try_acquire(&self, tokens: usize) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        while let Some((at, _)) = entries.front() {
            if now.duration_since(*at) >= self.window {
                entries.pop_front();
            } else {
                break;
            }
        }

        if entries.len() >= self.max_requests {
            return false;
        }
        let used: usize = entries.iter().map(|(_, t)| t).sum();
        if !entries.is_empty() && used + tokens > self.max_tokens {
            return false;
        }
        entries.push_back((now, tokens));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_after_request_budget() {
        let limiter = RateLimiter::per_minute(3, 10_000);
        assert!(limiter.try_acquire(10));
        assert!(limiter.try_acquire(10));
        assert!(limiter.try_acquire(10));
        assert!(!limiter.try_acquire(10));
    }

    #[test]
    fn test_rejects_over_token_budget() {
        let limiter = RateLimiter::per_minute(100, 1_000);
        assert!(limiter.try_acquire(600));
        assert!(!limiter.try_acquire(500));
        assert!(limiter.try_acquire(400));
    }

    #[test]
    fn test_oversized_request_admitted_into_empty_window() {
        let limiter = RateLimiter::per_minute(10, 100);
        assert!(limiter.try_acquire(5_000));
        assert!(!limiter.try_acquire(1));
    }

    #[test]
    fn test_window_expiry_frees_slots() {
        let limiter = RateLimiter::new(1, 1_000, Duration::from_millis(30));
        assert!(limiter.try_acquire(1));
        assert!(!limiter.try_acquire(1));
        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.try_acquire(1));
    }
}
