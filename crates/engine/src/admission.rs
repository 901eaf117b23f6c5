//! Sliding-window admission control keyed by workflow id.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::AdmissionError;

const WINDOW: Duration = Duration::from_secs(60);

/// Admits at most `limit` invocations per workflow in any 60-second window.
/// Rejected attempts are not recorded, so they never extend a lockout.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn per_minute(limit: u32) -> Self {
        Self::with_window(limit, WINDOW)
    }

    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn try_acquire(&self, workflow_id: &str) -> Result<(), AdmissionError> {
        self.try_acquire_at(workflow_id, Instant::now())
    }

    /// Admission check against an explicit clock reading.
    pub fn try_acquire_at(&self, workflow_id: &str, now: Instant) -> Result<(), AdmissionError> {
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        let window = hits.entry(workflow_id.to_owned()).or_default();
        while window
            .front()
            .is_some_and(|&oldest| now.saturating_duration_since(oldest) >= self.window)
        {
            window.pop_front();
        }

        if window.len() >= self.limit as usize {
            let retry_after = window
                .front()
                .map(|&oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
                .unwrap_or(self.window);
            warn!(%workflow_id, limit = self.limit, ?retry_after, "invocation rejected by rate limit");
            return Err(AdmissionError::RateLimited {
                workflow_id: workflow_id.to_owned(),
                limit: self.limit,
                retry_after,
            });
        }
        window.push_back(now);
        Ok(())
    }
}
