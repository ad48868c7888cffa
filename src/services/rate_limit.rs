//! Keyed request-interval limiting for outbound service calls.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A shared limiter holding one schedule per service key.
///
/// Each key admits one call per `1/rps` seconds; callers await their slot
/// before issuing the request. `rps <= 0` disables limiting for that key.
#[derive(Debug, Default)]
pub struct RateLimiter {
    state: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    /// Create an empty limiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a call under `key` is allowed at `rps` requests/second.
    pub async fn acquire(&self, key: &str, rps: f64) {
        if rps <= 0.0 {
            return;
        }
        let interval = Duration::from_secs_f64(1.0 / rps);
        let wait = {
            let mut state = self.state.lock().unwrap();
            let now = Instant::now();
            let next = state.get(key).copied().unwrap_or(now);
            if now < next {
                state.insert(key.to_string(), next + interval);
                next - now
            } else {
                state.insert(key.to_string(), now + interval);
                Duration::ZERO
            }
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}
