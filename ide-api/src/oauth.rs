//! CSRF `state` tokens for the OAuth login redirect.

use rand::distr::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const STATE_TTL: Duration = Duration::from_secs(5 * 60);
const STATE_LEN: usize = 32;

/// Issued states and their expiry. Each state validates at most once.
pub struct OAuthStateStore {
    ttl: Duration,
    states: Mutex<HashMap<String, Instant>>,
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::with_ttl(STATE_TTL)
    }
}

impl OAuthStateStore {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn issue(&self) -> String {
        let state: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LEN)
            .map(char::from)
            .collect();

        let now = Instant::now();
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        // Abandoned logins never reach validate
        states.retain(|_, expires| *expires > now);
        states.insert(state.clone(), now + self.ttl);
        state
    }

    /// Consume `state`. Expired entries are purged on every call.
    pub fn validate(&self, state: &str) -> bool {
        let now = Instant::now();
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.retain(|_, expires| *expires > now);
        states.remove(state).is_some()
    }

    pub fn len(&self) -> usize {
        self.states.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
