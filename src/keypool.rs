//! Credential pool with random rotation and monotone removal.
//!
//! Membership only shrinks during a run: a credential proven invalid is
//! removed and never re-added until the caller rebuilds the pool from raw
//! key text. All mutation goes through the pool's own lock so a removal is
//! immediately visible to every in-flight request resolution.

use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;

use crate::error::ScreenError;

/// Injectable randomness so credential selection and jitter are
/// deterministic in tests.
pub trait RandomSource: Send + Sync {
    /// Uniform index in `[0, len)`. `len` must be non-zero.
    fn pick_index(&self, len: usize) -> usize;

    /// Uniform duration in `[0, max)`.
    fn jitter(&self, max: Duration) -> Duration;
}

/// Production randomness via the thread-local RNG.
pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn pick_index(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }

    fn jitter(&self, max: Duration) -> Duration {
        let max_ms = max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

/// The set of currently-trusted API credentials.
pub struct CredentialPool {
    inner: Mutex<PoolInner>,
}

struct PoolInner {
    keys: Vec<String>,
    initial_len: usize,
}

impl CredentialPool {
    pub fn new(keys: Vec<String>) -> Self {
        let keys = dedup(keys);
        let initial_len = keys.len();
        Self {
            inner: Mutex::new(PoolInner { keys, initial_len }),
        }
    }

    /// Rebuild the pool wholesale from a new key set. Resets the removal
    /// accounting.
    pub fn reset(&self, keys: Vec<String>) {
        let keys = dedup(keys);
        let mut inner = self.lock();
        inner.initial_len = keys.len();
        inner.keys = keys;
    }

    /// Select a credential uniformly at random. Repeated picks may return
    /// the same credential.
    pub fn pick(&self, rng: &dyn RandomSource) -> Result<String, ScreenError> {
        let inner = self.lock();
        if inner.keys.is_empty() {
            return Err(ScreenError::PoolExhausted);
        }
        let idx = rng.pick_index(inner.keys.len());
        Ok(inner.keys[idx].clone())
    }

    /// Remove a credential proven invalid. Idempotent.
    pub fn remove(&self, key: &str) {
        let mut inner = self.lock();
        inner.keys.retain(|k| k != key);
    }

    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().keys.is_empty()
    }

    /// Credentials removed since the pool was last built.
    pub fn removed_count(&self) -> u32 {
        let inner = self.lock();
        (inner.initial_len - inner.keys.len()) as u32
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        self.inner.lock().expect("credential pool lock poisoned")
    }
}

fn dedup(keys: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}

/// Parse raw credential text as edited by the caller: keys separated by
/// newlines, commas, or spaces; anything not shaped like an API key is
/// dropped.
pub fn parse_key_text(text: &str) -> Vec<String> {
    dedup(
        text.split(|c: char| c == '\n' || c == ',' || c == ' ' || c == '\r')
            .map(str::trim)
            .filter(|k| k.len() > 10 && k.starts_with("AIza"))
            .map(str::to_string)
            .collect(),
    )
}

/// Shorten a credential for log output.
pub fn redact_key(key: &str) -> String {
    let prefix: String = key.chars().take(8).collect();
    format!("{prefix}…")
}
