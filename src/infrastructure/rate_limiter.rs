//! Cross-process sliding-window rate limiter (C3).
//!
//! Workers are independent OS processes, so the teacher's in-process
//! `TokenBucketRateLimiter` (`Arc<Mutex<f64>>` tokens) can't serialize them.
//! State instead lives in a shared JSON file guarded by an advisory lock via
//! `fs4`, following the same reservation protocol as the worker's original
//! `_throttle_for_rate_limit`: open, lock, prune timestamps older than 60s,
//! admit-or-compute-wait, write, unlock — the lock is never held across a
//! sleep.

use crate::domain::ports::errors::RateLimiterError;
use fs4::FileExt;
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RateLimitState {
    timestamps: Vec<f64>,
}

/// Cross-process rate limiter sharing a JSON state file + advisory lock
/// under the logs directory, one reservation per call.
#[derive(Clone)]
pub struct FileRateLimiter {
    state_path: PathBuf,
    lock_path: PathBuf,
    requests_per_minute: u32,
}

impl FileRateLimiter {
    pub fn new(logs_dir: &Path, requests_per_minute: u32) -> Self {
        Self {
            state_path: logs_dir.join("api_rate_limit_state.json"),
            lock_path: logs_dir.join("api_rate_limit_state.lock"),
            requests_per_minute: requests_per_minute.max(1),
        }
    }

    /// Reserve one API call slot, blocking (via async sleep, not held locks)
    /// until the sliding 60-second window has room. Always staggers an
    /// admitted call by 2-3s jitter to avoid synchronized bursts across
    /// workers, matching the original throttle's behavior.
    pub async fn acquire(&self) -> Result<(), RateLimiterError> {
        loop {
            let this = self.clone();
            let (wait_seconds, approaching) = tokio::task::spawn_blocking(move || this.reserve_or_compute_wait())
                .await
                .expect("rate limiter lock task panicked")?;

            if wait_seconds > 0.0 {
                tracing::warn!(wait_seconds, "rate limit hit, waiting before API call");
                sleep(Duration::from_secs_f64(wait_seconds.min(5.0))).await;
                continue;
            }

            if approaching {
                tracing::warn!("rate limit approaching, throttling worker");
            }

            let jitter = rand::rng().random_range(2.0..3.0);
            sleep(Duration::from_secs_f64(jitter)).await;
            return Ok(());
        }
    }

    /// One lock-held critical section: prune, check capacity, either record
    /// a new reservation or compute how long the caller must wait.
    fn reserve_or_compute_wait(&self) -> Result<(f64, bool), RateLimiterError> {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lockfile = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(|source| RateLimiterError::Lock { path: self.lock_path.clone(), source })?;
        lockfile
            .lock_exclusive()
            .map_err(|source| RateLimiterError::Lock { path: self.lock_path.clone(), source })?;

        let result = (|| -> Result<(f64, bool), RateLimiterError> {
            let now = now_secs();
            let mut state = self.read_state()?;
            state.timestamps.retain(|t| now - *t < 60.0);

            let warn_threshold = (f64::from(self.requests_per_minute) * 0.8).max(1.0) as usize;

            if state.timestamps.len() >= self.requests_per_minute as usize {
                let oldest = state.timestamps.iter().cloned().fold(f64::MAX, f64::min);
                let wait = (60.0 - (now - oldest)).max(0.5);
                return Ok((wait, false));
            }

            let approaching = state.timestamps.len() >= warn_threshold;
            state.timestamps.push(now);
            self.write_state(&state)?;
            Ok((0.0, approaching))
        })();

        FileExt::unlock(&lockfile).ok();
        result
    }

    fn read_state(&self) -> Result<RateLimitState, RateLimiterError> {
        if !self.state_path.exists() {
            return Ok(RateLimitState::default());
        }
        let mut contents = String::new();
        File::open(&self.state_path)?.read_to_string(&mut contents)?;
        Ok(serde_json::from_str(&contents).unwrap_or_default())
    }

    fn write_state(&self, state: &RateLimitState) -> Result<(), RateLimiterError> {
        let json = serde_json::to_string(state).unwrap_or_else(|_| "{\"timestamps\":[]}".to_string());
        let mut file = File::create(&self.state_path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn admits_calls_under_the_cap() {
        let dir = tempdir().unwrap();
        let limiter = FileRateLimiter::new(dir.path(), 20);
        limiter.acquire().await.unwrap();
        let state = limiter.read_state().unwrap();
        assert_eq!(state.timestamps.len(), 1);
    }

    #[tokio::test]
    async fn shares_state_across_limiter_instances_pointed_at_the_same_dir() {
        let dir = tempdir().unwrap();
        let a = FileRateLimiter::new(dir.path(), 20);
        let b = FileRateLimiter::new(dir.path(), 20);
        a.acquire().await.unwrap();
        b.acquire().await.unwrap();
        let state = a.read_state().unwrap();
        assert_eq!(state.timestamps.len(), 2);
    }

    #[test]
    fn reserve_computes_wait_once_cap_is_reached() {
        let dir = tempdir().unwrap();
        let limiter = FileRateLimiter::new(dir.path(), 1);
        let (wait1, _) = limiter.reserve_or_compute_wait().unwrap();
        let (wait2, _) = limiter.reserve_or_compute_wait().unwrap();
        assert_eq!(wait1, 0.0);
        assert!(wait2 > 0.0);
    }
}
