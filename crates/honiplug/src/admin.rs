//! Administrative actions
//!
//! Currently a single action, server reboot, which runs an operator-provided
//! command. Each action is rate limited per user.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::auth::Identity;
use crate::config::{AdminConfig, RateLimitConfig};
use crate::error::ApiError;

// ─────────────────────────────────────────────────────────────────────────────
// Rate Limiter
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory per-key limiter with a sliding window and a minimum interval
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max: u32,
    min_interval: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            window: Duration::from_secs(config.window_secs),
            max: config.max,
            min_interval: Duration::from_secs(config.min_interval_secs),
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record a call for `key`, failing if it is over the limit
    pub fn check(&self, key: &str) -> Result<(), ApiError> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), ApiError> {
        let mut hits = self.hits.lock();
        let recent = hits.entry(key.to_string()).or_default();

        while recent
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            recent.pop_front();
        }

        if let Some(last) = recent.back() {
            if now.duration_since(*last) < self.min_interval {
                return Err(ApiError::RATE_LIMIT_EXCEEDED);
            }
        }

        if recent.len() >= self.max as usize {
            return Err(ApiError::RATE_LIMIT_EXCEEDED);
        }

        recent.push_back(now);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin Service
// ─────────────────────────────────────────────────────────────────────────────

pub struct AdminService {
    reboot_command: Option<Vec<String>>,
    reboot_limiter: RateLimiter,
}

impl AdminService {
    pub fn new(config: &AdminConfig) -> Self {
        Self {
            reboot_command: config.reboot_command.clone().filter(|c| !c.is_empty()),
            reboot_limiter: RateLimiter::new(config.reboot_limit),
        }
    }

    /// Reboot the server by running the configured command
    ///
    /// The caller must already be an authenticated admin.
    pub async fn reboot(&self, caller: &Identity) -> Result<&'static str, ApiError> {
        self.reboot_limiter.check(&caller.user_id).inspect_err(|_| {
            warn!(user = %caller.user_id, "Reboot rate limit exceeded");
        })?;

        let Some((program, args)) = self.reboot_command.as_ref().and_then(|c| c.split_first())
        else {
            return Err(ApiError::UNSUPPORTED_SERVER_OPERATION);
        };

        info!(user = %caller.user_id, program = %program, "Reboot requested");

        let output = Command::new(program).args(args).output().await.map_err(|e| {
            error!(program = %program, error = %e, "Failed to run reboot command");
            ApiError::INTERNAL_ERROR
        })?;

        if !output.status.success() {
            error!(
                program = %program,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "Reboot command failed"
            );
            return Err(ApiError::INTERNAL_ERROR);
        }

        Ok("ok")
    }
}
