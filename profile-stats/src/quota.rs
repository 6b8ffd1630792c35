// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Remote call budget tracking.
//!
//! [`QuotaMonitor`] asks the API how many calls are left and, when the budget
//! drops under the configured floor, sleeps until the reset deadline (plus a
//! short grace period) before letting the collector continue.

use std::{cell::RefCell, time::Duration};

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

use crate::{api::GitHubApi, config::RateLimitSettings};

/// Remaining quota under which a warning is logged.
pub const LOW_QUOTA_WARNING: u32 = 500;
/// Extra time slept past the reset deadline.
pub const RESET_GRACE: Duration = Duration::from_secs(5);
/// Budget assumed when the quota endpoint cannot be reached.
pub const FALLBACK_LIMIT: u32 = 5000;

/// Call budget reported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub remaining: u32,
    pub limit:     u32,
    pub used:      u32,
    pub reset_at:  DateTime<Utc>
}

impl QuotaStatus {
    /// Optimistic status used when the quota endpoint fails.
    pub fn fallback() -> Self {
        Self {
            remaining: FALLBACK_LIMIT,
            limit:     FALLBACK_LIMIT,
            used:      0,
            reset_at:  Utc::now()
        }
    }

    /// Share of the budget already spent, in percent.
    pub fn used_percentage(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        f64::from(self.used) / f64::from(self.limit) * 100.0
    }

    /// Human readable summary printed before a run.
    pub fn status_message(&self) -> String {
        format!(
            "GitHub API quota:\n  - used: {}/{} ({:.1}%)\n  - remaining: {}\n  - resets at: {}",
            self.used,
            self.limit,
            self.used_percentage(),
            self.remaining,
            self.reset_at.format("%H:%M:%S UTC")
        )
    }
}

/// How long to sleep before the next call, if at all.
///
/// Returns `None` when `remaining` is at or above `min_remaining`, or when
/// the reset deadline has already passed.
pub fn wait_duration(
    status: &QuotaStatus,
    min_remaining: u32,
    now: DateTime<Utc>
) -> Option<Duration> {
    if status.remaining >= min_remaining {
        return None;
    }
    let until_reset = (status.reset_at - now).to_std().ok()?;
    if until_reset.is_zero() {
        return None;
    }
    Some(until_reset + RESET_GRACE)
}

struct LastCheck {
    status:     QuotaStatus,
    checked_at: Instant
}

/// Tracks the quota between remote calls of a single run.
///
/// Single-threaded: the last check is never borrowed across an await point.
pub struct QuotaMonitor {
    min_remaining:  u32,
    wait_on_limit:  bool,
    check_interval: Duration,
    last:           RefCell<Option<LastCheck>>
}

impl QuotaMonitor {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            min_remaining:  settings.min_remaining,
            wait_on_limit:  settings.wait_on_limit,
            check_interval: Duration::from_secs(settings.check_interval),
            last:           RefCell::new(None)
        }
    }

    /// Queries the quota endpoint and remembers the answer.
    ///
    /// Never fails: when the endpoint cannot be reached the optimistic
    /// [`QuotaStatus::fallback`] is returned (and not remembered as a check).
    pub async fn check_status<A>(&self, api: &A) -> QuotaStatus
    where
        A: GitHubApi
    {
        match api.rate_limit().await {
            Ok(status) => {
                self.last.replace(Some(LastCheck {
                    status:     status.clone(),
                    checked_at: Instant::now()
                }));
                status
            }
            Err(e) => {
                warn!("Quota check failed, assuming a full budget: {}", e);
                QuotaStatus::fallback()
            }
        }
    }

    /// Last status obtained from the API, if any.
    pub fn last_status(&self) -> Option<QuotaStatus> {
        self.last.borrow().as_ref().map(|last| last.status.clone())
    }

    /// Sleeps until the quota resets when it is running low.
    ///
    /// A check made less than `check_interval` ago is trusted unless
    /// `force_check` is set. Returns `true` when the call slept.
    pub async fn wait_if_needed<A>(&self, api: &A, force_check: bool) -> bool
    where
        A: GitHubApi
    {
        if !force_check && self.recently_checked() {
            return false;
        }

        let status = self.check_status(api).await;

        if status.remaining < LOW_QUOTA_WARNING {
            warn!("GitHub API quota is low: {}/{}", status.remaining, status.limit);
        }

        let Some(wait) = wait_duration(&status, self.min_remaining, Utc::now()) else {
            return false;
        };
        if !self.wait_on_limit {
            warn!(
                "Quota under {} but waiting is disabled; continuing with {} calls left",
                self.min_remaining, status.remaining
            );
            return false;
        }

        info!(
            "Quota reached ({}/{}), resets at {}; sleeping {}m {}s",
            status.remaining,
            status.limit,
            status.reset_at.format("%H:%M:%S UTC"),
            wait.as_secs() / 60,
            wait.as_secs() % 60
        );
        wait_with_progress(wait).await;
        true
    }

    fn recently_checked(&self) -> bool {
        self.last
            .borrow()
            .as_ref()
            .is_some_and(|last| last.checked_at.elapsed() < self.check_interval)
    }
}

async fn wait_with_progress(total: Duration) {
    let pb = ProgressBar::new(total.as_secs());
    if let Ok(style) = ProgressStyle::default_bar().template("[{bar:30}] {msg}") {
        pb.set_style(style.progress_chars("█░"));
    }

    let tick = Duration::from_secs(1);
    let deadline = Instant::now() + total;
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let left = deadline - now;
        pb.set_position(total.saturating_sub(left).as_secs());
        pb.set_message(format!("{}s left", left.as_secs()));
        sleep(left.min(tick)).await;
    }

    pb.finish_with_message("quota reset, resuming requests");
}
