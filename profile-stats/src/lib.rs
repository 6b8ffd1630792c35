// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Account statistics collector for GitHub profiles.
//!
//! The library aggregates the repositories, commits, pull requests, issues,
//! languages and code changes of one account into [`AggregatedStats`],
//! renders them as a Markdown profile document and publishes it. Remote
//! calls are gated by a [`QuotaMonitor`], wrapped in a [`RetryPolicy`] and
//! the repository listing is served from a file-backed [`CacheStore`] when
//! fresh.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod quota;
pub mod render;
pub mod retry;
pub mod stats;

pub use api::{GitHubApi, PublishReceipt, RepositoryRecord};
pub use cache::{CacheInfo, CacheStore};
pub use client::GitHubClient;
pub use config::Settings;
pub use error::{Error, io_error};
pub use orchestrator::StatsCollector;
pub use quota::{QuotaMonitor, QuotaStatus};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use stats::AggregatedStats;
