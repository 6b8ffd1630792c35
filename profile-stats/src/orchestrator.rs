// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Aggregation engine collecting every statistic of one account.
//!
//! Every remote call goes through [`StatsCollector::guarded`]: the quota
//! monitor is consulted before each attempt and the retry policy wraps the
//! call. Per-repository failures are logged and skipped; only a failed
//! repository listing or a failed publish reaches the caller.

use std::{future::Future, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    api::{
        CommitQuery, CommitRecord, ContentUpdate, ContributorStatsResponse, GitHubApi, ItemQuery,
        PublishReceipt, RepositoryRecord
    },
    cache::CacheStore,
    config::Settings,
    error::Error,
    quota::QuotaMonitor,
    retry::RetryPolicy,
    stats::{
        ActivityHeatmap, AggregatedStats, CodeChanges, IssueStats, LanguageShare, LanguageTotals,
        PullRequestStats, code_changes_for
    }
};

/// Page size of per-repository listings.
const ITEMS_PER_PAGE: u32 = 100;
/// Pause before asking again for statistics that are still being computed.
pub const PENDING_STATS_DELAY: Duration = Duration::from_secs(2);

/// Collects the statistics of the configured account.
pub struct StatsCollector<A> {
    api:      A,
    settings: Settings,
    cache:    Option<CacheStore>,
    quota:    QuotaMonitor,
    policy:   RetryPolicy
}

impl<A> StatsCollector<A>
where
    A: GitHubApi
{
    /// Creates a collector, opening the cache directory when caching is
    /// enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheIo`] when the cache directory cannot be created.
    pub fn new(api: A, settings: Settings) -> Result<Self, Error> {
        let cache = if settings.cache.enabled {
            Some(CacheStore::open(&settings.cache.directory)?)
        } else {
            None
        };
        Ok(Self::with_cache(api, settings, cache))
    }

    /// Creates a collector around an already opened cache.
    pub fn with_cache(api: A, settings: Settings, cache: Option<CacheStore>) -> Self {
        Self {
            quota: QuotaMonitor::new(&settings.rate_limit),
            policy: settings.retry.policy(),
            api,
            settings,
            cache
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> Option<&CacheStore> {
        self.cache.as_ref()
    }

    pub fn quota(&self) -> &QuotaMonitor {
        &self.quota
    }

    fn username(&self) -> &str {
        &self.settings.github.username
    }

    fn window_start(&self) -> DateTime<Utc> {
        Utc::now() - TimeDelta::days(i64::from(self.settings.stats.days_back))
    }

    /// Runs one remote call behind the quota gate and the retry policy.
    async fn guarded<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>
    {
        let quota = &self.quota;
        let api = &self.api;
        crate::retry::retry_with_backoff(&self.policy, operation, || {
            let attempt = call();
            async move {
                quota.wait_if_needed(api, false).await;
                attempt.await
            }
        })
        .await
    }

    /// Fetches listing pages until an empty or short page, or `max_pages`.
    async fn paginate<T, F, Fut>(
        &self,
        operation: &str,
        max_pages: u32,
        mut fetch: F
    ) -> Result<Vec<T>, Error>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Vec<T>, Error>>
    {
        let mut items = Vec::new();
        for page in 1..=max_pages {
            let batch = self.guarded(operation, || fetch(page)).await?;
            let short = batch.len() < ITEMS_PER_PAGE as usize;
            items.extend(batch);
            if short {
                break;
            }
        }
        Ok(items)
    }

    /// Lists every repository owned by the account.
    ///
    /// A fresh cached listing is returned without remote calls; a cold fetch
    /// pages until the API returns an empty page and stores the result.
    /// Private repositories are dropped afterwards when
    /// `stats.include_private` is off.
    ///
    /// # Errors
    ///
    /// Returns the retry policy failure of any listing page.
    pub async fn fetch_repositories(&self) -> Result<Vec<RepositoryRecord>, Error> {
        let key = format!("repos_{}", self.username());

        let cached = self.cache.as_ref().and_then(|cache| {
            cache.get::<Vec<RepositoryRecord>>(&key, self.settings.cache.max_age_hours)
        });
        let repositories = match cached {
            Some(repositories) if !repositories.is_empty() => {
                info!("Using cached repository listing ({} repositories)", repositories.len());
                repositories
            }
            _ => {
                let repositories = self.list_repositories().await?;
                if let Some(cache) = &self.cache {
                    cache.set(&key, &repositories);
                }
                repositories
            }
        };

        if self.settings.stats.include_private {
            return Ok(repositories);
        }
        Ok(repositories.into_iter().filter(|repository| !repository.private).collect())
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>, Error> {
        info!("Fetching repositories from the API");
        let api = &self.api;
        let per_page = self.settings.stats.max_repos_per_page;

        let mut repositories = Vec::new();
        let mut page = 1;
        loop {
            let batch = self
                .guarded("list repositories", move || api.list_repositories(page, per_page))
                .await?;
            if batch.is_empty() {
                break;
            }
            debug!("Page {}: {} repositories", page, batch.len());
            repositories.extend(batch);
            page += 1;
        }

        info!("Fetched {} repositories", repositories.len());
        Ok(repositories)
    }

    /// Sum of the star counts. No remote calls.
    pub fn count_stars(&self, repositories: &[RepositoryRecord]) -> u64 {
        let total = repositories.iter().map(|repository| repository.stargazers_count).sum();
        info!("Total stars: {}", total);
        total
    }

    async fn fetch_commits(&self, repository: &str) -> Result<Vec<CommitRecord>, Error> {
        let api = &self.api;
        let author = self.username();
        let since = self.window_start();
        let operation = format!("commits of {repository}");

        self.paginate(&operation, self.settings.stats.max_commits_pages, move |page| async move {
            let query = CommitQuery {
                author: author.to_owned(),
                since,
                per_page: ITEMS_PER_PAGE,
                page
            };
            api.list_commits(repository, &query).await
        })
        .await
    }

    /// Counts the account's commits inside the trailing window.
    pub async fn count_commits(&self, repositories: &[RepositoryRecord]) -> u64 {
        info!("Counting commits");
        let mut total = 0;
        for (position, repository) in repositories.iter().enumerate() {
            debug!("[{}/{}] {}", position + 1, repositories.len(), repository.full_name);
            match self.fetch_commits(&repository.full_name).await {
                Ok(commits) => total += commits.len() as u64,
                Err(e) => warn!("Skipping commits of {}: {}", repository.full_name, e)
            }
        }
        info!("Total commits: {}", total);
        total
    }

    fn item_query(&self, page: u32) -> ItemQuery {
        ItemQuery {
            state: "all".to_owned(),
            creator: self.username().to_owned(),
            per_page: ITEMS_PER_PAGE,
            page
        }
    }

    /// Counts the pull requests opened by the account.
    pub async fn count_pull_requests(&self, repositories: &[RepositoryRecord]) -> PullRequestStats {
        info!("Counting pull requests");
        let api = &self.api;
        let max_pages = self.settings.stats.max_commits_pages;
        let mut stats = PullRequestStats::default();

        for (position, repository) in repositories.iter().enumerate() {
            let name = repository.full_name.as_str();
            debug!("[{}/{}] {}", position + 1, repositories.len(), name);
            let operation = format!("pull requests of {name}");
            let pulls = self
                .paginate(&operation, max_pages, |page| {
                    let query = self.item_query(page);
                    async move { api.list_pull_requests(name, &query).await }
                })
                .await;

            match pulls {
                Ok(pulls) => pulls
                    .iter()
                    .filter(|pull| {
                        pull.user
                            .as_ref()
                            .is_some_and(|user| user.login.eq_ignore_ascii_case(self.username()))
                    })
                    .for_each(|pull| stats.record(pull)),
                Err(e) => warn!("Skipping pull requests of {}: {}", name, e)
            }
        }

        info!("Total pull requests: {} (merged: {})", stats.total, stats.merged);
        stats
    }

    /// Counts the issues opened by the account, ignoring pull requests.
    pub async fn count_issues(&self, repositories: &[RepositoryRecord]) -> IssueStats {
        info!("Counting issues");
        let api = &self.api;
        let max_pages = self.settings.stats.max_commits_pages;
        let mut stats = IssueStats::default();

        for (position, repository) in repositories.iter().enumerate() {
            let name = repository.full_name.as_str();
            debug!("[{}/{}] {}", position + 1, repositories.len(), name);
            let operation = format!("issues of {name}");
            let issues = self
                .paginate(&operation, max_pages, |page| {
                    let query = self.item_query(page);
                    async move { api.list_issues(name, &query).await }
                })
                .await;

            match issues {
                Ok(issues) => issues.iter().for_each(|issue| stats.record(issue)),
                Err(e) => warn!("Skipping issues of {}: {}", name, e)
            }
        }

        info!("Total issues: {}", stats.total);
        stats
    }

    /// Counts repositories updated inside the trailing window. No remote
    /// calls.
    pub fn count_contributed_repos(&self, repositories: &[RepositoryRecord]) -> usize {
        let threshold = self.window_start();
        let count = repositories
            .iter()
            .filter(|repository| repository.updated_at >= threshold)
            .count();
        info!("Contributed repositories: {}", count);
        count
    }

    /// Language shares across every repository, highest first.
    pub async fn language_stats(&self, repositories: &[RepositoryRecord]) -> Vec<LanguageShare> {
        if !self.settings.stats.include_languages {
            return Vec::new();
        }
        info!("Analysing languages");
        let api = &self.api;
        let mut totals = LanguageTotals::default();

        for (position, repository) in repositories.iter().enumerate() {
            let name = repository.full_name.as_str();
            debug!("[{}/{}] {}", position + 1, repositories.len(), name);
            let operation = format!("languages of {name}");
            match self.guarded(&operation, move || api.languages(name)).await {
                Ok(languages) => totals.merge(&languages),
                Err(e) => warn!("Skipping languages of {}: {}", name, e)
            }
        }

        let shares = totals.percentages();
        info!("Detected {} languages", shares.len());
        shares
    }

    /// Lines added and deleted by the account inside the trailing window.
    pub async fn code_change_stats(&self, repositories: &[RepositoryRecord]) -> CodeChanges {
        if !self.settings.stats.include_code_changes {
            return CodeChanges::default();
        }
        info!("Analysing code changes");
        let api = &self.api;
        let since = self.window_start();
        let (mut additions, mut deletions) = (0, 0);

        for (position, repository) in repositories.iter().enumerate() {
            let name = repository.full_name.as_str();
            debug!("[{}/{}] {}", position + 1, repositories.len(), name);
            let operation = format!("contributor statistics of {name}");
            let fetch = || self.guarded(&operation, move || api.contributor_stats(name));

            let response = match fetch().await {
                Ok(ContributorStatsResponse::Pending) => {
                    debug!("Statistics of {} are being computed; asking again", name);
                    sleep(PENDING_STATS_DELAY).await;
                    fetch().await
                }
                other => other
            };

            match response {
                Ok(ContributorStatsResponse::Ready(contributors)) => {
                    let (added, deleted) = code_changes_for(&contributors, self.username(), since);
                    additions += added;
                    deletions += deleted;
                }
                Ok(ContributorStatsResponse::Pending) => {
                    debug!("Statistics of {} still pending; skipped", name);
                }
                Err(e) => warn!("Skipping code changes of {}: {}", name, e)
            }
        }

        info!("Code changes: +{} -{}", additions, deletions);
        CodeChanges::new(additions, deletions)
    }

    /// Commit counts by weekday and hour inside the trailing window.
    pub async fn activity_heatmap(&self, repositories: &[RepositoryRecord]) -> ActivityHeatmap {
        let mut heatmap = ActivityHeatmap::default();
        if !self.settings.stats.include_heatmap {
            return heatmap;
        }
        info!("Building activity heatmap");

        for (position, repository) in repositories.iter().enumerate() {
            debug!("[{}/{}] {}", position + 1, repositories.len(), repository.full_name);
            match self.fetch_commits(&repository.full_name).await {
                Ok(commits) => commits
                    .iter()
                    .filter_map(CommitRecord::authored_at)
                    .for_each(|timestamp| heatmap.record(timestamp)),
                Err(e) => warn!("Skipping activity of {}: {}", repository.full_name, e)
            }
        }

        heatmap
    }

    /// Collects every statistic, one phase after another.
    ///
    /// # Errors
    ///
    /// Fails only when the repository listing cannot be fetched.
    pub async fn calculate_all(&self) -> Result<AggregatedStats, Error> {
        info!("Collecting statistics for {}", self.username());
        let status = self.quota.check_status(&self.api).await;
        info!("{}", status.status_message());

        let repositories = self.fetch_repositories().await?;
        let private_repos = repositories.iter().filter(|repository| repository.private).count();

        let stats = AggregatedStats {
            total_repos: repositories.len(),
            public_repos: repositories.len() - private_repos,
            private_repos,
            stars: self.count_stars(&repositories),
            commits_last_year: self.count_commits(&repositories).await,
            prs: self.count_pull_requests(&repositories).await,
            issues: self.count_issues(&repositories).await,
            contributed_repos: self.count_contributed_repos(&repositories),
            languages: self.language_stats(&repositories).await,
            code_changes: self.code_change_stats(&repositories).await,
            activity_heatmap: self.activity_heatmap(&repositories).await,
            updated_at: Utc::now(),
            period_days: self.settings.stats.days_back
        };

        info!("Statistics collected");
        Ok(stats)
    }

    /// Writes `content` to the profile repository of the account.
    ///
    /// The current revision marker is read first so an existing document is
    /// replaced; when it cannot be read the write proceeds without one.
    ///
    /// # Errors
    ///
    /// Returns the retry policy failure of the write, e.g. a conflict caused
    /// by a stale revision marker.
    pub async fn publish(&self, content: &str) -> Result<PublishReceipt, Error> {
        let owner = self.username();
        let path = self.settings.readme.remote_path.as_str();
        let api = &self.api;
        info!("Publishing {} to {}/{}", path, owner, owner);

        let sha = match self
            .guarded("read profile revision", move || api.content_revision(owner, owner, path))
            .await
        {
            Ok(sha) => sha,
            Err(e) => {
                warn!("Cannot read the current revision of {}: {}", path, e);
                None
            }
        };
        if let Some(sha) = &sha {
            debug!("Replacing revision {}", sha.get(..7).unwrap_or(sha));
        }

        let update = ContentUpdate {
            message: format!("Auto-update stats - {}", Utc::now().format("%Y-%m-%d %H:%M")),
            content: STANDARD.encode(content.as_bytes()),
            sha
        };
        let update = &update;
        let receipt = self
            .guarded("publish profile", move || api.put_content(owner, owner, path, update))
            .await?;

        info!("Profile published");
        Ok(receipt)
    }
}
