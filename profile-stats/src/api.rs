// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Remote API surface the collector depends on.
//!
//! [`GitHubApi`] lists exactly the calls needed to aggregate an account and
//! publish its profile document. [`crate::GitHubClient`] implements it on top
//! of octocrab; tests drive the collector through an in-memory stub.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::Error, quota::QuotaStatus};

/// Repository owned by the account, as returned by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// `owner/name` of the repository.
    pub full_name:        String,
    pub private:          bool,
    pub stargazers_count: u64,
    pub updated_at:       DateTime<Utc>
}

/// Commit entry of a repository history listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitRecord {
    pub sha:    String,
    pub commit: CommitDetail
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub author: Option<CommitSignature>
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitSignature {
    pub date: DateTime<Utc>
}

impl CommitRecord {
    /// Author timestamp, when the API reported one.
    pub fn authored_at(&self) -> Option<DateTime<Utc>> {
        self.commit.author.as_ref().map(|author| author.date)
    }
}

/// Account reference embedded in pull requests and issues.
#[derive(Debug, Clone, Deserialize)]
pub struct Actor {
    pub login: String
}

/// Pull request entry of a repository listing.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestRecord {
    pub state:     String,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user:      Option<Actor>
}

/// Issue entry of a repository listing.
///
/// The issues endpoint also returns pull requests; those carry a
/// `pull_request` object.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueRecord {
    pub state:        String,
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>
}

impl IssueRecord {
    /// Returns `true` when the entry is a pull request in disguise.
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

/// Per-contributor weekly statistics of a repository.
#[derive(Debug, Clone, Deserialize)]
pub struct ContributorStats {
    #[serde(default)]
    pub author: Option<Actor>,
    #[serde(default)]
    pub weeks:  Vec<WeeklyStats>
}

/// One week of contributions. `w` is the week start as a Unix timestamp.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WeeklyStats {
    pub w: i64,
    pub a: u64,
    pub d: u64,
    pub c: u64
}

/// Outcome of the contributor statistics endpoint.
#[derive(Debug, Clone)]
pub enum ContributorStatsResponse {
    /// Statistics are available.
    Ready(Vec<ContributorStats>),
    /// GitHub is still computing the statistics (HTTP 202).
    Pending
}

/// Filters of a commit history listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitQuery {
    pub author:   String,
    pub since:    DateTime<Utc>,
    pub per_page: u32,
    pub page:     u32
}

/// Filters of a pull request or issue listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemQuery {
    pub state:    String,
    pub creator:  String,
    pub per_page: u32,
    pub page:     u32
}

/// Body of a content write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentUpdate {
    pub message: String,
    /// Base64 encoded document.
    pub content: String,
    /// Revision marker of the content being replaced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha:     Option<String>
}

/// Result of a successful content write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Revision marker of the new content.
    pub content_sha: Option<String>,
    /// Commit created by the write.
    pub commit_sha:  Option<String>,
    /// Browser URL of the new content.
    pub html_url:    Option<String>
}

/// Calls the collector issues against the hosting API.
///
/// Implementations report failures through [`Error`]; quota rejections must
/// surface as [`Error::QuotaExceeded`] so the retry policy can back off.
#[allow(async_fn_in_trait)]
pub trait GitHubApi {
    /// Reads the remaining call budget. Does not count against the quota.
    async fn rate_limit(&self) -> Result<QuotaStatus, Error>;

    /// One page of the repositories owned by the authenticated account.
    async fn list_repositories(
        &self,
        page: u32,
        per_page: u32
    ) -> Result<Vec<RepositoryRecord>, Error>;

    /// One page of a repository commit history.
    async fn list_commits(
        &self,
        repository: &str,
        query: &CommitQuery
    ) -> Result<Vec<CommitRecord>, Error>;

    /// One page of a repository pull request listing.
    async fn list_pull_requests(
        &self,
        repository: &str,
        query: &ItemQuery
    ) -> Result<Vec<PullRequestRecord>, Error>;

    /// One page of a repository issue listing.
    async fn list_issues(&self, repository: &str, query: &ItemQuery)
    -> Result<Vec<IssueRecord>, Error>;

    /// Bytes of code per language.
    async fn languages(&self, repository: &str) -> Result<BTreeMap<String, u64>, Error>;

    /// Weekly additions, deletions and commits per contributor.
    async fn contributor_stats(&self, repository: &str) -> Result<ContributorStatsResponse, Error>;

    /// Revision marker of a file, or `None` when the file does not exist.
    async fn content_revision(
        &self,
        owner: &str,
        repository: &str,
        path: &str
    ) -> Result<Option<String>, Error>;

    /// Creates or replaces a file.
    async fn put_content(
        &self,
        owner: &str,
        repository: &str,
        path: &str,
        update: &ContentUpdate
    ) -> Result<PublishReceipt, Error>;
}

#[cfg(test)]
pub(crate) mod stub {
    //! In-memory [`GitHubApi`] used by collector and quota tests.

    use std::{
        collections::{BTreeMap, HashMap, VecDeque},
        sync::Mutex
    };

    use chrono::{DateTime, Utc};

    use super::*;

    /// Scripted responses keyed by repository name.
    #[derive(Default)]
    pub(crate) struct StubApi {
        pub quota:          Mutex<VecDeque<Result<QuotaStatus, Error>>>,
        pub default_quota:  Option<QuotaStatus>,
        pub repositories:   Vec<RepositoryRecord>,
        pub commits:        HashMap<String, Vec<CommitRecord>>,
        pub pulls:          HashMap<String, Vec<PullRequestRecord>>,
        pub issues:         HashMap<String, Vec<IssueRecord>>,
        pub languages:      HashMap<String, BTreeMap<String, u64>>,
        pub contributors:   Mutex<HashMap<String, VecDeque<ContributorStatsResponse>>>,
        pub failing:        Vec<String>,
        pub revision:       Option<String>,
        pub put_failure:    Option<u16>,
        pub calls:          Mutex<Vec<String>>,
        pub commit_queries: Mutex<Vec<CommitQuery>>,
        pub item_queries:   Mutex<Vec<ItemQuery>>,
        pub published:      Mutex<Vec<(String, ContentUpdate)>>
    }

    impl StubApi {
        pub(crate) fn record(&self, call: impl Into<String>) {
            self.calls.lock().expect("calls lock").push(call.into());
        }

        pub(crate) fn count(&self, prefix: &str) -> usize {
            self.calls
                .lock()
                .expect("calls lock")
                .iter()
                .filter(|call| call.starts_with(prefix))
                .count()
        }

        fn check(&self, repository: &str) -> Result<(), Error> {
            if self.failing.iter().any(|name| name == repository) {
                return Err(Error::Api {
                    status:  500,
                    message: format!("{repository} is broken")
                });
            }
            Ok(())
        }

        fn page<T: Clone>(items: &[T], page: u32, per_page: u32) -> Vec<T> {
            let start = ((page.max(1) - 1) * per_page) as usize;
            items.iter().skip(start).take(per_page as usize).cloned().collect()
        }
    }

    pub(crate) fn repository(name: &str, private: bool, stars: u64) -> RepositoryRecord {
        RepositoryRecord {
            full_name:        name.to_owned(),
            private,
            stargazers_count: stars,
            updated_at:       Utc::now()
        }
    }

    pub(crate) fn commit_at(timestamp: &str) -> CommitRecord {
        let date: DateTime<Utc> = timestamp.parse().expect("valid timestamp");
        CommitRecord {
            sha:    format!("sha-{timestamp}"),
            commit: CommitDetail {
                author: Some(CommitSignature {
                    date
                })
            }
        }
    }

    pub(crate) fn quota(remaining: u32, reset_at: DateTime<Utc>) -> QuotaStatus {
        QuotaStatus {
            remaining,
            limit: 5000,
            used: 5000 - remaining,
            reset_at
        }
    }

    impl GitHubApi for StubApi {
        async fn rate_limit(&self) -> Result<QuotaStatus, Error> {
            self.record("rate_limit");
            let scripted = self.quota.lock().expect("quota lock").pop_front();
            match scripted {
                Some(result) => result,
                None => Ok(self
                    .default_quota
                    .clone()
                    .unwrap_or_else(|| quota(5000, Utc::now())))
            }
        }

        async fn list_repositories(
            &self,
            page: u32,
            per_page: u32
        ) -> Result<Vec<RepositoryRecord>, Error> {
            self.record(format!("repos:{page}"));
            Ok(Self::page(&self.repositories, page, per_page))
        }

        async fn list_commits(
            &self,
            repository: &str,
            query: &CommitQuery
        ) -> Result<Vec<CommitRecord>, Error> {
            self.record(format!("commits:{repository}:{}", query.page));
            self.commit_queries.lock().expect("queries lock").push(query.clone());
            self.check(repository)?;
            let commits = self.commits.get(repository).cloned().unwrap_or_default();
            Ok(Self::page(&commits, query.page, query.per_page))
        }

        async fn list_pull_requests(
            &self,
            repository: &str,
            query: &ItemQuery
        ) -> Result<Vec<PullRequestRecord>, Error> {
            self.record(format!("pulls:{repository}:{}", query.page));
            self.item_queries.lock().expect("queries lock").push(query.clone());
            self.check(repository)?;
            let pulls = self.pulls.get(repository).cloned().unwrap_or_default();
            Ok(Self::page(&pulls, query.page, query.per_page))
        }

        async fn list_issues(
            &self,
            repository: &str,
            query: &ItemQuery
        ) -> Result<Vec<IssueRecord>, Error> {
            self.record(format!("issues:{repository}:{}", query.page));
            self.item_queries.lock().expect("queries lock").push(query.clone());
            self.check(repository)?;
            let issues = self.issues.get(repository).cloned().unwrap_or_default();
            Ok(Self::page(&issues, query.page, query.per_page))
        }

        async fn languages(&self, repository: &str) -> Result<BTreeMap<String, u64>, Error> {
            self.record(format!("languages:{repository}"));
            self.check(repository)?;
            Ok(self.languages.get(repository).cloned().unwrap_or_default())
        }

        async fn contributor_stats(
            &self,
            repository: &str
        ) -> Result<ContributorStatsResponse, Error> {
            self.record(format!("contributors:{repository}"));
            self.check(repository)?;
            let next = self
                .contributors
                .lock()
                .expect("contributors lock")
                .get_mut(repository)
                .and_then(VecDeque::pop_front);
            Ok(next.unwrap_or_else(|| ContributorStatsResponse::Ready(Vec::new())))
        }

        async fn content_revision(
            &self,
            owner: &str,
            repository: &str,
            path: &str
        ) -> Result<Option<String>, Error> {
            self.record(format!("revision:{owner}/{repository}/{path}"));
            Ok(self.revision.clone())
        }

        async fn put_content(
            &self,
            owner: &str,
            repository: &str,
            path: &str,
            update: &ContentUpdate
        ) -> Result<PublishReceipt, Error> {
            self.record(format!("put:{owner}/{repository}/{path}"));
            self.published
                .lock()
                .expect("published lock")
                .push((format!("{owner}/{repository}/{path}"), update.clone()));
            if let Some(status) = self.put_failure {
                return Err(Error::Api {
                    status,
                    message: format!("{path} does not match the given sha")
                });
            }
            Ok(PublishReceipt {
                content_sha: Some("new-sha".to_owned()),
                commit_sha:  Some("commit-sha".to_owned()),
                html_url:    None
            })
        }
    }
}
