// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! [`GitHubApi`] implementation backed by octocrab.
//!
//! Boundary statuses are translated here so the collector never sees them as
//! failures: an empty history (409) is an empty page, a missing file (404)
//! has no revision, and statistics still being computed (202) are pending.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use octocrab::{Octocrab, service::middleware::retry::RetryConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    api::{
        CommitQuery, CommitRecord, ContentUpdate, ContributorStats, ContributorStatsResponse,
        GitHubApi, IssueRecord, ItemQuery, PublishReceipt, PullRequestRecord, RepositoryRecord
    },
    error::{Error, classify_status},
    quota::QuotaStatus
};

/// Authenticated REST client for one account.
#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab
}

impl GitHubClient {
    /// Builds a client authenticated with a personal access token.
    ///
    /// octocrab's own resend layer is turned off so every request is paced
    /// by [`crate::retry::retry_with_backoff`] alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credentials`] when the client cannot be configured
    /// with the given token or API location.
    pub fn new(token: &str, api_url: &str) -> Result<Self, Error> {
        let octocrab = Octocrab::builder()
            .personal_token(token.to_owned())
            .add_retry_config(RetryConfig::None)
            .base_uri(api_url)
            .map_err(|e| Error::credentials(format!("invalid API url '{api_url}': {e}")))?
            .build()
            .map_err(|e| {
                Error::credentials(format!("failed to initialize GitHub client: {e}"))
            })?;

        Ok(Self {
            octocrab
        })
    }
}

#[derive(Debug, Serialize)]
struct RepositoryListing {
    #[serde(rename = "type")]
    kind:     &'static str,
    sort:     &'static str,
    per_page: u32,
    page:     u32
}

#[derive(Debug, Deserialize)]
struct RateLimitReply {
    resources: RateLimitResources
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: CoreRate
}

#[derive(Debug, Deserialize)]
struct CoreRate {
    limit:     u32,
    remaining: u32,
    #[serde(default)]
    used:      u32,
    reset:     i64
}

impl From<CoreRate> for QuotaStatus {
    fn from(rate: CoreRate) -> Self {
        Self {
            remaining: rate.remaining,
            limit:     rate.limit,
            used:      rate.used,
            reset_at:  DateTime::<Utc>::from_timestamp(rate.reset, 0).unwrap_or_else(Utc::now)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentReply {
    sha: Option<String>
}

#[derive(Debug, Default, Deserialize)]
struct PutReply {
    #[serde(default)]
    content: Option<PutContent>,
    #[serde(default)]
    commit:  Option<PutCommit>
}

#[derive(Debug, Default, Deserialize)]
struct PutContent {
    sha:      Option<String>,
    html_url: Option<String>
}

#[derive(Debug, Default, Deserialize)]
struct PutCommit {
    sha: Option<String>
}

impl From<PutReply> for PublishReceipt {
    fn from(reply: PutReply) -> Self {
        let content = reply.content.unwrap_or_default();
        Self {
            content_sha: content.sha,
            commit_sha:  reply.commit.and_then(|commit| commit.sha),
            html_url:    content.html_url
        }
    }
}

/// Interprets a raw contributor statistics reply.
fn contributor_stats_from(status: u16, body: &str) -> Result<ContributorStatsResponse, Error> {
    match status {
        202 => Ok(ContributorStatsResponse::Pending),
        204 => Ok(ContributorStatsResponse::Ready(Vec::new())),
        200..=299 if body.trim().is_empty() => Ok(ContributorStatsResponse::Ready(Vec::new())),
        200..=299 => {
            let stats: Vec<ContributorStats> = serde_json::from_str(body)?;
            Ok(ContributorStatsResponse::Ready(stats))
        }
        _ => Err(classify_status(status, error_message(body)))
    }
}

fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Message {
        message: String
    }

    serde_json::from_str::<Message>(body)
        .map(|reply| reply.message)
        .unwrap_or_else(|_| body.trim().to_owned())
}

impl GitHubApi for GitHubClient {
    async fn rate_limit(&self) -> Result<QuotaStatus, Error> {
        let reply: RateLimitReply = self.octocrab.get("/rate_limit", None::<&()>).await?;
        Ok(reply.resources.core.into())
    }

    async fn list_repositories(
        &self,
        page: u32,
        per_page: u32
    ) -> Result<Vec<RepositoryRecord>, Error> {
        let query = RepositoryListing {
            kind: "owner",
            sort: "updated",
            per_page,
            page
        };
        Ok(self.octocrab.get("/user/repos", Some(&query)).await?)
    }

    async fn list_commits(
        &self,
        repository: &str,
        query: &CommitQuery
    ) -> Result<Vec<CommitRecord>, Error> {
        let result: Result<Vec<CommitRecord>, Error> = self
            .octocrab
            .get(format!("/repos/{repository}/commits"), Some(query))
            .await
            .map_err(Error::from);

        match result {
            Err(error) if error.status() == Some(409) => {
                debug!("{} has an empty history", repository);
                Ok(Vec::new())
            }
            other => other
        }
    }

    async fn list_pull_requests(
        &self,
        repository: &str,
        query: &ItemQuery
    ) -> Result<Vec<PullRequestRecord>, Error> {
        Ok(self.octocrab.get(format!("/repos/{repository}/pulls"), Some(query)).await?)
    }

    async fn list_issues(
        &self,
        repository: &str,
        query: &ItemQuery
    ) -> Result<Vec<IssueRecord>, Error> {
        Ok(self.octocrab.get(format!("/repos/{repository}/issues"), Some(query)).await?)
    }

    async fn languages(&self, repository: &str) -> Result<BTreeMap<String, u64>, Error> {
        Ok(self.octocrab.get(format!("/repos/{repository}/languages"), None::<&()>).await?)
    }

    async fn contributor_stats(&self, repository: &str) -> Result<ContributorStatsResponse, Error> {
        let response = self
            .octocrab
            ._get(format!("/repos/{repository}/stats/contributors"))
            .await?;
        let status = response.status().as_u16();
        let body = self.octocrab.body_to_string(response).await?;
        contributor_stats_from(status, &body)
    }

    async fn content_revision(
        &self,
        owner: &str,
        repository: &str,
        path: &str
    ) -> Result<Option<String>, Error> {
        let result: Result<ContentReply, Error> = self
            .octocrab
            .get(format!("/repos/{owner}/{repository}/contents/{path}"), None::<&()>)
            .await
            .map_err(Error::from);

        match result {
            Ok(reply) => Ok(reply.sha),
            Err(error) if error.status() == Some(404) => Ok(None),
            Err(error) => Err(error)
        }
    }

    async fn put_content(
        &self,
        owner: &str,
        repository: &str,
        path: &str,
        update: &ContentUpdate
    ) -> Result<PublishReceipt, Error> {
        let reply: PutReply = self
            .octocrab
            .put(format!("/repos/{owner}/{repository}/contents/{path}"), Some(update))
            .await?;
        Ok(reply.into())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering}
        },
        time::Duration
    };

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener
    };

    use super::*;
    use crate::retry::{RetryPolicy, retry_with_backoff};

    /// Answers every request with a 429 and counts the requests received.
    async fn serve_rate_limited(listener: TcpListener, requests: Arc<AtomicUsize>) {
        while let Ok((mut socket, _)) = listener.accept().await {
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut chunk = [0_u8; 1024];
                while !head.windows(4).any(|window| window == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(read) => head.extend_from_slice(&chunk[..read])
                    }
                }
                requests.fetch_add(1, Ordering::SeqCst);

                let body = r#"{"message":"API rate limit exceeded","documentation_url":"https://docs.github.com/rest"}"#;
                let reply = format!(
                    "HTTP/1.1 429 Too Many Requests\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    }

    #[test]
    fn accepted_status_means_pending() {
        let reply = contributor_stats_from(202, "{}").expect("pending");
        assert!(matches!(reply, ContributorStatsResponse::Pending));
    }

    #[test]
    fn ready_stats_are_decoded() {
        let body = r#"[{"author":{"login":"octocat"},"weeks":[{"w":1736121600,"a":10,"d":2,"c":1}]}]"#;
        let reply = contributor_stats_from(200, body).expect("ready");
        match reply {
            ContributorStatsResponse::Ready(stats) => {
                assert_eq!(stats.len(), 1);
                assert_eq!(stats[0].weeks[0].a, 10);
                assert_eq!(stats[0].author.as_ref().map(|a| a.login.as_str()), Some("octocat"));
            }
            ContributorStatsResponse::Pending => panic!("expected ready stats")
        }
    }

    #[test]
    fn empty_stats_body_is_no_contributors() {
        let reply = contributor_stats_from(204, "").expect("empty");
        assert!(matches!(reply, ContributorStatsResponse::Ready(stats) if stats.is_empty()));
    }

    #[test]
    fn failing_stats_status_is_classified() {
        let error = contributor_stats_from(403, r#"{"message":"API rate limit exceeded"}"#)
            .expect_err("quota");
        assert!(error.is_quota_exceeded());
        assert!(error.to_string().contains("API rate limit exceeded"));

        let error = contributor_stats_from(500, "oops").expect_err("server");
        assert_eq!(error.status(), Some(500));
    }

    #[test]
    fn rate_limit_reply_maps_core_resource() {
        let body = r#"{"resources":{"core":{"limit":5000,"remaining":4321,"used":679,"reset":1736121600}},"rate":{}}"#;
        let reply: RateLimitReply = serde_json::from_str(body).expect("decode");
        let status: QuotaStatus = reply.resources.core.into();
        assert_eq!(status.remaining, 4321);
        assert_eq!(status.used, 679);
        assert_eq!(status.reset_at.timestamp(), 1_736_121_600);
    }

    #[test]
    fn put_reply_becomes_receipt() {
        let body = r#"{"content":{"sha":"abc","html_url":"https://github.com/o/o/blob/main/README.md"},"commit":{"sha":"def"}}"#;
        let reply: PutReply = serde_json::from_str(body).expect("decode");
        let receipt = PublishReceipt::from(reply);
        assert_eq!(receipt.content_sha.as_deref(), Some("abc"));
        assert_eq!(receipt.commit_sha.as_deref(), Some("def"));
        assert!(receipt.html_url.is_some());
    }

    #[test]
    fn repository_listing_serializes_type_filter() {
        let query = RepositoryListing {
            kind:     "owner",
            sort:     "updated",
            per_page: 100,
            page:     2
        };
        let value = serde_json::to_value(&query).expect("encode");
        assert_eq!(value["type"], "owner");
        assert_eq!(value["page"], 2);
    }

    #[tokio::test]
    async fn client_builds_for_custom_api_url() {
        assert!(GitHubClient::new("ghp_token", "https://github.example.com/api/v3").is_ok());
    }

    #[tokio::test]
    async fn each_policy_attempt_sends_exactly_one_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        let requests = Arc::new(AtomicUsize::new(0));
        tokio::spawn(serve_rate_limited(listener, Arc::clone(&requests)));

        let client =
            GitHubClient::new("ghp_token", &format!("http://{address}")).expect("client");
        let policy = RetryPolicy {
            max_retries:      3,
            base_delay:       Duration::from_millis(5),
            retry_all_errors: true
        };

        let result =
            retry_with_backoff(&policy, "languages", || client.languages("octocat/hello")).await;

        match result {
            Err(Error::RetriesExhausted {
                attempts,
                last_error,
                ..
            }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.is_quota_exceeded());
            }
            other => panic!("unexpected result: {other:?}")
        }
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }
}
