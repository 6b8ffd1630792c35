// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Aggregated account statistics and the pure reductions producing them.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ContributorStats, IssueRecord, PullRequestRecord};

/// Everything collected for one account in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedStats {
    pub total_repos:       usize,
    pub public_repos:      usize,
    pub private_repos:     usize,
    pub stars:             u64,
    pub commits_last_year: u64,
    pub prs:               PullRequestStats,
    pub issues:            IssueStats,
    /// Repositories updated inside the trailing window.
    pub contributed_repos: usize,
    /// Share of bytes per language, highest first.
    pub languages:         Vec<LanguageShare>,
    pub code_changes:      CodeChanges,
    pub activity_heatmap:  ActivityHeatmap,
    pub updated_at:        DateTime<Utc>,
    /// Length of the trailing window in days.
    pub period_days:       u32
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestStats {
    pub total:  u64,
    pub open:   u64,
    /// Subset of `closed` carrying a merge timestamp.
    pub merged: u64,
    /// Every pull request that is not open.
    pub closed: u64
}

impl PullRequestStats {
    /// Counts one pull request.
    pub fn record(&mut self, pull: &PullRequestRecord) {
        self.total += 1;
        if pull.state == "open" {
            self.open += 1;
        } else {
            self.closed += 1;
        }
        if pull.merged_at.is_some() {
            self.merged += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStats {
    pub total:  u64,
    pub open:   u64,
    pub closed: u64
}

impl IssueStats {
    /// Counts one issue. Pull requests returned by the issue listing are
    /// ignored.
    pub fn record(&mut self, issue: &IssueRecord) {
        if issue.is_pull_request() {
            return;
        }
        self.total += 1;
        if issue.state == "open" {
            self.open += 1;
        } else {
            self.closed += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageShare {
    pub name:       String,
    /// Percentage of all bytes, rounded to two decimals.
    pub percentage: f64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChanges {
    pub additions:     u64,
    pub deletions:     u64,
    pub total_changes: u64
}

impl CodeChanges {
    pub fn new(additions: u64, deletions: u64) -> Self {
        Self {
            additions,
            deletions,
            total_changes: additions + deletions
        }
    }
}

/// Commit counts by weekday (Monday = 0) and hour of day, in UTC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityHeatmap(pub [[u32; 24]; 7]);

impl ActivityHeatmap {
    /// Adds one commit authored at `timestamp`.
    pub fn record(&mut self, timestamp: DateTime<Utc>) {
        let day = timestamp.weekday().num_days_from_monday() as usize;
        let hour = timestamp.hour() as usize;
        self.0[day][hour] += 1;
    }

    pub fn count(&self, day: usize, hour: usize) -> u32 {
        self.0
            .get(day)
            .and_then(|hours| hours.get(hour))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of the `span` hours starting at `from_hour` on `day`.
    pub fn bucket(&self, day: usize, from_hour: usize, span: usize) -> u32 {
        (from_hour..from_hour + span).map(|hour| self.count(day, hour)).sum()
    }

    pub fn total(&self) -> u64 {
        self.0.iter().flatten().map(|&count| u64::from(count)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Running byte totals per language, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct LanguageTotals {
    order: Vec<(String, u64)>,
    index: HashMap<String, usize>
}

impl LanguageTotals {
    /// Adds the byte counts reported for one repository.
    pub fn merge(&mut self, languages: &BTreeMap<String, u64>) {
        for (name, bytes) in languages {
            match self.index.get(name) {
                Some(&slot) => self.order[slot].1 += bytes,
                None => {
                    self.index.insert(name.clone(), self.order.len());
                    self.order.push((name.clone(), *bytes));
                }
            }
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.order.iter().map(|(_, bytes)| bytes).sum()
    }

    /// Converts the totals into rounded percentages, highest first.
    ///
    /// Equal percentages keep the order in which the languages were first
    /// seen. Returns an empty list when no bytes were recorded.
    pub fn percentages(&self) -> Vec<LanguageShare> {
        let total = self.total_bytes();
        if total == 0 {
            return Vec::new();
        }

        let mut shares: Vec<LanguageShare> = self
            .order
            .iter()
            .map(|(name, bytes)| LanguageShare {
                name:       name.clone(),
                percentage: round_percentage(*bytes as f64 / total as f64 * 100.0)
            })
            .collect();
        shares.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));
        shares
    }
}

fn round_percentage(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Merges per-repository language maps into sorted percentages.
pub fn language_percentages<'a, I>(maps: I) -> Vec<LanguageShare>
where
    I: IntoIterator<Item = &'a BTreeMap<String, u64>>
{
    let mut totals = LanguageTotals::default();
    for languages in maps {
        totals.merge(languages);
    }
    totals.percentages()
}

/// Sums the weekly additions and deletions of `login` since `since`.
pub fn code_changes_for(
    contributors: &[ContributorStats],
    login: &str,
    since: DateTime<Utc>
) -> (u64, u64) {
    let since = since.timestamp();
    contributors
        .iter()
        .filter(|contributor| {
            contributor
                .author
                .as_ref()
                .is_some_and(|author| author.login.eq_ignore_ascii_case(login))
        })
        .flat_map(|contributor| contributor.weeks.iter())
        .filter(|week| week.w >= since)
        .fold((0, 0), |(additions, deletions), week| {
            (additions + week.a, deletions + week.d)
        })
}
