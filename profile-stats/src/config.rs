// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
//
// SPDX-License-Identifier: MIT

//! Configuration document consumed by the statistics collector.
//!
//! The types in this module mirror the structure of the YAML document read at
//! startup. Every field carries a default so a partial (or missing) document
//! still resolves into a complete [`Settings`] value. Settings are resolved
//! once; the dot-path accessors exist for callers that only know a key path.

use std::{fs, path::Path, sync::LazyLock, time::Duration};

use regex::Regex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    error::{self, Error},
    retry::RetryPolicy
};

/// Root configuration document.
///
/// # Examples
///
/// ```
/// use profile_stats::Settings;
///
/// let yaml = r#"
/// github:
///   username: octocat
/// cache:
///   max_age_hours: 6
/// "#;
/// let settings: Settings = serde_yaml::from_str(yaml).expect("valid configuration");
/// assert_eq!(settings.cache.max_age_hours, 6);
/// assert_eq!(settings.stats.days_back, 365);
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Account identity and API location.
    pub github:     GitHubSettings,
    /// Collection knobs.
    pub stats:      StatsSettings,
    /// File cache knobs.
    pub cache:      CacheSettings,
    /// Quota monitor knobs.
    pub rate_limit: RateLimitSettings,
    /// Retry policy knobs.
    pub retry:      RetrySettings,
    /// Profile document knobs.
    pub readme:     ReadmeSettings,
    /// Log output knobs.
    pub logging:    LoggingSettings,
    /// Local output knobs.
    pub output:     OutputSettings
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GitHubSettings {
    /// Personal access token with `repo` and `user` scopes.
    pub token:    String,
    /// Account whose statistics are collected.
    pub username: String,
    /// Base URL of the REST API.
    pub api_url:  String
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            token:    String::new(),
            username: String::new(),
            api_url:  "https://api.github.com".to_owned()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StatsSettings {
    /// Keep private repositories in the listing.
    pub include_private:      bool,
    /// Length of the trailing window in days.
    pub days_back:            u32,
    /// Page size of the repository listing (GitHub caps it at 100).
    pub max_repos_per_page:   u32,
    /// Upper bound of listing pages fetched per repository.
    pub max_commits_pages:    u32,
    /// Collect additions/deletions from contributor statistics.
    pub include_code_changes: bool,
    /// Collect the language breakdown.
    pub include_languages:    bool,
    /// Collect the day/hour activity matrix.
    pub include_heatmap:      bool
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            include_private:      true,
            days_back:            365,
            max_repos_per_page:   100,
            max_commits_pages:    10,
            include_code_changes: true,
            include_languages:    true,
            include_heatmap:      true
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled:       bool,
    pub max_age_hours: u64,
    pub directory:     String
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled:       true,
            max_age_hours: 24,
            directory:     ".cache".to_owned()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Remaining quota under which the collector sleeps until the reset.
    pub min_remaining:  u32,
    /// Sleep when the quota is low instead of only warning.
    pub wait_on_limit:  bool,
    /// Seconds during which a previous quota check is trusted.
    pub check_interval: u64
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            min_remaining:  100,
            wait_on_limit:  true,
            check_interval: 5
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    /// Total number of invocations per remote call.
    pub max_retries:      u32,
    /// Base delay in seconds between invocations.
    pub base_delay_secs:  u64,
    /// Retry every failure, not only quota rejections.
    pub retry_all_errors: bool
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries:      3,
            base_delay_secs:  2,
            retry_all_errors: true
        }
    }
}

impl RetrySettings {
    /// Builds the retry policy described by these settings.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries:      self.max_retries,
            base_delay:       Duration::from_secs(self.base_delay_secs),
            retry_all_errors: self.retry_all_errors
        }
    }
}

/// Sections of the rendered profile document.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReadmeSection {
    Header,
    Stats,
    Repos,
    Prs,
    Issues,
    Languages,
    Activity
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReadmeSettings {
    pub sections:            Vec<ReadmeSection>,
    /// shields.io style applied to every badge.
    pub badge_style:         String,
    pub include_update_time: bool,
    /// Path of the document inside the `<account>/<account>` repository.
    pub remote_path:         String
}

impl Default for ReadmeSettings {
    fn default() -> Self {
        Self {
            sections:            vec![
                ReadmeSection::Header,
                ReadmeSection::Stats,
                ReadmeSection::Repos,
                ReadmeSection::Prs,
                ReadmeSection::Issues,
                ReadmeSection::Languages,
                ReadmeSection::Activity,
            ],
            badge_style:         "for-the-badge".to_owned(),
            include_update_time: true,
            remote_path:         "README.md".to_owned()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is not set (`DEBUG`, `INFO`, ...).
    pub level:     String,
    /// Directory receiving the plain-text log file. Empty disables it.
    pub directory: String
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level:     "INFO".to_owned(),
            directory: "logs".to_owned()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OutputSettings {
    pub readme_file:      String,
    pub save_json:        bool,
    pub json_file:        String,
    pub print_to_console: bool
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            readme_file:      "README.md".to_owned(),
            save_json:        false,
            json_file:        "stats/github_stats.json".to_owned(),
            print_to_console: true
        }
    }
}

impl Settings {
    /// Loads settings from a YAML file.
    ///
    /// Returns `Ok(None)` when the file does not exist so the caller can
    /// decide whether to persist the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be read and
    /// [`Error::Parse`] when it is not valid YAML for this document.
    pub fn load(path: &Path) -> Result<Option<Self>, Error> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path).map_err(|source| error::io_error(path, source))?;
        Self::parse(&contents).map(Some)
    }

    /// Parses settings from YAML text. An empty document yields the defaults.
    pub fn parse(contents: &str) -> Result<Self, Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Writes the settings as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| error::output_io_error(path, source))?;
        }
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml).map_err(|source| error::output_io_error(path, source))
    }

    /// Applies the process environment on top of the loaded values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides resolved through `lookup`.
    ///
    /// Recognized variables: `GITHUB_TOKEN`, `GITHUB_USERNAME`,
    /// `CACHE_ENABLED` and `LOG_LEVEL`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(token) = lookup("GITHUB_TOKEN") {
            self.github.token = token;
        }
        if let Some(username) = lookup("GITHUB_USERNAME") {
            self.github.username = username;
        }
        if let Some(enabled) = lookup("CACHE_ENABLED") {
            self.cache.enabled = enabled.eq_ignore_ascii_case("true");
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_uppercase();
        }
    }

    /// Looks up a value by dot-separated path, e.g. `cache.max_age_hours`.
    pub fn get(&self, path: &str) -> Option<serde_yaml::Value> {
        let mut current = serde_yaml::to_value(self).ok()?;
        for segment in path.split('.') {
            current = match current {
                serde_yaml::Value::Mapping(mut mapping) => mapping.remove(segment)?,
                _ => return None
            };
        }
        Some(current)
    }

    /// Looks up a value by path, falling back to `default` when the path is
    /// unknown or holds a value of another type.
    pub fn get_or<T>(&self, path: &str, default: T) -> T
    where
        T: DeserializeOwned
    {
        self.get(path)
            .and_then(|value| serde_yaml::from_value(value).ok())
            .unwrap_or(default)
    }

    /// Lists every problem found in the settings. An empty list means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.github.token.trim().is_empty() {
            problems.push("missing GitHub token (GITHUB_TOKEN)".to_owned());
        }
        if self.github.username.trim().is_empty() {
            problems.push("missing GitHub username (GITHUB_USERNAME)".to_owned());
        }
        if self.stats.days_back < 1 {
            problems.push("stats.days_back must be a positive integer".to_owned());
        }
        if !(1..=100).contains(&self.stats.max_repos_per_page) {
            problems.push("stats.max_repos_per_page must be between 1 and 100".to_owned());
        }
        if self.retry.max_retries < 1 {
            problems.push("retry.max_retries must be at least 1".to_owned());
        }

        problems
    }

    /// Checks the account credentials before any remote call is made.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credentials`] when the token or username is missing
    /// or the username is not a valid GitHub login.
    pub fn check_credentials(&self) -> Result<(), Error> {
        let token = self.github.token.trim();
        let username = self.github.username.trim();

        if token.is_empty() {
            return Err(Error::credentials("missing GitHub token (GITHUB_TOKEN)"));
        }
        if username.is_empty() {
            return Err(Error::credentials("missing GitHub username (GITHUB_USERNAME)"));
        }
        if !is_valid_username(username) {
            return Err(Error::credentials(format!("'{username}' is not a valid GitHub username")));
        }
        Ok(())
    }

    /// Returns a copy with the token partially hidden, suitable for display.
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        copy.github.token = mask_token(&self.github.token);
        copy
    }

    /// Renders the settings as YAML with the token masked.
    pub fn to_display_yaml(&self) -> Result<String, Error> {
        Ok(serde_yaml::to_string(&self.masked())?)
    }
}

static CLASSIC_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^gh[pousr]_[A-Za-z0-9]{36}$").expect("invalid regex"));
static FINE_GRAINED_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^github_pat_[A-Za-z0-9_]{22,}$").expect("invalid regex"));
static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+(?:-[A-Za-z0-9]+)*$").expect("invalid regex"));

/// Returns `true` when the token has one of the documented GitHub formats.
pub fn is_valid_token(token: &str) -> bool {
    CLASSIC_TOKEN.is_match(token) || FINE_GRAINED_TOKEN.is_match(token)
}

/// Returns `true` for 1 to 39 alphanumerics separated by single hyphens.
pub fn is_valid_username(username: &str) -> bool {
    username.len() <= 39 && USERNAME.is_match(username)
}

fn mask_token(token: &str) -> String {
    if token.is_empty() {
        return String::new();
    }
    if token.len() > 12 && token.is_ascii() {
        return format!("{}...{}", &token[..8], &token[token.len() - 4..]);
    }
    "***".to_owned()
}
