// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Command-line interface for the profile statistics collector.
//!
//! Without a subcommand the binary runs `update`: collect the statistics,
//! write the local profile document and publish it.

use std::{
    fs,
    path::{Path, PathBuf},
    process
};

use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use profile_stats::{
    CacheStore, Error, GitHubClient, QuotaMonitor, Settings, StatsCollector, config,
    error::output_io_error,
    logging::init_logging,
    render::{console_summary, render_profile}
};
use tracing::{info, warn};

/// Number of document lines shown by `--dry-run`.
const PREVIEW_LINES: usize = 30;

/// Collect GitHub account statistics and publish them as a profile README.
#[derive(Debug, Parser)]
#[command(name = "profile-stats", version, about = "Publish GitHub account statistics")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long = "config", value_name = "PATH", default_value = "config.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,

    /// Update flags accepted when the CLI is invoked without a subcommand.
    #[command(flatten)]
    update: UpdateArgs
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Collect statistics, write the local README and publish it.
    Update(UpdateArgs),
    /// Inspect or empty the response cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand
    },
    /// Print the remaining API quota.
    Quota,
    /// Print the resolved configuration with the token masked.
    #[command(name = "show-config")]
    ShowConfig
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// Show the number of entries and their size.
    Info,
    /// Delete every entry.
    Clear
}

#[derive(Debug, Args, Default, Clone)]
struct UpdateArgs {
    /// Render locally without publishing.
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,

    /// Ignore the response cache for this run.
    #[arg(long = "no-cache", action = ArgAction::SetTrue)]
    no_cache: bool,

    /// Empty the response cache before collecting.
    #[arg(long = "clear-cache", action = ArgAction::SetTrue)]
    clear_cache: bool,

    /// Local README path (defaults to `output.readme_file`).
    #[arg(long = "output", value_name = "PATH")]
    output: Option<PathBuf>,

    /// Also write the statistics as JSON to this path.
    #[arg(long = "json", value_name = "PATH")]
    json: Option<PathBuf>,

    /// Log debug events.
    #[arg(long = "verbose", short = 'v', action = ArgAction::SetTrue)]
    verbose: bool
}

/// Entry point that reports errors and sets the appropriate exit status.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("{}", error.to_display_string());
        process::exit(1);
    }
}

/// Executes the CLI using parsed arguments.
///
/// # Errors
///
/// Propagates configuration, credential, collection and publish failures.
async fn run() -> Result<(), Error> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Update(args)) => run_update(&cli.config, args).await,
        Some(Command::Cache {
            command
        }) => run_cache(&cli.config, command),
        Some(Command::Quota) => run_quota(&cli.config).await,
        Some(Command::ShowConfig) => run_show_config(&cli.config),
        None => run_update(&cli.config, cli.update).await
    }
}

/// Loads the configuration and applies environment overrides.
///
/// A missing file resolves to the defaults, which are written to `path`.
/// Returns whether the file was created.
fn load_settings(path: &Path) -> Result<(Settings, bool), Error> {
    let (mut settings, created) = match Settings::load(path)? {
        Some(settings) => (settings, false),
        None => {
            let defaults = Settings::default();
            defaults.save(path)?;
            (defaults, true)
        }
    };
    settings.apply_env_overrides();
    Ok((settings, created))
}

async fn run_update(config_path: &Path, args: UpdateArgs) -> Result<(), Error> {
    let (mut settings, created) = load_settings(config_path)?;
    if args.no_cache {
        settings.cache.enabled = false;
    }
    init_logging(&settings.logging, args.verbose)?;
    if created {
        info!("Wrote default configuration to {}", config_path.display());
    }

    settings.check_credentials()?;
    if !config::is_valid_token(settings.github.token.trim()) {
        warn!("The token does not look like a GitHub token; continuing anyway");
    }
    for problem in settings.validate() {
        warn!("Configuration: {}", problem);
    }

    if args.clear_cache {
        let removed = CacheStore::open(&settings.cache.directory)?.clear();
        info!("Cleared {} cache entries", removed);
    }

    let client = GitHubClient::new(settings.github.token.trim(), &settings.github.api_url)?;
    let collector = StatsCollector::new(client, settings.clone())?;
    let stats = collector.calculate_all().await?;

    if settings.output.print_to_console {
        println!("{}", console_summary(&stats));
    }

    let json_path = args
        .json
        .clone()
        .or_else(|| settings.output.save_json.then(|| PathBuf::from(&settings.output.json_file)));
    if let Some(path) = json_path {
        write_file(&path, &serde_json::to_string_pretty(&stats)?)?;
        info!("Statistics saved to {}", path.display());
    }

    let username = settings.github.username.trim();
    let document = render_profile(&stats, username, &settings.readme, Utc::now());
    let readme_path =
        args.output.clone().unwrap_or_else(|| PathBuf::from(&settings.output.readme_file));
    write_file(&readme_path, &document)?;
    info!("README written to {}", readme_path.display());

    if args.dry_run {
        println!("{}", preview(&document));
        info!("Dry run: nothing published");
        return Ok(());
    }

    match collector.publish(&document).await {
        Ok(receipt) => {
            if let Some(url) = receipt.html_url {
                println!("Profile updated: {url}");
            }
            Ok(())
        }
        Err(error) => {
            warn!("Publishing failed; the rendered README is kept at {}", readme_path.display());
            Err(error)
        }
    }
}

fn run_cache(config_path: &Path, command: CacheCommand) -> Result<(), Error> {
    let (settings, _) = load_settings(config_path)?;
    let store = CacheStore::open(&settings.cache.directory)?;

    match command {
        CacheCommand::Info => {
            let info = store.info();
            println!("Cache directory: {}", info.directory.display());
            println!("Entries:         {}", info.entry_count);
            println!("Size:            {:.2} KiB", info.total_size_bytes as f64 / 1024.0);
        }
        CacheCommand::Clear => {
            println!("Removed {} cache entries", store.clear());
        }
    }
    Ok(())
}

async fn run_quota(config_path: &Path) -> Result<(), Error> {
    let (settings, _) = load_settings(config_path)?;
    settings.check_credentials()?;

    let client = GitHubClient::new(settings.github.token.trim(), &settings.github.api_url)?;
    let status = QuotaMonitor::new(&settings.rate_limit).check_status(&client).await;
    println!("{}", status.status_message());
    Ok(())
}

fn run_show_config(config_path: &Path) -> Result<(), Error> {
    let (settings, _) = load_settings(config_path)?;
    print!("{}", settings.to_display_yaml()?);

    let problems = settings.validate();
    if !problems.is_empty() {
        eprintln!("Problems:");
        for problem in problems {
            eprintln!("  - {problem}");
        }
    }
    Ok(())
}

/// Writes `contents` to `path`, creating parent directories.
fn write_file(path: &Path, contents: &str) -> Result<(), Error> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| output_io_error(parent, source))?;
    }
    fs::write(path, contents).map_err(|source| output_io_error(path, source))
}

/// First lines of the rendered document.
fn preview(document: &str) -> String {
    let mut lines: Vec<&str> = document.lines().take(PREVIEW_LINES).collect();
    if document.lines().count() > PREVIEW_LINES {
        lines.push("...");
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::Parser;
    use tempfile::tempdir;

    use super::{CacheCommand, Cli, Command, load_settings, preview, run_cache, write_file};

    #[test]
    fn cli_defaults_to_update_flags() {
        let cli = Cli::try_parse_from([env!("CARGO_PKG_NAME"), "--dry-run", "--no-cache"])
            .expect("failed to parse CLI");

        assert!(cli.command.is_none());
        assert_eq!(cli.config, Path::new("config.yaml"));
        assert!(cli.update.dry_run);
        assert!(cli.update.no_cache);
        assert!(!cli.update.clear_cache);
    }

    #[test]
    fn update_subcommand_accepts_paths() {
        let cli = Cli::try_parse_from([
            env!("CARGO_PKG_NAME"),
            "update",
            "--config",
            "custom.yaml",
            "--output",
            "out/README.md",
            "--json",
            "out/stats.json",
            "--verbose",
        ])
        .expect("failed to parse CLI");

        assert_eq!(cli.config, Path::new("custom.yaml"));
        match cli.command.expect("missing command") {
            Command::Update(args) => {
                assert_eq!(args.output.as_deref(), Some(Path::new("out/README.md")));
                assert_eq!(args.json.as_deref(), Some(Path::new("out/stats.json")));
                assert!(args.verbose);
            }
            other => panic!("unexpected command variant: {other:?}")
        }
    }

    #[test]
    fn cache_and_quota_subcommands_parse() {
        let cli = Cli::try_parse_from([env!("CARGO_PKG_NAME"), "cache", "clear"])
            .expect("failed to parse CLI");
        assert!(matches!(
            cli.command,
            Some(Command::Cache {
                command: CacheCommand::Clear
            })
        ));

        let cli =
            Cli::try_parse_from([env!("CARGO_PKG_NAME"), "quota"]).expect("failed to parse CLI");
        assert!(matches!(cli.command, Some(Command::Quota)));

        let cli = Cli::try_parse_from([env!("CARGO_PKG_NAME"), "show-config"])
            .expect("failed to parse CLI");
        assert!(matches!(cli.command, Some(Command::ShowConfig)));
    }

    #[test]
    fn missing_configuration_is_written_with_defaults() {
        let temp = tempdir().expect("failed to create tempdir");
        let path = temp.path().join("config.yaml");

        let (settings, created) = load_settings(&path).expect("load");
        assert!(created);
        assert!(path.exists());
        assert_eq!(settings.stats.days_back, 365);

        let (_, created) = load_settings(&path).expect("reload");
        assert!(!created);
    }

    #[test]
    fn cache_clear_empties_configured_directory() {
        let temp = tempdir().expect("failed to create tempdir");
        let cache_dir = temp.path().join("cache");
        let config_path = temp.path().join("config.yaml");
        let yaml = format!("cache:\n  directory: {}\n", cache_dir.display());
        std::fs::write(&config_path, yaml).expect("failed to write config");

        let store = profile_stats::CacheStore::open(&cache_dir).expect("open");
        assert!(store.set("repos_octocat", &vec![1, 2, 3]));

        run_cache(&config_path, CacheCommand::Clear).expect("clear");
        assert_eq!(store.info().entry_count, 0);
    }

    #[test]
    fn write_file_creates_parent_directories() {
        let temp = tempdir().expect("failed to create tempdir");
        let path = temp.path().join("nested").join("README.md");

        write_file(&path, "# Hello\n").expect("write");
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "# Hello\n");
    }

    #[test]
    fn preview_truncates_long_documents() {
        let document: String = (0..40).map(|line| format!("line {line}\n")).collect();
        let shown = preview(&document);

        assert_eq!(shown.lines().count(), 31);
        assert!(shown.ends_with("..."));
        assert_eq!(preview("short\n"), "short");
    }
}
