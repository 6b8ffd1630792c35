// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Markdown rendering of aggregated statistics.
//!
//! [`render_profile`] produces the profile document published to the
//! `<account>/<account>` repository; [`console_summary`] produces the short
//! plain-text report printed after a run.

use chrono::{DateTime, Utc};

use crate::{
    config::{ReadmeSection, ReadmeSettings},
    stats::{ActivityHeatmap, AggregatedStats}
};

const LANGUAGE_LIMIT: usize = 10;
const LANGUAGE_BAR_WIDTH: usize = 40;
const CHART_BAR_WIDTH: usize = 50;
const HEATMAP_BUCKET_HOURS: usize = 3;
const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Formats an integer with spaces as thousands separators.
///
/// ```
/// assert_eq!(profile_stats::render::format_number(1234567), "1 234 567");
/// assert_eq!(profile_stats::render::format_number(42), "42");
/// ```
pub fn format_number(value: u64) -> String {
    let digits = value.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            formatted.push(' ');
        }
        formatted.push(digit);
    }
    formatted
}

/// Horizontal bar of `width` cells filled in proportion to `value / max`.
pub fn ascii_bar(value: u64, max: u64, width: usize) -> String {
    let filled = if max == 0 {
        0
    } else {
        ((value as f64 / max as f64) * width as f64) as usize
    }
    .min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// Percentage bar followed by the percentage with one decimal.
pub fn language_bar(percentage: f64, width: usize) -> String {
    let filled = ((percentage / 100.0) * width as f64).clamp(0.0, width as f64) as usize;
    format!("{}{} {:.1}%", "█".repeat(filled), "░".repeat(width - filled), percentage)
}

/// Markdown image of a shields.io static badge.
pub fn badge(label: &str, message: &str, color: &str, style: &str) -> String {
    let label = shield_escape(label);
    let message = shield_escape(message);
    format!("![{label}](https://img.shields.io/badge/{label}-{message}-{color}?style={style})")
}

fn shield_escape(text: &str) -> String {
    text.replace('-', "--").replace('_', "__").replace(' ', "%20")
}

fn has(settings: &ReadmeSettings, section: ReadmeSection) -> bool {
    settings.sections.contains(&section)
}

/// Renders the Markdown profile document.
///
/// Sections absent from `settings.sections` are left out. The language and
/// activity sections are also skipped when they hold no data.
pub fn render_profile(
    stats: &AggregatedStats,
    username: &str,
    settings: &ReadmeSettings,
    now: DateTime<Utc>
) -> String {
    let style = settings.badge_style.as_str();
    let mut out = String::new();

    if has(settings, ReadmeSection::Header) {
        out.push_str(&format!("# Hi, I'm {username}!\n\n"));
        out.push_str("## GitHub statistics (public and private)\n\n");
    }
    out.push_str("<div align=\"center\">\n\n");

    if has(settings, ReadmeSection::Stats) {
        out.push_str(&stats_table(stats));
    }
    if has(settings, ReadmeSection::Repos) {
        out.push_str("### Repositories\n\n");
        out.push_str(&badge_row(
            &[
                ("Total", stats.total_repos as u64, "blue"),
                ("Public", stats.public_repos as u64, "green"),
                ("Private", stats.private_repos as u64, "orange")
            ],
            style
        ));
    }
    if has(settings, ReadmeSection::Prs) {
        out.push_str("### Pull requests\n\n");
        out.push_str(&badge_row(
            &[
                ("Total", stats.prs.total, "blue"),
                ("Open", stats.prs.open, "green"),
                ("Merged", stats.prs.merged, "purple"),
                ("Closed", stats.prs.closed, "red")
            ],
            style
        ));
    }
    if has(settings, ReadmeSection::Issues) {
        out.push_str("### Issues\n\n");
        out.push_str(&badge_row(
            &[
                ("Total", stats.issues.total, "blue"),
                ("Open", stats.issues.open, "green"),
                ("Closed", stats.issues.closed, "red")
            ],
            style
        ));
    }
    out.push_str("</div>\n\n---\n\n");

    if has(settings, ReadmeSection::Languages) && !stats.languages.is_empty() {
        out.push_str("## Most used languages\n\n```\n");
        for share in stats.languages.iter().take(LANGUAGE_LIMIT) {
            out.push_str(&format!(
                "{:<20} {}\n",
                share.name,
                language_bar(share.percentage, LANGUAGE_BAR_WIDTH)
            ));
        }
        out.push_str("```\n\n---\n\n");
    }

    if has(settings, ReadmeSection::Activity) && !stats.activity_heatmap.is_empty() {
        out.push_str("## Activity heatmap (UTC)\n\n");
        out.push_str(&heatmap_block(&stats.activity_heatmap));
        out.push_str("\n---\n\n");
    }

    out.push_str("## Overview\n\n```\n");
    out.push_str(&overview_chart(stats));
    out.push_str("```\n\n---\n\n");

    if settings.include_update_time {
        out.push_str(&format!(
            "<div align=\"center\">\n\n  <sub>Stats updated automatically on {}</sub>\n\n</div>\n",
            now.format("%Y-%m-%d %H:%M UTC")
        ));
    }

    out
}

fn stats_table(stats: &AggregatedStats) -> String {
    let mut rows = vec![
        ("Total stars earned".to_owned(), stats.stars),
        (format!("Commits ({} days)", stats.period_days), stats.commits_last_year),
        ("Pull requests".to_owned(), stats.prs.total),
        ("Issues".to_owned(), stats.issues.total),
        ("Contributed repositories".to_owned(), stats.contributed_repos as u64),
    ];
    if stats.code_changes.total_changes > 0 {
        rows.push(("Lines added".to_owned(), stats.code_changes.additions));
        rows.push(("Lines deleted".to_owned(), stats.code_changes.deletions));
    }

    let mut table = String::from("### General\n\n| Metric | Value |\n|--------|-------|\n");
    for (metric, value) in rows {
        table.push_str(&format!("| {metric} | **{}** |\n", format_number(value)));
    }
    table.push('\n');
    table
}

fn badge_row(entries: &[(&str, u64, &str)], style: &str) -> String {
    let mut row = String::new();
    for (label, value, color) in entries {
        row.push_str(&badge(label, &format_number(*value), color, style));
        row.push('\n');
    }
    row.push('\n');
    row
}

fn intensity(count: u32, max: u32) -> &'static str {
    let ratio = if max == 0 { 0.0 } else { f64::from(count) / f64::from(max) };
    match count {
        0 => "⬜",
        _ if ratio < 0.25 => "🟩",
        _ if ratio < 0.5 => "🟨",
        _ if ratio < 0.75 => "🟧",
        _ => "🟥"
    }
}

/// Seven weekday rows of eight three-hour buckets.
fn heatmap_block(heatmap: &ActivityHeatmap) -> String {
    let buckets: Vec<Vec<u32>> = (0..WEEKDAYS.len())
        .map(|day| {
            (0..24)
                .step_by(HEATMAP_BUCKET_HOURS)
                .map(|hour| heatmap.bucket(day, hour, HEATMAP_BUCKET_HOURS))
                .collect()
        })
        .collect();
    let max = buckets.iter().flatten().copied().max().unwrap_or(0);

    let mut block = String::from("```\n     ");
    for hour in (0..24).step_by(HEATMAP_BUCKET_HOURS) {
        block.push_str(&format!("{hour:>3} "));
    }
    block.push('\n');
    for (name, row) in WEEKDAYS.iter().zip(&buckets) {
        block.push_str(&format!("{name}  "));
        for count in row {
            block.push_str(&format!(" {} ", intensity(*count, max)));
        }
        block.push('\n');
    }
    block.push_str("\n⬜ none  🟩 low  🟨 medium  🟧 high  🟥 very high\n```\n");
    block
}

fn overview_chart(stats: &AggregatedStats) -> String {
    let scaled_commits = stats.commits_last_year / 10;
    let max = stats.stars.max(scaled_commits).max(1);
    let rows = [
        ("Stars", stats.stars, stats.stars),
        ("Commits", scaled_commits, stats.commits_last_year),
        ("PRs", stats.prs.total * 3, stats.prs.total),
        ("Issues", stats.issues.total * 3, stats.issues.total)
    ];

    rows.iter()
        .map(|(label, scaled, actual)| {
            format!(
                "{:<12}: {} {}\n",
                label,
                ascii_bar(*scaled, max, CHART_BAR_WIDTH),
                format_number(*actual)
            )
        })
        .collect()
}

/// Plain-text summary printed after a run.
pub fn console_summary(stats: &AggregatedStats) -> String {
    let mut summary = String::from("Statistics summary\n");
    summary.push_str(&format!(
        "  Repositories: {} ({} public, {} private)\n",
        stats.total_repos, stats.public_repos, stats.private_repos
    ));
    summary.push_str(&format!("  Stars:        {}\n", format_number(stats.stars)));
    summary.push_str(&format!(
        "  Commits:      {} (last {} days)\n",
        format_number(stats.commits_last_year),
        stats.period_days
    ));
    summary.push_str(&format!(
        "  PRs:          {} ({} merged)\n",
        stats.prs.total, stats.prs.merged
    ));
    summary.push_str(&format!("  Issues:       {}\n", stats.issues.total));
    if stats.code_changes.total_changes > 0 {
        summary.push_str(&format!(
            "  Code changes: +{} -{}\n",
            format_number(stats.code_changes.additions),
            format_number(stats.code_changes.deletions)
        ));
    }
    if !stats.languages.is_empty() {
        let top: Vec<String> = stats
            .languages
            .iter()
            .take(3)
            .map(|share| format!("{} ({:.1}%)", share.name, share.percentage))
            .collect();
        summary.push_str(&format!("  Languages:    {}\n", top.join(", ")));
    }
    summary
}
