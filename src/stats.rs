//! Crawl health overview.
//!
//! Summarizes the frontier and the document archive per source. Used by
//! `lexm stats` to check that runs make progress and to spot sources whose
//! URLs keep failing.

use anyhow::Result;

use crate::config::Config;
use crate::store::{CrawlStore, SqliteStore};

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let stats = store.source_stats(config.crawler.max_fail_count).await?;
    store.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    let total = |f: fn(&crate::store::SourceStats) -> i64| stats.iter().map(f).sum::<i64>();

    println!("Legal Mirror - Crawl Stats");
    println!("==========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", total(|s| s.documents));
    println!("  Pending:     {}", total(|s| s.pending));
    println!("  Succeeded:   {}", total(|s| s.succeeded));
    println!(
        "  Failed:      {} ({} at retry ceiling)",
        total(|s| s.failed),
        total(|s| s.exhausted)
    );

    if !stats.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<16} {:>7} {:>7} {:>7} {:>9} {:>6}   {}",
            "SOURCE", "PENDING", "OK", "FAILED", "EXHAUSTED", "DOCS", "LAST FETCH"
        );
        println!("  {}", "-".repeat(76));

        for s in &stats {
            let fetch_display = match s.last_fetched_at {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<16} {:>7} {:>7} {:>7} {:>9} {:>6}   {}",
                s.source_key, s.pending, s.succeeded, s.failed, s.exhausted, s.documents,
                fetch_display
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_scale_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 2 * 3600), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
    }
}
