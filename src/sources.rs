//! Source registry commands.
//!
//! Sources are declared in the config under `[sources.<key>]`. `sync` writes
//! them to the `sources` table, which is the only place the crawler reads
//! them from. `list` shows the declared registry next to what is stored.

use anyhow::Result;

use crate::config::Config;
use crate::store::{CrawlStore, SqliteStore};

/// Upsert every configured source into the store. Returns how many were written.
pub async fn sync_sources(config: &Config, store: &dyn CrawlStore) -> Result<usize> {
    let registry = config.source_registry();
    for source in &registry {
        store.upsert_source(source).await?;
    }
    Ok(registry.len())
}

pub async fn run_sync(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let count = sync_sources(config, &store).await?;
    store.close().await;

    println!("Synced {} source{}.", count, if count == 1 { "" } else { "s" });
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let stored = store.list_sources().await?;
    store.close().await;

    let declared = config.source_registry();
    if declared.is_empty() && stored.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    println!(
        "{:<16} {:<8} {:<8} {:>5}  {}",
        "SOURCE", "ENABLED", "SYNCED", "SEEDS", "HOSTS"
    );
    for source in &declared {
        let synced = match stored.iter().find(|s| s.key == source.key) {
            Some(s) if s == source => "yes",
            Some(_) => "stale",
            None => "no",
        };
        println!(
            "{:<16} {:<8} {:<8} {:>5}  {}",
            source.key,
            source.enabled,
            synced,
            source.seed_urls.len(),
            source.allowed_hosts.join(",")
        );
    }
    for source in stored
        .iter()
        .filter(|s| !declared.iter().any(|d| d.key == s.key))
    {
        println!(
            "{:<16} {:<8} {:<8} {:>5}  {}",
            source.key,
            source.enabled,
            "orphan",
            source.seed_urls.len(),
            source.allowed_hosts.join(",")
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn sync_writes_every_declared_source() {
        let config = parse_config(
            r#"
[db]
path = "unused.sqlite"

[storage]
root = "blobs"

[sources.dre]
name = "Diário da República"
seed_urls = ["https://dre.pt/legislacao"]
allowed_hosts = ["dre.pt"]

[sources.old]
name = "Retired"
seed_urls = ["https://old.example.pt/"]
allowed_hosts = ["old.example.pt"]
enabled = false
"#,
        )
        .unwrap();

        let store = MemoryStore::new();
        assert_eq!(sync_sources(&config, &store).await.unwrap(), 2);
        assert_eq!(store.list_sources().await.unwrap().len(), 2);

        let enabled = store.enabled_sources().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].key, "dre");
    }
}
