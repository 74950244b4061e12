use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn lexm_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_lexm"))
}

/// Config with one source whose seed points at a closed local port, so a
/// crawl fails fast without touching the network.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/lexm.sqlite"

[crawler]
politeness_delay_ms = 0
fetch_timeout_secs = 5

[storage]
backend = "fs"
root = "{root}/blobs"

[server]
bind = "127.0.0.1:0"

[sources.dre]
name = "Diário da República"
seed_urls = ["http://127.0.0.1:9/legislacao"]
allowed_hosts = ["127.0.0.1"]
allowed_prefixes = ["/legislacao"]

[sources.arquivo]
name = "Arquivo"
seed_urls = ["https://arquivo.example.pt/"]
allowed_hosts = ["arquivo.example.pt"]
enabled = false
"#,
        root = root.display()
    );

    let config_path = config_dir.join("lexm.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_lexm(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = lexm_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run lexm binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lexm(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(stdout.contains("2 sources"));
    assert!(tmp.path().join("data/lexm.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_lexm(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_lexm(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_sources_list_shows_sync_state() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_lexm(&config_path, &["sources", "list"]);
    assert!(success);
    assert!(stdout.contains("dre"));
    assert!(stdout.contains(" no "));

    let (stdout, _, success) = run_lexm(&config_path, &["sources", "sync"]);
    assert!(success);
    assert!(stdout.contains("Synced 2 sources"));

    let (stdout, _, success) = run_lexm(&config_path, &["sources", "list"]);
    assert!(success);
    assert!(stdout.contains("arquivo"));
    assert!(stdout.contains("yes"));
    assert!(!stdout.contains(" no "));
}

#[test]
fn test_crawl_records_unreachable_seed_as_error() {
    let (_tmp, config_path) = setup_test_env();
    run_lexm(&config_path, &["init"]);

    let (stdout, stderr, success) = run_lexm(&config_path, &["crawl"]);
    assert!(success, "crawl failed: stdout={}, stderr={}", stdout, stderr);

    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["processed"], 1);
    assert_eq!(result["errors"], 1);
    assert_eq!(result["documents"], 0);
    assert_eq!(result["newUrls"], 0);

    let (stdout, _, success) = run_lexm(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Crawl Stats"));
    assert!(stdout.contains("dre"));
    assert!(stdout.contains("Failed:      1"));
}

#[test]
fn test_stats_on_empty_database() {
    let (_tmp, config_path) = setup_test_env();
    run_lexm(&config_path, &["init"]);

    let (stdout, _, success) = run_lexm(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   0"));
}

#[test]
fn test_get_missing_document_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_lexm(&config_path, &["init"]);

    let (_, stderr, success) = run_lexm(&config_path, &["get", "https://dre.pt/legislacao/1"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_prune_reports_removed_rows() {
    let (_tmp, config_path) = setup_test_env();
    run_lexm(&config_path, &["init"]);

    let (stdout, _, success) = run_lexm(&config_path, &["prune", "--days", "30"]);
    assert!(success);
    assert!(stdout.contains("Pruned 0"));
}

#[test]
fn test_invalid_config_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("lexm.toml");
    fs::write(
        &config_path,
        "[db]\npath = \"x.sqlite\"\n\n[storage]\nbackend = \"ftp\"\n",
    )
    .unwrap();

    let (_, stderr, success) = run_lexm(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Unknown storage backend"));
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run_lexm(Path::new("/nonexistent/lexm.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
