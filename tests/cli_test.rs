//! Integration tests for the gallery-sync command line
//!
//! Every test runs the built binary in its own temporary directory.

use assert_cmd::Command;
use predicates::prelude::*;
use std::error::Error;
use std::fs;
use tempfile::TempDir;

fn cli() -> Command {
    Command::cargo_bin("gallery-sync").expect("Failed to find gallery-sync binary")
}

#[test]
fn test_config_generation() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("gallery-sync.yaml");

    cli().arg("init").current_dir(temp_dir.path()).assert().success();

    assert!(config_path.exists(), "Config file should be created");

    let content = fs::read_to_string(&config_path)?;
    assert!(content.contains("api_base_url"));
    assert!(content.contains("cache_file"));
    assert!(content.contains("allowed_types"));
    assert!(content.contains("delay_ms"));

    Ok(())
}

#[test]
fn test_init_command_with_force() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("gallery-sync.yaml");

    let initial_content = "api_base_url: http://old\ncache_file: old.json\n";
    fs::write(&config_path, initial_content)?;

    let output = cli()
        .arg("init")
        .current_dir(temp_dir.path())
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone())?;
    assert!(stdout.contains("Config file already exists"));
    assert_eq!(fs::read_to_string(&config_path)?, initial_content);

    cli()
        .arg("init")
        .arg("--force")
        .current_dir(temp_dir.path())
        .assert()
        .success();

    let new_content = fs::read_to_string(&config_path)?;
    assert_ne!(new_content, initial_content);
    assert!(new_content.contains("localhost:3000"));

    Ok(())
}

#[test]
fn test_status_command_without_cache() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;

    cli().arg("init").current_dir(temp_dir.path()).assert().success();

    cli()
        .arg("status")
        .current_dir(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("gallery-sync status"))
        .stdout(predicate::str::contains("API base URL: http://localhost:3000"))
        .stdout(predicate::str::contains("albums: not cached"))
        .stdout(predicate::str::contains("travel-records: not cached"));

    Ok(())
}

#[test]
fn test_status_command_with_cache() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("custom.yaml");
    let cache_path = temp_dir.path().join("cache.json");

    fs::write(
        &config_path,
        format!(
            "api_base_url: http://localhost:1\ncache_file: \"{}\"\n",
            cache_path.display()
        ),
    )?;
    let snapshot = r#"{"marker":"m-7","items":["a","b"],"fetched_at":"2024-01-01T00:00:00Z"}"#;
    let store = serde_json::json!({ "gallery-sync:album-tags": snapshot });
    fs::write(&cache_path, store.to_string())?;

    cli()
        .arg("status")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "Cache file: {}",
            cache_path.display()
        )))
        .stdout(predicate::str::contains("album-tags: 2 items, marker m-7"))
        .stdout(predicate::str::contains("albums: not cached"));

    Ok(())
}

#[test]
fn test_unknown_domain_rejected() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;

    cli()
        .arg("sync")
        .arg("photos")
        .current_dir(temp_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown domain"));

    Ok(())
}

#[test]
fn test_missing_config_error() -> Result<(), Box<dyn Error>> {
    let temp_dir = TempDir::new()?;
    let nonexistent_path = temp_dir.path().join("does_not_exist.yaml");

    cli()
        .arg("sync")
        .arg("albums")
        .arg("--config")
        .arg(&nonexistent_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));

    Ok(())
}
