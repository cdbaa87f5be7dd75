#![allow(deprecated)] // cargo_bin is deprecated but still functional

use assert_cmd::Command;
use predicates::str::contains;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

async fn write_legacy(path: &Path, username: &str) {
    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .connect()
        .await
        .unwrap();
    for sql in [
        "CREATE TABLE sessions (dc_id INTEGER PRIMARY KEY, server_address TEXT, port INTEGER, auth_key BLOB, takeout_id INTEGER)",
        "CREATE TABLE entities (id INTEGER PRIMARY KEY, hash INTEGER NOT NULL, username TEXT, phone INTEGER, name TEXT, date INTEGER)",
        "INSERT INTO sessions VALUES (2, '149.154.167.50', 443, x'0102', NULL)",
    ] {
        sqlx::query(sql).execute(&mut conn).await.unwrap();
    }
    sqlx::query("INSERT INTO entities VALUES (1, 10, ?, NULL, NULL, 100)")
        .bind(username)
        .execute(&mut conn)
        .await
        .unwrap();
    conn.close().await.unwrap();
}

fn db_url(temp: &TempDir) -> String {
    format!("sqlite:{}", temp.path().join("dest.db").display())
}

fn sessionvault() -> Command {
    let mut cmd = Command::cargo_bin("sessionvault").unwrap();
    cmd.env_remove("SESSIONVAULT_CONFIG");
    cmd
}

#[tokio::test]
async fn migrate_one_then_list_and_delete() {
    let temp = TempDir::new().unwrap();
    let legacy: PathBuf = temp.path().join("alice.session");
    write_legacy(&legacy, "Alice").await;
    let url = db_url(&temp);

    sessionvault()
        .args(["migrate", "one"])
        .arg(&legacy)
        .arg(&url)
        .assert()
        .success()
        .stdout(contains("Migrated:"))
        .stdout(contains("-> alice"));

    sessionvault()
        .args(["sessions", "list", &url])
        .assert()
        .success()
        .stdout(contains("alice"));

    sessionvault()
        .args(["sessions", "delete", &url, "alice"])
        .assert()
        .success()
        .stdout(contains("Deleted session alice"));

    sessionvault()
        .args(["sessions", "delete", &url, "alice"])
        .assert()
        .failure()
        .stderr(contains("not found"));
}

#[tokio::test]
async fn migrate_one_with_explicit_name() {
    let temp = TempDir::new().unwrap();
    let legacy = temp.path().join("file.session");
    write_legacy(&legacy, "bob").await;
    let url = db_url(&temp);

    sessionvault()
        .args(["migrate", "one"])
        .arg(&legacy)
        .arg(&url)
        .args(["--session-name", "tenant-1"])
        .assert()
        .success();

    sessionvault()
        .args(["sessions", "list", &url])
        .assert()
        .success()
        .stdout(contains("tenant-1"));
}

#[tokio::test]
async fn migrate_dir_reports_each_file() {
    let temp = TempDir::new().unwrap();
    let legacy_dir = temp.path().join("legacy");
    std::fs::create_dir_all(&legacy_dir).unwrap();
    write_legacy(&legacy_dir.join("good.session"), "good").await;
    std::fs::write(legacy_dir.join("bad.session"), b"not a database, only text").unwrap();
    let url = db_url(&temp);

    sessionvault()
        .args(["migrate", "dir"])
        .arg(&legacy_dir)
        .arg(&url)
        .assert()
        .success()
        .stdout(contains("Migrated:"))
        .stdout(contains("Failed:"))
        .stdout(contains("1 migrated, 1 failed"));
}

#[test]
fn migrate_one_missing_source_fails() {
    let temp = TempDir::new().unwrap();
    let url = db_url(&temp);

    sessionvault()
        .args(["migrate", "one"])
        .arg(temp.path().join("missing.session"))
        .arg(&url)
        .assert()
        .failure()
        .stderr(contains("legacy source not found"));
}

#[test]
fn list_on_fresh_database_prints_nothing() {
    let temp = TempDir::new().unwrap();

    sessionvault()
        .args(["sessions", "list", &db_url(&temp)])
        .assert()
        .success()
        .stdout("");
}

#[test]
fn unsupported_connection_string_is_rejected() {
    sessionvault()
        .args(["sessions", "list", "mysql://localhost/db"])
        .assert()
        .failure()
        .stderr(contains("unsupported connection string"));
}
