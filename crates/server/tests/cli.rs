//! End-to-end tests for the `det` binary.

use std::io::Write;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout};

use detergent_core::{testing::fixtures, SqliteCatalog, TorrentCatalog};

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

struct TestEnv {
    dir: TempDir,
    config_path: PathBuf,
}

impl TestEnv {
    fn new(port: u16) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = dir.path().join("det.db");
        let config_path = dir.path().join("det.toml");

        let config = format!(
            r#"
[database]
path = "{}"

[torrent_client]
download_path = "{}"
enable_dht = false
enable_upnp = false

[server]
host = "127.0.0.1"
port = {}
"#,
            db_path.display(),
            dir.path().join("downloads").display(),
            port
        );
        std::fs::write(&config_path, config).unwrap();

        Self { dir, config_path }
    }

    fn db_path(&self) -> PathBuf {
        self.dir.path().join("det.db")
    }

    fn seed(&self) {
        let catalog = SqliteCatalog::new(&self.db_path()).unwrap();
        for (byte, count) in [(1u8, 5), (2, 20), (3, 1)] {
            for i in 0..count {
                catalog
                    .create_announce(&fixtures::info_hash(byte), &format!("peer-{}", i))
                    .unwrap();
            }
        }
        catalog
            .record_resolution(&fixtures::metadata(fixtures::info_hash(2), "Ubuntu ISO", 4096))
            .unwrap();
    }

    async fn det(&self, args: &[&str]) -> Output {
        timeout(
            Duration::from_secs(20),
            tokio::process::Command::new(env!("CARGO_BIN_EXE_det"))
                .arg("--config")
                .arg(&self.config_path)
                .args(args)
                .env("RUST_LOG", "error")
                .output(),
        )
        .await
        .expect("Command timed out")
        .expect("Failed to execute command")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Minimal HTTP GET returning the response body.
async fn http_get(port: u16, path: &str) -> Option<String> {
    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.ok()?;
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.ok()?;

    let mut response = String::new();
    stream.read_to_string(&mut response).await.ok()?;
    response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
}

async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    for _ in 0..max_attempts {
        if http_get(port, "/api/v1/health").await.is_some() {
            return true;
        }
        sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn test_info_prints_counters() {
    let env = TestEnv::new(get_available_port());
    env.seed();

    let output = env.det(&["info"]).await;
    assert!(output.status.success());

    let out = stdout(&output);
    assert!(out.contains("Torrents:  3"));
    assert!(out.contains("Resolved:  1"));
    assert!(out.contains("Announces: 26"));
}

#[tokio::test]
async fn test_popular_lists_most_announced_first() {
    let env = TestEnv::new(get_available_port());
    env.seed();

    let output = env.det(&["popular", "--limit", "2"]).await;
    assert!(output.status.success());

    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("20 "));
    assert!(lines[0].contains("Ubuntu ISO"));
    assert!(lines[1].starts_with("5 "));
    assert!(lines[1].contains("-- unresolved --"));
    assert!(lines[1].ends_with(&fixtures::info_hash(1).magnet_uri()));
}

#[tokio::test]
async fn test_search_is_case_insensitive() {
    let env = TestEnv::new(get_available_port());
    env.seed();

    let output = env.det(&["search", "UBUNTU"]).await;
    assert!(output.status.success());
    assert_eq!(stdout(&output).lines().count(), 1);
}

#[tokio::test]
async fn test_timeline_prints_today() {
    let env = TestEnv::new(get_available_port());
    env.seed();

    let output = env.det(&["timeline", "--days", "2", "--limit", "1"]).await;
    assert!(output.status.success());

    let out = stdout(&output);
    let today = chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string();
    assert!(out.contains(&today));
    assert!(out.contains("Ubuntu ISO"));
    assert!(!out.contains("-- unresolved --"));
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let output = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_det"))
            .args(["--config", "/nonexistent/det.toml", "info"])
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
}

#[tokio::test]
async fn test_resolve_rejects_bad_hash() {
    let env = TestEnv::new(get_available_port());
    let output = env.det(&["resolve", "not-a-hash"]).await;
    assert_eq!(output.status.code(), Some(1));
}

#[tokio::test]
async fn test_listen_indexes_events_and_serves_status() {
    let port = get_available_port();
    let env = TestEnv::new(port);

    let events_path = env.dir.path().join("events.jsonl");
    write_events(&events_path);

    let mut child = tokio::process::Command::new(env!("CARGO_BIN_EXE_det"))
        .arg("--config")
        .arg(&env.config_path)
        .args(["listen", "--events"])
        .arg(&events_path)
        .env("RUST_LOG", "error")
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn listener");

    assert!(
        wait_for_server(port, 100).await,
        "Status server did not start in time"
    );

    let mut stats = serde_json::Value::Null;
    for _ in 0..50 {
        if let Some(body) = http_get(port, "/api/v1/stats").await {
            stats = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
            if stats["total_announces"] == 2 {
                break;
            }
        }
        sleep(Duration::from_millis(100)).await;
    }

    assert_eq!(stats["total_torrents"], 2);
    assert_eq!(stats["total_announces"], 2);
    assert_eq!(stats["resolver"]["running"], true);

    let uri = format!("/api/v1/torrents/{}", fixtures::info_hash(7).to_hex());
    let body = http_get(port, &uri).await.expect("torrent lookup failed");
    let torrent: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(torrent["announce_count"], 3);

    child.kill().await.ok();
}

fn write_events(path: &Path) {
    let announced = fixtures::info_hash(7).to_hex();
    let queried = fixtures::info_hash(8).to_hex();
    let node_id = "ab".repeat(20);

    let mut file = std::fs::File::create(path).unwrap();
    for peer in ["10.0.0.1:6881", "10.0.0.2:6881", "10.0.0.1:6881"] {
        writeln!(
            file,
            r#"{{"type":"announce_peer","info_hash":"{}","peer":"{}"}}"#,
            announced, peer
        )
        .unwrap();
    }
    writeln!(
        file,
        r#"{{"type":"query","method":"get_peers","info_hash":"{}","node_id":"{}","source":"10.0.0.3:6881"}}"#,
        queried, node_id
    )
    .unwrap();
}
