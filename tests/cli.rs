use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ssi_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ssi"))
}

fn write_nodes(dir: &Path) {
    fs::create_dir_all(dir.join("posts")).unwrap();
    fs::write(
        dir.join("posts/hello.json"),
        r#"{"id": "p1", "type": "BlogPost", "date": "2020-01-01", "title": "Hello", "body": "First post about rust"}"#,
    )
    .unwrap();
    fs::write(
        dir.join("posts/more.json"),
        r#"[
  {"id": "p2", "type": "BlogPost", "title": "Second", "body": "Cargo workspaces", "draft": true},
  {"id": "a1", "type": "Author", "name": "Ann"}
]"#,
    )
    .unwrap();
}

fn setup_test_env(config: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    write_nodes(&root.join("content"));

    let config_path = root.join("ssi.toml");
    fs::write(&config_path, config).unwrap();
    (tmp, config_path)
}

fn run_ssi(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ssi_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ssi binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

const FLAT_CONFIG: &str = r#"
[index]
copy_serialization_to_file = "search-index.json"

[fuse_options]
keys = ["title", { name = "body", weight = 0.5 }]
threshold = 0.4

[resolvers.BlogPost]
title = "/title"
body = "/body"

[source]
root = "content"
"#;

#[test]
fn test_build_flat_writes_snapshot() {
    let (tmp, config_path) = setup_test_env(FLAT_CONFIG);

    let (stdout, stderr, success) = run_ssi(&config_path, &["build"]);
    assert!(success, "build failed: {}", stderr);
    assert!(stdout.contains("pages: 2"), "stdout: {}", stdout);
    assert!(stdout.contains("documents: 2"), "stdout: {}", stdout);
    assert!(stdout.contains("digest: "));
    assert!(stdout.trim_end().ends_with("ok"));

    let snapshot = tmp.path().join("public/search-index.json");
    let written: Value = serde_json::from_str(&fs::read_to_string(snapshot).unwrap()).unwrap();
    let docs = written["fuse"]["documents"].as_array().unwrap();
    assert_eq!(docs[0]["id"], "p1");
    assert_eq!(docs[0]["date"], "2020-01-01");
    assert_eq!(docs[0]["title"], "Hello");
    assert_eq!(written["fuse"]["index"]["keys"].as_array().unwrap().len(), 2);
}

#[test]
fn test_build_respects_filter() {
    let config = format!("{}\n[filter]\nexclude_drafts = true\n", FLAT_CONFIG);
    let (_tmp, config_path) = setup_test_env(&config);

    let (stdout, stderr, success) = run_ssi(&config_path, &["build"]);
    assert!(success, "build failed: {}", stderr);
    assert!(stdout.contains("pages: 1"), "stdout: {}", stdout);
    assert!(stdout.contains("documents: 1"), "stdout: {}", stdout);
}

#[test]
fn test_build_namespaced_counts() {
    let (_tmp, config_path) = setup_test_env(
        r#"
[index]
use_resolver_namespaces = true

[fuse_options]
keys = ["title"]

[resolvers.BlogPost.meta]
title = "/title"

[resolvers.BlogPost.body]
content = "/body"

[resolvers.Author.people]
name = "/name"

[source]
root = "content"
"#,
    );

    let (stdout, stderr, success) = run_ssi(&config_path, &["build"]);
    assert!(success, "build failed: {}", stderr);
    assert!(stdout.contains("pages: 3"), "stdout: {}", stdout);
    assert!(stdout.contains("documents.meta: 2"), "stdout: {}", stdout);
    assert!(stdout.contains("documents.body: 2"), "stdout: {}", stdout);
    assert!(stdout.contains("documents.people: 1"), "stdout: {}", stdout);
}

#[test]
fn test_inspect_prints_artifact() {
    let (tmp, config_path) = setup_test_env(FLAT_CONFIG);

    let (stdout, stderr, success) = run_ssi(&config_path, &["inspect"]);
    assert!(success, "inspect failed: {}", stderr);
    let result: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["fuse"]["documents"].as_array().unwrap().len(), 2);
    assert!(!tmp.path().join("public").exists());
}

#[test]
fn test_inspect_without_matching_types() {
    let (_tmp, config_path) = setup_test_env(
        r#"
[resolvers.Recipe]
title = "/title"

[source]
root = "content"
"#,
    );

    let (stdout, stderr, success) = run_ssi(&config_path, &["inspect"]);
    assert!(success, "inspect failed: {}", stderr);
    let result: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result, serde_json::json!({ "fuse": null }));
}

#[test]
fn test_input_overrides_source_root() {
    let (tmp, config_path) = setup_test_env(
        r#"
[fuse_options]
keys = ["title"]

[resolvers.BlogPost]
title = "/title"
"#,
    );
    let other = tmp.path().join("other");
    fs::create_dir_all(&other).unwrap();
    fs::write(other.join("x.json"), r#"{"id": "x", "type": "BlogPost", "title": "X"}"#).unwrap();

    let (stdout, stderr, success) =
        run_ssi(&config_path, &["build", "--input", other.to_str().unwrap()]);
    assert!(success, "build failed: {}", stderr);
    assert!(stdout.contains("pages: 1"), "stdout: {}", stdout);
}

#[test]
fn test_missing_keys_is_reported_not_fatal() {
    let (_tmp, config_path) = setup_test_env(
        r#"
[resolvers.BlogPost]
title = "/title"

[source]
root = "content"
"#,
    );

    let (stdout, stderr, success) = run_ssi(&config_path, &["build"]);
    assert!(success, "build failed: {}", stderr);
    assert!(stderr.contains("requires keys"), "stderr: {}", stderr);
    assert!(stdout.contains("documents: 2"), "stdout: {}", stdout);
}

#[test]
fn test_file_cache_survives_rebuild() {
    let config = format!("{}\n[cache]\ndir = \".cache\"\n", FLAT_CONFIG);
    let (tmp, config_path) = setup_test_env(&config);

    let (first, stderr, success) = run_ssi(&config_path, &["build"]);
    assert!(success, "first build failed: {}", stderr);
    assert_eq!(fs::read_dir(tmp.path().join(".cache")).unwrap().count(), 1);

    let (second, stderr, success) = run_ssi(&config_path, &["build"]);
    assert!(success, "second build failed: {}", stderr);
    assert_eq!(first, second);
}

#[test]
fn test_changed_config_rebuilds_cached_index() {
    let config = format!("{}\n[cache]\ndir = \".cache\"\n", FLAT_CONFIG);
    let (_tmp, config_path) = setup_test_env(&config);

    let (stdout, stderr, success) = run_ssi(&config_path, &["build"]);
    assert!(success, "flat build failed: {}", stderr);
    assert!(stdout.contains("documents: 2"), "stdout: {}", stdout);

    fs::write(
        &config_path,
        r#"
[index]
use_resolver_namespaces = true

[fuse_options]
keys = ["content"]

[resolvers.BlogPost.body]
content = "/body"

[source]
root = "content"

[cache]
dir = ".cache"
"#,
    )
    .unwrap();

    let (stdout, stderr, success) = run_ssi(&config_path, &["inspect"]);
    assert!(success, "inspect failed: {}", stderr);
    let result: Value = serde_json::from_str(&stdout).unwrap();
    assert!(result["fuse"]["documents"].is_null(), "stale flat artifact: {}", stdout);
    let body = result["fuse"]["body"]["documents"].as_array().unwrap();
    assert_eq!(body.len(), 2);
    assert_eq!(body[0]["content"], "First post about rust");
}

#[test]
fn test_invalid_config_fails() {
    let (_tmp, config_path) = setup_test_env(
        r#"
[index]
use_resolver_namespaces = true

[resolvers.BlogPost]
title = "/title"
"#,
    );

    let (_stdout, stderr, success) = run_ssi(&config_path, &["build"]);
    assert!(!success);
    assert!(stderr.contains("namespace table"), "stderr: {}", stderr);
}

struct ServerGuard(std::process::Child);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[test]
fn test_serve_exposes_search_index() {
    let port = free_port();
    let config = format!("{}\n[server]\nbind = \"127.0.0.1:{}\"\n", FLAT_CONFIG, port);
    let (_tmp, config_path) = setup_test_env(&config);

    let child = Command::new(ssi_binary())
        .arg("--config")
        .arg(&config_path)
        .arg("serve")
        .env_remove("RUST_LOG")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .unwrap();
    let _guard = ServerGuard(child);

    let client = reqwest::blocking::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    let mut health = None;
    for _ in 0..100 {
        if let Ok(resp) = client.get(format!("{}/health", base)).send() {
            health = Some(resp.json::<Value>().unwrap());
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
    let health = health.expect("server did not come up");
    assert_eq!(health["status"], "ok");

    let body: Value = client
        .get(format!("{}/search-index", base))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["fuse"]["documents"].as_array().unwrap().len(), 2);
    assert!(body["fuse"]["index"]["records"].is_array());
}
