//! End-to-end pipeline tests against a mock archive server.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use waymirror::config::{ArchiveCredentials, MirrorConfig};
use waymirror::supervisor::CrawlSupervisor;
use waymirror::work_queue::{QueueStatus, WorkQueue};

const TS: &str = "20230101000000";

fn capture_path(original: &str) -> String {
    format!("/web/{TS}/{original}")
}

async fn write_selections(dir: &Path, lines: &str) -> PathBuf {
    let path = dir.join("selections.txt");
    tokio::fs::write(&path, lines).await.expect("write selections");
    path
}

fn config_for(server: &mockito::ServerGuard, out: &Path) -> MirrorConfig {
    MirrorConfig::builder()
        .archive_host(server.url())
        .output_dir(out)
        .no_delay(true)
        .build()
}

const ROOT_HTML: &str = r#"<html><head>
<link rel="stylesheet" href="https://cdn.y.com/s.css">
</head><body>
<img src="/img/x.png">
<a href="/about">About us</a>
</body></html>"#;

const ABOUT_HTML: &str = "<html><body><p>About.</p></body></html>";
const CSS_BODY: &str = "@font-face { src: url(/fonts/body.woff2); }";
const FONT_BYTES: &[u8] = &[0x77, 0x4f, 0x46, 0x32, 1, 2, 3, 4];
const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0xff];

/// Mount the full mock site. Expected hit counts account for link
/// discovery treating internal `<img>`/`<link>` references as pages too.
async fn mount_site(server: &mut mockito::ServerGuard) -> Vec<mockito::Mock> {
    let mut mocks = Vec::new();

    mocks.push(
        server
            .mock("GET", capture_path("https://ex.com/").as_str())
            .with_header("content-type", "text/html")
            .with_body(ROOT_HTML)
            .expect(1)
            .create_async()
            .await,
    );
    mocks.push(
        server
            .mock("GET", capture_path("https://ex.com/about").as_str())
            .with_header("content-type", "text/html")
            .with_body(ABOUT_HTML)
            .expect(1)
            .create_async()
            .await,
    );
    // Fetched once as an asset, once as a discovered "page"
    mocks.push(
        server
            .mock("GET", capture_path("https://ex.com/img/x.png").as_str())
            .with_header("content-type", "image/png")
            .with_body(PNG_BYTES)
            .expect(2)
            .create_async()
            .await,
    );
    // External stylesheet: asset only, never enqueued as a page
    mocks.push(
        server
            .mock("GET", capture_path("https://cdn.y.com/s.css").as_str())
            .with_header("content-type", "text/css")
            .with_body(CSS_BODY)
            .expect(1)
            .create_async()
            .await,
    );
    // Referenced by the stylesheet, fetched in the flat second batch
    mocks.push(
        server
            .mock("GET", capture_path("https://cdn.y.com/fonts/body.woff2").as_str())
            .with_header("content-type", "font/woff2")
            .with_body(FONT_BYTES)
            .expect(1)
            .create_async()
            .await,
    );

    mocks
}

#[tokio::test]
async fn full_site_snapshot_with_discovery_and_dedup() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("archived_pages");
    let mocks = mount_site(&mut server).await;

    let selections = write_selections(dir.path(), "20230101000000|https://ex.com/\n").await;

    let creds = ArchiveCredentials::new("user", "sig");
    let supervisor = CrawlSupervisor::new(config_for(&server, &out), &creds)
        .await
        .expect("supervisor builds");
    let stats = supervisor.run(&selections).await.expect("run succeeds");

    // Root page, /about, and the discovered /img/x.png pseudo-page
    assert_eq!(stats.pages_completed, 3);
    assert_eq!(stats.pages_failed, 0);
    assert_eq!(stats.queue.pending, 0);

    let snapshot = out.join("ex.com").join(TS);

    // Rewritten root document references local paths
    let index = tokio::fs::read_to_string(snapshot.join("index.html"))
        .await
        .expect("index.html exists");
    assert!(index.contains(r#"src="assets/img/x.png""#), "got: {index}");
    assert!(
        index.contains(r#"href="assets/external/cdn.y.com/s.css""#),
        "got: {index}"
    );
    // Page anchors are left for the queue, not rewritten
    assert!(index.contains(r#"href="/about""#), "got: {index}");

    // Assets mirror their source layout
    let png = tokio::fs::read(snapshot.join("assets/img/x.png"))
        .await
        .expect("png exists");
    assert_eq!(png, PNG_BYTES);
    assert_eq!(
        tokio::fs::read(snapshot.join("assets/external/cdn.y.com/fonts/body.woff2"))
            .await
            .expect("font exists"),
        FONT_BYTES
    );

    // The stylesheet was rewritten in place with the ../ prefix
    let css = tokio::fs::read_to_string(snapshot.join("assets/external/cdn.y.com/s.css"))
        .await
        .expect("css exists");
    assert!(
        css.contains("url(../assets/external/cdn.y.com/fonts/body.woff2)"),
        "got: {css}"
    );

    // Discovered pages landed in the same tree
    assert!(snapshot.join("about/index.html").exists());
    assert!(snapshot.join("img/x.png/index.html").exists());

    // Manifest reflects the files actually present
    let manifest: serde_json::Value = serde_json::from_str(
        &tokio::fs::read_to_string(snapshot.join("manifest.json"))
            .await
            .expect("manifest exists"),
    )
    .expect("manifest parses");
    assert_eq!(manifest["domain"], "ex.com");
    assert_eq!(manifest["timestamp"], TS);
    let pages = manifest["pages"].as_array().expect("pages array");
    assert!(pages.iter().any(|p| p == "index.html"));
    assert!(pages.iter().any(|p| p == "about/index.html"));
    assert_eq!(manifest["assets"]["total"], 3);
    assert_eq!(manifest["assets"]["byType"]["image"], 1);
    assert_eq!(manifest["assets"]["byType"]["css"], 1);
    assert_eq!(manifest["assets"]["byType"]["font"], 1);
    assert_eq!(manifest["assets"]["externalDomains"][0], "cdn.y.com");
    assert_eq!(manifest["skippedCount"], 0);

    // No skipped assets, no report file
    assert!(!snapshot.join("skipped_assets.json").exists());

    // Queue rows carry local paths and same-timestamp discovery
    let queue = WorkQueue::open(&out.join(".waymirror/queue.sqlite"))
        .await
        .expect("queue opens");
    let root_item = queue
        .get("https://ex.com/", TS)
        .await
        .expect("get")
        .expect("row exists");
    assert_eq!(root_item.status, QueueStatus::Completed);
    assert_eq!(
        root_item.local_path.as_deref(),
        Some("ex.com/20230101000000/index.html")
    );
    let discovered = queue
        .get("https://ex.com/about", TS)
        .await
        .expect("get")
        .expect("discovered row exists");
    assert_eq!(discovered.domain, "ex.com");
    assert_eq!(discovered.timestamp, TS);

    for mock in &mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn completed_work_is_not_refetched_on_resume() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("archived_pages");
    let mocks = mount_site(&mut server).await;

    let selections = write_selections(dir.path(), "20230101000000|https://ex.com/\n").await;
    let creds = ArchiveCredentials::new("user", "sig");

    let first = CrawlSupervisor::new(config_for(&server, &out), &creds)
        .await
        .expect("supervisor builds");
    first.run(&selections).await.expect("first run succeeds");

    // Same selections, fresh process: everything is already terminal, so
    // the hit counts above must not move
    let second = CrawlSupervisor::new(config_for(&server, &out), &creds)
        .await
        .expect("supervisor rebuilds");
    let stats = second.run(&selections).await.expect("second run succeeds");

    assert_eq!(stats.pages_completed, 0);
    assert_eq!(stats.pages_failed, 0);
    assert_eq!(stats.queue.pending, 0);

    for mock in &mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn interrupted_run_resumes_only_pending_items() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("archived_pages");

    // Simulate a previous run that completed one unit and left another
    // pending (e.g. killed mid-asset; its partial files get overwritten)
    let queue = WorkQueue::open(&out.join(".waymirror/queue.sqlite"))
        .await
        .expect("queue opens");
    queue
        .add("https://ex.com/done", TS, "ex.com")
        .await
        .expect("add");
    queue
        .add("https://ex.com/todo", TS, "ex.com")
        .await
        .expect("add");
    queue
        .mark_completed("https://ex.com/done", TS, "ex.com/20230101000000/done/index.html")
        .await
        .expect("mark completed");
    drop(queue);

    let done_mock = server
        .mock("GET", capture_path("https://ex.com/done").as_str())
        .expect(0)
        .create_async()
        .await;
    let todo_mock = server
        .mock("GET", capture_path("https://ex.com/todo").as_str())
        .with_header("content-type", "text/html")
        .with_body("<html><body>todo</body></html>")
        .expect(1)
        .create_async()
        .await;

    let selections = write_selections(dir.path(), "").await;
    let creds = ArchiveCredentials::new("user", "sig");
    let supervisor = CrawlSupervisor::new(config_for(&server, &out), &creds)
        .await
        .expect("supervisor builds");
    let stats = supervisor.run(&selections).await.expect("run succeeds");

    assert_eq!(stats.pages_completed, 1);
    assert_eq!(stats.queue.completed, 2);
    assert_eq!(stats.queue.pending, 0);

    done_mock.assert_async().await;
    todo_mock.assert_async().await;
}

#[tokio::test]
async fn one_failing_page_does_not_abort_the_run() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("archived_pages");

    server
        .mock("GET", capture_path("https://ex.com/broken").as_str())
        .with_status(500)
        .create_async()
        .await;
    server
        .mock("GET", capture_path("https://ex.com/fine").as_str())
        .with_header("content-type", "text/html")
        .with_body("<html><body>ok</body></html>")
        .expect(1)
        .create_async()
        .await;

    let selections = write_selections(
        dir.path(),
        "# two selections, first one broken\n\n20230101000000|https://ex.com/broken\n20230101000000|https://ex.com/fine\n",
    )
    .await;

    let creds = ArchiveCredentials::new("user", "sig");
    let supervisor = CrawlSupervisor::new(config_for(&server, &out), &creds)
        .await
        .expect("supervisor builds");
    let stats = supervisor.run(&selections).await.expect("run succeeds");

    assert_eq!(stats.pages_completed, 1);
    assert_eq!(stats.pages_failed, 1);

    let queue = WorkQueue::open(&out.join(".waymirror/queue.sqlite"))
        .await
        .expect("queue opens");
    let failed = queue
        .get("https://ex.com/broken", TS)
        .await
        .expect("get")
        .expect("row exists");
    assert_eq!(failed.status, QueueStatus::Failed);
    assert!(failed.error.is_some());
}

#[tokio::test]
async fn oversized_assets_surface_in_the_skipped_report() {
    let mut server = mockito::Server::new_async().await;
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("archived_pages");

    server
        .mock("GET", capture_path("https://ex.com/").as_str())
        .with_header("content-type", "text/html")
        .with_body(r#"<html><body><img src="/big.bin"></body></html>"#)
        .create_async()
        .await;
    server
        .mock("GET", capture_path("https://ex.com/big.bin").as_str())
        .with_body(vec![0u8; 4096])
        .create_async()
        .await;

    let selections = write_selections(dir.path(), "20230101000000|https://ex.com/\n").await;
    let creds = ArchiveCredentials::new("user", "sig");
    let config = MirrorConfig::builder()
        .archive_host(server.url())
        .output_dir(&out)
        .max_asset_size_mb(0.001) // ~1 KB gate
        .no_delay(true)
        .build();
    let supervisor = CrawlSupervisor::new(config, &creds)
        .await
        .expect("supervisor builds");
    supervisor.run(&selections).await.expect("run succeeds");

    let snapshot = out.join("ex.com").join(TS);
    assert!(!snapshot.join("assets/big.bin").exists());

    let report: serde_json::Value = serde_json::from_str(
        &tokio::fs::read_to_string(snapshot.join("skipped_assets.json"))
            .await
            .expect("report exists"),
    )
    .expect("report parses");
    assert_eq!(report["domain"], "ex.com");
    let entries = report["skipped"].as_array().expect("skipped array");
    assert!(
        entries
            .iter()
            .any(|e| e["url"] == "https://ex.com/big.bin" && e["reason"] == "size_limit")
    );
    assert!(entries[0]["sizeMB"].as_f64().expect("sizeMB present") > 0.0);

    let manifest: serde_json::Value = serde_json::from_str(
        &tokio::fs::read_to_string(snapshot.join("manifest.json"))
            .await
            .expect("manifest exists"),
    )
    .expect("manifest parses");
    assert_eq!(manifest["skippedCount"], 1);
}
