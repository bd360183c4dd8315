//! Integration tests for the download manager over real HTTP and the local filesystem.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bulkfetch_core::{
    DownloadManager, DownloadStatus, DownloadableFile, EngineOptions, FsStorage, HttpClient,
    Settings,
};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::fixtures::{
    fast_options, files_under, sevenz_bytes, tar_gz_bytes, wait_for_status, wait_until,
    zip_bytes,
};
use support::socket_guard::start_mock_server_or_skip;

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        mock_server
    }};
}

struct Setup {
    dir: TempDir,
    settings: Settings,
    manager: DownloadManager,
}

fn setup(options: EngineOptions) -> Setup {
    let dir = TempDir::new().unwrap();
    let settings = Settings::new();
    settings.set_download_root(dir.path().to_string_lossy().into_owned());
    let manager = DownloadManager::new(
        Arc::new(HttpClient::new()),
        Arc::new(FsStorage::new()),
        settings.subscribe(),
        options,
    );
    Setup {
        dir,
        settings,
        manager,
    }
}

fn record(server: &MockServer, name: &str) -> DownloadableFile {
    DownloadableFile::new(name, name, format!("{}/files/{name}", server.uri()))
}

#[tokio::test]
async fn test_download_writes_body_to_disk() {
    let server = require_mock_server!();
    let body: Vec<u8> = (0..200_000u32).map(|i| (i % 256) as u8).collect();
    Mock::given(method("GET"))
        .and(path("/files/game.bin"))
        .and(header("accept-encoding", "identity"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let s = setup(fast_options());
    s.manager.start_download(record(&server, "game.bin")).unwrap();
    wait_for_status(&s.manager, "game.bin", DownloadStatus::Completed).await;

    let written = std::fs::read(s.dir.path().join("game.bin")).unwrap();
    assert_eq!(written, body);
    let item = s.manager.tracker().get("game.bin").unwrap();
    assert_eq!(item.downloaded_bytes, 200_000);
    assert_eq!(item.percentage(), 100);
}

#[tokio::test]
async fn test_http_error_fails_after_three_attempts() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/files/missing.bin"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;

    let s = setup(fast_options());
    s.manager
        .start_download(record(&server, "missing.bin"))
        .unwrap();
    wait_for_status(&s.manager, "missing.bin", DownloadStatus::Failed).await;

    assert!(files_under(s.dir.path()).is_empty());
    assert_eq!(s.manager.stats().retried(), 2);
}

#[tokio::test]
async fn test_retry_after_server_recovers() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/files/flaky.bin"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/flaky.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"recovered".to_vec()))
        .mount(&server)
        .await;

    let s = setup(fast_options());
    s.manager.start_download(record(&server, "flaky.bin")).unwrap();
    wait_for_status(&s.manager, "flaky.bin", DownloadStatus::Failed).await;

    assert!(s.manager.retry_download("flaky.bin"));
    wait_for_status(&s.manager, "flaky.bin", DownloadStatus::Completed).await;
    assert_eq!(
        std::fs::read(s.dir.path().join("flaky.bin")).unwrap(),
        b"recovered"
    );
}

#[tokio::test]
async fn test_zip_extracted_then_deleted_with_download() {
    let server = require_mock_server!();
    let archive = zip_bytes(&[
        ("Game/", None),
        ("Game/game.bin", Some(b"rom".as_slice())),
        ("Game/docs/manual.txt", Some(b"manual".as_slice())),
    ]);
    Mock::given(method("GET"))
        .and(path("/files/game.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let s = setup(fast_options());
    s.manager.start_download(record(&server, "game.zip")).unwrap();
    wait_for_status(&s.manager, "game.zip", DownloadStatus::Completed).await;

    assert_eq!(files_under(s.dir.path()), vec!["docs/manual.txt", "game.bin"]);

    s.manager.delete_download("game.zip", true);
    assert!(files_under(s.dir.path()).is_empty());
    assert!(s.manager.downloads().is_empty());
}

#[tokio::test]
async fn test_tar_gz_extracted_into_collection_folder() {
    let server = require_mock_server!();
    let archive = tar_gz_bytes(&[
        ("Disc/", None),
        ("Disc/disc.iso", Some(b"iso".as_slice())),
        ("Disc/extras/cover.txt", Some(b"cover".as_slice())),
    ]);
    Mock::given(method("GET"))
        .and(path("/files/disc.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let s = setup(fast_options());
    s.settings.set_separate_by_collection(true);
    s.manager
        .start_download(record(&server, "disc.tar.gz").with_collection("sony_playstation_2"))
        .unwrap();
    wait_for_status(&s.manager, "disc.tar.gz", DownloadStatus::Completed).await;

    assert_eq!(
        files_under(s.dir.path()),
        vec!["Playstation 2/disc.iso", "Playstation 2/extras/cover.txt"]
    );
}

#[tokio::test]
async fn test_sevenz_extracted_then_archive_deleted() {
    let server = require_mock_server!();
    let archive = sevenz_bytes(&[
        ("Rom/", None),
        ("Rom/rom.bin", Some(b"rom".as_slice())),
    ]);
    Mock::given(method("GET"))
        .and(path("/files/rom.7z"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let s = setup(fast_options());
    s.manager.start_download(record(&server, "rom.7z")).unwrap();
    wait_for_status(&s.manager, "rom.7z", DownloadStatus::Completed).await;

    assert_eq!(files_under(s.dir.path()), vec!["rom.bin"]);
    assert_eq!(std::fs::read(s.dir.path().join("rom.bin")).unwrap(), b"rom");
}

#[tokio::test]
async fn test_auto_extract_off_keeps_archive() {
    let server = require_mock_server!();
    let archive = zip_bytes(&[("game.bin", Some(b"rom".as_slice()))]);
    Mock::given(method("GET"))
        .and(path("/files/game.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let s = setup(fast_options());
    s.settings.set_auto_extract(false);
    s.manager.start_download(record(&server, "game.zip")).unwrap();
    wait_for_status(&s.manager, "game.zip", DownloadStatus::Completed).await;

    assert_eq!(files_under(s.dir.path()), vec!["game.zip"]);
}

#[tokio::test]
async fn test_cancel_while_waiting_for_response_stops() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/files/slow.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let s = setup(fast_options());
    s.manager.start_download(record(&server, "slow.bin")).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    s.manager.cancel_download("slow.bin");
    assert_eq!(
        s.manager.tracker().status("slow.bin"),
        Some(DownloadStatus::Stopped)
    );

    let stats = s.manager.stats();
    wait_until(|| stats.stopped() == 1).await;
    assert_eq!(stats.failed(), 0);
    assert!(files_under(s.dir.path()).is_empty());
}

#[tokio::test]
async fn test_speed_limit_applies_to_http_transfer() {
    let server = require_mock_server!();
    let body = vec![7u8; 512 * 1024];
    Mock::given(method("GET"))
        .and(path("/files/limited.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;

    let s = setup(fast_options());
    s.settings.set_speed_limit(0.5);
    let started = Instant::now();
    s.manager
        .start_download(record(&server, "limited.bin"))
        .unwrap();
    wait_for_status(&s.manager, "limited.bin", DownloadStatus::Completed).await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(700), "took {elapsed:?}");
}

#[tokio::test]
async fn test_missing_root_fails_without_request() {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let s = setup(fast_options());
    s.settings.set_download_root("");
    s.manager.start_download(record(&server, "game.bin")).unwrap();
    wait_for_status(&s.manager, "game.bin", DownloadStatus::Failed).await;
}
