//! End-to-end update pipeline tests against a mock update server.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

use vidgrab_updater::{
    CancelToken, CheckOutcome, CheckTrigger, UpdateCoordinator, UpdateError, UpdateEvent,
    UpdateOutcome, UpdateSettings, UpdateStatus, VERSION_FILE, null_sink,
};

fn make_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(&mut cursor);
    let options = SimpleFileOptions::default();
    for (name, body) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap();
    cursor.into_inner()
}

async fn mock_release_server(version: &str, archive: Vec<u8>) -> MockServer {
    let server = MockServer::start().await;
    let manifest = json!({
        "latest_version": version,
        "name": format!("VidGrab {version}"),
        "body": "Assorted fixes.",
        "download_url": format!("{}/releases/update.zip", server.uri()),
        "published_at": "2026-05-01T09:30:00Z",
    });
    Mock::given(method("GET"))
        .and(path("/update.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/releases/update.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;
    server
}

struct Workspace {
    _dir: tempfile::TempDir,
    install_root: PathBuf,
    work_dir: PathBuf,
}

fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let install_root = dir.path().join("app");
    let work_dir = dir.path().join("work");
    std::fs::create_dir_all(&install_root).unwrap();
    std::fs::create_dir_all(&work_dir).unwrap();
    Workspace {
        _dir: dir,
        install_root,
        work_dir,
    }
}

fn settings(ws: &Workspace, server: &MockServer) -> UpdateSettings {
    let mut settings = UpdateSettings::new(ws.install_root.clone());
    settings.manifest_url = format!("{}/update.json", server.uri());
    settings.work_dir = ws.work_dir.clone();
    // Tests never spawn a replacement process.
    settings.auto_restart = false;
    settings
}

fn read_install(ws: &Workspace, name: &str) -> Vec<u8> {
    std::fs::read(ws.install_root.join(name)).unwrap()
}

#[tokio::test]
async fn test_full_update_installs_files_and_records_version() {
    let ws = workspace();
    std::fs::write(ws.install_root.join("app.bin"), b"old binary").unwrap();
    std::fs::write(ws.install_root.join(VERSION_FILE), "1.2.0").unwrap();

    let archive = make_zip(&[
        ("app.bin", b"new binary"),
        ("data/formats.json", b"{\"mp4\":true}"),
        ("CHANGELOG.md", b"2.0.0"),
    ]);
    let server = mock_release_server("2.0.0", archive).await;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&events);
    let coordinator = UpdateCoordinator::new(
        settings(&ws, &server),
        Arc::new(move |event| sink_events.lock().unwrap().push(event)),
    )
    .unwrap();

    let outcome = coordinator
        .update(CheckTrigger::Manual, &CancelToken::new())
        .await
        .unwrap();

    match outcome {
        UpdateOutcome::Installed {
            version,
            restart_pending,
        } => {
            assert_eq!(version.to_string(), "2.0.0");
            assert!(restart_pending);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(read_install(&ws, "app.bin"), b"new binary");
    assert_eq!(read_install(&ws, "data/formats.json"), b"{\"mp4\":true}");
    assert_eq!(read_install(&ws, VERSION_FILE), b"2.0.0");
    assert_eq!(coordinator.status(), UpdateStatus::RestartPending);

    // Scratch directory and archive were cleaned up.
    assert!(!ws.work_dir.join("temp_update").exists());
    assert!(!ws.work_dir.join("update_v2.0.0.zip").exists());

    // Progress never went backwards and the run ended with success.
    let events = events.lock().unwrap();
    let mut last = 0u8;
    let mut finished = None;
    for event in events.iter() {
        match event {
            UpdateEvent::Progress(p) => {
                assert!(p.percent >= last, "progress went backwards: {} -> {}", last, p.percent);
                last = p.percent;
            }
            UpdateEvent::Finished { success, .. } => finished = Some(*success),
        }
    }
    assert_eq!(last, 100);
    assert_eq!(finished, Some(true));
}

#[tokio::test]
async fn test_up_to_date_install_is_a_no_op() {
    let ws = workspace();
    std::fs::write(ws.install_root.join(VERSION_FILE), "2.0.0").unwrap();

    let server = mock_release_server("2.0.0", make_zip(&[("app.bin", b"x")])).await;
    let coordinator = UpdateCoordinator::new(settings(&ws, &server), null_sink()).unwrap();

    let outcome = coordinator
        .update(CheckTrigger::Manual, &CancelToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::AlreadyUpToDate));
    assert_eq!(coordinator.status(), UpdateStatus::NoUpdate);
    assert!(!ws.install_root.join("app.bin").exists());
}

#[tokio::test]
async fn test_check_reports_available_update_without_installing() {
    let ws = workspace();
    let server = mock_release_server("3.1.0", make_zip(&[("app.bin", b"x")])).await;
    let coordinator = UpdateCoordinator::new(settings(&ws, &server), null_sink()).unwrap();

    let outcome = coordinator.check(CheckTrigger::Manual).await.unwrap();
    match outcome {
        CheckOutcome::UpdateAvailable(manifest) => {
            assert_eq!(manifest.latest_version, "3.1.0");
            assert_eq!(manifest.display_name, "VidGrab 3.1.0");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(coordinator.status(), UpdateStatus::UpdateAvailable);
    assert!(!ws.install_root.join("app.bin").exists());
}

#[tokio::test]
async fn test_check_then_recheck_after_install_reports_no_update() {
    let ws = workspace();
    let server = mock_release_server("2.0.0", make_zip(&[("app.bin", b"new")])).await;
    let coordinator = UpdateCoordinator::new(settings(&ws, &server), null_sink()).unwrap();

    coordinator
        .update(CheckTrigger::Manual, &CancelToken::new())
        .await
        .unwrap();

    let outcome = coordinator.check(CheckTrigger::Manual).await.unwrap();
    assert!(matches!(outcome, CheckOutcome::NoUpdate));
}

#[tokio::test]
async fn test_auto_install_disabled_leaves_install_pending() {
    let ws = workspace();
    let server = mock_release_server("2.0.0", make_zip(&[("app.bin", b"new")])).await;
    let mut settings = settings(&ws, &server);
    settings.auto_install = false;
    let coordinator = UpdateCoordinator::new(settings, null_sink()).unwrap();

    let outcome = coordinator
        .update(CheckTrigger::Manual, &CancelToken::new())
        .await
        .unwrap();
    match outcome {
        UpdateOutcome::InstallPending(manifest) => {
            assert_eq!(manifest.latest_version, "2.0.0");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!ws.install_root.join("app.bin").exists());
    assert_eq!(coordinator.status(), UpdateStatus::UpdateAvailable);
}

#[tokio::test]
async fn test_server_error_surfaces_http_status() {
    let ws = workspace();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/update.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let coordinator = UpdateCoordinator::new(settings(&ws, &server), null_sink()).unwrap();
    let err = coordinator.check(CheckTrigger::Manual).await.unwrap_err();
    assert!(matches!(err, UpdateError::HttpStatus(500)));
    assert!(err.is_retryable());
    assert_eq!(coordinator.status(), UpdateStatus::Error);
}

#[tokio::test]
async fn test_malformed_manifest_is_rejected() {
    let ws = workspace();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/update.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"irrelevant\": true}"))
        .mount(&server)
        .await;

    let coordinator = UpdateCoordinator::new(settings(&ws, &server), null_sink()).unwrap();
    let err = coordinator.check(CheckTrigger::Manual).await.unwrap_err();
    assert!(matches!(err, UpdateError::MalformedManifest(_)));
}

#[tokio::test]
async fn test_garbled_remote_version_fails_closed() {
    let ws = workspace();
    std::fs::write(ws.install_root.join(VERSION_FILE), "1.5.0").unwrap();

    let server = mock_release_server("definitely-not-a-version", make_zip(&[("a", b"x")])).await;
    let coordinator = UpdateCoordinator::new(settings(&ws, &server), null_sink()).unwrap();

    let outcome = coordinator.check(CheckTrigger::Manual).await.unwrap();
    assert!(matches!(outcome, CheckOutcome::NoUpdate));
}

#[tokio::test]
async fn test_traversal_archive_installs_nothing() {
    let ws = workspace();
    std::fs::write(ws.install_root.join(VERSION_FILE), "1.0.0").unwrap();

    let archive = make_zip(&[("../../evil.txt", b"nope"), ("app.bin", b"new")]);
    let server = mock_release_server("2.0.0", archive).await;
    let coordinator = UpdateCoordinator::new(settings(&ws, &server), null_sink()).unwrap();

    let err = coordinator
        .update(CheckTrigger::Manual, &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpdateError::PathTraversalRejected(_)));
    assert!(!ws.install_root.join("app.bin").exists());
    assert_eq!(read_install(&ws, VERSION_FILE), b"1.0.0");
    // Failure still cleaned up the work directory.
    assert!(!ws.work_dir.join("temp_update").exists());
    assert!(!ws.work_dir.join("update_v2.0.0.zip").exists());
}

#[tokio::test]
async fn test_cancelled_before_download_leaves_no_archive() {
    let ws = workspace();
    let server = mock_release_server("2.0.0", make_zip(&[("app.bin", b"new")])).await;
    let coordinator = UpdateCoordinator::new(settings(&ws, &server), null_sink()).unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let outcome = coordinator
        .update(CheckTrigger::Manual, &cancel)
        .await
        .unwrap();

    assert!(matches!(outcome, UpdateOutcome::Cancelled));
    assert!(!ws.work_dir.join("update_v2.0.0.zip").exists());
    assert!(!ws.install_root.join("app.bin").exists());
    assert_eq!(coordinator.status(), UpdateStatus::Idle);
}

#[tokio::test]
async fn test_failed_relaunch_still_reports_installed() {
    let ws = workspace();
    let server = mock_release_server("2.0.0", make_zip(&[("app.bin", b"new binary")])).await;
    let mut settings = settings(&ws, &server);
    settings.auto_restart = true;
    settings.relaunch_executable = Some(PathBuf::from("/nonexistent/vidgrab-binary"));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&events);
    let coordinator = UpdateCoordinator::new(
        settings,
        Arc::new(move |event| sink_events.lock().unwrap().push(event)),
    )
    .unwrap();

    let outcome = coordinator
        .update(CheckTrigger::Manual, &CancelToken::new())
        .await
        .unwrap();

    // The install completed; the spawn failure is not the run's failure.
    match outcome {
        UpdateOutcome::Installed {
            version,
            restart_pending,
        } => {
            assert_eq!(version.to_string(), "2.0.0");
            assert!(restart_pending);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(read_install(&ws, "app.bin"), b"new binary");
    assert_eq!(read_install(&ws, VERSION_FILE), b"2.0.0");
    assert_eq!(coordinator.status(), UpdateStatus::RestartPending);

    // Exactly one terminal event, and it reports success.
    let terminals: Vec<bool> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            UpdateEvent::Finished { success, .. } => Some(*success),
            UpdateEvent::Progress(_) => None,
        })
        .collect();
    assert_eq!(terminals, vec![true]);
}

#[tokio::test]
async fn test_automatic_update_respects_rate_limit() {
    let ws = workspace();
    let server = mock_release_server("2.0.0", make_zip(&[("app.bin", b"new")])).await;
    let coordinator = UpdateCoordinator::new(settings(&ws, &server), null_sink()).unwrap();

    // A manual run records the check time.
    coordinator
        .update(CheckTrigger::Manual, &CancelToken::new())
        .await
        .unwrap();

    let outcome = coordinator
        .update(CheckTrigger::Automatic, &CancelToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::RateLimited));
}

#[tokio::test]
async fn test_pending_update_notice_after_install() {
    let ws = workspace();
    let server = mock_release_server("2.0.0", make_zip(&[("app.bin", b"new")])).await;
    let coordinator = UpdateCoordinator::new(settings(&ws, &server), null_sink()).unwrap();

    coordinator
        .update(CheckTrigger::Manual, &CancelToken::new())
        .await
        .unwrap();

    // The running process is still on the old version until restart.
    let running = "1.0.0".parse().unwrap();
    let notice = coordinator.store().pending_update_notice(&running).unwrap();
    assert_eq!(notice.to_string(), "2.0.0");
}

#[tokio::test]
async fn test_legacy_manifest_keys_still_update() {
    let ws = workspace();
    let server = MockServer::start().await;
    let archive = make_zip(&[("app.bin", b"legacy new")]);
    let manifest = json!({
        "tag_name": "v2.0.0",
        "zipball_url": format!("{}/zipball.zip", server.uri()),
    });
    Mock::given(method("GET"))
        .and(path("/update.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zipball.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let coordinator = UpdateCoordinator::new(settings(&ws, &server), null_sink()).unwrap();
    let outcome = coordinator
        .update(CheckTrigger::Manual, &CancelToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::Installed { .. }));
    assert_eq!(read_install(&ws, "app.bin"), b"legacy new");
}

/// Guard against scratch paths leaking outside the work directory.
#[tokio::test]
async fn test_nothing_written_outside_workspace_dirs() {
    let ws = workspace();
    let parent: &Path = ws.install_root.parent().unwrap();
    let before: Vec<_> = std::fs::read_dir(parent)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();

    let server = mock_release_server("2.0.0", make_zip(&[("app.bin", b"new")])).await;
    let coordinator = UpdateCoordinator::new(settings(&ws, &server), null_sink()).unwrap();
    coordinator
        .update(CheckTrigger::Manual, &CancelToken::new())
        .await
        .unwrap();

    let after: Vec<_> = std::fs::read_dir(parent)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(before.len(), after.len());
}
