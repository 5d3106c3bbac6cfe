//! End-to-end: a real daemon on a temp HOME, driven through the blocking client.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::sleep;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use tallyprint_core::paths::{config_path, socket_path};
use tallyprint_core::HostEvent;
use tallyprint_daemon::{invoke, request_status, request_stop, subscribe, DaemonError};

fn write_config(home: &Path) {
    let path = config_path(home);
    fs::create_dir_all(path.parent().expect("config dir")).expect("mkdir");
    let yaml = format!(
        "temp_dir: {}\nlocator:\n  extra_dirs: [{}]\n",
        home.join("tmp").display(),
        home.join("no-tools").display()
    );
    fs::write(path, yaml).expect("write config");
}

fn wait_for_daemon(home: &Path) -> Value {
    for _ in 0..50 {
        match request_status(home) {
            Ok(status) => return status,
            Err(DaemonError::DaemonNotRunning { .. }) => sleep(Duration::from_millis(100)),
            Err(err) => panic!("status failed: {err}"),
        }
    }
    panic!("daemon never came up");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_invoke_and_stop_over_the_socket() {
    let home = TempDir::new().expect("home");
    write_config(home.path());
    let daemon = tokio::spawn(tallyprint_daemon::run(home.path().to_path_buf()));

    let client_home: PathBuf = home.path().to_path_buf();
    let (status, logs, unknown) = tokio::task::spawn_blocking(move || {
        let status = wait_for_daemon(&client_home);
        let logs = invoke(&client_home, "get-logs", json!({"limit": 10})).expect("get-logs");
        let unknown = invoke(&client_home, "no-such-channel", Value::Null).expect("unknown");
        request_stop(&client_home).expect("stop");
        (status, logs, unknown)
    })
    .await
    .expect("client thread");

    daemon.await.expect("daemon task").expect("daemon result");

    assert_eq!(status["running"], json!(true));
    assert_eq!(status["channels"], json!(["get-logs", "print-summary"]));

    assert!(logs.success);
    let entries = logs.data.expect("entries");
    assert!(entries
        .as_array()
        .expect("array")
        .iter()
        .any(|entry| entry["message"] == json!("Daemon started")));

    assert!(!unknown.success);
    assert!(!socket_path(home.path()).exists(), "socket removed on stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscribers_receive_status_notices() {
    let home = TempDir::new().expect("home");
    write_config(home.path());
    let daemon = tokio::spawn(tallyprint_daemon::run(home.path().to_path_buf()));

    let client_home: PathBuf = home.path().to_path_buf();
    let (channel, notice_ok, response) = tokio::task::spawn_blocking(move || {
        wait_for_daemon(&client_home);

        let (tx, rx) = mpsc::channel();
        let sub_home = client_home.clone();
        std::thread::spawn(move || {
            let _ = subscribe(&sub_home, |event| {
                let done = matches!(event, HostEvent::Status { .. });
                let _ = tx.send(event);
                !done
            });
        });

        // No helper binary is installed, so every print fails with a notice.
        let args = json!({"document": {"content": "Total"}});
        for _ in 0..50 {
            let response = invoke(&client_home, "print-summary", args.clone()).expect("invoke");
            while let Ok(event) = rx.recv_timeout(Duration::from_millis(100)) {
                if let HostEvent::Status { channel, notice } = event {
                    request_stop(&client_home).expect("stop");
                    return (channel, notice.success, response);
                }
            }
        }
        panic!("no status notice received");
    })
    .await
    .expect("client thread");

    daemon.await.expect("daemon task").expect("daemon result");

    assert_eq!(channel, "print-summary-status");
    assert!(!notice_ok);
    assert!(!response.success);
    assert!(response.error.expect("error").contains("SumatraPDF"));
}
