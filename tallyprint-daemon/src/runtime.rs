use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::{self, error::RecvError};

use tallyprint_core::paths::{app_root, socket_path};
use tallyprint_core::{CommandResponse, Config};

use crate::context::AppContext;
use crate::error::{io_err, DaemonError};
use crate::protocol::HostRequest;
use crate::retention;

const RETENTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let root = app_root(&home);
    fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;

    let config = Config::load_at(&home)?;
    let ctx = Arc::new(AppContext::init(config, &home)?);
    let started_at_unix = unix_seconds_now();
    ctx.logs.info(
        "Daemon started",
        Some(json!({ "socket": socket_path(&home), "log_dir": ctx.logs.dir() })),
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                ctx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let retention_handle = {
        let shutdown = shutdown_tx.clone();
        let dir = ctx.logs.dir().to_path_buf();
        let keep_days = ctx.config.retention_days;
        tokio::spawn(async move {
            let result = retention_task(dir, keep_days, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (socket_result, retention_result, signal_result) =
        tokio::join!(socket_handle, retention_handle, signal_handle);

    ctx.logs.info("Daemon stopping", None);
    ctx.teardown();

    handle_join("socket_server", socket_result)?;
    handle_join("log_retention", retention_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn socket_server_task(
    home: PathBuf,
    ctx: Arc<AppContext>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let ctx = ctx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, ctx, shutdown_tx, started_at_unix).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    ctx: Arc<AppContext>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<HostRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_line(
                    &mut writer,
                    &CommandResponse::failure(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        match request {
            HostRequest::Invoke { channel, args } => {
                let response = ctx.registry.dispatch(&channel, args).await;
                write_line(&mut writer, &response).await?;
            }
            HostRequest::Status => {
                let payload = build_status_payload(&ctx, started_at_unix);
                write_line(&mut writer, &CommandResponse::ok(payload)).await?;
            }
            HostRequest::Stop => {
                let _ = shutdown_tx.send(());
                write_line(&mut writer, &CommandResponse::ok(json!({ "stopping": true }))).await?;
                break;
            }
            HostRequest::Subscribe => {
                write_line(&mut writer, &CommandResponse::ok(json!({ "subscribed": true }))).await?;
                stream_events(&ctx, lines, writer, shutdown_tx.subscribe()).await?;
                break;
            }
        }
    }

    Ok(())
}

/// Push host events to a subscribed client until it hangs up or the daemon stops.
async fn stream_events(
    ctx: &AppContext,
    mut lines: Lines<BufReader<OwnedReadHalf>>,
    mut writer: OwnedWriteHalf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut events = ctx.subscribe();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => return Ok(()),
            line = lines.next_line() => match line {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return Ok(()),
            },
            event = events.recv() => match event {
                Ok(event) => write_line(&mut writer, &event).await?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagged, host events dropped");
                }
                Err(RecvError::Closed) => return Err(DaemonError::ChannelClosed("host events")),
            },
        }
    }
}

fn build_status_payload(ctx: &AppContext, started_at_unix: u64) -> serde_json::Value {
    json!({
        "running": true,
        "pid": std::process::id(),
        "started_at_unix": started_at_unix,
        "environment": ctx.config.environment,
        "channels": ctx.registry.channels(),
        "log_file": ctx.logs.current_file(),
        "unread_logs": ctx.logs.has_unread(),
        "temp_dir": ctx.pipeline.temp_dir(),
    })
}

async fn retention_task(
    dir: PathBuf,
    keep_days: u32,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(RETENTION_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let dir = dir.clone();
                tokio::task::spawn_blocking(move || retention::prune_logs(&dir, keep_days))
                    .await
                    .ok();
            }
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_line<T: Serialize>(writer: &mut OwnedWriteHalf, value: &T) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(value)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stale_socket_file_is_removed_before_bind() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("daemon.sock");
        fs::write(&socket, b"").unwrap();

        prepare_socket_for_bind(&socket).unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn live_socket_is_not_stolen() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("daemon.sock");
        let _listener = UnixListener::bind(&socket).unwrap();

        let err = prepare_socket_for_bind(&socket).unwrap_err();
        assert!(err.to_string().contains("already in use"));
    }

    #[test]
    fn join_failures_name_the_task() {
        let ok = handle_join("socket_server", Ok(Ok(())));
        assert!(ok.is_ok());
        let inner = handle_join(
            "log_retention",
            Ok(Err(DaemonError::ChannelClosed("host events"))),
        )
        .unwrap_err();
        assert!(matches!(inner, DaemonError::ChannelClosed(_)));
    }
}
