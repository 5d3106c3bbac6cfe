use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tallyprint_core::paths::socket_path;
use tallyprint_core::{CommandResponse, HostEvent};

use crate::error::{io_err, DaemonError};

/// JSON newline-delimited request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum HostRequest {
    /// Dispatch `args` to the handler registered on `channel`.
    Invoke {
        channel: String,
        #[serde(default)]
        args: Value,
    },
    /// Keep the connection open and stream [`HostEvent`]s.
    Subscribe,
    Status,
    Stop,
}

fn connect(home: &Path) -> Result<UnixStream, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })
}

fn write_request(stream: &mut UnixStream, home: &Path, request: &HostRequest) -> Result<(), DaemonError> {
    let socket = socket_path(home);
    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))
}

fn read_response(reader: &mut impl BufRead, home: &Path) -> Result<CommandResponse, DaemonError> {
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(socket_path(home), e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &HostRequest) -> Result<CommandResponse, DaemonError> {
    let mut stream = connect(home)?;
    write_request(&mut stream, home, request)?;
    read_response(&mut BufReader::new(stream), home)
}

/// Dispatch a command. A failing handler is still `Ok`, with `success: false`.
pub fn invoke(home: &Path, channel: &str, args: Value) -> Result<CommandResponse, DaemonError> {
    send_request(
        home,
        &HostRequest::Invoke {
            channel: channel.to_string(),
            args,
        },
    )
}

pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &HostRequest::Status) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    let response = send_request(home, &HostRequest::Stop)?;
    response_into_data(response).map(|_| ())
}

/// Stream host events into `on_event` until it returns `false` or the
/// daemon closes the connection.
pub fn subscribe(
    home: &Path,
    mut on_event: impl FnMut(HostEvent) -> bool,
) -> Result<(), DaemonError> {
    let mut stream = connect(home)?;
    write_request(&mut stream, home, &HostRequest::Subscribe)?;
    let mut reader = BufReader::new(stream);
    response_into_data(read_response(&mut reader, home)?)?;

    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| io_err(socket_path(home), e))?;
        if read == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }
        let event: HostEvent = serde_json::from_str(line.trim_end())?;
        if !on_event(event) {
            return Ok(());
        }
    }
}

fn response_into_data(response: CommandResponse) -> Result<Value, DaemonError> {
    if response.success {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}
