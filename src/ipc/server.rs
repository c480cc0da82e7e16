//! Local IPC server publishing a device endpoint.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate, under the device's name. Each connection
//! may hold at most one session; when the connection ends, any session it
//! still holds is released. Cancelling the server ends every connection, so
//! no session outlives the server task.

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::protocol::{trim_padding, DeviceRequest, DeviceResponse};
use crate::device::{Endpoint, Session, UserDest, UserSource, BUF_LEN};
use crate::{AppError, Result};

/// Longest request line accepted, newline included.
///
/// A full-capacity write encodes to well under this.
pub const MAX_REQUEST_LINE: usize = 16 * 1024;

/// Spawn the device server task for `endpoint`.
///
/// The listener is bound before this function returns, so a client may
/// connect as soon as it has the handle. The task finishes once `ct` is
/// cancelled and every connection has closed.
///
/// # Errors
///
/// Returns `AppError::Registration` if the socket name cannot be published.
pub fn spawn_device_server(
    endpoint: Arc<Endpoint>,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = endpoint.name().to_owned();

    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Registration(format!("invalid device name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Registration(format!("failed to publish device: {err}")))?;

    info!(device = %name, "device server listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("device_server", device = %name);
        async move {
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("device server shutting down");
                        break;
                    }
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                connections.spawn(handle_connection(
                                    stream,
                                    Arc::clone(&endpoint),
                                    ct.clone(),
                                ));
                            }
                            Err(err) => {
                                warn!(%err, "device accept failed");
                            }
                        }
                    }
                }
            }

            while let Some(joined) = connections.join_next().await {
                if let Err(err) = joined {
                    warn!(%err, "device connection task failed");
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

/// Outcome of reading one request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestLine {
    /// The peer closed the connection.
    Eof,
    /// A line, possibly unterminated at end of stream, is in the buffer.
    Line,
    /// The line exceeded [`MAX_REQUEST_LINE`]; it was discarded up to and
    /// including its newline and the buffer is empty.
    Oversized,
}

/// Read one newline-terminated request into `buf`, buffering at most
/// [`MAX_REQUEST_LINE`] bytes.
///
/// # Errors
///
/// Returns any I/O error from `reader`.
pub async fn read_request_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<RequestLine>
where
    R: AsyncBufRead + Unpin,
{
    let limit = MAX_REQUEST_LINE as u64;

    buf.clear();
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(RequestLine::Eof);
    }
    if buf.ends_with(b"\n") || read < MAX_REQUEST_LINE {
        return Ok(RequestLine::Line);
    }

    loop {
        buf.clear();
        let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
        if read == 0 || buf.ends_with(b"\n") {
            break;
        }
    }
    buf.clear();
    Ok(RequestLine::Oversized)
}

/// Serve one client connection until EOF or cancellation.
async fn handle_connection(
    stream: interprocess::local_socket::tokio::Stream,
    endpoint: Arc<Endpoint>,
    ct: CancellationToken,
) {
    let span = info_span!("device_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = Vec::new();
        let mut session: Option<Session> = None;

        loop {
            let read = tokio::select! {
                () = ct.cancelled() => {
                    info!("device connection cancelled");
                    break;
                }
                read = read_request_line(&mut buf_reader, &mut line) => read,
            };

            let response = match read {
                Ok(RequestLine::Eof) => break,
                Ok(RequestLine::Line) => {
                    let trimmed = line.trim_ascii();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_slice::<DeviceRequest>(trimmed) {
                        Ok(request) => dispatch(request, &endpoint, &mut session),
                        Err(err) => DeviceResponse::failure(&AppError::from(err)),
                    }
                }
                Ok(RequestLine::Oversized) => {
                    warn!(limit = MAX_REQUEST_LINE, "device request line too long");
                    DeviceResponse::failure(&AppError::Protocol(format!(
                        "request line exceeds {MAX_REQUEST_LINE} bytes"
                    )))
                }
                Err(err) => {
                    warn!(%err, "device connection read error");
                    break;
                }
            };

            let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                r#"{"ok":false,"error":"serialization failed","errno":-5}"#.to_owned()
            });
            response_line.push('\n');

            if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                warn!(%err, "failed to write device response");
                break;
            }
        }

        if session.take().is_some() {
            info!("connection closed with device still open; released");
        } else {
            info!("device connection closed");
        }
    }
    .instrument(span)
    .await;
}

/// Apply one request to the endpoint on behalf of a connection.
///
/// `session` is the connection's open handle, if any.
pub fn dispatch(
    request: DeviceRequest,
    endpoint: &Arc<Endpoint>,
    session: &mut Option<Session>,
) -> DeviceResponse {
    let span = info_span!("device_op", op = request.verb());
    let _guard = span.enter();

    let result = match request {
        DeviceRequest::Open => handle_open(endpoint, session),
        DeviceRequest::Write { data, length } => with_session(session, |s| {
            let length = length.unwrap_or(data.len());
            s.write(&UserSource::new(&data), length)
                .map(DeviceResponse::written)
        }),
        DeviceRequest::Read { length } => with_session(session, |s| handle_read(s, length)),
        DeviceRequest::Close => match session.take() {
            Some(s) => {
                s.close();
                Ok(DeviceResponse::closed())
            }
            None => Err(not_open()),
        },
    };

    result.unwrap_or_else(|err| DeviceResponse::failure(&err))
}

fn handle_open(
    endpoint: &Arc<Endpoint>,
    session: &mut Option<Session>,
) -> Result<DeviceResponse> {
    if session.is_some() {
        return Err(AppError::Protocol(
            "device already open on this connection".into(),
        ));
    }
    let opened = endpoint.open()?;
    let response = DeviceResponse::opened(opened.id().to_string());
    *session = Some(opened);
    Ok(response)
}

fn handle_read(session: &mut Session, length: usize) -> Result<DeviceResponse> {
    let mut receive = vec![0_u8; length.min(BUF_LEN)];
    let count = session.read(&mut UserDest::new(&mut receive), length)?;
    Ok(DeviceResponse::read(count, trim_padding(&receive)))
}

fn with_session<F>(session: &mut Option<Session>, op: F) -> Result<DeviceResponse>
where
    F: FnOnce(&mut Session) -> Result<DeviceResponse>,
{
    session.as_mut().map_or_else(|| Err(not_open()), op)
}

fn not_open() -> AppError {
    AppError::Protocol("device is not open on this connection".into())
}
