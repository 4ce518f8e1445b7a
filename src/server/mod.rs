mod capture;

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::handler::{ConnectionWriter, Handler};
use crate::headers::Headers;
use crate::request::Request;
use crate::response::{ResponseWriter, StatusCode, WriteError};
use capture::CaptureReader;

/// A connection gets this long to deliver one full request.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to a running server. Dropping it does not stop the accept loop;
/// call [`Server::close`].
pub struct Server {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    accept_task: JoinHandle<()>,
}

impl Server {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting and releases the listener. In-flight handlers finish
    /// on their own tasks.
    pub fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.accept_task.abort();
    }
}

/// Binds `127.0.0.1:<port>`, starts accepting on a background task, and
/// returns immediately. Every accepted connection is served on its own task.
pub async fn serve<H>(port: u16, handler: Arc<H>) -> io::Result<Server>
where
    H: Handler,
{
    let listener = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return Err(e);
        }
    };
    let local_addr = listener.local_addr()?;
    let running = Arc::new(AtomicBool::new(true));

    let accept_task = tokio::spawn(accept_loop(listener, handler, Arc::clone(&running)));

    info!(addr = %local_addr, "server started");
    Ok(Server {
        local_addr,
        running,
        accept_task,
    })
}

async fn accept_loop<H>(listener: TcpListener, handler: Arc<H>, running: Arc<AtomicBool>)
where
    H: Handler,
{
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                if !running.load(Ordering::SeqCst) {
                    return;
                }
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        debug!(%remote_addr, "accepted connection");
        let handler = Arc::clone(&handler);
        tokio::spawn(handle_connection(stream, handler));
    }
}

/// One request/response cycle. The connection closes unconditionally when
/// this returns (both halves drop).
async fn handle_connection<H>(stream: TcpStream, handler: Arc<H>)
where
    H: Handler,
{
    let (read_half, write_half) = stream.into_split();
    let mut source = CaptureReader::new(read_half);

    let parsed = match timeout(READ_TIMEOUT, Request::from_reader(&mut source)).await {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!("read deadline exceeded, dropping connection");
            return;
        }
    };

    let mut writer = ResponseWriter::new(write_half);

    let request = match parsed {
        Ok(request) => {
            info!(
                method = %request.request_line.method,
                target = %request.request_line.request_target,
                "received request"
            );
            request
        }
        Err(e) => {
            let raw = source.captured();
            error!(
                cause = %e,
                raw = %String::from_utf8_lossy(raw),
                "failed to parse request"
            );

            // a recoverable first line still reaches the handler
            match extract_target(raw) {
                Some(target) => Request::minimal(target),
                None => {
                    if let Err(e) = send_invalid_request_response(&mut writer).await {
                        error!(cause = %e, "failed to send error response");
                    }
                    return;
                }
            }
        }
    };

    handler.handle(request, &mut writer).await;

    if let Err(e) = writer.flush().await {
        error!(cause = %e, "failed to flush response");
    }
}

async fn send_invalid_request_response(
    writer: &mut ResponseWriter<ConnectionWriter>,
) -> Result<(), WriteError> {
    writer.write_status(StatusCode::BAD_REQUEST)?;
    let mut headers = Headers::new();
    headers.set("Content-Type", "text/html; charset=utf-8");
    writer.write_headers(headers)?;
    writer.write_body(b"Invalid request format\n")?;
    writer.flush().await
}

/// Pulls the request target out of a raw first line shaped like
/// `METHOD SP target ...`, without validating anything else.
fn extract_target(raw: &[u8]) -> Option<String> {
    let first_line = raw.split(|&b| b == b'\n').next()?;
    let line = std::str::from_utf8(first_line).ok()?.trim_end_matches('\r');

    let mut parts = line.split(' ');
    let _method = parts.next()?;
    let target = parts.next()?;
    if target.is_empty() {
        return None;
    }
    Some(target.to_string())
}
