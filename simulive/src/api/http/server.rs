use crate::api::http::service::StreamService;
use crate::errors::StreamerError;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use std::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn start_streamer(
    notifier: Arc<Notify>,
    addr: String,
    max_buffer_size: Option<usize>,
    playlist_name: String,
    service: StreamService,
) -> Result<(), StreamerError> {
    let addr = common::socket::parse_address(addr)
        .map_err(|e| StreamerError::NetworkError(e.to_string()))?;
    let socket = common::socket::listen_reuse_socket(&addr)
        .map_err(|e| StreamerError::NetworkError(e.to_string()))?;
    let listener = TcpListener::from_std(socket.into())
        .map_err(|e| StreamerError::NetworkError(e.to_string()))?;

    info!("streamer: stream available at http://{}/{}", addr, playlist_name);
    common::systemd::notify_ready();

    let mut http = http1::Builder::new();
    match max_buffer_size {
        Some(max_buffer_size) if max_buffer_size > 0 => {
            info!("streamer: max buffer size is set to {}", max_buffer_size);
            http.max_buf_size(max_buffer_size);
        }
        _ => info!("streamer: max buffer size is default ~400KB"),
    }

    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let mut signal = pin::pin!(notifier.notified());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _addr)) => stream,
                    Err(e) => {
                        error!("streamer: accept: {}", e);
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let conn = http.serve_connection(io, service.clone());
                let fut = graceful.watch(conn);
                tokio::spawn(async move {
                    if let Err(e) = fut.await {
                        error!("streamer: downstream: serve: {:?}", e);
                    }
                });
            },
            _ = &mut signal => {
                info!("streamer: http server: graceful shutdown");
                break;
            }
        }
    }

    tokio::select! {
        _ = graceful.shutdown() => {
            info!("streamer: http server: all connections gracefully closed");
        },
        _ = tokio::time::sleep(SHUTDOWN_TIMEOUT) => {
            info!("streamer: timed out wait for all connections to close");
        }
    }
    Ok(())
}
