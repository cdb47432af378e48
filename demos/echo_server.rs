//! Example: WebSocket echo server
//!
//! Accepts raw WebSocket connections and serves the reference behavior on the
//! main namespace and on `/custom`:
//! - `message` is echoed back as `message-back` with the same arguments
//! - `message-with-ack` is acknowledged with its own arguments
//!
//! Run with: `cargo run --example echo_server`
//! then connect to `ws://127.0.0.1:3000/socket.io/?EIO=4&transport=websocket`.

use realtime_protocol::config::EngineConfig;
use realtime_protocol::service::Server;
use realtime_protocol::transport::websocket;
use realtime_protocol::utils::logging::init_logging;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = EngineConfig::from_env()?;
    config.server.ping_interval = Duration::from_millis(300);
    config.server.ping_timeout = Duration::from_millis(200);
    config.server.connect_timeout = Duration::from_millis(1000);
    config.server.namespaces = vec!["/custom".into()];
    init_logging(&config.logging);

    let server = Server::new(config)?;
    for path in ["/", "/custom"] {
        let Some(nsp) = server.of(path) else {
            continue;
        };
        nsp.on("message", |socket, args, _| {
            if let Err(e) = socket.emit("message-back", args) {
                debug!(error = %e, "Echo dropped");
            }
        });
        nsp.on("message-with-ack", |_, args, ack| {
            if let Some(ack) = ack {
                if let Err(e) = ack.send(args) {
                    debug!(error = %e, "Ack dropped");
                }
            }
        });
        nsp.on_connection(|socket| {
            info!(nsp = %socket.namespace(), socket_id = %socket.id(), "Client connected");
        });
    }

    let listener = TcpListener::bind(&server.config().server.address).await?;
    info!(address = %server.config().server.address, "Echo server listening");
    let mut incoming = TcpListenerStream::new(listener);

    loop {
        let stream = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = incoming.next() => match next {
                Some(Ok(stream)) => stream,
                Some(Err(e)) => {
                    warn!(error = %e, "Accept failed");
                    continue;
                }
                None => break,
            },
        };

        let server = server.clone();
        tokio::spawn(async move {
            let (frames, query) = match websocket::accept_with_query(stream).await {
                Ok(accepted) => accepted,
                Err(e) => {
                    debug!(error = %e, "WebSocket handshake failed");
                    return;
                }
            };
            if let Err(e) = server.handle_socket(&query, frames).await {
                debug!(error = %e, "Connection rejected");
            }
        });
    }

    server.close();
    server.metrics().log_metrics();
    Ok(())
}
