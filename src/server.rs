//! WebSocket front end for the devpack daemon.
//!
//! Each accepted socket becomes a peer in the [`DeliveryChannel`]; its text
//! frames are handed to the [`MessageRouter`], one task per message.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::archive::ArchiveBuilder;
use crate::config::Settings;
use crate::delivery::{DeliveryChannel, Outgoing};
use crate::locate::{DirectoryLocator, WalkFinder};
use crate::logger::{JobLogger, NoopLogger, TextLogger};
use crate::router::MessageRouter;

/// Wire up locator, archive builder and peer set from settings
pub fn build_router(settings: &Settings) -> Result<Arc<MessageRouter>> {
    let logger: Arc<dyn JobLogger> = match &settings.log_file {
        Some(path) => Arc::new(
            TextLogger::new(path)
                .with_context(|| format!("open job log {}", path.display()))?,
        ),
        None => Arc::new(NoopLogger),
    };

    let finder = Arc::new(WalkFinder::new(settings.probe_depth));
    let locator = DirectoryLocator::new(finder, settings.known_dirs())
        .with_scan_timeout(settings.scan_timeout());
    let archives = ArchiveBuilder::new(settings.compression_level, logger);

    Ok(Arc::new(MessageRouter::new(
        locator,
        archives,
        Arc::new(DeliveryChannel::new()),
        settings.artifact_name.clone(),
    )))
}

pub async fn serve(bind: &str, router: Arc<MessageRouter>) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {}", bind))?;
    serve_listener(listener, router).await
}

pub async fn serve_listener(listener: TcpListener, router: Arc<MessageRouter>) -> Result<()> {
    info!(
        addr = %listener.local_addr()?,
        artifact = router.artifact_name(),
        "devpack daemon listening"
    );
    loop {
        let (stream, addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        debug!(%addr, "connection accepted");
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, router).await {
                warn!(%addr, error = %e, "connection closed with error");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, router: Arc<MessageRouter>) -> Result<()> {
    let socket = tokio_tungstenite::accept_async(stream)
        .await
        .context("websocket handshake")?;
    let (mut sink, mut source) = socket.split();

    let delivery = Arc::clone(router.delivery());
    let (peer, mut outbox) = delivery.on_connect();

    let writer = async move {
        while let Some(frame) = outbox.recv().await {
            let msg = match frame {
                Outgoing::Text(t) => Message::Text(t),
                Outgoing::Binary(b) => Message::Binary(b),
            };
            if let Err(e) = sink.send(msg).await {
                debug!(peer, error = %e, "write failed");
                break;
            }
        }
    };

    let reader = async {
        while let Some(msg) = source.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let router = Arc::clone(&router);
                    tokio::spawn(async move { router.handle(peer, &text).await });
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(peer, error = %e, "read failed");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    delivery.on_disconnect(peer);
    Ok(())
}
