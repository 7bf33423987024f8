//! Inbound message dispatch
//!
//! Each text frame is handled on its own: decode, optionally locate the
//! artifact, build the archive, broadcast it and report back to the sender.
//! Nothing is kept between messages.

use std::path::PathBuf;
use std::sync::Arc;

use normpath::PathExt;
use tracing::{debug, error, info, warn};

use crate::archive::{ArchiveBuilder, ArchiveJob};
use crate::delivery::{DeliveryChannel, PeerId};
use crate::locate::DirectoryLocator;
use crate::protocol::{Inbound, Outbound};

pub struct MessageRouter {
    locator: DirectoryLocator,
    archives: ArchiveBuilder,
    delivery: Arc<DeliveryChannel>,
    artifact_name: String,
}

impl MessageRouter {
    pub fn new(
        locator: DirectoryLocator,
        archives: ArchiveBuilder,
        delivery: Arc<DeliveryChannel>,
        artifact_name: impl Into<String>,
    ) -> Self {
        Self {
            locator,
            archives,
            delivery,
            artifact_name: artifact_name.into(),
        }
    }

    pub fn delivery(&self) -> &Arc<DeliveryChannel> {
        &self.delivery
    }

    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    /// Process one text frame from `peer`
    pub async fn handle(&self, peer: PeerId, text: &str) {
        let request = match Inbound::decode(text) {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(peer, "ignoring unrecognized message");
                return;
            }
            Err(e) => {
                warn!(peer, error = %e, "undecodable message");
                self.send(peer, Outbound::error(format!("Invalid message: {e}")));
                return;
            }
        };

        match request {
            Inbound::DirectPath { path } => self.handle_direct_path(peer, path).await,
            Inbound::DeviceRequest { device_name } => {
                self.handle_device_request(peer, device_name).await
            }
        }
    }

    async fn handle_direct_path(&self, peer: PeerId, path: PathBuf) {
        let base = match path.normalize() {
            Ok(p) => p.into_path_buf(),
            Err(e) => {
                self.send(
                    peer,
                    Outbound::error(format!("Cannot open {}: {e}", path.display())),
                );
                return;
            }
        };
        info!(peer, base = %base.display(), "direct path request");
        self.build_and_deliver(peer, ArchiveJob::new(base, None))
            .await;
    }

    async fn handle_device_request(&self, peer: PeerId, device_name: String) {
        info!(peer, device = %device_name, "device request");
        let result = self.locator.locate(&self.artifact_name).await;
        let directory = match result.directory {
            Some(dir) if result.found => dir,
            _ => {
                info!(file = %self.artifact_name, "artifact not found");
                self.send(peer, Outbound::file_not_found(&self.artifact_name));
                return;
            }
        };

        self.send(peer, Outbound::file_found(&self.artifact_name, &directory));
        self.build_and_deliver(peer, ArchiveJob::new(directory, Some(device_name)))
            .await;
    }

    async fn build_and_deliver(&self, peer: PeerId, job: ArchiveJob) {
        let job_id = job.id;
        let (artifact, bytes) = match self.archives.build_and_read(job).await {
            Ok(built) => built,
            Err(e) => {
                error!(job = %job_id, error = %e, "archive failed");
                self.send(peer, Outbound::error(format!("Failed to create archive: {e}")));
                return;
            }
        };

        let delivered = self.delivery.broadcast(&bytes);
        self.send(
            peer,
            Outbound::success(format!(
                "Archive {} sent: {} file(s), {} bytes, {} peer(s)",
                artifact.path.display(),
                artifact.entries.len(),
                bytes.len(),
                delivered
            )),
        );
    }

    fn send(&self, peer: PeerId, message: Outbound) {
        if let Err(e) = self.delivery.reply(peer, &message) {
            warn!(peer, error = %e, "reply dropped");
        }
    }
}
