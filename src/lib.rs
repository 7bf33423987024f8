//! Devpack library
//!
//! Locates an installation on the host, packs a device-scoped subset of its
//! output into a zip archive and streams the archive to connected peers.

pub mod archive;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod locate;
pub mod logger;
pub mod protocol;
pub mod router;
pub mod server;
