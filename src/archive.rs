//! Filtered diagnostic archives
//!
//! A static rule table decides which files under a base directory are packed
//! and under which archive-internal name. The archive is written to a
//! temporary file next to its destination and only renamed into place once
//! the zip container is finalized, so a failed job leaves nothing behind.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ArchiveError;
use crate::logger::JobLogger;
use crate::protocol::ARCHIVE_FILE_NAME;

/// Moderate deflate level; large trees make the maximum too slow
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPolicy {
    /// Every file with the right extension
    PassAll,
    /// File name must contain the device identifier
    MatchDeviceSubstring,
}

#[derive(Debug, Clone, Copy)]
pub struct ArchiveRule {
    pub sub_dir: &'static str,
    pub extension: &'static str,
    pub policy: FilterPolicy,
}

impl ArchiveRule {
    /// Whether `file_name` belongs in the archive under this rule.
    /// A missing or empty device never matches a device-scoped rule.
    pub fn admits(&self, file_name: &str, device: Option<&str>) -> bool {
        if !file_name.ends_with(self.extension) {
            return false;
        }
        match self.policy {
            FilterPolicy::PassAll => true,
            FilterPolicy::MatchDeviceSubstring => match device {
                Some(d) if !d.is_empty() => file_name.contains(d),
                _ => false,
            },
        }
    }
}

/// Packing rules, applied in this order
pub const RULES: [ArchiveRule; 3] = [
    ArchiveRule {
        sub_dir: "out",
        extension: ".txt",
        policy: FilterPolicy::MatchDeviceSubstring,
    },
    ArchiveRule {
        sub_dir: "_inputs_severin/tables",
        extension: ".txt",
        policy: FilterPolicy::MatchDeviceSubstring,
    },
    ArchiveRule {
        sub_dir: "temp",
        extension: ".net",
        policy: FilterPolicy::PassAll,
    },
];

#[derive(Debug, Clone)]
pub struct ArchiveJob {
    pub id: Uuid,
    pub base_directory: PathBuf,
    /// `None` for direct-path requests
    pub device_filter: Option<String>,
    pub output_path: PathBuf,
}

impl ArchiveJob {
    pub fn new(base_directory: impl Into<PathBuf>, device_filter: Option<String>) -> Self {
        let base_directory = base_directory.into();
        let output_path = base_directory.join(ARCHIVE_FILE_NAME);
        Self {
            id: Uuid::new_v4(),
            base_directory,
            device_filter,
            output_path,
        }
    }
}

/// A finalized archive on disk
#[derive(Debug, Clone)]
pub struct ArchiveArtifact {
    pub path: PathBuf,
    /// Archive-relative names in write order
    pub entries: Vec<String>,
    /// Uncompressed bytes packed
    pub source_bytes: u64,
}

/// Resolve the (source path, entry name) pairs a job will pack
pub fn select_entries(job: &ArchiveJob) -> Result<Vec<(PathBuf, String)>, ArchiveError> {
    let device = job.device_filter.as_deref();
    let mut selected = Vec::new();

    for rule in RULES.iter() {
        let dir = job.base_directory.join(rule.sub_dir);
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "rule directory absent, skipping");
            continue;
        }
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            // non-UTF-8 names can't carry a device id or a known extension
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if rule.admits(name, device) {
                let entry_name = format!("{}/{}", rule.sub_dir, name);
                selected.push((entry.path().to_path_buf(), entry_name));
            }
        }
    }
    Ok(selected)
}

/// Build the archive for `job` synchronously.
pub fn write_archive(
    job: &ArchiveJob,
    compression_level: i32,
    logger: &dyn JobLogger,
) -> Result<ArchiveArtifact, ArchiveError> {
    let started = Instant::now();
    logger.start(job.id, &job.base_directory, job.device_filter.as_deref());

    let result = pack(job, compression_level, logger);
    match &result {
        Ok(artifact) => {
            let secs = started.elapsed().as_secs_f64();
            logger.done(job.id, artifact.entries.len(), artifact.source_bytes, secs);
            info!(
                job = %job.id,
                entries = artifact.entries.len(),
                bytes = artifact.source_bytes,
                path = %artifact.path.display(),
                "archive finalized"
            );
        }
        Err(e) => logger.error(job.id, &e.to_string()),
    }
    result
}

fn pack(
    job: &ArchiveJob,
    compression_level: i32,
    logger: &dyn JobLogger,
) -> Result<ArchiveArtifact, ArchiveError> {
    if !job.base_directory.is_dir() {
        return Err(ArchiveError::NotADirectory(job.base_directory.clone()));
    }
    let selected = select_entries(job)?;

    let out_dir = job
        .output_path
        .parent()
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let staging = tempfile::Builder::new()
        .prefix(".filtered-archive-")
        .suffix(".part")
        .tempfile_in(&out_dir)
        .map_err(|e| ArchiveError::io(&out_dir, e))?;

    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(compression_level));

    let mut zip = ZipWriter::new(staging);
    let mut entries = Vec::with_capacity(selected.len());
    let mut source_bytes = 0u64;
    for (src, name) in selected {
        let mut file = File::open(&src).map_err(|e| ArchiveError::io(&src, e))?;
        zip.start_file(name.as_str(), options)?;
        let n = std::io::copy(&mut file, &mut zip).map_err(|e| ArchiveError::io(&src, e))?;
        logger.entry(job.id, &name, n);
        source_bytes += n;
        entries.push(name);
    }

    let staging = zip.finish()?;
    // staging files are created 0600; the archive should read like any other file
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        staging
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(|e| ArchiveError::io(staging.path(), e))?;
    }
    staging.persist(&job.output_path)?;

    Ok(ArchiveArtifact {
        path: job.output_path.clone(),
        entries,
        source_bytes,
    })
}

/// Runs archive jobs off the async threads, one at a time per base directory.
pub struct ArchiveBuilder {
    compression_level: i32,
    logger: Arc<dyn JobLogger>,
    dir_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl ArchiveBuilder {
    pub fn new(compression_level: i32, logger: Arc<dyn JobLogger>) -> Self {
        Self {
            compression_level: compression_level.clamp(1, 9),
            logger,
            dir_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Build and finalize, then read the archive back before another job on
    /// the same directory can replace it. Nothing reads `job.output_path`
    /// before finalize.
    pub async fn build_and_read(
        &self,
        job: ArchiveJob,
    ) -> Result<(ArchiveArtifact, Vec<u8>), ArchiveError> {
        let lock = self.dir_lock(&job.base_directory);
        let _guard = lock.lock_owned().await;

        let level = self.compression_level;
        let logger = Arc::clone(&self.logger);
        let artifact =
            tokio::task::spawn_blocking(move || write_archive(&job, level, logger.as_ref()))
                .await
                .map_err(|e| ArchiveError::Worker(e.to_string()))??;
        let bytes = tokio::fs::read(&artifact.path)
            .await
            .map_err(|e| ArchiveError::io(&artifact.path, e))?;
        Ok((artifact, bytes))
    }

    fn dir_lock(&self, dir: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.dir_locks.lock();
        // drop locks nobody is holding or waiting on
        locks.retain(|_, l| Arc::strong_count(l) > 1);
        Arc::clone(locks.entry(dir.to_path_buf()).or_default())
    }
}
