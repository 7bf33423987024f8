use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

/// Audit trail for archive jobs
pub trait JobLogger: Send + Sync {
    fn start(&self, _job: Uuid, _base: &Path, _filter: Option<&str>) {}
    fn entry(&self, _job: Uuid, _name: &str, _bytes: u64) {}
    fn error(&self, _job: Uuid, _msg: &str) {}
    fn done(&self, _job: Uuid, _entries: usize, _bytes: u64, _seconds: f64) {}
}

pub struct NoopLogger;
impl JobLogger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl JobLogger for TextLogger {
    fn start(&self, job: Uuid, base: &Path, filter: Option<&str>) {
        self.line(&format!(
            "START job={} base={} filter={}",
            job,
            base.display(),
            filter.unwrap_or("-")
        ));
    }
    fn entry(&self, job: Uuid, name: &str, bytes: u64) {
        self.line(&format!("ADD job={job} entry={name} bytes={bytes}"));
    }
    fn error(&self, job: Uuid, msg: &str) {
        self.line(&format!("ERROR job={job} msg={msg}"));
    }
    fn done(&self, job: Uuid, entries: usize, bytes: u64, seconds: f64) {
        self.line(&format!(
            "DONE job={job} entries={entries} bytes={bytes} seconds={seconds:.3}"
        ));
    }
}
