//! Best-effort search for an installation artifact
//!
//! Known directories are probed concurrently on the blocking pool. Once every
//! probe has finished, the match from the highest-priority directory wins;
//! completion order never decides. If nothing matches, one full-volume scan
//! runs. Both passes are bounded by the same optional timeout and stop their
//! blocking walks through a cooperative cancel flag.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[cfg(windows)]
const FALLBACK_PROGRAM_FILES: [&str; 2] = ["C:\\Program Files", "C:\\Program Files (x86)"];
#[cfg(not(windows))]
const FALLBACK_PROGRAM_FILES: [&str; 2] = ["/opt", "/usr/local"];

/// What a single probe saw. Collapsed to a plain found/not-found at the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Full path of the first matching file
    Found(PathBuf),
    NotFound,
    Failed(String),
}

impl ProbeOutcome {
    fn into_containing_dir(self) -> Option<PathBuf> {
        match self {
            ProbeOutcome::Found(path) => path.parent().map(Path::to_path_buf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub found: bool,
    pub directory: Option<PathBuf>,
}

impl SearchResult {
    pub fn hit(directory: PathBuf) -> Self {
        Self {
            found: true,
            directory: Some(directory),
        }
    }

    pub fn miss() -> Self {
        Self::default()
    }
}

/// Filesystem search backend used by [`DirectoryLocator`]
pub trait Finder: Send + Sync + 'static {
    /// Search under `dir` for a file called `file_name`. Must return promptly
    /// once `cancel` is set.
    fn probe(&self, dir: &Path, file_name: &str, cancel: &AtomicBool) -> ProbeOutcome;

    /// Exhaustive search of the primary volume. Must return promptly once
    /// `cancel` is set.
    fn full_scan(&self, file_name: &str, cancel: &AtomicBool) -> ProbeOutcome;
}

/// walkdir-backed finder
#[derive(Debug, Clone)]
pub struct WalkFinder {
    /// Maximum depth for known-directory probes
    pub probe_depth: usize,
    pub scan_root: PathBuf,
}

impl WalkFinder {
    pub fn new(probe_depth: usize) -> Self {
        Self {
            probe_depth,
            scan_root: primary_volume_root(),
        }
    }
}

impl Finder for WalkFinder {
    fn probe(&self, dir: &Path, file_name: &str, cancel: &AtomicBool) -> ProbeOutcome {
        find_file(dir, file_name, Some(self.probe_depth), Some(cancel))
    }

    fn full_scan(&self, file_name: &str, cancel: &AtomicBool) -> ProbeOutcome {
        find_file(&self.scan_root, file_name, None, Some(cancel))
    }
}

fn find_file(
    root: &Path,
    file_name: &str,
    max_depth: Option<usize>,
    cancel: Option<&AtomicBool>,
) -> ProbeOutcome {
    if !root.is_dir() {
        return ProbeOutcome::Failed(format!("{} is not a directory", root.display()));
    }

    let mut walker = WalkDir::new(root).follow_links(false);
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut unreadable = 0u64;
    for entry in walker {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return ProbeOutcome::Failed("cancelled".to_string());
        }
        let entry = match entry {
            Ok(e) => e,
            Err(_) => {
                // permission denied and friends; keep walking
                unreadable += 1;
                continue;
            }
        };
        if entry.file_type().is_file() && entry.file_name() == file_name {
            return ProbeOutcome::Found(entry.into_path());
        }
    }

    if unreadable > 0 {
        debug!(root = %root.display(), unreadable, "skipped unreadable entries");
    }
    ProbeOutcome::NotFound
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Root of the volume the full scan walks
pub fn primary_volume_root() -> PathBuf {
    #[cfg(windows)]
    {
        let drive = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
        PathBuf::from(format!("{}\\", drive))
    }
    #[cfg(not(windows))]
    {
        PathBuf::from("/")
    }
}

/// Default probe list in priority order: home Desktop/Downloads/Documents,
/// the two Program Files roots, then the volume root.
pub fn known_directories() -> Vec<PathBuf> {
    let mut dirs = Vec::with_capacity(6);
    if let Some(home) = home_dir() {
        for sub in ["Desktop", "Downloads", "Documents"] {
            dirs.push(home.join(sub));
        }
    }
    for (var, fallback) in ["ProgramFiles", "ProgramFiles(x86)"]
        .into_iter()
        .zip(FALLBACK_PROGRAM_FILES)
    {
        dirs.push(
            std::env::var_os(var)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(fallback)),
        );
    }
    dirs.push(primary_volume_root());
    dirs
}

type ProbeTask = (usize, PathBuf, ProbeOutcome);

pub struct DirectoryLocator {
    finder: Arc<dyn Finder>,
    known: Vec<PathBuf>,
    /// Applied to each pass separately
    scan_timeout: Option<Duration>,
}

impl DirectoryLocator {
    pub fn new(finder: Arc<dyn Finder>, known: Vec<PathBuf>) -> Self {
        Self {
            finder,
            known,
            scan_timeout: None,
        }
    }

    pub fn with_scan_timeout(mut self, limit: Option<Duration>) -> Self {
        self.scan_timeout = limit;
        self
    }

    /// Find the directory containing `file_name`. Never fails; every probe or
    /// scan error reads as "not found".
    pub async fn locate(&self, file_name: &str) -> SearchResult {
        if let Some(dir) = self.locate_in_known(file_name).await {
            return SearchResult::hit(dir);
        }
        info!(file = file_name, "not in known directories, scanning volume");
        match self.locate_by_full_scan(file_name).await {
            Some(dir) => SearchResult::hit(dir),
            None => SearchResult::miss(),
        }
    }

    /// Probe every known directory at once and pick by priority rank. When
    /// the timeout elapses, unfinished probes are cancelled and the best match
    /// among the finished ones is kept.
    pub async fn locate_in_known(&self, file_name: &str) -> Option<PathBuf> {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut probes = JoinSet::new();
        for (rank, dir) in self.known.iter().cloned().enumerate() {
            let finder = Arc::clone(&self.finder);
            let name = file_name.to_string();
            let flag = Arc::clone(&cancel);
            probes.spawn_blocking(move || {
                let outcome = finder.probe(&dir, &name, &flag);
                (rank, dir, outcome)
            });
        }

        let mut best: Option<(usize, PathBuf)> = None;
        let collect = collect_best(&mut probes, &mut best);
        match self.scan_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, collect).await.is_err() {
                    cancel.store(true, Ordering::Relaxed);
                    warn!(
                        file = file_name,
                        ?limit,
                        pending = probes.len(),
                        "known-directory search timed out"
                    );
                }
            }
            None => collect.await,
        }
        best.map(|(_, dir)| dir)
    }

    /// Exhaustive scan, cancelled when the configured timeout elapses.
    pub async fn locate_by_full_scan(&self, file_name: &str) -> Option<PathBuf> {
        let cancel = Arc::new(AtomicBool::new(false));
        let finder = Arc::clone(&self.finder);
        let name = file_name.to_string();
        let flag = Arc::clone(&cancel);
        let scan = tokio::task::spawn_blocking(move || finder.full_scan(&name, &flag));

        let joined = match self.scan_timeout {
            Some(limit) => match tokio::time::timeout(limit, scan).await {
                Ok(joined) => joined,
                Err(_) => {
                    cancel.store(true, Ordering::Relaxed);
                    warn!(file = file_name, ?limit, "full scan timed out");
                    return None;
                }
            },
            None => scan.await,
        };

        match joined {
            Ok(ProbeOutcome::Failed(cause)) => {
                debug!(file = file_name, %cause, "full scan failed");
                None
            }
            Ok(outcome) => outcome.into_containing_dir(),
            Err(e) => {
                warn!(error = %e, "full scan task failed");
                None
            }
        }
    }
}

/// Drain finished probes into `best`, lowest rank first
async fn collect_best(probes: &mut JoinSet<ProbeTask>, best: &mut Option<(usize, PathBuf)>) {
    while let Some(joined) = probes.join_next().await {
        let (rank, dir, outcome) = match joined {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "probe task failed");
                continue;
            }
        };
        match outcome {
            ProbeOutcome::Failed(cause) => {
                debug!(dir = %dir.display(), %cause, "probe failed");
            }
            ProbeOutcome::NotFound => {
                debug!(dir = %dir.display(), "probe found nothing");
            }
            found @ ProbeOutcome::Found(_) => {
                let Some(parent) = found.into_containing_dir() else {
                    continue;
                };
                debug!(dir = %dir.display(), rank, hit = %parent.display(), "probe matched");
                if best.as_ref().map_or(true, |(r, _)| rank < *r) {
                    *best = Some((rank, parent));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Finder driven by a table of per-directory outcomes and delays
    struct ScriptedFinder {
        probes: HashMap<PathBuf, (Duration, ProbeOutcome)>,
        scan: ProbeOutcome,
        scan_delay: Duration,
        scans: AtomicUsize,
    }

    impl ScriptedFinder {
        fn new(scan: ProbeOutcome) -> Self {
            Self {
                probes: HashMap::new(),
                scan,
                scan_delay: Duration::ZERO,
                scans: AtomicUsize::new(0),
            }
        }

        fn with_probe(mut self, dir: &str, delay_ms: u64, outcome: ProbeOutcome) -> Self {
            self.probes
                .insert(PathBuf::from(dir), (Duration::from_millis(delay_ms), outcome));
            self
        }
    }

    impl Finder for ScriptedFinder {
        fn probe(&self, dir: &Path, _file_name: &str, cancel: &AtomicBool) -> ProbeOutcome {
            match self.probes.get(dir) {
                Some((delay, outcome)) => wait_or_cancel(*delay, cancel, outcome),
                None => ProbeOutcome::NotFound,
            }
        }

        fn full_scan(&self, _file_name: &str, cancel: &AtomicBool) -> ProbeOutcome {
            self.scans.fetch_add(1, Ordering::SeqCst);
            wait_or_cancel(self.scan_delay, cancel, &self.scan)
        }
    }

    fn wait_or_cancel(delay: Duration, cancel: &AtomicBool, outcome: &ProbeOutcome) -> ProbeOutcome {
        let start = Instant::now();
        while start.elapsed() < delay {
            if cancel.load(Ordering::Relaxed) {
                return ProbeOutcome::Failed("cancelled".into());
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        outcome.clone()
    }

    fn found(p: &str) -> ProbeOutcome {
        ProbeOutcome::Found(PathBuf::from(p))
    }

    fn dirs(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[tokio::test]
    async fn single_match_wins_whether_fast_or_slow() {
        for (fast, slow) in [(0, 60), (60, 0)] {
            let finder = Arc::new(
                ScriptedFinder::new(ProbeOutcome::NotFound)
                    .with_probe("/a", fast, ProbeOutcome::NotFound)
                    .with_probe("/b", slow, found("/b/app/severin.exe"))
                    .with_probe("/c", fast, ProbeOutcome::Failed("denied".into())),
            );
            let locator = DirectoryLocator::new(finder.clone(), dirs(&["/a", "/b", "/c"]));
            let res = locator.locate("severin.exe").await;
            assert_eq!(res, SearchResult::hit(PathBuf::from("/b/app")));
            assert_eq!(finder.scans.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn priority_rank_beats_completion_order() {
        let finder = Arc::new(
            ScriptedFinder::new(ProbeOutcome::NotFound)
                .with_probe("/first", 80, found("/first/x/severin.exe"))
                .with_probe("/last", 0, found("/last/y/severin.exe")),
        );
        let locator = DirectoryLocator::new(finder, dirs(&["/first", "/last"]));
        let res = locator.locate("severin.exe").await;
        assert_eq!(res.directory, Some(PathBuf::from("/first/x")));
    }

    #[tokio::test]
    async fn falls_back_to_a_single_full_scan() {
        let finder = Arc::new(
            ScriptedFinder::new(found("/deep/tree/severin.exe"))
                .with_probe("/a", 0, ProbeOutcome::NotFound)
                .with_probe("/b", 0, ProbeOutcome::Failed("boom".into())),
        );
        let locator = DirectoryLocator::new(finder.clone(), dirs(&["/a", "/b"]));
        let res = locator.locate("severin.exe").await;
        assert_eq!(res, SearchResult::hit(PathBuf::from("/deep/tree")));
        assert_eq!(finder.scans.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_everywhere_is_not_found() {
        let finder = Arc::new(ScriptedFinder::new(ProbeOutcome::Failed("tool error".into())));
        let locator = DirectoryLocator::new(finder.clone(), dirs(&["/a", "/b", "/c"]));
        let res = locator.locate("severin.exe").await;
        assert!(!res.found);
        assert_eq!(res.directory, None);
        assert_eq!(finder.scans.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn scan_timeout_cancels_and_reports_not_found() {
        let mut scripted = ScriptedFinder::new(found("/late/severin.exe"));
        scripted.scan_delay = Duration::from_secs(5);
        let locator = DirectoryLocator::new(Arc::new(scripted), Vec::new())
            .with_scan_timeout(Some(Duration::from_millis(50)));

        let start = Instant::now();
        let res = locator.locate("severin.exe").await;
        assert!(!res.found);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn hung_known_directory_is_cancelled_by_timeout() {
        let finder = Arc::new(
            ScriptedFinder::new(ProbeOutcome::NotFound)
                .with_probe("/stuck", 5_000, found("/stuck/severin.exe"))
                .with_probe("/quick", 0, found("/quick/bin/severin.exe")),
        );
        let locator = DirectoryLocator::new(finder.clone(), dirs(&["/stuck", "/quick"]))
            .with_scan_timeout(Some(Duration::from_millis(100)));

        let start = Instant::now();
        let res = locator.locate("severin.exe").await;
        assert!(start.elapsed() < Duration::from_secs(2));
        // the higher-ranked directory never finished, so the finished match stands
        assert_eq!(res, SearchResult::hit(PathBuf::from("/quick/bin")));
        assert_eq!(finder.scans.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn walk_finder_stops_when_cancelled() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("severin.exe"), b"x").unwrap();
        let finder = WalkFinder::new(8);
        let cancelled = AtomicBool::new(true);
        assert!(matches!(
            finder.probe(tmp.path(), "severin.exe", &cancelled),
            ProbeOutcome::Failed(_)
        ));
    }

    #[test]
    fn walk_finder_respects_probe_depth() {
        let idle = AtomicBool::new(false);
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("one/two/three");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("severin.exe"), b"x").unwrap();

        let shallow = WalkFinder {
            probe_depth: 2,
            scan_root: tmp.path().to_path_buf(),
        };
        assert_eq!(shallow.probe(tmp.path(), "severin.exe", &idle), ProbeOutcome::NotFound);

        let deep = WalkFinder {
            probe_depth: 8,
            scan_root: tmp.path().to_path_buf(),
        };
        assert_eq!(
            deep.probe(tmp.path(), "severin.exe", &idle),
            ProbeOutcome::Found(nested.join("severin.exe"))
        );

        // the full scan ignores probe_depth
        let flag = AtomicBool::new(false);
        assert_eq!(
            shallow.full_scan("severin.exe", &flag),
            ProbeOutcome::Found(nested.join("severin.exe"))
        );
    }

    #[test]
    fn walk_finder_reports_missing_root_as_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let finder = WalkFinder::new(4);
        let outcome = finder.probe(&tmp.path().join("nope"), "severin.exe", &AtomicBool::new(false));
        assert!(matches!(outcome, ProbeOutcome::Failed(_)));
    }

    #[test]
    fn directories_match_by_name_not_as_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("severin.exe")).unwrap();
        let finder = WalkFinder::new(4);
        let idle = AtomicBool::new(false);
        assert_eq!(finder.probe(tmp.path(), "severin.exe", &idle), ProbeOutcome::NotFound);
    }

    #[test]
    fn known_directories_end_at_volume_root() {
        let dirs = known_directories();
        assert!(dirs.len() >= 3);
        assert_eq!(dirs.last(), Some(&primary_volume_root()));
    }
}
