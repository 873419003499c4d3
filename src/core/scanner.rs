//! Project tree scanner.
//!
//! Layout:
//! ```text
//! {root}/{Ep##}/{sq####}/{SH####}/{dept}/output/*.mov
//! {root}/{Ep##}/{sq####}/{SH####}/{dept}/version/{v###}/*.exr
//! ```
//! Directory listings go through the [`CacheManager`]; shot details within
//! one sequence are scanned concurrently on a bounded [`Workers`] pool.
//! Unreadable directories list as empty.

use crossbeam_channel::unbounded;
use log::{debug, error, info, trace, warn};
use std::collections::BTreeMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use super::cache_man::CacheManager;
use super::path_parser::{self, PathParser};
use super::versions::VersionManager;
use super::workers::{Workers, panic_message};
use crate::entities::{DepartmentInfo, MediaFiles, ScanResult, SequenceShots, ShotInfo};
use crate::error::ScanError;
use crate::progress::{ProgressCallback, report};
use crate::utils::media;

/// Default width of the per-sequence worker pool
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Cached scanner over one project root.
///
/// Cloning is cheap: the cache and progress callback are shared.
#[derive(Clone)]
pub struct ProjectScanner {
    root: PathBuf,
    cache: Arc<CacheManager>,
    parser: PathParser,
    max_workers: usize,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for ProjectScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectScanner")
            .field("root", &self.root)
            .field("max_workers", &self.max_workers)
            .finish_non_exhaustive()
    }
}

impl ProjectScanner {
    pub fn new(root: impl Into<PathBuf>, cache: Arc<CacheManager>) -> Self {
        Self {
            root: root.into(),
            cache,
            parser: PathParser::default(),
            max_workers: DEFAULT_MAX_WORKERS,
            progress: None,
        }
    }

    pub fn with_parser(mut self, parser: PathParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Report `(message, current, total)` after each shot of a parallel scan.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn parser(&self) -> &PathParser {
        &self.parser
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn shot_dir(&self, episode: &str, sequence: &str, shot: &str) -> PathBuf {
        self.root.join(episode).join(sequence).join(shot)
    }

    pub fn department_dir(&self, episode: &str, sequence: &str, shot: &str, department: &str) -> PathBuf {
        self.shot_dir(episode, sequence, shot).join(department)
    }

    fn root_key(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }

    /// Subdirectories of `dir` (optionally with a case-insensitive name
    /// prefix), sorted, cached under `parts`.
    fn cached_listing(&self, parts: &[&str], dir: &Path, prefix: Option<&str>) -> Vec<String> {
        if let Some(hit) = self.cache.get::<Vec<String>>(parts) {
            trace!("Listing cache hit: {}", dir.display());
            return hit;
        }
        let names: Vec<String> = media::list_dirs(dir)
            .into_iter()
            .filter(|name| prefix.is_none_or(|p| has_prefix_ci(name, p)))
            .collect();
        self.cache.set(&names, parts);
        names
    }

    pub fn scan_episodes(&self) -> Vec<String> {
        let root = self.root_key();
        self.cached_listing(&["episodes", &root], &self.root, Some("ep"))
    }

    pub fn scan_sequences(&self, episode: &str) -> Vec<String> {
        let root = self.root_key();
        self.cached_listing(&["sequences", &root, episode], &self.root.join(episode), Some("sq"))
    }

    pub fn scan_shots(&self, episode: &str, sequence: &str) -> Vec<String> {
        let root = self.root_key();
        self.cached_listing(
            &["shots", &root, episode, sequence],
            &self.root.join(episode).join(sequence),
            Some("sh"),
        )
    }

    /// Every subdirectory of a shot is a department.
    pub fn scan_departments(&self, episode: &str, sequence: &str, shot: &str) -> Vec<String> {
        let root = self.root_key();
        self.cached_listing(
            &["departments", &root, episode, sequence, shot],
            &self.shot_dir(episode, sequence, shot),
            None,
        )
    }

    /// Union of versions from MOV names in `output/` and version-named
    /// folders in `version/`, numerically sorted.
    pub fn scan_versions(&self, episode: &str, sequence: &str, shot: &str, department: &str) -> Vec<String> {
        let root = self.root_key();
        let parts = ["versions", root.as_str(), episode, sequence, shot, department];
        if let Some(hit) = self.cache.get::<Vec<String>>(&parts) {
            return hit;
        }

        let dept_dir = self.department_dir(episode, sequence, shot, department);
        // Keyed by number: `V003/`, `v0003/` and `_v003.mov` are one version
        let mut found: BTreeMap<u32, String> = BTreeMap::new();

        for mov in media::list_files(&dept_dir.join("output"), media::is_mov) {
            if let Some(version) = self.mov_version(&mov) {
                if let Some(n) = VersionManager::parse(&version) {
                    found.entry(n).or_insert(version);
                }
            }
        }
        for dir in media::list_dirs(&dept_dir.join("version")) {
            if let (Some(n), Some(padding)) = (VersionManager::parse(&dir), VersionManager::padding_of(&dir)) {
                found.entry(n).or_insert_with(|| VersionManager::format(n, padding));
            }
        }

        let versions: Vec<String> = found.into_values().collect();
        self.cache.set(&versions, &parts);
        versions
    }

    /// Version token of a MOV file name.
    fn mov_version(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_string_lossy();
        self.parser.version_from_filename(&name)
    }

    /// Media for one version: MOVs whose name carries that version number,
    /// and the image files of the matching `version/` folder.
    ///
    /// A version folder holding only layer subfolders (lighting) yields the
    /// first layer that contains images.
    pub fn get_media_files(
        &self,
        episode: &str,
        sequence: &str,
        shot: &str,
        department: &str,
        version: &str,
    ) -> MediaFiles {
        let dept_dir = self.department_dir(episode, sequence, shot, department);
        let wanted = VersionManager::parse(version);

        let mov_files = media::list_files(&dept_dir.join("output"), |p| {
            media::is_mov(p)
                && wanted.is_some()
                && self.mov_version(p).and_then(|v| VersionManager::parse(&v)) == wanted
        });

        let version_root = dept_dir.join("version");
        let mut sequence_files = Vec::new();
        if let Some(dir) = media::list_dirs(&version_root)
            .into_iter()
            .find(|d| wanted.is_some() && VersionManager::parse(d) == wanted)
        {
            let version_dir = version_root.join(dir);
            sequence_files = media::list_files(&version_dir, media::is_image);
            if sequence_files.is_empty() {
                sequence_files = media::list_dirs(&version_dir)
                    .into_iter()
                    .map(|layer| media::list_files(&version_dir.join(layer), media::is_image))
                    .find(|files| !files.is_empty())
                    .unwrap_or_default();
            }
        }

        let frame_range = path_parser::frame_range(&sequence_files);
        MediaFiles {
            mov_files,
            sequence_files,
            frame_range,
        }
    }

    /// Per-department versions, latest version and its media for one shot.
    pub fn scan_shot_detail(&self, episode: &str, sequence: &str, shot: &str) -> Result<ShotInfo, ScanError> {
        let shot_dir = self.shot_dir(episode, sequence, shot);
        fs::metadata(&shot_dir).map_err(|source| ScanError::Io {
            path: shot_dir.clone(),
            source,
        })?;

        let mut info = ShotInfo::empty(episode, sequence, shot);
        for department in self.scan_departments(episode, sequence, shot) {
            let versions = self.scan_versions(episode, sequence, shot, &department);
            let current_version = VersionManager::latest(&versions);
            let media = current_version
                .as_deref()
                .map(|v| self.get_media_files(episode, sequence, shot, &department, v))
                .unwrap_or_default();
            if info.frame_range.is_none() {
                info.frame_range = media.frame_range;
            }
            info.departments.insert(
                department.clone(),
                DepartmentInfo {
                    name: department,
                    versions,
                    current_version,
                    media,
                },
            );
        }
        trace!("Scanned {}: {} departments", info.full_name(), info.departments.len());
        Ok(info)
    }

    /// Scan every shot of a sequence on a bounded worker pool.
    ///
    /// Results arrive in completion order and are keyed by shot name. A
    /// shot whose scan fails (or panics) is logged and stored empty.
    pub fn scan_sequence_parallel(&self, episode: &str, sequence: &str) -> SequenceShots {
        let shots = self.scan_shots(episode, sequence);
        let total = shots.len();
        let mut out = SequenceShots::new();
        if total == 0 {
            return out;
        }

        let workers = Workers::new(self.max_workers.min(total));
        let (tx, rx) = unbounded();

        for shot in shots {
            let tx = tx.clone();
            let scanner = self.clone();
            let (episode, sequence) = (episode.to_string(), sequence.to_string());
            workers.execute(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    scanner.scan_shot_detail(&episode, &sequence, &shot)
                }))
                .unwrap_or_else(|payload| {
                    error!("Scan of {} panicked: {}", shot, panic_message(payload.as_ref()));
                    Err(ScanError::WorkerPanic(shot.clone()))
                });
                let _ = tx.send((shot, result));
            });
        }
        drop(tx);

        for (done, (shot, result)) in rx.iter().enumerate() {
            let info = match result {
                Ok(info) => info,
                Err(e) => {
                    warn!("Failed to scan {}/{}/{}: {}", episode, sequence, shot, e);
                    ShotInfo::empty(episode, sequence, &shot)
                }
            };
            report(&self.progress, &format!("Scanned {}", shot), done + 1, total);
            out.insert(shot, info);
        }

        debug!("Sequence {}/{}: {} shots scanned", episode, sequence, out.len());
        out
    }

    /// Scan the selected episodes (all when `None`), one sequence at a time.
    pub fn scan_full(&self, episodes: Option<&[String]>) -> ScanResult {
        let start = Instant::now();
        let episodes = match episodes {
            Some(list) => list.to_vec(),
            None => self.scan_episodes(),
        };

        let mut result = ScanResult::default();
        for episode in episodes {
            let sequences = path_parser::sort_sequences(&self.scan_sequences(&episode));
            let entry = result.episodes.entry(episode.clone()).or_default();
            for sequence in sequences {
                let shots = self.scan_sequence_parallel(&episode, &sequence);
                entry.insert(sequence, shots);
            }
        }
        result.scan_time = start.elapsed();

        info!(
            "Scan complete: {} sequences, {} shots in {:.2}s",
            result.total_sequences(),
            result.total_shots(),
            result.scan_time.as_secs_f64()
        );
        result
    }

    /// Forget everything cached (forced rescan).
    pub fn invalidate_cache(&self) {
        info!("Scan cache invalidated");
        self.cache.clear();
    }
}

fn has_prefix_ci(name: &str, prefix: &str) -> bool {
    name.len() >= prefix.len()
        && name.is_char_boundary(prefix.len())
        && name[..prefix.len()].eq_ignore_ascii_case(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{add_mov, add_sequence, scanner, touch};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v002");
        add_sequence(root, "Ep01", "sq0010", "SH0010", "comp", "v003", 1001..=1010);
        add_mov(root, "Ep01", "sq0010", "SH0020", "comp", "v010");
        add_mov(root, "Ep01", "sq0010", "SH0020", "comp", "v002");
        add_mov(root, "Ep01", "sq0020", "SH0010", "anim", "v001");
        fs::create_dir_all(root.join("Ep02").join("sq0010")).unwrap();
        fs::create_dir_all(root.join("assets")).unwrap();
        fs::create_dir_all(root.join("Ep01").join("sq0010").join("notes")).unwrap();
        tmp
    }

    #[test]
    fn test_hierarchy_listings() {
        let tmp = project();
        let scanner = scanner(tmp.path());
        assert_eq!(scanner.scan_episodes(), vec!["Ep01", "Ep02"]);
        assert_eq!(scanner.scan_sequences("Ep01"), vec!["sq0010", "sq0020"]);
        assert_eq!(scanner.scan_shots("Ep01", "sq0010"), vec!["SH0010", "SH0020"]);
        assert_eq!(scanner.scan_departments("Ep01", "sq0010", "SH0010"), vec!["comp"]);
        assert!(scanner.scan_shots("Ep09", "sq0010").is_empty());
    }

    #[test]
    fn test_versions_union_sorted() {
        let tmp = project();
        let scanner = scanner(tmp.path());
        assert_eq!(
            scanner.scan_versions("Ep01", "sq0010", "SH0010", "comp"),
            vec!["v001", "v002", "v003"]
        );
        assert_eq!(scanner.scan_versions("Ep01", "sq0010", "SH0020", "comp"), vec!["v002", "v010"]);
    }

    #[test]
    fn test_media_files() {
        let tmp = project();
        let scanner = scanner(tmp.path());
        let media = scanner.get_media_files("Ep01", "sq0010", "SH0010", "comp", "v002");
        assert_eq!(media.mov_files.len(), 1);
        assert!(media.sequence_files.is_empty());

        let media = scanner.get_media_files("Ep01", "sq0010", "SH0010", "comp", "v003");
        assert!(media.mov_files.is_empty());
        assert_eq!(media.sequence_files.len(), 10);
        assert_eq!(media.frame_range, Some((1001, 1010)));
    }

    #[test]
    fn test_layered_version_folder() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp
            .path()
            .join("Ep01/sq0010/SH0010/lighting/version/v001/beauty");
        for f in 1..=3 {
            touch(&dir.join(format!("beauty.{:04}.exr", f)));
        }
        let media = scanner(tmp.path()).get_media_files("Ep01", "sq0010", "SH0010", "lighting", "v001");
        assert_eq!(media.sequence_files.len(), 3);
        assert_eq!(media.frame_range, Some((1, 3)));
    }

    #[test]
    fn test_shot_detail() {
        let tmp = project();
        let info = scanner(tmp.path()).scan_shot_detail("Ep01", "sq0010", "SH0010").unwrap();
        let comp = info.department("comp").unwrap();
        assert_eq!(comp.current_version.as_deref(), Some("v003"));
        assert!(comp.has_sequence());
        assert!(!comp.has_mov());
        assert_eq!(info.frame_range, Some((1001, 1010)));

        assert!(matches!(
            scanner(tmp.path()).scan_shot_detail("Ep01", "sq0010", "SH9999"),
            Err(ScanError::Io { .. })
        ));
    }

    #[test]
    fn test_parallel_scan_reports_progress() {
        let tmp = project();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let scanner = scanner(tmp.path()).with_progress(Arc::new(move |_msg: &str, cur: usize, total: usize| {
            sink.lock().unwrap().push((cur, total));
        }));

        let shots = scanner.scan_sequence_parallel("Ep01", "sq0010");
        assert_eq!(shots.keys().collect::<Vec<_>>(), vec!["SH0010", "SH0020"]);
        assert_eq!(
            shots["SH0020"].department("comp").unwrap().current_version.as_deref(),
            Some("v010")
        );
        assert_eq!(*calls.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn test_full_scan() {
        let tmp = project();
        let result = scanner(tmp.path()).scan_full(None);
        assert_eq!(result.total_sequences(), 3);
        assert_eq!(result.total_shots(), 3);

        let only = scanner(tmp.path()).scan_full(Some(&["Ep02".to_string()]));
        assert_eq!(only.total_shots(), 0);
    }

    #[test]
    fn test_listing_is_cached_until_invalidated() {
        let tmp = project();
        let cache_dir = TempDir::new().unwrap();
        let scanner = ProjectScanner::new(tmp.path(), Arc::new(CacheManager::with_dir(cache_dir.path())));
        assert_eq!(scanner.scan_shots("Ep01", "sq0010").len(), 2);

        fs::create_dir_all(tmp.path().join("Ep01/sq0010/SH0030")).unwrap();
        assert_eq!(scanner.scan_shots("Ep01", "sq0010").len(), 2);

        scanner.invalidate_cache();
        assert_eq!(scanner.scan_shots("Ep01", "sq0010").len(), 3);
    }

    #[test]
    fn test_versions_dedup_across_case_and_padding() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v003");
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v004");
        let version_root = root.join("Ep01/sq0010/SH0010/comp/version");
        for dir in ["V003", "v0004", "V006"] {
            fs::create_dir_all(version_root.join(dir)).unwrap();
        }

        let scanner = scanner(root);
        assert_eq!(
            scanner.scan_versions("Ep01", "sq0010", "SH0010", "comp"),
            vec!["v003", "v004", "v006"]
        );
        let media = scanner.get_media_files("Ep01", "sq0010", "SH0010", "comp", "V003");
        assert_eq!(media.mov_files.len(), 1);
    }

    #[test]
    fn test_media_files_match_version_number() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let v1 = add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");
        let v10 = add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v0010");

        let scanner = scanner(root);
        assert_eq!(
            scanner.get_media_files("Ep01", "sq0010", "SH0010", "comp", "v001").mov_files,
            vec![v1]
        );
        assert_eq!(
            scanner.get_media_files("Ep01", "sq0010", "SH0010", "comp", "v010").mov_files,
            vec![v10]
        );
        assert!(
            scanner
                .get_media_files("Ep01", "sq0010", "SH0010", "comp", "latest")
                .mov_files
                .is_empty()
        );
    }

    #[test]
    fn test_unreadable_department_lists_empty() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");
        // `output` and `version` exist but are not directories
        let fx = root.join("Ep01/sq0010/SH0010/fx");
        touch(&fx.join("output"));
        touch(&fx.join("version"));

        let scanner = scanner(root);
        assert!(scanner.scan_versions("Ep01", "sq0010", "SH0010", "fx").is_empty());
        assert!(scanner.scan_versions("Ep01", "sq0010", "SH0010", "missing").is_empty());

        let info = scanner.scan_shot_detail("Ep01", "sq0010", "SH0010").unwrap();
        let fx = info.department("fx").unwrap();
        assert!(fx.versions.is_empty());
        assert_eq!(fx.current_version, None);
        assert!(!fx.has_mov() && !fx.has_sequence());
        assert_eq!(
            info.department("comp").unwrap().current_version.as_deref(),
            Some("v001")
        );
    }

    #[test]
    fn test_department_gone_after_listing() {
        let tmp = project();
        let cache_dir = TempDir::new().unwrap();
        let scanner = ProjectScanner::new(tmp.path(), Arc::new(CacheManager::with_dir(cache_dir.path())));
        assert_eq!(scanner.scan_departments("Ep01", "sq0010", "SH0020"), vec!["comp"]);

        // Listing still cached, directory removed underneath
        fs::remove_dir_all(tmp.path().join("Ep01/sq0010/SH0020/comp")).unwrap();
        let info = scanner.scan_shot_detail("Ep01", "sq0010", "SH0020").unwrap();
        let comp = info.department("comp").unwrap();
        assert!(comp.versions.is_empty());
        assert!(comp.media.mov_files.is_empty());
    }
}
