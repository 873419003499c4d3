//! On-disk project trees for tests.

use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::cache_man::CacheManager;
use crate::core::scanner::ProjectScanner;

pub(crate) fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"").unwrap();
}

pub(crate) fn dept_dir(root: &Path, ep: &str, seq: &str, shot: &str, dept: &str) -> PathBuf {
    root.join(ep).join(seq).join(shot).join(dept)
}

/// `{dept}/output/{ep}_{seq}_{shot}_{dept}_{version}.mov`
pub(crate) fn add_mov(root: &Path, ep: &str, seq: &str, shot: &str, dept: &str, version: &str) -> PathBuf {
    let path = dept_dir(root, ep, seq, shot, dept)
        .join("output")
        .join(format!("{}_{}_{}_{}_{}.mov", ep, seq, shot, dept, version));
    touch(&path);
    path
}

/// `{dept}/version/{version}/{ep}_{seq}_{shot}.####.exr`
pub(crate) fn add_sequence(
    root: &Path,
    ep: &str,
    seq: &str,
    shot: &str,
    dept: &str,
    version: &str,
    frames: RangeInclusive<u32>,
) -> Vec<PathBuf> {
    let dir = dept_dir(root, ep, seq, shot, dept).join("version").join(version);
    frames
        .map(|f| {
            let path = dir.join(format!("{}_{}_{}.{:04}.exr", ep, seq, shot, f));
            touch(&path);
            path
        })
        .collect()
}

/// Scanner with caching disabled, so tests see every filesystem change.
pub(crate) fn scanner(root: &Path) -> ProjectScanner {
    let cache = CacheManager::new(
        root.join(".cache"),
        CacheManager::DEFAULT_MEMORY_TTL,
        CacheManager::DEFAULT_DISK_TTL,
        false,
    );
    ProjectScanner::new(root, Arc::new(cache))
}
