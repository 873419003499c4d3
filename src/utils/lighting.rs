//! Lighting renders: `{shot}/lighting/version/{v###}/{layer}/{pass}.####.exr`.
//!
//! Each version folder holds layer folders; each layer holds one or more
//! render passes (EXR sequences). Single-frame passes count. Layers with
//! no pass are dropped.

use log::{debug, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::media;
use super::sequences::{SequenceHandler, SequenceInfo};
use crate::core::path_parser;
use crate::core::versions::VersionManager;
use crate::entities::traits::META_SHOT;
use crate::entities::{ItemId, ShotRef, TimelineHost};

pub const LIGHTING_DEPARTMENT: &str = "lighting";

/// One render pass: an EXR sequence inside a layer folder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPassInfo {
    pub name: String,
    pub directory: PathBuf,
    pub pattern: String, // name.####.exr
    pub start_frame: u32,
    pub end_frame: u32,
    pub frame_count: usize,
    pub missing_frames: Vec<u32>,
    pub files: Vec<PathBuf>,
}

impl RenderPassInfo {
    fn from_sequence(seq: SequenceInfo) -> Self {
        Self {
            pattern: seq.file_pattern(),
            name: seq.base_name,
            directory: seq.directory,
            start_frame: seq.start_frame,
            end_frame: seq.end_frame,
            frame_count: seq.frame_count,
            missing_frames: seq.missing_frames,
            files: seq.files,
        }
    }

    /// `dir/name.####.exr`
    pub fn hash_pattern(&self) -> String {
        format!("{}/{}", self.directory.to_string_lossy(), self.pattern)
    }

    /// `dir/name.%04d.exr`
    pub fn printf_pattern(&self) -> String {
        let hashes = self.pattern.chars().filter(|c| *c == '#').count();
        let pattern = self
            .pattern
            .replace(&"#".repeat(hashes), &format!("%0{}d", hashes));
        format!("{}/{}", self.directory.to_string_lossy(), pattern)
    }

    pub fn is_complete(&self) -> bool {
        self.missing_frames.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerInfo {
    pub name: String,
    pub path: PathBuf,
    pub render_passes: Vec<RenderPassInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionInfo {
    pub version: String,
    pub path: PathBuf,
    pub layers: Vec<LayerInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightingScanResult {
    pub shot_name: String,
    pub department: String,
    pub versions: Vec<VersionInfo>, // numeric order
    pub latest_version: Option<String>,
}

impl LightingScanResult {
    pub fn has_data(&self) -> bool {
        !self.versions.is_empty()
    }

    pub fn version(&self, version: &str) -> Option<&VersionInfo> {
        self.versions
            .iter()
            .find(|v| VersionManager::compare(&v.version, version).is_eq())
    }
}

/// Scanner for layered lighting renders under one project root.
#[derive(Debug, Clone)]
pub struct LightingScanner {
    root: PathBuf,
}

impl LightingScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn scan_shot_lighting(&self, episode: &str, sequence: &str, shot: &str, department: &str) -> LightingScanResult {
        let version_root = self
            .root
            .join(episode)
            .join(sequence)
            .join(shot)
            .join(department)
            .join("version");

        let mut versions: Vec<VersionInfo> = media::list_dirs(&version_root)
            .into_iter()
            .filter(|name| VersionManager::parse(name).is_some())
            .map(|name| {
                let path = version_root.join(&name);
                VersionInfo {
                    layers: scan_layers(&path),
                    version: name,
                    path,
                }
            })
            .collect();
        versions.sort_by(|a, b| VersionManager::compare(&a.version, &b.version));

        let latest_version = versions.last().map(|v| v.version.clone());
        debug!(
            "Lighting scan {}/{}/{}: {} versions",
            episode,
            sequence,
            shot,
            versions.len()
        );

        LightingScanResult {
            shot_name: ShotRef::new(episode, sequence, shot).full_name(),
            department: department.to_string(),
            versions,
            latest_version,
        }
    }

    /// Shot of a timeline item: `shot` metadata (`Ep_sq_SH`), else the
    /// `ep*`/`sq*`/`sh*` segments of its media path.
    pub fn shot_info_for_item<H: TimelineHost + ?Sized>(host: &H, item: ItemId) -> Option<ShotRef> {
        match host.metadata(item, META_SHOT) {
            Ok(Some(shot)) => {
                if let Some(parsed) = ShotRef::from_full_name(&shot) {
                    return Some(parsed);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Cannot read metadata of {}: {}", item, e),
        }
        let path = host.item_media_path(item).ok()?;
        path_parser::shot_components(&path.to_string_lossy())
    }
}

fn scan_layers(version_path: &Path) -> Vec<LayerInfo> {
    media::list_dirs(version_path)
        .into_iter()
        .filter_map(|name| {
            let path = version_path.join(&name);
            let exrs = media::list_files(&path, |p| {
                p.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("exr"))
            });
            let render_passes: Vec<RenderPassInfo> = SequenceHandler::group_files(exrs, 1)
                .into_iter()
                .map(RenderPassInfo::from_sequence)
                .collect();
            (!render_passes.is_empty()).then_some(LayerInfo {
                name,
                path,
                render_passes,
            })
        })
        .collect()
}
