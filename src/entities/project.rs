//! MemoryHost: in-memory timeline host.
//!
//! Implements [`TimelineHost`] over plain maps so the engine can run
//! without a host application. The CLI persists it as a JSON session via
//! `MemoryHost::to_json` / `MemoryHost::from_json`; tests use it as the
//! host double.

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::traits::{
    BinId, ClipId, ClipSource, ItemId, ItemRange, Placement, TimelineHost, TimelineId, TrackId, TrackKind,
};
use crate::error::HostError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Bin {
    path: String, // full `/`-joined path
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Clip {
    name: String,
    path: PathBuf,
    bin: BinId,
    colorspace: Option<String>,
    duration: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Timeline {
    name: String,
    fps: f64,
    tracks: Vec<TrackId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Track {
    name: String,
    kind: TrackKind,
    timeline: TimelineId,
    items: Vec<ItemId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Item {
    name: String,
    clip: ClipId,
    track: TrackId,
    range: ItemRange,
    metadata: BTreeMap<String, String>,
}

/// In-memory host project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryHost {
    /// Active project name; `None` means no project is open
    project: Option<String>,
    bins: BTreeMap<BinId, Bin>,
    clips: BTreeMap<ClipId, Clip>,
    timelines: BTreeMap<TimelineId, Timeline>,
    tracks: BTreeMap<TrackId, Track>,
    items: BTreeMap<ItemId, Item>,
    /// Real media lengths by path, overriding scan-time duration hints
    media_durations: BTreeMap<PathBuf, i64>,
    /// Clip names whose placement fails
    #[serde(skip)]
    rejected_clips: BTreeSet<String>,
}

impl MemoryHost {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            ..Default::default()
        }
    }

    /// Host with no active project; every project-level call fails.
    pub fn without_project() -> Self {
        Self::default()
    }

    /// Pretend the media at `path` is `frames` long, whatever scanning said.
    pub fn set_media_duration(&mut self, path: impl Into<PathBuf>, frames: i64) {
        self.media_durations.insert(path.into(), frames.max(1));
    }

    /// Make every placement of clip `name` fail with [`HostError::Rejected`].
    pub fn reject_clip(&mut self, name: impl Into<String>) {
        self.rejected_clips.insert(name.into());
    }

    pub fn timeline_count(&self) -> usize {
        self.timelines.len()
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    pub fn timeline_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.timelines.values().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }

    /// Save session to JSON file.
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<(), HostError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| HostError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Session saved to {}", path.display());
        Ok(())
    }

    /// Load session from JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self, HostError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn require_project(&self) -> Result<&str, HostError> {
        self.project.as_deref().ok_or(HostError::NoProject)
    }

    fn item(&self, item: ItemId) -> Result<&Item, HostError> {
        self.items.get(&item).ok_or_else(|| HostError::not_found("item", item))
    }

    fn item_mut(&mut self, item: ItemId) -> Result<&mut Item, HostError> {
        self.items.get_mut(&item).ok_or_else(|| HostError::not_found("item", item))
    }

    fn clip(&self, clip: ClipId) -> Result<&Clip, HostError> {
        self.clips.get(&clip).ok_or_else(|| HostError::not_found("clip", clip))
    }

    fn bin_by_path(&self, path: &str) -> Option<BinId> {
        self.bins.iter().find(|(_, b)| b.path == path).map(|(id, _)| *id)
    }
}

impl TimelineHost for MemoryHost {
    fn project_name(&self) -> Result<String, HostError> {
        self.require_project().map(str::to_string)
    }

    fn find_or_create_bin(&mut self, path: &str) -> Result<BinId, HostError> {
        self.require_project()?;
        let mut current = String::new();
        let mut last = None;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);
            let id = match self.bin_by_path(&current) {
                Some(id) => id,
                None => {
                    let id = BinId::new();
                    trace!("Bin created: {}", current);
                    self.bins.insert(id, Bin { path: current.clone() });
                    id
                }
            };
            last = Some(id);
        }
        last.ok_or_else(|| HostError::Rejected(format!("empty bin path '{}'", path)))
    }

    fn find_clip_in_bin(&self, bin: BinId, name: &str) -> Result<Option<ClipId>, HostError> {
        if !self.bins.contains_key(&bin) {
            return Err(HostError::not_found("bin", bin));
        }
        Ok(self
            .clips
            .iter()
            .find(|(_, c)| c.bin == bin && c.name == name)
            .map(|(id, _)| *id))
    }

    fn find_or_create_clip(&mut self, source: &ClipSource, bin: BinId) -> Result<ClipId, HostError> {
        self.require_project()?;
        if !self.bins.contains_key(&bin) {
            return Err(HostError::not_found("bin", bin));
        }
        if let Some((id, _)) = self.clips.iter().find(|(_, c)| c.bin == bin && c.path == source.path) {
            return Ok(*id);
        }
        let duration = self
            .media_durations
            .get(&source.path)
            .copied()
            .unwrap_or_else(|| i64::from(source.duration_hint.max(1)));
        let id = ClipId::new();
        self.clips.insert(
            id,
            Clip {
                name: source.name.clone(),
                path: source.path.clone(),
                bin,
                colorspace: source.colorspace.clone(),
                duration,
            },
        );
        trace!("Clip imported: {} ({} frames)", source.path.display(), duration);
        Ok(id)
    }

    fn clip_path(&self, clip: ClipId) -> Result<PathBuf, HostError> {
        Ok(self.clip(clip)?.path.clone())
    }

    fn create_timeline(&mut self, name: &str, fps: f64) -> Result<TimelineId, HostError> {
        self.require_project()?;
        if fps <= 0.0 {
            return Err(HostError::Rejected(format!("invalid frame rate {}", fps)));
        }
        let id = TimelineId::new();
        self.timelines.insert(
            id,
            Timeline {
                name: name.to_string(),
                fps,
                tracks: Vec::new(),
            },
        );
        debug!("Timeline created: {} @ {} fps", name, fps);
        Ok(id)
    }

    fn find_timeline(&self, name: &str) -> Result<Option<TimelineId>, HostError> {
        self.require_project()?;
        Ok(self.timelines.iter().find(|(_, t)| t.name == name).map(|(id, _)| *id))
    }

    fn timeline_name(&self, timeline: TimelineId) -> Result<String, HostError> {
        self.timelines
            .get(&timeline)
            .map(|t| t.name.clone())
            .ok_or_else(|| HostError::not_found("timeline", timeline))
    }

    fn add_track(&mut self, timeline: TimelineId, name: &str, kind: TrackKind) -> Result<TrackId, HostError> {
        let tl = self
            .timelines
            .get(&timeline)
            .ok_or_else(|| HostError::not_found("timeline", timeline))?;
        if tl.tracks.iter().any(|t| self.tracks.get(t).is_some_and(|t| t.name == name)) {
            return Err(HostError::Duplicate(tl.name.clone(), name.to_string()));
        }
        let id = TrackId::new();
        self.tracks.insert(
            id,
            Track {
                name: name.to_string(),
                kind,
                timeline,
                items: Vec::new(),
            },
        );
        if let Some(tl) = self.timelines.get_mut(&timeline) {
            tl.tracks.push(id);
        }
        Ok(id)
    }

    fn track(&self, timeline: TimelineId, kind: TrackKind) -> Result<Option<TrackId>, HostError> {
        let tl = self
            .timelines
            .get(&timeline)
            .ok_or_else(|| HostError::not_found("timeline", timeline))?;
        Ok(tl
            .tracks
            .iter()
            .copied()
            .find(|t| self.tracks.get(t).is_some_and(|t| t.kind == kind)))
    }

    fn track_items(&self, track: TrackId) -> Result<Vec<ItemId>, HostError> {
        let tr = self.tracks.get(&track).ok_or_else(|| HostError::not_found("track", track))?;
        let mut items = tr.items.clone();
        items.sort_by_key(|i| self.items.get(i).map_or(i64::MAX, |it| it.range.timeline_in));
        Ok(items)
    }

    fn remove_item(&mut self, track: TrackId, item: ItemId) -> Result<(), HostError> {
        let tr = self
            .tracks
            .get_mut(&track)
            .ok_or_else(|| HostError::not_found("track", track))?;
        let before = tr.items.len();
        tr.items.retain(|i| *i != item);
        if tr.items.len() == before {
            return Err(HostError::not_found("item", item));
        }
        self.items.remove(&item);
        Ok(())
    }

    fn place_clip(&mut self, track: TrackId, clip: ClipId, placement: Placement) -> Result<ItemId, HostError> {
        let source = self.clip(clip)?;
        if self.rejected_clips.contains(&source.name) {
            return Err(HostError::Rejected(format!("cannot place clip {}", source.name)));
        }
        let range = match placement {
            Placement::At(timeline_in) => ItemRange::new(timeline_in, source.duration),
            Placement::Range {
                timeline_in,
                timeline_out,
            } => {
                if timeline_out < timeline_in {
                    return Err(HostError::Rejected(format!(
                        "out point {} before in point {}",
                        timeline_out, timeline_in
                    )));
                }
                ItemRange {
                    timeline_in,
                    timeline_out,
                }
            }
        };
        let name = source.name.clone();

        let tr = self
            .tracks
            .get_mut(&track)
            .ok_or_else(|| HostError::not_found("track", track))?;
        let id = ItemId::new();
        tr.items.push(id);
        self.items.insert(
            id,
            Item {
                name,
                clip,
                track,
                range,
                metadata: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    fn item_range(&self, item: ItemId) -> Result<ItemRange, HostError> {
        Ok(self.item(item)?.range)
    }

    fn item_name(&self, item: ItemId) -> Result<String, HostError> {
        Ok(self.item(item)?.name.clone())
    }

    fn metadata(&self, item: ItemId, key: &str) -> Result<Option<String>, HostError> {
        Ok(self.item(item)?.metadata.get(key).cloned())
    }

    fn set_metadata(&mut self, item: ItemId, key: &str, value: &str) -> Result<(), HostError> {
        self.item_mut(item)?.metadata.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn item_media_path(&self, item: ItemId) -> Result<PathBuf, HostError> {
        let clip = self.item(item)?.clip;
        self.clip_path(clip)
    }

    fn replace_source(&mut self, item: ItemId, clip: ClipId) -> Result<(), HostError> {
        let name = self.clip(clip)?.name.clone();
        let it = self.item_mut(item)?;
        it.clip = clip;
        it.name = name;
        Ok(())
    }
}
