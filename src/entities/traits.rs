//! Timeline host interface.
//!
//! Everything the builder and the mutators need from the host review
//! application's project / timeline / clip / track object model. The
//! engine only talks to the host through [`TimelineHost`], so a real
//! adapter and the in-memory [`MemoryHost`](super::project::MemoryHost)
//! are interchangeable.
//!
//! Contract: every `find_or_create_*` call is idempotent. Calling it twice
//! with the same name/path returns the same entity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::HostError;

/// Item metadata keys written by the builder and mutators
pub const META_SHOT: &str = "shot";
pub const META_DEPARTMENT: &str = "department";
pub const META_VERSION: &str = "version";
pub const META_MEDIA_PATH: &str = "media_path";

macro_rules! host_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

host_id!(
    /// Media bin (folder) handle
    BinId
);
host_id!(
    /// Source clip handle
    ClipId
);
host_id!(
    /// Timeline (host sequence) handle
    TimelineId
);
host_id!(TrackId);
host_id!(
    /// Placed track item handle
    ItemId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
}

/// Where to place a clip on a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// In-point only; the host derives the out-point from clip duration
    At(i64),
    /// Explicit inclusive in/out pair
    Range { timeline_in: i64, timeline_out: i64 },
}

/// Placed range of an item. `timeline_out` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRange {
    pub timeline_in: i64,
    pub timeline_out: i64,
}

impl ItemRange {
    pub fn new(timeline_in: i64, duration: i64) -> Self {
        Self {
            timeline_in,
            timeline_out: timeline_in + duration.max(1) - 1,
        }
    }

    pub fn duration(&self) -> i64 {
        self.timeline_out - self.timeline_in + 1
    }
}

/// Media to import as a clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSource {
    pub path: PathBuf,
    pub name: String,
    pub colorspace: Option<String>,
    /// Frame count known from scanning; the host may disagree
    pub duration_hint: u32,
}

impl ClipSource {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            colorspace: None,
            duration_hint: 0,
        }
    }

    pub fn with_colorspace(mut self, colorspace: Option<String>) -> Self {
        self.colorspace = colorspace;
        self
    }

    pub fn with_duration(mut self, frames: u32) -> Self {
        self.duration_hint = frames;
        self
    }
}

/// Host application adapter.
pub trait TimelineHost {
    // -- project level --

    /// Name of the active project, or [`HostError::NoProject`].
    fn project_name(&self) -> Result<String, HostError>;

    /// Find or create a bin by `/`-separated path, creating parents as needed.
    fn find_or_create_bin(&mut self, path: &str) -> Result<BinId, HostError>;

    /// Clip with the given display name directly inside `bin`.
    fn find_clip_in_bin(&self, bin: BinId, name: &str) -> Result<Option<ClipId>, HostError>;

    /// Import media into `bin`, reusing an existing clip with the same path.
    fn find_or_create_clip(&mut self, source: &ClipSource, bin: BinId) -> Result<ClipId, HostError>;

    /// Source media path of a clip.
    fn clip_path(&self, clip: ClipId) -> Result<PathBuf, HostError>;

    // -- timeline level --

    fn create_timeline(&mut self, name: &str, fps: f64) -> Result<TimelineId, HostError>;

    fn find_timeline(&self, name: &str) -> Result<Option<TimelineId>, HostError>;

    fn timeline_name(&self, timeline: TimelineId) -> Result<String, HostError>;

    fn add_track(&mut self, timeline: TimelineId, name: &str, kind: TrackKind) -> Result<TrackId, HostError>;

    /// First track of the given kind.
    fn track(&self, timeline: TimelineId, kind: TrackKind) -> Result<Option<TrackId>, HostError>;

    /// Items on a track, ordered by timeline-in.
    fn track_items(&self, track: TrackId) -> Result<Vec<ItemId>, HostError>;

    fn remove_item(&mut self, track: TrackId, item: ItemId) -> Result<(), HostError>;

    /// Items keyed by shot name: `shot` metadata, falling back to the item name.
    fn items_by_shot(&self, track: TrackId) -> Result<BTreeMap<String, ItemId>, HostError> {
        let mut out = BTreeMap::new();
        for item in self.track_items(track)? {
            let shot = match self.metadata(item, META_SHOT)? {
                Some(shot) if !shot.is_empty() => shot,
                _ => self.item_name(item)?,
            };
            out.insert(shot, item);
        }
        Ok(out)
    }

    // -- item level --

    fn place_clip(&mut self, track: TrackId, clip: ClipId, placement: Placement) -> Result<ItemId, HostError>;

    /// Actual placed range, as the host sees it.
    fn item_range(&self, item: ItemId) -> Result<ItemRange, HostError>;

    fn item_name(&self, item: ItemId) -> Result<String, HostError>;

    fn metadata(&self, item: ItemId, key: &str) -> Result<Option<String>, HostError>;

    fn set_metadata(&mut self, item: ItemId, key: &str, value: &str) -> Result<(), HostError>;

    /// Source media path of the clip behind an item.
    fn item_media_path(&self, item: ItemId) -> Result<PathBuf, HostError>;

    /// Swap the item's source clip, keeping its position.
    fn replace_source(&mut self, item: ItemId, clip: ClipId) -> Result<(), HostError>;

    /// Import `path` into `bin_path` and swap it in as the item's source.
    fn relink(&mut self, item: ItemId, bin_path: &str, path: &Path) -> Result<ClipId, HostError> {
        let bin = self.find_or_create_bin(bin_path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let duration = self.item_range(item)?.duration();
        let source = ClipSource::new(path, name).with_duration(u32::try_from(duration).unwrap_or(1));
        let clip = self.find_or_create_clip(&source, bin)?;
        self.replace_source(item, clip)?;
        Ok(clip)
    }
}
