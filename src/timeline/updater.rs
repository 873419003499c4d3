//! Re-version items already on a timeline.
//!
//! The current version of an item is read from its source media path, so
//! items placed by hand (without metadata) can be bumped too. The new
//! media path is the old one with every version token substituted; it must
//! exist on disk before the item is relinked.

use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::{Captures, Regex};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::{bin_path_for, item_label};
use crate::core::versions::VersionManager;
use crate::entities::traits::{META_MEDIA_PATH, META_VERSION};
use crate::entities::{ItemId, TimelineHost, TrackId};
use crate::error::{HostError, ItemError};
use crate::progress::{ProgressCallback, report};

lazy_static! {
    static ref PATH_VERSION_RE: Regex = Regex::new(r"(?i)([_/])v(\d{3,4})").unwrap();
}

/// Version token of a media path (`.../SH0010_comp_v003.mov` -> `v003`).
pub fn version_from_path(path: &str) -> Option<String> {
    PATH_VERSION_RE
        .captures(path)
        .and_then(|caps| caps.get(2))
        .map(|digits| format!("v{}", digits.as_str()))
}

/// `path` with every version token replaced by `new_version`, keeping the
/// separator and digit width. `None` when nothing changes.
pub fn substitute_version(path: &str, new_version: &str) -> Option<String> {
    let wanted = VersionManager::parse(new_version)?;
    let replaced = PATH_VERSION_RE.replace_all(path, |caps: &Captures| {
        let width = caps[2].len();
        format!("{}{}", &caps[1], VersionManager::format(wanted, width))
    });
    (replaced != path).then(|| replaced.into_owned())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionChange {
    pub shot: String,
    pub old_version: String,
    pub new_version: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateResult {
    pub updated_count: usize,
    pub skipped_count: usize,
    pub errors: Vec<ItemError>,
    pub changes: Vec<VersionChange>,
}

impl UpdateResult {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

enum Outcome {
    AlreadyCurrent,
    Relinked(VersionChange),
    NoMedia,
}

/// Moves timeline items between versions of the same media.
#[derive(Clone, Default)]
pub struct VersionUpdater {
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for VersionUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionUpdater").finish_non_exhaustive()
    }
}

impl VersionUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Version of the item's source media, from its path.
    pub fn current_version<H: TimelineHost + ?Sized>(&self, host: &H, item: ItemId) -> Option<String> {
        let path = host.item_media_path(item).ok()?;
        version_from_path(&path.to_string_lossy())
    }

    /// Sibling media path at `new_version`, if it exists on disk.
    pub fn new_media_path(&self, current: &Path, new_version: &str) -> Option<PathBuf> {
        let candidate = PathBuf::from(substitute_version(&current.to_string_lossy(), new_version)?);
        if candidate.exists() {
            Some(candidate)
        } else {
            debug!("No media at {}", candidate.display());
            None
        }
    }

    /// Relink one item to `new_version`. True when the item ends up at that
    /// version (including when it already was); false when no media exists
    /// for it or the host refused.
    pub fn update_shot_version<H: TimelineHost + ?Sized>(&self, host: &mut H, item: ItemId, new_version: &str) -> bool {
        match self.relink_version(host, item, new_version) {
            Ok(Outcome::AlreadyCurrent | Outcome::Relinked(_)) => true,
            Ok(Outcome::NoMedia) => false,
            Err(e) => {
                warn!("Version update of {} failed: {}", item, e);
                false
            }
        }
    }

    fn relink_version<H: TimelineHost + ?Sized>(
        &self,
        host: &mut H,
        item: ItemId,
        new_version: &str,
    ) -> Result<Outcome, HostError> {
        let current_path = host.item_media_path(item)?;
        let current = version_from_path(&current_path.to_string_lossy());
        if current
            .as_deref()
            .is_some_and(|v| VersionManager::compare(v, new_version).is_eq())
        {
            return Ok(Outcome::AlreadyCurrent);
        }

        let Some(new_path) = self.new_media_path(&current_path, new_version) else {
            return Ok(Outcome::NoMedia);
        };
        let new_version = version_from_path(&new_path.to_string_lossy()).unwrap_or_else(|| new_version.to_string());

        host.relink(item, &bin_path_for(&new_path), &new_path)?;
        host.set_metadata(item, META_VERSION, &new_version)?;
        host.set_metadata(item, META_MEDIA_PATH, &new_path.to_string_lossy())?;

        Ok(Outcome::Relinked(VersionChange {
            shot: item_label(&*host, item),
            old_version: current.unwrap_or_else(|| "unknown".to_string()),
            new_version,
        }))
    }

    /// Apply `target(current_version)` to every item on `track`.
    fn update_track<H, F>(&self, host: &mut H, track: TrackId, label: &str, target: F) -> Result<UpdateResult, HostError>
    where
        H: TimelineHost + ?Sized,
        F: Fn(Option<&str>) -> Option<String>,
    {
        let items = host.track_items(track)?;
        let total = items.len();
        let mut result = UpdateResult::default();
        report(&self.progress, &format!("{}: {} items", label, total), 0, total);

        for (i, item) in items.into_iter().enumerate() {
            let current = self.current_version(&*host, item);
            match target(current.as_deref()) {
                None => result.skipped_count += 1,
                Some(version) => match self.relink_version(host, item, &version) {
                    Ok(Outcome::Relinked(change)) => {
                        debug!("{}: {} -> {}", change.shot, change.old_version, change.new_version);
                        result.updated_count += 1;
                        result.changes.push(change);
                    }
                    Ok(Outcome::AlreadyCurrent | Outcome::NoMedia) => result.skipped_count += 1,
                    Err(e) => result.errors.push(ItemError::new(item_label(&*host, item), e)),
                },
            }
            report(&self.progress, &format!("Updated item {}", i + 1), i + 1, total);
        }

        info!(
            "{}: {} updated, {} skipped, {} errors",
            label,
            result.updated_count,
            result.skipped_count,
            result.errors.len()
        );
        Ok(result)
    }

    /// Move every item on the track to `new_version`.
    pub fn update_all_versions<H: TimelineHost + ?Sized>(
        &self,
        host: &mut H,
        track: TrackId,
        new_version: &str,
    ) -> Result<UpdateResult, HostError> {
        let label = format!("Set version {}", new_version);
        self.update_track(host, track, &label, |_| Some(new_version.to_string()))
    }

    /// Next version for every item. Items without a version are skipped.
    pub fn increment_all_versions<H: TimelineHost + ?Sized>(
        &self,
        host: &mut H,
        track: TrackId,
    ) -> Result<UpdateResult, HostError> {
        self.update_track(host, track, "Increment versions", |current| {
            let current = current?;
            let padding = VersionManager::padding_of(current).unwrap_or(VersionManager::DEFAULT_PADDING);
            Some(VersionManager::increment(current, padding))
        })
    }

    /// Previous version for every item; `v001` items are skipped.
    pub fn decrement_all_versions<H: TimelineHost + ?Sized>(
        &self,
        host: &mut H,
        track: TrackId,
    ) -> Result<UpdateResult, HostError> {
        self.update_track(host, track, "Decrement versions", |current| {
            let current = current?;
            let padding = VersionManager::padding_of(current).unwrap_or(VersionManager::DEFAULT_PADDING);
            VersionManager::decrement(current, padding)
        })
    }
}
