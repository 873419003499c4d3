//! Timeline assembly and mutation through a [`TimelineHost`].
//!
//! - [`builder`]: create-or-update review timelines from scanned shots
//! - [`updater`]: move placed items between versions
//! - [`switcher`]: move placed items between departments
//! - [`audio`]: lay audio files under the video track

use std::path::Path;

use crate::core::path_parser;
use crate::entities::traits::META_SHOT;
use crate::entities::{ItemId, TimelineHost};

pub mod audio;
pub mod builder;
pub mod switcher;
pub mod updater;

pub use audio::{AudioSynchronizer, SyncResult};
pub use builder::{BuildResult, ResolvedShot, TimelineBuilder, TimelineConfig, VersionPolicy};
pub use switcher::{DepartmentSwitcher, SwitchResult};
pub use updater::{UpdateResult, VersionChange, VersionUpdater};

/// Bin for media relinked outside a build
pub const RELINK_BIN: &str = "Relinked";

/// `shot` metadata of an item, else its name, else its id.
pub(crate) fn item_label<H: TimelineHost + ?Sized>(host: &H, item: ItemId) -> String {
    match host.metadata(item, META_SHOT) {
        Ok(Some(shot)) if !shot.is_empty() => shot,
        _ => host.item_name(item).unwrap_or_else(|_| item.to_string()),
    }
}

/// `{ep}/{seq}` bin of a media path, as the builder files clips.
pub(crate) fn bin_path_for(path: &Path) -> String {
    path_parser::shot_components(&path.to_string_lossy())
        .map(|shot| format!("{}/{}", shot.episode, shot.sequence))
        .unwrap_or_else(|| RELINK_BIN.to_string())
}
