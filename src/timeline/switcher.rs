//! Switch timeline items to another department's output.
//!
//! The department of an item is the first known department name found as
//! a segment of its media path. Switching swaps that segment (and the
//! matching `_{dept}_` token of the file name, when the segment alone does
//! not point at existing media) and relinks the item.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::{bin_path_for, item_label};
use crate::core::path_parser::{self, normalize_path};
use crate::entities::traits::{META_DEPARTMENT, META_MEDIA_PATH};
use crate::entities::{ItemId, TimelineHost, TrackId};
use crate::error::{HostError, ItemError};
use crate::progress::{ProgressCallback, report};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SwitchResult {
    pub success_count: usize,
    /// `"{shot}: {reason}"`
    pub skipped_shots: Vec<String>,
    pub errors: Vec<ItemError>,
    pub warnings: Vec<String>,
}

impl SwitchResult {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Known department of a media path.
pub fn department_of(path: &str) -> Option<&'static str> {
    path_parser::department_segment(path).map(|(_, dept)| dept)
}

/// Candidate paths for `new_department`, most specific first.
///
/// The first swaps the department directory only, the second also swaps a
/// `_{dept}_` token in the file name.
pub fn department_paths(path: &str, new_department: &str) -> Vec<String> {
    let normalized = normalize_path(path);
    let Some((idx, dept)) = path_parser::department_segment(&normalized) else {
        return Vec::new();
    };
    if dept.eq_ignore_ascii_case(new_department) {
        return Vec::new();
    }

    let swapped = format!(
        "{}{}{}",
        &normalized[..idx],
        new_department,
        &normalized[idx + dept.len()..]
    );
    let mut out = vec![swapped.clone()];

    if let Some(slash) = swapped.rfind('/') {
        let (dir, file) = swapped.split_at(slash + 1);
        let lower = file.to_ascii_lowercase();
        let token = format!("_{}_", dept);
        if let Some(pos) = lower.find(&token) {
            let renamed = format!(
                "{}{}_{}_{}",
                dir,
                &file[..pos],
                new_department,
                &file[pos + token.len()..]
            );
            out.push(renamed);
        }
    }
    out
}

/// Relinks items to the same shot's output from another department.
#[derive(Clone, Default)]
pub struct DepartmentSwitcher {
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for DepartmentSwitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepartmentSwitcher").finish_non_exhaustive()
    }
}

impl DepartmentSwitcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn current_department<H: TimelineHost + ?Sized>(&self, host: &H, item: ItemId) -> Option<&'static str> {
        let path = host.item_media_path(item).ok()?;
        department_of(&path.to_string_lossy())
    }

    /// Departments present across the track's items.
    pub fn available_departments<H: TimelineHost + ?Sized>(
        &self,
        host: &H,
        track: TrackId,
    ) -> Result<BTreeSet<String>, HostError> {
        Ok(host
            .track_items(track)?
            .into_iter()
            .filter_map(|item| self.current_department(host, item))
            .map(str::to_string)
            .collect())
    }

    /// Existing media for `new_department`, if any.
    pub fn find_department_media(&self, current: &Path, new_department: &str) -> Option<PathBuf> {
        department_paths(&current.to_string_lossy(), new_department)
            .into_iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    /// Relink every item on `track` to `new_department`.
    ///
    /// Items already there count as successes. Items with no department in
    /// their path, or no media for the target, are skipped.
    pub fn switch_department<H: TimelineHost + ?Sized>(
        &self,
        host: &mut H,
        track: TrackId,
        new_department: &str,
    ) -> Result<SwitchResult, HostError> {
        let items = host.track_items(track)?;
        let total = items.len();
        let mut result = SwitchResult::default();
        report(
            &self.progress,
            &format!("Switching {} items to {}", total, new_department),
            0,
            total,
        );

        for (i, item) in items.into_iter().enumerate() {
            let label = item_label(&*host, item);
            match self.switch_item(host, item, new_department) {
                Ok(Switch::Done) => result.success_count += 1,
                Ok(Switch::Skipped(reason)) => {
                    debug!("Skipping {}: {}", label, reason);
                    result.skipped_shots.push(format!("{}: {}", label, reason));
                }
                Ok(Switch::NoDepartment) => {
                    result
                        .warnings
                        .push(format!("{}: no known department in media path", label));
                    result
                        .skipped_shots
                        .push(format!("{}: unknown department", label));
                }
                Err(e) => {
                    warn!("Switching {} failed: {}", label, e);
                    result.errors.push(ItemError::new(label, e));
                }
            }
            report(&self.progress, &format!("Processed item {}", i + 1), i + 1, total);
        }

        info!(
            "Switch to {}: {} ok, {} skipped, {} errors",
            new_department,
            result.success_count,
            result.skipped_shots.len(),
            result.errors.len()
        );
        Ok(result)
    }

    fn switch_item<H: TimelineHost + ?Sized>(
        &self,
        host: &mut H,
        item: ItemId,
        new_department: &str,
    ) -> Result<Switch, HostError> {
        let current_path = host.item_media_path(item)?;
        let Some(current) = department_of(&current_path.to_string_lossy()) else {
            return Ok(Switch::NoDepartment);
        };
        if current.eq_ignore_ascii_case(new_department) {
            return Ok(Switch::Done);
        }

        let Some(new_path) = self.find_department_media(&current_path, new_department) else {
            return Ok(Switch::Skipped(format!("no media for {}", new_department)));
        };

        host.relink(item, &bin_path_for(&new_path), &new_path)?;
        host.set_metadata(item, META_DEPARTMENT, new_department)?;
        host.set_metadata(item, META_MEDIA_PATH, &new_path.to_string_lossy())?;
        Ok(Switch::Done)
    }
}

enum Switch {
    Done,
    Skipped(String),
    NoDepartment,
}
