//! Create-or-update review timelines from scanned shots.
//!
//! A build is idempotent: the timeline name is derived from the selection,
//! an existing timeline of that name is updated in place (new shots
//! appended, changed versions swapped at their old position) and running
//! the same build twice changes nothing the second time.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::path_parser::{self, PathParser};
use crate::core::scanner::ProjectScanner;
use crate::core::versions::VersionManager;
use crate::entities::traits::{META_DEPARTMENT, META_MEDIA_PATH, META_SHOT, META_VERSION};
use crate::entities::{
    ClipId, ClipSource, DepartmentInfo, ItemId, ItemRange, MediaType, Placement, ShotInfo, ShotRef, TimelineHost,
    TimelineId, TrackId, TrackKind,
};
use crate::error::{BuildError, HostError, ItemError};
use crate::progress::{ProgressCallback, report};
use crate::utils::media;

/// Frames assumed when nothing tells the real length
pub const DEFAULT_DURATION: u32 = 100;

pub const VIDEO_TRACK_NAME: &str = "Video 1";
pub const AUDIO_TRACK_NAME: &str = "Audio 1";

/// Which version to put on the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionPolicy {
    #[default]
    Latest,
    /// This token when the shot has it, otherwise the latest
    Exact(String),
}

impl FromStr for VersionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(VersionPolicy::Latest);
        }
        if VersionManager::parse(s).is_none() {
            return Err(format!("invalid version '{}' (expected 'latest' or v###)", s));
        }
        Ok(VersionPolicy::Exact(s.to_string()))
    }
}

impl fmt::Display for VersionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionPolicy::Latest => f.write_str("latest"),
            VersionPolicy::Exact(v) => f.write_str(v),
        }
    }
}

/// One build request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineConfig {
    pub episode: String,
    pub sequences: Vec<String>,
    pub department: String,
    pub version: VersionPolicy,
    pub media_type: MediaType,
    pub fps: f64,
    pub include_audio: bool,
    pub color_space: Option<String>,
    /// Every sequence available in the episode (for `_all_` naming)
    pub all_sequences: Vec<String>,
}

impl TimelineConfig {
    pub fn new(episode: impl Into<String>, sequences: Vec<String>, department: impl Into<String>) -> Self {
        Self {
            episode: episode.into(),
            sequences,
            department: department.into(),
            version: VersionPolicy::Latest,
            media_type: MediaType::Mov,
            fps: 24.0,
            include_audio: true,
            color_space: None,
            all_sequences: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: VersionPolicy) -> Self {
        self.version = version;
        self
    }

    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_audio(mut self, include_audio: bool) -> Self {
        self.include_audio = include_audio;
        self
    }

    pub fn with_color_space(mut self, color_space: Option<String>) -> Self {
        self.color_space = color_space;
        self
    }

    pub fn with_all_sequences(mut self, all_sequences: Vec<String>) -> Self {
        self.all_sequences = all_sequences;
        self
    }

    pub fn is_all_sequences_selected(&self) -> bool {
        if self.all_sequences.is_empty() {
            return false;
        }
        let selected: BTreeSet<&String> = self.sequences.iter().collect();
        let all: BTreeSet<&String> = self.all_sequences.iter().collect();
        selected == all
    }

    /// `{ep}_all_review`, or `{ep}_{seq}_{seq}..._review` in sequence order.
    pub fn timeline_name(&self) -> String {
        if self.is_all_sequences_selected() {
            return format!("{}_all_review", self.episode);
        }
        let mut sequences = path_parser::sort_sequences(&self.sequences);
        sequences.dedup();
        format!("{}_{}_review", self.episode, sequences.join("_"))
    }
}

/// A shot ready to be placed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedShot {
    pub shot: ShotRef,
    pub version: String,
    pub media_path: PathBuf,
    pub duration: u32, // from scanning; the host has the final word
}

impl ResolvedShot {
    pub fn full_name(&self) -> String {
        self.shot.full_name()
    }

    /// Bin clip name: `{shot}_{dept}_{version}`
    fn clip_name(&self, department: &str) -> String {
        format!("{}_{}_{}", self.full_name(), department, self.version)
    }

    fn bin_path(&self) -> String {
        format!("{}/{}", self.shot.episode, self.shot.sequence)
    }

    fn is_mov(&self) -> bool {
        media::is_mov(&self.media_path)
    }
}

/// Outcome of one build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildResult {
    pub timeline_name: String,
    #[serde(skip)]
    pub timeline: Option<TimelineId>,
    pub is_update: bool,
    pub shots_added: usize,
    pub shots_updated: usize,
    pub shots_unchanged: usize,
    /// Shots without department data, versions or media
    pub shots_skipped: Vec<String>,
    pub clips_reused: usize,
    pub errors: Vec<ItemError>,
}

impl BuildResult {
    /// No error recorded. Skips do not count.
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Assembles timelines through a [`TimelineHost`].
#[derive(Clone)]
pub struct TimelineBuilder {
    scanner: ProjectScanner,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for TimelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelineBuilder")
            .field("scanner", &self.scanner)
            .finish_non_exhaustive()
    }
}

impl TimelineBuilder {
    pub fn new(scanner: ProjectScanner) -> Self {
        Self { scanner, progress: None }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn scanner(&self) -> &ProjectScanner {
        &self.scanner
    }

    fn report(&self, message: &str, current: usize, total: usize) {
        report(&self.progress, message, current, total);
    }

    /// Scan the selection and resolve version + media for each shot, in
    /// sequence then shot order. Unresolvable shots are returned separately.
    pub fn resolve_shots(&self, config: &TimelineConfig) -> (Vec<ResolvedShot>, Vec<String>) {
        let mut resolved = Vec::new();
        let mut skipped = Vec::new();
        let parser = self.scanner.parser();

        for sequence in path_parser::sort_sequences(&config.sequences) {
            self.report(&format!("Scanning sequence: {}/{}", config.episode, sequence), 0, 0);
            let shots = self.scanner.scan_sequence_parallel(&config.episode, &sequence);
            let names: Vec<&String> = shots.keys().collect();

            for shot in parser.filter_and_sort_shots(&names) {
                let Some(info) = shots.get(&shot) else { continue };
                match self.resolve_shot(info, config) {
                    Some(r) => resolved.push(r),
                    None => {
                        debug!("Skipping {}: nothing to place for {}", info.full_name(), config.department);
                        skipped.push(info.full_name());
                    }
                }
            }
        }
        (resolved, skipped)
    }

    fn resolve_shot(&self, info: &ShotInfo, config: &TimelineConfig) -> Option<ResolvedShot> {
        let dept: &DepartmentInfo = info.department(&config.department)?;
        let version = match &config.version {
            VersionPolicy::Latest => VersionManager::latest(&dept.versions)?,
            VersionPolicy::Exact(wanted) => dept
                .versions
                .iter()
                .find(|v| VersionManager::compare(v, wanted).is_eq())
                .cloned()
                .or_else(|| VersionManager::latest(&dept.versions))?,
        };

        let media = if dept.current_version.as_deref() == Some(version.as_str()) {
            dept.media.clone()
        } else {
            self.scanner
                .get_media_files(&info.episode, &info.sequence, &info.shot, &dept.name, &version)
        };

        let media_path = match config.media_type {
            MediaType::Mov => {
                let parser = self.scanner.parser();
                media
                    .mov_files
                    .iter()
                    .find(|p| {
                        mov_version(parser, p).is_some_and(|v| VersionManager::compare(&v, &version).is_eq())
                    })
                    .or_else(|| media.mov_files.first())
                    .cloned()?
            }
            MediaType::Sequence => media.sequence_files.first().cloned()?,
        };

        let duration = media
            .frame_range
            .map(|(start, end)| end.saturating_sub(start) + 1)
            .unwrap_or(DEFAULT_DURATION);

        Some(ResolvedShot {
            shot: info.shot_ref(),
            version,
            media_path,
            duration,
        })
    }

    /// Build or update the timeline for `config`.
    ///
    /// Fails only when the host has no project or no shot resolves;
    /// per-shot problems land in [`BuildResult::errors`].
    pub fn build_timeline<H: TimelineHost + ?Sized>(
        &self,
        host: &mut H,
        config: &TimelineConfig,
    ) -> Result<BuildResult, BuildError> {
        host.project_name()?;
        let name = config.timeline_name();
        self.report(&format!("Timeline name: {}", name), 0, 0);

        let (shots, skipped) = self.resolve_shots(config);
        if shots.is_empty() {
            return Err(BuildError::NoValidShots(name));
        }

        let mut result = BuildResult {
            timeline_name: name.clone(),
            shots_skipped: skipped,
            ..Default::default()
        };

        match host.find_timeline(&name) {
            Ok(Some(timeline)) => {
                result.is_update = true;
                result.timeline = Some(timeline);
                self.update_timeline(host, config, timeline, &shots, &mut result);
            }
            Ok(None) => self.create_timeline(host, config, &name, &shots, &mut result),
            Err(e) => result.errors.push(ItemError::new(&name, e)),
        }

        info!(
            "{} {}: {} added, {} updated, {} unchanged, {} skipped, {} errors",
            if result.is_update { "Updated" } else { "Created" },
            name,
            result.shots_added,
            result.shots_updated,
            result.shots_unchanged,
            result.shots_skipped.len(),
            result.errors.len()
        );
        Ok(result)
    }

    fn create_timeline<H: TimelineHost + ?Sized>(
        &self,
        host: &mut H,
        config: &TimelineConfig,
        name: &str,
        shots: &[ResolvedShot],
        result: &mut BuildResult,
    ) {
        let tracks = host.create_timeline(name, config.fps).and_then(|timeline| {
            let video = host.add_track(timeline, VIDEO_TRACK_NAME, TrackKind::Video)?;
            let audio = if config.include_audio {
                Some(host.add_track(timeline, AUDIO_TRACK_NAME, TrackKind::Audio)?)
            } else {
                None
            };
            Ok((timeline, video, audio))
        });
        let (timeline, video, audio) = match tracks {
            Ok(t) => t,
            Err(e) => {
                result.errors.push(ItemError::new(name, format!("failed to create timeline: {}", e)));
                return;
            }
        };
        result.timeline = Some(timeline);

        let mut current_frame: i64 = 0;
        for (i, shot) in shots.iter().enumerate() {
            self.report(&format!("Adding clip: {}", shot.full_name()), i + 1, shots.len());
            let placed = self
                .import_clip(host, shot, config, result)
                .and_then(|clip| place_shot(host, video, audio, clip, current_frame, shot, config));
            match placed {
                Ok(placed) => {
                    current_frame += placed.range.duration();
                    result.shots_added += 1;
                }
                Err(e) => {
                    warn!("Failed to add {}: {}", shot.full_name(), e);
                    result.errors.push(ItemError::new(shot.full_name(), e));
                }
            }
        }
    }

    fn update_timeline<H: TimelineHost + ?Sized>(
        &self,
        host: &mut H,
        config: &TimelineConfig,
        timeline: TimelineId,
        shots: &[ResolvedShot],
        result: &mut BuildResult,
    ) {
        let name = result.timeline_name.clone();
        let video = match host.track(timeline, TrackKind::Video) {
            Ok(Some(track)) => track,
            Ok(None) => {
                result.errors.push(ItemError::new(&name, "no video track in existing timeline"));
                return;
            }
            Err(e) => {
                result.errors.push(ItemError::new(&name, e));
                return;
            }
        };
        let audio = if config.include_audio {
            host.track(timeline, TrackKind::Audio).ok().flatten()
        } else {
            None
        };

        let existing = match host.items_by_shot(video) {
            Ok(items) => items,
            Err(e) => {
                result.errors.push(ItemError::new(&name, e));
                return;
            }
        };
        let mut end_frame: Option<i64> = None;
        for item in existing.values() {
            if let Ok(range) = host.item_range(*item) {
                end_frame = Some(end_frame.map_or(range.timeline_out, |e| e.max(range.timeline_out)));
            }
        }
        debug!("{}: {} existing shots, end frame {:?}", name, existing.len(), end_frame);

        for (i, shot) in shots.iter().enumerate() {
            let shot_name = shot.full_name();
            self.report(&format!("Checking {}", shot_name), i + 1, shots.len());

            let outcome = match existing.get(&shot_name) {
                Some(&item) => {
                    let current = match host.metadata(item, META_VERSION) {
                        Ok(Some(v)) if !v.is_empty() => Some(v),
                        _ => host.item_media_path(item).ok().and_then(|p| {
                            self.scanner
                                .parser()
                                .version_from_filename(&p.to_string_lossy())
                        }),
                    };
                    match current {
                        Some(v) if VersionManager::compare(&v, &shot.version).is_eq() => {
                            result.shots_unchanged += 1;
                            Ok(())
                        }
                        Some(v) => {
                            info!("Updating {}: {} -> {}", shot_name, v, shot.version);
                            self.replace_in_place(host, video, audio, item, shot, config, result)
                                .map(|_| result.shots_updated += 1)
                        }
                        None => {
                            debug!("Skipping {}: existing version unknown", shot_name);
                            result.shots_unchanged += 1;
                            Ok(())
                        }
                    }
                }
                None => {
                    let at = end_frame.map_or(0, |e| e + 1);
                    info!("Adding new shot {} at {}", shot_name, at);
                    self.import_clip(host, shot, config, result)
                        .and_then(|clip| place_shot(host, video, audio, clip, at, shot, config))
                        .map(|placed| {
                            end_frame = Some(placed.range.timeline_out);
                            result.shots_added += 1;
                        })
                }
            };

            if let Err(e) = outcome {
                warn!("Failed to update {}: {}", shot_name, e);
                result.errors.push(ItemError::new(shot_name, e));
            }
        }
    }

    /// Swap a shot's item for the new version at the same timeline-in.
    ///
    /// The new items go in first; the old ones come out only once the new
    /// version is placed and tagged, so a failure leaves the old version
    /// where it was.
    #[allow(clippy::too_many_arguments)]
    fn replace_in_place<H: TimelineHost + ?Sized>(
        &self,
        host: &mut H,
        video: TrackId,
        audio: Option<TrackId>,
        old_item: ItemId,
        shot: &ResolvedShot,
        config: &TimelineConfig,
        result: &mut BuildResult,
    ) -> Result<ItemRange, HostError> {
        let timeline_in = host.item_range(old_item)?.timeline_in;
        let clip = self.import_clip(host, shot, config, result)?;

        let shot_name = shot.full_name();
        let mut old_audio = Vec::new();
        if let Some(audio) = audio {
            for item in host.track_items(audio)? {
                if host.metadata(item, META_SHOT)?.as_deref() == Some(shot_name.as_str()) {
                    old_audio.push(item);
                }
            }
        }

        let placed = place_shot(host, video, audio, clip, timeline_in, shot, config)?;
        if let Err(e) = host.remove_item(video, old_item) {
            discard(host, &placed.items);
            return Err(e);
        }
        if let Some(audio) = audio {
            for item in old_audio {
                host.remove_item(audio, item)?;
            }
        }
        Ok(placed.range)
    }

    /// Clip for a shot's media in bin `{ep}/{seq}`, reusing a same-named
    /// clip of the same media.
    fn import_clip<H: TimelineHost + ?Sized>(
        &self,
        host: &mut H,
        shot: &ResolvedShot,
        config: &TimelineConfig,
        result: &mut BuildResult,
    ) -> Result<ClipId, HostError> {
        let bin = host.find_or_create_bin(&shot.bin_path())?;
        let clip_name = shot.clip_name(&config.department);

        if let Some(clip) = host.find_clip_in_bin(bin, &clip_name)? {
            if host.clip_path(clip)? == shot.media_path {
                debug!("Reusing clip {} from bin {}", clip_name, shot.bin_path());
                result.clips_reused += 1;
                return Ok(clip);
            }
        }

        let source = ClipSource::new(&shot.media_path, clip_name)
            .with_colorspace(config.color_space.clone())
            .with_duration(shot.duration);
        host.find_or_create_clip(&source, bin)
    }
}

/// Items placed for one shot.
#[derive(Debug)]
struct PlacedShot {
    /// Range the host gave the video item
    range: ItemRange,
    items: Vec<(TrackId, ItemId)>,
}

/// Place on video (and audio for MOVs) at `at` and tag.
///
/// All or nothing: when a step fails, the items placed so far are removed
/// again before the error is returned.
fn place_shot<H: TimelineHost + ?Sized>(
    host: &mut H,
    video: TrackId,
    audio: Option<TrackId>,
    clip: ClipId,
    at: i64,
    shot: &ResolvedShot,
    config: &TimelineConfig,
) -> Result<PlacedShot, HostError> {
    let mut items = Vec::new();
    match place_and_tag(host, video, audio, clip, at, shot, config, &mut items) {
        Ok(range) => Ok(PlacedShot { range, items }),
        Err(e) => {
            discard(host, &items);
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn place_and_tag<H: TimelineHost + ?Sized>(
    host: &mut H,
    video: TrackId,
    audio: Option<TrackId>,
    clip: ClipId,
    at: i64,
    shot: &ResolvedShot,
    config: &TimelineConfig,
    placed: &mut Vec<(TrackId, ItemId)>,
) -> Result<ItemRange, HostError> {
    let shot_name = shot.full_name();
    let item = host.place_clip(video, clip, Placement::At(at))?;
    placed.push((video, item));
    host.set_metadata(item, META_SHOT, &shot_name)?;
    host.set_metadata(item, META_DEPARTMENT, &config.department)?;
    host.set_metadata(item, META_VERSION, &shot.version)?;
    host.set_metadata(item, META_MEDIA_PATH, &shot.media_path.to_string_lossy())?;
    let range = host.item_range(item)?;

    if let Some(audio) = audio.filter(|_| shot.is_mov()) {
        let audio_item = host.place_clip(audio, clip, Placement::At(at))?;
        placed.push((audio, audio_item));
        host.set_metadata(audio_item, META_SHOT, &shot_name)?;
    }
    Ok(range)
}

/// Take items back off their tracks, newest first. Failures are logged.
fn discard<H: TimelineHost + ?Sized>(host: &mut H, items: &[(TrackId, ItemId)]) {
    for &(track, item) in items.iter().rev() {
        match host.remove_item(track, item) {
            Ok(()) => debug!("Rolled back item {}", item),
            Err(e) => warn!("Could not remove item {} after a failed placement: {}", item, e),
        }
    }
}

fn mov_version(parser: &PathParser, path: &Path) -> Option<String> {
    parser.version_from_filename(&path.file_name()?.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BinId, MemoryHost};
    use crate::test_fixtures::{add_mov, add_sequence, scanner};
    use tempfile::TempDir;

    fn comp_config(sequences: &[&str]) -> TimelineConfig {
        TimelineConfig::new("Ep01", sequences.iter().map(|s| s.to_string()).collect(), "comp")
    }

    fn video_items(host: &MemoryHost, timeline: TimelineId) -> Vec<(String, ItemRange, String)> {
        let track = host.track(timeline, TrackKind::Video).unwrap().unwrap();
        host.track_items(track)
            .unwrap()
            .into_iter()
            .map(|i| {
                (
                    host.metadata(i, META_SHOT).unwrap().unwrap_or_default(),
                    host.item_range(i).unwrap(),
                    host.metadata(i, META_VERSION).unwrap().unwrap_or_default(),
                )
            })
            .collect()
    }

    #[test]
    fn test_timeline_name() {
        let config = comp_config(&["sq0020", "sq0010"]);
        assert_eq!(config.timeline_name(), "Ep01_sq0010_sq0020_review");

        let all = config
            .clone()
            .with_all_sequences(vec!["sq0010".into(), "sq0020".into()]);
        assert!(all.is_all_sequences_selected());
        assert_eq!(all.timeline_name(), "Ep01_all_review");

        let partial = config.with_all_sequences(vec!["sq0010".into(), "sq0020".into(), "sq0030".into()]);
        assert_eq!(partial.timeline_name(), "Ep01_sq0010_sq0020_review");
    }

    #[test]
    fn test_version_policy_parse() {
        assert_eq!("latest".parse::<VersionPolicy>(), Ok(VersionPolicy::Latest));
        assert_eq!("v009".parse::<VersionPolicy>(), Ok(VersionPolicy::Exact("v009".into())));
        assert!("nine".parse::<VersionPolicy>().is_err());
    }

    #[test]
    fn test_end_to_end_latest_mov() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");
        let v2 = add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v002");

        let builder = TimelineBuilder::new(scanner(root));
        let mut host = MemoryHost::new("show");
        let result = builder
            .build_timeline(&mut host, &comp_config(&["sq0010"]))
            .unwrap();

        assert!(result.success());
        assert!(!result.is_update);
        assert_eq!(result.shots_added, 1);

        let timeline = result.timeline.unwrap();
        let items = video_items(&host, timeline);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0, "Ep01_sq0010_SH0010");
        assert_eq!(items[0].1.timeline_in, 0);
        assert_eq!(items[0].2, "v002");

        let track = host.track(timeline, TrackKind::Video).unwrap().unwrap();
        let item = host.track_items(track).unwrap()[0];
        assert_eq!(host.metadata(item, META_DEPARTMENT).unwrap().as_deref(), Some("comp"));
        assert_eq!(host.item_media_path(item).unwrap(), v2);

        // MOV audio lands at the same frame
        let audio = host.track(timeline, TrackKind::Audio).unwrap().unwrap();
        let audio_items = host.track_items(audio).unwrap();
        assert_eq!(audio_items.len(), 1);
        assert_eq!(host.item_range(audio_items[0]).unwrap().timeline_in, 0);
    }

    #[test]
    fn test_shots_back_to_back_in_numeric_order() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        for shot in ["SH0020", "SH0010", "SH0010A", "SH0015"] {
            add_sequence(root, "Ep01", "sq0010", shot, "comp", "v001", 1001..=1048);
        }
        add_sequence(root, "Ep01", "sq0020", "SH0010", "comp", "v001", 1..=10);

        let builder = TimelineBuilder::new(scanner(root));
        let mut host = MemoryHost::new("show");
        let config = comp_config(&["sq0020", "sq0010"]).with_media_type(MediaType::Sequence);
        let result = builder.build_timeline(&mut host, &config).unwrap();

        let items = video_items(&host, result.timeline.unwrap());
        let names: Vec<&str> = items.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Ep01_sq0010_SH0010",
                "Ep01_sq0010_SH0015",
                "Ep01_sq0010_SH0020",
                "Ep01_sq0020_SH0010"
            ]
        );
        let ins: Vec<i64> = items.iter().map(|(_, r, _)| r.timeline_in).collect();
        assert_eq!(ins, vec![0, 48, 96, 144]);
        // Image sequences carry no audio
        let audio = host.track(result.timeline.unwrap(), TrackKind::Audio).unwrap().unwrap();
        assert!(host.track_items(audio).unwrap().is_empty());
    }

    #[test]
    fn test_cursor_uses_placed_duration() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let first = add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");
        add_mov(root, "Ep01", "sq0010", "SH0020", "comp", "v001");

        let mut host = MemoryHost::new("show");
        host.set_media_duration(&first, 37);
        let result = TimelineBuilder::new(scanner(root))
            .build_timeline(&mut host, &comp_config(&["sq0010"]))
            .unwrap();

        let items = video_items(&host, result.timeline.unwrap());
        assert_eq!(items[0].1.duration(), 37);
        assert_eq!(items[1].1.timeline_in, 37);
        assert_eq!(items[1].1.duration(), DEFAULT_DURATION as i64);
    }

    #[test]
    fn test_second_build_is_noop() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");
        add_mov(root, "Ep01", "sq0010", "SH0020", "comp", "v003");

        let builder = TimelineBuilder::new(scanner(root));
        let mut host = MemoryHost::new("show");
        let config = comp_config(&["sq0010"]);
        let first = builder.build_timeline(&mut host, &config).unwrap();
        assert_eq!(first.shots_added, 2);

        let second = builder.build_timeline(&mut host, &config).unwrap();
        assert!(second.is_update);
        assert_eq!(second.shots_added, 0);
        assert_eq!(second.shots_updated, 0);
        assert_eq!(second.shots_unchanged, 2);
        assert_eq!(second.timeline, first.timeline);
        assert_eq!(host.timeline_count(), 1);
        assert_eq!(video_items(&host, first.timeline.unwrap()).len(), 2);
    }

    #[test]
    fn test_version_bump_keeps_position() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");
        add_mov(root, "Ep01", "sq0010", "SH0020", "comp", "v002");
        add_mov(root, "Ep01", "sq0010", "SH0030", "comp", "v001");

        let builder = TimelineBuilder::new(scanner(root));
        let mut host = MemoryHost::new("show");
        let config = comp_config(&["sq0010"]);
        let first = builder.build_timeline(&mut host, &config).unwrap();
        let timeline = first.timeline.unwrap();
        let before = video_items(&host, timeline);
        let sh20_in = before[1].1.timeline_in;
        assert_eq!(sh20_in, 100);

        add_mov(root, "Ep01", "sq0010", "SH0020", "comp", "v003");
        let second = builder.build_timeline(&mut host, &config).unwrap();
        assert_eq!(second.shots_updated, 1);
        assert_eq!(second.shots_added, 0);

        let after = video_items(&host, timeline);
        assert_eq!(after.len(), 3);
        let sh20 = after.iter().find(|(n, _, _)| n == "Ep01_sq0010_SH0020").unwrap();
        assert_eq!(sh20.1.timeline_in, sh20_in);
        assert_eq!(sh20.2, "v003");
        // Neighbours untouched
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[2]);

        // Audio follows the swap without duplicates
        let audio = host.track(timeline, TrackKind::Audio).unwrap().unwrap();
        assert_eq!(host.track_items(audio).unwrap().len(), 3);
    }

    #[test]
    fn test_failed_version_bump_keeps_old_item() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");
        add_mov(root, "Ep01", "sq0010", "SH0020", "comp", "v002");
        add_mov(root, "Ep01", "sq0010", "SH0030", "comp", "v001");

        let builder = TimelineBuilder::new(scanner(root));
        let mut host = MemoryHost::new("show");
        let config = comp_config(&["sq0010"]);
        let timeline = builder.build_timeline(&mut host, &config).unwrap().timeline.unwrap();
        let before = video_items(&host, timeline);

        add_mov(root, "Ep01", "sq0010", "SH0020", "comp", "v003");
        host.reject_clip("Ep01_sq0010_SH0020_comp_v003");
        let failed = builder.build_timeline(&mut host, &config).unwrap();
        assert_eq!(failed.errors.len(), 1);
        assert_eq!(failed.errors[0].subject, "Ep01_sq0010_SH0020");
        assert_eq!(failed.shots_updated, 0);
        assert_eq!(video_items(&host, timeline), before);
        let audio = host.track(timeline, TrackKind::Audio).unwrap().unwrap();
        assert_eq!(host.track_items(audio).unwrap().len(), 3);

        // Rejections are not persisted, so a reloaded session can retry
        let session_dir = TempDir::new().unwrap();
        let session = session_dir.path().join("session.json");
        host.to_json(&session).unwrap();
        let mut host = MemoryHost::from_json(&session).unwrap();
        let retry = builder.build_timeline(&mut host, &config).unwrap();
        assert!(retry.success());
        assert_eq!(retry.shots_updated, 1);
        let after = video_items(&host, timeline);
        assert_eq!(after[1].1.timeline_in, 100);
        assert_eq!(after[1].2, "v003");
    }

    #[test]
    fn test_missing_version_tag_falls_back_to_media_path() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");
        add_mov(root, "Ep01", "sq0010", "SH0020", "comp", "v001");

        let builder = TimelineBuilder::new(scanner(root));
        let mut host = MemoryHost::new("show");
        let config = comp_config(&["sq0010"]);
        let timeline = builder.build_timeline(&mut host, &config).unwrap().timeline.unwrap();
        let video = host.track(timeline, TrackKind::Video).unwrap().unwrap();
        for item in host.track_items(video).unwrap() {
            host.set_metadata(item, META_VERSION, "").unwrap();
        }

        let same = builder.build_timeline(&mut host, &config).unwrap();
        assert_eq!(same.shots_unchanged, 2);
        assert_eq!(same.shots_updated, 0);

        add_mov(root, "Ep01", "sq0010", "SH0020", "comp", "v002");
        let bumped = builder.build_timeline(&mut host, &config).unwrap();
        assert_eq!(bumped.shots_updated, 1);
        assert_eq!(bumped.shots_unchanged, 1);
        let items = video_items(&host, timeline);
        assert_eq!(items[1].1.timeline_in, 100);
        assert_eq!(items[1].2, "v002");
    }

    #[test]
    fn test_unknown_existing_version_left_alone() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");

        let builder = TimelineBuilder::new(scanner(root));
        let mut host = MemoryHost::new("show");
        let config = comp_config(&["sq0010"]);
        let timeline = builder.build_timeline(&mut host, &config).unwrap().timeline.unwrap();
        let video = host.track(timeline, TrackKind::Video).unwrap().unwrap();
        let item = host.track_items(video).unwrap()[0];
        host.relink(item, "Ep01/sq0010", Path::new("/p/review/SH0010_cut.mov")).unwrap();
        host.set_metadata(item, META_VERSION, "").unwrap();

        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v002");
        let result = builder.build_timeline(&mut host, &config).unwrap();
        assert!(result.success());
        assert_eq!(result.shots_unchanged, 1);
        assert_eq!(result.shots_updated, 0);
        assert_eq!(host.track_items(video).unwrap(), vec![item]);
        assert_eq!(host.item_media_path(item).unwrap(), PathBuf::from("/p/review/SH0010_cut.mov"));
    }

    #[test]
    fn test_failed_tag_rolls_back_placement() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        for shot in ["SH0010", "SH0020", "SH0030"] {
            add_mov(root, "Ep01", "sq0010", shot, "comp", "v001");
        }
        let builder = TimelineBuilder::new(scanner(root));
        let config = comp_config(&["sq0010"]);

        // Video tag fails, then the audio tag fails (second META_SHOT write)
        for (key, skip) in [(META_VERSION, 0), (META_SHOT, 1)] {
            let mut host = FailingTags::new("Ep01_sq0010_SH0020", key, skip);
            let result = builder.build_timeline(&mut host, &config).unwrap();
            assert_eq!(result.shots_added, 2, "{}", key);
            assert_eq!(result.errors.len(), 1);
            assert_eq!(result.errors[0].subject, "Ep01_sq0010_SH0020");

            let timeline = result.timeline.unwrap();
            let placed: Vec<_> = video_items(&host.inner, timeline)
                .into_iter()
                .map(|(shot, range, _)| (shot, range.timeline_in))
                .collect();
            assert_eq!(
                placed,
                vec![
                    ("Ep01_sq0010_SH0010".to_string(), 0),
                    ("Ep01_sq0010_SH0030".to_string(), 100)
                ]
            );
            let audio = host.inner.track(timeline, TrackKind::Audio).unwrap().unwrap();
            assert_eq!(host.inner.track_items(audio).unwrap().len(), 2);
        }
    }

    #[test]
    fn test_mov_picked_by_version_number() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v0010");

        let builder = TimelineBuilder::new(scanner(root));
        let (latest, _) = builder.resolve_shots(&comp_config(&["sq0010"]));
        assert_eq!(VersionManager::parse(&latest[0].version), Some(10));
        assert!(latest[0].media_path.to_string_lossy().ends_with("_v0010.mov"));

        for (wanted, suffix) in [("v001", "_v001.mov"), ("v010", "_v0010.mov")] {
            let config = comp_config(&["sq0010"]).with_version(VersionPolicy::Exact(wanted.into()));
            let (shots, _) = builder.resolve_shots(&config);
            assert!(shots[0].media_path.to_string_lossy().ends_with(suffix), "{}", wanted);
        }
        assert_eq!(
            mov_version(builder.scanner.parser(), Path::new("/out/Ep01_sq0010_SH0010_comp_V0010.mov")).as_deref(),
            Some("v0010")
        );
    }

    #[test]
    fn test_new_shot_appended_after_end() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");
        add_mov(root, "Ep01", "sq0010", "SH0030", "comp", "v001");

        let builder = TimelineBuilder::new(scanner(root));
        let mut host = MemoryHost::new("show");
        let config = comp_config(&["sq0010"]);
        let first = builder.build_timeline(&mut host, &config).unwrap();

        add_mov(root, "Ep01", "sq0010", "SH0020", "comp", "v001");
        let second = builder.build_timeline(&mut host, &config).unwrap();
        assert_eq!(second.shots_added, 1);

        let items = video_items(&host, first.timeline.unwrap());
        let sh20 = items.iter().find(|(n, _, _)| n == "Ep01_sq0010_SH0020").unwrap();
        // End of SH0030 is 199, append at 200
        assert_eq!(sh20.1.timeline_in, 200);
    }

    #[test]
    fn test_exact_version_with_fallback() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        for v in ["v001", "v002", "v003"] {
            add_mov(root, "Ep01", "sq0010", "SH0010", "comp", v);
        }
        add_mov(root, "Ep01", "sq0010", "SH0020", "comp", "v005");

        let builder = TimelineBuilder::new(scanner(root));
        let config = comp_config(&["sq0010"]).with_version(VersionPolicy::Exact("v2".into()));
        let (shots, skipped) = builder.resolve_shots(&config);
        assert!(skipped.is_empty());
        assert_eq!(shots[0].version, "v002");
        assert!(shots[0].media_path.to_string_lossy().ends_with("_v002.mov"));
        assert_eq!(shots[1].version, "v005");
    }

    #[test]
    fn test_unresolvable_shots_are_skipped_not_errors() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");
        add_mov(root, "Ep01", "sq0010", "SH0020", "anim", "v001");
        std::fs::create_dir_all(root.join("Ep01/sq0010/SH0030/comp/output")).unwrap();

        let mut host = MemoryHost::new("show");
        let result = TimelineBuilder::new(scanner(root))
            .build_timeline(&mut host, &comp_config(&["sq0010"]))
            .unwrap();
        assert!(result.success());
        assert_eq!(result.shots_added, 1);
        assert_eq!(result.shots_skipped, vec!["Ep01_sq0010_SH0020", "Ep01_sq0010_SH0030"]);
    }

    #[test]
    fn test_no_valid_shots_fails_fast() {
        let tmp = TempDir::new().unwrap();
        add_mov(tmp.path(), "Ep01", "sq0010", "SH0010", "anim", "v001");

        let mut host = MemoryHost::new("show");
        let err = TimelineBuilder::new(scanner(tmp.path()))
            .build_timeline(&mut host, &comp_config(&["sq0010"]))
            .unwrap_err();
        assert!(matches!(err, BuildError::NoValidShots(_)));
        assert_eq!(host.timeline_count(), 0);

        let mut no_project = MemoryHost::without_project();
        assert!(matches!(
            TimelineBuilder::new(scanner(tmp.path())).build_timeline(&mut no_project, &comp_config(&["sq0010"])),
            Err(BuildError::Host(HostError::NoProject))
        ));
    }

    #[test]
    fn test_failing_shot_does_not_abort_build() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");
        add_mov(root, "Ep01", "sq0010", "SH0020", "comp", "v001");
        add_mov(root, "Ep01", "sq0010", "SH0030", "comp", "v001");

        let mut host = MemoryHost::new("show");
        host.reject_clip("Ep01_sq0010_SH0020_comp_v001");
        let result = TimelineBuilder::new(scanner(root))
            .build_timeline(&mut host, &comp_config(&["sq0010"]))
            .unwrap();

        assert!(!result.success());
        assert_eq!(result.shots_added, 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].subject, "Ep01_sq0010_SH0020");
        let items = video_items(&host, result.timeline.unwrap());
        assert_eq!(items[1].1.timeline_in, 100);
    }

    #[test]
    fn test_bin_clips_reused_across_timelines() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        add_mov(root, "Ep01", "sq0010", "SH0010", "comp", "v001");
        add_mov(root, "Ep01", "sq0020", "SH0010", "comp", "v001");

        let builder = TimelineBuilder::new(scanner(root));
        let mut host = MemoryHost::new("show");
        builder.build_timeline(&mut host, &comp_config(&["sq0010"])).unwrap();
        let both = builder
            .build_timeline(&mut host, &comp_config(&["sq0010", "sq0020"]))
            .unwrap();

        assert_eq!(host.timeline_count(), 2);
        assert_eq!(both.clips_reused, 1);
        assert_eq!(host.clip_count(), 2);
    }

    /// Memory host whose `key` writes for one shot fail after `skip` successes.
    struct FailingTags {
        inner: MemoryHost,
        shot: String,
        key: &'static str,
        skip: usize,
    }

    impl FailingTags {
        fn new(shot: &str, key: &'static str, skip: usize) -> Self {
            Self {
                inner: MemoryHost::new("show"),
                shot: shot.to_string(),
                key,
                skip,
            }
        }
    }

    impl TimelineHost for FailingTags {
        fn project_name(&self) -> Result<String, HostError> {
            self.inner.project_name()
        }
        fn find_or_create_bin(&mut self, path: &str) -> Result<BinId, HostError> {
            self.inner.find_or_create_bin(path)
        }
        fn find_clip_in_bin(&self, bin: BinId, name: &str) -> Result<Option<ClipId>, HostError> {
            self.inner.find_clip_in_bin(bin, name)
        }
        fn find_or_create_clip(&mut self, source: &ClipSource, bin: BinId) -> Result<ClipId, HostError> {
            self.inner.find_or_create_clip(source, bin)
        }
        fn clip_path(&self, clip: ClipId) -> Result<PathBuf, HostError> {
            self.inner.clip_path(clip)
        }
        fn create_timeline(&mut self, name: &str, fps: f64) -> Result<TimelineId, HostError> {
            self.inner.create_timeline(name, fps)
        }
        fn find_timeline(&self, name: &str) -> Result<Option<TimelineId>, HostError> {
            self.inner.find_timeline(name)
        }
        fn timeline_name(&self, timeline: TimelineId) -> Result<String, HostError> {
            self.inner.timeline_name(timeline)
        }
        fn add_track(&mut self, timeline: TimelineId, name: &str, kind: TrackKind) -> Result<TrackId, HostError> {
            self.inner.add_track(timeline, name, kind)
        }
        fn track(&self, timeline: TimelineId, kind: TrackKind) -> Result<Option<TrackId>, HostError> {
            self.inner.track(timeline, kind)
        }
        fn track_items(&self, track: TrackId) -> Result<Vec<ItemId>, HostError> {
            self.inner.track_items(track)
        }
        fn remove_item(&mut self, track: TrackId, item: ItemId) -> Result<(), HostError> {
            self.inner.remove_item(track, item)
        }
        fn place_clip(&mut self, track: TrackId, clip: ClipId, placement: Placement) -> Result<ItemId, HostError> {
            self.inner.place_clip(track, clip, placement)
        }
        fn item_range(&self, item: ItemId) -> Result<ItemRange, HostError> {
            self.inner.item_range(item)
        }
        fn item_name(&self, item: ItemId) -> Result<String, HostError> {
            self.inner.item_name(item)
        }
        fn metadata(&self, item: ItemId, key: &str) -> Result<Option<String>, HostError> {
            self.inner.metadata(item, key)
        }
        fn set_metadata(&mut self, item: ItemId, key: &str, value: &str) -> Result<(), HostError> {
            let shot = if key == META_SHOT {
                Some(value.to_string())
            } else {
                self.inner.metadata(item, META_SHOT)?
            };
            if key == self.key && shot.as_deref() == Some(self.shot.as_str()) {
                if self.skip == 0 {
                    return Err(HostError::Rejected(format!("cannot tag {} on item {}", key, item)));
                }
                self.skip -= 1;
            }
            self.inner.set_metadata(item, key, value)
        }
        fn item_media_path(&self, item: ItemId) -> Result<PathBuf, HostError> {
            self.inner.item_media_path(item)
        }
        fn replace_source(&mut self, item: ItemId, clip: ClipId) -> Result<(), HostError> {
            self.inner.replace_source(item, clip)
        }
    }
}
