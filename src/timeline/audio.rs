//! Audio track built from a directory of per-shot audio files.

use log::{debug, info, warn};
use serde::Serialize;
use std::cell::OnceCell;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::item_label;
use crate::core::path_parser::PathParser;
use crate::entities::traits::{META_MEDIA_PATH, META_SHOT};
use crate::entities::{ClipSource, ItemId, Placement, ShotRef, TimelineHost, TimelineId, TrackId, TrackKind};
use crate::error::{HostError, ItemError};
use crate::progress::{ProgressCallback, report};
use crate::utils::lighting::LightingScanner;
use crate::utils::media;

/// Bin receiving imported audio clips
pub const AUDIO_BIN: &str = "Audio";

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    pub matched_count: usize,
    /// Shots (or item names) with no audio file
    pub missing_audio: Vec<String>,
    pub errors: Vec<ItemError>,
}

impl SyncResult {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Matches shots to audio files and lays them out under the video.
///
/// The audio directory is walked once per instance, on first use.
pub struct AudioSynchronizer {
    audio_dir: PathBuf,
    parser: PathParser,
    files: OnceCell<Vec<PathBuf>>,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for AudioSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSynchronizer")
            .field("audio_dir", &self.audio_dir)
            .field("files", &self.files.get().map(Vec::len))
            .finish_non_exhaustive()
    }
}

impl AudioSynchronizer {
    pub fn new(audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            audio_dir: audio_dir.into(),
            parser: PathParser::default(),
            files: OnceCell::new(),
            progress: None,
        }
    }

    pub fn with_parser(mut self, parser: PathParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    /// Audio files under the directory (recursive), sorted.
    pub fn audio_files(&self) -> &[PathBuf] {
        self.files.get_or_init(|| {
            let mut files: Vec<PathBuf> = WalkDir::new(&self.audio_dir)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        debug!("Skipping audio entry: {}", e);
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file() && media::is_audio(entry.path()))
                .map(|entry| entry.into_path())
                .collect();
            files.sort();
            debug!("Found {} audio files in {}", files.len(), self.audio_dir.display());
            files
        })
    }

    /// Audio file for a shot.
    ///
    /// First pass: file stem contains both the episode and the shot name
    /// (case-insensitive). Second pass: episode and shot tokens extracted
    /// from the stem equal the shot's.
    pub fn find_audio_for_shot(&self, shot: &ShotRef) -> Option<PathBuf> {
        let files = self.audio_files();
        let episode = shot.episode.to_ascii_lowercase();
        let shot_name = shot.shot.to_ascii_lowercase();

        let stems: Vec<(String, &PathBuf)> = files
            .iter()
            .filter_map(|p| Some((p.file_stem()?.to_string_lossy().to_ascii_lowercase(), p)))
            .collect();

        if let Some((_, path)) = stems
            .iter()
            .find(|(stem, _)| stem.contains(&episode) && stem.contains(&shot_name))
        {
            return Some((*path).clone());
        }

        stems
            .iter()
            .find(|(stem, _)| {
                let ep = self.parser.episode(stem);
                let sh = self.parser.shot(stem);
                matches!((ep, sh), (Some(ep), Some(sh))
                    if ep.eq_ignore_ascii_case(&shot.episode) && sh.eq_ignore_ascii_case(&shot.shot))
            })
            .map(|(_, path)| (*path).clone())
    }

    /// Add an audio track named `track_name` to `timeline` holding each
    /// video item's audio at the same in/out.
    ///
    /// Fails only when the track cannot be read or created; per-shot
    /// problems land in the result.
    pub fn create_audio_track<H: TimelineHost + ?Sized>(
        &self,
        host: &mut H,
        timeline: TimelineId,
        video_track: TrackId,
        track_name: &str,
    ) -> Result<(TrackId, SyncResult), HostError> {
        let video_items = host.track_items(video_track)?;
        let audio_track = host.add_track(timeline, track_name, TrackKind::Audio)?;
        let total = video_items.len();
        let mut result = SyncResult::default();
        report(&self.progress, "Syncing audio", 0, total);

        for (i, video_item) in video_items.into_iter().enumerate() {
            let shot = LightingScanner::shot_info_for_item(&*host, video_item);
            let audio = shot.as_ref().and_then(|s| self.find_audio_for_shot(s));

            match (shot, audio) {
                (Some(shot), Some(audio)) => match place_audio(host, audio_track, video_item, &shot, &audio) {
                    Ok(_) => result.matched_count += 1,
                    Err(e) => {
                        warn!("Audio for {} not placed: {}", shot, e);
                        result.errors.push(ItemError::new(shot.full_name(), e));
                    }
                },
                (Some(shot), None) => result.missing_audio.push(shot.full_name()),
                (None, _) => result.missing_audio.push(item_label(&*host, video_item)),
            }
            report(&self.progress, &format!("Synced {}/{}", i + 1, total), i + 1, total);
        }

        info!(
            "Audio sync: {} matched, {} missing, {} errors",
            result.matched_count,
            result.missing_audio.len(),
            result.errors.len()
        );
        Ok((audio_track, result))
    }

    /// Same in and out point on the timeline. Unreadable items are not in sync.
    pub fn validate_sync<H: TimelineHost + ?Sized>(&self, host: &H, audio_item: ItemId, video_item: ItemId) -> bool {
        match (host.item_range(audio_item), host.item_range(video_item)) {
            (Ok(audio), Ok(video)) => audio == video,
            _ => false,
        }
    }
}

fn place_audio<H: TimelineHost + ?Sized>(
    host: &mut H,
    audio_track: TrackId,
    video_item: ItemId,
    shot: &ShotRef,
    audio: &Path,
) -> Result<ItemId, HostError> {
    let range = host.item_range(video_item)?;
    let bin = host.find_or_create_bin(&format!("{}/{}", AUDIO_BIN, shot.episode))?;
    let name = audio
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| shot.full_name());
    let duration = u32::try_from(range.duration()).unwrap_or(1);
    let clip = host.find_or_create_clip(&ClipSource::new(audio, name).with_duration(duration), bin)?;
    let item = host.place_clip(
        audio_track,
        clip,
        Placement::Range {
            timeline_in: range.timeline_in,
            timeline_out: range.timeline_out,
        },
    )?;
    host.set_metadata(item, META_SHOT, &shot.full_name())?;
    host.set_metadata(item, META_MEDIA_PATH, &audio.to_string_lossy())?;
    Ok(item)
}
