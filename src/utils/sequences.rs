//! Image sequence detection utilities
//!
//! Groups `name.####.ext` files into sequences and reports gaps.

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use super::media;
use crate::core::path_parser;

lazy_static! {
    static ref SEQUENCE_RE: Regex = Regex::new(r"^(.*)\.(\d{4,5})\.(\w+)$").unwrap();
}

/// A contiguous-or-gappy run of frames sharing base name and extension.
///
/// `is_complete()` holds exactly when `missing_frames` is empty, which is
/// when `frame_count == end_frame - start_frame + 1`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceInfo {
    pub directory: PathBuf,
    pub base_name: String,
    pub extension: String, // without dot
    pub start_frame: u32,
    pub end_frame: u32,
    pub frame_count: usize,
    pub missing_frames: Vec<u32>,
    pub padding: usize,
    pub files: Vec<PathBuf>, // frame order
}

impl SequenceInfo {
    pub fn is_complete(&self) -> bool {
        self.missing_frames.is_empty()
    }

    /// `dir/name.####.ext`
    pub fn hash_pattern(&self) -> String {
        format!(
            "{}/{}.{}.{}",
            self.directory.to_string_lossy(),
            self.base_name,
            "#".repeat(self.padding),
            self.extension
        )
    }

    /// `dir/name.%04d.ext`
    pub fn printf_pattern(&self) -> String {
        format!(
            "{}/{}.%0{}d.{}",
            self.directory.to_string_lossy(),
            self.base_name,
            self.padding,
            self.extension
        )
    }

    /// `name.####.ext` without the directory
    pub fn file_pattern(&self) -> String {
        format!("{}.{}.{}", self.base_name, "#".repeat(self.padding), self.extension)
    }
}

/// Outcome of checking a file list as one sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub frame_count: usize,
    pub frame_range: Option<(u32, u32)>,
    pub missing_frames: Vec<u32>,
    pub errors: Vec<String>,
}

/// Split a sequence filename into (base name, frame, ext, padding)
///
/// Example: "/path/seq.0001.exr" -> ("seq", 1, "exr", 4)
pub fn split_sequence_path(path: &Path) -> Option<(String, u32, String, usize)> {
    let name = path.file_name()?.to_str()?;
    let caps = SEQUENCE_RE.captures(name)?;
    let digits = caps.get(2)?.as_str();
    Some((
        caps.get(1)?.as_str().to_string(),
        digits.parse().ok()?,
        caps.get(3)?.as_str().to_string(),
        digits.len(),
    ))
}

/// Frames in `[start, end]` absent from `frames`.
fn gaps(frames: &BTreeSet<u32>) -> Vec<u32> {
    match (frames.first(), frames.last()) {
        (Some(&start), Some(&end)) => (start..=end).filter(|f| !frames.contains(f)).collect(),
        _ => Vec::new(),
    }
}

/// Stateless sequence helpers.
pub struct SequenceHandler;

impl SequenceHandler {
    /// Group files into sequences keyed by (directory, base name, extension),
    /// keeping groups with at least `min_frames` frames. Sorted by pattern.
    pub fn group_files<I>(files: I, min_frames: usize) -> Vec<SequenceInfo>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        type Key = (PathBuf, String, String);
        let mut groups: BTreeMap<Key, Vec<(u32, usize, PathBuf)>> = BTreeMap::new();

        for path in files {
            let Some((base, frame, ext, padding)) = split_sequence_path(&path) else {
                continue;
            };
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            groups.entry((dir, base, ext)).or_default().push((frame, padding, path));
        }

        groups
            .into_iter()
            .filter(|(_, frames)| frames.len() >= min_frames.max(1))
            .map(|((directory, base_name, extension), mut frames)| {
                frames.sort_by_key(|(frame, _, _)| *frame);
                let set: BTreeSet<u32> = frames.iter().map(|(f, _, _)| *f).collect();
                let padding = frames[0].1;
                SequenceInfo {
                    directory,
                    base_name,
                    extension,
                    start_frame: set.first().copied().unwrap_or(0),
                    end_frame: set.last().copied().unwrap_or(0),
                    frame_count: set.len(),
                    missing_frames: gaps(&set),
                    padding,
                    files: frames.into_iter().map(|(_, _, p)| p).collect(),
                }
            })
            .collect()
    }

    /// Image sequences (two frames or more) directly inside `dir`.
    pub fn detect_sequences(dir: &Path) -> Vec<SequenceInfo> {
        let sequences = Self::group_files(media::list_files(dir, media::is_image), 2);
        for seq in &sequences {
            debug!(
                "Detected sequence: {} ({} frames, {} missing)",
                seq.hash_pattern(),
                seq.frame_count,
                seq.missing_frames.len()
            );
        }
        sequences
    }

    /// Check a file list as one sequence.
    pub fn validate_sequence<P: AsRef<Path>>(files: &[P]) -> ValidationResult {
        let frames: BTreeSet<u32> = files
            .iter()
            .filter_map(|f| f.as_ref().file_name()?.to_str().and_then(path_parser::frame_number))
            .collect();

        let mut result = ValidationResult::default();
        if frames.is_empty() {
            result.errors.push("No valid frame numbers found".to_string());
            return result;
        }

        result.frame_count = frames.len();
        result.frame_range = frames.first().copied().zip(frames.last().copied());
        result.missing_frames = gaps(&frames);
        if !result.missing_frames.is_empty() {
            result.errors.push(format!("Missing {} frames", result.missing_frames.len()));
        }
        result.is_valid = result.errors.is_empty();
        result
    }

    pub fn frame_range<P: AsRef<Path>>(files: &[P]) -> Option<(u32, u32)> {
        path_parser::frame_range(files)
    }

    /// Missing frames between the first and last frame. Fewer than two
    /// frames cannot have gaps.
    pub fn detect_missing_frames<P: AsRef<Path>>(files: &[P]) -> Vec<u32> {
        let frames: BTreeSet<u32> = files
            .iter()
            .filter_map(|f| f.as_ref().file_name()?.to_str().and_then(path_parser::frame_number))
            .collect();
        if frames.len() < 2 {
            return Vec::new();
        }
        gaps(&frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::touch;
    use tempfile::TempDir;

    fn frames(dir: &Path, name: &str, range: impl Iterator<Item = u32>) -> Vec<PathBuf> {
        range
            .map(|f| {
                let p = dir.join(format!("{}.{:04}.exr", name, f));
                touch(&p);
                p
            })
            .collect()
    }

    #[test]
    fn test_split_sequence_path() {
        assert_eq!(
            split_sequence_path(Path::new("/path/seq.0001.exr")),
            Some(("seq".to_string(), 1, "exr".to_string(), 4))
        );
        assert_eq!(
            split_sequence_path(Path::new("shot_v001.10010.dpx")),
            Some(("shot_v001".to_string(), 10010, "dpx".to_string(), 5))
        );
        assert_eq!(split_sequence_path(Path::new("seq_0001.exr")), None);
        assert_eq!(split_sequence_path(Path::new("seq.001.exr")), None);
    }

    #[test]
    fn test_missing_frame_detected() {
        let tmp = TempDir::new().unwrap();
        frames(tmp.path(), "shot", (1001..=1010).filter(|f| *f != 1005));

        let seqs = SequenceHandler::detect_sequences(tmp.path());
        assert_eq!(seqs.len(), 1);
        let seq = &seqs[0];
        assert_eq!((seq.start_frame, seq.end_frame), (1001, 1010));
        assert_eq!(seq.frame_count, 9);
        assert_eq!(seq.missing_frames, vec![1005]);
        assert!(!seq.is_complete());
    }

    #[test]
    fn test_complete_sequence() {
        let tmp = TempDir::new().unwrap();
        frames(tmp.path(), "shot", 1001..=1010);

        let seq = &SequenceHandler::detect_sequences(tmp.path())[0];
        assert!(seq.is_complete());
        assert_eq!(seq.frame_count as u32, seq.end_frame - seq.start_frame + 1);
        assert_eq!(seq.padding, 4);
        assert_eq!(seq.files.len(), 10);
    }

    #[test]
    fn test_groups_and_single_frames() {
        let tmp = TempDir::new().unwrap();
        frames(tmp.path(), "beauty", 1..=3);
        frames(tmp.path(), "depth", 1..=2);
        frames(tmp.path(), "still", 1..=1);
        touch(&tmp.path().join("notes.txt"));

        let seqs = SequenceHandler::detect_sequences(tmp.path());
        let names: Vec<&str> = seqs.iter().map(|s| s.base_name.as_str()).collect();
        assert_eq!(names, vec!["beauty", "depth"]);

        let with_singles = SequenceHandler::group_files(media::list_files(tmp.path(), media::is_image), 1);
        assert_eq!(with_singles.len(), 3);
    }

    #[test]
    fn test_patterns() {
        let seq = SequenceInfo {
            directory: PathBuf::from("/renders/v001"),
            base_name: "beauty".into(),
            extension: "exr".into(),
            start_frame: 1001,
            end_frame: 1002,
            frame_count: 2,
            missing_frames: vec![],
            padding: 4,
            files: vec![],
        };
        assert_eq!(seq.hash_pattern(), "/renders/v001/beauty.####.exr");
        assert_eq!(seq.printf_pattern(), "/renders/v001/beauty.%04d.exr");
        assert_eq!(seq.file_pattern(), "beauty.####.exr");
    }

    #[test]
    fn test_validate_sequence() {
        let files = ["a.1001.exr", "a.1002.exr", "a.1004.exr"];
        let result = SequenceHandler::validate_sequence(&files);
        assert!(!result.is_valid);
        assert_eq!(result.frame_count, 3);
        assert_eq!(result.frame_range, Some((1001, 1004)));
        assert_eq!(result.missing_frames, vec![1003]);
        assert_eq!(result.errors, vec!["Missing 1 frames"]);

        let result = SequenceHandler::validate_sequence(&["a.1001.exr", "a.1002.exr"]);
        assert!(result.is_valid);

        let result = SequenceHandler::validate_sequence(&["movie.mov"]);
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec!["No valid frame numbers found"]);
    }

    #[test]
    fn test_missing_frames_needs_two() {
        assert!(SequenceHandler::detect_missing_frames(&["a.1001.exr"]).is_empty());
        assert_eq!(SequenceHandler::detect_missing_frames(&["a.1001.exr", "a.1003.exr"]), vec![1002]);
        assert_eq!(SequenceHandler::frame_range(&["a.1003.exr", "a.1001.exr"]), Some((1001, 1003)));
    }
}
