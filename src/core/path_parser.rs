//! Regex extraction of episode / sequence / shot / department / version /
//! frame tokens from paths and filenames.
//!
//! Every extractor returns the **first** match and never fails: a missing
//! token is `None`. Episode, sequence, shot and version patterns come from
//! the project's naming config; the frame pattern is fixed.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use std::path::Path;

use crate::config::NamingPatterns;
use crate::entities::ShotRef;
use crate::error::ConfigError;

lazy_static! {
    static ref FRAME_RE: Regex = Regex::new(r"\.(\d{4,5})\.\w+$").unwrap();
    static ref NUMBER_RE: Regex = Regex::new(r"\d+").unwrap();
}

/// Department names recognised as path segments, in test order.
pub const KNOWN_DEPARTMENTS: &[&str] = &[
    "comp", "light", "lighting", "anim", "animation", "fx", "efx", "roto", "paint",
];

/// All shot-path components found in one path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShotPath {
    pub episode: Option<String>,
    pub sequence: Option<String>,
    pub shot: Option<String>,
    pub department: Option<String>,
}

/// Compiled naming patterns.
#[derive(Debug, Clone)]
pub struct PathParser {
    episode: Regex,
    sequence: Regex,
    shot: Regex,
    shot_suffix: Regex,
    version: Regex,
}

impl Default for PathParser {
    fn default() -> Self {
        // Default patterns always compile
        Self::new(&NamingPatterns::default()).expect("default naming patterns")
    }
}

impl PathParser {
    /// Compile naming patterns (case-insensitive).
    pub fn new(naming: &NamingPatterns) -> Result<Self, ConfigError> {
        Ok(Self {
            episode: compile("episode_regex", &format!("({})", naming.episode_regex))?,
            sequence: compile("sequence_regex", &format!("({})", naming.sequence_regex))?,
            shot: compile("shot_regex", &format!("({})", naming.shot_regex))?,
            shot_suffix: compile("shot_regex", &format!("({})([A-Za-z])?", naming.shot_regex))?,
            version: compile("version_regex", &format!("[_/]({})", naming.version_regex))?,
        })
    }

    pub fn episode(&self, path: &str) -> Option<String> {
        first_group(&self.episode, &normalize_path(path))
    }

    pub fn sequence(&self, path: &str) -> Option<String> {
        first_group(&self.sequence, &normalize_path(path))
    }

    pub fn shot(&self, path: &str) -> Option<String> {
        first_group(&self.shot, &normalize_path(path))
    }

    /// Department from a known-name path segment (`/comp/`), case-insensitive.
    pub fn department(&self, path: &str) -> Option<String> {
        department_segment(path).map(|(_, dept)| dept.to_string())
    }

    /// Episode, sequence, shot and department in one call.
    pub fn parse_shot_path(&self, path: &str) -> ShotPath {
        ShotPath {
            episode: self.episode(path),
            sequence: self.sequence(path),
            shot: self.shot(path),
            department: self.department(path),
        }
    }

    /// Version token embedded in a filename or path (`..._v009.mov` -> `v009`).
    ///
    /// The token must be preceded by `_` or `/`. The prefix is normalised
    /// to lowercase.
    pub fn version_from_filename(&self, name: &str) -> Option<String> {
        first_group(&self.version, &normalize_path(name)).map(|token| {
            match token.strip_prefix(|c: char| c == 'v' || c == 'V') {
                Some(digits) => format!("v{digits}"),
                None => token,
            }
        })
    }

    /// True for sub-shots such as `SH0010A`.
    pub fn is_sub_shot(&self, shot_name: &str) -> bool {
        self.shot_suffix
            .captures(shot_name)
            .is_some_and(|caps| caps.get(2).is_some())
    }

    /// Shot name without its letter suffix (`SH0010A` -> `SH0010`).
    pub fn base_shot(&self, shot_name: &str) -> String {
        self.shot_suffix
            .captures(shot_name)
            .and_then(|caps| caps.get(1))
            .map_or_else(|| shot_name.to_string(), |m| m.as_str().to_string())
    }

    /// Drop sub-shots, keeping the first occurrence of each base shot.
    pub fn filter_sub_shots<S: AsRef<str>>(&self, shots: &[S]) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        shots
            .iter()
            .map(AsRef::as_ref)
            .filter(|shot| !self.is_sub_shot(shot))
            .filter(|shot| seen.insert(self.base_shot(shot)))
            .map(str::to_string)
            .collect()
    }

    /// Drop sub-shots, then sort by the embedded shot number.
    pub fn filter_and_sort_shots<S: AsRef<str>>(&self, shots: &[S]) -> Vec<String> {
        let mut out = self.filter_sub_shots(shots);
        out.sort_by_key(|s| name_number(s));
        out
    }

    /// True if the filename carries episode, sequence and shot tokens.
    pub fn validate_naming(&self, filename: &str) -> bool {
        self.episode(filename).is_some()
            && self.sequence(filename).is_some()
            && self.shot(filename).is_some()
    }

    /// Frame number of a filename (fixed pattern, see [`frame_number`]).
    pub fn frame_number(&self, filename: &str) -> Option<u32> {
        frame_number(filename)
    }
}

/// Backslashes to forward slashes.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Frame number from `name.1001.exr`. Requires 4-5 digits directly before
/// the extension; anything else is `None`.
pub fn frame_number(filename: &str) -> Option<u32> {
    FRAME_RE
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Min/max frame over all files that carry a frame number.
pub fn frame_range<P: AsRef<Path>>(files: &[P]) -> Option<(u32, u32)> {
    let frames: Vec<u32> = files
        .iter()
        .filter_map(|f| f.as_ref().file_name()?.to_str().and_then(frame_number))
        .collect();
    let min = frames.iter().min()?;
    let max = frames.iter().max()?;
    Some((*min, *max))
}

/// First integer in a name (`SH0015` -> 15), 0 if none.
pub fn name_number(name: &str) -> u64 {
    NUMBER_RE
        .find(name)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Sort sequence names by their embedded number.
pub fn sort_sequences<S: AsRef<str>>(sequences: &[S]) -> Vec<String> {
    let mut out: Vec<String> = sequences.iter().map(|s| s.as_ref().to_string()).collect();
    out.sort_by_key(|s| name_number(s));
    out
}

/// Byte offset and name of the first known department segment in `path`.
///
/// The offset points at the first character of the segment in the
/// normalised path (same byte layout as the input).
pub fn department_segment(path: &str) -> Option<(usize, &'static str)> {
    let lower = normalize_path(path).to_ascii_lowercase();
    KNOWN_DEPARTMENTS.iter().find_map(|dept| {
        let segment = format!("/{dept}/");
        if let Some(idx) = lower.find(&segment) {
            return Some((idx + 1, *dept));
        }
        let tail = format!("/{dept}");
        lower
            .ends_with(&tail)
            .then(|| (lower.len() - dept.len(), *dept))
    })
}

/// Episode / sequence / shot from the first `ep#` / `sq#` / `sh#` segments.
pub fn shot_components(path: &str) -> Option<ShotRef> {
    let normalized = normalize_path(path);
    let (mut ep, mut seq, mut shot) = (None, None, None);
    for part in normalized.split('/') {
        if ep.is_none() && has_numbered_prefix(part, "ep") {
            ep = Some(part.to_string());
        } else if seq.is_none() && has_numbered_prefix(part, "sq") {
            seq = Some(part.to_string());
        } else if shot.is_none() && has_numbered_prefix(part, "sh") {
            shot = Some(part.to_string());
        }
    }
    Some(ShotRef::new(ep?, seq?, shot?))
}

/// `prefix` (any case) immediately followed by a digit.
fn has_numbered_prefix(segment: &str, prefix: &str) -> bool {
    segment.len() > prefix.len()
        && segment.is_char_boundary(prefix.len())
        && segment[..prefix.len()].eq_ignore_ascii_case(prefix)
        && segment[prefix.len()..].starts_with(|c: char| c.is_ascii_digit())
}

fn compile(key: &'static str, pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigError::Pattern { key, source })
}

fn first_group(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
