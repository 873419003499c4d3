//! Scan snapshots: shot references, per-department media and full scan results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which media a timeline is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Movie files in `output/`
    #[default]
    Mov,
    /// Image sequences in `version/<v>/`
    Sequence,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Mov => "mov",
            MediaType::Sequence => "sequence",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mov" => Ok(MediaType::Mov),
            "sequence" | "seq" => Ok(MediaType::Sequence),
            other => Err(format!("unknown media type '{}' (expected mov or sequence)", other)),
        }
    }
}

/// Episode / sequence / shot triple. `full_name` is `Ep01_sq0010_SH0010`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShotRef {
    pub episode: String,
    pub sequence: String,
    pub shot: String,
}

impl ShotRef {
    pub fn new(episode: impl Into<String>, sequence: impl Into<String>, shot: impl Into<String>) -> Self {
        Self {
            episode: episode.into(),
            sequence: sequence.into(),
            shot: shot.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}_{}_{}", self.episode, self.sequence, self.shot)
    }

    /// Split `Ep01_sq0010_SH0010`. Extra trailing parts are ignored.
    pub fn from_full_name(name: &str) -> Option<Self> {
        let mut parts = name.split('_');
        let (ep, seq, shot) = (parts.next()?, parts.next()?, parts.next()?);
        if ep.is_empty() || seq.is_empty() || shot.is_empty() {
            return None;
        }
        Some(Self::new(ep, seq, shot))
    }
}

impl fmt::Display for ShotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.episode, self.sequence, self.shot)
    }
}

/// Media found for one resolved version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaFiles {
    pub mov_files: Vec<PathBuf>,
    pub sequence_files: Vec<PathBuf>,
    pub frame_range: Option<(u32, u32)>,
}

impl MediaFiles {
    pub fn is_empty(&self) -> bool {
        self.mov_files.is_empty() && self.sequence_files.is_empty()
    }
}

/// One department of a shot: its versions and the media of the latest one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepartmentInfo {
    pub name: String,
    pub versions: Vec<String>,           // numeric order
    pub current_version: Option<String>, // latest
    pub media: MediaFiles,               // for current_version
}

impl DepartmentInfo {
    pub fn has_mov(&self) -> bool {
        !self.media.mov_files.is_empty()
    }

    pub fn has_sequence(&self) -> bool {
        !self.media.sequence_files.is_empty()
    }
}

/// Everything scanned for one shot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShotInfo {
    pub episode: String,
    pub sequence: String,
    pub shot: String,
    pub departments: BTreeMap<String, DepartmentInfo>,
    pub frame_range: Option<(u32, u32)>,
}

impl ShotInfo {
    /// Placeholder for a shot whose scan failed.
    pub fn empty(episode: &str, sequence: &str, shot: &str) -> Self {
        Self {
            episode: episode.to_string(),
            sequence: sequence.to_string(),
            shot: shot.to_string(),
            ..Default::default()
        }
    }

    pub fn shot_ref(&self) -> ShotRef {
        ShotRef::new(&self.episode, &self.sequence, &self.shot)
    }

    pub fn full_name(&self) -> String {
        self.shot_ref().full_name()
    }

    pub fn department(&self, name: &str) -> Option<&DepartmentInfo> {
        self.departments.get(name)
    }
}

/// Shots of one sequence, keyed by shot name.
pub type SequenceShots = BTreeMap<String, ShotInfo>;

/// Result of a full project scan: episode → sequence → shot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    pub episodes: BTreeMap<String, BTreeMap<String, SequenceShots>>,
    pub scan_time: Duration,
}

impl ScanResult {
    pub fn total_shots(&self) -> usize {
        self.episodes
            .values()
            .flat_map(|seqs| seqs.values())
            .map(|shots| shots.len())
            .sum()
    }

    pub fn total_sequences(&self) -> usize {
        self.episodes.values().map(|seqs| seqs.len()).sum()
    }

    pub fn shots(&self) -> impl Iterator<Item = &ShotInfo> {
        self.episodes
            .values()
            .flat_map(|seqs| seqs.values())
            .flat_map(|shots| shots.values())
    }
}
