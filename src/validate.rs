//! Project tree sanity checks.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::path_parser::PathParser;
use crate::utils::media;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationMessage {
    pub severity: Severity,
    pub message: String,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub messages: Vec<ValidationMessage>,
}

impl ValidationReport {
    fn add(&mut self, severity: Severity, message: impl Into<String>, path: Option<&Path>) {
        self.messages.push(ValidationMessage {
            severity,
            message: message.into(),
            path: path.map(Path::to_path_buf),
        });
    }

    pub fn add_error(&mut self, message: impl Into<String>, path: Option<&Path>) {
        self.add(Severity::Error, message, path);
    }

    pub fn add_warning(&mut self, message: impl Into<String>, path: Option<&Path>) {
        self.add(Severity::Warning, message, path);
    }

    pub fn add_info(&mut self, message: impl Into<String>, path: Option<&Path>) {
        self.add(Severity::Info, message, path);
    }

    fn of(&self, severity: Severity) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|m| m.severity == severity)
            .map(|m| m.message.as_str())
            .collect()
    }

    pub fn errors(&self) -> Vec<&str> {
        self.of(Severity::Error)
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.of(Severity::Warning)
    }

    pub fn info(&self) -> Vec<&str> {
        self.of(Severity::Info)
    }

    /// No errors; warnings allowed.
    pub fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }
}

/// Directory names under `dir` whose name starts with a `matcher` token.
fn matching_dirs(dir: &Path, matcher: impl Fn(&str) -> Option<String>) -> Vec<String> {
    media::list_dirs(dir)
        .into_iter()
        .filter(|name| {
            matcher(name).is_some_and(|token| {
                name.get(..token.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(&token))
            })
        })
        .collect()
}

/// Check that `root` holds episode, sequence and shot folders.
pub fn validate_project_structure(root: &Path, parser: &PathParser) -> ValidationReport {
    let mut report = ValidationReport::default();
    if !root.is_dir() {
        report.add_error(format!("Project root does not exist: {}", root.display()), Some(root));
        return report;
    }

    let episodes = matching_dirs(root, |n| parser.episode(n));
    if episodes.is_empty() {
        report.add_warning("No episode folders found (expected Ep## format)", Some(root));
        return report;
    }
    report.add_info(format!("Found {} episode(s)", episodes.len()), None);

    let mut shot_count = 0;
    for episode in &episodes {
        let ep_dir = root.join(episode);
        let sequences = matching_dirs(&ep_dir, |n| parser.sequence(n));
        if sequences.is_empty() {
            report.add_warning(format!("No sequences in {}", episode), Some(&ep_dir));
            continue;
        }
        for sequence in &sequences {
            let seq_dir = ep_dir.join(sequence);
            let shots = matching_dirs(&seq_dir, |n| parser.shot(n));
            if shots.is_empty() {
                report.add_warning(format!("No shots in {}/{}", episode, sequence), Some(&seq_dir));
            }
            for shot in &shots {
                let shot_dir = seq_dir.join(shot);
                if media::list_dirs(&shot_dir).is_empty() {
                    report.add_warning(
                        format!("No departments in {}/{}/{}", episode, sequence, shot),
                        Some(&shot_dir),
                    );
                }
            }
            shot_count += shots.len();
        }
    }
    report.add_info(format!("Found {} shot(s)", shot_count), None);
    report
}

/// Audio and video stems name the same episode.
pub fn audio_matches_video(parser: &PathParser, video: &Path, audio: &Path) -> bool {
    let stem = |p: &Path| p.file_stem().map(|s| s.to_string_lossy().into_owned());
    match (
        stem(video).and_then(|s| parser.episode(&s)),
        stem(audio).and_then(|s| parser.episode(&s)),
    ) {
        (Some(v), Some(a)) => v.eq_ignore_ascii_case(&a),
        _ => false,
    }
}
