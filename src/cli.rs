use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::entities::MediaType;
use crate::timeline::VersionPolicy;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Host:   in-memory session (JSON)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Review timeline builder for episodic shot trees
#[derive(Parser, Debug, Clone)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Project config name in the projects directory (default: last used, then "default")
    #[arg(short = 'p', long = "project", value_name = "NAME", global = true)]
    pub project: Option<String>,

    /// Explicit project config file (overrides --project)
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Project root (overrides the config; enough on its own without a config)
    #[arg(short = 'r', long = "root", value_name = "DIR", global = true)]
    pub root: Option<PathBuf>,

    /// Host session file holding bins, clips and timelines (default: <data dir>/session.json)
    #[arg(short = 's', long = "session", value_name = "FILE", global = true)]
    pub session: Option<PathBuf>,

    /// Bypass the scan cache for this run
    #[arg(long = "no-cache", global = true)]
    pub no_cache: bool,

    /// Scan worker threads
    #[arg(long = "workers", value_name = "N", global = true)]
    pub workers: Option<usize>,

    /// No progress bars
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    /// Enable debug logging to file (default: shotreel.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE", global = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan the project tree and print what was found
    Scan {
        /// Episodes to scan (default: all)
        episodes: Vec<String>,

        /// Print the full scan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build or update a review timeline
    Build(BuildArgs),

    /// Move every item of a timeline to another version
    Bump {
        /// Timeline name
        timeline: String,

        #[command(flatten)]
        target: BumpTarget,
    },

    /// Relink every item of a timeline to another department
    SwitchDept {
        /// Timeline name
        timeline: String,

        /// Target department (comp, lighting, anim, fx, ...)
        department: String,
    },

    /// Add an audio track matched from the audio directory
    SyncAudio {
        /// Timeline name
        timeline: String,

        /// Audio directory (default: media_paths.audio_dir of the project)
        #[arg(long = "audio-dir", value_name = "DIR")]
        audio_dir: Option<PathBuf>,

        /// Name of the new audio track
        #[arg(long = "track", default_value = "Audio Sync")]
        track_name: String,
    },

    /// Check the project tree layout
    Validate,

    /// Drop every cached directory listing (memory and disk)
    ClearCache,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct BuildArgs {
    /// Episode (e.g. Ep01)
    pub episode: String,

    /// Sequences (default: every sequence of the episode)
    pub sequences: Vec<String>,

    /// Department (default: project setting)
    #[arg(short = 'd', long = "department", value_name = "DEPT")]
    pub department: Option<String>,

    /// "latest" or a version token such as v003
    #[arg(long = "version-policy", value_name = "VERSION", default_value = "latest")]
    pub version: VersionPolicy,

    /// mov or sequence (default: project setting)
    #[arg(short = 'm', long = "media-type", value_name = "TYPE")]
    pub media_type: Option<MediaType>,

    /// Frame rate (default: project setting)
    #[arg(long = "fps")]
    pub fps: Option<f64>,

    /// Skip the audio track
    #[arg(long = "no-audio")]
    pub no_audio: bool,

    /// Colour space for imported clips (default: project setting)
    #[arg(long = "color-space", value_name = "NAME")]
    pub color_space: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct BumpTarget {
    /// Next version
    #[arg(long)]
    pub increment: bool,

    /// Previous version
    #[arg(long)]
    pub decrement: bool,

    /// This version (e.g. v009)
    #[arg(long = "set", value_name = "VERSION")]
    pub set: Option<String>,
}
