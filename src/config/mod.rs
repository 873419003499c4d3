//! Application paths, per-project configuration and user preferences.

pub mod paths;
pub mod prefs;
pub mod project;

pub use paths::{PathConfig, cache_dir, config_file, data_file, ensure_dirs, projects_dir};
pub use prefs::Preferences;
pub use project::{
    CacheSettings, MediaPaths, NamingPatterns, ProjectConfig, ProjectSettings, list_projects, validate_config,
};
