//! Per-project configuration (`<config>/projects/<name>.json`).
//!
//! Validation runs on the raw JSON before deserialization so that every
//! problem is reported at once instead of the first serde error.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::paths::{self, PathConfig};
use crate::core::cache_man::CacheManager;
use crate::core::path_parser::PathParser;
use crate::entities::MediaType;
use crate::error::ConfigError;

pub const SCHEMA_VERSION: &str = "1.0";
pub const DEFAULT_PROJECT: &str = "default";

/// Regexes for the shot hierarchy tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingPatterns {
    pub episode_regex: String,  // Ep01
    pub sequence_regex: String, // sq0010
    pub shot_regex: String,     // SH0010
    pub version_regex: String,  // v001
}

impl Default for NamingPatterns {
    fn default() -> Self {
        Self {
            episode_regex: r"Ep\d{2}".to_string(),
            sequence_regex: r"sq\d{4}".to_string(),
            shot_regex: r"SH\d{4}".to_string(),
            version_regex: r"v\d{3,4}".to_string(),
        }
    }
}

impl NamingPatterns {
    fn entries(&self) -> [(&'static str, &str); 4] {
        [
            ("episode_regex", &self.episode_regex),
            ("sequence_regex", &self.sequence_regex),
            ("shot_regex", &self.shot_regex),
            ("version_regex", &self.version_regex),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaPaths {
    pub import_dir: String,
    pub export_dir: String,
    pub audio_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub fps: f64,
    pub resolution: [u32; 2],
    pub color_space: String,
    pub default_department: String,
    pub default_media_type: MediaType,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            fps: 24.0,
            resolution: [1920, 1080],
            color_space: "ACES".to_string(),
            default_department: "comp".to_string(),
            default_media_type: MediaType::Mov,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub memory_ttl_seconds: u64,
    pub disk_ttl_seconds: u64,
    /// Empty: `<data dir>/cache`. A leading `~` expands to the home dir.
    pub disk_path: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_ttl_seconds: 60,
            disk_ttl_seconds: 3600,
            disk_path: String::new(),
        }
    }
}

impl CacheSettings {
    /// Directory for L2 cache files.
    pub fn resolve_disk_path(&self, path_config: &PathConfig) -> PathBuf {
        let raw = self.disk_path.trim();
        if raw.is_empty() {
            return paths::cache_dir(path_config);
        }
        if let Some(rest) = raw.strip_prefix('~') {
            if let Some(home) = dirs_next::home_dir() {
                return home.join(rest.trim_start_matches(['/', '\\']));
            }
        }
        PathBuf::from(raw)
    }
}

/// One project's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub project_name: String,
    pub project_root: PathBuf,
    pub media_paths: MediaPaths,
    #[serde(default)]
    pub structure: BTreeMap<String, String>,
    #[serde(default)]
    pub settings: ProjectSettings,
    #[serde(default)]
    pub naming: NamingPatterns,
    #[serde(default)]
    pub cache: CacheSettings,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl ProjectConfig {
    /// Minimal valid config rooted at `root`.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            schema_version: default_schema_version(),
            project_name: name.into(),
            media_paths: MediaPaths {
                import_dir: root.to_string_lossy().into_owned(),
                ..Default::default()
            },
            project_root: root,
            structure: BTreeMap::new(),
            settings: ProjectSettings::default(),
            naming: NamingPatterns::default(),
            cache: CacheSettings::default(),
        }
    }

    /// Read, validate and deserialize a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: Value = serde_json::from_str(&text)?;

        let problems = validate_config(&raw);
        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems));
        }

        let config: ProjectConfig = serde_json::from_value(raw)?;
        info!("Loaded project config '{}' from {}", config.project_name, path.display());
        Ok(config)
    }

    /// Load `<dir>/<name>.json`, falling back to `<dir>/default.json`.
    pub fn load_named(dir: &Path, name: &str) -> Result<Self, ConfigError> {
        let path = dir.join(format!("{}.json", name));
        if path.exists() {
            return Self::load(path);
        }
        warn!("Project config '{}' not found, using {}", name, DEFAULT_PROJECT);
        Self::load(dir.join(format!("{}.json", DEFAULT_PROJECT)))
    }

    /// Write pretty JSON, creating parent dirs.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(io_err)?;
        debug!("Saved project config to {}", path.display());
        Ok(())
    }

    /// Compile the naming patterns.
    pub fn path_parser(&self) -> Result<PathParser, ConfigError> {
        PathParser::new(&self.naming)
    }

    /// Build the cache configured for this project.
    pub fn cache_manager(&self, path_config: &PathConfig) -> Arc<CacheManager> {
        let dir = self.cache.resolve_disk_path(path_config);
        Arc::new(CacheManager::from_settings(&self.cache, dir))
    }

    /// Audio folder, if configured.
    pub fn audio_dir(&self) -> Option<PathBuf> {
        let dir = self.media_paths.audio_dir.trim();
        (!dir.is_empty()).then(|| PathBuf::from(dir))
    }
}

/// Collect every problem in a raw config document. Empty means valid.
pub fn validate_config(raw: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    let non_empty_str = |v: Option<&Value>| v.and_then(Value::as_str).is_some_and(|s| !s.trim().is_empty());

    if !raw.is_object() {
        errors.push("Config root must be a JSON object".to_string());
        return errors;
    }

    if !non_empty_str(raw.get("project_name")) {
        errors.push("Missing required field: project_name".to_string());
    }
    if !non_empty_str(raw.get("project_root")) {
        errors.push("Missing required field: project_root".to_string());
    }
    match raw.get("media_paths") {
        Some(media) if media.is_object() => {
            if !non_empty_str(media.get("import_dir")) {
                errors.push("Missing required field: media_paths.import_dir".to_string());
            }
        }
        _ => errors.push("Missing required field: media_paths".to_string()),
    }

    if let Some(settings) = raw.get("settings") {
        if let Some(fps) = settings.get("fps") {
            match fps.as_f64() {
                Some(v) if v > 0.0 => {}
                _ => errors.push(format!("Invalid fps value: {}", fps)),
            }
        }
        if let Some(res) = settings.get("resolution") {
            let ok = res
                .as_array()
                .is_some_and(|a| a.len() == 2 && a.iter().all(|v| v.as_u64().is_some()));
            if !ok {
                errors.push("Resolution must be [width, height]".to_string());
            }
        }
    }

    if let Some(naming) = raw.get("naming") {
        for (key, _) in NamingPatterns::default().entries() {
            let Some(value) = naming.get(key) else { continue };
            match value.as_str() {
                Some(pattern) => {
                    if let Err(e) = regex::Regex::new(pattern) {
                        errors.push(format!("Invalid regex for {}: {}", key, e));
                    }
                }
                None => errors.push(format!("Invalid regex for {}: not a string", key)),
            }
        }
    }

    errors
}

/// Stems of `*.json` files in a projects directory, sorted.
pub fn list_projects(dir: &Path) -> Vec<String> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = read_dir
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "json"))
        .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn minimal() -> Value {
        json!({
            "project_name": "demo",
            "project_root": "/proj",
            "media_paths": { "import_dir": "/proj" }
        })
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        assert!(validate_config(&minimal()).is_empty());
        let config: ProjectConfig = serde_json::from_value(minimal()).unwrap();
        assert_eq!(config.schema_version, "1.0");
        assert_eq!(config.settings.fps, 24.0);
        assert_eq!(config.settings.resolution, [1920, 1080]);
        assert_eq!(config.settings.default_media_type, MediaType::Mov);
        assert_eq!(config.naming, NamingPatterns::default());
        assert!(config.cache.enabled);
        assert_eq!(config.cache.memory_ttl_seconds, 60);
        assert_eq!(config.cache.disk_ttl_seconds, 3600);
    }

    #[test]
    fn test_validation_collects_all_problems() {
        let raw = json!({
            "project_name": "",
            "media_paths": {},
            "settings": { "fps": 0, "resolution": [1920] },
            "naming": { "shot_regex": "SH(\\d{4}" }
        });
        let errors = validate_config(&raw);
        assert_eq!(errors.len(), 6, "{:?}", errors);
        assert!(errors.iter().any(|e| e.contains("project_name")));
        assert!(errors.iter().any(|e| e.contains("project_root")));
        assert!(errors.iter().any(|e| e.contains("import_dir")));
        assert!(errors.iter().any(|e| e.contains("fps")));
        assert!(errors.iter().any(|e| e.contains("Resolution")));
        assert!(errors.iter().any(|e| e.contains("shot_regex")));
    }

    #[test]
    fn test_negative_fps_rejected() {
        let mut raw = minimal();
        raw["settings"] = json!({ "fps": -25.0 });
        assert_eq!(validate_config(&raw).len(), 1);
    }

    #[test]
    fn test_load_invalid_reports_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"project_name": "x"}"#).unwrap();
        match ProjectConfig::load(&path) {
            Err(ConfigError::Invalid(list)) => assert_eq!(list.len(), 2),
            other => panic!("expected Invalid, got {:?}", other),
        }
        assert!(matches!(
            ProjectConfig::load(dir.path().join("missing.json")),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_save_load_and_listing() {
        let dir = TempDir::new().unwrap();
        let mut config = ProjectConfig::new("show", "/proj");
        config.settings.fps = 25.0;
        config.structure.insert("episode".into(), "Ep##".into());
        config.save(dir.path().join("show.json")).unwrap();
        ProjectConfig::new("fallback", "/other")
            .save(dir.path().join("default.json"))
            .unwrap();

        let loaded = ProjectConfig::load_named(dir.path(), "show").unwrap();
        assert_eq!(loaded, config);

        let fallback = ProjectConfig::load_named(dir.path(), "nope").unwrap();
        assert_eq!(fallback.project_name, "fallback");

        assert_eq!(list_projects(dir.path()), vec!["default", "show"]);
        assert!(list_projects(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn test_cache_path_resolution() {
        let path_config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        let mut cache = CacheSettings::default();
        assert_eq!(cache.resolve_disk_path(&path_config), PathBuf::from("/custom/cache"));

        cache.disk_path = "/var/tmp/reel".into();
        assert_eq!(cache.resolve_disk_path(&path_config), PathBuf::from("/var/tmp/reel"));
    }

    #[test]
    fn test_path_parser_from_config() {
        let mut config = ProjectConfig::new("show", "/proj");
        config.naming.shot_regex = r"sh\d{3}".into();
        let parser = config.path_parser().unwrap();
        assert_eq!(parser.shot("/proj/ep01/sq0010/sh010/comp").as_deref(), Some("sh010"));
    }
}
