//! User preferences persisted between runs (`shotreel.json`).

use log::{debug, warn};
use std::fs;
use std::path::Path;

use crate::entities::MediaType;
use crate::error::ConfigError;

/// Maximum entries kept in the recent-projects list
pub const MAX_RECENT: usize = 10;

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Preferences {
    pub last_project: Option<String>,
    pub last_episode: Option<String>,
    pub last_sequences: Vec<String>,
    pub cache_enabled: bool,
    pub recent_projects: Vec<String>, // most recent first
    pub default_department: String,
    pub default_media_type: MediaType,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            last_project: None,
            last_episode: None,
            last_sequences: Vec::new(),
            cache_enabled: true,
            recent_projects: Vec::new(),
            default_department: "comp".to_string(),
            default_media_type: MediaType::Mov,
        }
    }
}

impl Preferences {
    /// Load preferences; a missing or unreadable file yields defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let Ok(text) = fs::read_to_string(path) else {
            debug!("No preferences at {}, using defaults", path.display());
            return Self::default();
        };
        match serde_json::from_str(&text) {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!("Corrupt preferences {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?).map_err(io_err)
    }

    /// Move `name` to the front of the recent list, capped at [`MAX_RECENT`].
    pub fn add_recent_project(&mut self, name: &str) {
        self.recent_projects.retain(|p| p != name);
        self.recent_projects.insert(0, name.to_string());
        self.recent_projects.truncate(MAX_RECENT);
    }

    /// Record the active project and bump it in the recent list.
    pub fn set_last_project(&mut self, name: &str) {
        self.last_project = Some(name.to_string());
        self.add_recent_project(name);
    }

    pub fn set_last_selection(&mut self, episode: &str, sequences: &[String]) {
        self.last_episode = Some(episode.to_string());
        self.last_sequences = sequences.to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_recent_projects_dedup_and_cap() {
        let mut prefs = Preferences::default();
        for i in 0..12 {
            prefs.add_recent_project(&format!("p{}", i));
        }
        assert_eq!(prefs.recent_projects.len(), MAX_RECENT);
        assert_eq!(prefs.recent_projects[0], "p11");

        prefs.set_last_project("p5");
        assert_eq!(prefs.recent_projects[0], "p5");
        assert_eq!(prefs.recent_projects.iter().filter(|p| *p == "p5").count(), 1);
        assert_eq!(prefs.last_project.as_deref(), Some("p5"));
    }

    #[test]
    fn test_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shotreel.json");
        let mut prefs = Preferences::default();
        prefs.set_last_selection("Ep01", &["sq0010".to_string()]);
        prefs.cache_enabled = false;
        prefs.save(&path).unwrap();

        assert_eq!(Preferences::load(&path), prefs);
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shotreel.json");
        fs::write(&path, "[[[").unwrap();
        assert_eq!(Preferences::load(&path), Preferences::default());
        assert_eq!(Preferences::load(dir.path().join("none.json")), Preferences::default());
    }
}
