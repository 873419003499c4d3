//! Utility functions and constants
//!
//! **Used by**: scanner, sequence detection, lighting scan, audio sync

pub mod lighting;
pub mod sequences;

/// Media file type detection
pub mod media {
    use std::fs;
    use std::path::{Path, PathBuf};

    /// Movie extensions looked for in `output/`
    pub const VIDEO_EXTS: &[&str] = &["mov", "mp4", "avi", "mkv"];

    /// Image-sequence frame extensions
    pub const IMAGE_EXTS: &[&str] = &["exr", "dpx", "png", "jpg", "jpeg", "tif", "tiff"];

    /// Audio extensions matched by the audio synchronizer
    pub const AUDIO_EXTS: &[&str] = &["wav", "mp3", "aac", "aiff", "aif", "flac"];

    fn has_ext(path: &Path, exts: &[&str]) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|s| exts.contains(&s.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// Check if file is a QuickTime movie (the only format built from `output/`)
    pub fn is_mov(path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.eq_ignore_ascii_case("mov"))
    }

    /// Check if file is a video format
    pub fn is_video(path: &Path) -> bool {
        has_ext(path, VIDEO_EXTS)
    }

    /// Check if file is an image format
    pub fn is_image(path: &Path) -> bool {
        has_ext(path, IMAGE_EXTS)
    }

    pub fn is_audio(path: &Path) -> bool {
        has_ext(path, AUDIO_EXTS)
    }

    /// Immediate subdirectory names, sorted. Unreadable dirs list as empty.
    pub fn list_dirs(dir: &Path) -> Vec<String> {
        let Ok(read_dir) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = read_dir
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Immediate files accepted by `filter`, sorted by path.
    pub fn list_files(dir: &Path, filter: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
        let Ok(read_dir) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = read_dir
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.path())
            .filter(|p| filter(p))
            .collect();
        files.sort();
        files
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_extension_checks() {
            assert!(is_mov(Path::new("/a/b_v001.MOV")));
            assert!(!is_mov(Path::new("/a/b_v001.mp4")));
            assert!(is_video(Path::new("x.mp4")));
            assert!(is_image(Path::new("x.1001.EXR")));
            assert!(is_audio(Path::new("Ep01_SH0010.wav")));
            assert!(!is_audio(Path::new("noext")));
        }

        #[test]
        fn test_listing_sorted_and_missing_dir_empty() {
            let tmp = tempfile::TempDir::new().unwrap();
            fs::create_dir(tmp.path().join("b")).unwrap();
            fs::create_dir(tmp.path().join("a")).unwrap();
            fs::write(tmp.path().join("z.mov"), b"").unwrap();
            fs::write(tmp.path().join("y.txt"), b"").unwrap();

            assert_eq!(list_dirs(tmp.path()), vec!["a", "b"]);
            assert_eq!(list_files(tmp.path(), is_mov), vec![tmp.path().join("z.mov")]);
            assert!(list_dirs(&tmp.path().join("missing")).is_empty());
        }
    }
}
