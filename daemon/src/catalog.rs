use common::PortraitError;
use glob::{Pattern, glob};
use rand::Rng;
use std::path::{Path, PathBuf};

/// Videos available for playback, fixed for the lifetime of the process
#[derive(Debug, Clone)]
pub struct VideoCatalog {
    /// Matching files, sorted lexicographically
    videos: Vec<PathBuf>,
}

impl VideoCatalog {
    /// Collect the files in `directory` matching `pattern`
    pub fn build(directory: &Path, pattern: &str) -> Result<Self, PortraitError> {
        let expanded_dir = shellexpand::tilde(&directory.to_string_lossy()).to_string();
        // The directory is literal, only the pattern may contain wildcards
        let full_pattern = Path::new(&Pattern::escape(&expanded_dir)).join(pattern);
        let full_pattern = full_pattern.to_string_lossy();

        let entries = glob(&full_pattern).map_err(|e| {
            PortraitError::InvalidConfig(format!("invalid video pattern '{}': {}", pattern, e))
        })?;

        let mut videos = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => videos.push(path),
                Ok(_) => {}
                Err(e) => log::warn!("Skipping unreadable entry: {}", e),
            }
        }

        videos.sort();
        videos.dedup();

        if videos.is_empty() {
            return Err(PortraitError::EmptyCatalog {
                directory: directory.to_path_buf(),
                pattern: pattern.to_string(),
            });
        }

        Ok(Self { videos })
    }

    /// Draw a video uniformly at random
    ///
    /// With `exclude` set and more than one video available, the excluded path
    /// is never returned.
    pub fn select_random<R: Rng + ?Sized>(&self, rng: &mut R, exclude: Option<&Path>) -> &Path {
        let candidates: Vec<&PathBuf> = match exclude {
            Some(previous) if self.videos.len() > 1 => {
                self.videos.iter().filter(|v| v.as_path() != previous).collect()
            }
            _ => self.videos.iter().collect(),
        };

        candidates[rng.random_range(0..candidates.len())].as_path()
    }

    /// Log the numbered catalog listing
    pub fn log_listing(&self) {
        log::info!("Found {} videos.", self.videos.len());
        for (i, video) in self.videos.iter().enumerate() {
            let name = video
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_else(|| video.to_string_lossy());
            log::info!("  {}.\t{}", i + 1, name);
        }
    }
}

#[cfg(test)]
impl VideoCatalog {
    fn from_entries(videos: Vec<PathBuf>) -> Self {
        Self { videos }
    }

    fn entries(&self) -> &[PathBuf] {
        &self.videos
    }

    fn len(&self) -> usize {
        self.videos.len()
    }

    /// Always false for a catalog returned by [`VideoCatalog::build`]
    fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::fs;

    #[test]
    fn test_build_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.mp4", "a.mp4", "b.mp4", "notes.txt", "clip.mkv"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("folder.mp4")).unwrap();

        let catalog = VideoCatalog::build(dir.path(), "*.mp4").unwrap();
        let names: Vec<_> = catalog
            .entries()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.mp4", "b.mp4", "c.mp4"]);
        assert_eq!(catalog.len(), 3);
        assert!(!catalog.is_empty());
    }

    #[test]
    fn test_build_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.txt"), b"").unwrap();

        let err = VideoCatalog::build(dir.path(), "*.mp4").unwrap_err();
        match err {
            PortraitError::EmptyCatalog { directory, pattern } => {
                assert_eq!(directory, dir.path());
                assert_eq!(pattern, "*.mp4");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_build_invalid_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let err = VideoCatalog::build(dir.path(), "[*.mp4").unwrap_err();
        assert!(matches!(err, PortraitError::InvalidConfig(_)));
    }

    #[test]
    fn test_select_random_returns_member() {
        let catalog = VideoCatalog::from_entries(vec![
            PathBuf::from("a.mp4"),
            PathBuf::from("b.mp4"),
            PathBuf::from("c.mp4"),
        ]);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let picked = catalog.select_random(&mut rng, None);
            assert!(catalog.entries().iter().any(|v| v == picked));
        }
    }

    #[test]
    fn test_select_random_allows_repeats_by_default() {
        let catalog =
            VideoCatalog::from_entries(vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")]);
        let mut rng = StdRng::seed_from_u64(42);

        let picks: Vec<PathBuf> = (0..100)
            .map(|_| catalog.select_random(&mut rng, None).to_path_buf())
            .collect();
        assert!(picks.windows(2).any(|w| w[0] == w[1]));
    }

    #[test]
    fn test_select_random_with_exclusion() {
        let catalog = VideoCatalog::from_entries(vec![
            PathBuf::from("a.mp4"),
            PathBuf::from("b.mp4"),
            PathBuf::from("c.mp4"),
        ]);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..200 {
            let picked = catalog.select_random(&mut rng, Some(Path::new("b.mp4")));
            assert_ne!(picked, Path::new("b.mp4"));
        }
    }

    #[test]
    fn test_exclusion_ignored_for_single_video() {
        let catalog = VideoCatalog::from_entries(vec![PathBuf::from("only.mp4")]);
        let mut rng = StdRng::seed_from_u64(1);

        let picked = catalog.select_random(&mut rng, Some(Path::new("only.mp4")));
        assert_eq!(picked, Path::new("only.mp4"));
    }
}
