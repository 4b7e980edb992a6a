//! Config discovery for linewatch.
//!
//! Walks parent directories to find `linewatch.yaml` and checks for global config
//! at `~/.config/linewatch/config.yaml`.

use std::path::{Path, PathBuf};

/// Project config filename to search for in parent directories.
pub const PROJECT_CONFIG_NAME: &str = "linewatch.yaml";

/// Global config filename within the linewatch config directory.
pub const GLOBAL_CONFIG_NAME: &str = "config.yaml";

/// Result of config discovery.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    /// Full path to the nearest project config file (`linewatch.yaml`).
    pub project_config: Option<PathBuf>,
    /// Full path to the global config file (`~/.config/linewatch/config.yaml`).
    pub global_config: Option<PathBuf>,
}

impl DiscoveryResult {
    /// Returns true if any config was found (project or global).
    pub fn has_config(&self) -> bool {
        self.project_config.is_some() || self.global_config.is_some()
    }
}

/// Discover config files starting from the current working directory.
pub fn discover() -> DiscoveryResult {
    discover_verbose().0
}

/// Same as [`discover`] but also returns every directory that was searched,
/// in walk order.
pub fn discover_verbose() -> (DiscoveryResult, Vec<PathBuf>) {
    let global_config = global_config_path().filter(|p| is_file(p));

    let Ok(cwd) = std::env::current_dir() else {
        return (
            DiscoveryResult {
                project_config: None,
                global_config,
            },
            Vec::new(),
        );
    };
    let cwd = cwd.canonicalize().unwrap_or(cwd);

    let (project_config, searched) = find_project_config(&cwd);
    (
        DiscoveryResult {
            project_config,
            global_config,
        },
        searched,
    )
}

/// Location of the global config, whether or not it exists.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("linewatch").join(GLOBAL_CONFIG_NAME))
}

/// Walk `start` and its ancestors looking for `linewatch.yaml`.
pub fn find_project_config(start: &Path) -> (Option<PathBuf>, Vec<PathBuf>) {
    let mut searched = Vec::new();
    for ancestor in start.ancestors() {
        searched.push(ancestor.to_path_buf());
        let candidate = ancestor.join(PROJECT_CONFIG_NAME);
        if is_file(&candidate) {
            return (Some(candidate), searched);
        }
    }
    (None, searched)
}

fn is_file(path: &Path) -> bool {
    path.try_exists().unwrap_or(false) && path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_finds_config_in_start_dir() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(PROJECT_CONFIG_NAME);
        fs::write(&config_path, "debounce_ms: 50").unwrap();

        let (found, searched) = find_project_config(temp.path());

        assert_eq!(found, Some(config_path));
        assert_eq!(searched, vec![temp.path().to_path_buf()]);
    }

    #[test]
    fn test_finds_config_in_parent_dir() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("level1").join("level2");
        fs::create_dir_all(&subdir).unwrap();
        let config_path = temp.path().join(PROJECT_CONFIG_NAME);
        fs::write(&config_path, "recursive: true").unwrap();

        let (found, searched) = find_project_config(&subdir);

        assert_eq!(found, Some(config_path));
        assert_eq!(searched.len(), 3);
        assert_eq!(searched[0], subdir);
    }

    #[test]
    fn test_nearest_config_wins() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("app");
        fs::create_dir(&subdir).unwrap();
        fs::write(temp.path().join(PROJECT_CONFIG_NAME), "").unwrap();
        fs::write(subdir.join(PROJECT_CONFIG_NAME), "").unwrap();

        let (found, _) = find_project_config(&subdir);
        assert_eq!(found, Some(subdir.join(PROJECT_CONFIG_NAME)));
    }

    #[test]
    fn test_directory_named_like_config_is_skipped() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("sub");
        fs::create_dir_all(subdir.join(PROJECT_CONFIG_NAME)).unwrap();
        fs::write(temp.path().join(PROJECT_CONFIG_NAME), "").unwrap();

        let (found, _) = find_project_config(&subdir);
        assert_eq!(found, Some(temp.path().join(PROJECT_CONFIG_NAME)));
    }

    #[test]
    #[ignore] // Slow: walks to the filesystem root
    fn test_walk_stops_at_root() {
        let temp = TempDir::new().unwrap();
        let (found, searched) = find_project_config(temp.path());

        if found.is_none() {
            assert_eq!(searched.last().unwrap(), &PathBuf::from("/"));
        }
    }

    #[test]
    fn test_global_config_path_structure() {
        if let Some(path) = global_config_path() {
            assert!(path.ends_with(Path::new("linewatch").join(GLOBAL_CONFIG_NAME)));
        }
    }

    #[test]
    fn test_has_config_methods() {
        let empty = DiscoveryResult::default();
        assert!(!empty.has_config());

        let with_project = DiscoveryResult {
            project_config: Some(PathBuf::from("/test/linewatch.yaml")),
            ..Default::default()
        };
        assert!(with_project.has_config());

        let with_global = DiscoveryResult {
            global_config: Some(PathBuf::from("/home/user/.config/linewatch/config.yaml")),
            ..Default::default()
        };
        assert!(with_global.has_config());
    }
}
