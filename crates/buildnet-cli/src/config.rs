//! Cluster configuration file
//!
//! Defaults, then `config.toml`, then command-line overrides. A missing file
//! means defaults; a file that does not parse is an error.

use crate::error::{CliError, CliResult};
use buildnet_types::{ClusterConfig, Directories};
use std::path::{Path, PathBuf};

/// Configuration together with where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ClusterConfig,
    pub path: PathBuf,
    pub from_file: bool,
}

/// Load configuration from `path`, or from the default location
pub fn load(path: Option<&Path>) -> CliResult<LoadedConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path(),
    };

    if !path.exists() {
        return Ok(LoadedConfig {
            config: ClusterConfig::default(),
            path,
            from_file: false,
        });
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: ClusterConfig = toml::from_str(&contents)
        .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e)))?;
    Ok(LoadedConfig {
        config,
        path,
        from_file: true,
    })
}

/// Write `config` to `path`, creating parent directories
pub fn save(config: &ClusterConfig, path: &Path) -> CliResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config).map_err(|e| CliError::Config(e.to_string()))?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Create every local state directory
pub fn init_directories(directories: &Directories) -> CliResult<()> {
    for (_, dir) in directories.all() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// `~/.jenkins-local/config/config.toml`
pub fn default_config_path() -> PathBuf {
    Directories::default().config_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_config() {
        let tmp = TempDir::new().unwrap();
        let loaded = load(Some(&tmp.path().join("absent.toml"))).unwrap();
        assert!(!loaded.from_file);
        assert_eq!(loaded.config, ClusterConfig::default());
    }

    #[test]
    fn test_partial_file_merges_over_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[workers]\ncount = 3\nmemory = \"4g\"\n").unwrap();

        let loaded = load(Some(&path)).unwrap();
        assert!(loaded.from_file);
        assert_eq!(loaded.config.workers.count, 3);
        assert_eq!(loaded.config.workers.memory, "4g");
        assert_eq!(loaded.config.workers.base_ssh_port, 2222);
        assert_eq!(loaded.config.coordinator.port, 8080);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[workers\ncount = ").unwrap();

        let err = load(Some(&path)).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        let mut config = ClusterConfig {
            directories: Directories::rooted_at(tmp.path()),
            ..Default::default()
        };
        config.coordinator.port = 9090;

        save(&config, &path).unwrap();
        let loaded = load(Some(&path)).unwrap();
        assert_eq!(loaded.config, config);
    }

    #[test]
    fn test_init_directories() {
        let tmp = TempDir::new().unwrap();
        let directories = Directories::rooted_at(tmp.path().join("state"));
        init_directories(&directories).unwrap();
        for (_, dir) in directories.all() {
            assert!(dir.is_dir());
        }
    }
}
