use directories::ProjectDirs;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::ConfigStore;
use crate::error::{common, EngineError, ErrorCode, Result};

/// Locates, reads and parses configuration files
pub struct ConfigLoader;

impl ConfigLoader {
    /// File names probed in the working directory, in order
    pub const FILE_NAMES: [&'static str; 4] =
        ["seqplan.toml", "seqplan.yaml", "seqplan.yml", "seqplan.json"];

    /// Load configuration and apply environment overrides.
    ///
    /// An explicit path must exist and parse. Without one, the first discovered
    /// file is used; a discovered file that fails to parse is logged and skipped.
    pub async fn load(explicit: Option<&Path>, cwd: &Path) -> Result<ConfigStore> {
        let mut store = match explicit {
            Some(path) => Self::load_file(path).await?,
            None => Self::discover(cwd).await,
        };
        store.merge_env_vars();
        Ok(store)
    }

    /// Candidate locations when no explicit file is given
    pub fn search_paths(cwd: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = Self::FILE_NAMES.iter().map(|n| cwd.join(n)).collect();
        if let Some(dirs) = ProjectDirs::from("dev", "seqplan", "seqplan") {
            paths.push(dirs.config_dir().join("config.toml"));
        }
        paths
    }

    async fn discover(cwd: &Path) -> ConfigStore {
        for path in Self::search_paths(cwd) {
            if !path.exists() {
                continue;
            }
            match Self::load_file(&path).await {
                Ok(store) => {
                    tracing::info!(path = %path.display(), "Loaded configuration");
                    return store;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable configuration");
                }
            }
        }
        tracing::debug!("No configuration file found, using defaults");
        ConfigStore::new()
    }

    pub async fn load_file(path: &Path) -> Result<ConfigStore> {
        if !path.exists() {
            return Err(common::config_not_found(path));
        }
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::from(e).with_context(path.display()))?;
        let value = Self::parse(&content, path)?;
        Ok(ConfigStore::from_value(value).with_source(path))
    }

    /// Parse by extension: `.toml`, `.yaml`/`.yml` or `.json`
    pub fn parse(content: &str, path: &Path) -> Result<Value> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let value = match extension.as_str() {
            "toml" => {
                let table: toml::Table = toml::from_str(content)?;
                serde_json::to_value(table)?
            }
            "yaml" | "yml" => serde_yaml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => {
                return Err(EngineError::config_with_code(
                    ErrorCode::CONFIG_UNSUPPORTED_FORMAT,
                    format!("Unsupported configuration format '{}'", other),
                ))
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigProvider;
    use serde_json::json;

    #[tokio::test]
    async fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seqplan.toml");
        std::fs::write(
            &path,
            r#"
[engine]
processTimeout = "10m"

[cicd]
linters = ["eslint"]
coverageThreshold = 85

[cicd.healthCheck]
timeoutMs = 1500
"#,
        )
        .unwrap();

        let store = ConfigLoader::load_file(&path).await.unwrap();
        assert_eq!(store.source(), Some(path.as_path()));
        assert_eq!(
            store.get_config_value("cicd", "coverageThreshold", json!(80)),
            json!(85)
        );
        assert_eq!(
            store.get_config_value("cicd", "healthCheck.timeoutMs", json!(5000)),
            json!(1500)
        );
        assert_eq!(
            store.engine_settings().process_timeout(),
            Some(std::time::Duration::from_secs(600))
        );
    }

    #[tokio::test]
    async fn test_load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "data:\n  outputFormat: csv\n  compression: gzip\n").unwrap();

        let store = ConfigLoader::load_file(&path).await.unwrap();
        assert_eq!(
            store.get_config("data"),
            json!({ "outputFormat": "csv", "compression": "gzip" })
        );
    }

    #[tokio::test]
    async fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::load(Some(&dir.path().join("nope.toml")), dir.path())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_broken_discovered_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("seqplan.toml"), "[cicd\nbroken").unwrap();

        let store = ConfigLoader::discover(dir.path()).await;
        assert_eq!(store.get_config("cicd"), json!({}));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = ConfigLoader::parse("a=1", Path::new("config.ini")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_UNSUPPORTED_FORMAT);
    }
}
