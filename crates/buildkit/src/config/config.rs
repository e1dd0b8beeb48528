use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::source::{ConfigLoader, ConfigSource, RawConfig, RawDownloadConfig};
use crate::error::ConfigError;
use crate::http::HttpClientConfig;

fn default_resources_dir() -> PathBuf {
    PathBuf::from("resources")
}

/// Settings for archive downloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Maximum number of archives fetched at once
    pub concurrency: usize,
    /// Stall limit between reads of a download; `None` never gives up
    pub read_timeout_secs: Option<u64>,
    pub connect_timeout_secs: u64,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            read_timeout_secs: None,
            connect_timeout_secs: 10,
            user_agent: None,
            proxy: None,
        }
    }
}

impl DownloadConfig {
    /// HTTP client settings derived from this config
    pub fn http_client_config(&self) -> HttpClientConfig {
        let mut config =
            HttpClientConfig::new().with_connect_timeout(Duration::from_secs(self.connect_timeout_secs));

        if let Some(read_timeout) = self.read_timeout_secs {
            config = config.with_read_timeout(Duration::from_secs(read_timeout));
        }
        if let Some(user_agent) = &self.user_agent {
            config = config.with_user_agent(user_agent.clone());
        }
        if let Some(proxy) = &self.proxy {
            config = config.with_proxy(proxy.clone());
        }

        config
    }
}

/// Runtime configuration of buildkit.
///
/// Sources in priority order, highest first:
///
/// 1. Values set from command line flags
/// 2. Environment variables (`BUILDKIT_RESOURCES`, `BUILDKIT_DOWNLOAD_CONCURRENCY`)
/// 3. The nearest `buildkit.toml` above the working directory
/// 4. `buildkit.toml` in the user config directory
/// 5. Built-in defaults
#[derive(Debug, Clone)]
pub struct Config {
    /// Resources root holding `config_bundles/` and `patches/`
    pub resources_dir: PathBuf,

    pub download: DownloadConfig,

    /// Directory relative paths resolve against
    base_dir: Option<PathBuf>,

    sources: HashMap<String, ConfigSource>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resources_dir: default_resources_dir(),
            download: DownloadConfig::default(),
            base_dir: None,
            sources: HashMap::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build configuration from all sources, searching for a project
    /// `buildkit.toml` upward from `start_dir`
    pub fn build<P: AsRef<Path>>(start_dir: Option<P>, use_environment: bool) -> Result<Self, ConfigError> {
        let loader = ConfigLoader::new(use_environment);
        let mut config = Self::default();

        for key in Self::config_keys() {
            config.sources.insert(key.to_string(), ConfigSource::Default);
        }

        // 1. User-wide config
        let global_home = loader.get_config_home();
        let global = loader.load_global_config()?;
        config.merge_raw_config(global, ConfigSource::Global, Some(&global_home))?;

        // 2. Project config; relative paths resolve against its directory
        let start_dir: Option<&Path> = start_dir.as_ref().map(|dir| dir.as_ref());
        if let Some(start_dir) = start_dir {
            if let Some(path) = loader.find_project_config(start_dir) {
                log::debug!("Using config file {}", path.display());
                let raw = loader.load_config_file(&path)?;
                config.merge_raw_config(raw, ConfigSource::Project, path.parent())?;
            }
            config.base_dir = Some(start_dir.to_path_buf());
        }

        // 3. Environment variable overrides
        if use_environment {
            config.apply_env_overrides(&loader)?;
        }

        Ok(config)
    }

    fn config_keys() -> &'static [&'static str] {
        &[
            "resources_dir",
            "download.concurrency",
            "download.read_timeout_secs",
            "download.connect_timeout_secs",
            "download.user_agent",
            "download.proxy",
        ]
    }

    /// Get the source of a configuration value
    pub fn get_source(&self, key: &str) -> Option<&ConfigSource> {
        self.sources.get(key)
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Resources directory, `~` expanded and resolved against the base dir
    pub fn get_resources_dir(&self) -> PathBuf {
        self.resolve_path(&self.resources_dir)
    }

    /// Override the resources directory from a command line flag
    pub fn set_resources_dir(&mut self, dir: impl Into<PathBuf>) {
        self.resources_dir = dir.into();
        self.sources
            .insert("resources_dir".to_string(), ConfigSource::Command);
    }

    /// Override the download concurrency from a command line flag
    pub fn set_download_concurrency(&mut self, concurrency: usize) -> Result<(), ConfigError> {
        validate_concurrency("download.concurrency", concurrency)?;
        self.download.concurrency = concurrency;
        self.sources
            .insert("download.concurrency".to_string(), ConfigSource::Command);
        Ok(())
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
        if expanded.is_absolute() {
            expanded
        } else if let Some(base) = &self.base_dir {
            base.join(expanded)
        } else {
            expanded
        }
    }

    fn merge_raw_config(
        &mut self,
        raw: RawConfig,
        source: ConfigSource,
        file_dir: Option<&Path>,
    ) -> Result<(), ConfigError> {
        if let Some(resources_dir) = raw.resources_dir {
            let path = PathBuf::from(shellexpand::tilde(&resources_dir).into_owned());
            self.resources_dir = match file_dir {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path,
            };
            self.sources.insert("resources_dir".to_string(), source.clone());
        }

        if let Some(download) = raw.download {
            self.merge_download(download, source)?;
        }

        Ok(())
    }

    fn merge_download(&mut self, raw: RawDownloadConfig, source: ConfigSource) -> Result<(), ConfigError> {
        if let Some(concurrency) = raw.concurrency {
            validate_concurrency("download.concurrency", concurrency)?;
            self.download.concurrency = concurrency;
            self.sources
                .insert("download.concurrency".to_string(), source.clone());
        }
        if let Some(timeout) = raw.read_timeout_secs {
            self.download.read_timeout_secs = Some(timeout);
            self.sources
                .insert("download.read_timeout_secs".to_string(), source.clone());
        }
        if let Some(timeout) = raw.connect_timeout_secs {
            self.download.connect_timeout_secs = timeout;
            self.sources
                .insert("download.connect_timeout_secs".to_string(), source.clone());
        }
        if let Some(user_agent) = raw.user_agent {
            self.download.user_agent = Some(user_agent);
            self.sources
                .insert("download.user_agent".to_string(), source.clone());
        }
        if let Some(proxy) = raw.proxy {
            self.download.proxy = Some(proxy);
            self.sources.insert("download.proxy".to_string(), source);
        }
        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self, loader: &ConfigLoader) -> Result<(), ConfigError> {
        if let Some(resources) = loader.get_env("BUILDKIT_RESOURCES") {
            self.resources_dir = PathBuf::from(resources);
            self.sources.insert(
                "resources_dir".to_string(),
                ConfigSource::Environment("BUILDKIT_RESOURCES".to_string()),
            );
        }

        if let Some(concurrency) = loader.get_env_parsed::<usize>("BUILDKIT_DOWNLOAD_CONCURRENCY")? {
            validate_concurrency("BUILDKIT_DOWNLOAD_CONCURRENCY", concurrency)?;
            self.download.concurrency = concurrency;
            self.sources.insert(
                "download.concurrency".to_string(),
                ConfigSource::Environment("BUILDKIT_DOWNLOAD_CONCURRENCY".to_string()),
            );
        }

        Ok(())
    }
}

fn validate_concurrency(key: &str, concurrency: usize) -> Result<(), ConfigError> {
    if concurrency == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}
