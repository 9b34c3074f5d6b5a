use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Record-service connection settings. The remote store is only built when
/// `url` and `api_key` are present; `user` pins the owning identity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    data: Option<String>,
    color: Option<String>,
    #[serde(default)]
    remote: RemoteConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    data: Option<String>,
    color: Option<String>,
    remote: RemoteConfig,
    pub loaded_files: Vec<PathBuf>,
}

impl Config {
    #[tracing::instrument(skip(config_override))]
    pub fn load(config_override: Option<&Path>) -> anyhow::Result<Self> {
        let path = resolve_config_path(config_override)?;

        let Some(path) = path else {
            warn!("no config file found; using defaults");
            return Ok(Self::default());
        };

        info!(config = %path.display(), "loading config");
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        let mut cfg = Self::from_toml(&text)
            .with_context(|| format!("failed parsing {}", path.display()))?;
        cfg.loaded_files.push(path);
        Ok(cfg)
    }

    fn from_toml(text: &str) -> anyhow::Result<Self> {
        let file: FileConfig = toml::from_str(text)?;
        Ok(Self {
            data: file.data,
            color: file.color,
            remote: file.remote,
            loaded_files: vec![],
        })
    }

    /// `--set key=value` overrides, applied on top of the file. Dotted keys
    /// reach into the remote table.
    #[tracing::instrument(skip(self, overrides))]
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in overrides {
            debug!(key = %key, value = %value, "applying override");
            match key.as_str() {
                "data" => self.data = Some(value),
                "color" => self.color = Some(value),
                "remote.url" => self.remote.url = Some(value),
                "remote.api_key" => self.remote.api_key = Some(value),
                "remote.user" => self.remote.user = Some(value),
                other => warn!(key = %other, "unknown config key ignored"),
            }
        }
    }

    pub fn color(&self) -> Option<String> {
        self.color.clone()
    }

    pub fn remote(&self) -> &RemoteConfig {
        &self.remote
    }
}

#[tracing::instrument(skip(cfg, cli_override))]
pub fn resolve_data_dir(cfg: &Config, cli_override: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = cli_override {
        return Ok(expand_tilde(dir));
    }

    if let Some(dir) = &cfg.data {
        return Ok(expand_tilde(Path::new(dir)));
    }

    if let Some(base) = dirs::data_dir() {
        return Ok(base.join("driftlist"));
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".driftlist"))
}

fn resolve_config_path(config_override: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = config_override {
        let path = expand_tilde(path);
        if !path.exists() {
            return Err(anyhow!("config file not found: {}", path.display()));
        }
        return Ok(Some(path));
    }

    if let Ok(env_path) = std::env::var("DRIFTLIST_CONFIG") {
        let path = expand_tilde(Path::new(&env_path));
        if path.exists() {
            return Ok(Some(path));
        }
        warn!(path = %path.display(), "DRIFTLIST_CONFIG points at a missing file");
    }

    if let Some(base) = dirs::config_dir() {
        let candidate = base.join("driftlist").join("config.toml");
        if candidate.exists() {
            return Ok(Some(candidate));
        }
    }

    if let Some(home) = dirs::home_dir() {
        let candidate = home.join(".driftlist.toml");
        if candidate.exists() {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

fn expand_tilde(path: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };

    if raw == "~" {
        return dirs::home_dir().unwrap_or_else(|| path.to_path_buf());
    }

    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    path.to_path_buf()
}
