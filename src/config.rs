use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

pub const CONFIG_FILE_NAME: &str = "modsync.json";
const DEFAULT_OWNER: &str = "ThunderEmm";
const DEFAULT_REPO: &str = "Create-SMP-Mods";
const DEFAULT_BRANCH: &str = "main";
const DEFAULT_REMOTE: &str = "origin";
const DEFAULT_API: &str = "https://api.github.com";
const DEFAULT_EXTENSION: &str = ".jar";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_repo")]
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_api")]
    pub api_base: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub mods_dir: Option<PathBuf>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            repo: default_repo(),
            branch: default_branch(),
            remote: default_remote(),
            api_base: default_api(),
            extension: default_extension(),
            mods_dir: None,
            log_file: None,
        }
    }
}

/// Command-line values that take precedence over whatever the config file says.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub mods_dir: Option<PathBuf>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub remote: Option<String>,
    pub api_base: Option<String>,
    pub extension: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl SyncConfig {
    /// Resolves defaults, then the first config file found, then overrides.
    /// Config files are only ever read; nothing is written back.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let default_dir = match &overrides.mods_dir {
            Some(dir) => dir.clone(),
            None => program_dir()?,
        };

        let mut config = match find_config_file(overrides.config_path.as_deref(), &default_dir)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        if config.mods_dir.is_none() {
            config.mods_dir = Some(default_dir);
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: SyncConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(dir) = &overrides.mods_dir {
            self.mods_dir = Some(dir.clone());
        }
        if let Some(owner) = &overrides.owner {
            self.owner = owner.clone();
        }
        if let Some(repo) = &overrides.repo {
            self.repo = repo.clone();
        }
        if let Some(branch) = &overrides.branch {
            self.branch = branch.clone();
        }
        if let Some(remote) = &overrides.remote {
            self.remote = remote.clone();
        }
        if let Some(api) = &overrides.api_base {
            self.api_base = api.clone();
        }
        if let Some(ext) = &overrides.extension {
            self.extension = ext.clone();
        }
        if let Some(log_file) = &overrides.log_file {
            self.log_file = Some(log_file.clone());
        }
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.mods_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents",
            self.api_base.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }

    /// Remote-tracking ref the selected files are checked out from, e.g. `origin/main`.
    pub fn remote_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    pub fn repo_label(&self) -> String {
        format!("{}/{}@{}", self.owner, self.repo, self.branch)
    }
}

fn find_config_file(explicit: Option<&Path>, mods_dir: &Path) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    let local = mods_dir.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok(Some(local));
    }

    if let Some(base) = BaseDirs::new() {
        let user = base.config_dir().join("modsync").join("config.json");
        if user.is_file() {
            return Ok(Some(user));
        }
    }

    Ok(None)
}

/// The directory the binary lives in; the mod pack is expected next to it.
fn program_dir() -> Result<PathBuf> {
    let exe = env::current_exe().context("resolve current executable")?;
    let dir = exe.parent().context("resolve executable directory")?;
    Ok(dir.to_path_buf())
}

fn default_owner() -> String {
    DEFAULT_OWNER.to_string()
}

fn default_repo() -> String {
    DEFAULT_REPO.to_string()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_remote() -> String {
    DEFAULT_REMOTE.to_string()
}

fn default_api() -> String {
    DEFAULT_API.to_string()
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}
