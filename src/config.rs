use crate::model::Profile;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub const DEFAULT_ENVIRONMENT_DURATION: u32 = 30;
pub const DEFAULT_REFRESH_DELAY_SECS: u64 = 30;
pub const DEFAULT_BACKEND_COMMAND: &str = "torque";

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub active_profile: String,
    pub active_account: String,
    pub active_space: String,
    pub default_environment_duration: u32,
    pub environment_refresh_delay_secs: u64,
    pub backend_command: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            active_profile: String::new(),
            active_account: String::new(),
            active_space: String::new(),
            default_environment_duration: DEFAULT_ENVIRONMENT_DURATION,
            environment_refresh_delay_secs: DEFAULT_REFRESH_DELAY_SECS,
            backend_command: DEFAULT_BACKEND_COMMAND.to_string(),
        }
    }
}

impl Settings {
    pub fn active_state(&self) -> ActiveProfileState {
        ActiveProfileState {
            profile: self.active_profile.clone(),
            account: self.active_account.clone(),
            space: self.active_space.clone(),
        }
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::from_delay_secs(self.environment_refresh_delay_secs)
    }
}

/// The three persisted active-profile keys; an empty profile name means unset.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct ActiveProfileState {
    pub profile: String,
    pub account: String,
    pub space: String,
}

impl ActiveProfileState {
    pub fn from_profile(profile: Option<&Profile>) -> Self {
        match profile {
            Some(profile) => Self {
                profile: profile.name.clone(),
                account: profile.account.clone(),
                space: profile.space.clone(),
            },
            None => Self::default(),
        }
    }

    pub fn into_profile(self) -> Option<Profile> {
        if self.profile.is_empty() {
            return None;
        }
        Some(Profile::new(self.profile, self.account, self.space))
    }
}

/// How the environment tree catches up after an environment was ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RefreshPolicy {
    Immediate,
    Delayed(Duration),
}

impl RefreshPolicy {
    pub fn from_delay_secs(secs: u64) -> Self {
        if secs == 0 {
            Self::Immediate
        } else {
            Self::Delayed(Duration::from_secs(secs))
        }
    }
}

/// Durable key/value configuration.
///
/// `persist_active` is the only writer and replaces the three active-profile
/// keys as one unit. It is meant to be called by `ActiveProfileStore` alone.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Settings>;
    fn persist_active(&self, state: &ActiveProfileState) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn discover(explicit: Option<PathBuf>) -> Self {
        Self::new(explicit.unwrap_or_else(discover_config_path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettings {
    fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read settings {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse settings {}", self.path.display()))
    }

    fn persist_active(&self, state: &ActiveProfileState) -> Result<()> {
        let mut settings = self.load()?;
        settings.active_profile = state.profile.clone();
        settings.active_account = state.account.clone();
        settings.active_space = state.space.clone();

        let rendered = serde_yaml::to_string(&settings).context("failed to render settings")?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create settings directory {}", parent.display())
            })?;
        }

        // Write-then-rename so readers never observe a half-written file.
        let staging = self.path.with_extension("yaml.tmp");
        fs::write(&staging, rendered)
            .with_context(|| format!("failed to write settings {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to replace settings {}", self.path.display()))
    }
}

#[derive(Debug, Default)]
pub struct MemorySettings {
    settings: Mutex<Settings>,
    reject_writes: AtomicBool,
}

impl MemorySettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
            reject_writes: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    pub fn fail_writes(&self, fail: bool) {
        self.reject_writes.store(fail, Ordering::SeqCst);
    }
}

impl SettingsStore for MemorySettings {
    fn load(&self) -> Result<Settings> {
        let guard = self
            .settings
            .lock()
            .map_err(|_| anyhow::anyhow!("settings lock poisoned"))?;
        Ok(guard.clone())
    }

    fn persist_active(&self, state: &ActiveProfileState) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            anyhow::bail!("settings are read-only");
        }
        let mut guard = self
            .settings
            .lock()
            .map_err(|_| anyhow::anyhow!("settings lock poisoned"))?;
        guard.active_profile = state.profile.clone();
        guard.active_account = state.account.clone();
        guard.active_space = state.space.clone();
        Ok(())
    }
}

fn discover_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("TORQUE_DECK_CONFIG")
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }

    let cwd_candidates = [
        PathBuf::from("torque-deck.yaml"),
        PathBuf::from("torque-deck.yml"),
        PathBuf::from(".torque-deck.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return candidate;
        }
    }

    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".config/torque-deck/config.yaml"),
        Err(_) => PathBuf::from("torque-deck.yaml"),
    }
}
