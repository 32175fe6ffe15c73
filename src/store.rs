use crate::config::{ActiveProfileState, Settings, SettingsStore};
use crate::model::Profile;
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Holds the profile every tree and panel operates against.
///
/// One instance is built at startup and shared by the controllers. Reads are
/// served from memory and fall back to the persisted keys the first time;
/// writes go through [`ActiveProfileStore::set_active`] only.
pub struct ActiveProfileStore {
    settings: Arc<dyn SettingsStore>,
    /// Outer `None` until the persisted keys have been read once.
    cached: Mutex<Option<Option<Profile>>>,
    writer: tokio::sync::Mutex<()>,
}

impl ActiveProfileStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            settings,
            cached: Mutex::new(None),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn get_active(&self) -> Option<Profile> {
        let mut cached = self.cache();
        if let Some(active) = cached.as_ref() {
            return active.clone();
        }
        match self.settings.load() {
            Ok(settings) => {
                let active = settings.active_state().into_profile();
                *cached = Some(active.clone());
                active
            }
            Err(error) => {
                warn!("failed to load persisted active profile: {error:#}");
                None
            }
        }
    }

    pub fn active_name(&self) -> Option<String> {
        self.get_active().map(|profile| profile.name)
    }

    /// Persists `profile` (or clears it) and only then swaps the in-memory value.
    pub async fn set_active(&self, profile: Option<Profile>) -> Result<()> {
        let _writer = self.writer.lock().await;
        let state = ActiveProfileState::from_profile(profile.as_ref());
        let settings = Arc::clone(&self.settings);

        tokio::task::spawn_blocking(move || settings.persist_active(&state))
            .await
            .context("active profile writer task failed")?
            .context("failed to persist active profile")?;

        debug!(
            "active profile set to {}",
            profile.as_ref().map_or("<none>", |profile| profile.name.as_str())
        );
        *self.cache() = Some(profile);
        Ok(())
    }

    /// Read-only view of the remaining configuration values.
    pub fn settings(&self) -> Settings {
        self.settings.load().unwrap_or_else(|error| {
            warn!("failed to load settings, using defaults: {error:#}");
            Settings::default()
        })
    }

    fn cache(&self) -> MutexGuard<'_, Option<Option<Profile>>> {
        self.cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
