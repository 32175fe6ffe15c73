use super::{RowKind, TreeRow, TreeView};
use crate::bus::CommandBus;
use crate::events::{ConfirmRequest, EventSink, Notice, Prompter, TreeKind};
use crate::model::Profile;
use crate::store::ActiveProfileStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ProfileTree {
    bus: Arc<dyn CommandBus>,
    store: Arc<ActiveProfileStore>,
    prompter: Arc<dyn Prompter>,
    events: EventSink,
    view: TreeView,
}

impl ProfileTree {
    pub fn new(
        bus: Arc<dyn CommandBus>,
        store: Arc<ActiveProfileStore>,
        prompter: Arc<dyn Prompter>,
        events: EventSink,
    ) -> Self {
        Self {
            bus,
            store,
            prompter,
            view: TreeView::new(TreeKind::Profiles, events.clone()),
            events,
        }
    }

    pub async fn get_children(&self, parent: Option<&TreeRow>) -> Vec<TreeRow> {
        match parent {
            Some(row) => row.profile().map(profile_detail_rows).unwrap_or_default(),
            None => self.list_root().await.0,
        }
    }

    /// First load at startup. Dependents are refreshed exactly once, either by
    /// the election inside the query or here.
    pub async fn initial_load(&self) {
        let (_, dependents_refreshed) = self.list_root().await;
        if !dependents_refreshed {
            self.events.refresh_dependents();
        }
    }

    pub async fn set_as_default(&self, profile: &Profile) {
        match self.store.set_active(Some(profile.clone())).await {
            Ok(()) => {
                info!("default profile is now '{profile}'");
                self.events.refresh_all();
            }
            Err(error) => {
                warn!("failed to set default profile: {error:#}");
                self.prompter
                    .notify(Notice::error(format!("Could not set default profile: {error}")));
            }
        }
    }

    /// Returns whether the profile was removed.
    pub async fn remove_entry(&self, profile: &Profile) -> bool {
        let request = ConfirmRequest::yes_no(format!(
            "Are you sure you want to remove profile '{}'?",
            profile.name
        ));
        if !self.prompter.confirm(request).await {
            debug!("removing profile '{}' declined", profile.name);
            return false;
        }

        if let Err(error) = self.bus.remove_profile(&profile.name).await {
            warn!("failed to remove profile '{}': {error}", profile.name);
            self.prompter.notify(Notice::error(error.to_string()));
            return false;
        }

        self.prompter
            .notify(Notice::info(format!("Profile '{}' removed", profile.name)));
        self.get_children(None).await;
        true
    }

    pub fn refresh(&self) {
        self.events.refresh(TreeKind::Profiles);
    }

    pub fn snapshot(&self) -> Vec<TreeRow> {
        self.view.snapshot()
    }

    /// Lists profiles and keeps the active profile pointing at one of them.
    /// The flag reports whether dependents were already asked to refresh.
    async fn list_root(&self) -> (Vec<TreeRow>, bool) {
        let generation = self.view.begin_query();
        let profiles = match self.bus.list_profiles().await {
            Ok(profiles) => profiles,
            Err(error) => {
                warn!("failed to list profiles: {error}");
                self.view.publish(generation, &[]);
                return (Vec::new(), false);
            }
        };

        let active = self.store.get_active();
        let mut active_index = active.as_ref().and_then(|active| {
            profiles
                .iter()
                .position(|profile| profile.same_identity(active))
        });

        let mut dependents_refreshed = false;
        if active_index.is_none() {
            let elected = profiles.first().cloned();
            match self.store.set_active(elected.clone()).await {
                Ok(()) => {
                    match &elected {
                        Some(profile) => info!("elected '{}' as active profile", profile.name),
                        None => info!("no profiles left, active profile cleared"),
                    }
                    active_index = elected.map(|_| 0);
                }
                Err(error) => warn!("failed to update active profile: {error:#}"),
            }
            self.events.refresh_dependents();
            dependents_refreshed = true;
        }

        let rows = profiles
            .into_iter()
            .enumerate()
            .map(|(index, profile)| profile_row(profile, Some(index) == active_index))
            .collect::<Vec<_>>();
        self.view.publish(generation, &rows);
        (rows, dependents_refreshed)
    }
}

fn profile_row(profile: Profile, active: bool) -> TreeRow {
    TreeRow {
        label: profile.name.clone(),
        description: active.then(|| "[default]".to_string()),
        tooltip: Some(format!(
            "account: {}, space: {}",
            profile.account_label(),
            profile.space
        )),
        active,
        expandable: true,
        kind: RowKind::Profile(profile),
    }
}

/// The static rows shown under an expanded profile.
pub fn profile_detail_rows(profile: &Profile) -> Vec<TreeRow> {
    [
        format!("account: {}", profile.account_label()),
        format!("space: {}", profile.space),
    ]
    .into_iter()
    .map(|label| TreeRow {
        label,
        description: None,
        tooltip: None,
        active: false,
        expandable: false,
        kind: RowKind::ProfileDetail,
    })
    .collect()
}
