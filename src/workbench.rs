use crate::app::AppCommand;
use crate::bus::CommandBus;
use crate::config::RefreshPolicy;
use crate::events::{EventSink, PanelKind, Prompter, TreeKind};
use crate::model::Profile;
use crate::panels::{DetailsPanel, LoginPanel, PanelContent, PanelController, StartPanel};
use crate::store::ActiveProfileStore;
use crate::trees::{CatalogTree, EnvironmentTree, ProfileTree, TreeRow};
use std::sync::Arc;
use tracing::debug;

/// Owns the three trees and the three panel singletons and routes host
/// commands to them.
pub struct Workbench {
    store: Arc<ActiveProfileStore>,
    profiles: ProfileTree,
    catalog: CatalogTree,
    environments: Arc<EnvironmentTree>,
    login: PanelController<LoginPanel>,
    start: PanelController<StartPanel>,
    details: PanelController<DetailsPanel>,
}

impl Workbench {
    pub fn new(
        bus: Arc<dyn CommandBus>,
        store: Arc<ActiveProfileStore>,
        prompter: Arc<dyn Prompter>,
        events: EventSink,
        policy: RefreshPolicy,
    ) -> Self {
        let environments = Arc::new(EnvironmentTree::new(
            bus.clone(),
            store.clone(),
            prompter.clone(),
            events.clone(),
            policy,
        ));
        Self {
            profiles: ProfileTree::new(
                bus.clone(),
                store.clone(),
                prompter.clone(),
                events.clone(),
            ),
            catalog: CatalogTree::new(bus.clone(), store.clone(), prompter.clone(), events.clone()),
            login: PanelController::new(
                LoginPanel::new(bus.clone(), prompter.clone(), events.clone()),
                prompter.clone(),
                events.clone(),
            ),
            start: PanelController::new(
                StartPanel::new(bus, store.clone(), prompter.clone(), environments.clone()),
                prompter.clone(),
                events.clone(),
            ),
            details: PanelController::new(
                DetailsPanel::new(store.clone(), environments.clone()),
                prompter,
                events,
            ),
            environments,
            store,
        }
    }

    /// Startup order: the dependent trees burn their gated first load, then
    /// the profile tree settles the active profile and refreshes them.
    pub async fn start(&self) {
        tokio::join!(
            self.catalog.get_children(None),
            self.environments.get_children(None)
        );
        self.profiles.initial_load().await;
    }

    pub async fn query_tree(&self, tree: TreeKind) {
        let rows = match tree {
            TreeKind::Profiles => self.profiles.get_children(None).await,
            TreeKind::Catalog => self.catalog.get_children(None).await,
            TreeKind::Environments => self.environments.get_children(None).await,
        };
        debug!("{} query returned {} rows", tree.title(), rows.len());
    }

    pub fn tree_rows(&self, tree: TreeKind) -> Vec<TreeRow> {
        match tree {
            TreeKind::Profiles => self.profiles.snapshot(),
            TreeKind::Catalog => self.catalog.snapshot(),
            TreeKind::Environments => self.environments.snapshot(),
        }
    }

    pub fn active_profile(&self) -> Option<Profile> {
        self.store.get_active()
    }

    pub fn panel_content(&self, kind: PanelKind) -> Option<PanelContent> {
        match kind {
            PanelKind::Login => self.login.content(),
            PanelKind::StartEnvironment => self.start.content(),
            PanelKind::EnvironmentDetails => self.details.content(),
        }
    }

    pub async fn execute(&self, command: AppCommand) {
        match command {
            AppCommand::None => {}
            AppCommand::RefreshTree(TreeKind::Profiles) => self.profiles.refresh(),
            AppCommand::RefreshTree(TreeKind::Catalog) => self.catalog.refresh(),
            AppCommand::RefreshTree(TreeKind::Environments) => self.environments.refresh(),
            AppCommand::OpenLogin => self.login.create_or_show(()).await,
            AppCommand::OpenStart(subject) => self.start.create_or_show(subject).await,
            AppCommand::OpenDetails(environment) => {
                self.details.create_or_show(environment).await
            }
            AppCommand::SetDefaultProfile(profile) => self.profiles.set_as_default(&profile).await,
            AppCommand::RemoveProfile(profile) => {
                self.profiles.remove_entry(&profile).await;
            }
            AppCommand::EndEnvironment(environment) => {
                self.environments.end_environment(&environment).await;
            }
            AppCommand::Panel(PanelKind::Login, message) => self.login.dispatch(message).await,
            AppCommand::Panel(PanelKind::StartEnvironment, message) => {
                self.start.dispatch(message).await
            }
            AppCommand::Panel(PanelKind::EnvironmentDetails, message) => {
                self.details.dispatch(message).await
            }
            AppCommand::ClosePanel(kind) => self.dispose_panel(kind),
        }
    }

    pub fn dispose_panel(&self, kind: PanelKind) {
        match kind {
            PanelKind::Login => self.login.dispose(),
            PanelKind::StartEnvironment => self.start.dispose(),
            PanelKind::EnvironmentDetails => self.details.dispose(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Workbench;
    use crate::app::AppCommand;
    use crate::config::RefreshPolicy;
    use crate::events::{PanelKind, TreeKind, ViewEvent};
    use crate::model::Profile;
    use crate::panels::PanelMessage;
    use crate::test_support::{
        BusCall, FakeBus, ScriptedPrompter, blueprint, environment, events, memory_store,
    };
    use serde_json::{Map, json};
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn dev() -> Profile {
        Profile::new("dev", "acme", "sandbox")
    }

    fn workbench(
        bus: Arc<FakeBus>,
        active: Option<Profile>,
    ) -> (Workbench, UnboundedReceiver<ViewEvent>) {
        let (sink, rx) = events();
        let workbench = Workbench::new(
            bus,
            memory_store(active),
            Arc::new(ScriptedPrompter::answering(&[true])),
            sink,
            RefreshPolicy::Immediate,
        );
        (workbench, rx)
    }

    /// Runs every queued refresh the way the host loop would.
    async fn settle(workbench: &Workbench, rx: &mut UnboundedReceiver<ViewEvent>) {
        while let Ok(event) = rx.try_recv() {
            if let ViewEvent::Refresh(tree) = event {
                workbench.query_tree(tree).await;
            }
        }
    }

    #[tokio::test]
    async fn startup_loads_dependents_exactly_once() {
        let bus = Arc::new(
            FakeBus::new()
                .with_profiles(vec![dev()])
                .with_blueprints(vec![blueprint("web", true, false)])
                .with_environments(vec![environment("e1", "demo")]),
        );
        let (workbench, mut rx) = workbench(bus.clone(), Some(dev()));

        workbench.start().await;
        settle(&workbench, &mut rx).await;

        assert_eq!(bus.count(|call| matches!(call, BusCall::ListBlueprints)), 1);
        assert_eq!(bus.count(|call| matches!(call, BusCall::ListEnvironments)), 1);
        assert_eq!(workbench.tree_rows(TreeKind::Catalog).len(), 1);
        assert_eq!(workbench.tree_rows(TreeKind::Environments)[0].label, "demo");
    }

    #[tokio::test]
    async fn startup_without_profiles_offers_login() {
        let bus = Arc::new(FakeBus::new());
        let (workbench, mut rx) = workbench(bus.clone(), None);

        workbench.start().await;
        settle(&workbench, &mut rx).await;

        assert!(workbench.tree_rows(TreeKind::Profiles).is_empty());
        assert_eq!(
            workbench.tree_rows(TreeKind::Catalog)[0].label,
            "Login to Torque"
        );
        assert_eq!(bus.count(|call| matches!(call, BusCall::ListBlueprints)), 0);
    }

    #[tokio::test]
    async fn panels_are_singletons_per_kind() {
        let bus = Arc::new(FakeBus::new());
        let (workbench, _rx) = workbench(bus, Some(dev()));

        workbench.execute(AppCommand::OpenLogin).await;
        let first = workbench.panel_content(PanelKind::Login).expect("open");
        workbench.execute(AppCommand::OpenLogin).await;
        let second = workbench.panel_content(PanelKind::Login).expect("open");
        assert_eq!(first.instance, second.instance);

        workbench.execute(AppCommand::ClosePanel(PanelKind::Login)).await;
        assert!(workbench.panel_content(PanelKind::Login).is_none());
        workbench.execute(AppCommand::OpenLogin).await;
        let third = workbench.panel_content(PanelKind::Login).expect("open");
        assert_ne!(third.instance, first.instance);
    }

    #[tokio::test]
    async fn login_submission_adds_profile_and_closes() {
        let bus = Arc::new(FakeBus::new());
        let (workbench, mut rx) = workbench(bus.clone(), None);
        workbench.execute(AppCommand::OpenLogin).await;

        let fields = json!({"profile": "dev", "account": "acme", "space": "sandbox", "token": "t0k"})
            .as_object()
            .cloned()
            .unwrap_or_else(Map::new);
        workbench
            .execute(AppCommand::Panel(
                PanelKind::Login,
                PanelMessage::run("login", fields),
            ))
            .await;

        assert!(workbench.panel_content(PanelKind::Login).is_none());
        assert_eq!(bus.count(|call| matches!(call, BusCall::Login(_))), 1);
        let mut refreshed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ViewEvent::Refresh(tree) = event {
                refreshed.push(tree);
            }
        }
        assert_eq!(refreshed, vec![TreeKind::Profiles]);
    }

    #[tokio::test]
    async fn ending_from_the_tree_goes_through_confirmation() {
        let bus = Arc::new(FakeBus::new().with_environments(vec![environment("e1", "demo")]));
        let (workbench, _rx) = workbench(bus.clone(), Some(dev()));

        workbench
            .execute(AppCommand::EndEnvironment(environment("e1", "demo")))
            .await;

        assert_eq!(
            bus.count(|call| matches!(call, BusCall::EndEnvironment(id) if id == "e1")),
            1
        );
    }
}
