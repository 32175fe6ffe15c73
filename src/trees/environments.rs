use super::{DelayedRefresh, FirstLoadGate, RowKind, TreeRow, TreeView, login_row};
use crate::bus::CommandBus;
use crate::config::RefreshPolicy;
use crate::error::BusError;
use crate::events::{ConfirmRequest, EventSink, Notice, Prompter, TreeKind};
use crate::model::{EnvironmentDetail, EnvironmentSummary};
use crate::store::ActiveProfileStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct EnvironmentTree {
    bus: Arc<dyn CommandBus>,
    store: Arc<ActiveProfileStore>,
    prompter: Arc<dyn Prompter>,
    events: EventSink,
    view: TreeView,
    gate: FirstLoadGate,
    /// `None` when ended environments are refreshed right away.
    delayed: Option<DelayedRefresh>,
}

impl EnvironmentTree {
    pub fn new(
        bus: Arc<dyn CommandBus>,
        store: Arc<ActiveProfileStore>,
        prompter: Arc<dyn Prompter>,
        events: EventSink,
        policy: RefreshPolicy,
    ) -> Self {
        let delayed = match policy {
            RefreshPolicy::Immediate => None,
            RefreshPolicy::Delayed(delay) => Some(DelayedRefresh::new(
                TreeKind::Environments,
                delay,
                events.clone(),
            )),
        };
        Self {
            bus,
            store,
            prompter,
            view: TreeView::new(TreeKind::Environments, events.clone()),
            events,
            gate: FirstLoadGate::new(),
            delayed,
        }
    }

    pub async fn get_children(&self, parent: Option<&TreeRow>) -> Vec<TreeRow> {
        if parent.is_some() {
            return Vec::new();
        }

        let generation = self.view.begin_query();
        let rows = if self.gate.take() {
            debug!("skipping first environment load");
            Vec::new()
        } else {
            self.query_rows().await
        };
        self.view.publish(generation, &rows);
        rows
    }

    /// Asks for confirmation, ends the environment and schedules the
    /// follow-up refresh. Returns whether the environment was ended.
    pub async fn end_environment(&self, environment: &EnvironmentSummary) -> bool {
        let request = ConfirmRequest::yes_no(format!(
            "Are you sure you want to end environment '{}'? \
             This will permanently remove its cloud resources.",
            environment.name
        ));
        if !self.prompter.confirm(request).await {
            debug!("ending environment '{}' declined", environment.id);
            return false;
        }

        match self.bus.end_environment(&environment.id).await {
            Ok(()) => {
                info!("ending environment '{}' ({})", environment.name, environment.id);
                self.prompter.notify(Notice::info(format!(
                    "Environment '{}' is ending",
                    environment.name
                )));
                self.refresh_after_end();
                true
            }
            Err(error) => {
                warn!("failed to end environment '{}': {error}", environment.id);
                self.prompter.notify(Notice::error(error.to_string()));
                false
            }
        }
    }

    pub async fn environment_detail(&self, environment_id: &str) -> Result<EnvironmentDetail, BusError> {
        self.bus.get_environment(environment_id).await
    }

    /// Immediate refresh; supersedes a pending delayed one.
    pub fn refresh(&self) {
        if let Some(timer) = &self.delayed {
            timer.cancel();
        }
        self.events.refresh(TreeKind::Environments);
    }

    #[cfg(test)]
    pub fn refresh_pending(&self) -> bool {
        self.delayed.as_ref().is_some_and(DelayedRefresh::is_pending)
    }

    pub fn snapshot(&self) -> Vec<TreeRow> {
        self.view.snapshot()
    }

    fn refresh_after_end(&self) {
        match &self.delayed {
            Some(timer) => {
                debug!("environment refresh scheduled in {:?}", timer.delay());
                timer.schedule();
            }
            None => self.events.refresh(TreeKind::Environments),
        }
    }

    async fn query_rows(&self) -> Vec<TreeRow> {
        if self.store.get_active().is_none() {
            self.prompter
                .notify(Notice::info("No active profile is defined"));
            return vec![login_row()];
        }

        match self.bus.list_environments().await {
            Ok(environments) => environments.into_iter().map(environment_row).collect(),
            Err(error) if error.is_empty_result() => {
                debug!("no environments to show: {error}");
                Vec::new()
            }
            Err(error) => {
                warn!("failed to list environments: {error}");
                Vec::new()
            }
        }
    }
}

fn environment_row(environment: EnvironmentSummary) -> TreeRow {
    TreeRow {
        label: environment.name.clone(),
        description: (!environment.blueprint_name.is_empty())
            .then(|| environment.blueprint_name.clone()),
        tooltip: Some(format!("id: {}", environment.id)),
        active: false,
        expandable: false,
        kind: RowKind::Environment(environment),
    }
}
