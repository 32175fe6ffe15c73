use super::{FirstLoadGate, RowKind, TreeRow, TreeView, login_row};
use crate::bus::CommandBus;
use crate::events::{EventSink, Notice, Prompter, TreeKind};
use crate::model::{BlueprintSummary, InputSpec};
use crate::store::ActiveProfileStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything the start panel needs to launch one blueprint.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StartSubject {
    pub blueprint_name: String,
    pub display_name: String,
    pub inputs: Vec<InputSpec>,
    pub artifacts: BTreeMap<String, String>,
    pub source_ref: Option<String>,
    pub repository: Option<String>,
}

impl From<&BlueprintSummary> for StartSubject {
    fn from(blueprint: &BlueprintSummary) -> Self {
        Self {
            blueprint_name: blueprint.name.clone(),
            display_name: blueprint.display_name(),
            inputs: blueprint.inputs.clone(),
            artifacts: blueprint.artifacts.clone(),
            source_ref: blueprint.source_ref.clone(),
            repository: blueprint.repository.clone(),
        }
    }
}

pub struct CatalogTree {
    bus: Arc<dyn CommandBus>,
    store: Arc<ActiveProfileStore>,
    prompter: Arc<dyn Prompter>,
    events: EventSink,
    view: TreeView,
    gate: FirstLoadGate,
}

impl CatalogTree {
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
            view: TreeView::new(TreeKind::Catalog, events.clone()),
            events,
            gate: FirstLoadGate::new(),
        }
    }

    pub async fn get_children(&self, parent: Option<&TreeRow>) -> Vec<TreeRow> {
        if parent.is_some() {
            return Vec::new();
        }

        let generation = self.view.begin_query();
        let rows = if self.gate.take() {
            debug!("skipping first catalog load");
            Vec::new()
        } else {
            self.query_rows().await
        };
        self.view.publish(generation, &rows);
        rows
    }

    pub fn refresh(&self) {
        self.events.refresh(TreeKind::Catalog);
    }

    pub fn snapshot(&self) -> Vec<TreeRow> {
        self.view.snapshot()
    }

    async fn query_rows(&self) -> Vec<TreeRow> {
        if self.store.get_active().is_none() {
            self.prompter
                .notify(Notice::info("No active profile is defined"));
            return vec![login_row()];
        }

        match self.bus.list_blueprints().await {
            Ok(blueprints) => blueprints
                .iter()
                .filter(|blueprint| blueprint.is_launchable())
                .map(blueprint_row)
                .collect(),
            Err(error) if error.is_empty_result() => {
                debug!("no blueprints to show: {error}");
                Vec::new()
            }
            Err(error) => {
                warn!("failed to list blueprints: {error}");
                Vec::new()
            }
        }
    }
}

fn blueprint_row(blueprint: &BlueprintSummary) -> TreeRow {
    let subject = StartSubject::from(blueprint);
    TreeRow {
        label: subject.display_name.clone(),
        description: subject.repository.clone(),
        tooltip: (!blueprint.description.is_empty()).then(|| blueprint.description.clone()),
        active: false,
        expandable: false,
        kind: RowKind::Blueprint(subject),
    }
}
