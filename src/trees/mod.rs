mod catalog;
mod environments;
mod profiles;
mod schedule;

pub use catalog::{CatalogTree, StartSubject};
pub use environments::EnvironmentTree;
pub use profiles::{ProfileTree, profile_detail_rows};
pub use schedule::DelayedRefresh;

use crate::events::{EventSink, TreeKind, ViewEvent};
use crate::model::{EnvironmentSummary, Profile};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RowKind {
    Profile(Profile),
    ProfileDetail,
    LoginPrompt,
    Blueprint(StartSubject),
    Environment(EnvironmentSummary),
}

/// What activating a row asks the host to open.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RowAction {
    OpenLogin,
    OpenStartEnvironment(StartSubject),
    OpenEnvironmentDetails(EnvironmentSummary),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TreeRow {
    pub label: String,
    pub description: Option<String>,
    pub tooltip: Option<String>,
    pub active: bool,
    pub expandable: bool,
    pub kind: RowKind,
}

impl TreeRow {
    pub fn action(&self) -> Option<RowAction> {
        match &self.kind {
            RowKind::LoginPrompt => Some(RowAction::OpenLogin),
            RowKind::Blueprint(subject) => Some(RowAction::OpenStartEnvironment(subject.clone())),
            RowKind::Environment(environment) => {
                Some(RowAction::OpenEnvironmentDetails(environment.clone()))
            }
            RowKind::Profile(_) | RowKind::ProfileDetail => None,
        }
    }

    pub fn profile(&self) -> Option<&Profile> {
        match &self.kind {
            RowKind::Profile(profile) => Some(profile),
            _ => None,
        }
    }
}

pub fn login_row() -> TreeRow {
    TreeRow {
        label: "Login to Torque".to_string(),
        description: None,
        tooltip: Some(
            "You don't have an active profile. Login to Torque in order to create one".to_string(),
        ),
        active: false,
        expandable: false,
        kind: RowKind::LoginPrompt,
    }
}

/// The rows a tree currently shows, guarded by a query generation so only
/// the most recently issued query may replace them.
#[derive(Debug)]
pub struct TreeView {
    kind: TreeKind,
    generation: AtomicU64,
    rows: Mutex<Vec<TreeRow>>,
    events: EventSink,
}

impl TreeView {
    pub fn new(kind: TreeKind, events: EventSink) -> Self {
        Self {
            kind,
            generation: AtomicU64::new(0),
            rows: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn begin_query(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns `false` when a newer query was issued in the meantime.
    pub fn publish(&self, generation: u64, rows: &[TreeRow]) -> bool {
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(
                "dropping stale {} query result (generation {generation})",
                self.kind.title()
            );
            return false;
        }
        *self
            .rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = rows.to_vec();
        self.events.emit(ViewEvent::TreeUpdated(self.kind));
        true
    }

    pub fn snapshot(&self) -> Vec<TreeRow> {
        self.rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Swallows the first root query so it cannot race the initial profile election.
#[derive(Debug)]
pub struct FirstLoadGate {
    pending: AtomicBool,
}

impl FirstLoadGate {
    pub fn new() -> Self {
        Self {
            pending: AtomicBool::new(true),
        }
    }

    /// `true` exactly once.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }
}

impl Default for FirstLoadGate {
    fn default() -> Self {
        Self::new()
    }
}
