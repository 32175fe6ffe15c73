use crate::events::{ConfirmRequest, Notice, NoticeLevel, PanelKind, TreeKind};
use crate::input::Action;
use crate::model::{EnvironmentSummary, Profile};
use crate::panels::{FormField, PanelContent, PanelMessage, collect_fields};
use crate::trees::{RowAction, RowKind, StartSubject, TreeRow, profile_detail_rows};
use chrono::Local;
use serde_json::Map;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Form,
}

/// Work the host loop hands to the workbench after a key press.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    None,
    RefreshTree(TreeKind),
    OpenLogin,
    OpenStart(StartSubject),
    OpenDetails(EnvironmentSummary),
    SetDefaultProfile(Profile),
    RemoveProfile(Profile),
    EndEnvironment(EnvironmentSummary),
    Panel(PanelKind, PanelMessage),
    ClosePanel(PanelKind),
}

struct PendingConfirmation {
    request: ConfirmRequest,
    reply: oneshot::Sender<bool>,
}

/// Editable copy of the panel on screen. Focus runs over fields, then actions.
#[derive(Debug, Clone)]
pub struct PanelView {
    content: PanelContent,
    fields: Vec<FormField>,
    focus: usize,
}

impl PanelView {
    fn new(content: PanelContent) -> Self {
        Self {
            fields: content.fields.clone(),
            content,
            focus: 0,
        }
    }

    pub fn content(&self) -> &PanelContent {
        &self.content
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    fn slots(&self) -> usize {
        self.fields.len() + self.content.actions.len()
    }

    fn same_form(&self, content: &PanelContent) -> bool {
        self.content.kind == content.kind
            && self.content.instance == content.instance
            && self.content.subject_key == content.subject_key
            && self.fields.len() == content.fields.len()
            && self
                .fields
                .iter()
                .zip(&content.fields)
                .all(|(current, next)| current.key == next.key && current.target == next.target)
    }

    fn has_action(&self, name: &str) -> bool {
        self.content.actions.iter().any(|action| action.name == name)
    }

    /// The focused action, or the first one while a field is focused.
    fn submit_action(&self) -> Option<&'static str> {
        let actions = &self.content.actions;
        self.focus
            .checked_sub(self.fields.len())
            .and_then(|index| actions.get(index))
            .or_else(|| actions.first())
            .map(|action| action.name)
    }

    fn message(&self, name: &str) -> PanelMessage {
        PanelMessage::run(
            name,
            if name == "reload" || name == "end" {
                Map::new()
            } else {
                collect_fields(&self.fields)
            },
        )
    }
}

pub struct App {
    running: bool,
    mode: InputMode,
    active_tree: TreeKind,
    rows: HashMap<TreeKind, Vec<TreeRow>>,
    selected: HashMap<TreeKind, usize>,
    expanded: HashSet<String>,
    last_refresh: HashMap<TreeKind, String>,
    panel: Option<PanelView>,
    status: String,
    status_level: NoticeLevel,
    show_help: bool,
    pending_confirmation: Option<PendingConfirmation>,
    queued_confirmations: VecDeque<PendingConfirmation>,
    active_profile: Option<Profile>,
}

impl App {
    pub fn new() -> Self {
        Self {
            running: true,
            mode: InputMode::Normal,
            active_tree: TreeKind::Profiles,
            rows: HashMap::new(),
            selected: HashMap::new(),
            expanded: HashSet::new(),
            last_refresh: HashMap::new(),
            panel: None,
            status: "Loading profiles…".to_string(),
            status_level: NoticeLevel::Info,
            show_help: false,
            pending_confirmation: None,
            queued_confirmations: VecDeque::new(),
            active_profile: None,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn active_tree(&self) -> TreeKind {
        self.active_tree
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn status_level(&self) -> NoticeLevel {
        self.status_level
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn panel(&self) -> Option<&PanelView> {
        self.panel.as_ref()
    }

    pub fn confirmation(&self) -> Option<&ConfirmRequest> {
        self.pending_confirmation
            .as_ref()
            .map(|pending| &pending.request)
    }

    pub fn active_profile(&self) -> Option<&Profile> {
        self.active_profile.as_ref()
    }

    pub fn last_refresh(&self, tree: TreeKind) -> Option<&str> {
        self.last_refresh.get(&tree).map(String::as_str)
    }

    /// Rows as drawn: expanded profiles are followed by their detail rows.
    pub fn visible_rows(&self, tree: TreeKind) -> Vec<TreeRow> {
        let rows = self.rows.get(&tree).cloned().unwrap_or_default();
        if tree != TreeKind::Profiles {
            return rows;
        }
        let mut visible = Vec::with_capacity(rows.len());
        for row in rows {
            let details = row
                .profile()
                .filter(|profile| self.expanded.contains(&profile.name))
                .map(profile_detail_rows);
            visible.push(row);
            visible.extend(details.unwrap_or_default());
        }
        visible
    }

    pub fn selected_index(&self, tree: TreeKind) -> Option<usize> {
        let count = self.visible_rows(tree).len();
        (count > 0).then(|| self.selected.get(&tree).copied().unwrap_or(0).min(count - 1))
    }

    pub fn selected_row(&self) -> Option<TreeRow> {
        let index = self.selected_index(self.active_tree)?;
        self.visible_rows(self.active_tree).into_iter().nth(index)
    }

    pub fn set_tree_rows(&mut self, tree: TreeKind, rows: Vec<TreeRow>) {
        if tree == TreeKind::Profiles {
            let names = rows
                .iter()
                .filter_map(TreeRow::profile)
                .map(|profile| profile.name.clone())
                .collect::<HashSet<_>>();
            self.expanded.retain(|name| names.contains(name));
        }
        self.rows.insert(tree, rows);
        self.last_refresh
            .insert(tree, Local::now().format("%H:%M:%S").to_string());
        let count = self.visible_rows(tree).len();
        let selected = self.selected.entry(tree).or_insert(0);
        *selected = (*selected).min(count.saturating_sub(1));
    }

    pub fn set_active_profile(&mut self, profile: Option<Profile>) {
        self.active_profile = profile;
    }

    pub fn set_notice(&mut self, notice: Notice) {
        self.status = notice.text;
        self.status_level = notice.level;
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.set_notice(Notice::info(status));
    }

    /// Queues a question; it is answered with `y`/`n` in arrival order.
    pub fn ask(&mut self, request: ConfirmRequest, reply: oneshot::Sender<bool>) {
        let pending = PendingConfirmation { request, reply };
        if self.pending_confirmation.is_none() {
            self.pending_confirmation = Some(pending);
        } else {
            self.queued_confirmations.push_back(pending);
        }
    }

    /// Mirrors the controller's view of a panel. `None` means it was closed.
    pub fn sync_panel(&mut self, kind: PanelKind, content: Option<PanelContent>) {
        match content {
            None => {
                if self.panel.as_ref().is_some_and(|view| view.content.kind == kind) {
                    self.panel = None;
                    self.mode = InputMode::Normal;
                }
            }
            Some(content) => {
                let same_form = self
                    .panel
                    .as_ref()
                    .is_some_and(|view| view.same_form(&content));
                if !same_form {
                    self.panel = Some(PanelView::new(content));
                    self.mode = InputMode::Form;
                } else if let Some(view) = self.panel.as_mut() {
                    view.content = content;
                }
            }
        }
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        if let Some(pending) = self.pending_confirmation.take() {
            let answer = match action {
                Action::ConfirmYes => Some(true),
                Action::ConfirmNo | Action::ClosePanel => Some(false),
                _ => None,
            };
            match answer {
                Some(answer) => {
                    self.status = if answer {
                        format!("Confirmed: {}", pending.request.message)
                    } else {
                        "Action cancelled".to_string()
                    };
                    self.status_level = NoticeLevel::Info;
                    let _ = pending.reply.send(answer);
                    self.pending_confirmation = self.queued_confirmations.pop_front();
                }
                None => {
                    self.pending_confirmation = Some(pending);
                    self.set_status("Pending confirmation: press y to confirm or n to cancel");
                }
            }
            return AppCommand::None;
        }

        if self.show_help && !matches!(action, Action::ToggleHelp) {
            self.show_help = false;
        }

        match action {
            Action::Quit => {
                self.running = false;
                self.set_status("Exit requested");
                AppCommand::None
            }
            Action::NextTree => self.switch_tree_by_offset(1),
            Action::PrevTree => self.switch_tree_by_offset(-1),
            Action::Down => self.move_selection(1),
            Action::Up => self.move_selection(-1),
            Action::Top => {
                self.selected.insert(self.active_tree, 0);
                AppCommand::None
            }
            Action::Bottom => {
                let count = self.visible_rows(self.active_tree).len();
                self.selected
                    .insert(self.active_tree, count.saturating_sub(1));
                AppCommand::None
            }
            Action::Activate => self.activate_selected(),
            Action::Refresh => {
                self.set_status(format!("Refreshing {}…", self.active_tree.title()));
                AppCommand::RefreshTree(self.active_tree)
            }
            Action::SetDefault => match self.selected_row().map(|row| row.kind) {
                Some(RowKind::Profile(profile)) => AppCommand::SetDefaultProfile(profile),
                _ => {
                    self.set_status("Select a profile to make it the default");
                    AppCommand::None
                }
            },
            Action::RemoveSelected => match self.selected_row().map(|row| row.kind) {
                Some(RowKind::Profile(profile)) => AppCommand::RemoveProfile(profile),
                Some(RowKind::Environment(environment)) => {
                    AppCommand::EndEnvironment(environment)
                }
                _ => {
                    self.set_status("Select a profile or an environment first");
                    AppCommand::None
                }
            },
            Action::OpenLogin => AppCommand::OpenLogin,
            Action::FocusPanel => {
                if self.panel.is_some() {
                    self.mode = InputMode::Form;
                }
                AppCommand::None
            }
            Action::FocusTrees => {
                self.mode = InputMode::Normal;
                AppCommand::None
            }
            Action::ClosePanel => match self.panel.take() {
                Some(view) => {
                    self.mode = InputMode::Normal;
                    AppCommand::ClosePanel(view.content.kind)
                }
                None => AppCommand::None,
            },
            Action::ToggleHelp => {
                self.show_help = !self.show_help;
                AppCommand::None
            }
            Action::ConfirmYes | Action::ConfirmNo => AppCommand::None,
            Action::NextField => self.move_focus(1),
            Action::PrevField => self.move_focus(-1),
            Action::Submit => self.panel_command(|view| view.submit_action()),
            Action::ReloadPanel => {
                self.panel_command(|view| view.has_action("reload").then_some("reload"))
            }
            Action::EndFromPanel => {
                self.panel_command(|view| view.has_action("end").then_some("end"))
            }
            Action::Backspace => {
                if let Some(field) = self.focused_field() {
                    field.value.pop();
                }
                AppCommand::None
            }
            Action::InputChar(c) => {
                if let Some(field) = self.focused_field() {
                    field.value.push(c);
                }
                AppCommand::None
            }
        }
    }

    fn switch_tree_by_offset(&mut self, offset: isize) -> AppCommand {
        let trees = TreeKind::ALL;
        let current = trees
            .iter()
            .position(|tree| *tree == self.active_tree)
            .unwrap_or(0) as isize;
        let next = (current + offset).rem_euclid(trees.len() as isize) as usize;
        self.active_tree = trees[next];
        AppCommand::None
    }

    fn move_selection(&mut self, offset: isize) -> AppCommand {
        let count = self.visible_rows(self.active_tree).len();
        if count == 0 {
            return AppCommand::None;
        }
        let current = self.selected.get(&self.active_tree).copied().unwrap_or(0) as isize;
        let next = (current + offset).clamp(0, count as isize - 1) as usize;
        self.selected.insert(self.active_tree, next);
        AppCommand::None
    }

    fn activate_selected(&mut self) -> AppCommand {
        let Some(row) = self.selected_row() else {
            return AppCommand::None;
        };
        if let Some(profile) = row.profile() {
            if !self.expanded.remove(&profile.name) {
                self.expanded.insert(profile.name.clone());
            }
            return AppCommand::None;
        }
        match row.action() {
            Some(RowAction::OpenLogin) => AppCommand::OpenLogin,
            Some(RowAction::OpenStartEnvironment(subject)) => AppCommand::OpenStart(subject),
            Some(RowAction::OpenEnvironmentDetails(environment)) => {
                AppCommand::OpenDetails(environment)
            }
            None => AppCommand::None,
        }
    }

    fn move_focus(&mut self, offset: isize) -> AppCommand {
        if let Some(view) = self.panel.as_mut() {
            let slots = view.slots();
            if slots > 0 {
                view.focus = (view.focus as isize + offset).rem_euclid(slots as isize) as usize;
            }
        }
        AppCommand::None
    }

    fn focused_field(&mut self) -> Option<&mut FormField> {
        let view = self.panel.as_mut()?;
        view.fields.get_mut(view.focus)
    }

    fn panel_command(&mut self, pick: impl Fn(&PanelView) -> Option<&'static str>) -> AppCommand {
        let Some(view) = self.panel.as_ref() else {
            return AppCommand::None;
        };
        if view.content.loading {
            self.set_status("Panel is still loading");
            return AppCommand::None;
        }
        match pick(view) {
            Some(name) => AppCommand::Panel(view.content.kind, view.message(name)),
            None => AppCommand::None,
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
