mod details;
mod login;
mod start;

pub use details::DetailsPanel;
pub use login::LoginPanel;
pub use start::StartPanel;

use crate::error::{BusError, PanelError};
use crate::events::{EventSink, Notice, PanelKind, Prompter, ViewEvent};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// A message posted by a panel form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum PanelMessage {
    RunCommand {
        name: String,
        #[serde(flatten)]
        fields: Map<String, Value>,
    },
    Alert {
        text: String,
    },
}

impl PanelMessage {
    pub fn run(name: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self::RunCommand {
            name: name.into(),
            fields,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PanelOutcome {
    Stay,
    Close,
    Reload,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FieldTarget {
    Top,
    Input,
    Artifact,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FormField {
    pub key: String,
    pub label: String,
    pub value: String,
    pub required: bool,
    pub masked: bool,
    pub target: FieldTarget,
}

impl FormField {
    pub fn top(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            value: String::new(),
            required: false,
            masked: false,
            target: FieldTarget::Top,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn masked(mut self) -> Self {
        self.masked = true;
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn in_group(mut self, target: FieldTarget) -> Self {
        self.target = target;
        self
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PanelAction {
    pub name: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Section {
    pub heading: String,
    pub lines: Vec<(String, String)>,
}

impl Section {
    pub fn new(heading: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            lines: Vec::new(),
        }
    }

    pub fn line(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.lines.push((key.into(), value.into()));
        self
    }
}

/// A renderable snapshot of one open panel.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PanelContent {
    pub kind: PanelKind,
    pub instance: u64,
    pub subject_key: String,
    pub heading: String,
    pub loading: bool,
    pub sections: Vec<Section>,
    pub fields: Vec<FormField>,
    pub actions: Vec<PanelAction>,
    pub notice: Option<String>,
}

impl PanelContent {
    pub fn new(heading: impl Into<String>) -> Self {
        Self {
            kind: PanelKind::Login,
            instance: 0,
            subject_key: String::new(),
            heading: heading.into(),
            loading: false,
            sections: Vec::new(),
            fields: Vec::new(),
            actions: Vec::new(),
            notice: None,
        }
    }
}

/// Turns edited form fields back into a `run-command` field map.
pub fn collect_fields(fields: &[FormField]) -> Map<String, Value> {
    let mut collected = Map::new();
    for field in fields {
        let value = Value::String(field.value.clone());
        let group = match field.target {
            FieldTarget::Top => {
                collected.insert(field.key.clone(), value);
                continue;
            }
            FieldTarget::Input => "inputs",
            FieldTarget::Artifact => "artifacts",
        };
        if let Value::Object(entries) = collected
            .entry(group)
            .or_insert_with(|| Value::Object(Map::new()))
        {
            entries.insert(field.key.clone(), value);
        }
    }
    collected
}

/// Feature half of a panel: what it shows and what its buttons do.
#[async_trait]
pub trait PanelBehavior: Send + Sync + 'static {
    type Subject: Clone + Send + Sync + 'static;
    type Data: Clone + Send + Sync + 'static;

    const KIND: PanelKind;

    fn subject_key(subject: &Self::Subject) -> String;

    async fn load(&self, subject: &Self::Subject) -> Result<Self::Data, BusError>;

    /// `data` is `None` while loading or after a failed load.
    fn render(&self, subject: &Self::Subject, data: Option<&Self::Data>) -> PanelContent;

    async fn handle(
        &self,
        subject: &Self::Subject,
        data: Option<&Self::Data>,
        name: &str,
        fields: &Map<String, Value>,
    ) -> Result<PanelOutcome, PanelError>;
}

#[derive(Debug, Clone)]
enum Phase<D> {
    Loading,
    Ready(D),
    Unavailable(String),
}

struct PanelInstance<B: PanelBehavior> {
    id: u64,
    generation: u64,
    subject: B::Subject,
    phase: Phase<B::Data>,
    notice: Option<String>,
}

/// Lifecycle shared by every panel kind: one live instance at most,
/// `Loading -> Ready`, and responses tagged by instance and load generation.
pub struct PanelController<B: PanelBehavior> {
    behavior: B,
    prompter: Arc<dyn Prompter>,
    events: EventSink,
    slot: Mutex<Option<PanelInstance<B>>>,
    instances: AtomicU64,
}

impl<B: PanelBehavior> PanelController<B> {
    pub fn new(behavior: B, prompter: Arc<dyn Prompter>, events: EventSink) -> Self {
        Self {
            behavior,
            prompter,
            events,
            slot: Mutex::new(None),
            instances: AtomicU64::new(0),
        }
    }

    /// Opens the panel, or retargets the live one at `subject`.
    pub async fn create_or_show(&self, subject: B::Subject) {
        let (id, generation) = {
            let mut slot = self.slot();
            match slot.as_mut() {
                Some(instance) => {
                    debug!(
                        "{} panel retargeted to {}",
                        B::KIND.title(),
                        B::subject_key(&subject)
                    );
                    instance.subject = subject.clone();
                    instance.generation += 1;
                    instance.phase = Phase::Loading;
                    instance.notice = None;
                    (instance.id, instance.generation)
                }
                None => {
                    let id = self.instances.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!("{} panel opened (instance {id})", B::KIND.title());
                    *slot = Some(PanelInstance {
                        id,
                        generation: 1,
                        subject: subject.clone(),
                        phase: Phase::Loading,
                        notice: None,
                    });
                    (id, 1)
                }
            }
        };
        self.changed();
        self.load(id, generation, subject).await;
    }

    pub async fn reload(&self) {
        let next = {
            let mut slot = self.slot();
            slot.as_mut().map(|instance| {
                instance.generation += 1;
                instance.phase = Phase::Loading;
                instance.notice = None;
                (instance.id, instance.generation, instance.subject.clone())
            })
        };
        let Some((id, generation, subject)) = next else {
            debug!("{} panel reload ignored, panel is closed", B::KIND.title());
            return;
        };
        self.changed();
        self.load(id, generation, subject).await;
    }

    pub async fn dispatch(&self, message: PanelMessage) {
        let (name, fields) = match message {
            PanelMessage::Alert { text } => {
                self.prompter.notify(Notice::error(text));
                return;
            }
            PanelMessage::RunCommand { name, fields } => (name, fields),
        };

        let current = {
            let slot = self.slot();
            slot.as_ref().map(|instance| {
                let data = match &instance.phase {
                    Phase::Ready(data) => Some(data.clone()),
                    Phase::Loading | Phase::Unavailable(_) => None,
                };
                (instance.id, instance.subject.clone(), data)
            })
        };
        let Some((id, subject, data)) = current else {
            debug!("{} panel closed, dropping `{name}`", B::KIND.title());
            return;
        };

        match self
            .behavior
            .handle(&subject, data.as_ref(), &name, &fields)
            .await
        {
            Ok(PanelOutcome::Stay) => {}
            Ok(PanelOutcome::Reload) => self.reload().await,
            Ok(PanelOutcome::Close) => self.close_instance(id),
            Err(PanelError::UnknownAction(action)) => {
                warn!("{} panel has no `{action}` action", B::KIND.title());
            }
            Err(error) => {
                debug!("{} panel `{name}` failed: {error}", B::KIND.title());
                self.prompter.notify(Notice::error(error.to_string()));
                let mut slot = self.slot();
                if let Some(instance) = slot.as_mut().filter(|instance| instance.id == id) {
                    instance.notice = Some(error.to_string());
                }
                drop(slot);
                self.changed();
            }
        }
    }

    pub fn dispose(&self) {
        if self.slot().take().is_some() {
            debug!("{} panel disposed", B::KIND.title());
            self.changed();
        }
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.slot().is_some()
    }

    pub fn content(&self) -> Option<PanelContent> {
        let slot = self.slot();
        let instance = slot.as_ref()?;
        let data = match &instance.phase {
            Phase::Ready(data) => Some(data),
            Phase::Loading | Phase::Unavailable(_) => None,
        };

        let mut content = self.behavior.render(&instance.subject, data);
        content.kind = B::KIND;
        content.instance = instance.id;
        content.subject_key = B::subject_key(&instance.subject);
        content.loading = matches!(instance.phase, Phase::Loading);
        content.notice = match &instance.phase {
            Phase::Unavailable(reason) => Some(reason.clone()),
            _ => instance.notice.clone(),
        };
        Some(content)
    }

    async fn load(&self, id: u64, generation: u64, subject: B::Subject) {
        let result = self.behavior.load(&subject).await;

        let mut slot = self.slot();
        let Some(instance) = slot
            .as_mut()
            .filter(|instance| instance.id == id && instance.generation == generation)
        else {
            debug!(
                "dropping stale {} panel load for {}",
                B::KIND.title(),
                B::subject_key(&subject)
            );
            return;
        };
        instance.phase = match result {
            Ok(data) => Phase::Ready(data),
            Err(error) => {
                warn!("{} panel failed to load: {error}", B::KIND.title());
                Phase::Unavailable(error.to_string())
            }
        };
        drop(slot);
        self.changed();
    }

    fn close_instance(&self, id: u64) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|instance| instance.id == id) {
            *slot = None;
            drop(slot);
            debug!("{} panel closed", B::KIND.title());
            self.changed();
        }
    }

    fn changed(&self) {
        self.events.emit(ViewEvent::PanelUpdated(B::KIND));
    }

    fn slot(&self) -> MutexGuard<'_, Option<PanelInstance<B>>> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Reads a text field, accepting numbers and treating null as empty.
pub(crate) fn text_field(fields: &Map<String, Value>, key: &str) -> String {
    match fields.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.trim().to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FieldTarget, FormField, PanelBehavior, PanelContent, PanelController, PanelMessage,
        PanelOutcome, collect_fields,
    };
    use crate::error::{BusError, PanelError};
    use crate::events::{NoticeLevel, PanelKind};
    use crate::test_support::{ScriptedPrompter, events};
    use async_trait::async_trait;
    use serde_json::{Map, Value, json};
    use std::sync::Arc;
    use std::time::Duration;

    /// Echoes its subject after a subject-controlled delay.
    struct Echo;

    #[async_trait]
    impl PanelBehavior for Echo {
        type Subject = (String, u64);
        type Data = String;

        const KIND: PanelKind = PanelKind::EnvironmentDetails;

        fn subject_key(subject: &Self::Subject) -> String {
            subject.0.clone()
        }

        async fn load(&self, subject: &Self::Subject) -> Result<String, BusError> {
            tokio::time::sleep(Duration::from_millis(subject.1)).await;
            if subject.0 == "broken" {
                return Err(BusError::Unreachable("gone".to_string()));
            }
            Ok(format!("loaded {}", subject.0))
        }

        fn render(&self, _subject: &Self::Subject, data: Option<&String>) -> PanelContent {
            PanelContent::new(data.cloned().unwrap_or_default())
        }

        async fn handle(
            &self,
            _subject: &Self::Subject,
            _data: Option<&String>,
            name: &str,
            _fields: &Map<String, Value>,
        ) -> Result<PanelOutcome, PanelError> {
            match name {
                "close" => Ok(PanelOutcome::Close),
                "reload" => Ok(PanelOutcome::Reload),
                "fail" => Err(BusError::Rejected("nope".to_string()).into()),
                other => Err(PanelError::UnknownAction(other.to_string())),
            }
        }
    }

    fn controller() -> (PanelController<Echo>, Arc<ScriptedPrompter>) {
        let prompter = Arc::new(ScriptedPrompter::default());
        let (sink, _rx) = events();
        (PanelController::new(Echo, prompter.clone(), sink), prompter)
    }

    #[test]
    fn envelope_deserializes_with_flattened_fields() {
        let message: PanelMessage = serde_json::from_value(json!({
            "command": "run-command",
            "name": "login",
            "profile": "dev",
        }))
        .expect("envelope parses");
        let PanelMessage::RunCommand { name, fields } = message else {
            panic!("expected run-command");
        };
        assert_eq!(name, "login");
        assert_eq!(fields.get("profile"), Some(&json!("dev")));

        let alert: PanelMessage =
            serde_json::from_value(json!({"command": "alert", "text": "bad"})).expect("alert");
        assert_eq!(alert, PanelMessage::Alert { text: "bad".to_string() });
    }

    #[test]
    fn form_fields_are_grouped_by_target() {
        let fields = vec![
            FormField::top("duration", "Duration").with_value("30"),
            FormField::top("size", "size").in_group(FieldTarget::Input).with_value("3"),
            FormField::top("app", "app").in_group(FieldTarget::Artifact).with_value("a.zip"),
        ];
        assert_eq!(
            Value::Object(collect_fields(&fields)),
            json!({"duration": "30", "inputs": {"size": "3"}, "artifacts": {"app": "a.zip"}})
        );
    }

    #[tokio::test]
    async fn second_open_retargets_the_single_instance() {
        let (panel, _) = controller();

        panel.create_or_show(("a".to_string(), 0)).await;
        let first = panel.content().expect("open");
        panel.create_or_show(("b".to_string(), 0)).await;
        let second = panel.content().expect("open");

        assert_eq!(first.instance, second.instance);
        assert_eq!(second.subject_key, "b");
        assert_eq!(second.heading, "loaded b");
    }

    #[tokio::test]
    async fn late_load_for_an_older_subject_is_ignored() {
        let (panel, _) = controller();

        tokio::join!(panel.create_or_show(("slow".to_string(), 60)), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            panel.create_or_show(("fast".to_string(), 0)).await;
        });

        let content = panel.content().expect("open");
        assert_eq!(content.subject_key, "fast");
        assert_eq!(content.heading, "loaded fast");
        assert!(!content.loading);
    }

    #[tokio::test]
    async fn disposed_panel_ignores_late_results_and_messages() {
        let (panel, _) = controller();

        tokio::join!(panel.create_or_show(("late".to_string(), 40)), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            panel.dispose();
        });
        assert!(!panel.is_open());

        panel.dispatch(PanelMessage::run("fail", Map::new())).await;
        assert!(panel.content().is_none());

        panel.create_or_show(("fresh".to_string(), 0)).await;
        let content = panel.content().expect("reopened");
        assert_eq!(content.heading, "loaded fresh");
        assert_eq!(content.notice, None);
    }

    #[tokio::test]
    async fn handler_errors_stay_open_with_a_notice() {
        let (panel, prompter) = controller();
        panel.create_or_show(("a".to_string(), 0)).await;

        panel.dispatch(PanelMessage::run("fail", Map::new())).await;

        assert!(panel.is_open());
        assert_eq!(panel.content().and_then(|c| c.notice).as_deref(), Some("nope"));
        assert_eq!(prompter.errors(), vec!["nope".to_string()]);

        panel.dispatch(PanelMessage::run("close", Map::new())).await;
        assert!(!panel.is_open());
    }

    #[tokio::test]
    async fn failed_load_is_shown_in_place() {
        let (panel, _) = controller();
        panel.create_or_show(("broken".to_string(), 0)).await;

        let content = panel.content().expect("open");
        assert!(!content.loading);
        assert_eq!(content.notice.as_deref(), Some("backend unavailable: gone"));
    }

    #[tokio::test]
    async fn alerts_surface_as_error_notices() {
        let (panel, prompter) = controller();
        panel
            .dispatch(PanelMessage::Alert {
                text: "invalid input".to_string(),
            })
            .await;

        let notices = prompter.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
    }
}
