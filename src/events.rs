use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum TreeKind {
    Profiles,
    Catalog,
    Environments,
}

impl TreeKind {
    pub const ALL: [Self; 3] = [Self::Profiles, Self::Catalog, Self::Environments];

    pub fn title(self) -> &'static str {
        match self {
            Self::Profiles => "Profiles",
            Self::Catalog => "Blueprints",
            Self::Environments => "Environments",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum PanelKind {
    Login,
    StartEnvironment,
    EnvironmentDetails,
}

impl PanelKind {
    pub const ALL: [Self; 3] = [Self::Login, Self::StartEnvironment, Self::EnvironmentDetails];

    pub fn title(self) -> &'static str {
        match self {
            Self::Login => "Login to Torque",
            Self::StartEnvironment => "Start Environment",
            Self::EnvironmentDetails => "Environment Details",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

/// A two-option question shown before destructive work.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConfirmRequest {
    pub message: String,
    pub accept: String,
    pub reject: String,
}

impl ConfirmRequest {
    pub fn yes_no(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            accept: "Yes".to_string(),
            reject: "No".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ViewEvent {
    /// Ask the host to re-run the root query of a tree.
    Refresh(TreeKind),
    /// A tree published a new snapshot.
    TreeUpdated(TreeKind),
    /// A panel opened, changed phase or subject, or closed.
    PanelUpdated(PanelKind),
    Notice(Notice),
    Confirm {
        request: ConfirmRequest,
        reply: oneshot::Sender<bool>,
    },
}

/// Cheap, cloneable handle controllers use to talk to the host loop.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ViewEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ViewEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: ViewEvent) {
        if let Err(error) = self.tx.send(event) {
            debug!("view event dropped, host loop is gone: {:?}", error.0);
        }
    }

    pub fn refresh(&self, tree: TreeKind) {
        self.emit(ViewEvent::Refresh(tree));
    }

    /// Catalog and environments depend on the active profile.
    pub fn refresh_dependents(&self) {
        self.refresh(TreeKind::Catalog);
        self.refresh(TreeKind::Environments);
    }

    pub fn refresh_all(&self) {
        self.refresh(TreeKind::Profiles);
        self.refresh_dependents();
    }
}

#[async_trait]
pub trait Prompter: Send + Sync {
    async fn confirm(&self, request: ConfirmRequest) -> bool;
    fn notify(&self, notice: Notice);
}

/// Routes prompts and notices through the host loop's event channel.
pub struct ChannelPrompter {
    events: EventSink,
}

impl ChannelPrompter {
    pub fn new(events: EventSink) -> Self {
        Self { events }
    }
}

#[async_trait]
impl Prompter for ChannelPrompter {
    async fn confirm(&self, request: ConfirmRequest) -> bool {
        let (reply, answer) = oneshot::channel();
        self.events.emit(ViewEvent::Confirm { request, reply });
        match answer.await {
            Ok(accepted) => accepted,
            Err(_) => {
                warn!("confirmation dismissed without an answer");
                false
            }
        }
    }

    fn notify(&self, notice: Notice) {
        self.events.emit(ViewEvent::Notice(notice));
    }
}
