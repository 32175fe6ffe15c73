use crate::bus::{CommandBus, LoginRequest, StartEnvironmentRequest};
use crate::config::{ActiveProfileState, MemorySettings, Settings, SettingsStore};
use crate::error::BusError;
use crate::events::{ConfirmRequest, EventSink, Notice, NoticeLevel, Prompter, TreeKind, ViewEvent};
use crate::model::{BlueprintSummary, EnvironmentDetail, EnvironmentSummary, Profile};
use crate::store::ActiveProfileStore;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BusCall {
    ListProfiles,
    RemoveProfile(String),
    Login(LoginRequest),
    ListBlueprints,
    GetBlueprint(String, Option<String>),
    ListEnvironments,
    GetEnvironment(String),
    StartEnvironment(StartEnvironmentRequest),
    EndEnvironment(String),
}

/// Recording in-memory backend.
pub struct FakeBus {
    profiles: Mutex<Result<Vec<Profile>, BusError>>,
    blueprints: Mutex<Result<Vec<BlueprintSummary>, BusError>>,
    blueprint_detail: Mutex<Result<BlueprintSummary, BusError>>,
    environments: Mutex<Vec<Result<Vec<EnvironmentSummary>, BusError>>>,
    environment_delays: Mutex<VecDeque<Duration>>,
    environment_detail: Mutex<Result<EnvironmentDetail, BusError>>,
    login_result: Mutex<Result<(), BusError>>,
    start_result: Mutex<Result<(), BusError>>,
    end_result: Mutex<Result<(), BusError>>,
    remove_result: Mutex<Result<(), BusError>>,
    calls: Mutex<Vec<BusCall>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self {
            profiles: Mutex::new(Ok(Vec::new())),
            blueprints: Mutex::new(Ok(Vec::new())),
            blueprint_detail: Mutex::new(Err(BusError::Unreachable("no detail".to_string()))),
            environments: Mutex::new(vec![Ok(Vec::new())]),
            environment_delays: Mutex::new(VecDeque::new()),
            environment_detail: Mutex::new(Ok(EnvironmentDetail::default())),
            login_result: Mutex::new(Ok(())),
            start_result: Mutex::new(Ok(())),
            end_result: Mutex::new(Ok(())),
            remove_result: Mutex::new(Ok(())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_profiles(self, profiles: Vec<Profile>) -> Self {
        *self.profiles.lock().expect("profiles") = Ok(profiles);
        self
    }

    pub fn with_blueprints(self, blueprints: Vec<BlueprintSummary>) -> Self {
        *self.blueprints.lock().expect("blueprints") = Ok(blueprints);
        self
    }

    pub fn with_blueprint_detail(self, detail: BlueprintSummary) -> Self {
        *self.blueprint_detail.lock().expect("detail") = Ok(detail);
        self
    }

    pub fn with_environments(self, environments: Vec<EnvironmentSummary>) -> Self {
        *self.environments.lock().expect("environments") = vec![Ok(environments)];
        self
    }

    /// Successive `list_environments` answers; the last one repeats.
    pub fn with_environment_sequence(
        self,
        answers: Vec<Result<Vec<EnvironmentSummary>, BusError>>,
        delays: Vec<Duration>,
    ) -> Self {
        *self.environments.lock().expect("environments") = answers;
        *self.environment_delays.lock().expect("delays") = delays.into();
        self
    }

    pub fn with_environment_detail(self, detail: Result<EnvironmentDetail, BusError>) -> Self {
        *self.environment_detail.lock().expect("detail") = detail;
        self
    }

    pub fn fail_profiles(&self, error: BusError) {
        *self.profiles.lock().expect("profiles") = Err(error);
    }

    pub fn fail_blueprints(&self, error: BusError) {
        *self.blueprints.lock().expect("blueprints") = Err(error);
    }

    pub fn set_login_result(&self, result: Result<(), BusError>) {
        *self.login_result.lock().expect("login") = result;
    }

    pub fn set_start_result(&self, result: Result<(), BusError>) {
        *self.start_result.lock().expect("start") = result;
    }

    pub fn set_end_result(&self, result: Result<(), BusError>) {
        *self.end_result.lock().expect("end") = result;
    }

    pub fn set_remove_result(&self, result: Result<(), BusError>) {
        *self.remove_result.lock().expect("remove") = result;
    }

    pub fn calls(&self) -> Vec<BusCall> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn count(&self, matcher: impl Fn(&BusCall) -> bool) -> usize {
        self.calls().iter().filter(|call| matcher(call)).count()
    }

    fn record(&self, call: BusCall) {
        self.calls.lock().expect("calls").push(call);
    }
}

#[async_trait]
impl CommandBus for FakeBus {
    async fn list_profiles(&self) -> Result<Vec<Profile>, BusError> {
        self.record(BusCall::ListProfiles);
        self.profiles.lock().expect("profiles").clone()
    }

    async fn remove_profile(&self, profile_name: &str) -> Result<(), BusError> {
        self.record(BusCall::RemoveProfile(profile_name.to_string()));
        let result = self.remove_result.lock().expect("remove").clone();
        if result.is_ok()
            && let Ok(profiles) = self.profiles.lock().expect("profiles").as_mut()
        {
            profiles.retain(|profile| profile.name != profile_name);
        }
        result
    }

    async fn login(&self, request: &LoginRequest) -> Result<(), BusError> {
        self.record(BusCall::Login(request.clone()));
        self.login_result.lock().expect("login").clone()
    }

    async fn list_blueprints(&self) -> Result<Vec<BlueprintSummary>, BusError> {
        self.record(BusCall::ListBlueprints);
        self.blueprints.lock().expect("blueprints").clone()
    }

    async fn get_blueprint(
        &self,
        blueprint_name: &str,
        source_ref: Option<&str>,
    ) -> Result<BlueprintSummary, BusError> {
        self.record(BusCall::GetBlueprint(
            blueprint_name.to_string(),
            source_ref.map(str::to_string),
        ));
        self.blueprint_detail.lock().expect("detail").clone()
    }

    async fn list_environments(&self) -> Result<Vec<EnvironmentSummary>, BusError> {
        self.record(BusCall::ListEnvironments);
        let answer = {
            let mut answers = self.environments.lock().expect("environments");
            if answers.len() > 1 {
                answers.remove(0)
            } else {
                answers.first().cloned().unwrap_or_else(|| Ok(Vec::new()))
            }
        };
        let delay = self.environment_delays.lock().expect("delays").pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        answer
    }

    async fn get_environment(&self, environment_id: &str) -> Result<EnvironmentDetail, BusError> {
        self.record(BusCall::GetEnvironment(environment_id.to_string()));
        self.environment_detail.lock().expect("detail").clone()
    }

    async fn start_environment(&self, request: &StartEnvironmentRequest) -> Result<(), BusError> {
        self.record(BusCall::StartEnvironment(request.clone()));
        self.start_result.lock().expect("start").clone()
    }

    async fn end_environment(&self, environment_id: &str) -> Result<(), BusError> {
        self.record(BusCall::EndEnvironment(environment_id.to_string()));
        self.end_result.lock().expect("end").clone()
    }
}

/// Answers confirmations from a script and records every notice.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<ConfirmRequest>>,
    notices: Mutex<Vec<Notice>>,
}

impl ScriptedPrompter {
    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            ..Self::default()
        }
    }

    pub fn asked(&self) -> Vec<ConfirmRequest> {
        self.asked.lock().expect("asked").clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("notices").clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter(|notice| notice.level == NoticeLevel::Error)
            .map(|notice| notice.text)
            .collect()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn confirm(&self, request: ConfirmRequest) -> bool {
        self.asked.lock().expect("asked").push(request);
        self.answers
            .lock()
            .expect("answers")
            .pop_front()
            .unwrap_or(false)
    }

    fn notify(&self, notice: Notice) {
        self.notices.lock().expect("notices").push(notice);
    }
}

/// In-memory settings that count how often they are read.
#[derive(Default)]
pub struct CountingSettings {
    inner: MemorySettings,
    loads: AtomicUsize,
}

impl CountingSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: MemorySettings::new(settings),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl SettingsStore for CountingSettings {
    fn load(&self) -> anyhow::Result<Settings> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load()
    }

    fn persist_active(&self, state: &ActiveProfileState) -> anyhow::Result<()> {
        self.inner.persist_active(state)
    }
}

pub fn seeded_settings(active: Option<Profile>) -> Settings {
    let mut settings = Settings::default();
    if let Some(profile) = active {
        settings.active_profile = profile.name;
        settings.active_account = profile.account;
        settings.active_space = profile.space;
    }
    settings
}

pub fn memory_store(active: Option<Profile>) -> Arc<ActiveProfileStore> {
    let settings = MemorySettings::new(seeded_settings(active));
    Arc::new(ActiveProfileStore::new(Arc::new(settings)))
}

pub fn drain_refreshes(rx: &mut UnboundedReceiver<ViewEvent>) -> Vec<TreeKind> {
    let mut refreshed = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ViewEvent::Refresh(tree) = event {
            refreshed.push(tree);
        }
    }
    refreshed
}

pub fn events() -> (EventSink, UnboundedReceiver<ViewEvent>) {
    EventSink::channel()
}

pub fn blueprint(name: &str, enabled: bool, has_errors: bool) -> BlueprintSummary {
    BlueprintSummary {
        name: name.to_string(),
        description: format!("{name} blueprint"),
        enabled,
        has_errors,
        source_ref: Some("main".to_string()),
        ..BlueprintSummary::default()
    }
}

pub fn environment(id: &str, name: &str) -> EnvironmentSummary {
    EnvironmentSummary {
        id: id.to_string(),
        name: name.to_string(),
        blueprint_name: "web".to_string(),
    }
}
