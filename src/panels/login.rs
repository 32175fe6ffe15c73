use super::{FormField, PanelAction, PanelBehavior, PanelContent, PanelOutcome, text_field};
use crate::bus::{CommandBus, Credentials, LoginRequest};
use crate::error::{BusError, PanelError, ValidationError};
use crate::events::{EventSink, Notice, PanelKind, Prompter, TreeKind};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

pub struct LoginPanel {
    bus: Arc<dyn CommandBus>,
    prompter: Arc<dyn Prompter>,
    events: EventSink,
}

impl LoginPanel {
    pub fn new(bus: Arc<dyn CommandBus>, prompter: Arc<dyn Prompter>, events: EventSink) -> Self {
        Self {
            bus,
            prompter,
            events,
        }
    }
}

#[async_trait]
impl PanelBehavior for LoginPanel {
    type Subject = ();
    type Data = ();

    const KIND: PanelKind = PanelKind::Login;

    fn subject_key(_subject: &()) -> String {
        "login".to_string()
    }

    async fn load(&self, _subject: &()) -> Result<(), BusError> {
        Ok(())
    }

    fn render(&self, _subject: &(), _data: Option<&()>) -> PanelContent {
        let mut content = PanelContent::new(PanelKind::Login.title());
        content.fields = vec![
            FormField::top("profile", "Profile Name").required(),
            FormField::top("account", "Torque Account").required(),
            FormField::top("space", "Torque Space").required(),
            FormField::top("email", "Email"),
            FormField::top("password", "Password").masked(),
            FormField::top("token", "Token").masked(),
        ];
        content.actions = vec![PanelAction {
            name: "login",
            label: "Login",
        }];
        content
    }

    async fn handle(
        &self,
        _subject: &(),
        _data: Option<&()>,
        name: &str,
        fields: &Map<String, Value>,
    ) -> Result<PanelOutcome, PanelError> {
        if name != "login" {
            return Err(PanelError::UnknownAction(name.to_string()));
        }

        let request = login_request(fields)?;
        self.bus.login(&request).await?;

        info!("profile '{}' added", request.profile);
        self.prompter.notify(Notice::info("Profile has been added"));
        self.events.refresh(TreeKind::Profiles);
        Ok(PanelOutcome::Close)
    }
}

/// Email and password win over a token when both are given.
pub fn login_request(fields: &Map<String, Value>) -> Result<LoginRequest, ValidationError> {
    let profile = text_field(fields, "profile");
    let account = text_field(fields, "account");
    let space = text_field(fields, "space");

    if profile.is_empty() {
        return Err(ValidationError::MissingField("profile".to_string()));
    }
    if profile.contains(char::is_whitespace) {
        return Err(ValidationError::ContainsWhitespace("profile name"));
    }
    if account.is_empty() {
        return Err(ValidationError::MissingField("account".to_string()));
    }
    if space.is_empty() {
        return Err(ValidationError::MissingField("space".to_string()));
    }
    if space.contains(char::is_whitespace) {
        return Err(ValidationError::ContainsWhitespace("space name"));
    }

    let email = text_field(fields, "email");
    let password = fields
        .get("password")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let token = text_field(fields, "token");
    let credentials = if !email.is_empty() && !password.is_empty() {
        Credentials::Password { email, password }
    } else if !token.is_empty() {
        Credentials::Token(token)
    } else {
        return Err(ValidationError::MissingCredentials);
    };

    Ok(LoginRequest {
        profile,
        account,
        space,
        credentials,
    })
}
