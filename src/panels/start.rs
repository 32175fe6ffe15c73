use super::{
    FieldTarget, FormField, PanelAction, PanelBehavior, PanelContent, PanelOutcome, Section,
    text_field,
};
use crate::bus::{CommandBus, StartEnvironmentRequest};
use crate::error::{BusError, PanelError, ValidationError};
use crate::events::{Notice, PanelKind, Prompter};
use crate::model::{BlueprintSummary, InputSpec};
use crate::store::ActiveProfileStore;
use crate::trees::{EnvironmentTree, StartSubject};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Blueprint detail the form is built from, plus the prefilled duration.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StartForm {
    pub inputs: Vec<InputSpec>,
    pub artifacts: BTreeMap<String, String>,
    pub duration: u32,
}

impl StartForm {
    fn from_subject(subject: &StartSubject, duration: u32) -> Self {
        Self {
            inputs: subject.inputs.clone(),
            artifacts: subject.artifacts.clone(),
            duration,
        }
    }

    fn from_blueprint(blueprint: BlueprintSummary, duration: u32) -> Self {
        Self {
            inputs: blueprint.inputs,
            artifacts: blueprint.artifacts,
            duration,
        }
    }
}

pub struct StartPanel {
    bus: Arc<dyn CommandBus>,
    store: Arc<ActiveProfileStore>,
    prompter: Arc<dyn Prompter>,
    environments: Arc<EnvironmentTree>,
}

impl StartPanel {
    pub fn new(
        bus: Arc<dyn CommandBus>,
        store: Arc<ActiveProfileStore>,
        prompter: Arc<dyn Prompter>,
        environments: Arc<EnvironmentTree>,
    ) -> Self {
        Self {
            bus,
            store,
            prompter,
            environments,
        }
    }

    fn default_duration(&self) -> u32 {
        self.store.settings().default_environment_duration
    }
}

#[async_trait]
impl PanelBehavior for StartPanel {
    type Subject = StartSubject;
    type Data = StartForm;

    const KIND: PanelKind = PanelKind::StartEnvironment;

    fn subject_key(subject: &StartSubject) -> String {
        subject.blueprint_name.clone()
    }

    /// Falls back to the catalog's copy of the blueprint when the detail
    /// query fails, so the form can still be submitted.
    async fn load(&self, subject: &StartSubject) -> Result<StartForm, BusError> {
        let duration = self.default_duration();
        match self
            .bus
            .get_blueprint(&subject.blueprint_name, subject.source_ref.as_deref())
            .await
        {
            Ok(detail) => Ok(StartForm::from_blueprint(detail, duration)),
            Err(error) => {
                warn!(
                    "blueprint '{}' detail unavailable, using catalog data: {error}",
                    subject.blueprint_name
                );
                Ok(StartForm::from_subject(subject, duration))
            }
        }
    }

    fn render(&self, subject: &StartSubject, data: Option<&StartForm>) -> PanelContent {
        let mut content = PanelContent::new("Launch a New Environment");
        let mut overview = Section::new("Blueprint").line("Name", &subject.display_name);
        if let Some(repository) = &subject.repository {
            overview = overview.line("Repository", repository);
        }
        if let Some(source_ref) = &subject.source_ref {
            overview = overview.line("Branch", source_ref);
        }
        content.sections.push(overview);

        let Some(form) = data else {
            return content;
        };

        content.fields.push(FormField::top("sandbox_name", "Environment name"));
        content.fields.push(
            FormField::top("duration", "Duration (minutes)")
                .required()
                .with_value(form.duration.to_string()),
        );
        content.fields.extend(form.inputs.iter().map(|input| {
            let mut field = FormField::top(&input.name, &input.name)
                .in_group(FieldTarget::Input)
                .with_value(input.default_value.clone().unwrap_or_default());
            field.required = !input.optional;
            field.masked = input.masked();
            field
        }));
        content
            .fields
            .extend(form.artifacts.iter().map(|(name, path)| {
                FormField::top(name, &format!("artifact: {name}"))
                    .in_group(FieldTarget::Artifact)
                    .with_value(path)
            }));
        content.actions.push(PanelAction {
            name: "start",
            label: "Start",
        });
        content
    }

    async fn handle(
        &self,
        subject: &StartSubject,
        data: Option<&StartForm>,
        name: &str,
        fields: &Map<String, Value>,
    ) -> Result<PanelOutcome, PanelError> {
        if name != "start" {
            return Err(PanelError::UnknownAction(name.to_string()));
        }

        let request = match data {
            Some(form) => start_request(subject, form, fields)?,
            None => {
                let fallback = StartForm::from_subject(subject, self.default_duration());
                start_request(subject, &fallback, fields)?
            }
        };
        self.bus.start_environment(&request).await?;

        info!(
            "environment requested from '{}' for {} minutes",
            request.blueprint_name, request.duration_minutes
        );
        self.prompter.notify(Notice::info(format!(
            "Environment from '{}' is starting",
            subject.display_name
        )));
        self.environments.refresh();
        Ok(PanelOutcome::Close)
    }
}

fn start_request(
    subject: &StartSubject,
    form: &StartForm,
    fields: &Map<String, Value>,
) -> Result<StartEnvironmentRequest, ValidationError> {
    let raw_duration = text_field(fields, "duration");
    let duration_minutes = raw_duration
        .parse::<u32>()
        .ok()
        .filter(|minutes| *minutes > 0)
        .ok_or_else(|| ValidationError::InvalidDuration(raw_duration.clone()))?;

    let submitted_inputs = string_group(fields, "inputs");
    let mut inputs = BTreeMap::new();
    for spec in &form.inputs {
        let value = submitted_inputs
            .get(&spec.name)
            .cloned()
            .unwrap_or_default();
        if value.trim().is_empty() {
            if !spec.optional {
                return Err(ValidationError::MissingField(spec.name.clone()));
            }
            continue;
        }
        inputs.insert(spec.name.clone(), value);
    }

    let artifacts = string_group(fields, "artifacts")
        .into_iter()
        .filter(|(_, path)| !path.trim().is_empty())
        .collect();

    let environment_name = text_field(fields, "sandbox_name");
    Ok(StartEnvironmentRequest {
        blueprint_name: subject.blueprint_name.clone(),
        environment_name: (!environment_name.is_empty()).then_some(environment_name),
        duration_minutes,
        inputs,
        artifacts,
        source_ref: subject.source_ref.clone(),
    })
}

/// Values are kept verbatim; only the emptiness checks ignore whitespace.
fn string_group(fields: &Map<String, Value>, key: &str) -> BTreeMap<String, String> {
    match fields.get(key) {
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(name, value)| {
                let text = match value {
                    Value::Null => String::new(),
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                (name.clone(), text)
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}
