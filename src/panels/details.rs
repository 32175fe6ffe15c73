use super::{PanelAction, PanelBehavior, PanelContent, PanelOutcome, Section};
use crate::error::{BusError, PanelError};
use crate::events::PanelKind;
use crate::model::{EnvironmentDetail, EnvironmentSummary};
use crate::store::ActiveProfileStore;
use crate::trees::EnvironmentTree;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

const PORTAL_URL: &str = "https://portal.qtorque.io";

pub struct DetailsPanel {
    store: Arc<ActiveProfileStore>,
    environments: Arc<EnvironmentTree>,
}

impl DetailsPanel {
    pub fn new(store: Arc<ActiveProfileStore>, environments: Arc<EnvironmentTree>) -> Self {
        Self {
            store,
            environments,
        }
    }

    fn portal_link(&self, environment_id: &str) -> Option<String> {
        let profile = self.store.get_active()?;
        if profile.account.is_empty() {
            return None;
        }
        Some(format!(
            "{PORTAL_URL}/{}/sandboxes/{environment_id}",
            profile.space
        ))
    }
}

#[async_trait]
impl PanelBehavior for DetailsPanel {
    type Subject = EnvironmentSummary;
    type Data = EnvironmentDetail;

    const KIND: PanelKind = PanelKind::EnvironmentDetails;

    fn subject_key(subject: &EnvironmentSummary) -> String {
        subject.id.clone()
    }

    async fn load(&self, subject: &EnvironmentSummary) -> Result<EnvironmentDetail, BusError> {
        self.environments.environment_detail(&subject.id).await
    }

    fn render(
        &self,
        subject: &EnvironmentSummary,
        data: Option<&EnvironmentDetail>,
    ) -> PanelContent {
        let mut content = PanelContent::new(subject.name.clone());
        content.actions = vec![
            PanelAction {
                name: "reload",
                label: "Refresh",
            },
            PanelAction {
                name: "end",
                label: "End Environment",
            },
        ];

        let mut general = Section::new("General")
            .line("Blueprint", &subject.blueprint_name)
            .line("ID", &subject.id);
        let Some(detail) = data else {
            content.sections.push(general);
            return content;
        };

        general = general.line("Status", &detail.status);
        if let Some(end) = detail.scheduled_end_local() {
            general = general.line("End time", end);
        }
        if let Some(link) = self.portal_link(&subject.id) {
            general = general.line("Open in Torque", link);
        }
        content.sections.push(general);

        if !detail.inputs.is_empty() {
            content.sections.push(Section {
                heading: "Inputs".to_string(),
                lines: detail
                    .inputs
                    .iter()
                    .map(|input| (input.name.clone(), input.display_value()))
                    .collect(),
            });
        }
        if !detail.artifacts.is_empty() {
            content.sections.push(Section {
                heading: "Artifacts".to_string(),
                lines: detail
                    .artifacts
                    .iter()
                    .map(|(name, path)| (name.clone(), path.clone()))
                    .collect(),
            });
        }
        if !detail.shortcuts.is_empty() {
            content.sections.push(Section {
                heading: "Shortcuts".to_string(),
                lines: detail
                    .shortcuts
                    .iter()
                    .map(|shortcut| (shortcut.app_name.clone(), shortcut.urls.join(" ")))
                    .collect(),
            });
        }
        content
    }

    async fn handle(
        &self,
        subject: &EnvironmentSummary,
        _data: Option<&EnvironmentDetail>,
        name: &str,
        _fields: &Map<String, Value>,
    ) -> Result<PanelOutcome, PanelError> {
        match name {
            "reload" => Ok(PanelOutcome::Reload),
            "end" => Ok(if self.environments.end_environment(subject).await {
                PanelOutcome::Close
            } else {
                PanelOutcome::Stay
            }),
            other => Err(PanelError::UnknownAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DetailsPanel;
    use crate::config::RefreshPolicy;
    use crate::model::{DisplayStyle, EnvironmentDetail, InputSpec, Profile};
    use crate::panels::{PanelController, PanelMessage};
    use crate::test_support::{BusCall, FakeBus, ScriptedPrompter, environment, events, memory_store};
    use crate::trees::EnvironmentTree;
    use serde_json::Map;
    use std::sync::Arc;

    fn detail() -> EnvironmentDetail {
        EnvironmentDetail {
            status: "Active".to_string(),
            inputs: vec![InputSpec {
                name: "password".to_string(),
                value: Some("hunter2".to_string()),
                display_style: DisplayStyle::Masked,
                ..InputSpec::default()
            }],
            ..EnvironmentDetail::default()
        }
    }

    fn panel(
        bus: Arc<FakeBus>,
        account: &str,
        answers: &[bool],
    ) -> PanelController<DetailsPanel> {
        let store = memory_store(Some(Profile::new("dev", account, "sandbox")));
        let prompter = Arc::new(ScriptedPrompter::answering(answers));
        let (sink, _rx) = events();
        let environments = Arc::new(EnvironmentTree::new(
            bus,
            store.clone(),
            prompter.clone(),
            sink.clone(),
            RefreshPolicy::Immediate,
        ));
        PanelController::new(DetailsPanel::new(store, environments), prompter, sink)
    }

    fn lines(panel: &PanelController<DetailsPanel>) -> Vec<(String, String)> {
        panel
            .content()
            .expect("open")
            .sections
            .into_iter()
            .flat_map(|section| section.lines)
            .collect()
    }

    #[tokio::test]
    async fn masked_inputs_and_portal_link_are_rendered() {
        let bus = Arc::new(FakeBus::new().with_environment_detail(Ok(detail())));
        let panel = panel(bus, "acme", &[]);

        panel.create_or_show(environment("e1", "demo")).await;

        let lines = lines(&panel);
        assert!(lines.contains(&("password".to_string(), "******".to_string())));
        assert!(lines.contains(&(
            "Open in Torque".to_string(),
            "https://portal.qtorque.io/sandbox/sandboxes/e1".to_string()
        )));
    }

    #[tokio::test]
    async fn portal_link_needs_an_account() {
        let bus = Arc::new(FakeBus::new().with_environment_detail(Ok(detail())));
        let panel = panel(bus, "", &[]);

        panel.create_or_show(environment("e1", "demo")).await;

        assert!(!lines(&panel).iter().any(|(key, _)| key == "Open in Torque"));
    }

    #[tokio::test]
    async fn reload_fetches_detail_again() {
        let bus = Arc::new(FakeBus::new().with_environment_detail(Ok(detail())));
        let panel = panel(bus.clone(), "acme", &[]);
        panel.create_or_show(environment("e1", "demo")).await;

        panel.dispatch(PanelMessage::run("reload", Map::new())).await;

        assert_eq!(
            bus.count(|call| matches!(call, BusCall::GetEnvironment(id) if id == "e1")),
            2
        );
        assert!(panel.is_open());
    }

    #[tokio::test]
    async fn end_closes_only_when_confirmed() {
        let bus = Arc::new(FakeBus::new().with_environment_detail(Ok(detail())));
        let panel = panel(bus.clone(), "acme", &[false, true]);
        panel.create_or_show(environment("e1", "demo")).await;

        panel.dispatch(PanelMessage::run("end", Map::new())).await;
        assert!(panel.is_open());
        assert_eq!(bus.count(|call| matches!(call, BusCall::EndEnvironment(_))), 0);

        panel.dispatch(PanelMessage::run("end", Map::new())).await;
        assert!(!panel.is_open());
        assert_eq!(bus.count(|call| matches!(call, BusCall::EndEnvironment(_))), 1);
    }

    #[tokio::test]
    async fn reopening_shows_the_latest_environment() {
        let bus = Arc::new(FakeBus::new().with_environment_detail(Ok(detail())));
        let panel = panel(bus, "acme", &[]);

        panel.create_or_show(environment("e1", "first")).await;
        panel.create_or_show(environment("e2", "second")).await;

        let content = panel.content().expect("open");
        assert_eq!(content.subject_key, "e2");
        assert_eq!(content.heading, "second");
    }
}
