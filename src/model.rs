use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

const SAMPLE_PREFIX: &str = "[Sample]";

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Profile {
    pub name: String,
    pub account: String,
    pub space: String,
}

impl Profile {
    pub fn new(
        name: impl Into<String>,
        account: impl Into<String>,
        space: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            account: account.into(),
            space: space.into(),
        }
    }

    pub fn account_label(&self) -> &str {
        if self.account.is_empty() {
            "undefined"
        } else {
            &self.account
        }
    }

    /// Identity is the profile name; account and space are descriptive.
    pub fn same_identity(&self, other: &Profile) -> bool {
        self.name == other.name
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStyle {
    Masked,
    #[default]
    #[serde(other)]
    Normal,
}

#[derive(Debug, Clone, Eq, PartialEq, Default, Deserialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub display_style: DisplayStyle,
    #[serde(default)]
    pub optional: bool,
    /// Only populated for inputs of a running environment.
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: Option<String>,
}

impl InputSpec {
    pub fn masked(&self) -> bool {
        self.display_style == DisplayStyle::Masked
    }

    pub fn display_value(&self) -> String {
        if self.masked() {
            return "******".to_string();
        }
        self.value
            .clone()
            .or_else(|| self.default_value.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawBlueprint {
    blueprint_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    description: Option<String>,
    #[serde(default)]
    is_sample: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    inputs: Vec<InputSpec>,
    #[serde(default, deserialize_with = "string_map")]
    artifacts: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "lenient_string")]
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    branch: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    repository_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    errors: Vec<Value>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct BlueprintSummary {
    pub name: String,
    pub description: String,
    pub is_sample: bool,
    pub inputs: Vec<InputSpec>,
    pub artifacts: BTreeMap<String, String>,
    pub source_ref: Option<String>,
    pub repository: Option<String>,
    pub has_errors: bool,
    pub enabled: bool,
}

impl BlueprintSummary {
    /// Parses one blueprint object. A `details` wrapper is unwrapped first.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let value = match value {
            Value::Object(mut object) if object.contains_key("details") => object
                .remove("details")
                .unwrap_or(Value::Object(Default::default())),
            other => other,
        };
        let raw: RawBlueprint = serde_json::from_value(value)?;
        let source_ref = raw
            .branch
            .filter(|branch| !branch.is_empty())
            .or_else(|| raw.url.as_deref().and_then(branch_from_url));

        Ok(Self {
            name: raw.blueprint_name,
            description: raw.description.unwrap_or_default(),
            is_sample: raw.is_sample,
            inputs: raw.inputs,
            artifacts: raw.artifacts,
            source_ref,
            repository: raw.repository_name.filter(|name| !name.is_empty()),
            has_errors: !raw.errors.is_empty(),
            enabled: raw.enabled,
        })
    }

    pub fn is_launchable(&self) -> bool {
        self.enabled && !self.has_errors
    }

    pub fn display_name(&self) -> String {
        if !self.is_sample {
            return self.name.clone();
        }
        self.name.replace(SAMPLE_PREFIX, "").trim().to_string()
    }
}

/// Extracts the branch from `…/blob/<branch>/blueprints/…` repository urls.
pub fn branch_from_url(url: &str) -> Option<String> {
    let start = url.find("blob/")? + "blob/".len();
    let rest = &url[start..];
    let end = rest.find("/blueprints")?;
    let branch = &rest[..end];
    (!branch.is_empty()).then(|| branch.to_string())
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize)]
pub struct EnvironmentSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub blueprint_name: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Shortcut {
    pub app_name: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct EnvironmentDetail {
    pub status: String,
    pub scheduled_end: Option<String>,
    pub inputs: Vec<InputSpec>,
    pub artifacts: BTreeMap<String, String>,
    pub shortcuts: Vec<Shortcut>,
}

impl EnvironmentDetail {
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let root = value.get("details").unwrap_or(value);
        if !root.is_object() {
            return Err("environment detail is not a JSON object".to_string());
        }

        let status = root
            .get("computed_status")
            .or_else(|| root.get("status"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let scheduled_end = root
            .pointer("/state/execution/retention/time")
            .or_else(|| root.get("end_time"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let inputs = match root.pointer("/definition/inputs") {
            Some(Value::Array(items)) => items
                .iter()
                .cloned()
                .map(serde_json::from_value::<InputSpec>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|error| format!("invalid environment inputs: {error}"))?,
            _ => Vec::new(),
        };

        let artifacts = root
            .pointer("/definition/artifacts")
            .map(value_to_string_map)
            .unwrap_or_default();

        let shortcuts = match root.pointer("/state/grains") {
            Some(Value::Array(grains)) => grains.iter().filter_map(grain_shortcut).collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            status,
            scheduled_end,
            inputs,
            artifacts,
            shortcuts,
        })
    }

    pub fn scheduled_end_local(&self) -> Option<String> {
        let raw = self.scheduled_end.as_deref()?;
        Some(match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => parsed
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            Err(_) => raw.to_string(),
        })
    }
}

fn grain_shortcut(grain: &Value) -> Option<Shortcut> {
    let urls = grain
        .pointer("/state/shortcuts")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect::<Vec<_>>();
    if urls.is_empty() {
        return None;
    }
    Some(Shortcut {
        app_name: grain
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("-")
            .to_string(),
        urls,
    })
}

fn value_to_string_map(value: &Value) -> BTreeMap<String, String> {
    let Value::Object(object) = value else {
        return BTreeMap::new();
    };
    object
        .iter()
        .map(|(key, value)| (key.clone(), scalar_text(value)))
        .collect()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn enabled_by_default() -> bool {
    true
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(other) => Some(scalar_text(&other)),
    })
}

fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(value_to_string_map).unwrap_or_default())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
