use crate::error::BusError;
use crate::model::{BlueprintSummary, EnvironmentDetail, EnvironmentSummary, Profile};
use crate::store::ActiveProfileStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

const CALL_TIMEOUT: Duration = Duration::from_secs(60);
const START_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Credentials {
    Password { email: String, password: String },
    Token(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LoginRequest {
    pub profile: String,
    pub account: String,
    pub space: String,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StartEnvironmentRequest {
    pub blueprint_name: String,
    pub environment_name: Option<String>,
    pub duration_minutes: u32,
    pub inputs: BTreeMap<String, String>,
    pub artifacts: BTreeMap<String, String>,
    pub source_ref: Option<String>,
}

/// Every backend operation the views need, one typed method each.
#[async_trait]
pub trait CommandBus: Send + Sync {
    async fn list_profiles(&self) -> Result<Vec<Profile>, BusError>;
    async fn remove_profile(&self, profile_name: &str) -> Result<(), BusError>;
    async fn login(&self, request: &LoginRequest) -> Result<(), BusError>;
    async fn list_blueprints(&self) -> Result<Vec<BlueprintSummary>, BusError>;
    async fn get_blueprint(
        &self,
        blueprint_name: &str,
        source_ref: Option<&str>,
    ) -> Result<BlueprintSummary, BusError>;
    async fn list_environments(&self) -> Result<Vec<EnvironmentSummary>, BusError>;
    async fn get_environment(&self, environment_id: &str) -> Result<EnvironmentDetail, BusError>;
    async fn start_environment(&self, request: &StartEnvironmentRequest) -> Result<(), BusError>;
    async fn end_environment(&self, environment_id: &str) -> Result<(), BusError>;
}

#[derive(Debug)]
struct CliOutput {
    stdout: String,
    stderr: String,
}

/// Drives the `torque` command line client as the backend process.
pub struct CliCommandBus {
    program: String,
    store: Arc<ActiveProfileStore>,
}

impl CliCommandBus {
    pub fn new(program: impl Into<String>, store: Arc<ActiveProfileStore>) -> Self {
        Self {
            program: program.into(),
            store,
        }
    }

    fn scoped_args(&self, args: &[&str]) -> Result<Vec<String>, BusError> {
        let profile = self.store.active_name().ok_or(BusError::NoActiveProfile)?;
        let mut scoped = vec!["--profile".to_string(), profile];
        scoped.extend(args.iter().map(|arg| arg.to_string()));
        Ok(scoped)
    }

    async fn run(
        &self,
        command: &'static str,
        args: Vec<String>,
        stdin: Option<String>,
        limit: Duration,
    ) -> Result<CliOutput, BusError> {
        debug!("running {command}: {} {}", self.program, args.join(" "));
        let mut child = TokioCommand::new(&self.program)
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| {
                BusError::Unreachable(format!("failed to launch `{}`: {error}", self.program))
            })?;

        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|error| BusError::Unreachable(format!("failed to feed stdin: {error}")))?;
        }

        let output = timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| BusError::TimedOut(command))?
            .map_err(|error| BusError::Unreachable(error.to_string()))?;

        let result = CliOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };
        if !output.status.success() && result.stderr.is_empty() {
            return Err(BusError::Rejected(format!(
                "`{command}` exited with {}",
                output.status
            )));
        }
        Ok(result)
    }

    /// Mutating calls treat any stderr output as the backend's refusal.
    async fn run_mutation(
        &self,
        command: &'static str,
        args: Vec<String>,
        limit: Duration,
    ) -> Result<CliOutput, BusError> {
        let output = self.run(command, args, None, limit).await?;
        if !output.stderr.is_empty() {
            return Err(BusError::Rejected(output.stderr));
        }
        Ok(output)
    }

    /// Queries log stderr noise but still use whatever stdout carried.
    async fn run_query(
        &self,
        command: &'static str,
        args: Vec<String>,
    ) -> Result<String, BusError> {
        let output = self.run(command, args, None, CALL_TIMEOUT).await?;
        if !output.stderr.is_empty() {
            warn!("{command} reported: {}", output.stderr);
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl CommandBus for CliCommandBus {
    async fn list_profiles(&self) -> Result<Vec<Profile>, BusError> {
        let stdout = self
            .run_query("list_profiles", argv(&["configure", "list"]))
            .await?;
        parse_profile_table(&stdout)
    }

    async fn remove_profile(&self, profile_name: &str) -> Result<(), BusError> {
        self.run_mutation(
            "remove_profile",
            argv(&["configure", "remove", profile_name]),
            CALL_TIMEOUT,
        )
        .await?;
        info!("profile '{profile_name}' removed");
        Ok(())
    }

    async fn login(&self, request: &LoginRequest) -> Result<(), BusError> {
        let mut command = argv(&["configure", "set"]);
        let mut answers = vec![
            request.profile.clone(),
            request.account.clone(),
            request.space.clone(),
        ];
        match &request.credentials {
            Credentials::Password { email, password } => {
                command.push("--login".to_string());
                answers.push(email.clone());
                answers.push(password.clone());
            }
            Credentials::Token(token) => answers.push(token.clone()),
        }
        let stdin = answers.join("\n") + "\n";

        let output = self.run("login", command, Some(stdin), CALL_TIMEOUT).await?;
        if output.stderr.contains("Login Failed") {
            return Err(BusError::Rejected("Login Failed".to_string()));
        }
        if !output.stderr.is_empty() {
            warn!("login reported: {}", output.stderr);
        }
        Ok(())
    }

    async fn list_blueprints(&self) -> Result<Vec<BlueprintSummary>, BusError> {
        let args = self.scoped_args(&["bp", "list", "--output=json", "--detail"])?;
        let stdout = self.run_query("list_blueprints", args).await?;
        parse_blueprints(&stdout)
    }

    async fn get_blueprint(
        &self,
        blueprint_name: &str,
        source_ref: Option<&str>,
    ) -> Result<BlueprintSummary, BusError> {
        let mut args = self.scoped_args(&["bp", "get", blueprint_name, "--output=json", "--detail"])?;
        if let Some(source_ref) = source_ref.filter(|value| !value.is_empty()) {
            args.extend(["-b".to_string(), source_ref.to_string()]);
        }
        let stdout = self.run_query("get_blueprint", args).await?;
        let value = parse_json_value("get_blueprint", &stdout)?;
        BlueprintSummary::from_value(value).map_err(|error| BusError::malformed("get_blueprint", error))
    }

    async fn list_environments(&self) -> Result<Vec<EnvironmentSummary>, BusError> {
        let args = self.scoped_args(&["sb", "list", "--output=json"])?;
        let stdout = self.run_query("list_environments", args).await?;
        parse_json_list("list_environments", &stdout)
    }

    async fn get_environment(&self, environment_id: &str) -> Result<EnvironmentDetail, BusError> {
        let args = self.scoped_args(&["sb", "get", environment_id, "--output=json", "--detail"])?;
        let stdout = self.run_query("get_environment", args).await?;
        let value = parse_json_value("get_environment", &stdout)?;
        EnvironmentDetail::from_value(&value)
            .map_err(|detail| BusError::malformed("get_environment", detail))
    }

    async fn start_environment(&self, request: &StartEnvironmentRequest) -> Result<(), BusError> {
        let duration = request.duration_minutes.to_string();
        let mut args =
            self.scoped_args(&["sb", "start", &request.blueprint_name, "-d", &duration])?;
        if !request.inputs.is_empty() {
            args.extend(["-i".to_string(), join_pairs(&request.inputs)]);
        }
        if !request.artifacts.is_empty() {
            args.extend(["-a".to_string(), join_pairs(&request.artifacts)]);
        }
        if let Some(name) = request.environment_name.as_deref().filter(|name| !name.is_empty()) {
            args.extend(["-n".to_string(), name.to_string()]);
        }
        if let Some(source_ref) = request.source_ref.as_deref().filter(|value| !value.is_empty()) {
            args.extend(["-t", "0", "-b", source_ref].map(str::to_string));
        }

        self.run_mutation("start_environment", args, START_TIMEOUT)
            .await?;
        info!("environment started from blueprint '{}'", request.blueprint_name);
        Ok(())
    }

    async fn end_environment(&self, environment_id: &str) -> Result<(), BusError> {
        let args = self.scoped_args(&["sb", "end", environment_id])?;
        self.run_mutation("end_environment", args, CALL_TIMEOUT)
            .await?;
        info!("environment '{environment_id}' ended");
        Ok(())
    }
}

fn argv(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn join_pairs(values: &BTreeMap<String, String>) -> String {
    values
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Empty output is "nothing to show", not an error.
fn parse_json_list<T: DeserializeOwned>(command: &'static str, raw: &str) -> Result<Vec<T>, BusError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(|error| BusError::malformed(command, error))
}

/// One unreadable catalog entry must not hide the others.
fn parse_blueprints(raw: &str) -> Result<Vec<BlueprintSummary>, BusError> {
    let values: Vec<Value> = parse_json_list("list_blueprints", raw)?;
    Ok(values
        .into_iter()
        .filter_map(|value| match BlueprintSummary::from_value(value) {
            Ok(blueprint) => Some(blueprint),
            Err(error) => {
                warn!("skipping unreadable blueprint entry: {error}");
                None
            }
        })
        .collect())
}

fn parse_json_value(command: &'static str, raw: &str) -> Result<Value, BusError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BusError::Unreachable(format!("`{command}` returned no data")));
    }
    serde_json::from_str(trimmed).map_err(|error| BusError::malformed(command, error))
}

/// Parses `configure list`: two header lines, then `profile [account] space <type>`.
fn parse_profile_table(raw: &str) -> Result<Vec<Profile>, BusError> {
    let mut profiles = Vec::new();
    for line in raw.lines().skip(2) {
        if line.trim().is_empty() {
            continue;
        }
        let mut columns = line.split_whitespace().collect::<Vec<_>>();
        columns.pop();
        let profile = match columns.as_slice() {
            [name, space] => Profile::new(*name, "", *space),
            [name, account, space] => Profile::new(*name, *account, *space),
            _ => {
                return Err(BusError::malformed(
                    "list_profiles",
                    format!("unexpected profile line: {line}"),
                ));
            }
        };
        profiles.push(profile);
    }
    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::{join_pairs, parse_blueprints, parse_json_list, parse_profile_table};
    use crate::error::BusError;
    use crate::model::{EnvironmentSummary, Profile};
    use std::collections::BTreeMap;

    #[test]
    fn profile_table_skips_headers_and_fills_missing_account() {
        let raw = "\
Profile Name  Account  Space   Token
------------  -------  -----   -----
dev           acme     sandbox ****
local                  trial   ****

";
        let profiles = parse_profile_table(raw).expect("table parses");
        assert_eq!(
            profiles,
            vec![
                Profile::new("dev", "acme", "sandbox"),
                Profile::new("local", "", "trial"),
            ]
        );
    }

    #[test]
    fn profile_table_rejects_unexpected_lines() {
        let raw = "h\n-\nonly\n";
        assert!(matches!(
            parse_profile_table(raw),
            Err(BusError::Malformed { command: "list_profiles", .. })
        ));
    }

    #[test]
    fn empty_json_output_is_an_empty_list() {
        let parsed: Vec<EnvironmentSummary> =
            parse_json_list("list_environments", "  \n").expect("empty is fine");
        assert!(parsed.is_empty());
    }

    #[test]
    fn broken_json_is_reported_as_malformed() {
        let parsed = parse_json_list::<EnvironmentSummary>("list_environments", "[{");
        assert!(matches!(parsed, Err(BusError::Malformed { .. })));
    }

    #[test]
    fn unreadable_blueprint_entries_are_skipped() {
        let raw = r#"[
            {"blueprint_name": "web", "enabled": true},
            {"blueprint_name": 42},
            {"blueprint_name": "db", "enabled": true}
        ]"#;
        let names: Vec<String> = parse_blueprints(raw)
            .expect("catalog parses")
            .into_iter()
            .map(|blueprint| blueprint.name)
            .collect();
        assert_eq!(names, vec!["web".to_string(), "db".to_string()]);
    }

    #[test]
    fn broken_blueprint_catalog_is_still_malformed() {
        assert!(matches!(
            parse_blueprints("{"),
            Err(BusError::Malformed { command: "list_blueprints", .. })
        ));
    }

    #[test]
    fn input_pairs_are_comma_joined() {
        let values = BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "two".to_string()),
        ]);
        assert_eq!(join_pairs(&values), "a=1, b=two");
    }
}
