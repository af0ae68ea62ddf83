//! Wires the stores together around one host bridge. Everything runs on the
//! caller's thread: a message is broadcast, then each store drains its own
//! subscription.

use crate::core::app_state::{AppStateStore, InitTimer, View};
use crate::core::command_builder::CommandBuilderStore;
use crate::core::context_tree::ContextTreeManager;
use crate::core::theme::{HostEnvironment, ThemeService};
use crate::domain::error::{PtahError, Result};
use crate::domain::models::{CommandTemplate, ParameterMap, ParameterValue};
use crate::infra::config::StartupConfig;
use crate::infra::host_bridge::{HostBridge, HostMessage};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use std::rc::Rc;
use std::time::Instant;

/// Prefix of messages that carry user actions rather than host events.
pub const ACTION_PREFIX: &str = "action:";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Action {
    #[serde(rename = "action:setView")]
    SetView { view: View },
    #[serde(rename = "action:refreshContext")]
    RefreshContext,
    #[serde(rename = "action:toggleFile")]
    ToggleFile { path: String },
    #[serde(rename = "action:toggleDirectory")]
    ToggleDirectory { path: String },
    #[serde(rename = "action:includeDirectory")]
    IncludeDirectory { path: String },
    #[serde(rename = "action:excludeDirectory")]
    ExcludeDirectory { path: String },
    #[serde(rename = "action:selectTemplate")]
    SelectTemplate { id: Option<String> },
    #[serde(rename = "action:setParameter")]
    SetParameter { name: String, value: ParameterValue },
    #[serde(rename = "action:setParameters")]
    SetParameters { parameters: ParameterMap },
    #[serde(rename = "action:search")]
    Search {
        #[serde(default)]
        query: String,
        #[serde(default)]
        category: Option<String>,
    },
    #[serde(rename = "action:executeTemplate")]
    ExecuteTemplate,
}

pub struct App {
    pub bridge: Rc<HostBridge>,
    pub state: AppStateStore,
    pub context: ContextTreeManager,
    pub commands: CommandBuilderStore,
    pub theme: ThemeService,
    init_timer: Option<InitTimer>,
}

impl App {
    pub fn new(
        bridge: Rc<HostBridge>,
        config: &StartupConfig,
        env: &dyn HostEnvironment,
        templates: Option<Vec<CommandTemplate>>,
    ) -> Self {
        let commands = match templates {
            Some(templates) => CommandBuilderStore::with_templates(Rc::clone(&bridge), templates),
            None => CommandBuilderStore::new(Rc::clone(&bridge)),
        };
        Self {
            state: AppStateStore::from_config(Rc::clone(&bridge), config),
            context: ContextTreeManager::new(Rc::clone(&bridge), config.max_tokens),
            theme: ThemeService::new(Rc::clone(&bridge), env),
            commands,
            bridge,
            init_timer: None,
        }
    }

    /// Announce readiness and ask the host for what the UI needs.
    pub fn start(&mut self, now: Instant, config: &StartupConfig) {
        self.state.announce_ready();
        self.theme.request_theme();
        self.context.request_files();
        self.init_timer = Some(InitTimer::start(now, config.init_timeout()));
    }

    pub fn init_timer(&self) -> Option<InitTimer> {
        self.init_timer
    }

    /// Fire the init timer if it has expired. Returns true once when it fires.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.init_timer {
            Some(timer) if timer.expired(now) => {
                self.init_timer = None;
                self.state.on_init_timeout();
                true
            }
            _ => false,
        }
    }

    pub fn handle_message(&mut self, message: HostMessage) -> Result<()> {
        if message.kind.starts_with(ACTION_PREFIX) {
            return self.handle_action(message);
        }
        self.bridge.dispatch(message);
        self.state.poll_host();
        if !self.state.state().loading {
            self.init_timer = None;
        }
        self.context.poll_host();
        self.commands.poll_host();
        self.theme.poll_host();
        Ok(())
    }

    fn handle_action(&mut self, message: HostMessage) -> Result<()> {
        let value = serde_json::to_value(&message)?;
        let action: Action = serde_json::from_value(value)
            .map_err(|e| PtahError::MalformedPayload(format!("{}: {}", message.kind, e)))?;
        debug!("Handling {:?}", action);

        match action {
            Action::SetView { view } => self.state.set_view(view),
            Action::RefreshContext => self.context.request_files(),
            Action::ToggleFile { path } => {
                if !self.context.toggle_file(&path) {
                    warn!("No file at {}", path);
                }
            }
            Action::ToggleDirectory { path } => {
                if !self.context.toggle_directory(&path) {
                    warn!("No directory at {}", path);
                }
            }
            Action::IncludeDirectory { path } => {
                self.context.include_directory(&path);
            }
            Action::ExcludeDirectory { path } => {
                self.context.exclude_directory(&path);
            }
            Action::SelectTemplate { id: Some(id) } => self.commands.select_template_by_id(&id)?,
            Action::SelectTemplate { id: None } => self.commands.select_template(None),
            Action::SetParameter { name, value } => self.commands.set_parameter(&name, value),
            Action::SetParameters { parameters } => self.commands.set_parameters(parameters),
            Action::Search { query, category } => {
                self.commands.set_search_query(&query);
                if let Some(category) = category {
                    self.commands.set_category(&category);
                }
            }
            Action::ExecuteTemplate => {
                self.commands.execute()?;
            }
        }
        Ok(())
    }

    /// Combined view of every store, for diagnostics.
    pub fn snapshot(&self) -> Value {
        serde_json::json!({
            "app": self.state.snapshot(),
            "context": {
                "totalTokens": self.context.state().total_tokens,
                "maxTokens": self.context.state().max_tokens,
                "files": self.context.file_count(),
                "budget": self.context.budget(),
                "error": self.context.state().error,
            },
            "theme": self.theme.state(),
            "command": {
                "preview": self.commands.preview_command(),
                "valid": self.commands.is_command_valid(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::app_state::ConnectionStatus;
    use crate::core::theme::{EnvironmentSnapshot, ThemeKind};
    use crate::infra::host_bridge::{MockTransport, types};
    use serde_json::json;
    use std::time::Duration;

    fn app() -> (App, MockTransport, StartupConfig) {
        let (bridge, transport) = HostBridge::mock();
        let config = StartupConfig::from_json(r#"{"workspaceName": "w"}"#).unwrap();
        let app = App::new(
            bridge,
            &config,
            &EnvironmentSnapshot::with_background("#ffffff"),
            None,
        );
        (app, transport, config)
    }

    fn msg(value: Value) -> HostMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_start_requests_host_data() {
        let (mut app, transport, config) = app();
        app.start(Instant::now(), &config);

        let kinds: Vec<String> = transport.sent().into_iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![types::WEBVIEW_READY, types::THEME_GET, types::CONTEXT_GET_FILES]
        );
        assert!(app.context.state().loading);
    }

    #[test]
    fn test_host_events_reach_every_store() {
        let (mut app, _, config) = app();
        app.start(Instant::now(), &config);

        app.handle_message(msg(json!({"type": "initialData", "data": {}})))
            .unwrap();
        app.handle_message(msg(json!({
            "type": "context:filesLoaded",
            "data": {"files": [{"path": "a/b.rs", "tokenEstimate": 9}], "includedFiles": ["a/b.rs"]}
        })))
        .unwrap();
        app.handle_message(msg(json!({
            "type": "theme:changed",
            "data": {"cssVariables": {"--vscode-editor-background": "#1e1e1e"}}
        })))
        .unwrap();

        assert_eq!(app.state.state().connection, ConnectionStatus::Connected);
        assert!(app.init_timer().is_none());
        assert_eq!(app.context.state().total_tokens, 9);
        assert_eq!(app.theme.kind(), ThemeKind::Dark);
        assert_eq!(app.snapshot()["context"]["totalTokens"], json!(9));
    }

    #[test]
    fn test_init_timeout_fires_once() {
        let (mut app, _, config) = app();
        let start = Instant::now();
        app.start(start, &config);

        assert!(!app.tick(start));
        assert!(app.tick(start + Duration::from_secs(5)));
        assert!(!app.state.state().loading);
        assert!(!app.tick(start + Duration::from_secs(10)));
    }

    #[test]
    fn test_actions_drive_stores() {
        let (mut app, transport, _) = app();
        app.handle_message(msg(json!({
            "type": "context:filesLoaded",
            "data": {"files": [{"path": "x.rs", "tokenEstimate": 5}]}
        })))
        .unwrap();

        app.handle_message(msg(json!({"type": "action:toggleFile", "data": {"path": "x.rs"}})))
            .unwrap();
        assert_eq!(app.context.state().total_tokens, 5);

        app.handle_message(msg(json!({"type": "action:selectTemplate", "data": {"id": "fix-bug"}})))
            .unwrap();
        app.handle_message(msg(json!({
            "type": "action:setParameters",
            "data": {"parameters": {"code": "x.rs", "symptom": "panics on empty input"}}
        })))
        .unwrap();
        app.handle_message(msg(json!({"type": "action:executeTemplate"})))
            .unwrap();

        let executed = transport.sent_of_type(types::COMMANDS_EXECUTE_TEMPLATE);
        assert_eq!(executed.len(), 1);
        assert_eq!(
            executed[0].data.as_ref().unwrap()["command"],
            json!("Fix the bug in x.rs: panics on empty input\nError output:")
        );

        app.handle_message(msg(json!({"type": "action:setView", "data": {"view": "command-builder"}})))
            .unwrap();
        assert_eq!(app.state.state().current_view, View::CommandBuilder);
    }

    #[test]
    fn test_malformed_action_is_an_error() {
        let (mut app, _, _) = app();
        assert!(matches!(
            app.handle_message(msg(json!({"type": "action:toggleFile", "data": 3}))),
            Err(PtahError::MalformedPayload(_))
        ));
        assert!(matches!(
            app.handle_message(msg(json!({"type": "action:selectTemplate", "data": {"id": "nope"}}))),
            Err(PtahError::TemplateNotFound(_))
        ));
    }
}
