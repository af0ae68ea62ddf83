use crate::core::store::{ListenerId, Store};
use crate::infra::config::StartupConfig;
use crate::infra::host_bridge::{HostBridge, Subscription, types};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::rc::Rc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum View {
    #[default]
    Chat,
    CommandBuilder,
    ContextTree,
    Analytics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceInfo {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub project_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub current_view: View,
    pub connection: ConnectionStatus,
    pub workspace: Option<WorkspaceInfo>,
    pub loading: bool,
    pub development: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            current_view: View::default(),
            connection: ConnectionStatus::default(),
            workspace: None,
            loading: true,
            development: false,
        }
    }
}

/// The part of [`AppState`] that survives a webview reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    #[serde(default)]
    current_view: View,
}

/// Clears the loading indicator if the host never answers.
#[derive(Debug, Clone, Copy)]
pub struct InitTimer {
    deadline: Instant,
}

impl InitTimer {
    pub fn start(now: Instant, timeout: Duration) -> Self {
        Self {
            deadline: now + timeout,
        }
    }

    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}

pub struct AppStateStore {
    bridge: Rc<HostBridge>,
    subscription: Subscription,
    store: Store<AppState>,
}

impl AppStateStore {
    pub fn from_config(bridge: Rc<HostBridge>, config: &StartupConfig) -> Self {
        let subscription = bridge
            .subscribe()
            .with_types(&[types::INITIAL_DATA, types::STATE_RESTORE]);
        let state = AppState {
            workspace: Some(WorkspaceInfo {
                name: config.workspace_name.clone(),
                path: config.workspace_path.clone(),
                project_type: config.project_type.clone(),
            }),
            development: config.development,
            connection: if config.development {
                ConnectionStatus::Disconnected
            } else {
                ConnectionStatus::Connecting
            },
            ..AppState::default()
        };
        Self {
            bridge,
            subscription,
            store: Store::new(state),
        }
    }

    pub fn state(&self) -> &AppState {
        self.store.get()
    }

    pub fn subscribe(&mut self, listener: impl Fn(&AppState) + 'static) -> ListenerId {
        self.store.subscribe(listener)
    }

    pub fn announce_ready(&self) {
        self.bridge.post(types::WEBVIEW_READY, None);
    }

    pub fn set_view(&mut self, view: View) {
        if self.state().current_view == view {
            return;
        }
        debug!("Switching view to {:?}", view);
        self.store.update(|state| state.current_view = view);
        self.save_state();
    }

    pub fn set_connection(&mut self, status: ConnectionStatus) {
        self.store.update(|state| state.connection = status);
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.store.update(|state| state.loading = loading);
    }

    /// Called by the event loop when the init timer fires.
    pub fn on_init_timeout(&mut self) {
        if self.state().loading {
            warn!("Host did not respond in time, clearing loading state");
            self.set_loading(false);
        }
    }

    pub fn save_state(&self) {
        let persisted = PersistedState {
            current_view: self.state().current_view,
        };
        match serde_json::to_value(&persisted) {
            Ok(value) => self.bridge.post(types::STATE_SAVE, Some(value)),
            Err(e) => warn!("Could not serialize UI state: {}", e),
        }
    }

    /// Restore a previously saved blob. Anything but a JSON object is ignored.
    pub fn restore(&mut self, value: &Value) -> bool {
        if !value.is_object() {
            warn!("Ignoring saved state that is not an object");
            return false;
        }
        match serde_json::from_value::<PersistedState>(value.clone()) {
            Ok(persisted) => {
                self.store
                    .update(|state| state.current_view = persisted.current_view);
                true
            }
            Err(e) => {
                warn!("Ignoring unreadable saved state: {}", e);
                false
            }
        }
    }

    fn apply_initial_data(&mut self, data: &Value) {
        let workspace = data
            .get("workspaceInfo")
            .or_else(|| data.get("workspace"))
            .and_then(|w| serde_json::from_value::<WorkspaceInfo>(w.clone()).ok());
        self.store.update(|state| {
            if workspace.is_some() {
                state.workspace = workspace;
            }
            state.connection = ConnectionStatus::Connected;
            state.loading = false;
        });
        info!("Connected to host");
        if let Some(saved) = data.get("savedState") {
            self.restore(saved);
        }
    }

    pub fn poll_host(&mut self) {
        while let Some(message) = self.subscription.try_next() {
            let data = message.data.unwrap_or(Value::Null);
            if message.kind == types::INITIAL_DATA {
                self.apply_initial_data(&data);
            } else {
                self.restore(&data);
            }
        }
    }

    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self.state()).unwrap_or_else(|_| json!({}))
    }
}
