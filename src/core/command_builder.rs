use crate::core::catalog::default_templates;
use crate::core::store::{ListenerId, Store};
use crate::domain::error::{PtahError, Result};
use crate::domain::models::{
    CommandResult, CommandTemplate, ParameterMap, ParameterType, ParameterValue,
};
use crate::infra::host_bridge::{HostBridge, Subscription, types};
use log::{debug, info, warn};
use regex::{Captures, Regex};
use serde_json::Value;
use std::rc::Rc;
use std::sync::LazyLock;

pub const ALL_CATEGORIES: &str = "all";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(.*?)\s*\}\}").expect("placeholder pattern is valid")
});

#[derive(Debug, Clone, PartialEq)]
pub struct CommandBuilderState {
    pub templates: Vec<CommandTemplate>,
    pub selected: Option<CommandTemplate>,
    pub parameters: ParameterMap,
    pub search_query: String,
    pub selected_category: String,
}

impl Default for CommandBuilderState {
    fn default() -> Self {
        Self {
            templates: Vec::new(),
            selected: None,
            parameters: ParameterMap::new(),
            search_query: String::new(),
            selected_category: ALL_CATEGORIES.to_string(),
        }
    }
}

/// Parameter values a freshly selected template starts with.
pub fn default_parameters(template: &CommandTemplate) -> ParameterMap {
    let mut parameters = ParameterMap::new();
    for param in &template.parameters {
        let value = match (&param.default_value, param.required) {
            (Some(value), _) => value.clone(),
            (None, true) if param.kind == ParameterType::Multiselect => {
                ParameterValue::List(Vec::new())
            }
            (None, true) => ParameterValue::Text(String::new()),
            (None, false) => continue,
        };
        parameters.insert(param.name.clone(), value);
    }
    parameters
}

/// Substitute declared `{{name}}` placeholders. Unset parameters become empty;
/// placeholders without a declared parameter are left as written.
pub fn render_command(template: &CommandTemplate, parameters: &ParameterMap) -> String {
    let rendered = PLACEHOLDER.replace_all(&template.template_string, |caps: &Captures| {
        let name = &caps[1];
        if template.parameter(name).is_none() {
            return caps[0].to_string();
        }
        parameters
            .get(name)
            .map(ParameterValue::render)
            .unwrap_or_default()
    });
    rendered.trim().to_string()
}

pub fn missing_parameters(template: &CommandTemplate, parameters: &ParameterMap) -> Vec<String> {
    template
        .parameters
        .iter()
        .filter(|p| p.required)
        .filter(|p| !parameters.get(&p.name).is_some_and(ParameterValue::is_present))
        .map(|p| p.name.clone())
        .collect()
}

pub fn matches_filter(template: &CommandTemplate, query: &str, category: &str) -> bool {
    let query = query.to_lowercase();
    let matches_query = query.is_empty()
        || template.name.to_lowercase().contains(&query)
        || template.description.to_lowercase().contains(&query)
        || template
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(&query));
    let matches_category = category == ALL_CATEGORIES || template.category == category;
    matches_query && matches_category
}

pub struct CommandBuilderStore {
    bridge: Rc<HostBridge>,
    subscription: Subscription,
    store: Store<CommandBuilderState>,
}

impl CommandBuilderStore {
    pub fn new(bridge: Rc<HostBridge>) -> Self {
        Self::with_templates(bridge, default_templates())
    }

    pub fn with_templates(bridge: Rc<HostBridge>, templates: Vec<CommandTemplate>) -> Self {
        let subscription = bridge
            .subscribe()
            .with_types(&[types::COMMANDS_TEMPLATES_LOADED]);
        Self {
            bridge,
            subscription,
            store: Store::new(CommandBuilderState {
                templates,
                ..CommandBuilderState::default()
            }),
        }
    }

    pub fn state(&self) -> &CommandBuilderState {
        self.store.get()
    }

    pub fn subscribe(&mut self, listener: impl Fn(&CommandBuilderState) + 'static) -> ListenerId {
        self.store.subscribe(listener)
    }

    pub fn templates(&self) -> &[CommandTemplate] {
        &self.state().templates
    }

    pub fn set_templates(&mut self, templates: Vec<CommandTemplate>) {
        info!("Command catalog now has {} templates", templates.len());
        self.store.update(|state| {
            if let Some(selected) = &state.selected {
                if !templates.iter().any(|t| t.id == selected.id) {
                    state.selected = None;
                    state.parameters.clear();
                }
            }
            state.templates = templates;
        });
    }

    /// Apply pending `commands:templatesLoaded` pushes from the host.
    pub fn poll_host(&mut self) {
        while let Some(message) = self.subscription.try_next() {
            let data = message.data.unwrap_or(Value::Null);
            let list = data.get("templates").cloned().unwrap_or(data);
            match serde_json::from_value::<Vec<CommandTemplate>>(list) {
                Ok(templates) => self.set_templates(templates),
                Err(e) => warn!("Ignoring malformed template catalog: {}", e),
            }
        }
    }

    pub fn find_template(&self, id: &str) -> Option<&CommandTemplate> {
        self.templates().iter().find(|t| t.id == id)
    }

    pub fn select_template(&mut self, template: Option<CommandTemplate>) {
        self.store.update(|state| match template {
            Some(template) => {
                debug!("Selected template {}", template.id);
                state.parameters = default_parameters(&template);
                state.selected = Some(template);
            }
            None => {
                state.selected = None;
                state.parameters.clear();
            }
        });
    }

    pub fn select_template_by_id(&mut self, id: &str) -> Result<()> {
        let template = self
            .find_template(id)
            .cloned()
            .ok_or_else(|| PtahError::TemplateNotFound(id.to_string()))?;
        self.select_template(Some(template));
        Ok(())
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<ParameterValue>) {
        let value = value.into();
        self.store.update(|state| {
            state.parameters.insert(name.to_string(), value);
        });
    }

    pub fn set_parameters(&mut self, parameters: ParameterMap) {
        self.store.update(|state| state.parameters = parameters);
    }

    pub fn set_search_query(&mut self, query: &str) {
        self.store.update(|state| state.search_query = query.to_string());
    }

    pub fn set_category(&mut self, category: &str) {
        self.store
            .update(|state| state.selected_category = category.to_string());
    }

    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> =
            self.templates().iter().map(|t| t.category.clone()).collect();
        categories.sort();
        categories.dedup();
        categories
    }

    pub fn filtered_templates(&self) -> Vec<&CommandTemplate> {
        let state = self.state();
        state
            .templates
            .iter()
            .filter(|t| matches_filter(t, &state.search_query, &state.selected_category))
            .collect()
    }

    pub fn preview_command(&self) -> String {
        let state = self.state();
        state
            .selected
            .as_ref()
            .map(|template| render_command(template, &state.parameters))
            .unwrap_or_default()
    }

    pub fn missing_parameters(&self) -> Vec<String> {
        let state = self.state();
        state
            .selected
            .as_ref()
            .map(|template| missing_parameters(template, &state.parameters))
            .unwrap_or_default()
    }

    pub fn is_command_valid(&self) -> bool {
        self.state().selected.is_some() && self.missing_parameters().is_empty()
    }

    pub fn build_command_result(&self) -> Option<CommandResult> {
        if !self.is_command_valid() {
            return None;
        }
        let state = self.state();
        let template = state.selected.clone()?;
        Some(CommandResult {
            command: self.preview_command(),
            parameters: state.parameters.clone(),
            template,
        })
    }

    /// Send the built command to the host for execution.
    pub fn execute(&self) -> Result<CommandResult> {
        if self.state().selected.is_none() {
            return Err(PtahError::NoTemplateSelected);
        }
        let result = self
            .build_command_result()
            .ok_or_else(|| PtahError::InvalidParameters(self.missing_parameters()))?;
        self.bridge.post(
            types::COMMANDS_EXECUTE_TEMPLATE,
            Some(serde_json::to_value(&result)?),
        );
        info!("Executed template {}", result.template.id);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TemplateParameter;
    use crate::infra::host_bridge::HostMessage;
    use serde_json::json;

    fn parameter(name: &str, kind: ParameterType, required: bool) -> TemplateParameter {
        TemplateParameter {
            name: name.to_string(),
            kind,
            required,
            description: None,
            default_value: None,
            options: None,
        }
    }

    fn review_template() -> CommandTemplate {
        CommandTemplate {
            id: "review".to_string(),
            name: "Review".to_string(),
            description: "Review some code".to_string(),
            category: "analysis".to_string(),
            template_string: "Review {{lang}} code: {{code}}".to_string(),
            parameters: vec![
                parameter("lang", ParameterType::String, false),
                parameter("code", ParameterType::File, true),
            ],
            tags: vec!["quality".to_string()],
            examples: None,
        }
    }

    fn store_with(templates: Vec<CommandTemplate>) -> CommandBuilderStore {
        let (bridge, _) = HostBridge::mock();
        CommandBuilderStore::with_templates(bridge, templates)
    }

    #[test]
    fn test_preview_substitution() {
        let mut store = store_with(vec![review_template()]);
        store.select_template(Some(review_template()));
        store.set_parameter("lang", "Go");
        store.set_parameter("code", "main.go");
        assert_eq!(store.preview_command(), "Review Go code: main.go");
    }

    #[test]
    fn test_unset_parameter_substitutes_empty() {
        let mut store = store_with(vec![review_template()]);
        store.select_template(Some(review_template()));
        store.set_parameters(ParameterMap::from([(
            "lang".to_string(),
            ParameterValue::from("Go"),
        )]));
        assert_eq!(store.preview_command(), "Review Go code:");
    }

    #[test]
    fn test_undeclared_placeholder_left_literal() {
        let mut template = review_template();
        template.template_string = "{{lang}} {{mystery}} {{lang}}".to_string();
        let params = ParameterMap::from([("lang".to_string(), ParameterValue::from("Rust"))]);
        assert_eq!(render_command(&template, &params), "Rust {{mystery}} Rust");
    }

    #[test]
    fn test_parameter_names_with_dots_and_spaces() {
        let mut template = review_template();
        template.template_string = "Open {{file.path}} and {{ target file }}".to_string();
        template.parameters = vec![
            parameter("file.path", ParameterType::File, true),
            parameter("target file", ParameterType::File, true),
        ];
        let params = ParameterMap::from([
            ("file.path".to_string(), ParameterValue::from("main.rs")),
            ("target file".to_string(), ParameterValue::from("lib.rs")),
        ]);
        assert_eq!(render_command(&template, &params), "Open main.rs and lib.rs");
    }

    #[test]
    fn test_multiselect_and_boolean_rendering() {
        let mut template = review_template();
        template.template_string = "Focus: {{focus}} / strict: {{strict}}".to_string();
        template.parameters = vec![
            parameter("focus", ParameterType::Multiselect, false),
            parameter("strict", ParameterType::Boolean, false),
        ];
        let params = ParameterMap::from([
            (
                "focus".to_string(),
                ParameterValue::List(vec!["security".into(), "tests".into()]),
            ),
            ("strict".to_string(), ParameterValue::Bool(false)),
        ]);
        assert_eq!(
            render_command(&template, &params),
            "Focus: security, tests / strict: false"
        );
    }

    #[test]
    fn test_validity_flips_when_required_set() {
        let mut store = store_with(vec![review_template()]);
        assert!(!store.is_command_valid());

        store.select_template(Some(review_template()));
        assert!(!store.is_command_valid());
        assert_eq!(store.missing_parameters(), vec!["code".to_string()]);
        assert!(store.build_command_result().is_none());

        store.set_parameter("code", "main.go");
        assert!(store.is_command_valid());
        let result = store.build_command_result().unwrap();
        assert_eq!(result.command, "Review  code: main.go");
        assert_eq!(result.template.id, "review");

        store.set_parameter("code", ParameterValue::Null);
        assert!(!store.is_command_valid());
    }

    #[test]
    fn test_required_multiselect_empty_list_counts_as_set() {
        let mut template = review_template();
        template.parameters = vec![parameter("goals", ParameterType::Multiselect, true)];
        template.template_string = "Goals: {{goals}}".to_string();

        let mut store = store_with(vec![template.clone()]);
        store.select_template(Some(template));

        assert_eq!(
            store.state().parameters.get("goals"),
            Some(&ParameterValue::List(vec![]))
        );
        assert!(store.is_command_valid());
    }

    #[test]
    fn test_selection_resets_parameters() {
        let mut with_default = review_template();
        with_default.id = "other".to_string();
        with_default.parameters[0].default_value = Some(ParameterValue::from("Rust"));

        let mut store = store_with(vec![review_template(), with_default.clone()]);
        store.select_template(Some(review_template()));
        store.set_parameter("code", "x.rs");

        store.select_template(Some(with_default));
        let params = &store.state().parameters;
        assert_eq!(params.get("lang"), Some(&ParameterValue::from("Rust")));
        assert_eq!(params.get("code"), Some(&ParameterValue::from("")));

        store.select_template(None);
        assert!(store.state().selected.is_none());
        assert!(store.state().parameters.is_empty());
        assert_eq!(store.preview_command(), "");
    }

    #[test]
    fn test_filtering_by_query_and_category() {
        let mut store = CommandBuilderStore::new(HostBridge::mock().0);

        store.set_search_query("REVIEW");
        let ids: Vec<&str> = store.filtered_templates().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["code-review"]);

        store.set_search_query("");
        store.set_category("analysis");
        let ids: Vec<&str> = store.filtered_templates().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["code-review", "optimize"]);

        store.set_search_query("profiling");
        let ids: Vec<&str> = store.filtered_templates().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["optimize"]);

        store.set_category(ALL_CATEGORIES);
        store.set_search_query("   ");
        assert!(store.filtered_templates().is_empty());

        store.set_search_query("");
        assert_eq!(store.filtered_templates().len(), store.templates().len());
        assert!(store.categories().contains(&"testing".to_string()));
    }

    #[test]
    fn test_select_by_unknown_id_fails() {
        let mut store = CommandBuilderStore::new(HostBridge::mock().0);
        assert!(matches!(
            store.select_template_by_id("nope"),
            Err(PtahError::TemplateNotFound(_))
        ));
        assert!(store.select_template_by_id("fix-bug").is_ok());
    }

    #[test]
    fn test_execute_posts_to_host() {
        let (bridge, transport) = HostBridge::mock();
        let mut store = CommandBuilderStore::with_templates(bridge, vec![review_template()]);

        assert!(matches!(store.execute(), Err(PtahError::NoTemplateSelected)));
        store.select_template_by_id("review").unwrap();
        assert!(matches!(
            store.execute(),
            Err(PtahError::InvalidParameters(_))
        ));

        store.set_parameter("code", "lib.rs");
        let result = store.execute().unwrap();
        let sent = transport.sent_of_type(types::COMMANDS_EXECUTE_TEMPLATE);
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].data.as_ref().unwrap()["command"],
            json!(result.command)
        );
    }

    #[test]
    fn test_host_catalog_replaces_templates() {
        let (bridge, _) = HostBridge::mock();
        let mut store = CommandBuilderStore::new(Rc::clone(&bridge));
        store.select_template_by_id("fix-bug").unwrap();

        bridge.dispatch(HostMessage::new(
            types::COMMANDS_TEMPLATES_LOADED,
            Some(json!({"templates": [serde_json::to_value(review_template()).unwrap()]})),
        ));
        store.poll_host();

        assert_eq!(store.templates().len(), 1);
        assert!(store.state().selected.is_none());
    }
}
