use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A workspace file as reported by the host (or by the local scanner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFile {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_estimate: Option<u64>,
}

impl ContextFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: None,
            token_estimate: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTreeNode {
    pub path: String,
    pub name: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_estimate: Option<u64>,
    pub included: bool,
    pub excluded: bool,
    #[serde(default)]
    pub children: Vec<FileTreeNode>,
    pub expanded: bool,
    pub depth: usize,
}

impl FileTreeNode {
    pub fn new_directory(path: String, name: String, depth: usize) -> Self {
        Self {
            path,
            name,
            kind: NodeKind::Directory,
            size: None,
            token_estimate: None,
            included: false,
            excluded: false,
            children: Vec::new(),
            expanded: false,
            depth,
        }
    }

    pub fn new_file(file: &ContextFile, name: String, depth: usize) -> Self {
        Self {
            path: file.path.clone(),
            name,
            kind: NodeKind::File,
            size: file.size,
            token_estimate: file.token_estimate,
            included: false,
            excluded: false,
            children: Vec::new(),
            expanded: false,
            depth,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    File,
    Select,
    Boolean,
    Multiselect,
}

/// A value bound to a template parameter. `Null` mirrors an explicit JSON null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Null,
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

impl ParameterValue {
    /// Text used when the value is substituted into a template.
    pub fn render(&self) -> String {
        match self {
            ParameterValue::Null => String::new(),
            ParameterValue::Bool(b) => b.to_string(),
            ParameterValue::Text(s) => s.clone(),
            ParameterValue::List(items) => items.join(", "),
        }
    }

    /// Required-parameter test: only null and the empty string fail it.
    /// An empty list passes.
    pub fn is_present(&self) -> bool {
        match self {
            ParameterValue::Null => false,
            ParameterValue::Text(s) => !s.is_empty(),
            ParameterValue::Bool(_) | ParameterValue::List(_) => true,
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::Text(value)
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Bool(value)
    }
}

impl From<Vec<String>> for ParameterValue {
    fn from(value: Vec<String>) -> Self {
        ParameterValue::List(value)
    }
}

pub type ParameterMap = BTreeMap<String, ParameterValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<ParameterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateExample {
    pub title: String,
    #[serde(default)]
    pub parameters: ParameterMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub template_string: String,
    #[serde(default)]
    pub parameters: Vec<TemplateParameter>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<TemplateExample>>,
}

impl CommandTemplate {
    pub fn parameter(&self, name: &str) -> Option<&TemplateParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub parameters: ParameterMap,
    pub template: CommandTemplate,
}

/// Local scan options for the `context` subcommand.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub root_path: String,
    pub extensions: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub max_tokens: u64,
    pub output_path: Option<String>,
    pub auto_select: bool,
    pub clipboard: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_value_presence() {
        assert!(!ParameterValue::Null.is_present());
        assert!(!ParameterValue::from("").is_present());
        assert!(ParameterValue::from("x").is_present());
        assert!(ParameterValue::Bool(false).is_present());
        assert!(ParameterValue::List(vec![]).is_present());
    }

    #[test]
    fn test_parameter_value_from_json() {
        let values: Vec<ParameterValue> =
            serde_json::from_str(r#"[null, true, "go", ["a", "b"]]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ParameterValue::Null,
                ParameterValue::Bool(true),
                ParameterValue::from("go"),
                ParameterValue::List(vec!["a".into(), "b".into()]),
            ]
        );
        assert_eq!(values[3].render(), "a, b");
    }

    #[test]
    fn test_template_deserializes_camel_case() {
        let json = r#"{
            "id": "t", "name": "T", "description": "d", "category": "c",
            "templateString": "Hi {{who}}",
            "parameters": [{"name": "who", "type": "string", "required": true, "defaultValue": "you"}]
        }"#;
        let template: CommandTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(template.parameters[0].kind, ParameterType::String);
        assert_eq!(
            template.parameter("who").unwrap().default_value,
            Some(ParameterValue::from("you"))
        );
        assert!(template.tags.is_empty());
    }
}
