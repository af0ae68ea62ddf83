use crate::domain::error::Result;
use crate::domain::models::{
    CommandTemplate, ParameterMap, ParameterType, ParameterValue, TemplateExample,
    TemplateParameter,
};
use log::{debug, info};
use std::fs;
use std::path::Path;

fn param(name: &str, kind: ParameterType, required: bool) -> TemplateParameter {
    TemplateParameter {
        name: name.to_string(),
        kind,
        required,
        description: None,
        default_value: None,
        options: None,
    }
}

fn with_default(mut p: TemplateParameter, value: ParameterValue) -> TemplateParameter {
    p.default_value = Some(value);
    p
}

fn with_options(mut p: TemplateParameter, options: &[&str]) -> TemplateParameter {
    p.options = Some(options.iter().map(|o| o.to_string()).collect());
    p
}

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

const LANGUAGES: &[&str] = &[
    "Rust",
    "TypeScript",
    "JavaScript",
    "Python",
    "Go",
    "Java",
    "C#",
];

/// Templates available before the host supplies its own catalog.
pub fn default_templates() -> Vec<CommandTemplate> {
    vec![
        CommandTemplate {
            id: "code-review".to_string(),
            name: "Code Review".to_string(),
            description: "Review code for bugs, style issues and maintainability".to_string(),
            category: "analysis".to_string(),
            template_string:
                "Review {{lang}} code: {{code}}\nFocus on: {{focus}}\nInclude suggestions: {{suggestions}}"
                    .to_string(),
            parameters: vec![
                with_options(param("lang", ParameterType::Select, true), LANGUAGES),
                param("code", ParameterType::File, true),
                with_default(
                    with_options(
                        param("focus", ParameterType::Multiselect, false),
                        &["security", "performance", "readability", "tests"],
                    ),
                    ParameterValue::List(vec!["readability".to_string()]),
                ),
                with_default(
                    param("suggestions", ParameterType::Boolean, false),
                    ParameterValue::Bool(true),
                ),
            ],
            tags: tags(&["review", "quality"]),
            examples: Some(vec![TemplateExample {
                title: "Review a Go entry point".to_string(),
                parameters: ParameterMap::from([
                    ("lang".to_string(), ParameterValue::from("Go")),
                    ("code".to_string(), ParameterValue::from("main.go")),
                ]),
            }]),
        },
        CommandTemplate {
            id: "explain-code".to_string(),
            name: "Explain Code".to_string(),
            description: "Explain what a piece of code does, step by step".to_string(),
            category: "learning".to_string(),
            template_string: "Explain {{code}} for a {{audience}} audience".to_string(),
            parameters: vec![
                param("code", ParameterType::File, true),
                with_default(
                    with_options(
                        param("audience", ParameterType::Select, false),
                        &["beginner", "intermediate", "expert"],
                    ),
                    ParameterValue::from("intermediate"),
                ),
            ],
            tags: tags(&["explain", "documentation"]),
            examples: None,
        },
        CommandTemplate {
            id: "generate-tests".to_string(),
            name: "Generate Tests".to_string(),
            description: "Write unit tests covering the public behaviour of a file".to_string(),
            category: "testing".to_string(),
            template_string: "Write {{framework}} unit tests for {{code}}. Cover edge cases: {{edgeCases}}"
                .to_string(),
            parameters: vec![
                param("code", ParameterType::File, true),
                param("framework", ParameterType::String, true),
                with_default(
                    param("edgeCases", ParameterType::Boolean, false),
                    ParameterValue::Bool(true),
                ),
            ],
            tags: tags(&["tests", "coverage"]),
            examples: None,
        },
        CommandTemplate {
            id: "refactor".to_string(),
            name: "Refactor".to_string(),
            description: "Restructure code without changing behaviour".to_string(),
            category: "refactoring".to_string(),
            template_string: "Refactor {{code}} to improve {{goals}}. Constraints: {{constraints}}"
                .to_string(),
            parameters: vec![
                param("code", ParameterType::File, true),
                with_options(
                    param("goals", ParameterType::Multiselect, true),
                    &["readability", "performance", "modularity", "testability"],
                ),
                param("constraints", ParameterType::String, false),
            ],
            tags: tags(&["cleanup", "structure"]),
            examples: None,
        },
        CommandTemplate {
            id: "write-docs".to_string(),
            name: "Write Documentation".to_string(),
            description: "Produce reference documentation for a module".to_string(),
            category: "documentation".to_string(),
            template_string: "Write {{style}} documentation for {{code}}".to_string(),
            parameters: vec![
                param("code", ParameterType::File, true),
                with_default(
                    with_options(
                        param("style", ParameterType::Select, false),
                        &["API reference", "tutorial", "README"],
                    ),
                    ParameterValue::from("API reference"),
                ),
            ],
            tags: tags(&["docs", "readme"]),
            examples: None,
        },
        CommandTemplate {
            id: "fix-bug".to_string(),
            name: "Fix Bug".to_string(),
            description: "Diagnose and fix a reported bug".to_string(),
            category: "debugging".to_string(),
            template_string: "Fix the bug in {{code}}: {{symptom}}\nError output: {{error}}"
                .to_string(),
            parameters: vec![
                param("code", ParameterType::File, true),
                param("symptom", ParameterType::String, true),
                param("error", ParameterType::String, false),
            ],
            tags: tags(&["bug", "debug", "error"]),
            examples: None,
        },
        CommandTemplate {
            id: "optimize".to_string(),
            name: "Optimize Performance".to_string(),
            description: "Find and remove performance bottlenecks".to_string(),
            category: "analysis".to_string(),
            template_string: "Optimize {{code}} for {{metric}}".to_string(),
            parameters: vec![
                param("code", ParameterType::File, true),
                with_default(
                    with_options(
                        param("metric", ParameterType::Select, true),
                        &["latency", "throughput", "memory"],
                    ),
                    ParameterValue::from("latency"),
                ),
            ],
            tags: tags(&["performance", "profiling"]),
            examples: None,
        },
    ]
}

/// Read a JSON array of templates from disk.
pub fn load_templates_file(path: &Path) -> Result<Vec<CommandTemplate>> {
    debug!("Reading template catalog: {}", path.display());
    let contents = fs::read_to_string(path)?;
    let templates: Vec<CommandTemplate> = serde_json::from_str(&contents)?;
    info!("Loaded {} templates from {}", templates.len(), path.display());
    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use std::collections::HashSet;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_templates_have_unique_ids() {
        let templates = default_templates();
        let ids: HashSet<&str> = templates.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), templates.len());
    }

    #[test]
    fn test_default_placeholders_are_declared() {
        let placeholder = Regex::new(r"\{\{\s*([A-Za-z0-9_-]+)\s*\}\}").unwrap();
        for template in default_templates() {
            for caps in placeholder.captures_iter(&template.template_string) {
                assert!(
                    template.parameter(&caps[1]).is_some(),
                    "{} uses undeclared {}",
                    template.id,
                    &caps[1]
                );
            }
        }
    }

    #[test]
    fn test_load_templates_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id":"x","name":"X","description":"","category":"misc","templateString":"{{{{a}}}}"}}]"#
        )
        .unwrap();

        let templates = load_templates_file(file.path()).unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].template_string, "{{a}}");
    }

    #[test]
    fn test_load_templates_file_rejects_bad_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(load_templates_file(file.path()).is_err());
    }
}
