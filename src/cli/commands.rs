use crate::cli::serve::serve;
use crate::core::catalog::load_templates_file;
use crate::core::command_builder::{ALL_CATEGORIES, CommandBuilderStore};
use crate::core::context_tree::ContextTreeManager;
use crate::core::theme::{EnvironmentSnapshot, RecordingStyleTarget, ThemeService};
use crate::core::token_budget::DEFAULT_MAX_TOKENS;
use crate::domain::models::{ContextConfig, ParameterMap, ParameterType, ParameterValue};
use crate::infra::config::{CONFIG_ENV_VAR, load_startup_config};
use crate::infra::file_system::list_workspace_files;
use crate::infra::host_bridge::HostBridge;
use crate::infra::logger::{print_welcome_message, setup_logger};
use crate::infra::output::write_output;
use crate::ui::context_view::{ContextView, run_tui};
use clap::{Parser, Subcommand};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Parser)]
#[command(name = "ptah")]
#[command(about = "Context tree, command builder and theme core for the Ptah editor UI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Speak the host protocol as JSON lines on stdin/stdout
    Serve {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        templates: Option<PathBuf>,
    },
    /// Pick context files from a local workspace in a terminal tree
    Context {
        #[arg(long, default_value = ".")]
        path: String,

        #[arg(long, default_value = "")]
        ext: String,

        #[arg(long, default_value = ".git,node_modules,target,dist")]
        exclude: String,

        #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
        max_tokens: u64,

        #[arg(long)]
        output: Option<String>,

        /// Include every file without opening the tree
        #[arg(long)]
        auto: bool,

        #[arg(long)]
        clipboard: bool,

        #[arg(long)]
        background: Option<String>,
    },
    /// List command templates
    Templates {
        #[arg(long, default_value = "")]
        search: String,

        #[arg(long, default_value = ALL_CATEGORIES)]
        category: String,

        #[arg(long)]
        templates: Option<PathBuf>,
    },
    /// Render a command from a template
    Build {
        #[arg(long)]
        template: String,

        /// Parameter as name=value; repeat for multiselect values
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        #[arg(long)]
        templates: Option<PathBuf>,

        #[arg(long)]
        output: Option<String>,

        #[arg(long)]
        clipboard: bool,
    },
    /// Classify a theme from host signals and print its CSS variables
    Theme {
        #[arg(long)]
        background: Option<String>,

        #[arg(long)]
        high_contrast: bool,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{}`", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("parameter name is empty in `{}`", raw));
    }
    Ok((name.to_string(), value.to_string()))
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logger(cli.verbose)?;

    match cli.command {
        Commands::Serve { config, templates } => {
            let startup = load_startup_config(config.as_deref(), std::env::var(CONFIG_ENV_VAR).ok())?;
            let templates = templates.as_deref().map(load_templates_file).transpose()?;
            serve(&startup, templates)?;
        }
        Commands::Context {
            path,
            ext,
            exclude,
            max_tokens,
            output,
            auto,
            clipboard,
            background,
        } => {
            print_welcome_message()?;
            let split = |s: &str| -> Vec<String> {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            };
            let config = ContextConfig {
                root_path: path,
                extensions: split(&ext),
                exclude_patterns: split(&exclude),
                max_tokens,
                output_path: output,
                auto_select: auto,
                clipboard,
            };
            debug!("Context config: {:?}", config);
            pick_context(&config, background.as_deref())?;
        }
        Commands::Templates {
            search,
            category,
            templates,
        } => {
            let store = command_store(templates)?;
            list_templates(store, &search, &category);
        }
        Commands::Build {
            template,
            params,
            templates,
            output,
            clipboard,
        } => {
            let store = command_store(templates)?;
            let command = build_command(store, &template, params)?;
            write_output(&command, output.as_deref(), clipboard)?;
        }
        Commands::Theme {
            background,
            high_contrast,
        } => {
            let mut env = background
                .as_deref()
                .map(EnvironmentSnapshot::with_background)
                .unwrap_or_default();
            if high_contrast {
                env.classes.insert("vscode-high-contrast".to_string());
            }
            println!("{}", theme_stylesheet(&env));
        }
    }
    Ok(())
}

/// Apply the detected theme to a recorded target and print it as a `:root` rule.
fn theme_stylesheet(env: &EnvironmentSnapshot) -> String {
    let service = ThemeService::new(HostBridge::mock().0, env);
    let mut target = RecordingStyleTarget::default();
    service.apply(&mut target);

    let selector: String = target
        .attributes
        .iter()
        .map(|(name, value)| format!("[{}=\"{}\"]", name, value))
        .collect();
    let mut css = format!(":root{} {{\n", selector);
    for (name, value) in &target.properties {
        css.push_str(&format!("  {}: {};\n", name, value));
    }
    css.push('}');
    css
}

fn command_store(templates: Option<PathBuf>) -> anyhow::Result<CommandBuilderStore> {
    let bridge = HostBridge::mock().0;
    Ok(match templates {
        Some(path) => CommandBuilderStore::with_templates(bridge, load_templates_file(&path)?),
        None => CommandBuilderStore::new(bridge),
    })
}

fn list_templates(mut store: CommandBuilderStore, search: &str, category: &str) {
    store.set_search_query(search);
    store.set_category(category);
    for template in store.filtered_templates() {
        println!("{:<16} [{}] {}", template.id, template.category, template.description);
        for param in &template.parameters {
            println!(
                "    {{{{{}}}}} {:?}{}",
                param.name,
                param.kind,
                if param.required { " (required)" } else { "" }
            );
        }
    }
}

/// Group `name=value` pairs into parameter values using the template's
/// declared types.
fn collect_parameters(
    store: &CommandBuilderStore,
    pairs: Vec<(String, String)>,
) -> ParameterMap {
    let mut parameters = store.state().parameters.clone();
    let Some(template) = store.state().selected.as_ref() else {
        return parameters;
    };
    let mut lists: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in pairs {
        let kind = template.parameter(&name).map(|p| p.kind);
        let parsed = match kind {
            Some(ParameterType::Multiselect) => {
                let items = lists.entry(name.clone()).or_default();
                items.extend(value.split(',').map(|v| v.trim().to_string()));
                ParameterValue::List(items.clone())
            }
            Some(ParameterType::Boolean) => match value.as_str() {
                "true" | "yes" | "1" => ParameterValue::Bool(true),
                "false" | "no" | "0" => ParameterValue::Bool(false),
                _ => ParameterValue::Text(value),
            },
            _ => ParameterValue::Text(value),
        };
        parameters.insert(name, parsed);
    }
    parameters
}

fn build_command(
    mut store: CommandBuilderStore,
    template_id: &str,
    pairs: Vec<(String, String)>,
) -> anyhow::Result<String> {
    store.select_template_by_id(template_id)?;
    let parameters = collect_parameters(&store, pairs);
    store.set_parameters(parameters);

    match store.build_command_result() {
        Some(result) => {
            info!("Built command from template {}", result.template.id);
            Ok(result.command)
        }
        None => anyhow::bail!(
            "Missing required parameters: {}",
            store.missing_parameters().join(", ")
        ),
    }
}

fn pick_context(config: &ContextConfig, background: Option<&str>) -> anyhow::Result<()> {
    let extensions: Vec<&str> = config.extensions.iter().map(String::as_str).collect();
    let excludes: Vec<&str> = config.exclude_patterns.iter().map(String::as_str).collect();

    info!("Scanning for files in {}", config.root_path);
    let files = list_workspace_files(&config.root_path, &extensions, &excludes, true)?;
    if files.is_empty() {
        info!("No files found with the specified extensions");
        return Ok(());
    }

    let bridge = HostBridge::mock().0;
    let mut tree = ContextTreeManager::new(Rc::clone(&bridge), config.max_tokens);
    tree.load(files, BTreeSet::new(), BTreeSet::new());

    if config.auto_select {
        tree.include_all();
    } else {
        let env = background
            .map(EnvironmentSnapshot::with_background)
            .unwrap_or_else(|| EnvironmentSnapshot::with_background("#1e1e1e"));
        let theme = ThemeService::new(bridge, &env);
        let palette = theme.state().colors.to_terminal();
        let mut view = ContextView::new(
            &mut tree,
            palette,
            "Select files to include in your LLM context".to_string(),
        );
        run_tui(&mut view)?;
    }

    let budget = tree.budget();
    let mut listing = String::new();
    for file in tree.included_files() {
        listing.push_str(&format!(
            "{}\t{}\n",
            file.path,
            file.token_estimate.unwrap_or(0)
        ));
    }
    listing.push_str(&format!(
        "# total: {} / {} tokens ({:.1}%)",
        budget.total_tokens, budget.max_tokens, budget.percentage
    ));
    if let Some(message) = budget.level.message() {
        listing.push_str(&format!("\n# {}", message));
    }

    write_output(&listing, config.output_path.as_deref(), config.clipboard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "ptah",
            "build",
            "--template",
            "code-review",
            "--param",
            "lang=Go",
            "--param",
            "code=main.go",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Build {
                template, params, ..
            } => {
                assert_eq!(template, "code-review");
                assert_eq!(
                    params,
                    vec![
                        ("lang".to_string(), "Go".to_string()),
                        ("code".to_string(), "main.go".to_string())
                    ]
                );
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn test_context_defaults() {
        let cli = Cli::try_parse_from(["ptah", "context", "--auto"]).unwrap();
        match cli.command {
            Commands::Context {
                path,
                max_tokens,
                auto,
                ..
            } => {
                assert_eq!(path, ".");
                assert_eq!(max_tokens, DEFAULT_MAX_TOKENS);
                assert!(auto);
            }
            _ => panic!("expected context"),
        }
    }

    #[test]
    fn test_parse_param_rejects_bad_input() {
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
        assert_eq!(
            parse_param("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
    }

    #[test]
    fn test_build_command_with_typed_params() {
        let store = command_store(None).unwrap();
        let command = build_command(
            store,
            "code-review",
            vec![
                ("lang".into(), "Go".into()),
                ("code".into(), "main.go".into()),
                ("focus".into(), "security".into()),
                ("focus".into(), "tests".into()),
                ("suggestions".into(), "no".into()),
            ],
        )
        .unwrap();
        assert_eq!(
            command,
            "Review Go code: main.go\nFocus on: security, tests\nInclude suggestions: false"
        );
    }

    #[test]
    fn test_theme_stylesheet_marks_kind() {
        let css = theme_stylesheet(&EnvironmentSnapshot::with_background("#1e1e1e"));
        assert!(css.starts_with(":root[data-ptah-theme=\"dark\"] {"));
        assert!(css.contains("  --ptah-background: #1e1e1e;\n"));
        assert_eq!(css.lines().filter(|l| l.contains("--ptah-")).count(), 6);
    }

    #[test]
    fn test_build_command_reports_missing() {
        let store = command_store(None).unwrap();
        let err = build_command(store, "code-review", vec![("lang".into(), "Go".into())])
            .unwrap_err();
        assert!(err.to_string().contains("code"));
    }
}
