//! Host theme classification and palette resolution.
//!
//! High-contrast markers win over everything; otherwise the editor
//! background's perceived brightness decides between light and dark.

use crate::core::store::{ListenerId, Store};
use crate::infra::host_bridge::{HostBridge, Subscription, types};
use log::{debug, info, warn};
use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

pub const EDITOR_BACKGROUND: &str = "--vscode-editor-background";
pub const EDITOR_FOREGROUND: &str = "--vscode-editor-foreground";
pub const BUTTON_BACKGROUND: &str = "--vscode-button-background";
pub const FOCUS_BORDER: &str = "--vscode-focusBorder";
pub const SIDEBAR_BACKGROUND: &str = "--vscode-sideBar-background";
pub const THEME_KIND_ATTRIBUTE: &str = "data-vscode-theme-kind";
pub const THEME_MARKER_ATTRIBUTE: &str = "data-ptah-theme";

const HIGH_CONTRAST_CLASSES: &[&str] = &["vscode-high-contrast", "vscode-high-contrast-light"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThemeKind {
    #[default]
    Light,
    Dark,
    HighContrast,
}

impl ThemeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeKind::Light => "light",
            ThemeKind::Dark => "dark",
            ThemeKind::HighContrast => "high-contrast",
        }
    }
}

/// What the detector can observe about the host page.
pub trait HostEnvironment {
    fn css_variable(&self, name: &str) -> Option<String>;
    fn has_class(&self, name: &str) -> bool;
    fn attribute(&self, name: &str) -> Option<String>;
}

/// Serializable copy of the host's theme signals, as pushed with `theme:changed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSnapshot {
    #[serde(default)]
    pub css_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub classes: BTreeSet<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl EnvironmentSnapshot {
    pub fn with_background(background: &str) -> Self {
        let mut snapshot = Self::default();
        snapshot
            .css_variables
            .insert(EDITOR_BACKGROUND.to_string(), background.to_string());
        snapshot
    }
}

impl HostEnvironment for EnvironmentSnapshot {
    fn css_variable(&self, name: &str) -> Option<String> {
        self.css_variables
            .get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn has_class(&self, name: &str) -> bool {
        self.classes.contains(name)
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }
}

/// Receives resolved theme values. In a webview this is the document root.
pub trait StyleTarget {
    fn set_property(&mut self, name: &str, value: &str);
    fn set_attribute(&mut self, name: &str, value: &str);
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordingStyleTarget {
    pub properties: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, String>,
}

impl StyleTarget for RecordingStyleTarget {
    fn set_property(&mut self, name: &str, value: &str) {
        self.properties.insert(name.to_string(), value.to_string());
    }

    fn set_attribute(&mut self, name: &str, value: &str) {
        self.attributes.insert(name.to_string(), value.to_string());
    }
}

/// Parse `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(...)` or `rgba(...)`.
pub fn parse_color(value: &str) -> Option<(u8, u8, u8)> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        return match hex.len() {
            3 | 4 => {
                let mut digits = hex.chars().map(|c| c.to_digit(16).map(|d| (d * 17) as u8));
                Some((digits.next()??, digits.next()??, digits.next()??))
            }
            6 | 8 => Some((channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
            _ => None,
        };
    }

    let lower = value.to_ascii_lowercase();
    let inner = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let mut parts = inner
        .split([',', ' ', '/'])
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<f64>().ok().map(|v| v.clamp(0.0, 255.0).round() as u8));
    Some((parts.next()??, parts.next()??, parts.next()??))
}

pub fn brightness((r, g, b): (u8, u8, u8)) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

fn has_high_contrast_marker(env: &dyn HostEnvironment) -> bool {
    HIGH_CONTRAST_CLASSES.iter().any(|class| env.has_class(class))
        || env
            .attribute(THEME_KIND_ATTRIBUTE)
            .is_some_and(|kind| kind.contains("high-contrast"))
}

pub fn detect_theme(env: &dyn HostEnvironment) -> ThemeKind {
    if has_high_contrast_marker(env) {
        return ThemeKind::HighContrast;
    }

    match env.css_variable(EDITOR_BACKGROUND) {
        Some(background) => match parse_color(&background) {
            Some(rgb) if brightness(rgb) > 128.0 => ThemeKind::Light,
            Some(_) => ThemeKind::Dark,
            None => {
                warn!("Unrecognized editor background color: {}", background);
                ThemeKind::Light
            }
        },
        None => ThemeKind::Light,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThemeColors {
    pub primary: String,
    pub accent: String,
    pub background: String,
    pub surface: String,
    pub text: String,
    pub border: String,
}

impl ThemeColors {
    /// Gold-and-lapis defaults used when the host does not provide a value.
    pub fn egyptian(kind: ThemeKind) -> Self {
        let (primary, accent, background, surface, text, border) = match kind {
            ThemeKind::Light => ("#b8860b", "#1e40af", "#fdf6e3", "#f5ebd3", "#3b2f1e", "#d4c4a0"),
            ThemeKind::Dark => ("#d4af37", "#3b82f6", "#1a1611", "#26201a", "#f4e4bc", "#4a3f2f"),
            ThemeKind::HighContrast => {
                ("#ffd700", "#00bfff", "#000000", "#000000", "#ffffff", "#ffd700")
            }
        };
        Self {
            primary: primary.to_string(),
            accent: accent.to_string(),
            background: background.to_string(),
            surface: surface.to_string(),
            text: text.to_string(),
            border: border.to_string(),
        }
    }

    pub fn resolve(kind: ThemeKind, env: &dyn HostEnvironment) -> Self {
        let defaults = Self::egyptian(kind);
        let pick = |name: &str, fallback: String| env.css_variable(name).unwrap_or(fallback);
        Self {
            primary: defaults.primary,
            accent: pick(FOCUS_BORDER, defaults.accent),
            background: pick(EDITOR_BACKGROUND, defaults.background),
            surface: pick(SIDEBAR_BACKGROUND, defaults.surface),
            text: pick(EDITOR_FOREGROUND, defaults.text),
            border: pick(BUTTON_BACKGROUND, defaults.border),
        }
    }

    pub fn to_terminal(&self) -> TerminalPalette {
        let color = |value: &str| {
            parse_color(value)
                .map(|(r, g, b)| Color::Rgb(r, g, b))
                .unwrap_or(Color::Reset)
        };
        TerminalPalette {
            primary: color(&self.primary),
            accent: color(&self.accent),
            background: color(&self.background),
            text: color(&self.text),
            muted: color(&self.border),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminalPalette {
    pub primary: Color,
    pub accent: Color,
    pub background: Color,
    pub text: Color,
    pub muted: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThemeState {
    pub kind: ThemeKind,
    pub colors: ThemeColors,
}

impl ThemeState {
    pub fn from_environment(env: &dyn HostEnvironment) -> Self {
        let kind = detect_theme(env);
        Self {
            kind,
            colors: ThemeColors::resolve(kind, env),
        }
    }

    pub fn css_variables(&self) -> BTreeMap<String, String> {
        let c = &self.colors;
        [
            ("--ptah-primary", &c.primary),
            ("--ptah-accent", &c.accent),
            ("--ptah-background", &c.background),
            ("--ptah-surface", &c.surface),
            ("--ptah-text", &c.text),
            ("--ptah-border", &c.border),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
    }
}

impl Default for ThemeState {
    fn default() -> Self {
        Self {
            kind: ThemeKind::Light,
            colors: ThemeColors::egyptian(ThemeKind::Light),
        }
    }
}

/// Tracks the host theme. Host pushes (`theme:changed`) are the primary
/// signal; [`ThemeService::refresh`] is there for callers that poll.
pub struct ThemeService {
    bridge: Rc<HostBridge>,
    subscription: Subscription,
    store: Store<ThemeState>,
}

impl ThemeService {
    pub fn new(bridge: Rc<HostBridge>, env: &dyn HostEnvironment) -> Self {
        let subscription = bridge.subscribe().with_types(&[types::THEME_CHANGED]);
        let state = ThemeState::from_environment(env);
        info!("Initial theme: {}", state.kind.as_str());
        Self {
            bridge,
            subscription,
            store: Store::new(state),
        }
    }

    pub fn state(&self) -> &ThemeState {
        self.store.get()
    }

    pub fn kind(&self) -> ThemeKind {
        self.state().kind
    }

    pub fn subscribe(&mut self, listener: impl Fn(&ThemeState) + 'static) -> ListenerId {
        self.store.subscribe(listener)
    }

    /// Ask the host to push its current theme signals.
    pub fn request_theme(&self) {
        self.bridge.post(types::THEME_GET, None);
    }

    /// Re-detect from `env`. Listeners are notified only when the
    /// classification changes; returns the new kind in that case. Colors
    /// always follow `env`.
    pub fn refresh(&mut self, env: &dyn HostEnvironment) -> Option<ThemeKind> {
        let next = ThemeState::from_environment(env);
        if next.kind == self.state().kind {
            debug!("Theme unchanged ({})", next.kind.as_str());
            self.store.update_silently(|state| state.colors = next.colors);
            return None;
        }
        info!(
            "Theme changed: {} -> {}",
            self.state().kind.as_str(),
            next.kind.as_str()
        );
        let kind = next.kind;
        self.store.update(|state| *state = next);
        Some(kind)
    }

    pub fn poll_host(&mut self) -> Option<ThemeKind> {
        let mut changed = None;
        while let Some(message) = self.subscription.try_next() {
            let data = message.data.unwrap_or(Value::Null);
            match serde_json::from_value::<EnvironmentSnapshot>(data) {
                Ok(snapshot) => {
                    if let Some(kind) = self.refresh(&snapshot) {
                        changed = Some(kind);
                    }
                }
                Err(e) => warn!("Ignoring malformed theme payload: {}", e),
            }
        }
        changed
    }

    /// Write the palette as CSS custom properties and mark the theme kind.
    pub fn apply(&self, target: &mut dyn StyleTarget) {
        let state = self.state();
        for (name, value) in state.css_variables() {
            target.set_property(&name, &value);
        }
        target.set_attribute(THEME_MARKER_ATTRIBUTE, state.kind.as_str());
    }
}
