//! Declarative YAML scenario specifications

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{HarnessError, HarnessResult};

/// A complete verification scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Viewport size for the browser
    #[serde(default = "default_viewport")]
    pub viewport: Viewport,

    /// How browser dialogs (alert/confirm/prompt) are handled
    #[serde(default)]
    pub dialogs: DialogPolicy,

    /// Relay page console messages into the harness log
    #[serde(default = "default_true")]
    pub capture_console: bool,

    /// Steps to execute in order, one browser session for the whole scenario
    pub steps: Vec<Step>,

    /// Whether screenshots are compared against stored baselines
    #[serde(default)]
    pub visual_regression: bool,

    /// Threshold for visual diff (0.0 - 100.0 percent)
    #[serde(default = "default_threshold")]
    pub visual_threshold: f64,
}

fn default_viewport() -> Viewport {
    Viewport {
        width: 1280,
        height: 720,
    }
}

fn default_threshold() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Policy for browser dialogs raised by the page.
///
/// The registration forms confirm submissions with a plain `alert()`; an
/// unhandled dialog would block every later step, so the default accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogPolicy {
    #[default]
    Accept,
    Dismiss,
    /// Leave dialogs to Playwright's default handling
    Ignore,
}

/// How an element is located on the page.
///
/// Exactly one of `css`, `label` or `role` must be set. `within` optionally
/// scopes the lookup to a CSS-selected container, which is how repeated form
/// sections (e.g. `.part-row[data-part-index="0"]`) are disambiguated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Target {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,

    /// Accessible label, as rendered in the form's `<label>` elements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// ARIA role plus accessible name, e.g. a button by its visible text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleTarget>,

    /// CSS selector of a container to search within
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleTarget {
    pub role: String,
    pub name: String,
}

impl Target {
    pub fn css(selector: impl Into<String>) -> Self {
        Target {
            css: Some(selector.into()),
            ..Target::default()
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Target {
            label: Some(label.into()),
            ..Target::default()
        }
    }

    fn kind_count(&self) -> usize {
        usize::from(self.css.is_some())
            + usize::from(self.label.is_some())
            + usize::from(self.role.is_some())
    }

    /// True when no locator kind is set (only valid for keyboard presses)
    pub fn is_empty(&self) -> bool {
        self.kind_count() == 0
    }

    pub fn validate(&self) -> HarnessResult<()> {
        match self.kind_count() {
            1 => Ok(()),
            0 => Err(HarnessError::InvalidTarget(
                "one of css, label or role is required".to_string(),
            )),
            _ => Err(HarnessError::InvalidTarget(format!(
                "css, label and role are mutually exclusive: {}",
                self.describe()
            ))),
        }
    }

    /// Short human-readable form used in step names and logs
    pub fn describe(&self) -> String {
        let base = if let Some(css) = &self.css {
            css.clone()
        } else if let Some(label) = &self.label {
            label.clone()
        } else if let Some(role) = &self.role {
            format!("{}[name={}]", role.role, role.name)
        } else {
            "<keyboard>".to_string()
        };

        match &self.within {
            Some(scope) => format!("{} >> {}", scope, base),
            None => base,
        }
    }
}

/// A single step in a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a URL (relative to the base URL)
    Navigate {
        url: String,
        #[serde(default)]
        wait_for_selector: Option<String>,
    },

    /// Fill an input field
    Fill {
        #[serde(flatten)]
        target: Target,
        value: String,
    },

    /// Select a dropdown option by value
    Select {
        #[serde(flatten)]
        target: Target,
        value: String,
    },

    /// Click an element
    Click {
        #[serde(flatten)]
        target: Target,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Check a checkbox
    Check {
        #[serde(flatten)]
        target: Target,
    },

    /// Press a key, on an element or globally when no target is given
    Press {
        #[serde(flatten)]
        target: Target,
        key: String,
    },

    /// Wait for an element to reach a state
    Wait {
        selector: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
        #[serde(default)]
        state: WaitState,
    },

    /// Wait for a fixed amount of time. A liveness workaround, not a
    /// synchronization primitive - prefer `wait` on a selector.
    Sleep { ms: u64 },

    /// Assert something about an element
    Assert {
        selector: String,
        #[serde(default)]
        visible: Option<bool>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        text_contains: Option<String>,
        #[serde(default)]
        count: Option<usize>,
    },

    /// Take a screenshot
    Screenshot {
        name: String,
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        full_page: bool,
    },

    /// Log a message into the scenario output
    Log { message: String },
}

fn default_wait_timeout() -> u64 {
    5000
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

impl Step {
    /// Short name used in step reports
    pub fn name(&self) -> String {
        match self {
            Step::Navigate { url, .. } => format!("navigate:{}", url),
            Step::Fill { target, .. } => format!("fill:{}", target.describe()),
            Step::Select { target, .. } => format!("select:{}", target.describe()),
            Step::Click { target, .. } => format!("click:{}", target.describe()),
            Step::Check { target } => format!("check:{}", target.describe()),
            Step::Press { key, .. } => format!("press:{}", key),
            Step::Wait { selector, .. } => format!("wait:{}", selector),
            Step::Sleep { ms } => format!("sleep:{}ms", ms),
            Step::Assert { selector, .. } => format!("assert:{}", selector),
            Step::Screenshot { name, .. } => format!("screenshot:{}", name),
            Step::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }

    fn validate(&self) -> HarnessResult<()> {
        match self {
            Step::Fill { target, .. }
            | Step::Select { target, .. }
            | Step::Click { target, .. }
            | Step::Check { target } => target.validate(),
            // An empty target means the global keyboard
            Step::Press { target, .. } if target.is_empty() => Ok(()),
            Step::Press { target, .. } => target.validate(),
            _ => Ok(()),
        }
    }
}

impl Scenario {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        let scenario: Scenario = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| {
            HarnessError::ScenarioParse(format!("{}: {}", path.display(), e))
        })
    }

    /// Load all scenarios from a directory, sorted by file name
    pub fn load_dir(dir: &Path) -> HarnessResult<Vec<Self>> {
        let mut entries: Vec<_> = walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        entries.sort_by(|a, b| a.path().cmp(b.path()));

        let mut scenarios = Vec::new();
        for entry in entries {
            scenarios.push(Self::from_file(entry.path())?);
        }
        Ok(scenarios)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    fn validate(&self) -> HarnessResult<()> {
        if self.steps.is_empty() {
            return Err(HarnessError::ScenarioParse(format!(
                "scenario '{}' has no steps",
                self.name
            )));
        }
        for step in &self.steps {
            step.validate().map_err(|e| {
                HarnessError::ScenarioParse(format!(
                    "scenario '{}', step '{}': {}",
                    self.name,
                    step.name(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_form_scenario_with_label_and_role_targets() {
        let yaml = r#"
name: add-client
description: Register a client through the people form
tags:
  - smoke
steps:
  - action: navigate
    url: /pages/cadastro-pessoas.html
  - action: wait
    selector: '#navbarNav'
  - action: fill
    label: Nome Completo
    value: Test Client
  - action: click
    role: { role: button, name: Salvar }
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.name, "add-client");
        assert_eq!(scenario.steps.len(), 4);
        assert_eq!(scenario.dialogs, DialogPolicy::Accept);
        assert!(scenario.capture_console);

        match &scenario.steps[2] {
            Step::Fill { target, value } => {
                assert_eq!(target.label.as_deref(), Some("Nome Completo"));
                assert_eq!(value, "Test Client");
            }
            other => panic!("unexpected step: {:?}", other),
        }
        match &scenario.steps[3] {
            Step::Click { target, .. } => {
                let role = target.role.as_ref().unwrap();
                assert_eq!(role.role, "button");
                assert_eq!(role.name, "Salvar");
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn parse_scoped_target() {
        let yaml = r#"
name: scoped
steps:
  - action: fill
    within: '.part-row[data-part-index="0"]'
    label: Quantidade
    value: '1'
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        match &scenario.steps[0] {
            Step::Fill { target, .. } => {
                assert_eq!(
                    target.within.as_deref(),
                    Some(r#".part-row[data-part-index="0"]"#)
                );
                assert_eq!(
                    target.describe(),
                    r#".part-row[data-part-index="0"] >> Quantidade"#
                );
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn target_without_locator_is_rejected() {
        let yaml = r#"
name: bad
steps:
  - action: click
    value: nothing-to-click
"#;
        // `value` is not a locator; the click target ends up empty
        let err = Scenario::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("click"), "got: {}", err);
    }

    #[test]
    fn target_with_two_locators_is_rejected() {
        let target = Target {
            css: Some("#salvar".to_string()),
            label: Some("Salvar".to_string()),
            ..Target::default()
        };
        assert!(target.validate().is_err());
    }

    #[test]
    fn empty_scenario_is_rejected() {
        let yaml = r#"
name: empty
steps: []
"#;
        assert!(Scenario::from_yaml(yaml).is_err());
    }

    #[test]
    fn keyboard_press_needs_no_target() {
        let yaml = r#"
name: keys
steps:
  - action: press
    key: Enter
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        match &scenario.steps[0] {
            Step::Press { target, key } => {
                assert!(target.is_empty());
                assert_eq!(key, "Enter");
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn filter_by_tag_matches_subset() {
        let smoke = Scenario::from_yaml(
            "name: a\ntags: [smoke]\nsteps:\n  - action: sleep\n    ms: 1\n",
        )
        .unwrap();
        let other = Scenario::from_yaml(
            "name: b\ntags: [slow]\nsteps:\n  - action: sleep\n    ms: 1\n",
        )
        .unwrap();
        let all = vec![smoke, other];
        let filtered = Scenario::filter_by_tag(&all, "smoke");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "a");
    }

    #[test]
    fn dialog_policy_parses_from_yaml() {
        let yaml = r#"
name: dialogs
dialogs: dismiss
steps:
  - action: sleep
    ms: 1
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.dialogs, DialogPolicy::Dismiss);
    }

    #[test]
    fn wait_timeout_defaults_to_five_seconds() {
        let yaml = r#"
name: waits
steps:
  - action: wait
    selector: '#navbarNav'
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        match &scenario.steps[0] {
            Step::Wait {
                timeout_ms, state, ..
            } => {
                assert_eq!(*timeout_ms, 5000);
                assert_eq!(*state, WaitState::Visible);
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }
}
