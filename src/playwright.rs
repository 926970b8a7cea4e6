//! Playwright script generation and execution
//!
//! Each scenario becomes one Node.js program: a single browser and page for
//! the whole step sequence, so form state survives from step to step. The
//! program reports every step as a JSON line on stdout and always closes the
//! browser in a `finally` block.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::spec::{DialogPolicy, Scenario, Step, Target};

/// Configuration for the Playwright driver
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Base URL of the application under test
    pub base_url: String,

    /// Directory for screenshots
    pub screenshot_dir: PathBuf,

    /// Browser engine
    pub browser: BrowserKind,

    /// Run without a visible browser window
    pub headless: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5173".to_string(),
            screenshot_dir: PathBuf::from("verification/screenshots"),
            browser: BrowserKind::Chromium,
            headless: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

/// Result of a single executed step, parsed from the script's stdout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step: usize,
    pub name: String,
    pub ok: bool,
    pub ms: u64,
    #[serde(default)]
    pub error: Option<String>,
    /// Screenshot name, present for screenshot steps
    #[serde(default)]
    pub screenshot: Option<String>,
}

/// Outcome of running one scenario end to end
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    pub steps: Vec<StepReport>,
    pub success: bool,
    /// Names of screenshots taken during the run
    pub screenshots: Vec<String>,
    pub error: Option<String>,
}

/// Drives the application through Playwright
pub struct Driver {
    config: DriverConfig,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    /// Check that Node.js can resolve the playwright package
    pub fn check_runtime() -> HarnessResult<()> {
        let status = std::process::Command::new("node")
            .args(["-e", "require.resolve('playwright')"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(HarnessError::PlaywrightMissing),
        }
    }

    /// Build the complete Node.js program for a scenario
    pub fn build_script(&self, scenario: &Scenario) -> String {
        let mut script = String::new();

        script.push_str("const { chromium, firefox, webkit } = require('playwright');\n\n");
        script.push_str("(async () => {\n");
        script.push_str(&format!(
            "  const browser = await {}.launch({{ headless: {} }});\n",
            self.config.browser.as_str(),
            self.config.headless
        ));
        script.push_str(&format!(
            "  const context = await browser.newContext({{ viewport: {{ width: {}, height: {} }} }});\n",
            scenario.viewport.width, scenario.viewport.height
        ));
        script.push_str("  const page = await context.newPage();\n");
        script.push_str(&format!(
            "  const base = '{}';\n",
            js(&self.config.base_url)
        ));

        match scenario.dialogs {
            DialogPolicy::Accept => {
                script.push_str("  page.on('dialog', dialog => dialog.accept());\n");
            }
            DialogPolicy::Dismiss => {
                script.push_str("  page.on('dialog', dialog => dialog.dismiss());\n");
            }
            DialogPolicy::Ignore => {}
        }

        if scenario.capture_console {
            script.push_str(
                "  page.on('console', msg => console.log('CONSOLE[' + msg.type() + '] ' + msg.text()));\n",
            );
        }

        // Step wrapper: emits one JSON line per step, rethrows on failure so
        // the remaining steps are skipped and the process exits nonzero.
        script.push_str(
            r#"  const step = async (n, name, fn, extra) => {
    const started = Date.now();
    try {
      await fn();
      console.log(JSON.stringify(Object.assign({ step: n, name, ok: true, ms: Date.now() - started }, extra || {})));
    } catch (error) {
      console.log(JSON.stringify({ step: n, name, ok: false, ms: Date.now() - started, error: String((error && error.message) || error) }));
      throw error;
    }
  };

  try {
"#,
        );

        for (i, step) in scenario.steps.iter().enumerate() {
            script.push_str(&self.step_js(step, i + 1));
        }

        script.push_str(
            r#"  } catch (error) {
    process.exitCode = 1;
  } finally {
    await browser.close();
  }
})();
"#,
        );

        script
    }

    /// Emit the `await step(...)` block for one step
    fn step_js(&self, step: &Step, index: usize) -> String {
        let name = js(&step.name());
        let body = self.step_body(step);
        let extra = match step {
            Step::Screenshot { name, .. } => format!(", {{ screenshot: '{}' }}", js(name)),
            _ => String::new(),
        };

        format!(
            "    await step({index}, '{name}', async () => {{\n{body}    }}{extra});\n",
        )
    }

    fn step_body(&self, step: &Step) -> String {
        match step {
            Step::Navigate {
                url,
                wait_for_selector,
            } => {
                let mut body = format!("      await page.goto(base + '{}');\n", js(url));
                if let Some(selector) = wait_for_selector {
                    body.push_str(&format!(
                        "      await page.waitForSelector('{}');\n",
                        js(selector)
                    ));
                }
                body
            }
            Step::Fill { target, value } => {
                format!(
                    "      await {}.fill('{}');\n",
                    locator_js(target),
                    js(value)
                )
            }
            Step::Select { target, value } => {
                format!(
                    "      await {}.selectOption('{}');\n",
                    locator_js(target),
                    js(value)
                )
            }
            Step::Click { target, timeout_ms } => {
                format!(
                    "      await {}.click({{ timeout: {} }});\n",
                    locator_js(target),
                    timeout_ms.unwrap_or(5000)
                )
            }
            Step::Check { target } => {
                format!("      await {}.check();\n", locator_js(target))
            }
            Step::Press { target, key } => {
                if target.is_empty() {
                    format!("      await page.keyboard.press('{}');\n", js(key))
                } else {
                    format!(
                        "      await {}.press('{}');\n",
                        locator_js(target),
                        js(key)
                    )
                }
            }
            Step::Wait {
                selector,
                timeout_ms,
                state,
            } => {
                format!(
                    "      await page.locator('{}').waitFor({{ state: '{}', timeout: {} }});\n",
                    js(selector),
                    state.as_str(),
                    timeout_ms
                )
            }
            Step::Sleep { ms } => {
                format!("      await page.waitForTimeout({});\n", ms)
            }
            Step::Assert {
                selector,
                visible,
                text,
                text_contains,
                count,
            } => {
                let loc = format!("page.locator('{}')", js(selector));
                let mut body = String::new();

                if let Some(visible) = visible {
                    let state = if *visible { "visible" } else { "hidden" };
                    body.push_str(&format!(
                        "      await {}.waitFor({{ state: '{}', timeout: 5000 }});\n",
                        loc, state
                    ));
                }
                if text.is_some() || text_contains.is_some() {
                    body.push_str(&format!(
                        "      const actual = (await {}.innerText()).trim();\n",
                        loc
                    ));
                }
                if let Some(expected) = text {
                    body.push_str(&format!(
                        "      if (actual !== '{0}') throw new Error('expected text \"{0}\", got \"' + actual + '\"');\n",
                        js(expected)
                    ));
                }
                if let Some(fragment) = text_contains {
                    body.push_str(&format!(
                        "      if (!actual.includes('{0}')) throw new Error('expected text containing \"{0}\", got \"' + actual + '\"');\n",
                        js(fragment)
                    ));
                }
                if let Some(expected) = count {
                    body.push_str(&format!(
                        "      const n = await {}.count();\n      if (n !== {1}) throw new Error('expected {1} elements, found ' + n);\n",
                        loc, expected
                    ));
                }
                body
            }
            Step::Screenshot {
                name,
                selector,
                full_page,
            } => {
                let path = self.config.screenshot_dir.join(format!("{}.png", name));
                let path = js(&path.to_string_lossy());
                match selector {
                    Some(selector) => format!(
                        "      await page.locator('{}').screenshot({{ path: '{}' }});\n",
                        js(selector),
                        path
                    ),
                    None => format!(
                        "      await page.screenshot({{ path: '{}', fullPage: {} }});\n",
                        path, full_page
                    ),
                }
            }
            Step::Log { message } => {
                format!("      console.log('[scenario] {}');\n", js(message))
            }
        }
    }

    /// Run a scenario to completion and collect its step reports
    pub async fn run(&self, scenario: &Scenario) -> HarnessResult<ScenarioRun> {
        Self::check_runtime()?;
        std::fs::create_dir_all(&self.config.screenshot_dir)?;

        let script = self.build_script(scenario);

        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("scenario.js");
        std::fs::write(&script_path, &script)?;

        debug!(scenario = %scenario.name, path = %script_path.display(), "running playwright script");

        let output = TokioCommand::new("node")
            .arg(&script_path)
            .output()
            .await?;

        parse_run_output(
            &scenario.name,
            &String::from_utf8_lossy(&output.stdout),
            output.status.success(),
            &String::from_utf8_lossy(&output.stderr),
        )
    }
}

/// Turn a finished script's output into a scenario run.
///
/// Step reports arrive as JSON lines; console-relay lines are forwarded to
/// the harness log; anything else on stdout is ignored. A nonzero exit with
/// no failing step record (e.g. a browser launch failure) is a driver error
/// carrying stderr.
fn parse_run_output(
    scenario: &str,
    stdout: &str,
    exit_ok: bool,
    stderr: &str,
) -> HarnessResult<ScenarioRun> {
    let mut steps: Vec<StepReport> = Vec::new();
    for line in stdout.lines() {
        if relay_console_line(scenario, line) {
            continue;
        }
        if line.starts_with('{') {
            match serde_json::from_str::<StepReport>(line) {
                Ok(report) => steps.push(report),
                Err(e) => debug!("ignoring unparseable output line: {} ({})", line, e),
            }
        } else if !line.trim().is_empty() {
            debug!(scenario = %scenario, "script output: {}", line);
        }
    }

    let failed_step = steps.iter().find(|s| !s.ok).cloned();
    let success = exit_ok && failed_step.is_none();

    // A crash before the first step report has no failing step to blame
    if !exit_ok && failed_step.is_none() {
        return Err(HarnessError::Driver(format!(
            "script exited with an error before reporting a step failure:\n{}",
            stderr
        )));
    }

    let screenshots = steps
        .iter()
        .filter(|s| s.ok)
        .filter_map(|s| s.screenshot.clone())
        .collect();

    if let Some(failed) = &failed_step {
        info!(
            scenario = %scenario,
            step = %failed.name,
            "step failed: {}",
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(ScenarioRun {
        success,
        screenshots,
        error: failed_step.map(|s| {
            format!(
                "step '{}' failed: {}",
                s.name,
                s.error.unwrap_or_else(|| "unknown error".to_string())
            )
        }),
        steps,
    })
}

fn console_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^CONSOLE\[([a-z]+)\] (.*)$").expect("console relay pattern is valid")
    })
}

/// Forward a `CONSOLE[type] text` relay line to the harness log.
/// Returns false when the line is not a console relay.
fn relay_console_line(scenario: &str, line: &str) -> bool {
    let Some(captures) = console_line_regex().captures(line) else {
        return false;
    };
    let kind = &captures[1];
    let text = &captures[2];

    match kind {
        "error" => warn!(scenario = %scenario, "page console error: {}", text),
        "warning" => warn!(scenario = %scenario, "page console warning: {}", text),
        _ => debug!(scenario = %scenario, "page console: {}", text),
    }
    true
}

/// Playwright locator expression for a target
fn locator_js(target: &Target) -> String {
    let scope = match &target.within {
        Some(selector) => format!("page.locator('{}')", js(selector)),
        None => "page".to_string(),
    };

    if let Some(selector) = &target.css {
        format!("{}.locator('{}')", scope, js(selector))
    } else if let Some(label) = &target.label {
        format!("{}.getByLabel('{}')", scope, js(label))
    } else if let Some(role) = &target.role {
        format!(
            "{}.getByRole('{}', {{ name: '{}' }})",
            scope,
            js(&role.role),
            js(&role.name)
        )
    } else {
        // Validation rejects empty targets for locator-based steps
        scope
    }
}

/// Escape a string for interpolation into a single-quoted JS literal
fn js(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}
