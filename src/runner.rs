//! Scenario runner - orchestrates the app server, the Playwright driver and
//! the visual regression pass, and aggregates a suite report.

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{HarnessError, HarnessResult};
use crate::playwright::{Driver, DriverConfig, StepReport};
use crate::server::{AppServer, ServerConfig};
use crate::spec::Scenario;
use crate::visual::{VisualConfig, VisualTester};

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepReport>,
    pub visual: Vec<VisualOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualOutcome {
    pub name: String,
    pub matches: bool,
    pub diff_percent: f64,
    pub diff_image: Option<String>,
}

/// Result of running the whole suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub started_at: String,
    pub results: Vec<ScenarioResult>,
}

/// Configuration for the runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Server to spawn; None targets an already-running app at the driver's
    /// base URL
    pub server: Option<ServerConfig>,
    pub driver: DriverConfig,
    pub visual: VisualConfig,
    pub specs_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            server: None,
            driver: DriverConfig::default(),
            visual: VisualConfig::default(),
            specs_dir: PathBuf::from("specs"),
            output_dir: PathBuf::from("verification"),
        }
    }
}

/// Main scenario runner
pub struct Runner {
    server_config: Option<ServerConfig>,
    driver_config: DriverConfig,
    visual_config: VisualConfig,
    specs_dir: PathBuf,
    output_dir: PathBuf,
    server: Option<AppServer>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            server_config: config.server,
            driver_config: config.driver,
            visual_config: config.visual,
            specs_dir: config.specs_dir,
            output_dir: config.output_dir,
            server: None,
        }
    }

    /// Spawn the managed app server, if one is configured and not yet running
    pub async fn ensure_server(&mut self) -> HarnessResult<()> {
        if self.server.is_some() {
            return Ok(());
        }
        if let Some(config) = self.server_config.clone() {
            let server = AppServer::spawn(config).await?;
            // Scenarios navigate relative to wherever the server came up
            self.driver_config.base_url = server.base_url().to_string();
            self.server = Some(server);
        }
        Ok(())
    }

    pub fn stop_server(&mut self) -> HarnessResult<()> {
        if let Some(mut server) = self.server.take() {
            server.stop()?;
        }
        Ok(())
    }

    /// Run every scenario in the specs directory
    pub async fn run_all(&mut self) -> HarnessResult<SuiteReport> {
        let scenarios = Scenario::load_dir(&self.specs_dir)?;
        self.run_scenarios(&scenarios).await
    }

    /// Run scenarios carrying a tag
    pub async fn run_tagged(&mut self, tag: &str) -> HarnessResult<SuiteReport> {
        let scenarios = Scenario::load_dir(&self.specs_dir)?;
        let filtered: Vec<Scenario> = Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_scenarios(&filtered).await
    }

    /// Run one scenario by name
    pub async fn run_named(&mut self, name: &str) -> HarnessResult<ScenarioResult> {
        let scenarios = Scenario::load_dir(&self.specs_dir)?;
        let scenario = scenarios
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| {
                HarnessError::ScenarioParse(format!("scenario not found: {}", name))
            })?;

        self.ensure_server().await?;
        self.run_scenario(&scenario).await
    }

    /// Run a list of scenarios and aggregate the report
    pub async fn run_scenarios(
        &mut self,
        scenarios: &[Scenario],
    ) -> HarnessResult<SuiteReport> {
        let start = Instant::now();
        let started_at = chrono::Utc::now().to_rfc3339();

        self.ensure_server().await?;

        info!("Running {} scenario(s)...", scenarios.len());

        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        for scenario in scenarios {
            match self.run_scenario(scenario).await {
                Ok(result) => {
                    if result.success {
                        passed += 1;
                        info!("✓ {} ({} ms)", result.name, result.duration_ms);
                    } else {
                        failed += 1;
                        error!(
                            "✗ {} - {}",
                            result.name,
                            result.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    results.push(result);
                }
                Err(e) => {
                    failed += 1;
                    error!("✗ {} - {}", scenario.name, e);
                    results.push(ScenarioResult {
                        name: scenario.name.clone(),
                        success: false,
                        duration_ms: 0,
                        steps: vec![],
                        visual: vec![],
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        Ok(SuiteReport {
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            started_at,
            results,
        })
    }

    /// Run a single scenario: one driver session, then the visual pass
    async fn run_scenario(&mut self, scenario: &Scenario) -> HarnessResult<ScenarioResult> {
        let start = Instant::now();

        let driver = Driver::new(self.driver_config.clone());
        let run = driver.run(scenario).await?;

        let mut scenario_error = run.error;
        let mut visual = Vec::new();

        if scenario.visual_regression && scenario_error.is_none() {
            let tester = VisualTester::new(self.visual_config.clone())?;

            for name in &run.screenshots {
                match tester.compare(name, Some(scenario.visual_threshold)) {
                    Ok(diff) => {
                        if !diff.matches {
                            scenario_error = Some(format!(
                                "visual regression in '{}': {:.2}% pixels differ",
                                name, diff.diff_percent
                            ));
                        }
                        visual.push(VisualOutcome {
                            name: name.clone(),
                            matches: diff.matches,
                            diff_percent: diff.diff_percent,
                            diff_image: diff
                                .diff_image_path
                                .map(|p| p.to_string_lossy().to_string()),
                        });
                    }
                    Err(HarnessError::BaselineMissing(_)) => {
                        // First run: record the screenshot, nothing to compare
                        info!(
                            "No baseline for '{}' - run with --update-baselines to create one",
                            name
                        );
                    }
                    Err(e) => {
                        scenario_error = Some(format!("visual comparison error: {}", e));
                    }
                }
            }
        }

        Ok(ScenarioResult {
            name: scenario.name.clone(),
            success: scenario_error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            steps: run.steps,
            visual,
            error: scenario_error,
        })
    }

    /// Promote all current screenshots to baselines
    pub fn update_baselines(&self) -> HarnessResult<()> {
        let tester = VisualTester::new(self.visual_config.clone())?;
        tester.update_all_baselines()
    }

    /// Write the suite report as JSON
    pub fn write_report(&self, report: &SuiteReport) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("report.json");
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;

        info!("Report written to: {}", path.display());
        Ok(path)
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        let _ = self.stop_server();
    }
}
