//! Verification harness for the Devolução web application
//!
//! Drives the application's rendered DOM through Playwright to verify the
//! registration workflows end to end:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    Runner (Rust)                           │
//! ├────────────────────────────────────────────────────────────┤
//! │  Runner                                                    │
//! │    ├── AppServer::spawn()    managed dev server (optional) │
//! │    ├── Driver::run(scenario) one browser session/scenario  │
//! │    │     ├── dialog policy  (auto-accept alerts)           │
//! │    │     ├── console relay  (page console -> tracing)      │
//! │    │     └── step reports   (JSON lines on stdout)         │
//! │    └── VisualTester          screenshot baselines          │
//! ├────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                           │
//! │    ├── steps: navigate / fill / select / click / wait /    │
//! │    │          sleep / assert / screenshot                  │
//! │    └── targets: css | label | role+name, optionally        │
//! │        scoped with `within`                                │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The browser is closed in a `finally` block of every generated script, on
//! success and on failure alike, and a managed server is stopped when the
//! runner drops.

pub mod error;
pub mod playwright;
pub mod runner;
pub mod server;
pub mod spec;
pub mod visual;

pub use error::{HarnessError, HarnessResult};
pub use playwright::{Driver, DriverConfig, ScenarioRun, StepReport};
pub use runner::{Runner, RunnerConfig, ScenarioResult, SuiteReport};
pub use spec::{Scenario, Step, Target};
