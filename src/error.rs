//! Error types for the verification harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("App server failed to start: {0}")]
    ServerStartup(String),

    #[error("App server not reachable after {0} attempts")]
    ServerNotReady(usize),

    #[error("Playwright runtime not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightMissing,

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Baseline not found: {0}")]
    BaselineMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
