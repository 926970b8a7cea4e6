//! Scenario runner entry point
//!
//! Runs the YAML verification scenarios against the Devolução web app.
//! Run with: cargo test --test e2e -- [args]
//!
//! By default the harness targets an already-running dev server at
//! http://127.0.0.1:5173; pass --server to have it spawn and manage one.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use devolucao_e2e::playwright::BrowserKind;
use devolucao_e2e::runner::{Runner, RunnerConfig, SuiteReport};
use devolucao_e2e::server::ServerConfig;
use devolucao_e2e::visual::VisualConfig;
use devolucao_e2e::{DriverConfig, HarnessResult};

#[derive(Parser, Debug)]
#[command(name = "devolucao-e2e")]
#[command(about = "Verification harness for the Devolução web app")]
struct Args {
    /// Path to the scenario specs directory
    #[arg(short, long, default_value = "specs")]
    specs: PathBuf,

    /// Run only scenarios carrying this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only a specific scenario by name
    #[arg(short, long)]
    name: Option<String>,

    /// Base URL of an already-running app server
    #[arg(long, default_value = "http://127.0.0.1:5173")]
    base_url: String,

    /// Spawn and manage the app server with this command
    /// (e.g. "npm run dev -- --port {port}")
    #[arg(long)]
    server: Option<String>,

    /// Working directory for the server command
    #[arg(long)]
    server_dir: Option<PathBuf>,

    /// Seconds to wait for the managed server to become ready
    #[arg(long, default_value = "60")]
    server_timeout: u64,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long, default_value = "chromium")]
    browser: String,

    /// Run the browser headless
    #[arg(long, default_value = "true")]
    headless: bool,

    /// Visual diff threshold (percentage of pixels)
    #[arg(long, default_value = "0.5")]
    visual_threshold: f64,

    /// Update visual baselines from this run's screenshots
    #[arg(long)]
    update_baselines: bool,

    /// Output directory for screenshots, diffs and the report
    #[arg(short, long, default_value = "verification")]
    output: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(run(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn run(args: Args) -> HarnessResult<bool> {
    let browser = match args.browser.as_str() {
        "firefox" => BrowserKind::Firefox,
        "webkit" => BrowserKind::Webkit,
        _ => BrowserKind::Chromium,
    };

    let server = args.server.as_ref().map(|command| ServerConfig {
        command: command.split_whitespace().map(String::from).collect(),
        workdir: args.server_dir.clone(),
        startup_timeout: Duration::from_secs(args.server_timeout),
        ..ServerConfig::default()
    });

    let config = RunnerConfig {
        server,
        driver: DriverConfig {
            base_url: args.base_url,
            screenshot_dir: args.output.join("screenshots"),
            browser,
            headless: args.headless,
        },
        visual: VisualConfig {
            baseline_dir: args.output.join("baselines"),
            actual_dir: args.output.join("screenshots"),
            diff_dir: args.output.join("diffs"),
            threshold: args.visual_threshold,
            auto_update: args.update_baselines,
        },
        specs_dir: args.specs,
        output_dir: args.output,
    };

    let mut runner = Runner::new(config);

    let report = if let Some(name) = args.name {
        let result = runner.run_named(&name).await?;
        SuiteReport {
            total: 1,
            passed: usize::from(result.success),
            failed: usize::from(!result.success),
            duration_ms: result.duration_ms,
            started_at: chrono::Utc::now().to_rfc3339(),
            results: vec![result],
        }
    } else if let Some(tag) = args.tag {
        runner.run_tagged(&tag).await?
    } else {
        runner.run_all().await?
    };

    if args.update_baselines {
        runner.update_baselines()?;
    }

    runner.write_report(&report)?;

    Ok(report.failed == 0)
}
