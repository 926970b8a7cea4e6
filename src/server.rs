//! App server management - spawning and readiness-checking the dev server
//!
//! The application under test is served by an external command (typically a
//! Vite dev server). The harness can spawn it, wait until it answers HTTP,
//! and guarantee it is torn down when the run ends. Scenarios can also target
//! an already-running server, in which case this module is not involved.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{HarnessError, HarnessResult};

/// Handle to a running app server process
pub struct AppServer {
    child: Child,
    base_url: String,
    pub port: u16,
}

impl AppServer {
    /// Spawn the configured server command and wait until it serves HTTP.
    ///
    /// Occurrences of `{port}` in the arguments are replaced with the chosen
    /// port, so a config like `npm run dev -- --port {port}` works with an
    /// auto-selected free port.
    pub async fn spawn(config: ServerConfig) -> HarnessResult<Self> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| HarnessError::ServerStartup("empty server command".to_string()))?;

        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let base_url = format!("http://127.0.0.1:{}", port);

        info!("Spawning app server on port {}: {:?}", port, config.command);

        let mut cmd = Command::new(program);
        cmd.args(args.iter().map(|a| a.replace("{port}", &port.to_string())));
        cmd.env("PORT", port.to_string());
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &config.workdir {
            cmd.current_dir(dir);
        }

        // The dev server's own output is not part of the scenario record
        cmd.stdout(Stdio::null()).stderr(Stdio::null());

        let child = cmd.spawn().map_err(|e| {
            HarnessError::ServerStartup(format!("failed to spawn {}: {}", program, e))
        })?;

        let handle = AppServer {
            child,
            base_url: base_url.clone(),
            port,
        };

        handle
            .wait_until_ready(&config.ready_path, config.startup_timeout)
            .await?;

        info!("App server ready at {}", base_url);
        Ok(handle)
    }

    /// Poll the readiness URL until it answers with an HTTP success
    async fn wait_until_ready(
        &self,
        ready_path: &str,
        timeout: Duration,
    ) -> HarnessResult<()> {
        let ready_url = format!("{}{}", self.base_url, ready_path);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout {
            attempts += 1;

            match client.get(&ready_url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    warn!("Readiness check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for app server to start...");
                    }
                    // Connection refused is expected while the server boots
                    if !e.is_connect() {
                        warn!("Readiness check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(200)).await;
        }

        Err(HarnessError::ServerNotReady(attempts))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the server: SIGTERM first, then kill
    pub fn stop(&mut self) -> HarnessResult<()> {
        info!("Stopping app server (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        let _ = self.child.kill();
        let _ = self.child.wait();

        Ok(())
    }
}

impl Drop for AppServer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Configuration for spawning the app server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Command and arguments; `{port}` in arguments is substituted
    pub command: Vec<String>,

    /// Working directory for the command (the web app checkout)
    pub workdir: Option<PathBuf>,

    /// Extra environment variables
    pub env: Vec<(String, String)>,

    /// Port to serve on (None = find a free port)
    pub port: Option<u16>,

    /// Path polled for readiness
    pub ready_path: String,

    /// Timeout for server startup
    pub startup_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "npm".to_string(),
                "run".to_string(),
                "dev".to_string(),
                "--".to_string(),
                "--port".to_string(),
                "{port}".to_string(),
            ],
            workdir: None,
            env: Vec::new(),
            port: None,
            ready_path: "/".to_string(),
            startup_timeout: Duration::from_secs(60),
        }
    }
}

/// Find a free port to use
pub fn find_free_port() -> HarnessResult<u16> {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_port_is_in_valid_range() {
        let port = find_free_port().unwrap();
        assert!(port > 1024);
    }

    #[test]
    fn default_command_carries_port_placeholder() {
        let config = ServerConfig::default();
        assert!(config.command.iter().any(|a| a.contains("{port}")));
        assert_eq!(config.ready_path, "/");
    }
}
