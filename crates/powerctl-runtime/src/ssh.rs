use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use powerctl_core::settings::SshSettings;

/// Captured result of one remote command. Never an error: spawn failures
/// and timeouts are reported as unsuccessful output with a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    fn failure(stderr: String) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr,
        }
    }
}

/// Runs one-shot commands on cluster hosts over `ssh`.
#[derive(Debug, Clone)]
pub struct SshTransport {
    settings: SshSettings,
}

impl SshTransport {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }

    /// Full `ssh` argument vector for running `script` on `address`.
    pub fn args(&self, address: &str, script: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.settings.connect_timeout_secs),
        ];
        if let Some(identity) = &self.settings.identity_file {
            args.push("-i".to_string());
            args.push(identity.clone());
        }
        args.push(format!("{}@{}", self.settings.user, address));
        args.push(script.to_string());
        args
    }

    /// Run a script on the host, bounded by the configured command timeout.
    pub async fn run(&self, address: &str, script: &str) -> CommandOutput {
        self.run_with_timeout(address, script, self.settings.command_timeout())
            .await
    }

    /// Reachability probes use a tighter bound than regular commands.
    pub async fn probe(&self, address: &str) -> bool {
        let bound = Duration::from_secs(self.settings.connect_timeout_secs + 2);
        self.run_with_timeout(address, "true", bound).await.success
    }

    pub async fn run_with_timeout(
        &self,
        address: &str,
        script: &str,
        timeout: Duration,
    ) -> CommandOutput {
        debug!(address, script, "ssh");
        run_command("ssh", &self.args(address, script), timeout).await
    }
}

/// Spawn `program` with `args`, capture its output, kill it on timeout.
pub async fn run_command(program: &str, args: &[String], timeout: Duration) -> CommandOutput {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => return CommandOutput::failure(format!("Failed to run {}: {}", program, e)),
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        },
        Ok(Err(e)) => CommandOutput::failure(format!("Failed to wait for {}: {}", program, e)),
        Err(_) => CommandOutput::failure(format!(
            "{} timed out after {}s",
            program,
            timeout.as_secs()
        )),
    }
}
