use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fixed lifetime of a pending confirmation.
pub const CONFIRMATION_TTL_SECS: u64 = 60;
/// Hard upper bound on waiting for one woken host to come online.
pub const WAKE_TIMEOUT_SECS: u64 = 300;

/// Operation-wide knobs: confirmation lifetime, wake polling, pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerSettings {
    /// Seconds a pending confirmation stays open.
    #[serde(default = "default_confirmation_ttl")]
    pub confirmation_ttl_secs: u64,
    /// Max time to wait for a woken host to answer (seconds).
    #[serde(default = "default_wake_timeout")]
    pub wake_timeout_secs: u64,
    /// Interval between online checks while waiting (seconds).
    #[serde(default = "default_wake_poll_interval")]
    pub wake_poll_interval_secs: u64,
    /// Broadcast target for wake packets.
    #[serde(default = "default_wake_broadcast")]
    pub wake_broadcast: String,
}

/// Pauses between dependent remote calls, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    #[serde(default = "default_vm_stop_ms")]
    pub vm_stop_ms: u64,
    #[serde(default = "default_container_stop_ms")]
    pub container_stop_ms: u64,
    #[serde(default = "default_host_shutdown_ms")]
    pub host_shutdown_ms: u64,
    #[serde(default = "default_wake_ms")]
    pub wake_ms: u64,
    #[serde(default = "default_container_start_ms")]
    pub container_start_ms: u64,
    #[serde(default = "default_vm_start_ms")]
    pub vm_start_ms: u64,
}

/// SSH transport settings for the production executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshSettings {
    #[serde(default = "default_ssh_user")]
    pub user: String,
    #[serde(default)]
    pub identity_file: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Upper bound for any single remote command.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_confirmation_ttl() -> u64 {
    CONFIRMATION_TTL_SECS
}
fn default_wake_timeout() -> u64 {
    WAKE_TIMEOUT_SECS
}
fn default_wake_poll_interval() -> u64 {
    10
}
fn default_wake_broadcast() -> String {
    "255.255.255.255".to_string()
}
fn default_vm_stop_ms() -> u64 {
    1000
}
fn default_container_stop_ms() -> u64 {
    1000
}
fn default_host_shutdown_ms() -> u64 {
    5000
}
fn default_wake_ms() -> u64 {
    1000
}
fn default_container_start_ms() -> u64 {
    3000
}
fn default_vm_start_ms() -> u64 {
    2000
}
fn default_ssh_user() -> String {
    "root".to_string()
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_command_timeout() -> u64 {
    120
}

impl Default for PowerSettings {
    fn default() -> Self {
        Self {
            confirmation_ttl_secs: default_confirmation_ttl(),
            wake_timeout_secs: default_wake_timeout(),
            wake_poll_interval_secs: default_wake_poll_interval(),
            wake_broadcast: default_wake_broadcast(),
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            vm_stop_ms: default_vm_stop_ms(),
            container_stop_ms: default_container_stop_ms(),
            host_shutdown_ms: default_host_shutdown_ms(),
            wake_ms: default_wake_ms(),
            container_start_ms: default_container_start_ms(),
            vm_start_ms: default_vm_start_ms(),
        }
    }
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            identity_file: None,
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl PowerSettings {
    pub fn confirmation_ttl(&self) -> Duration {
        Duration::from_secs(self.confirmation_ttl_secs)
    }

    pub fn wake_timeout(&self) -> Duration {
        Duration::from_secs(self.wake_timeout_secs)
    }

    pub fn wake_poll_interval(&self) -> Duration {
        Duration::from_secs(self.wake_poll_interval_secs)
    }
}

impl Pacing {
    /// No pauses at all. Used by tests and dry runs.
    pub fn none() -> Self {
        Self {
            vm_stop_ms: 0,
            container_stop_ms: 0,
            host_shutdown_ms: 0,
            wake_ms: 0,
            container_start_ms: 0,
            vm_start_ms: 0,
        }
    }

    pub fn vm_stop(&self) -> Duration {
        Duration::from_millis(self.vm_stop_ms)
    }

    pub fn container_stop(&self) -> Duration {
        Duration::from_millis(self.container_stop_ms)
    }

    pub fn host_shutdown(&self) -> Duration {
        Duration::from_millis(self.host_shutdown_ms)
    }

    pub fn wake(&self) -> Duration {
        Duration::from_millis(self.wake_ms)
    }

    pub fn container_start(&self) -> Duration {
        Duration::from_millis(self.container_start_ms)
    }

    pub fn vm_start(&self) -> Duration {
        Duration::from_millis(self.vm_start_ms)
    }
}

impl SshSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PowerSettings::default();
        assert_eq!(settings.confirmation_ttl(), Duration::from_secs(60));
        assert_eq!(settings.wake_timeout(), Duration::from_secs(300));
        assert_eq!(settings.wake_poll_interval(), Duration::from_secs(10));

        let pacing = Pacing::default();
        assert!(pacing.host_shutdown() > pacing.vm_stop());
        assert!(pacing.container_start() > pacing.vm_start());
    }

    #[test]
    fn test_pacing_none_is_zero() {
        let pacing = Pacing::none();
        assert_eq!(pacing.vm_stop(), Duration::ZERO);
        assert_eq!(pacing.host_shutdown(), Duration::ZERO);
        assert_eq!(pacing.container_start(), Duration::ZERO);
    }

    #[test]
    fn test_ssh_defaults() {
        let ssh = SshSettings::default();
        assert_eq!(ssh.user, "root");
        assert_eq!(ssh.command_timeout(), Duration::from_secs(120));
    }
}
