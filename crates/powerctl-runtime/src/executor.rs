use async_trait::async_trait;
use tracing::{info, warn};

use powerctl_core::remote::{
    PowerAction, PowerState, RemoteExecutor, RemoteOutcome, Resource, VmEntry,
};
use powerctl_core::settings::SshSettings;

use crate::proxmox;
use crate::ssh::{CommandOutput, SshTransport};
use crate::wol;

/// [`RemoteExecutor`] for Proxmox VE hosts reached over SSH.
pub struct ProxmoxExecutor {
    transport: SshTransport,
}

impl ProxmoxExecutor {
    pub fn new(settings: SshSettings) -> Self {
        Self {
            transport: SshTransport::new(settings),
        }
    }

    async fn list(&self, address: &str, command: &str) -> Option<String> {
        let out = self.transport.run(address, command).await;
        if out.success {
            Some(out.stdout)
        } else {
            warn!(address, command, stderr = %out.stderr, "Inventory query failed");
            None
        }
    }
}

fn outcome(out: CommandOutput) -> RemoteOutcome {
    if out.success {
        RemoteOutcome {
            succeeded: true,
            diagnostic: out.stdout,
        }
    } else if out.stderr.is_empty() {
        RemoteOutcome::failed(out.stdout)
    } else {
        RemoteOutcome::failed(out.stderr)
    }
}

#[async_trait]
impl RemoteExecutor for ProxmoxExecutor {
    async fn is_host_online(&self, address: &str) -> bool {
        self.transport.probe(address).await
    }

    async fn running_vms(&self, address: &str) -> Vec<Resource> {
        self.all_vms(address)
            .await
            .into_iter()
            .filter(|vm| vm.state == PowerState::Running)
            .map(|vm| vm.resource())
            .collect()
    }

    async fn all_vms(&self, address: &str) -> Vec<VmEntry> {
        self.list(address, proxmox::LIST_VMS)
            .await
            .map(|out| proxmox::parse_qm_list(&out))
            .unwrap_or_default()
    }

    async fn running_containers(&self, address: &str) -> Vec<Resource> {
        self.list(address, proxmox::LIST_CONTAINERS)
            .await
            .map(|out| proxmox::parse_pct_list(&out))
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, state)| *state == PowerState::Running)
            .map(|(ct, _)| ct)
            .collect()
    }

    async fn execute(&self, target: &str, action: &PowerAction) -> RemoteOutcome {
        if let PowerAction::SendWake(mac) = action {
            info!(%mac, target, "Sending wake packet");
            return match wol::send_magic_packet(*mac, target).await {
                Ok(()) => RemoteOutcome::ok(),
                Err(e) => RemoteOutcome::failed(format!("{:#}", e)),
            };
        }

        let Some(command) = proxmox::command_for(action) else {
            return RemoteOutcome::failed(format!(
                "Refusing to run {}: unsupported or unsafe resource id",
                action.verb()
            ));
        };

        info!(target, action = action.verb(), %command, "Running remote action");
        outcome(self.transport.run(target, &command).await)
    }
}
