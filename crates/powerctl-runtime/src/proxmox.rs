//! Proxmox VE command lines and list-output parsers.
//!
//! VMs are managed with `qm`, containers with `pct`. Both list commands
//! print a header row followed by one whitespace-separated row per guest.

use powerctl_core::remote::{PowerAction, PowerState, Resource, ResourceId, VmEntry};

pub const LIST_VMS: &str = "qm list";
pub const LIST_CONTAINERS: &str = "pct list";

/// Graceful guest shutdown timeout handed to `qm`/`pct` (seconds).
const GUEST_SHUTDOWN_TIMEOUT: u64 = 90;

/// Shell command for a host-side action. `None` for actions that are not
/// run over the shell, or for ids that are unsafe to splice into one.
pub fn command_for(action: &PowerAction) -> Option<String> {
    match action {
        PowerAction::StopVm(id) => guest_command("qm shutdown", id, true),
        PowerAction::StartVm(id) => guest_command("qm start", id, false),
        PowerAction::StopContainer(id) => guest_command("pct shutdown", id, true),
        PowerAction::StartContainer(id) => guest_command("pct start", id, false),
        PowerAction::ShutdownHost => Some("shutdown -h now".to_string()),
        PowerAction::SendWake(_) => None,
    }
}

fn guest_command(base: &str, id: &ResourceId, graceful: bool) -> Option<String> {
    if !is_safe_id(id) {
        return None;
    }
    if graceful {
        Some(format!(
            "{} {} --timeout {} --forceStop 1",
            base, id, GUEST_SHUTDOWN_TIMEOUT
        ))
    } else {
        Some(format!("{} {}", base, id))
    }
}

/// Ids end up inside a remote shell command; only allow plain tokens.
pub fn is_safe_id(id: &ResourceId) -> bool {
    let s = id.as_str();
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parse `qm list`:
///
/// ```text
///       VMID NAME                 STATUS     MEM(MB)    BOOTDISK(GB) PID
///        100 ubuntu-server        running    2048              32.00 1234
/// ```
pub fn parse_qm_list(output: &str) -> Vec<VmEntry> {
    output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 3 || !cols[0].chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            Some(VmEntry {
                id: ResourceId::new(cols[0]),
                name: cols[1].to_string(),
                state: PowerState::parse(cols[2]),
            })
        })
        .collect()
}

/// Parse `pct list`. The `Lock` column is usually blank, so the name is
/// always taken from the last column:
///
/// ```text
/// VMID       Status     Lock         Name
/// 100        running                 pihole
/// 101        stopped    backup       media
/// ```
pub fn parse_pct_list(output: &str) -> Vec<(Resource, PowerState)> {
    output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 2 || !cols[0].chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let name = if cols.len() >= 3 {
                cols[cols.len() - 1]
            } else {
                ""
            };
            Some((Resource::new(cols[0], name), PowerState::parse(cols[1])))
        })
        .collect()
}
