use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use powerctl_core::topology::ClusterTopology;
use powerctl_orchestrator::{Decision, OperationKind, PowerOrchestrator, Resolution};
use powerctl_runtime::ProxmoxExecutor;

use crate::logging::{self, LogFormat};
use crate::output::{self, OutputFormat};
use crate::terminal::TerminalSurface;
use crate::ui;

const DEFAULT_CONFIG: &str = "/etc/powerctl/cluster.toml";

#[derive(Parser)]
#[command(
    name = "powerctl",
    version,
    about = "Confirmation-gated shutdown and startup for hypervisor clusters"
)]
struct Cli {
    /// Cluster topology file (TOML)
    #[arg(long, short = 'c', global = true, env = "POWERCTL_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Output format: table, json, yaml
    #[arg(long, short = 'o', global = true, default_value = "table")]
    output: String,

    /// Log format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Human)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stop all VMs and containers, then power off the hosts
    Shutdown {
        /// Keep critical containers and their hosts running
        #[arg(long)]
        keep_critical: bool,
        /// Approve without prompting
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Wake all hosts, then start containers and VMs
    Startup {
        /// Approve without prompting
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Show what an operation would do, without asking for confirmation
    Summary {
        #[arg(value_enum)]
        kind: KindArg,
    },
    /// Validate the topology file and list its hosts
    Check,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Shutdown,
    ShutdownKeepCritical,
    Startup,
}

impl From<KindArg> for OperationKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Shutdown => OperationKind::FullShutdown,
            KindArg::ShutdownKeepCritical => OperationKind::ShutdownKeepCritical,
            KindArg::Startup => OperationKind::FullStartup,
        }
    }
}

// ============================================================================
// Command dispatch
// ============================================================================

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let out_fmt = OutputFormat::from_str_arg(&cli.output);

    match cli.command {
        Commands::Shutdown { keep_critical, yes } => {
            let kind = if keep_critical {
                OperationKind::ShutdownKeepCritical
            } else {
                OperationKind::FullShutdown
            };
            cmd_power(&cli.config, kind, yes, out_fmt)
        }
        Commands::Startup { yes } => cmd_power(&cli.config, OperationKind::FullStartup, yes, out_fmt),
        Commands::Summary { kind } => cmd_summary(&cli.config, kind.into(), out_fmt),
        Commands::Check => cmd_check(&cli.config, out_fmt),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

/// Run a future on a fresh multi-threaded runtime.
fn block_on<F, T>(f: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .with_context(|| "Failed to create tokio runtime")?;
    runtime.block_on(f)
}

/// Identity recorded as the requester of a confirmation.
fn requester() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "operator".to_string())
}

fn orchestrator(topology: ClusterTopology, out_fmt: OutputFormat) -> PowerOrchestrator {
    let executor = Arc::new(ProxmoxExecutor::new(topology.ssh.clone()));
    let surface = Arc::new(TerminalSurface::new(out_fmt));
    PowerOrchestrator::new(topology, executor, surface)
}

// ============================================================================
// Handlers
// ============================================================================

fn cmd_power(config: &Path, kind: OperationKind, yes: bool, out_fmt: OutputFormat) -> Result<()> {
    let topology = ClusterTopology::from_file(config)?;
    let requester = requester();
    info!(%kind, requester = %requester, config = %config.display(), "Power operation requested");

    block_on(async move {
        let orchestrator = orchestrator(topology, out_fmt);
        let ticket = orchestrator.request(kind, &requester).await?;

        let decision = if yes {
            ui::info(&format!("Approved by {} (--yes)", requester));
            Decision::Approve
        } else {
            let prompt = format!(
                "{}? ({}s to decide)",
                kind.confirm_title(),
                ticket.expires_in_secs
            );
            let approved = tokio::task::spawn_blocking(move || ui::confirm(&prompt))
                .await
                .with_context(|| "Confirmation prompt failed")?;
            if approved {
                Decision::Approve
            } else {
                Decision::Cancel
            }
        };

        match orchestrator.resolve(ticket.token, &requester, decision).await {
            Resolution::Completed(report) if report.is_clean() => Ok(()),
            Resolution::Completed(report) => {
                let failed = report.hosts.failed.len()
                    + report.vms.failed.len()
                    + report.containers.failed.len();
                bail!("{} finished with {} failure(s)", kind, failed)
            }
            Resolution::Cancelled | Resolution::Expired => Ok(()),
            Resolution::Aborted => bail!("{} aborted before it could report", kind),
            Resolution::Ignored(reason) => {
                bail!("Confirmation no longer pending ({:?})", reason)
            }
        }
    })
}

fn cmd_summary(config: &Path, kind: OperationKind, out_fmt: OutputFormat) -> Result<()> {
    let topology = ClusterTopology::from_file(config)?;

    block_on(async move {
        let summary = orchestrator(topology, out_fmt).summarize(kind).await;
        match output::to_machine(&summary, out_fmt)? {
            Some(text) => println!("{}", text),
            None => {
                ui::banner(&[summary.title.as_str()], false);
                println!("{}", summary.body());
            }
        }
        Ok(())
    })
}

/// One row of `powerctl check`.
#[derive(Debug, Serialize, Tabled)]
struct HostRow {
    name: String,
    address: String,
    wake_address: String,
    shutdown_position: String,
    startup_position: String,
}

fn host_rows(topology: &ClusterTopology) -> Vec<HostRow> {
    let position = |p: Option<usize>| p.map(|i| (i + 1).to_string()).unwrap_or_else(|| "-".into());
    topology
        .hosts
        .iter()
        .map(|h| HostRow {
            name: h.name.clone(),
            address: h.address.clone(),
            wake_address: topology.wake_address(&h.name).to_string(),
            shutdown_position: position(topology.shutdown_position(&h.name)),
            startup_position: position(topology.startup_position(&h.name)),
        })
        .collect()
}

fn cmd_check(config: &Path, out_fmt: OutputFormat) -> Result<()> {
    let topology = ClusterTopology::from_file(config)?;
    println!("{}", output::render_list(&host_rows(&topology), out_fmt)?);
    if !out_fmt.is_machine() {
        ui::success(&format!(
            "{} is valid: {} hosts, {} prioritised containers, {} critical",
            config.display(),
            topology.hosts.len(),
            topology.container_startup.len(),
            topology.critical_containers.len()
        ));
    }
    Ok(())
}

fn cmd_completions(shell: clap_complete::Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "powerctl", &mut std::io::stdout());
    Ok(())
}
