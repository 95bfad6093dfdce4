mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::audit::AuditSubcommand;
use cmd::secrets::SecretsSubcommand;
use cmd::TargetOverrides;
use leash_core::LeashError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "leash",
    about = "Control plane for a remote autonomous agent — secret injection, health, drift, and the kill switch",
    version,
    propagate_version = true
)]
struct Cli {
    /// Control root (default: auto-detect from .leash/)
    #[arg(long, global = true, env = "LEASH_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Target host override
    #[arg(long, global = true, env = "LEASH_HOST")]
    host: Option<String>,

    /// Target ssh principal override
    #[arg(long, global = true, env = "LEASH_USER")]
    user: Option<String>,

    /// Target ssh port override
    #[arg(long, global = true, env = "LEASH_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold the .leash/ control directory
    Init,

    /// Probe target health (read-only)
    Status,

    /// Resolve secrets and start the remote agent
    Start,

    /// Gracefully stop the agent service, confirming via health poll
    Stop,

    /// Terminate matching processes with SIGTERM then SIGKILL
    HardStop {
        /// Confirm the escalation
        #[arg(long)]
        yes: bool,
    },

    /// Power off the target host entirely
    Shutdown {
        /// Confirm the escalation
        #[arg(long)]
        yes: bool,
    },

    /// Audit tracked files against accepted baselines
    Audit {
        #[command(subcommand)]
        subcommand: Option<AuditSubcommand>,
    },

    /// Composed health + drift + secret-resolvability report
    Review,

    /// Secret manifest operations
    Secrets {
        #[command(subcommand)]
        subcommand: SecretsSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let overrides = TargetOverrides {
        host: cli.host,
        user: cli.user,
        port: cli.port,
    };

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Status => cmd::status::run(&root, &overrides, cli.json),
        Commands::Start => cmd::start::run(&root, &overrides, cli.json),
        Commands::Stop => cmd::escalate::stop(&root, &overrides, cli.json),
        Commands::HardStop { yes } => cmd::escalate::hard_stop(&root, &overrides, yes, cli.json),
        Commands::Shutdown { yes } => cmd::escalate::shutdown(&root, &overrides, yes, cli.json),
        Commands::Audit { subcommand } => cmd::audit::run(&root, &overrides, subcommand, cli.json),
        Commands::Review => cmd::review::run(&root, &overrides, cli.json),
        Commands::Secrets { subcommand } => {
            cmd::secrets::run(&root, &overrides, subcommand, cli.json)
        }
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}

/// Typed exit codes: 2 = confirmation required, 3 = target unreachable,
/// 4 = command timeout, 1 = everything else.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<LeashError>() {
        Some(LeashError::EscalationBlocked(_)) => 2,
        Some(LeashError::Connection(_)) => 3,
        Some(LeashError::Timeout { .. }) => 4,
        _ => 1,
    }
}
