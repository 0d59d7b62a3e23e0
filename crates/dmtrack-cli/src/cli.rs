use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Host executable the agent is loaded into
pub const DEFAULT_PROCESS: &str = "Dreadmyst.exe";

/// File name of the agent module
pub const AGENT_MODULE: &str = "dmtrack_agent.dll";

#[derive(Parser)]
#[command(name = "dmtrack")]
#[command(version)]
#[command(about = "Gameplay statistics tracker: viewer and agent lifecycle tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub channel: ChannelArgs,
}

/// Names of the shared snapshot objects (must match the agent's config)
#[derive(Args, Clone)]
pub struct ChannelArgs {
    #[arg(long, global = true, env = "DMTRACK_SHARED_MEMORY", default_value = dmtrack::config::SHARED_MEMORY_NAME)]
    pub shared_memory: String,

    #[arg(long, global = true, env = "DMTRACK_MUTEX", default_value = dmtrack::config::MUTEX_NAME)]
    pub mutex: String,
}

#[derive(Args, Clone)]
pub struct TargetArgs {
    /// Host process executable name
    #[arg(short, long, default_value = DEFAULT_PROCESS)]
    pub process: String,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show live statistics (default)
    Watch {
        #[command(flatten)]
        target: TargetArgs,

        /// Poll interval in milliseconds
        #[arg(long, default_value_t = dmtrack::config::timing::CONSUMER_POLL_INTERVAL_MS)]
        interval: u64,

        /// Disable colors
        #[arg(long)]
        no_color: bool,
    },
    /// Show or edit the chat filter
    Filter {
        #[command(subcommand)]
        action: Option<FilterAction>,
    },
    /// Zero all statistics in the running agent
    Reset {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Show or hide the overlay
    ToggleOverlay {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Write the current snapshot as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load the agent into the host process
    Inject {
        #[command(flatten)]
        target: TargetArgs,

        /// Agent module path
        #[arg(short, long, default_value = AGENT_MODULE)]
        dll: PathBuf,
    },
    /// Unload every copy of the agent from the host process
    Unload {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum FilterAction {
    /// Print the current filter
    Show,
    /// Start hiding matching messages
    Enable,
    /// Stop hiding messages
    Disable,
    /// Replace the term list (comma separated)
    Terms { terms: String },
    /// Treat terms as regular expressions
    Regex {
        #[arg(action = clap::ArgAction::Set)]
        on: bool,
    },
    /// Hide messages carrying a linked item
    Tagged {
        #[arg(action = clap::ArgAction::Set)]
        on: bool,
    },
    /// Restore the default term list
    Defaults,
}
