mod cli;
mod commands;
mod input;
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
mod pe;
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
mod process;
mod render;
mod shutdown;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, DEFAULT_PROCESS, TargetArgs};
use commands::control::Control;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dmtrack=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Watch {
        target: TargetArgs {
            process: DEFAULT_PROCESS.to_string(),
        },
        interval: dmtrack::config::timing::CONSUMER_POLL_INTERVAL_MS,
        no_color: false,
    });

    match command {
        Command::Watch {
            target,
            interval,
            no_color,
        } => commands::watch::run(
            commands::connect(&cli.channel),
            Duration::from_millis(interval),
            !no_color,
            &target.process,
        ),
        Command::Filter { action } => {
            commands::filter::run(&mut commands::connect(&cli.channel), action)
        }
        Command::Export { output } => {
            commands::export::run(&mut commands::connect(&cli.channel), output.as_deref())
        }
        Command::Reset { target } => commands::control::run(&target.process, Control::ResetStats),
        Command::ToggleOverlay { target } => {
            commands::control::run(&target.process, Control::ToggleOverlay)
        }
        Command::Inject { target, dll } => commands::inject::run(&target.process, &dll),
        Command::Unload { target } => commands::unload::run(&target.process),
    }
}
