//! Reset and toggle-overlay: call the agent's exported controls from outside.

use anyhow::{Result, bail};
use dmtrack::CONTROL_NOT_READY;

/// Controls exported by the agent module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    ResetStats,
    ToggleOverlay,
}

impl Control {
    pub fn export_name(self) -> &'static str {
        match self {
            Control::ResetStats => "ResetStats",
            Control::ToggleOverlay => "ToggleOverlay",
        }
    }

    /// Human-readable outcome of the export's exit code
    pub fn describe(self, code: u32) -> Result<&'static str> {
        if code == CONTROL_NOT_READY {
            bail!("agent is loaded but still starting up, try again shortly");
        }
        Ok(match (self, code) {
            (Control::ResetStats, _) => "Statistics reset",
            (Control::ToggleOverlay, 0) => "Overlay hidden",
            (Control::ToggleOverlay, _) => "Overlay shown",
        })
    }
}

#[cfg(target_os = "windows")]
pub fn invoke(process: &str, control: Control) -> Result<u32> {
    use anyhow::Context;

    use crate::cli::AGENT_MODULE;
    use crate::process::{
        REMOTE_CALL_TIMEOUT, RemoteProcess, agent_module_names, find_by_name, find_process,
        list_modules, remote_export,
    };

    let pid = find_process(process)?;
    let modules = list_modules(pid)?;
    let agent = agent_module_names(AGENT_MODULE)
        .into_iter()
        .find(|name| find_by_name(&modules, name).is_some())
        .with_context(|| format!("agent is not loaded in {}", process))?;

    let function = remote_export(pid, &agent, control.export_name())?;
    RemoteProcess::open(pid)?.call(function, 0, REMOTE_CALL_TIMEOUT)
}

#[cfg(not(target_os = "windows"))]
pub fn invoke(_process: &str, _control: Control) -> Result<u32> {
    bail!("controlling the agent requires Windows")
}

pub fn run(process: &str, control: Control) -> Result<()> {
    let code = invoke(process, control)?;
    println!("{}", control.describe(code)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_names() {
        assert_eq!(Control::ResetStats.export_name(), "ResetStats");
        assert_eq!(Control::ToggleOverlay.export_name(), "ToggleOverlay");
    }

    #[test]
    fn test_describe_exit_codes() {
        assert_eq!(Control::ToggleOverlay.describe(0).unwrap(), "Overlay hidden");
        assert_eq!(Control::ToggleOverlay.describe(1).unwrap(), "Overlay shown");
        assert_eq!(Control::ResetStats.describe(1).unwrap(), "Statistics reset");
        assert!(Control::ResetStats.describe(CONTROL_NOT_READY).is_err());
    }
}
