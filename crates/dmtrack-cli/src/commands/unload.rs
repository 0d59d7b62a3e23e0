//! Unload command: free every copy of the agent with a remote FreeLibrary.

use anyhow::Result;

#[cfg(target_os = "windows")]
pub fn run(process: &str) -> Result<()> {
    use anyhow::bail;
    use tracing::warn;

    use crate::cli::AGENT_MODULE;
    use crate::process::{
        REMOTE_CALL_TIMEOUT, RemoteProcess, agent_module_names, find_by_name, find_process,
        list_modules, remote_export,
    };

    println!("Looking for {}...", process);
    let pid = find_process(process)?;
    println!("Found! PID: {}", pid);

    let modules = list_modules(pid)?;
    let names = agent_module_names(AGENT_MODULE);
    let loaded: Vec<_> = names
        .iter()
        .filter_map(|name| find_by_name(&modules, name))
        .collect();
    if loaded.is_empty() {
        println!("No agent modules were found in {}.", process);
        return Ok(());
    }

    let free_library = remote_export(pid, "kernel32.dll", "FreeLibrary")?;
    let target = RemoteProcess::open(pid)?;
    let mut failed = 0;

    for module in loaded {
        println!("Found {}. Unloading...", module.name);
        match target.call(free_library, module.base, REMOTE_CALL_TIMEOUT) {
            Ok(code) if code != 0 => println!("SUCCESS! {} unloaded", module.name),
            Ok(_) => {
                warn!("FreeLibrary returned FALSE for {}", module.name);
                failed += 1;
            }
            Err(e) => {
                warn!("Unloading {} failed: {}", module.name, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} module(s) could not be unloaded", failed);
    }
    println!("Cleanup complete.");
    Ok(())
}

#[cfg(not(target_os = "windows"))]
pub fn run(_process: &str) -> Result<()> {
    anyhow::bail!("unloading requires Windows")
}
