//! Inject command: load the agent into the host with a remote LoadLibraryW.

use std::path::Path;

use anyhow::Result;

/// NUL-terminated UTF-16LE bytes of `text`, as LoadLibraryW expects
pub fn wide_nul_bytes(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

#[cfg(target_os = "windows")]
pub fn run(process: &str, dll: &Path) -> Result<()> {
    use anyhow::{Context, bail};
    use tracing::{debug, info};

    use crate::process::{
        REMOTE_CALL_TIMEOUT, RemoteProcess, find_by_name, find_process, list_modules,
        remote_export,
    };

    let path = dll
        .canonicalize()
        .with_context(|| format!("agent module not found: {}", dll.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("agent path has no file name")?;

    println!("Looking for {}...", process);
    let pid = find_process(process)?;
    println!("Found! PID: {}", pid);

    if find_by_name(&list_modules(pid)?, &file_name).is_some() {
        bail!("{} is already loaded in {}; unload it first", file_name, process);
    }

    let load_library = remote_export(pid, "kernel32.dll", "LoadLibraryW")?;
    debug!("LoadLibraryW in target at {:#x}", load_library);

    let target = RemoteProcess::open(pid)?;
    let buffer = target.write_buffer(&wide_nul_bytes(&path.to_string_lossy()))?;
    let module = target.call(load_library, buffer.address(), REMOTE_CALL_TIMEOUT)?;
    if module == 0 {
        bail!("LoadLibraryW failed inside {} (wrong architecture?)", process);
    }

    info!("Loaded {} into process {}", path.display(), target.pid());
    println!("SUCCESS! {} injected", file_name);
    Ok(())
}

#[cfg(not(target_os = "windows"))]
pub fn run(_process: &str, _dll: &Path) -> Result<()> {
    anyhow::bail!("injection requires Windows")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_nul_bytes() {
        assert_eq!(wide_nul_bytes("C:"), vec![b'C', 0, b':', 0, 0, 0]);
        assert_eq!(wide_nul_bytes(""), vec![0, 0]);
    }

    #[test]
    fn test_wide_nul_bytes_non_ascii() {
        let bytes = wide_nul_bytes("é");
        assert_eq!(bytes, vec![0xE9, 0x00, 0, 0]);
    }
}
