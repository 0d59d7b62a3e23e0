//! Agent lifetime: deferred startup, hook installation and teardown

use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use dmtrack::shared::NamedChannel;
use dmtrack::{
    CONTROL_NOT_READY, DetourPatcher, HookRegistry, LocalMemory, Publisher, Session,
    TrackerConfig, find_module,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use windows::Win32::Foundation::{HMODULE, MAX_PATH};
use windows::Win32::System::LibraryLoader::GetModuleFileNameW;

use crate::interceptors;
use crate::logging::{init_file_logging, log_path};
use crate::plan::{config_path, plan_hooks};

type AgentSession = Session<NamedChannel, LocalMemory>;

struct Agent {
    session: AgentSession,
    registry: Mutex<HookRegistry<DetourPatcher>>,
}

static AGENT: OnceLock<Agent> = OnceLock::new();
static MODULE: AtomicUsize = AtomicUsize::new(0);
static DETACHING: AtomicBool = AtomicBool::new(false);

/// Session shared by every interceptor, once startup has finished
pub fn session() -> Option<&'static AgentSession> {
    AGENT.get().map(|agent| &agent.session)
}

/// Called under the loader lock: only record the handle and hand off.
pub fn attach(module: usize) {
    MODULE.store(module, Ordering::Release);
    // Never joined: DllMain holds the loader lock.
    let _ = thread::Builder::new()
        .name("dmtrack-init".into())
        .spawn(startup);
}

pub fn detach(process_exiting: bool) {
    DETACHING.store(true, Ordering::Release);
    let Some(agent) = AGENT.get() else {
        return;
    };

    // Other threads are gone at process exit and may have died holding any
    // lock; patching or logging would touch dead state.
    if process_exiting {
        agent.session.abandon();
        return;
    }

    match agent.registry.try_lock() {
        Some(mut registry) => {
            let removed = registry.remove_all();
            info!("Removed {} hook(s)", removed);
        }
        None => warn!("Hook registry busy at unload; hooks left in place"),
    }
    agent.session.shutdown();
}

/// 1 if the overlay is now shown, 0 if hidden
pub fn toggle_overlay() -> u32 {
    session().map_or(CONTROL_NOT_READY, |s| u32::from(s.toggle_overlay()))
}

pub fn reset_stats() -> u32 {
    match session() {
        Some(s) => {
            s.reset();
            1
        }
        None => CONTROL_NOT_READY,
    }
}

fn module_dir() -> Option<PathBuf> {
    let module = HMODULE(MODULE.load(Ordering::Acquire) as *mut _);
    let mut buffer = [0u16; MAX_PATH as usize];
    // SAFETY: the buffer is owned and sized; the handle is our own module.
    let len = unsafe { GetModuleFileNameW(module, &mut buffer) } as usize;
    if len == 0 {
        return None;
    }
    let path = PathBuf::from(String::from_utf16_lossy(&buffer[..len]));
    path.parent().map(PathBuf::from)
}

fn startup() {
    let dir = module_dir().unwrap_or_else(|| PathBuf::from("."));
    // Without a log file the agent still runs, silently.
    let _ = init_file_logging(&log_path(&dir));
    info!("dmtrack-agent v{} loaded from {}", env!("CARGO_PKG_VERSION"), dir.display());

    let config = TrackerConfig::load_or_default(config_path(&dir));
    let delay = config.startup.delay();
    debug!("Waiting {:?} for the host to settle", delay);
    thread::sleep(delay);

    if DETACHING.load(Ordering::Acquire) {
        info!("Unloaded before startup finished");
        return;
    }

    let publisher = NamedChannel::create(&config.channel)
        .and_then(|channel| {
            Publisher::initialize(channel, &config.filter, config.channel.lock_timeout())
        })
        .map_err(|e| warn!("Shared snapshot unavailable, tracking without it: {}", e))
        .ok();

    let session = match AgentSession::new(config, LocalMemory::new(), publisher) {
        Ok(session) => session,
        Err(e) => {
            error!("Session setup failed: {}", e);
            return;
        }
    };
    session.subscribe(|event| debug!("{:?}", event));

    let agent = Agent {
        session,
        registry: Mutex::new(HookRegistry::new(DetourPatcher::new())),
    };
    if AGENT.set(agent).is_err() {
        warn!("Agent already running");
        return;
    }
    if let Some(agent) = AGENT.get() {
        install_hooks(agent);
    }
}

fn install_hooks(agent: &Agent) {
    let config = agent.session.config();
    let module = match find_module(config.module.name.as_deref()) {
        Ok(module) => module,
        Err(e) => {
            error!("Host module not found, no hooks installed: {}", e);
            return;
        }
    };
    info!("Host module at {:#x} ({} bytes)", module.base, module.size);

    // SAFETY: the host image stays mapped for as long as this process lives.
    let image = unsafe { module.image() };
    let mut registry = agent.registry.lock();
    let mut installed = 0;

    for (point, planned) in plan_hooks(&image, config) {
        let outcome = planned.and_then(|hook| {
            registry.install(
                point,
                hook.address,
                interceptors::interceptor(point),
                interceptors::slot(point),
            )
        });
        if outcome.is_ok() {
            installed += 1;
        }
        agent.session.record_hook_status(point, &outcome);
    }
    info!("{} hook(s) active", installed);
}
