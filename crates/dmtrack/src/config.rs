//! Tracker configuration
//!
//! Loaded from `dmtrack.toml` next to the agent module. Every section is
//! optional; anything left out falls back to the values for the known host
//! build. Packet layouts have no defaults: their offsets are not verified for
//! any build and must be supplied per host version.
//!
//! ```toml
//! [module]
//! reference_base = 0x400000
//!
//! [[hooks]]
//! point = "recv_msg"
//! signature = "55 8B EC 6A FF 68 ?? ?? ?? ??"
//! va = 0x471E60
//!
//! [layouts.combat_msg]
//! access = "stl_buffer"
//! amount = { offset = 8, kind = "i32" }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::extract::FilterConfig;
use crate::hook::{HookPoint, REFERENCE_BASE};
use crate::memory::{BufferAccess, FieldSpec};
use crate::signature::PatternSpec;

pub use crate::memory::layout::timing;

/// File name looked up beside the agent module
pub const CONFIG_FILE_NAME: &str = "dmtrack.toml";

/// Well-known name of the shared snapshot mapping
pub const SHARED_MEMORY_NAME: &str = "DmTrackSharedMemory";

/// Well-known name of the mutex guarding the mapping
pub const MUTEX_NAME: &str = "DmTrackMutex";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub module: ModuleConfig,
    pub hooks: Vec<HookTarget>,
    pub layouts: PacketLayouts,
    pub channel: ChannelConfig,
    pub startup: StartupConfig,
    pub filter: FilterConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            module: ModuleConfig::default(),
            hooks: HookPoint::iter().map(HookTarget::builtin).collect(),
            layouts: PacketLayouts::default(),
            channel: ChannelConfig::default(),
            startup: StartupConfig::default(),
            filter: FilterConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: TrackerConfig = toml::from_str(text)?;
        config.reject_duplicate_hooks()?;
        config.fill_missing_hooks();
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    /// Load configuration, falling back to defaults when the file is missing or invalid
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) if e.is_not_found() => {
                info!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Target entry for `point`, if any
    pub fn hook(&self, point: HookPoint) -> Option<&HookTarget> {
        self.hooks.iter().find(|h| h.point == point)
    }

    /// Each point has a single original-function slot, so it may be listed once.
    fn reject_duplicate_hooks(&self) -> Result<()> {
        let mut seen = Vec::with_capacity(self.hooks.len());
        for target in &self.hooks {
            if seen.contains(&target.point) {
                return Err(Error::DuplicateHook(target.point.to_string()));
            }
            seen.push(target.point);
        }
        Ok(())
    }

    /// Hooks listed in the file replace the built-in entry of the same point;
    /// points not mentioned keep their built-in entry.
    fn fill_missing_hooks(&mut self) {
        for point in HookPoint::iter() {
            if self.hook(point).is_none() {
                self.hooks.push(HookTarget::builtin(point));
            }
        }
        self.hooks.sort_by_key(|h| h.point);
    }
}

/// Host module the targets live in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Module name; `None` means the host executable
    pub name: Option<String>,
    /// Image base the configured VAs are expressed against
    pub reference_base: u64,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: None,
            reference_base: REFERENCE_BASE,
        }
    }
}

/// Where one hook point lives in the host image.
///
/// The signature is tried first; the VA (rebased) is the fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookTarget {
    pub point: HookPoint,
    #[serde(default)]
    pub va: Option<u64>,
    #[serde(default)]
    pub signature: Option<PatternSpec>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl HookTarget {
    pub fn builtin(point: HookPoint) -> Self {
        Self {
            point,
            va: point.default_va(),
            signature: None,
            enabled: point.enabled_by_default(),
        }
    }
}

/// Payload layout of one `processPacket_*` handler.
///
/// All offsets are relative to the packet data. Fields left unset are simply
/// not extracted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketLayout {
    pub access: BufferAccess,
    pub amount: Option<FieldSpec>,
    pub item_id: Option<FieldSpec>,
    pub quality: Option<FieldSpec>,
    pub group: Option<FieldSpec>,
}

impl PacketLayout {
    /// Bytes the packet must hold to satisfy every configured field
    pub fn required_len(&self) -> usize {
        [self.amount, self.item_id, self.quality, self.group]
            .iter()
            .flatten()
            .map(FieldSpec::end)
            .max()
            .unwrap_or(0)
    }
}

/// Per-handler payload layouts; `None` means "not known for this host build"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketLayouts {
    pub exp_notify: Option<PacketLayout>,
    pub item_notify: Option<PacketLayout>,
    pub pk_notify: Option<PacketLayout>,
    pub spent_gold: Option<PacketLayout>,
    pub combat_msg: Option<PacketLayout>,
}

impl PacketLayouts {
    pub fn for_point(&self, point: HookPoint) -> Option<&PacketLayout> {
        match point {
            HookPoint::ExpNotify => self.exp_notify.as_ref(),
            HookPoint::ItemNotify => self.item_notify.as_ref(),
            HookPoint::PkNotify => self.pk_notify.as_ref(),
            HookPoint::SpentGold => self.spent_gold.as_ref(),
            HookPoint::CombatMsg => self.combat_msg.as_ref(),
            HookPoint::AddMessage | HookPoint::RecvMsg => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub shared_memory_name: String,
    pub mutex_name: String,
    /// Producer-side lock wait (ms)
    pub lock_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            shared_memory_name: SHARED_MEMORY_NAME.to_string(),
            mutex_name: MUTEX_NAME.to_string(),
            lock_timeout_ms: timing::PUBLISH_LOCK_TIMEOUT_MS,
        }
    }
}

impl ChannelConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Delay before hooks are installed (ms)
    pub delay_ms: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            delay_ms: timing::STARTUP_DELAY_MS,
        }
    }
}

impl StartupConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Builder for TrackerConfig
#[derive(Debug, Clone, Default)]
pub struct TrackerConfigBuilder {
    module_name: Option<String>,
    reference_base: Option<u64>,
    hooks: Vec<HookTarget>,
    layouts: Option<PacketLayouts>,
    channel: Option<ChannelConfig>,
    startup_delay_ms: Option<u64>,
    filter: Option<FilterConfig>,
}

impl TrackerConfigBuilder {
    pub fn module_name<S: Into<String>>(mut self, name: S) -> Self {
        self.module_name = Some(name.into());
        self
    }

    pub fn reference_base(mut self, base: u64) -> Self {
        self.reference_base = Some(base);
        self
    }

    /// Override the target of one hook point
    pub fn hook(mut self, target: HookTarget) -> Self {
        self.hooks.retain(|h| h.point != target.point);
        self.hooks.push(target);
        self
    }

    pub fn layouts(mut self, layouts: PacketLayouts) -> Self {
        self.layouts = Some(layouts);
        self
    }

    pub fn channel_names<S: Into<String>>(mut self, shared_memory: S, mutex: S) -> Self {
        let mut channel = self.channel.take().unwrap_or_default();
        channel.shared_memory_name = shared_memory.into();
        channel.mutex_name = mutex.into();
        self.channel = Some(channel);
        self
    }

    pub fn startup_delay_ms(mut self, delay: u64) -> Self {
        self.startup_delay_ms = Some(delay);
        self
    }

    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn build(self) -> TrackerConfig {
        let default = TrackerConfig::default();
        let mut config = TrackerConfig {
            module: ModuleConfig {
                name: self.module_name.or(default.module.name),
                reference_base: self
                    .reference_base
                    .unwrap_or(default.module.reference_base),
            },
            hooks: self.hooks,
            layouts: self.layouts.unwrap_or(default.layouts),
            channel: self.channel.unwrap_or(default.channel),
            startup: StartupConfig {
                delay_ms: self.startup_delay_ms.unwrap_or(default.startup.delay_ms),
            },
            filter: self.filter.unwrap_or(default.filter),
        };
        config.fill_missing_hooks();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FieldKind;
    use std::io::Write;

    #[test]
    fn test_default_config_has_every_hook_point() {
        let config = TrackerConfig::default();
        assert_eq!(config.hooks.len(), HookPoint::iter().count());
        assert_eq!(
            config.hook(HookPoint::RecvMsg).and_then(|h| h.va),
            Some(0x0047_1E60)
        );
        assert!(!config.hook(HookPoint::PkNotify).unwrap().enabled);
        assert_eq!(config.module.reference_base, 0x0040_0000);
        assert_eq!(config.startup.delay(), Duration::from_secs(3));
    }

    #[test]
    fn test_parse_toml_overrides() {
        let text = r#"
            [module]
            reference_base = 0x400000

            [[hooks]]
            point = "add_message"
            va = 0x401000
            signature = "55 8B EC ??"

            [[hooks]]
            point = "combat_msg"
            enabled = false

            [layouts.combat_msg]
            access = "direct"
            amount = { offset = 8, kind = "i32" }

            [channel]
            shared_memory_name = "TestMem"

            [filter]
            enabled = true
            terms = ["wts", "wtb"]
        "#;
        let config = TrackerConfig::from_toml(text).unwrap();

        let add = config.hook(HookPoint::AddMessage).unwrap();
        assert_eq!(add.va, Some(0x401000));
        assert_eq!(add.signature.as_ref().map(|s| s.len()), Some(4));
        assert!(add.enabled);

        let combat = config.hook(HookPoint::CombatMsg).unwrap();
        assert!(!combat.enabled);
        assert_eq!(combat.va, None);

        // Unlisted points keep their built-in entry
        assert_eq!(
            config.hook(HookPoint::ExpNotify).and_then(|h| h.va),
            Some(0x0045_E320)
        );

        let layout = config.layouts.combat_msg.as_ref().unwrap();
        assert_eq!(layout.access, BufferAccess::Direct);
        assert_eq!(layout.amount, Some(FieldSpec::new(8, FieldKind::I32)));
        assert_eq!(layout.required_len(), 12);

        assert_eq!(config.channel.shared_memory_name, "TestMem");
        assert_eq!(config.channel.mutex_name, MUTEX_NAME);
        assert!(config.filter.enabled);
        assert_eq!(config.filter.terms, vec!["wts", "wtb"]);
    }

    #[test]
    fn test_invalid_signature_is_rejected() {
        let text = r#"
            [[hooks]]
            point = "recv_msg"
            signature = "ZZ"
        "#;
        assert!(TrackerConfig::from_toml(text).is_err());
    }

    #[test]
    fn test_duplicate_hook_point_is_rejected() {
        let text = r#"
            [[hooks]]
            point = "exp_notify"
            va = 0x45E320

            [[hooks]]
            point = "exp_notify"
            va = 0x45F000
        "#;
        let err = TrackerConfig::from_toml(text).unwrap_err();
        assert!(matches!(err, Error::DuplicateHook(ref point) if point == "exp_notify"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig::load_or_default(dir.path().join(CONFIG_FILE_NAME));
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn test_load_or_default_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[module\nreference_base = ").unwrap();
        let config = TrackerConfig::load_or_default(file.path());
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[startup]\ndelay_ms = 500").unwrap();
        let config = TrackerConfig::load(file.path()).unwrap();
        assert_eq!(config.startup.delay_ms, 500);
    }

    #[test]
    fn test_builder() {
        let config = TrackerConfig::builder()
            .reference_base(0x1000_0000)
            .startup_delay_ms(0)
            .channel_names("A", "B")
            .hook(HookTarget {
                point: HookPoint::AddMessage,
                va: Some(0x1000_1000),
                signature: None,
                enabled: true,
            })
            .build();

        assert_eq!(config.module.reference_base, 0x1000_0000);
        assert_eq!(config.startup.delay_ms, 0);
        assert_eq!(config.channel.shared_memory_name, "A");
        assert_eq!(config.channel.mutex_name, "B");
        assert_eq!(config.hooks.len(), HookPoint::iter().count());
        assert_eq!(
            config.hook(HookPoint::AddMessage).and_then(|h| h.va),
            Some(0x1000_1000)
        );
    }
}
