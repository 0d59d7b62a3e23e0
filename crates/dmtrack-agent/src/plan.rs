//! Which hooks to install, and where

use std::path::{Path, PathBuf};

use dmtrack::config::CONFIG_FILE_NAME;
use dmtrack::{HookPoint, ModuleImage, Resolution, Result, TrackerConfig, resolve_target};
use tracing::{info, warn};

/// A hook target resolved to an address in the running image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedHook {
    pub point: HookPoint,
    pub address: usize,
    pub resolution: Resolution,
}

pub fn config_path(module_dir: &Path) -> PathBuf {
    module_dir.join(CONFIG_FILE_NAME)
}

/// Resolve every enabled hook of `config` inside `image`.
///
/// Disabled hooks are left out; unresolved ones are reported per point so the
/// rest can still be installed.
pub fn plan_hooks(
    image: &ModuleImage<'_>,
    config: &TrackerConfig,
) -> Vec<(HookPoint, Result<PlannedHook>)> {
    config
        .hooks
        .iter()
        .filter(|target| target.enabled)
        .map(|target| {
            let planned = resolve_target(image, target, config.module.reference_base).map(
                |(address, resolution)| PlannedHook {
                    point: target.point,
                    address,
                    resolution,
                },
            );
            match &planned {
                Ok(hook) => info!(
                    "{} at {:#x} ({:?})",
                    hook.point, hook.address, hook.resolution
                ),
                Err(e) => warn!("{} not installed: {}", target.point, e),
            }
            (target.point, planned)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use dmtrack::{Error, HookTarget, PatternSpec};

    use super::*;

    const BASE: usize = 0x0090_0000;

    fn image(bytes: &[u8]) -> ModuleImage<'_> {
        ModuleImage::new(BASE, bytes)
    }

    #[test]
    fn test_default_plan_rebases_enabled_hooks() {
        let bytes = vec![0u8; 0x80000];
        let plan = plan_hooks(&image(&bytes), &TrackerConfig::default());

        let points: Vec<HookPoint> = plan.iter().map(|(p, _)| *p).collect();
        assert_eq!(
            points,
            vec![
                HookPoint::ExpNotify,
                HookPoint::ItemNotify,
                HookPoint::RecvMsg,
                HookPoint::CombatMsg
            ]
        );

        let exp = plan[0].1.as_ref().unwrap();
        assert_eq!(exp.address, BASE + 0x5E320);
        assert_eq!(exp.resolution, Resolution::VirtualAddress);
    }

    #[test]
    fn test_signature_preferred_and_failures_isolated() {
        let mut bytes = vec![0u8; 0x80000];
        bytes[0x1234..0x1238].copy_from_slice(&[0x55, 0x8B, 0xEC, 0x6A]);

        let mut config = TrackerConfig::default();
        config.hooks = vec![
            HookTarget {
                point: HookPoint::SpentGold,
                va: None,
                signature: Some(PatternSpec::parse("55 8B EC ??").unwrap()),
                enabled: true,
            },
            HookTarget {
                point: HookPoint::AddMessage,
                va: None,
                signature: Some(PatternSpec::parse("DE AD BE EF").unwrap()),
                enabled: true,
            },
            HookTarget {
                point: HookPoint::PkNotify,
                va: Some(0x45DE50),
                signature: None,
                enabled: false,
            },
        ];

        let plan = plan_hooks(&image(&bytes), &config);
        assert_eq!(plan.len(), 2);

        let spent = plan[0].1.as_ref().unwrap();
        assert_eq!(spent.address, BASE + 0x1234);
        assert_eq!(spent.resolution, Resolution::Signature);
        assert!(matches!(plan[1].1, Err(Error::SignatureNotFound(_))));
    }

    #[test]
    fn test_config_path_beside_module() {
        assert_eq!(
            config_path(Path::new("C:/Games/Host")),
            Path::new("C:/Games/Host").join("dmtrack.toml")
        );
    }
}
