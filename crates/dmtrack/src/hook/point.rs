use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Host entry points the tracker intercepts
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    IntoStaticStr,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HookPoint {
    /// `processPacket_Server_ExpNotify`: one call per experience award (mob kill)
    ExpNotify,
    /// `processPacket_Server_NotifyItemAdd`
    ItemNotify,
    /// `processPacket_Server_PkNotify`: unit death
    PkNotify,
    /// `processPacket_Server_SpentGold`
    SpentGold,
    /// Chat-line append (`this, const char*, color`)
    AddMessage,
    /// `GameChat::recvMsg(const string& msg, const string& from, channel, item*)`
    RecvMsg,
    /// `processPacket_Server_CombatMsg`
    CombatMsg,
}

/// Whether, and when, an interceptor calls the original function.
///
/// Every hook point declares exactly one of these; only the message filter
/// is allowed to skip the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Forwarding {
    /// Call the original, then extract
    OriginalFirst,
    /// Extract (the packet may be consumed by the handler), then call the original
    OriginalLast,
    /// Decide first; the original is skipped when the message is blocked
    Suppressible,
}

/// Image base the default virtual addresses are expressed against
pub const REFERENCE_BASE: u64 = 0x0040_0000;

impl HookPoint {
    /// Known VA in the reference host build, if any
    pub fn default_va(self) -> Option<u64> {
        match self {
            HookPoint::ExpNotify => Some(0x0045_E320),
            HookPoint::ItemNotify => Some(0x0046_73C0),
            HookPoint::PkNotify => Some(0x0045_DE50),
            HookPoint::SpentGold => Some(0x0045_EDD0),
            HookPoint::RecvMsg => Some(0x0047_1E60),
            HookPoint::CombatMsg => Some(0x0046_8110),
            HookPoint::AddMessage => None,
        }
    }

    /// Hooks installed when no configuration says otherwise.
    ///
    /// `pk_notify` would double count kills already seen through `exp_notify`,
    /// and `spent_gold` is useless without a payload layout.
    pub fn enabled_by_default(self) -> bool {
        matches!(
            self,
            HookPoint::ExpNotify | HookPoint::ItemNotify | HookPoint::RecvMsg | HookPoint::CombatMsg
        )
    }

    pub fn forwarding(self) -> Forwarding {
        match self {
            HookPoint::RecvMsg => Forwarding::Suppressible,
            HookPoint::AddMessage => Forwarding::OriginalFirst,
            HookPoint::ExpNotify
            | HookPoint::ItemNotify
            | HookPoint::PkNotify
            | HookPoint::SpentGold
            | HookPoint::CombatMsg => Forwarding::OriginalLast,
        }
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}
