//! Structured extraction from `processPacket_*` arguments
//!
//! What each handler yields:
//!
//! | point         | without layout      | with layout                               |
//! |---------------|---------------------|-------------------------------------------|
//! | `exp_notify`  | kill "Enemy"        | kill carrying exp, plus an exp gain        |
//! | `item_notify` | "Looted Item" x1    | loot item (id 1 is gold)                  |
//! | `pk_notify`   | kill "Enemy"        | kill, group flag from the packet          |
//! | `spent_gold`  | nothing             | gold spend                                |
//! | `combat_msg`  | nothing             | damage dealt (negative amounts are damage) |

use tracing::trace;

use crate::config::PacketLayout;
use crate::error::Result;
use crate::event::{DomainEvent, GOLD_ITEM_ID, ItemQuality};
use crate::extract::text::UNKNOWN_TARGET;
use crate::hook::HookPoint;
use crate::memory::layout::text::HEX_DUMP_LEN;
use crate::memory::{BufferAccess, FieldSpec, ReadMemory, hex_prefix, read_field, read_packet_span};

/// Field values read out of one packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFields {
    pub amount: Option<i64>,
    pub item_id: Option<i64>,
    pub quality: Option<i64>,
    pub group: Option<i64>,
}

impl PacketFields {
    /// Decode every configured field from a copied span
    pub fn decode(address: u64, span: &[u8], layout: &PacketLayout) -> Result<Self> {
        let read = |field: Option<FieldSpec>| -> Result<Option<i64>> {
            field.map(|f| read_field(address, span, f)).transpose()
        };
        Ok(Self {
            amount: read(layout.amount)?,
            item_id: read(layout.item_id)?,
            quality: read(layout.quality)?,
            group: read(layout.group)?,
        })
    }

    fn in_group(&self) -> bool {
        self.group.is_some_and(|g| g != 0)
    }
}

/// Read the packet behind `argument` according to `layout`
pub fn read_fields<R: ReadMemory + ?Sized>(
    reader: &R,
    argument: u64,
    layout: &PacketLayout,
) -> Result<PacketFields> {
    let span = read_packet_span(reader, argument, layout.access, layout.required_len())?;
    PacketFields::decode(argument, &span, layout)
}

/// Map decoded fields of one handler call to events
pub fn events_for(point: HookPoint, fields: Option<&PacketFields>) -> Vec<DomainEvent> {
    let group = fields.is_some_and(PacketFields::in_group);
    let amount = fields.and_then(|f| f.amount);

    match point {
        HookPoint::ExpNotify => {
            let exp = amount.filter(|a| *a > 0).unwrap_or(0);
            let mut events = vec![DomainEvent::kill(UNKNOWN_TARGET, exp).in_group(group)];
            if exp > 0 {
                events.push(DomainEvent::exp(exp).in_group(group));
            }
            events
        }
        HookPoint::PkNotify => vec![DomainEvent::kill(UNKNOWN_TARGET, 0).in_group(group)],
        HookPoint::ItemNotify => vec![loot_event(&fields.copied().unwrap_or_default())],
        HookPoint::SpentGold => amount.map(DomainEvent::gold_spend).into_iter().collect(),
        HookPoint::CombatMsg => amount
            .filter(|a| *a < 0)
            .and_then(i64::checked_neg)
            .map(DomainEvent::damage)
            .into_iter()
            .collect(),
        HookPoint::AddMessage | HookPoint::RecvMsg => Vec::new(),
    }
}

fn loot_event(fields: &PacketFields) -> DomainEvent {
    let item_id = fields.item_id.and_then(|id| u32::try_from(id).ok());
    let quality = fields
        .quality
        .map(ItemQuality::from_tier_saturating)
        .unwrap_or_default();
    let name = match item_id {
        Some(GOLD_ITEM_ID) => "Gold".to_string(),
        Some(id) => format!("Item #{}", id),
        None => "Looted Item".to_string(),
    };

    let mut event = DomainEvent::loot(name, quality, fields.amount.unwrap_or(1))
        .in_group(fields.in_group());
    if let DomainEvent::LootItem { item_id: slot, .. } = &mut event {
        *slot = item_id;
    }
    event
}

/// Extract the events for one structured handler call.
///
/// Points without a layout still produce their layout-free events; a
/// configured layout that cannot be read drops the call's events.
pub fn extract_packet<R: ReadMemory + ?Sized>(
    reader: &R,
    point: HookPoint,
    layout: Option<&PacketLayout>,
    argument: u64,
) -> Result<Vec<DomainEvent>> {
    let fields = layout
        .map(|layout| read_fields(reader, argument, layout))
        .transpose()?;
    trace!("{} packet at {:#x}: {:?}", point, argument, fields);
    Ok(events_for(point, fields.as_ref()))
}

/// Hex of the first bytes of a packet, for the diagnostic field
pub fn packet_hex<R: ReadMemory + ?Sized>(
    reader: &R,
    argument: u64,
    access: BufferAccess,
) -> Result<String> {
    let min_len = match access {
        BufferAccess::Direct => HEX_DUMP_LEN,
        BufferAccess::StlBuffer => 0,
    };
    let span = read_packet_span(reader, argument, access, min_len)?;
    Ok(hex_prefix(&span, HEX_DUMP_LEN))
}
