//! Replacement functions installed over the host's entry points
//!
//! Each interceptor has the host function's exact signature and calls the
//! original through its `OriginalSlot`. When the original runs is decided by
//! `HookPoint::forwarding`; only `recv_msg` may skip it. Nothing unwinds out of
//! here: session work runs under `catch_unwind` and a failure only loses the
//! event.

use std::ffi::{c_char, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};

use dmtrack::hook::{Forwarding, HookPoint, OriginalSlot};
use tracing::error;

use crate::agent;

type PacketFn = unsafe extern "thiscall" fn(*mut c_void, *mut c_void);
type AddMessageFn = unsafe extern "thiscall" fn(*mut c_void, *const c_char, i32);
type RecvMsgFn =
    unsafe extern "thiscall" fn(*mut c_void, *mut c_void, *mut c_void, i32, *mut c_void);

static EXP_NOTIFY: OriginalSlot = OriginalSlot::new();
static ITEM_NOTIFY: OriginalSlot = OriginalSlot::new();
static PK_NOTIFY: OriginalSlot = OriginalSlot::new();
static SPENT_GOLD: OriginalSlot = OriginalSlot::new();
static ADD_MESSAGE: OriginalSlot = OriginalSlot::new();
static RECV_MSG: OriginalSlot = OriginalSlot::new();
static COMBAT_MSG: OriginalSlot = OriginalSlot::new();

pub fn slot(point: HookPoint) -> &'static OriginalSlot {
    match point {
        HookPoint::ExpNotify => &EXP_NOTIFY,
        HookPoint::ItemNotify => &ITEM_NOTIFY,
        HookPoint::PkNotify => &PK_NOTIFY,
        HookPoint::SpentGold => &SPENT_GOLD,
        HookPoint::AddMessage => &ADD_MESSAGE,
        HookPoint::RecvMsg => &RECV_MSG,
        HookPoint::CombatMsg => &COMBAT_MSG,
    }
}

/// Address of the interceptor for `point`
pub fn interceptor(point: HookPoint) -> usize {
    match point {
        HookPoint::ExpNotify => exp_notify as PacketFn as usize,
        HookPoint::ItemNotify => item_notify as PacketFn as usize,
        HookPoint::PkNotify => pk_notify as PacketFn as usize,
        HookPoint::SpentGold => spent_gold as PacketFn as usize,
        HookPoint::CombatMsg => combat_msg as PacketFn as usize,
        HookPoint::AddMessage => add_message as AddMessageFn as usize,
        HookPoint::RecvMsg => recv_msg as RecvMsgFn as usize,
    }
}

fn guarded<T>(point: HookPoint, fallback: T, f: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        error!("{} interceptor panicked; event dropped", point);
        fallback
    })
}

fn packet(point: HookPoint, this: *mut c_void, data: *mut c_void) {
    let extract = || {
        guarded(point, (), || {
            if let Some(session) = agent::session() {
                session.on_packet(point, data as usize as u64);
            }
        })
    };
    let forward = || {
        if let Some(address) = slot(point).get() {
            // SAFETY: the slot holds the trampoline for a function of this signature.
            unsafe {
                let original = std::mem::transmute::<usize, PacketFn>(address);
                original(this, data);
            }
        }
    };

    match point.forwarding() {
        Forwarding::OriginalFirst => {
            forward();
            extract();
        }
        Forwarding::OriginalLast | Forwarding::Suppressible => {
            extract();
            forward();
        }
    }
}

unsafe extern "thiscall" fn exp_notify(this: *mut c_void, data: *mut c_void) {
    packet(HookPoint::ExpNotify, this, data);
}

unsafe extern "thiscall" fn item_notify(this: *mut c_void, data: *mut c_void) {
    packet(HookPoint::ItemNotify, this, data);
}

unsafe extern "thiscall" fn pk_notify(this: *mut c_void, data: *mut c_void) {
    packet(HookPoint::PkNotify, this, data);
}

unsafe extern "thiscall" fn spent_gold(this: *mut c_void, data: *mut c_void) {
    packet(HookPoint::SpentGold, this, data);
}

unsafe extern "thiscall" fn combat_msg(this: *mut c_void, data: *mut c_void) {
    packet(HookPoint::CombatMsg, this, data);
}

/// Chat-line append: the line is displayed first, then parsed
unsafe extern "thiscall" fn add_message(this: *mut c_void, message: *const c_char, color: i32) {
    if let Some(address) = ADD_MESSAGE.get() {
        // SAFETY: trampoline of a function with this exact signature.
        unsafe {
            let original = std::mem::transmute::<usize, AddMessageFn>(address);
            original(this, message, color);
        }
    }
    if message.is_null() {
        return;
    }
    guarded(HookPoint::AddMessage, (), || {
        if let Some(session) = agent::session() {
            session.on_chat_line(message as usize as u64);
        }
    });
}

/// Inbound chat message: the original is skipped when the filter blocks it
unsafe extern "thiscall" fn recv_msg(
    this: *mut c_void,
    message: *mut c_void,
    from: *mut c_void,
    channel: i32,
    linked_item: *mut c_void,
) {
    let blocked = guarded(HookPoint::RecvMsg, false, || {
        agent::session().is_some_and(|session| {
            session.should_block_message(message as usize as u64, linked_item as usize as u64)
        })
    });
    if blocked {
        return;
    }
    if let Some(address) = RECV_MSG.get() {
        // SAFETY: trampoline of a function with this exact signature.
        unsafe {
            let original = std::mem::transmute::<usize, RecvMsgFn>(address);
            original(this, message, from, channel, linked_item);
        }
    }
}
