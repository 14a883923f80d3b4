// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! The master-shire L2 scratchpad window: unicast circular buffers and
//! their locks, the per-slot kernel-launched flags, the broadcast
//! cell, the compute-shire boot mask and the per-hart message
//! counters. Field order is the wire layout both firmware builds
//! agree on; the device linker pins the whole block at the window
//! base, so offsets within the struct are the stable offsets.

use core::cell::UnsafeCell;

use crate::board::{
    CM_MM_IFACE_UNICAST_BUFFER_COUNT, MAX_SIMULTANEOUS_KERNELS, NUM_HARTS,
};
use crate::error::{ErrorKind, Result};
use crate::sync::{fence, GlobalAtomicU32, GlobalAtomicU64, LocalAtomicU32, SpinWord};

use super::circbuff::CircBuffer;
use super::message::MessageCell;

#[repr(C, align(64))]
struct BroadcastCtrl {
    count: GlobalAtomicU32,
    _pad: [u32; 15],
}

#[repr(C, align(64))]
struct KernelLaunchedFlag {
    flag: GlobalAtomicU32,
    _pad: [u32; 15],
}

#[repr(C, align(64))]
struct BootMask {
    mask: GlobalAtomicU64,
    _pad: [u64; 7],
}

/// One byte lane per hart, four harts per word.
const MSG_COUNTER_WORDS: usize = NUM_HARTS / 4;

#[repr(C, align(64))]
pub struct MasterScratchpad {
    unicast_buffers: [CircBuffer; CM_MM_IFACE_UNICAST_BUFFER_COUNT],
    unicast_locks: [SpinWord; CM_MM_IFACE_UNICAST_BUFFER_COUNT],
    kernel_launched_flags: [KernelLaunchedFlag; MAX_SIMULTANEOUS_KERNELS],
    broadcast_payload: UnsafeCell<MessageCell>,
    broadcast_ctrl: BroadcastCtrl,
    boot_mask: BootMask,
    hart_message_counters: [LocalAtomicU32; MSG_COUNTER_WORDS],
}

// SAFETY: the broadcast payload is single-producer and only read after
// the control word publishes it; everything else is atomics and locks.
unsafe impl Sync for MasterScratchpad {}

const SCRATCHPAD_INIT_BUFFER: CircBuffer = CircBuffer::new();
const SCRATCHPAD_INIT_LOCK: SpinWord = SpinWord::new();
const SCRATCHPAD_INIT_FLAG: KernelLaunchedFlag = KernelLaunchedFlag {
    flag: GlobalAtomicU32::new(0),
    _pad: [0; 15],
};
const SCRATCHPAD_INIT_COUNTER: LocalAtomicU32 = LocalAtomicU32::new(0);

/// The device linker pins this block at the master-shire window base.
static SCRATCHPAD: MasterScratchpad = MasterScratchpad {
    unicast_buffers: [SCRATCHPAD_INIT_BUFFER; CM_MM_IFACE_UNICAST_BUFFER_COUNT],
    unicast_locks: [SCRATCHPAD_INIT_LOCK; CM_MM_IFACE_UNICAST_BUFFER_COUNT],
    kernel_launched_flags: [SCRATCHPAD_INIT_FLAG; MAX_SIMULTANEOUS_KERNELS],
    broadcast_payload: UnsafeCell::new(MessageCell::empty()),
    broadcast_ctrl: BroadcastCtrl {
        count: GlobalAtomicU32::new(0),
        _pad: [0; 15],
    },
    boot_mask: BootMask {
        mask: GlobalAtomicU64::new(0),
        _pad: [0; 7],
    },
    hart_message_counters: [SCRATCHPAD_INIT_COUNTER; MSG_COUNTER_WORDS],
};

/// Publish a broadcast to the compute shires in `dest_shire_mask` and
/// return the new message number.
///
/// There is a single broadcast slot: the master must not call this
/// again until every recipient of the previous message has
/// acknowledged it out of band (for kernel launches, by clearing its
/// bit in the pending-shire mask).
pub fn mm_to_cm_broadcast_send(dest_shire_mask: u64, message: &MessageCell) -> u32 {
    debug_assert_ne!(dest_shire_mask, 0);
    let number = SCRATCHPAD.broadcast_ctrl.count.load().wrapping_add(1);
    let mut stamped = *message;
    stamped.number = number as u8;
    // SAFETY: single producer, and the previous payload has been
    // consumed by every recipient per the call contract.
    unsafe {
        *SCRATCHPAD.broadcast_payload.get() = stamped;
    }
    fence();
    SCRATCHPAD.broadcast_ctrl.count.store(number);
    number
}

/// Has a broadcast newer than `previous_number` been published?
pub fn mm_to_cm_broadcast_available(previous_number: u32) -> bool {
    SCRATCHPAD.broadcast_ctrl.count.load() != previous_number
}

/// Consume the current broadcast; returns its message number for the
/// caller's cursor.
pub fn mm_to_cm_broadcast_receive(out: &mut MessageCell) -> u32 {
    let number = SCRATCHPAD.broadcast_ctrl.count.load();
    fence();
    // SAFETY: the control word published this payload, and the
    // producer cannot overwrite it until this consumer acknowledges.
    *out = unsafe { *SCRATCHPAD.broadcast_payload.get() };
    number
}

/// Thread-safe unicast send into circular buffer `cb_idx`, stamping the
/// sender's message number and ringing the target master hart.
pub fn cm_to_mm_unicast_send(
    ms_thread_id: u64,
    cb_idx: usize,
    message: &MessageCell,
) -> Result<()> {
    if cb_idx >= CM_MM_IFACE_UNICAST_BUFFER_COUNT {
        return ErrorKind::InvalidParam.into();
    }
    let hart_id = crate::arch::current_hart_id();
    let number = SCRATCHPAD.hart_message_counters[hart_id / 4].fetch_add_u8(hart_id % 4, 1);

    let mut stamped = *message;
    stamped.number = number;

    let result = {
        let _guard = SCRATCHPAD.unicast_locks[cb_idx].lock();
        SCRATCHPAD.unicast_buffers[cb_idx].push(&stamped)
    };
    if result.is_ok() {
        crate::arch::notify_master_hart(ms_thread_id);
    }
    result
}

/// Single-consumer unicast receive; no lock.
pub fn cm_to_mm_unicast_receive(cb_idx: usize, out: &mut MessageCell) -> Result<()> {
    if cb_idx >= CM_MM_IFACE_UNICAST_BUFFER_COUNT {
        return ErrorKind::InvalidParam.into();
    }
    SCRATCHPAD.unicast_buffers[cb_idx].pop(out)
}

/// Set by the launch-last hart so the master can observe that slot
/// `slot_index` has actually started executing.
pub fn set_kernel_launched_flag(slot_index: usize) {
    SCRATCHPAD.kernel_launched_flags[slot_index].flag.store(1);
}

/// Master-side: poll and re-arm the per-slot launched flag.
pub fn kernel_launched(slot_index: usize) -> bool {
    SCRATCHPAD.kernel_launched_flags[slot_index].flag.load() != 0
}

pub fn clear_kernel_launched_flag(slot_index: usize) {
    SCRATCHPAD.kernel_launched_flags[slot_index].flag.store(0);
}

/// Compute shires report in here once their dispatch loop is up.
pub fn mark_shire_booted(shire_id: usize) {
    SCRATCHPAD.boot_mask.mask.fetch_or(1 << shire_id);
}

pub fn booted_shires() -> u64 {
    SCRATCHPAD.boot_mask.mask.load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::CM_MM_KW_HART_UNICAST_BUFF_BASE_IDX;
    use crate::kernel::message::{KernelAbortMessage, MmToCmMessageId};
    use memoffset::offset_of;

    #[test]
    fn scratchpad_layout_is_pinned() {
        assert_eq!(offset_of!(MasterScratchpad, unicast_buffers), 0);
        assert_eq!(offset_of!(MasterScratchpad, unicast_locks), 20 * 1024);
        assert_eq!(
            offset_of!(MasterScratchpad, kernel_launched_flags),
            20 * 1024 + 320
        );
        assert_eq!(
            offset_of!(MasterScratchpad, broadcast_ctrl)
                - offset_of!(MasterScratchpad, broadcast_payload),
            64
        );
        assert_eq!(core::mem::align_of::<MasterScratchpad>(), 64);
    }

    #[test]
    fn broadcast_publish_then_consume() {
        let before = SCRATCHPAD.broadcast_ctrl.count.load();
        assert!(!mm_to_cm_broadcast_available(before));

        let sent = KernelAbortMessage { slot_index: 3 }.encode();
        let number = mm_to_cm_broadcast_send(0x1, &sent);
        assert!(mm_to_cm_broadcast_available(before));

        let mut got = MessageCell::empty();
        assert_eq!(mm_to_cm_broadcast_receive(&mut got), number);
        assert_eq!(got.id, MmToCmMessageId::KernelAbort as u8);
        assert_eq!(got.number, number as u8);
        assert!(!mm_to_cm_broadcast_available(number));
    }

    #[test]
    fn unicast_rejects_bad_buffer_index() {
        let cell = MessageCell::empty();
        assert!(cm_to_mm_unicast_send(0, 99, &cell).is_err());
        let mut out = MessageCell::empty();
        assert!(cm_to_mm_unicast_receive(99, &mut out).is_err());
    }

    #[test]
    fn unicast_send_stamps_sender_numbers() {
        crate::arch::set_current_hart(7);
        let cb = CM_MM_KW_HART_UNICAST_BUFF_BASE_IDX + 2;
        let cell = KernelAbortMessage { slot_index: 0 }.encode();
        cm_to_mm_unicast_send(1, cb, &cell).unwrap();
        cm_to_mm_unicast_send(1, cb, &cell).unwrap();

        let mut out = MessageCell::empty();
        cm_to_mm_unicast_receive(cb, &mut out).unwrap();
        let first = out.number;
        cm_to_mm_unicast_receive(cb, &mut out).unwrap();
        assert_eq!(out.number, first.wrapping_add(1));
    }
}
