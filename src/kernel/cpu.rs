// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Per-hart context and the compute-minion dispatch loop.

use crate::arch;
use crate::board::{shire_first_worker, shire_of, thread_of, NUM_HARTS};
use crate::utils::bit_get;

use super::iface;
use super::launch::{launch_kernel, KernelParams};
use super::message::{
    KernelAbortMessage, KernelLaunchMessage, MessageCell, SetLogLevelMessage,
    MM_TO_CM_HANDLER_LIST,
};

/// A struct to store the information of a hart
pub struct Hart {
    pub id: usize,
    /// Number of the last consumed broadcast.
    pub broadcast_number: u32,
    pub umode_trace: super::trace::UModeTrace,
}

impl Hart {
    const fn new() -> Hart {
        Hart {
            id: 0,
            broadcast_number: 0,
            umode_trace: super::trace::UModeTrace::new(),
        }
    }
}

/// One entry per hart of the device.
static mut HART_LIST: [Hart; NUM_HARTS] = [const { Hart::new() }; NUM_HARTS];

/// Bind the calling context to `hart_id`. On the device the boot path
/// calls this once per hart; the host test harness calls it per
/// thread.
pub fn cpu_map_self(hart_id: usize) {
    arch::set_current_hart(hart_id);
    // SAFETY: each hart writes only its own HART_LIST entry.
    let hart = unsafe { &mut *core::ptr::addr_of_mut!(HART_LIST[hart_id]) };
    hart.id = hart_id;
}

pub fn current_hart() -> &'static mut Hart {
    let hart_id = arch::current_hart_id();
    // SAFETY: the entry is owned by the calling hart (set by
    // cpu_map_self) and never handed to another hart.
    unsafe { &mut *core::ptr::addr_of_mut!(HART_LIST[hart_id]) }
}

/// Master-side debug view of a hart's finalized U-mode trace header.
/// Only meaningful while the hart is parked between launches.
pub fn umode_trace_header(hart_id: usize) -> Option<(u32, u64)> {
    // SAFETY: read-only peek at a quiesced hart's trace buffer.
    let hart = unsafe { &*core::ptr::addr_of!(HART_LIST[hart_id]) };
    hart.umode_trace.header()
}

pub(crate) fn handle_none(_cell: &MessageCell) {
    trace!("ignoring empty broadcast");
}

pub(crate) fn handle_kernel_launch(cell: &MessageCell) {
    let msg = match KernelLaunchMessage::decode(cell) {
        Ok(msg) => msg,
        Err(err) => {
            error!("malformed kernel_launch broadcast: {}", err);
            return;
        }
    };
    let hart_id = arch::current_hart_id();
    let shire_id = shire_of(hart_id);
    if bit_get(msg.shire_mask, shire_id) == 0 {
        return;
    }
    // Reserved dispatch threads of the master shire sit launches out.
    if thread_of(hart_id) < shire_first_worker(shire_id) {
        return;
    }
    // Clear this hart's stale launched bit from the previous launch.
    super::launch_info::launch_info(shire_id).reset_thread_launched(thread_of(hart_id));
    let _ = launch_kernel(&KernelParams::from(msg));
}

pub(crate) fn handle_kernel_abort(cell: &MessageCell) {
    let msg = match KernelAbortMessage::decode(cell) {
        Ok(msg) => msg,
        Err(err) => {
            error!("malformed kernel_abort broadcast: {}", err);
            return;
        }
    };
    debug!("abort requested for slot {}", msg.slot_index);
    super::exception::request_abort(msg.slot_index as usize);
}

pub(crate) fn handle_set_log_level(cell: &MessageCell) {
    match SetLogLevelMessage::decode(cell) {
        Ok(msg) => super::logger::set_log_level(msg.level),
        Err(err) => error!("malformed set_log_level broadcast: {}", err),
    }
}

/// Dispatch one master broadcast by its variant tag.
pub fn dispatch_message(cell: &MessageCell) {
    match MM_TO_CM_HANDLER_LIST.get(cell.id as usize) {
        Some(handler) => handler(cell),
        None => error!("illegal message id {}", cell.id),
    }
}

/// Compute-minion entry: park in WFI, consume broadcasts as they are
/// published.
pub fn hart_main(hart_id: usize) -> ! {
    cpu_map_self(hart_id);
    if thread_of(hart_id) == 0 {
        iface::mark_shire_booted(shire_of(hart_id));
    }
    arch::supervisor_interrupts_disable();

    loop {
        let hart = current_hart();
        if iface::mm_to_cm_broadcast_available(hart.broadcast_number) {
            let mut cell = MessageCell::empty();
            hart.broadcast_number = iface::mm_to_cm_broadcast_receive(&mut cell);
            dispatch_message(&cell);
        } else {
            arch::wfi();
        }
    }
}
