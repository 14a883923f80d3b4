// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Kernel launch state.
//!
//! Per shire: one cache-line-aligned control block in the shire's
//! local-atomic bank, mutated by every hart of the shire. Setters
//! return the previous value so the caller can detect being the last
//! (or first) hart to flip a bit.
//!
//! Per slot: the device-wide coordination cells (pending shires,
//! global error masks, global status). A shire runs one kernel at a
//! time, but distinct slots run concurrently on disjoint shires, so
//! this state is keyed by slot.

use crate::board::{MAX_SIMULTANEOUS_KERNELS, NUM_SHIRES};
use crate::sync::{GlobalAtomicU32, GlobalAtomicU64, LocalAtomicU32, LocalAtomicU64};

pub const KERNEL_COMPLETE_STATUS_SUCCESS: i32 = 0;
pub const KERNEL_COMPLETE_STATUS_ERROR: i32 = -1;

#[repr(C, align(64))]
pub struct KernelLaunchInfo {
    /// Bit per thread that entered U-mode.
    launched_threads: LocalAtomicU64,
    /// Bit per thread back in S-mode, normally or via trap.
    returned_threads: LocalAtomicU64,
    /// Bit per thread done with post-launch cleanup.
    completed_threads: LocalAtomicU64,
    exception_mask: LocalAtomicU64,
    system_abort_mask: LocalAtomicU64,
    bus_error_mask: LocalAtomicU64,
    exception_buffer: LocalAtomicU64,
    execution_status: LocalAtomicU32,
    /// kw_base_id in lane 0, slot_index in lane 1.
    attributes: LocalAtomicU32,
}

impl KernelLaunchInfo {
    const fn new() -> Self {
        Self {
            launched_threads: LocalAtomicU64::new(0),
            returned_threads: LocalAtomicU64::new(0),
            completed_threads: LocalAtomicU64::new(0),
            exception_mask: LocalAtomicU64::new(0),
            system_abort_mask: LocalAtomicU64::new(0),
            bus_error_mask: LocalAtomicU64::new(0),
            exception_buffer: LocalAtomicU64::new(0),
            execution_status: LocalAtomicU32::new(KERNEL_COMPLETE_STATUS_SUCCESS as u32),
            attributes: LocalAtomicU32::new(0),
        }
    }

    pub fn set_thread_launched(&self, thread_id: usize) -> u64 {
        self.launched_threads.fetch_or(1 << thread_id)
    }

    pub fn reset_thread_launched(&self, thread_id: usize) -> u64 {
        self.launched_threads.fetch_and(!(1 << thread_id))
    }

    pub fn has_thread_launched(&self, thread_id: usize) -> bool {
        (self.launched_threads.load() >> thread_id) & 1 != 0
    }

    pub fn set_thread_returned(&self, thread_id: usize) -> u64 {
        self.returned_threads.fetch_or(1 << thread_id)
    }

    pub fn set_thread_completed(&self, thread_id: usize) -> u64 {
        self.completed_threads.fetch_or(1 << thread_id)
    }

    pub fn has_thread_completed(&self, thread_id: usize) -> bool {
        (self.completed_threads.load() >> thread_id) & 1 != 0
    }

    pub fn completed_threads(&self) -> u64 {
        self.completed_threads.load()
    }

    pub fn set_local_exception_mask(&self, thread_id: usize) -> u64 {
        self.exception_mask.fetch_or(1 << thread_id)
    }

    pub fn exception_mask(&self) -> u64 {
        self.exception_mask.load()
    }

    pub fn set_local_system_abort_mask(&self, thread_id: usize) -> u64 {
        self.system_abort_mask.fetch_or(1 << thread_id)
    }

    pub fn set_local_bus_error_mask(&self, thread_id: usize) -> u64 {
        self.bus_error_mask.fetch_or(1 << thread_id)
    }

    pub fn check_local_bus_error(&self, thread_id: usize) -> bool {
        (self.bus_error_mask.load() >> thread_id) & 1 != 0
    }

    /// CAS from success; the first error a shire sees wins.
    pub fn set_execution_status(&self, status: i32) {
        self.execution_status
            .compare_exchange(KERNEL_COMPLETE_STATUS_SUCCESS as u32, status as u32);
    }

    pub fn get_execution_status(&self) -> i32 {
        self.execution_status.load() as i32
    }

    pub fn get_exception_buffer(&self) -> u64 {
        self.exception_buffer.load()
    }

    /// kw_base_id and slot_index, as stored at pre-launch.
    pub fn get_attributes(&self) -> (u8, u8) {
        let attributes = self.attributes.load();
        (attributes as u8, (attributes >> 8) as u8)
    }

    // Reset entry points below are for the designated per-shire
    // initializer only, before the pre-launch barrier.

    pub fn set_attributes(&self, kw_base_id: u8, slot_index: u8, exception_buffer: u64) {
        self.attributes
            .store(kw_base_id as u32 | (slot_index as u32) << 8);
        self.exception_buffer.store(exception_buffer);
    }

    pub fn reset_execution_status(&self) {
        self.execution_status
            .store(KERNEL_COMPLETE_STATUS_SUCCESS as u32);
    }

    pub fn reset_completed_threads(&self) {
        self.completed_threads.store(0);
    }

    pub fn reset_thread_returned(&self) {
        self.returned_threads.store(0);
    }

    pub fn reset_error_masks(&self) {
        self.exception_mask.store(0);
        self.bus_error_mask.store(0);
        self.system_abort_mask.store(0);
    }
}

static KERNEL_LAUNCH_INFO: [KernelLaunchInfo; NUM_SHIRES] =
    [const { KernelLaunchInfo::new() }; NUM_SHIRES];

pub fn launch_info(shire_id: usize) -> &'static KernelLaunchInfo {
    &KERNEL_LAUNCH_INFO[shire_id]
}

#[repr(C, align(64))]
struct Line<T>(T);

/// Device-wide coordination cells for one kernel slot, each on its own
/// line of the globally ordered cache.
#[repr(C, align(64))]
struct LaunchCoordination {
    pending_shire_mask: Line<GlobalAtomicU64>,
    global_exception_mask: Line<GlobalAtomicU64>,
    global_system_abort_mask: Line<GlobalAtomicU64>,
    global_execution_status: Line<GlobalAtomicU32>,
}

impl LaunchCoordination {
    const fn new() -> Self {
        Self {
            pending_shire_mask: Line(GlobalAtomicU64::new(0)),
            global_exception_mask: Line(GlobalAtomicU64::new(0)),
            global_system_abort_mask: Line(GlobalAtomicU64::new(0)),
            global_execution_status: Line(GlobalAtomicU32::new(
                KERNEL_COMPLETE_STATUS_SUCCESS as u32,
            )),
        }
    }
}

static LAUNCH_COORDINATION: [LaunchCoordination; MAX_SIMULTANEOUS_KERNELS] =
    [const { LaunchCoordination::new() }; MAX_SIMULTANEOUS_KERNELS];

/// Arm a slot for a new launch. Designated-initializer only; every
/// participating shire stores the same values, so the redundant
/// stores from other shires' initializers are benign.
pub fn reset_launch_coordination(slot_index: usize, shire_mask: u64) {
    let slot = &LAUNCH_COORDINATION[slot_index];
    slot.pending_shire_mask.0.store(shire_mask);
    slot.global_exception_mask.0.store(0);
    slot.global_system_abort_mask.0.store(0);
    slot.global_execution_status
        .0
        .store(KERNEL_COMPLETE_STATUS_SUCCESS as u32);
}

pub fn pending_shire_mask(slot_index: usize) -> u64 {
    LAUNCH_COORDINATION[slot_index].pending_shire_mask.0.load()
}

/// Clear this shire's pending bit; returns the previous mask so the
/// caller can detect having been the last pending shire.
pub fn clear_pending_shire(slot_index: usize, shire_id: usize) -> u64 {
    LAUNCH_COORDINATION[slot_index]
        .pending_shire_mask
        .0
        .fetch_and(!(1 << shire_id))
}

pub fn set_global_exception_mask(slot_index: usize, shire_id: usize) -> u64 {
    LAUNCH_COORDINATION[slot_index]
        .global_exception_mask
        .0
        .fetch_or(1 << shire_id)
}

pub fn global_exception_mask(slot_index: usize) -> u64 {
    LAUNCH_COORDINATION[slot_index].global_exception_mask.0.load()
}

pub fn set_global_system_abort_mask(slot_index: usize, shire_id: usize) -> u64 {
    LAUNCH_COORDINATION[slot_index]
        .global_system_abort_mask
        .0
        .fetch_or(1 << shire_id)
}

pub fn global_system_abort_mask(slot_index: usize) -> u64 {
    LAUNCH_COORDINATION[slot_index]
        .global_system_abort_mask
        .0
        .load()
}

/// CAS from success; the first erroring shire wins.
pub fn promote_global_execution_status(slot_index: usize, status: i32) {
    LAUNCH_COORDINATION[slot_index]
        .global_execution_status
        .0
        .compare_exchange(KERNEL_COMPLETE_STATUS_SUCCESS as u32, status as u32);
}

pub fn global_execution_status(slot_index: usize) -> i32 {
    LAUNCH_COORDINATION[slot_index]
        .global_execution_status
        .0
        .load() as i32
}
