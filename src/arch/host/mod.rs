// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Host backend: a software model of the device surface.
//!
//! Hart identity is a thread-local set by `cpu_map_self`; a "U-mode
//! kernel" is an `extern "C"` function reached through its address;
//! cache, tensor and syscall operations reduce to fences or counters
//! the test suites can observe.

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::{FccChannel, KernelReturn, KERNEL_RETURN_EXCEPTION};
use crate::board::{shire_of, NUM_HARTS, NUM_SHIRES};

std::thread_local! {
    static CURRENT_HART: Cell<usize> = const { Cell::new(0) };
}

static L3_EVICTIONS: [AtomicU32; NUM_SHIRES] = [const { AtomicU32::new(0) }; NUM_SHIRES];
static TENSOR_ERROR: [AtomicU64; NUM_HARTS] = [const { AtomicU64::new(0) }; NUM_HARTS];

pub fn set_current_hart(hart_id: usize) {
    CURRENT_HART.with(|cell| cell.set(hart_id));
}

pub fn current_hart_id() -> usize {
    CURRENT_HART.with(|cell| cell.get())
}

pub fn wfi() {
    std::thread::yield_now();
}

/// Instruction-cache synchronization; nothing to do off-device.
pub fn fence_i() {}

pub fn supervisor_interrupts_enable() {}

pub fn supervisor_interrupts_disable() {}

/// Run the "U-mode kernel" at `entry_pc`. A zero entry models a kernel
/// that never reaches the return primitive: the fetch faults and the
/// trap handler reports an exception exit.
///
/// # Safety
///
/// A non-zero `entry_pc` must be the address of an
/// `extern "C" fn(u64) -> KernelReturn`.
pub unsafe fn enter_user_mode(entry_pc: u64, arg0: u64, _stack_base: u64) -> (i64, u64) {
    if entry_pc == 0 {
        return (0, KERNEL_RETURN_EXCEPTION);
    }
    let kernel: extern "C" fn(u64) -> KernelReturn = core::mem::transmute(entry_pc as *const ());
    let ret = kernel(arg0);
    (ret.value, ret.kind)
}

/// M-mode pre-kernel setup: worker thread-1 enable and I-cache
/// invalidate for the shire.
pub fn pre_kernel_setup_syscall(_minion_mask: u32, _first_worker: u64) {
    fence_i();
}

/// M-mode L3 partition evict for the calling hart's shire.
pub fn evict_l3_syscall() {
    L3_EVICTIONS[shire_of(current_hart_id())].fetch_add(1, Ordering::SeqCst);
}

/// M-mode per-hart cleanup after a kernel run.
pub fn post_kernel_cleanup_syscall(_thread_count: u32) {}

/// Drain and re-arm one FCC channel.
pub fn init_fcc(_channel: FccChannel) {}

/// Re-arm every fast local barrier of the calling hart's shire.
pub fn init_flbs() {}

/// Allow cooperative tensor loads/stores within the shire.
pub fn enable_coop_tensor_ops() {}

pub fn disable_message_ports() {}

/// Consume a stray TensorLoadSetupB and zero the TenC accumulator.
/// Like the device sequence, this leaves the error CSR clean.
pub fn quiesce_tensor_unit() {
    clear_tensor_error();
}

pub fn clear_tensor_error() {
    TENSOR_ERROR[current_hart_id()].store(0, Ordering::SeqCst);
}

pub fn read_tensor_error() -> u64 {
    TENSOR_ERROR[current_hart_id()].load(Ordering::SeqCst)
}

/// Eight FPU lanes on, flags clear, round-to-nearest-even.
pub fn reset_fpu_state() {}

/// Wait for outstanding memory, tensor-load, prefetch, cache-op, FMA,
/// tensor-store, reduce and quantize queues to drain.
pub fn wait_mem_and_tensor_ops() {
    crate::sync::fence();
}

/// Doorbell for a master-shire hart after a unicast send.
pub fn notify_master_hart(_ms_thread_id: u64) {}

/// Test instrumentation: L3 evictions observed for a shire.
pub fn l3_evictions(shire_id: usize) -> u32 {
    L3_EVICTIONS[shire_id].load(Ordering::SeqCst)
}

/// Test instrumentation: plant a tensor-error CSR value for a hart.
pub fn inject_tensor_error(hart_id: usize, value: u64) {
    TENSOR_ERROR[hart_id].store(value, Ordering::SeqCst);
}
