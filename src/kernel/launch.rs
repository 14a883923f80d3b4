// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! The kernel launch orchestrator.
//!
//! Runs on every participating hart when a kernel-launch broadcast
//! arrives: per-hart and per-shire pre-launch setup, the two-level
//! barrier, the U-mode round trip, error classification, the drain
//! and post-launch barrier, and completion detection. Exactly one
//! hart per launch (the launch-last-completer) emits the
//! KERNEL_COMPLETE message.

use crate::arch::{self, FccChannel};
use crate::board::{
    kernel_umode_stack, shire_first_worker, shire_minion_mask, shire_of, shire_thread_count,
    shire_thread_mask, thread_of, CM_MM_KW_HART_UNICAST_BUFF_BASE_IDX, NUM_COMPUTE_SHIRES,
    NUM_SHIRES,
};
use crate::sync::LocalFccBarrier;

use super::barrier::pre_launch_synchronize_shires;
use super::exception::{self, save_kernel_error, ContextKind};
use super::iface;
use super::launch_info::{
    self, launch_info, KERNEL_COMPLETE_STATUS_ERROR, KERNEL_COMPLETE_STATUS_SUCCESS,
};
use super::message::{KernelCompleteMessage, KernelLaunchMessage};

pub mod launch_flags {
    pub const EVICT_L3_BEFORE_LAUNCH: u8 = 1 << 0;
    pub const FLUSH_L3: u8 = 1 << 1;
    pub const TRACE_ENABLE: u8 = 1 << 2;
    /// The argument block was staged inside the launch message;
    /// `pointer_to_args` already addresses the staged copy.
    pub const ARGS_EMBEDDED: u8 = 1 << 3;
}

/// Orchestrator input, as decoded from the launch broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelParams {
    pub code_start_address: u64,
    pub pointer_to_args: u64,
    /// Zero means no error-context capture.
    pub exception_buffer: u64,
    pub shire_mask: u64,
    pub slot_index: u8,
    pub kw_base_id: u8,
    pub flags: u8,
}

impl From<KernelLaunchMessage> for KernelParams {
    fn from(msg: KernelLaunchMessage) -> Self {
        Self {
            code_start_address: msg.code_start_address,
            pointer_to_args: msg.pointer_to_args,
            exception_buffer: msg.exception_buffer,
            shire_mask: msg.shire_mask,
            slot_index: msg.slot_index,
            kw_base_id: msg.kw_base_id,
            flags: msg.flags,
        }
    }
}

/// How the U-mode round trip ended. The kernel-return primitive
/// produces `Normal`; the trap handler produces the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelExit {
    Normal(i64),
    SystemAbort(i64),
    UserError(i64),
    Exception,
}

impl KernelExit {
    pub fn from_raw(value: i64, kind: u64) -> Self {
        match kind {
            arch::KERNEL_RETURN_SUCCESS => Self::Normal(value),
            arch::KERNEL_RETURN_SYSTEM_ABORT => Self::SystemAbort(value),
            arch::KERNEL_RETURN_USER_ERROR => Self::UserError(value),
            _ => Self::Exception,
        }
    }
}

static POST_LAUNCH_BARRIER: [LocalFccBarrier; NUM_SHIRES] =
    [const { LocalFccBarrier::new() }; NUM_SHIRES];

/// Run one kernel on the calling hart. Returns the kernel's return
/// value after post-launch cleanup.
pub fn launch_kernel(params: &KernelParams) -> i64 {
    let hart_id = arch::current_hart_id();
    let shire_id = shire_of(hart_id);
    let thread_id = thread_of(hart_id);

    pre_kernel_setup(params);

    // Every shire involved in the launch reaches this sync point
    // before any hart enters U-mode.
    let launch_last =
        pre_launch_synchronize_shires(params.slot_index as usize, params.shire_mask.count_ones());

    launch_info(shire_id).set_thread_launched(thread_id);

    // The launch-last hart flags the slot so the master can observe
    // that execution has begun.
    if launch_last {
        iface::set_kernel_launched_flag(params.slot_index as usize);
    }

    // SAFETY: entry point and stack were validated at dispatch; the
    // trampoline's contract covers the rest.
    let (value, kind) = unsafe {
        arch::enter_user_mode(
            params.code_start_address,
            params.pointer_to_args,
            kernel_umode_stack(hart_id),
        )
    };

    launch_info(shire_id).set_thread_returned(thread_id);

    debug!("launch_kernel: returned from kernel launch");

    kernel_launch_post_cleanup(params, KernelExit::from_raw(value, kind));

    value
}

fn pre_kernel_setup(params: &KernelParams) {
    let hart_id = arch::current_hart_id();
    let shire_id = shire_of(hart_id);
    let thread_id = thread_of(hart_id);
    let first_worker = shire_first_worker(shire_id);

    super::cpu::current_hart()
        .umode_trace
        .init(hart_id, params.flags & launch_flags::TRACE_ENABLE != 0);

    // Enable thread 1s, init L1, invalidate I-cache.
    arch::pre_kernel_setup_syscall(shire_minion_mask(shire_id), first_worker as u64);

    // Second worker hart (first minion thread 1) in the shire.
    // Thread 0s have more init to do than thread 1s, so a thread 1
    // carries the per-shire init.
    if thread_id == first_worker + 1 {
        let info = launch_info(shire_id);
        info.set_attributes(params.kw_base_id, params.slot_index, params.exception_buffer);
        info.reset_execution_status();
        info.reset_completed_threads();
        info.reset_thread_returned();
        info.reset_error_masks();

        launch_info::reset_launch_coordination(params.slot_index as usize, params.shire_mask);
        exception::clear_abort_request(params.slot_index as usize);

        arch::init_flbs();
        arch::enable_coop_tensor_ops();

        POST_LAUNCH_BARRIER[shire_id].init();
    }

    // Whole-L3 eviction needs all accesses quiesced first, so the
    // participating shires synchronize before thread 0 of each
    // compute shire evicts its chunk. Eviction covers the whole L3
    // only when all 32 compute shires participate.
    if params.flags & launch_flags::EVICT_L3_BEFORE_LAUNCH != 0 {
        pre_launch_synchronize_shires(
            params.slot_index as usize,
            params.shire_mask.count_ones(),
        );
        if thread_id == 0 && shire_id < NUM_COMPUTE_SHIRES {
            arch::evict_l3_syscall();
        }
    }

    // Empty both FCC channels and close the message ports.
    arch::init_fcc(FccChannel::Fcc0);
    arch::init_fcc(FccChannel::Fcc1);
    arch::disable_message_ports();

    if hart_id % 2 == 0 {
        // Thread 0 of the minion quiesces the shared tensor unit.
        arch::quiesce_tensor_unit();
    } else {
        arch::clear_tensor_error();
    }

    arch::reset_fpu_state();

    // All FLB and FCC init must land before the barrier.
    crate::sync::fence();
}

fn process_kernel_completion_status(params: &KernelParams, exit: KernelExit) {
    let hart_id = arch::current_hart_id();
    let shire_id = shire_of(hart_id);
    let thread_id = thread_of(hart_id);
    let slot_index = params.slot_index as usize;
    let info = launch_info(shire_id);

    match exit {
        KernelExit::Normal(value) if info.check_local_bus_error(thread_id) => {
            info.set_execution_status(KERNEL_COMPLETE_STATUS_ERROR);
            info.set_local_exception_mask(thread_id);
            error!(
                "post_cleanup: bus error was detected, kernel return code: {}",
                value
            );
            let buffer = info.get_exception_buffer();
            if buffer != 0 {
                info!("post_cleanup: saving context on bus error");
                save_kernel_error(buffer, hart_id, ContextKind::BusError, 0);
            }
        }
        KernelExit::Normal(value) if value < KERNEL_COMPLETE_STATUS_SUCCESS as i64 => {
            info.set_execution_status(KERNEL_COMPLETE_STATUS_ERROR);
            error!("post_cleanup: kernel completion return code: {}", value);
            let buffer = info.get_exception_buffer();
            if buffer != 0 {
                info!("post_cleanup: saving context on error");
                save_kernel_error(buffer, hart_id, ContextKind::UserKernelError, value);
            }
        }
        KernelExit::Normal(_) => {}
        KernelExit::SystemAbort(_) => {
            info.set_execution_status(KERNEL_COMPLETE_STATUS_ERROR);
            error!("post_cleanup: kernel completion return type: system abort");
            // First aborted hart of the shire flags the shire globally.
            if info.set_local_system_abort_mask(thread_id) == 0 {
                launch_info::set_global_system_abort_mask(slot_index, shire_id);
            }
        }
        KernelExit::UserError(value) => {
            info.set_execution_status(KERNEL_COMPLETE_STATUS_ERROR);
            error!("post_cleanup: kernel completion return type: user error");
            let buffer = info.get_exception_buffer();
            if buffer != 0 {
                save_kernel_error(buffer, hart_id, ContextKind::UserKernelError, value);
            }
        }
        KernelExit::Exception => {
            // The trap handler already captured the context; make sure
            // the shire-level state reflects it even for exit kinds it
            // never saw.
            info.set_execution_status(KERNEL_COMPLETE_STATUS_ERROR);
            info.set_local_exception_mask(thread_id);
            error!("post_cleanup: kernel completion return type: exception");
        }
    }
}

/// Check the hart's tensor-error CSR after the drain; a residue means
/// the kernel left the tensor unit in an error state.
fn check_tensor_errors() {
    let tensor_error = arch::read_tensor_error();
    if tensor_error != 0 {
        let hart_id = arch::current_hart_id();
        let info = launch_info(shire_of(hart_id));
        error!("post kernel launch: tensor error: {}", tensor_error);
        info.set_execution_status(KERNEL_COMPLETE_STATUS_ERROR);
        let buffer = info.get_exception_buffer();
        if buffer != 0 {
            save_kernel_error(buffer, hart_id, ContextKind::TensorError, tensor_error as i64);
        }
        arch::clear_tensor_error();
    }
}

fn kernel_launch_post_cleanup(params: &KernelParams, exit: KernelExit) {
    let hart_id = arch::current_hart_id();
    let shire_id = shire_of(hart_id);
    let thread_id = thread_of(hart_id);
    let thread_count = shire_thread_count(shire_id);
    let thread_mask = shire_thread_mask(shire_id);
    let slot_index = params.slot_index as usize;
    let info = launch_info(shire_id);

    // IPIs may trap again from here on.
    arch::supervisor_interrupts_enable();

    if params.flags & launch_flags::TRACE_ENABLE != 0 {
        super::cpu::current_hart().umode_trace.update_buffer_header();
    }

    process_kernel_completion_status(params, exit);

    // Wait for memory accesses and tensor ops, then check for tensor
    // errors (only meaningful after the drain).
    arch::wait_mem_and_tensor_ops();
    check_tensor_errors();

    // Empty all FCCs before blocking on the FCC barrier.
    arch::init_fcc(FccChannel::Fcc0);
    arch::init_fcc(FccChannel::Fcc1);

    debug!("post_cleanup: entering barrier");

    // All participating threads of the shire must have finished before
    // any cache eviction below.
    POST_LAUNCH_BARRIER[shire_id].wait(thread_count, shire_minion_mask(shire_id));

    if params.flags & launch_flags::FLUSH_L3 != 0 && thread_id == 0 && shire_id < NUM_COMPUTE_SHIRES
    {
        arch::evict_l3_syscall();
    }

    arch::post_kernel_cleanup_syscall(thread_count);

    let prev_completed = info.set_thread_completed(thread_id);
    if prev_completed | (1 << thread_id) == thread_mask {
        // Shire-last-completer. Merge this shire's error state into
        // the slot globals before clearing the pending bit, so the
        // launch-last-completer is guaranteed to read merged globals.
        if info.exception_mask() != 0 {
            launch_info::set_global_exception_mask(slot_index, shire_id);
        }
        let exec_status = info.get_execution_status();
        if exec_status != KERNEL_COMPLETE_STATUS_SUCCESS {
            launch_info::promote_global_execution_status(slot_index, exec_status);
        }

        let prev_shire_mask = launch_info::clear_pending_shire(slot_index, shire_id);

        debug!("post_cleanup: all harts completed: shire {}", shire_id);

        arch::supervisor_interrupts_disable();

        // Last pending shire sends the one completion message.
        if prev_shire_mask & !(1 << shire_id) == 0 {
            let status = launch_info::global_execution_status(slot_index);
            let mut msg = KernelCompleteMessage {
                shire_id: shire_id as u32,
                slot_index: params.slot_index,
                status: status as i8,
                exception_mask: 0,
                system_abort_mask: 0,
            };
            if status != KERNEL_COMPLETE_STATUS_SUCCESS {
                msg.exception_mask = launch_info::global_exception_mask(slot_index);
                msg.system_abort_mask = launch_info::global_system_abort_mask(slot_index);
            }

            debug!("post_cleanup: kernel launch complete: shire {}", shire_id);

            // No retry on a full buffer: the master's timeout is the
            // recovery path.
            let kw_hart = params.kw_base_id as u64 + params.slot_index as u64;
            let cb_idx = CM_MM_KW_HART_UNICAST_BUFF_BASE_IDX + slot_index;
            if let Err(err) = iface::cm_to_mm_unicast_send(kw_hart, cb_idx, &msg.encode()) {
                error!("CM->MM:launch_complete:unicast send failed: {}", err);
            }
        }
    } else {
        // Back to the WFI loop to process subsequent messages.
        arch::supervisor_interrupts_disable();
    }
}
