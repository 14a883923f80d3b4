// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Error capture shared by the orchestrator and the trap handler.
//!
//! The host may hand a launch an exception buffer; writers append
//! `ExecutionContext` records to it with an atomic index, so records
//! from concurrent harts never tear. The trap handler (an external
//! collaborator) reports through the entry points at the bottom; a
//! host-side test kernel reports the same way, which is what makes
//! the fault paths drivable off-device.

use crate::board::{shire_of, thread_of, MAX_SIMULTANEOUS_KERNELS};
use crate::kernel::iface::cm_to_mm_unicast_send;
use crate::kernel::launch_info::{
    launch_info, set_global_exception_mask, KERNEL_COMPLETE_STATUS_ERROR,
};
use crate::kernel::message::KernelExceptionMessage;
use crate::sync::GlobalAtomicU32;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    TensorError = 0,
    BusError = 1,
    UserKernelError = 2,
    SmodeException = 3,
}

/// One record of the exception buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    pub kind: u32,
    pub hart_id: u32,
    /// Kind-specific: tensor-error CSR value, raw bus address, or the
    /// kernel's signed return value.
    pub payload: i64,
    /// mcause, mepc, mtval, mstatus for `SmodeException`; zero
    /// otherwise.
    pub regs: [u64; 4],
}

/// Buffer head: capacity is set by the host, the running count by the
/// writers. A count beyond capacity means that many records were
/// dropped.
#[repr(C)]
struct ExceptionBufferHeader {
    capacity: u32,
    count: GlobalAtomicU32,
    _pad: u64,
}

const HEADER_SIZE: usize = core::mem::size_of::<ExceptionBufferHeader>();
const RECORD_SIZE: usize = core::mem::size_of::<ExecutionContext>();

const _: () = assert!(HEADER_SIZE == 16);
const _: () = assert!(RECORD_SIZE == 48);

/// Host/master side: arm an exception buffer of `capacity` records at
/// `buffer`.
///
/// # Safety
///
/// `buffer` must address at least `HEADER_SIZE + capacity * RECORD_SIZE`
/// writable bytes, 8-byte aligned, not otherwise in use.
pub unsafe fn init_exception_buffer(buffer: u64, capacity: u32) {
    let header = &mut *(buffer as *mut ExceptionBufferHeader);
    header.capacity = capacity;
    header.count = GlobalAtomicU32::new(0);
    header._pad = 0;
}

/// Append one record. Total (never fails); past-capacity appends are
/// counted but not stored.
fn append(buffer: u64, record: &ExecutionContext) {
    // SAFETY: a non-zero buffer address was armed by
    // `init_exception_buffer` per the launch contract.
    let header = unsafe { &*(buffer as *const ExceptionBufferHeader) };
    let index = header.count.fetch_add(1);
    if index >= header.capacity {
        warn!("exception buffer full, dropping record (kind {})", record.kind);
        return;
    }
    let slot = buffer as usize + HEADER_SIZE + index as usize * RECORD_SIZE;
    // SAFETY: the fetch_add reserved this slot for this writer alone.
    unsafe {
        *(slot as *mut ExecutionContext) = *record;
    }
}

/// Record a kind-plus-payload error context (tensor error, bus error,
/// user kernel error).
pub fn save_kernel_error(buffer: u64, hart_id: usize, kind: ContextKind, payload: i64) {
    append(
        buffer,
        &ExecutionContext {
            kind: kind as u32,
            hart_id: hart_id as u32,
            payload,
            regs: [0; 4],
        },
    );
}

/// Number of records appended so far (may exceed what fits).
pub fn exception_record_count(buffer: u64) -> u32 {
    // SAFETY: see `append`.
    let header = unsafe { &*(buffer as *const ExceptionBufferHeader) };
    header.count.load()
}

/// Read back a stored record; `None` past the stored range.
pub fn exception_record(buffer: u64, index: u32) -> Option<ExecutionContext> {
    // SAFETY: see `append`.
    let header = unsafe { &*(buffer as *const ExceptionBufferHeader) };
    if index >= header.count.load().min(header.capacity) {
        return None;
    }
    let slot = buffer as usize + HEADER_SIZE + index as usize * RECORD_SIZE;
    // SAFETY: the slot was fully written before count covered it.
    Some(unsafe { *(slot as *const ExecutionContext) })
}

static ABORT_PENDING: [GlobalAtomicU32; MAX_SIMULTANEOUS_KERNELS] =
    [const { GlobalAtomicU32::new(0) }; MAX_SIMULTANEOUS_KERNELS];

/// Mark a slot aborted. The master's IPI fans the abort out to the
/// participating harts; their U-mode code traps and resumes in the
/// orchestrator with a system-abort exit.
pub fn request_abort(slot_index: usize) {
    ABORT_PENDING[slot_index].store(1);
}

pub fn abort_requested(slot_index: usize) -> bool {
    ABORT_PENDING[slot_index].load() != 0
}

/// Re-armed by the designated per-shire initializer of the next launch
/// on the slot.
pub(crate) fn clear_abort_request(slot_index: usize) {
    ABORT_PENDING[slot_index].store(0);
}

/// Trap-handler entry: a U-mode load/store took a bus error. The
/// kernel still exits with a success return type; the orchestrator
/// picks the bit up during classification.
pub fn record_bus_error(hart_id: usize) {
    launch_info(shire_of(hart_id)).set_local_bus_error_mask(thread_of(hart_id));
}

/// Trap-handler entry: a CPU exception ended the kernel on `hart_id`.
/// Saves the full context, merges the error into the shire and slot
/// state, and reports on the dispatcher's unicast channel.
pub fn record_exception(hart_id: usize, mcause: u64, mepc: u64, mtval: u64, mstatus: u64) {
    let shire_id = shire_of(hart_id);
    let info = launch_info(shire_id);

    let buffer = info.get_exception_buffer();
    if buffer != 0 {
        append(
            buffer,
            &ExecutionContext {
                kind: ContextKind::SmodeException as u32,
                hart_id: hart_id as u32,
                payload: 0,
                regs: [mcause, mepc, mtval, mstatus],
            },
        );
    }

    info.set_local_exception_mask(thread_of(hart_id));
    info.set_execution_status(KERNEL_COMPLETE_STATUS_ERROR);
    let (_, slot_index) = info.get_attributes();
    set_global_exception_mask(slot_index as usize, shire_id);

    let msg = KernelExceptionMessage {
        hart_id: hart_id as u64,
        mcause,
        mepc,
        mtval,
        mstatus,
    }
    .encode();
    if let Err(err) = cm_to_mm_unicast_send(0, 0, &msg) {
        error!("CM->MM:exception report send failed: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with_capacity(capacity: u32) -> (Vec<u64>, u64) {
        let mut buf = vec![0u64; (HEADER_SIZE + capacity as usize * RECORD_SIZE) / 8];
        let addr = buf.as_mut_ptr() as u64;
        unsafe { init_exception_buffer(addr, capacity) };
        (buf, addr)
    }

    #[test]
    fn records_append_in_reserved_slots() {
        let (_keep, buffer) = buffer_with_capacity(4);
        save_kernel_error(buffer, 71, ContextKind::UserKernelError, -5);
        save_kernel_error(buffer, 72, ContextKind::BusError, 0);

        assert_eq!(exception_record_count(buffer), 2);
        let first = exception_record(buffer, 0).unwrap();
        assert_eq!(first.kind, ContextKind::UserKernelError as u32);
        assert_eq!(first.hart_id, 71);
        assert_eq!(first.payload, -5);
        assert!(exception_record(buffer, 2).is_none());
    }

    #[test]
    fn appends_beyond_capacity_are_counted_not_stored() {
        let (_keep, buffer) = buffer_with_capacity(1);
        save_kernel_error(buffer, 1, ContextKind::TensorError, 9);
        save_kernel_error(buffer, 2, ContextKind::TensorError, 10);
        assert_eq!(exception_record_count(buffer), 2);
        assert!(exception_record(buffer, 1).is_none());
        assert_eq!(exception_record(buffer, 0).unwrap().payload, 9);
    }

    #[test]
    fn abort_flags_are_per_slot() {
        request_abort(1);
        assert!(abort_requested(1));
        assert!(!abort_requested(0));
        clear_abort_request(1);
        assert!(!abort_requested(1));
    }
}
