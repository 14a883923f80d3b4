// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! End-to-end kernel launches on the host backend, one OS thread per
//! participating hart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;

use minion_runtime::arch::{
    self, KernelReturn, KERNEL_RETURN_EXCEPTION, KERNEL_RETURN_SUCCESS,
    KERNEL_RETURN_SYSTEM_ABORT,
};
use minion_runtime::board::{
    hart_of, shire_first_worker, shire_thread_count, shire_thread_mask,
    CM_MM_KW_HART_UNICAST_BUFF_BASE_IDX, MASTER_SHIRE, NUM_SHIRES,
};
use minion_runtime::error::ErrorKind;
use minion_runtime::kernel::{
    abort_requested, cm_to_mm_unicast_receive, cpu_map_self, dispatch_message,
    exception_record, exception_record_count, init_exception_buffer, kernel_launched,
    launch_flags, launch_info, launch_kernel, mm_to_cm_broadcast_send, record_bus_error,
    record_exception, umode_trace_header, ContextKind, KernelAbortMessage,
    KernelCompleteMessage, KernelExceptionMessage, KernelLaunchMessage, KernelParams,
    MessageCell,
};

/// The device coordination state is a set of singletons; launches from
/// different tests must not overlap in time.
fn device_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn participating_harts(shire_mask: u64) -> Vec<usize> {
    (0..NUM_SHIRES)
        .filter(|shire| shire_mask & (1 << shire) != 0)
        .flat_map(|shire| {
            let first = shire_first_worker(shire);
            (first..first + shire_thread_count(shire) as usize).map(move |t| hart_of(shire, t))
        })
        .collect()
}

fn spawn_launch(params: KernelParams) -> Vec<thread::JoinHandle<i64>> {
    participating_harts(params.shire_mask)
        .into_iter()
        .map(|hart| {
            thread::Builder::new()
                .stack_size(128 * 1024)
                .spawn(move || {
                    cpu_map_self(hart);
                    launch_kernel(&params)
                })
                .unwrap()
        })
        .collect()
}

fn run_launch(params: KernelParams) {
    for handle in spawn_launch(params) {
        handle.join().unwrap();
    }
}

fn receive_completion(slot_index: u8) -> KernelCompleteMessage {
    let mut cell = MessageCell::empty();
    cm_to_mm_unicast_receive(
        CM_MM_KW_HART_UNICAST_BUFF_BASE_IDX + slot_index as usize,
        &mut cell,
    )
    .unwrap();
    KernelCompleteMessage::decode(&cell).unwrap()
}

fn assert_no_more_completions(slot_index: u8) {
    let mut cell = MessageCell::empty();
    let err = cm_to_mm_unicast_receive(
        CM_MM_KW_HART_UNICAST_BUFF_BASE_IDX + slot_index as usize,
        &mut cell,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Empty);
}

fn assert_all_threads_completed(shire_mask: u64) {
    for shire in 0..NUM_SHIRES {
        if shire_mask & (1 << shire) != 0 {
            assert_eq!(
                launch_info(shire).completed_threads(),
                shire_thread_mask(shire),
                "shire {shire} did not fill its completed mask"
            );
        }
    }
}

fn make_exception_buffer(capacity: u32) -> (Vec<u64>, u64) {
    let mut buf = vec![0u64; (16 + capacity as usize * 48) / 8];
    let addr = buf.as_mut_ptr() as u64;
    unsafe { init_exception_buffer(addr, capacity) };
    (buf, addr)
}

fn params(shire_mask: u64, slot_index: u8) -> KernelParams {
    KernelParams {
        code_start_address: ok_kernel as usize as u64,
        pointer_to_args: 0,
        exception_buffer: 0,
        shire_mask,
        slot_index,
        kw_base_id: 0,
        flags: 0,
    }
}

extern "C" fn ok_kernel(_args: u64) -> KernelReturn {
    KernelReturn {
        value: 0,
        kind: KERNEL_RETURN_SUCCESS,
    }
}

// Master-only launch, kernel returns (0, SUCCESS): exactly one
// completion with zero status and empty masks. Driven through the
// broadcast channel and the dispatch table, like the real firmware.
#[test]
fn master_only_launch_round_trip() {
    let _guard = device_lock();
    const SLOT: u8 = 0;

    let launch = KernelLaunchMessage {
        kw_base_id: 0,
        slot_index: SLOT,
        flags: 0,
        code_start_address: ok_kernel as usize as u64,
        pointer_to_args: 0x55AA,
        exception_buffer: 0,
        shire_mask: 1 << MASTER_SHIRE,
    };
    mm_to_cm_broadcast_send(launch.shire_mask, &launch.encode());

    let threads: Vec<_> = participating_harts(launch.shire_mask)
        .into_iter()
        .map(|hart| {
            thread::Builder::new()
                .stack_size(128 * 1024)
                .spawn(move || {
                    cpu_map_self(hart);
                    let mut cell = MessageCell::empty();
                    minion_runtime::kernel::mm_to_cm_broadcast_receive(&mut cell);
                    dispatch_message(&cell);
                })
                .unwrap()
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let done = receive_completion(SLOT);
    assert_eq!(done.slot_index, SLOT);
    assert_eq!(done.shire_id, MASTER_SHIRE as u32);
    assert_eq!(done.status, 0);
    assert_eq!(done.exception_mask, 0);
    assert_eq!(done.system_abort_mask, 0);
    assert_no_more_completions(SLOT);
    assert_all_threads_completed(launch.shire_mask);
}

// All 32 compute shires, kernel returns (0, SUCCESS): one completion,
// and the per-slot launched flag is observed set.
#[test]
fn all_compute_shires_launch() {
    let _guard = device_lock();
    const SLOT: u8 = 0;

    minion_runtime::kernel::clear_kernel_launched_flag(SLOT as usize);
    run_launch(params(0xFFFF_FFFF, SLOT));

    assert!(kernel_launched(SLOT as usize));
    let done = receive_completion(SLOT);
    assert_eq!(done.status, 0);
    assert_eq!(done.slot_index, SLOT);
    assert_no_more_completions(SLOT);
    assert_all_threads_completed(0xFFFF_FFFF);
}

extern "C" fn bus_error_kernel(_args: u64) -> KernelReturn {
    // Shire 1, hart 7 takes a bus error mid-kernel; the trap handler
    // records the bit and the kernel still exits with SUCCESS.
    if arch::current_hart_id() == hart_of(1, 7) {
        record_bus_error(arch::current_hart_id());
    }
    KernelReturn {
        value: 0,
        kind: KERNEL_RETURN_SUCCESS,
    }
}

#[test]
fn bus_error_is_attributed_to_its_shire() {
    let _guard = device_lock();
    const SLOT: u8 = 1;

    let (_keep, buffer) = make_exception_buffer(8);
    let mut p = params(0x3, SLOT);
    p.code_start_address = bus_error_kernel as usize as u64;
    p.exception_buffer = buffer;
    run_launch(p);

    let done = receive_completion(SLOT);
    assert_eq!(done.status, -1);
    assert_eq!(done.exception_mask, 0x2);
    assert_eq!(done.system_abort_mask, 0);
    assert_no_more_completions(SLOT);

    assert_eq!(exception_record_count(buffer), 1);
    let record = exception_record(buffer, 0).unwrap();
    assert_eq!(record.kind, ContextKind::BusError as u32);
    assert_eq!(record.hart_id, hart_of(1, 7) as u32);
}

extern "C" fn abortable_kernel(args: u64) -> KernelReturn {
    let slot_index = args as usize;
    while !abort_requested(slot_index) {
        std::thread::yield_now();
    }
    KernelReturn {
        value: 0,
        kind: KERNEL_RETURN_SYSTEM_ABORT,
    }
}

// Abort after the pre-launch barrier: every participating hart exits
// with SYSTEM_ABORT, the abort mask names both shires, and exactly one
// error completion is sent.
#[test]
fn abort_reaches_every_participating_shire() {
    let _guard = device_lock();
    const SLOT: u8 = 2;
    const MASK: u64 = 0x5;

    minion_runtime::kernel::clear_kernel_launched_flag(SLOT as usize);
    let mut p = params(MASK, SLOT);
    p.code_start_address = abortable_kernel as usize as u64;
    p.pointer_to_args = SLOT as u64;
    let handles = spawn_launch(p);

    // The master observes the slot running, then broadcasts the abort.
    while !kernel_launched(SLOT as usize) {
        thread::yield_now();
    }
    cpu_map_self(hart_of(MASTER_SHIRE, 0));
    dispatch_message(&KernelAbortMessage { slot_index: SLOT }.encode());

    for handle in handles {
        handle.join().unwrap();
    }

    let done = receive_completion(SLOT);
    assert_eq!(done.status, -1);
    assert_eq!(done.system_abort_mask, MASK);
    assert_eq!(done.exception_mask, 0);
    assert_no_more_completions(SLOT);
}

// L3 evict plus tracing across all compute shires: every compute shire
// evicts its chunk exactly once, the launch completes clean, and every
// participating hart finalized a U-mode trace header.
#[test]
fn evict_l3_gate_and_umode_trace() {
    let _guard = device_lock();
    const SLOT: u8 = 1;
    const MASK: u64 = 0xFFFF_FFFF;

    let before: Vec<u32> = (0..32).map(arch::host::l3_evictions).collect();

    let mut p = params(MASK, SLOT);
    p.flags = launch_flags::EVICT_L3_BEFORE_LAUNCH | launch_flags::TRACE_ENABLE;
    run_launch(p);

    let done = receive_completion(SLOT);
    assert_eq!(done.status, 0);
    assert_no_more_completions(SLOT);

    for shire in 0..32 {
        assert_eq!(
            arch::host::l3_evictions(shire) - before[shire],
            1,
            "shire {shire} L3 eviction count"
        );
    }
    for hart in participating_harts(MASK) {
        let (trace_hart, entries) = umode_trace_header(hart).expect("missing trace header");
        assert_eq!(trace_hart as usize, hart);
        assert_eq!(entries, 0);
    }
}

extern "C" fn user_error_kernel(_args: u64) -> KernelReturn {
    let value = if arch::current_hart_id() == hart_of(5, 40) {
        -1
    } else {
        0
    };
    KernelReturn {
        value,
        kind: KERNEL_RETURN_SUCCESS,
    }
}

// A kernel returning (-1, SUCCESS) on one hart: user-error record in
// the exception buffer, error completion, empty masks.
#[test]
fn negative_return_value_is_a_user_error() {
    let _guard = device_lock();
    const SLOT: u8 = 3;

    let (_keep, buffer) = make_exception_buffer(4);
    let mut p = params(1 << 5, SLOT);
    p.code_start_address = user_error_kernel as usize as u64;
    p.exception_buffer = buffer;
    run_launch(p);

    let done = receive_completion(SLOT);
    assert_eq!(done.status, -1);
    assert_eq!(done.exception_mask, 0);
    assert_eq!(done.system_abort_mask, 0);
    assert_no_more_completions(SLOT);

    assert_eq!(exception_record_count(buffer), 1);
    let record = exception_record(buffer, 0).unwrap();
    assert_eq!(record.kind, ContextKind::UserKernelError as u32);
    assert_eq!(record.hart_id, hart_of(5, 40) as u32);
    assert_eq!(record.payload, -1);
}

extern "C" fn tensor_error_kernel(_args: u64) -> KernelReturn {
    // Leaves a tensor-error residue behind instead of failing the
    // return; the post-launch drain check picks it up.
    if arch::current_hart_id() == hart_of(21, 6) {
        arch::host::inject_tensor_error(arch::current_hart_id(), 0x10);
    }
    KernelReturn {
        value: 0,
        kind: KERNEL_RETURN_SUCCESS,
    }
}

#[test]
fn tensor_error_residue_fails_the_launch() {
    let _guard = device_lock();
    const SLOT: u8 = 1;

    let (_keep, buffer) = make_exception_buffer(4);
    let mut p = params(1 << 21, SLOT);
    p.code_start_address = tensor_error_kernel as usize as u64;
    p.exception_buffer = buffer;
    run_launch(p);

    let done = receive_completion(SLOT);
    assert_eq!(done.status, -1);
    assert_no_more_completions(SLOT);

    assert_eq!(exception_record_count(buffer), 1);
    let record = exception_record(buffer, 0).unwrap();
    assert_eq!(record.kind, ContextKind::TensorError as u32);
    assert_eq!(record.hart_id, hart_of(21, 6) as u32);
    assert_eq!(record.payload, 0x10);
}

static CONCURRENT_FAULT_HART: AtomicU64 = AtomicU64::new(u64::MAX);

extern "C" fn concurrent_kernel(_args: u64) -> KernelReturn {
    if arch::current_hart_id() as u64 == CONCURRENT_FAULT_HART.load(Ordering::SeqCst) {
        record_bus_error(arch::current_hart_id());
    }
    KernelReturn {
        value: 0,
        kind: KERNEL_RETURN_SUCCESS,
    }
}

// Two slots in flight at once on disjoint shires: independent
// completions, non-interfering masks.
#[test]
fn concurrent_slots_do_not_interfere() {
    let _guard = device_lock();

    CONCURRENT_FAULT_HART.store(hart_of(10, 3) as u64, Ordering::SeqCst);

    let mut clean = params(0x3 << 8, 0); // shires 8, 9
    clean.code_start_address = concurrent_kernel as usize as u64;
    let mut faulty = params(0x3 << 10, 1); // shires 10, 11
    faulty.code_start_address = concurrent_kernel as usize as u64;

    let mut handles = spawn_launch(clean);
    handles.extend(spawn_launch(faulty));
    for handle in handles {
        handle.join().unwrap();
    }

    let clean_done = receive_completion(0);
    assert_eq!(clean_done.status, 0);
    assert_eq!(clean_done.exception_mask, 0);
    assert_no_more_completions(0);

    let faulty_done = receive_completion(1);
    assert_eq!(faulty_done.status, -1);
    assert_eq!(faulty_done.exception_mask, 1 << 10);
    assert_no_more_completions(1);
}

static FAULT_SHIRES: AtomicU64 = AtomicU64::new(0);

extern "C" fn randomized_kernel(_args: u64) -> KernelReturn {
    let hart = arch::current_hart_id();
    let shire = hart / 64;
    if FAULT_SHIRES.load(Ordering::SeqCst) & (1 << shire) != 0 && hart % 64 == 13 {
        record_exception(hart, 0x2, 0x8000_0000, 0, 0x8000_0000_0000_0000);
        return KernelReturn {
            value: 0,
            kind: KERNEL_RETURN_EXCEPTION,
        };
    }
    KernelReturn {
        value: 0,
        kind: KERNEL_RETURN_SUCCESS,
    }
}

fn lcg(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state >> 16
}

// Random participation with randomly injected traps: exactly one
// completion per launch, the exception mask equals the set of faulted
// shires, and the status is an error iff any shire faulted.
#[test]
fn randomized_faults_map_to_exception_mask() {
    let _guard = device_lock();
    const SLOT: u8 = 2;
    let mut seed = 0x5EED_0001u64;

    for _ in 0..3 {
        // Up to six shires out of 12..18.
        let mut shire_mask = 0u64;
        while shire_mask == 0 {
            shire_mask = (lcg(&mut seed) & 0x3F) << 12;
        }
        let fault_shires = lcg(&mut seed) & shire_mask;
        FAULT_SHIRES.store(fault_shires, Ordering::SeqCst);

        let mut p = params(shire_mask, SLOT);
        p.code_start_address = randomized_kernel as usize as u64;
        run_launch(p);

        let done = receive_completion(SLOT);
        assert_no_more_completions(SLOT);
        assert_eq!(done.exception_mask, fault_shires);
        if fault_shires == 0 {
            assert_eq!(done.status, 0);
        } else {
            assert_eq!(done.status, -1);
        }
        assert_all_threads_completed(shire_mask);

        // The trap handler reported each fault on the dispatcher
        // channel; drain and cross-check before the next round.
        let mut reported = 0u64;
        let mut cell = MessageCell::empty();
        while cm_to_mm_unicast_receive(0, &mut cell).is_ok() {
            let exc = KernelExceptionMessage::decode(&cell).unwrap();
            assert_eq!(exc.mcause, 0x2);
            reported |= 1 << (exc.hart_id / 64);
        }
        assert_eq!(reported, fault_shires);
    }
}

// Repeated launches on one slot: the barrier and the launch state are
// reusable without re-initialization.
#[test]
fn barrier_and_state_are_reusable_across_launches() {
    let _guard = device_lock();
    const SLOT: u8 = 0;

    for round in 0..3 {
        let mut p = params(1 << 20, SLOT);
        p.pointer_to_args = round;
        run_launch(p);
        let done = receive_completion(SLOT);
        assert_eq!(done.status, 0);
        assert_no_more_completions(SLOT);
    }
}
