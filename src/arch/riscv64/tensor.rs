// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Tensor-unit, FCC-channel and message-port CSR plumbing.

use core::arch::asm;

use super::FccChannel;

// Custom CSR block of the SoC.
const CSR_PORTCTRL0: u16 = 0x860;
const CSR_PORTCTRL1: u16 = 0x861;
const CSR_PORTCTRL2: u16 = 0x862;
const CSR_PORTCTRL3: u16 = 0x863;
const CSR_TENSOR_LOAD: u16 = 0x86C;
const CSR_TENSOR_FMA: u16 = 0x86D;
const CSR_TENSOR_WAIT: u16 = 0x86E;
const CSR_TENSOR_MASK: u16 = 0x86F;
const CSR_TENSOR_ERROR: u16 = 0x870;
const CSR_TENSOR_COOP: u16 = 0x871;
const CSR_FCC0: u16 = 0x872;
const CSR_FCC1: u16 = 0x873;
const CSR_VPU_LANE_MASK: u16 = 0x874;

// tensor_wait queue selectors
const WAIT_TENSOR_LOAD_0: u8 = 0;
const WAIT_TENSOR_LOAD_1: u8 = 1;
const WAIT_TENSOR_LOAD_L2_0: u8 = 2;
const WAIT_TENSOR_LOAD_L2_1: u8 = 3;
const WAIT_PREFETCH_0: u8 = 4;
const WAIT_PREFETCH_1: u8 = 5;
const WAIT_CACHEOPS: u8 = 6;
const WAIT_TENSOR_FMA: u8 = 7;
const WAIT_TENSOR_STORE: u8 = 8;
const WAIT_TENSOR_REDUCE: u8 = 9;
const WAIT_TENSOR_QUANT: u8 = 10;

#[repr(C, align(64))]
struct TensorZeros([u8; 64]);

static TENSOR_ZEROS: TensorZeros = TensorZeros([0; 64]);

macro_rules! csr_write {
    ($csr:expr, $value:expr) => {
        // SAFETY: writes a hart-local custom CSR.
        unsafe {
            asm!("csrw {csr}, {v}", csr = const $csr, v = in(reg) $value);
        }
    };
}

macro_rules! csr_read {
    ($csr:expr) => {{
        let value: u64;
        // SAFETY: reads a hart-local custom CSR.
        unsafe {
            asm!("csrr {v}, {csr}", csr = const $csr, v = out(reg) value);
        }
        value
    }};
}

fn tensor_wait(queue: u8) {
    csr_write!(CSR_TENSOR_WAIT, queue as u64);
}

/// Drain and re-arm one FCC channel by reading its credits dry.
pub fn init_fcc(channel: FccChannel) {
    match channel {
        FccChannel::Fcc0 => {
            let _ = csr_read!(CSR_FCC0);
            csr_write!(CSR_FCC0, 0u64);
        }
        FccChannel::Fcc1 => {
            let _ = csr_read!(CSR_FCC1);
            csr_write!(CSR_FCC1, 0u64);
        }
    }
}

/// Shire ESR window of the calling hart's shire.
const ESR_SHIRE_BASE: usize = 0x20_0000_0000;
const ESR_SHIRE_COOP_MODE: usize = 0x40;
const ESR_SHIRE_FLB_BASE: usize = 0x80;

/// Re-arm every fast local barrier of the calling hart's shire.
pub fn init_flbs() {
    for barrier in 0..crate::board::FLB_COUNT {
        // SAFETY: per-shire FLB ESRs, written only by the designated
        // initializer before the pre-launch barrier.
        unsafe {
            core::ptr::write_volatile(
                (ESR_SHIRE_BASE + ESR_SHIRE_FLB_BASE + barrier * 8) as *mut u64,
                0,
            );
        }
    }
}

/// Allow cooperative tensor loads/stores within the shire.
pub fn enable_coop_tensor_ops() {
    // SAFETY: per-shire coop-mode ESR, same write from every shire's
    // initializer.
    unsafe {
        core::ptr::write_volatile((ESR_SHIRE_BASE + ESR_SHIRE_COOP_MODE) as *mut u64, 1);
    }
}

/// Writing a size below the architectural minimum disables the port.
pub fn disable_message_ports() {
    csr_write!(CSR_PORTCTRL0, 0u64);
    csr_write!(CSR_PORTCTRL1, 0u64);
    csr_write!(CSR_PORTCTRL2, 0u64);
    csr_write!(CSR_PORTCTRL3, 0u64);
}

pub fn clear_tensor_error() {
    csr_write!(CSR_TENSOR_ERROR, 0u64);
}

pub fn read_tensor_error() -> u64 {
    csr_read!(CSR_TENSOR_ERROR)
}

/// Consume a stray TensorLoadSetupB and zero the TenC accumulator.
///
/// The dummy FMA pairs with an unpaired TensorLoadSetupB if one is
/// pending; in the common case it just raises a tensor error, which is
/// cleared along with the rest of the extension CSRs. TenC is then
/// zeroed by loading the 64-byte zero constant into L1SP lines 0..47
/// and issuing a 16x16 FMA over it.
pub fn quiesce_tensor_unit() {
    // B in memory, TensorType = IMA8A32
    csr_write!(CSR_TENSOR_FMA, 0x0000_0000_0010_0006u64);
    tensor_wait(WAIT_TENSOR_FMA);

    csr_write!(CSR_TENSOR_MASK, 0u64);
    csr_write!(CSR_TENSOR_ERROR, 0u64);
    csr_write!(CSR_TENSOR_COOP, 0u64);

    let zeros = TENSOR_ZEROS.0.as_ptr() as u64;
    // 16 lines each to L1SP lines 0-15, 16-31, 32-47; 0-byte stride, id 0.
    csr_write!(CSR_TENSOR_LOAD, zeros | 0x0000_0000_0000_000Fu64);
    tensor_wait(WAIT_TENSOR_LOAD_0);
    csr_write!(CSR_TENSOR_LOAD, zeros | 0x0200_0000_0000_000Fu64);
    tensor_wait(WAIT_TENSOR_LOAD_0);
    csr_write!(CSR_TENSOR_LOAD, zeros | 0x0400_0000_0000_000Fu64);
    tensor_wait(WAIT_TENSOR_LOAD_0);
    // 16x16 TenC = 16x64 A (L1SP 0-15) * 64x16 B (L1SP 16-31)
    csr_write!(CSR_TENSOR_FMA, 0x01FF_8000_0061_0007u64);
    tensor_wait(WAIT_TENSOR_FMA);

    // Cache evicts issued above must land before the caller proceeds.
    tensor_wait(WAIT_CACHEOPS);
}

/// Eight FPU lanes on, flags clear, round-to-nearest-even.
pub fn reset_fpu_state() {
    csr_write!(CSR_VPU_LANE_MASK, 0xFFu64);
    // SAFETY: fcsr is hart-local; zero is flags-clear + RNE.
    unsafe {
        asm!("csrw fcsr, zero");
    }
}

/// Drain every outstanding memory and tensor queue.
pub fn wait_mem_and_tensor_ops() {
    crate::sync::fence();
    tensor_wait(WAIT_TENSOR_LOAD_0);
    tensor_wait(WAIT_TENSOR_LOAD_1);
    tensor_wait(WAIT_TENSOR_LOAD_L2_0);
    tensor_wait(WAIT_TENSOR_LOAD_L2_1);
    tensor_wait(WAIT_PREFETCH_0);
    tensor_wait(WAIT_PREFETCH_1);
    tensor_wait(WAIT_CACHEOPS);
    tensor_wait(WAIT_TENSOR_FMA);
    tensor_wait(WAIT_TENSOR_STORE);
    tensor_wait(WAIT_TENSOR_REDUCE);
    tensor_wait(WAIT_TENSOR_QUANT);
}

/// Post a doorbell credit to a master-shire hart's FCC0 after a
/// unicast send.
pub fn notify_master_hart(ms_thread_id: u64) {
    csr_write!(CSR_FCC0, ms_thread_id);
}
