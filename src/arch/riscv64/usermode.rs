// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! The S-mode to U-mode trampoline.
//!
//! One entry point, one resume label. The firmware context is saved on
//! the S-mode stack and the stack pointer is parked in the per-hart
//! scratch slot (`sscratch + 8`); the kernel-return syscall and the
//! trap handler both restore `sp` from that slot and land on the `1:`
//! label with `(value, kind)` in `a0`/`a1`. Every integer and FP
//! register is wiped before `sret` so no S-mode state leaks into
//! U-mode.

use core::arch::{asm, global_asm};

use super::KernelReturn;

global_asm!(
    r#"
.section .text
.global __minion_enter_user_mode
.type __minion_enter_user_mode, @function
// a0 = entry pc, a1 = pointer_to_args, a2 = kernel stack base,
// a3 = firmware sp save slot (sscratch + 8)
__minion_enter_user_mode:
    addi  sp, sp, -(32 * 8)
    sd    ra, 0 * 8(sp)            // caller return address
    la    ra, 1f
    sd    ra, 1 * 8(sp)            // resume point for the return path
    sd    x3,  3  * 8(sp)
    sd    x4,  4  * 8(sp)
    sd    x5,  5  * 8(sp)
    sd    x6,  6  * 8(sp)
    sd    x7,  7  * 8(sp)
    sd    x8,  8  * 8(sp)
    sd    x9,  9  * 8(sp)
    sd    x10, 10 * 8(sp)
    sd    x11, 11 * 8(sp)
    sd    x12, 12 * 8(sp)
    sd    x13, 13 * 8(sp)
    sd    x14, 14 * 8(sp)
    sd    x15, 15 * 8(sp)
    sd    x16, 16 * 8(sp)
    sd    x17, 17 * 8(sp)
    sd    x18, 18 * 8(sp)
    sd    x19, 19 * 8(sp)
    sd    x20, 20 * 8(sp)
    sd    x21, 21 * 8(sp)
    sd    x22, 22 * 8(sp)
    sd    x23, 23 * 8(sp)
    sd    x24, 24 * 8(sp)
    sd    x25, 25 * 8(sp)
    sd    x26, 26 * 8(sp)
    sd    x27, 27 * 8(sp)
    sd    x28, 28 * 8(sp)
    sd    x29, 29 * 8(sp)
    sd    x30, 30 * 8(sp)
    sd    x31, 31 * 8(sp)
    sd    sp, 0(a3)                // park firmware sp in the scratch slot
    csrw  sepc, a0                 // kernel entry pc
    mv    a0, a1                   // a0 = pointer_to_args
    mv    ra, zero                 // a kernel that plain-rets faults at 0
    mv    s0, a2                   // switch to the kernel stack
    addi  sp, s0, -32
    sd    ra, 24(sp)
    sd    s0, 16(sp)
    li    t0, 0x100
    csrc  sstatus, t0              // SPP = user
    csrsi sstatus, 0x10            // UPIE: interrupts on in U-mode
    mv    x3, zero                 // kernel sets its own gp if it uses one
    mv    x4, zero
    mv    x5, zero
    mv    x6, zero
    mv    x7, zero
    mv    x8, zero
    mv    x9, zero
    mv    x11, zero
    mv    x12, zero
    mv    x13, zero
    mv    x14, zero
    mv    x15, zero
    mv    x16, zero
    mv    x17, zero
    mv    x18, zero
    mv    x19, zero
    mv    x20, zero
    mv    x21, zero
    mv    x22, zero
    mv    x23, zero
    mv    x24, zero
    mv    x25, zero
    mv    x26, zero
    mv    x27, zero
    mv    x28, zero
    mv    x29, zero
    mv    x30, zero
    mv    x31, zero
    fcvt.s.w f0,  x0
    fcvt.s.w f1,  x0
    fcvt.s.w f2,  x0
    fcvt.s.w f3,  x0
    fcvt.s.w f4,  x0
    fcvt.s.w f5,  x0
    fcvt.s.w f6,  x0
    fcvt.s.w f7,  x0
    fcvt.s.w f8,  x0
    fcvt.s.w f9,  x0
    fcvt.s.w f10, x0
    fcvt.s.w f11, x0
    fcvt.s.w f12, x0
    fcvt.s.w f13, x0
    fcvt.s.w f14, x0
    fcvt.s.w f15, x0
    fcvt.s.w f16, x0
    fcvt.s.w f17, x0
    fcvt.s.w f18, x0
    fcvt.s.w f19, x0
    fcvt.s.w f20, x0
    fcvt.s.w f21, x0
    fcvt.s.w f22, x0
    fcvt.s.w f23, x0
    fcvt.s.w f24, x0
    fcvt.s.w f25, x0
    fcvt.s.w f26, x0
    fcvt.s.w f27, x0
    fcvt.s.w f28, x0
    fcvt.s.w f29, x0
    fcvt.s.w f30, x0
    fcvt.s.w f31, x0
    sret
1:
    // Return path lands here: sp is the firmware stack, a0/a1 carry
    // (value, kind). Only the callee-saved context needs restoring.
    ld    x3,  3  * 8(sp)
    ld    x4,  4  * 8(sp)
    ld    x8,  8  * 8(sp)
    ld    x9,  9  * 8(sp)
    ld    x18, 18 * 8(sp)
    ld    x19, 19 * 8(sp)
    ld    x20, 20 * 8(sp)
    ld    x21, 21 * 8(sp)
    ld    x22, 22 * 8(sp)
    ld    x23, 23 * 8(sp)
    ld    x24, 24 * 8(sp)
    ld    x25, 25 * 8(sp)
    ld    x26, 26 * 8(sp)
    ld    x27, 27 * 8(sp)
    ld    ra, 0 * 8(sp)
    addi  sp, sp, 32 * 8
    ret
"#
);

extern "C" {
    fn __minion_enter_user_mode(
        entry_pc: u64,
        arg0: u64,
        stack_base: u64,
        fw_sp_slot: *mut u64,
    ) -> KernelReturn;
}

/// Run the user kernel at `entry_pc` with `arg0` in its first argument
/// register and its stack at `stack_base`. Returns the `(value, kind)`
/// pair delivered by the kernel-return primitive or the trap handler.
///
/// # Safety
///
/// `entry_pc` must be a mapped U-mode text address and `stack_base`
/// this hart's U-mode stack; `sscratch` must point at the hart's
/// scratch region.
pub unsafe fn enter_user_mode(entry_pc: u64, arg0: u64, stack_base: u64) -> (i64, u64) {
    let scratch: u64;
    asm!("csrr {0}, sscratch", out(reg) scratch);
    let fw_sp_slot = (scratch + 8) as *mut u64;
    let ret = __minion_enter_user_mode(entry_pc, arg0, stack_base, fw_sp_slot);
    (ret.value, ret.kind)
}
