// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Hart identity. The boot path parks each hart's id in `tp`; S-mode
//! code never repurposes that register.

use core::arch::asm;

pub fn set_current_hart(hart_id: usize) {
    // SAFETY: tp is reserved for the hart id by the firmware ABI.
    unsafe {
        asm!("mv tp, {0}", in(reg) hart_id);
    }
}

pub fn current_hart_id() -> usize {
    let hart_id: usize;
    // SAFETY: tp carries the hart id set at boot.
    unsafe {
        asm!("mv {0}, tp", out(reg) hart_id);
    }
    hart_id
}

pub fn wfi() {
    // SAFETY: wait for interrupt
    unsafe { riscv::asm::wfi() };
}

pub fn fence_i() {
    // SAFETY: orders instruction fetch after preceding stores.
    unsafe { riscv::asm::fence_i() };
}
