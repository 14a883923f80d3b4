// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

pub fn supervisor_interrupts_enable() {
    // SAFETY: re-enables S-mode interrupt delivery; the trap vector is
    // installed at boot, before any hart reaches the dispatch loop.
    unsafe { riscv::register::sstatus::set_sie() };
}

pub fn supervisor_interrupts_disable() {
    // SAFETY: masking only; pending interrupts stay pending.
    unsafe { riscv::register::sstatus::clear_sie() };
}
