// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Fixed addresses and sizes shared between the master and compute
//! firmware builds. Offsets inside the master-shire L2 scratchpad
//! window must stay stable across both builds; the `kernel::iface`
//! module pins them with static asserts.

use super::{MAX_SIMULTANEOUS_KERNELS, NUM_COMPUTE_SHIRES, HARTS_PER_SHIRE, MASTER_SHIRE_COMPUTE_HARTS};

pub const SIZE_64B: usize = 64;
pub const SIZE_4KB: usize = 4096;

/// One circular buffer per unicast channel: slot 0 is the dispatcher's,
/// the rest belong to the kernel workers.
pub const CM_MM_IFACE_CIRCBUFFER_SIZE: usize = SIZE_4KB;
pub const CM_MM_IFACE_UNICAST_BUFFER_COUNT: usize = 1 + MAX_SIMULTANEOUS_KERNELS;

/// First kernel-worker unicast buffer index; buffer 0 is the dispatcher.
pub const CM_MM_KW_HART_UNICAST_BUFF_BASE_IDX: usize = 1;

pub const CM_MM_IFACE_UNICAST_CIRCBUFFERS_BASE_OFFSET: usize = 0;
pub const CM_MM_IFACE_UNICAST_LOCKS_BASE_OFFSET: usize =
    CM_MM_IFACE_UNICAST_BUFFER_COUNT * CM_MM_IFACE_CIRCBUFFER_SIZE;
pub const CM_KERNEL_LAUNCHED_FLAG_BASE_OFFSET: usize =
    CM_MM_IFACE_UNICAST_LOCKS_BASE_OFFSET + CM_MM_IFACE_UNICAST_BUFFER_COUNT * SIZE_64B;

/// Harts that can ever run a kernel (all compute shires plus the upper
/// half of the master shire).
pub const CM_HART_COUNT: usize =
    NUM_COMPUTE_SHIRES * HARTS_PER_SHIRE + MASTER_SHIRE_COMPUTE_HARTS;

/// U-mode stacks grow down from here, one per hart. The extra 64 bytes
/// stagger successive stacks across memory controllers.
pub const KERNEL_UMODE_STACK_BASE: u64 = 0x80_0580_0000;
pub const KERNEL_UMODE_STACK_SIZE: u64 = (SIZE_4KB + SIZE_64B) as u64;
pub const KERNEL_UMODE_STACK_END: u64 =
    KERNEL_UMODE_STACK_BASE - KERNEL_UMODE_STACK_SIZE * CM_HART_COUNT as u64;

#[inline(always)]
pub const fn kernel_umode_stack(hart_id: usize) -> u64 {
    KERNEL_UMODE_STACK_BASE - hart_id as u64 * KERNEL_UMODE_STACK_SIZE
}

/// Device UART (console output, riscv64 builds only).
pub const UART0_BASE: usize = 0x0010_0000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn umode_stacks_do_not_overlap() {
        let a = kernel_umode_stack(0);
        let b = kernel_umode_stack(1);
        assert_eq!(a - b, KERNEL_UMODE_STACK_SIZE);
        assert!(kernel_umode_stack(CM_HART_COUNT - 1) > KERNEL_UMODE_STACK_END);
    }

    #[test]
    fn scratchpad_offsets_match_the_interface_contract() {
        assert_eq!(CM_MM_IFACE_UNICAST_CIRCBUFFERS_BASE_OFFSET, 0);
        assert_eq!(CM_MM_IFACE_UNICAST_LOCKS_BASE_OFFSET, 20 * 1024);
        assert_eq!(CM_KERNEL_LAUNCHED_FLAG_BASE_OFFSET, 20 * 1024 + 320);
    }
}
