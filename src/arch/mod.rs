// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Architecture backends.
//!
//! The `riscv64` backend drives the real device (CSRs, the `sret`
//! trampoline, the M-mode syscall gate). Every other target gets the
//! `host` backend, a software model of the same surface used by the
//! test suites, in the role the original SoC's system emulator plays
//! for silicon firmware.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "riscv64")] {
        pub use self::riscv64::*;
        mod riscv64;
    } else {
        pub use self::host::*;
        pub mod host;
    }
}

/// U-mode return ABI: a kernel ends by handing `(value, kind)` to the
/// kernel-return primitive, or the trap handler synthesizes the pair
/// when the kernel ends by trap.
pub const KERNEL_RETURN_SUCCESS: u64 = 0;
pub const KERNEL_RETURN_SYSTEM_ABORT: u64 = 1;
pub const KERNEL_RETURN_USER_ERROR: u64 = 2;
pub const KERNEL_RETURN_EXCEPTION: u64 = 3;

/// Value/kind pair as it comes back in the two return registers.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KernelReturn {
    pub value: i64,
    pub kind: u64,
}

/// The two per-hart fast-condition-code channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FccChannel {
    Fcc0,
    Fcc1,
}
