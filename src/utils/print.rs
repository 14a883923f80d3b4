// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

use core::fmt::{Arguments, Write};
use spin::Mutex;

pub struct Writer;

static WRITER: Mutex<Writer> = Mutex::new(Writer);

impl Write for Writer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        #[cfg(target_arch = "riscv64")]
        for b in s.bytes() {
            // SAFETY: UART0 data register, write-only byte port.
            unsafe {
                core::ptr::write_volatile(crate::board::UART0_BASE as *mut u8, b);
            }
        }
        #[cfg(not(target_arch = "riscv64"))]
        std::eprint!("{}", s);
        Ok(())
    }
}

/// Print a format string to the console.
pub fn _print(args: Arguments) {
    let mut lock = WRITER.lock();
    let _ = lock.write_fmt(args);
}
