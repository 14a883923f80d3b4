// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

#![cfg_attr(target_os = "none", no_std)]

extern crate alloc;
#[macro_use]
extern crate log;

#[macro_use]
mod macros;

pub mod arch;
pub mod board;
pub mod error;
pub mod kernel;
#[allow(dead_code)]
mod mm;
#[cfg(target_os = "none")]
mod panic;
pub mod sync;
pub mod utils;

#[allow(dead_code)]
mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[cfg(target_os = "none")]
fn print_built_info() {
    println!(
        "Welcome to {} {}!",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    println!(
        "Built at {build_time} by {hostname}\nCompiler: {rustc_version}\nCommit: {commit_hash}",
        build_time = env!("BUILD_TIME"),
        hostname = env!("HOSTNAME"),
        commit_hash = env!("GIT_COMMIT"),
        rustc_version = built_info::RUSTC_VERSION,
    );
}

/// Firmware entry, once per hart. The boot hart brings up the heap and
/// the logger before anyone allocates or logs.
#[cfg(target_os = "none")]
#[no_mangle]
pub extern "C" fn init(hart_id: usize) -> ! {
    if hart_id == 0 {
        print_built_info();
        mm::heap_init();
        kernel::logger_init().unwrap();
        info!("{} boot hart up", env!("CARGO_PKG_NAME"));
    }

    kernel::hart_main(hart_id)
}
