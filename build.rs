// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

use std::env::var;
use std::process::Command;

// S-mode firmware load address on the device
const TEXT_START: u64 = 0x8000_0000_u64;

fn main() {
    let arch = var("CARGO_CFG_TARGET_ARCH").unwrap();

    if arch == "riscv64" {
        println!("cargo:rustc-link-arg=-Tlinkers/{arch}.ld");
        println!("cargo:rustc-link-arg=--defsym=TEXT_START={TEXT_START}");
    }

    let commit_hash = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=GIT_COMMIT={commit_hash}");

    let build_time = chrono::offset::Local::now().format("%Y-%m-%d %H:%M:%S %Z");
    println!("cargo:rustc-env=BUILD_TIME={build_time}");
    let hostname = gethostname::gethostname();
    println!(
        "cargo:rustc-env=HOSTNAME={}",
        hostname.into_string().unwrap_or_else(|_| "unknown".to_string())
    );
    built::write_built_file().expect("Failed to acquire build-time information");
}
