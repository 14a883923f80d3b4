// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

// rCore buddy system allocator
#[cfg(target_os = "none")]
use buddy_system_allocator::LockedHeap;

// Trace buffers and log formatting are the only allocators' clients;
// 2 MiB leaves generous headroom for all 64 harts of a shire.
const HEAP_SIZE: usize = 2 * 1024 * 1024;

#[cfg(target_os = "none")]
#[repr(align(4096))]
struct HeapRegion([u8; HEAP_SIZE]);

#[cfg(target_os = "none")]
static mut HEAP_REGION: HeapRegion = HeapRegion([0; HEAP_SIZE]);

#[cfg(target_os = "none")]
#[global_allocator]
/// Global heap allocator
static HEAP_ALLOCATOR: LockedHeap<32> = LockedHeap::empty();

/// Initialize heap allocator. Called once, by the boot hart of the
/// shire, before any other hart allocates.
pub fn heap_init() {
    // SAFETY:
    // HEAP_REGION is aligned, unaliased, and only handed to the
    // allocator once.
    #[cfg(target_os = "none")]
    unsafe {
        let base = core::ptr::addr_of_mut!(HEAP_REGION) as usize;
        println!(
            "init buddy system, heap start from {:x} with size {} KB",
            base,
            HEAP_SIZE / 1024
        );
        HEAP_ALLOCATOR.lock().init(base, HEAP_SIZE);
    }
}
