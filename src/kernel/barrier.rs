// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! The two-level pre-launch barrier.
//!
//! Every participating hart arrives at its shire's counter; the
//! shire-last hart arrives at the slot's global counter; the
//! launch-last hart (last shire-last) clears the global counter; each
//! shire-last then clears its local counter, releasing its shire.
//! There is deliberately no timeout: a hart that never arrives
//! deadlocks the launch, and recovery is a device reset. Fault paths
//! still arrive here via the trap handler.

use crate::arch;
use crate::board::{shire_of, shire_thread_count, MAX_SIMULTANEOUS_KERNELS, NUM_SHIRES};
use crate::sync::{BarrierRole, GlobalAtomicU32, LocalAtomicU32, SpinBarrier};

static PRE_LAUNCH_LOCAL_BARRIER: [SpinBarrier<LocalAtomicU32>; NUM_SHIRES] =
    [const { SpinBarrier::new(LocalAtomicU32::new(0), LocalAtomicU32::new(0)) }; NUM_SHIRES];

/// Concurrent slots synchronize independently, so the global phase is
/// keyed by slot.
static PRE_LAUNCH_GLOBAL_BARRIER: [SpinBarrier<GlobalAtomicU32>; MAX_SIMULTANEOUS_KERNELS] =
    [const { SpinBarrier::new(GlobalAtomicU32::new(0), GlobalAtomicU32::new(0)) };
        MAX_SIMULTANEOUS_KERNELS];

/// Block until every participating hart of every participating shire
/// has arrived. Returns `true` on exactly one hart per launch: the
/// launch-last, which released the barrier.
pub fn pre_launch_synchronize_shires(slot_index: usize, num_shires: u32) -> bool {
    let shire_id = shire_of(arch::current_hart_id());
    let thread_count = shire_thread_count(shire_id);
    let local = &PRE_LAUNCH_LOCAL_BARRIER[shire_id];
    let global = &PRE_LAUNCH_GLOBAL_BARRIER[slot_index];

    match local.arrive(thread_count) {
        BarrierRole::Releaser => {
            let launch_last = match global.arrive(num_shires) {
                BarrierRole::Releaser => {
                    global.clear();
                    true
                }
                BarrierRole::Waiter(epoch) => {
                    global.wait_release(epoch);
                    false
                }
            };
            local.clear();
            launch_last
        }
        BarrierRole::Waiter(epoch) => {
            local.wait_release(epoch);
            false
        }
    }
}
