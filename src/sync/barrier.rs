// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Spin barriers.
//!
//! [`SpinBarrier`] is the counting half of a two-phase barrier:
//! callers arrive, exactly one of them comes back as the
//! [`BarrierRole::Releaser`] and is obligated to [`SpinBarrier::clear`]
//! the counter once the release condition holds; everyone else waits
//! on the epoch it captured at arrival. The epoch makes the barrier
//! safe for immediate reuse by the same population (a launch crosses
//! it twice back to back when an L3 evict is requested).
//!
//! [`LocalFccBarrier`] is the reusable intra-shire barrier used after
//! a kernel run, modeled on the fast-condition-code hardware channel.

use super::atomic::{fence, AtomicCell32, LocalAtomicU32};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierRole {
    /// Must `wait_release` on the captured epoch.
    Waiter(u32),
    /// Last to arrive; must `clear` the barrier to release the waiters.
    Releaser,
}

pub struct SpinBarrier<C: AtomicCell32> {
    counter: C,
    epoch: C,
}

impl<C: AtomicCell32> SpinBarrier<C> {
    pub const fn new(counter: C, epoch: C) -> Self {
        Self { counter, epoch }
    }

    /// Arrive at the barrier. The caller observing the `target - 1`th
    /// pre-increment value is the releaser.
    #[inline]
    pub fn arrive(&self, target: u32) -> BarrierRole {
        let epoch = self.epoch.load();
        if self.counter.fetch_add(1) == target - 1 {
            BarrierRole::Releaser
        } else {
            BarrierRole::Waiter(epoch)
        }
    }

    /// Reset the counter and advance the epoch, releasing the waiters.
    #[inline]
    pub fn clear(&self) {
        self.counter.store(0);
        self.epoch.fetch_add(1);
    }

    /// Spin until the releaser has cleared the epoch captured at
    /// arrival.
    pub fn wait_release(&self, epoch: u32) {
        while self.epoch.load() == epoch {
            fence();
            core::hint::spin_loop();
        }
    }
}

/// Reusable sense-reversing shire barrier. `minion_mask` names the
/// participating minions for the hardware credit path; it must agree
/// with `thread_count` (two harts per minion).
pub struct LocalFccBarrier {
    count: LocalAtomicU32,
    sense: LocalAtomicU32,
}

impl LocalFccBarrier {
    pub const fn new() -> Self {
        Self {
            count: LocalAtomicU32::new(0),
            sense: LocalAtomicU32::new(0),
        }
    }

    /// Re-arm the barrier. Only valid while no hart is blocked on it.
    pub fn init(&self) {
        self.count.store(0);
        self.sense.store(0);
    }

    /// Block until `thread_count` harts of the shire have arrived.
    pub fn wait(&self, thread_count: u32, minion_mask: u32) {
        debug_assert_eq!(minion_mask.count_ones() * 2, thread_count);
        let sense = self.sense.load();
        if self.count.fetch_add(1) == thread_count - 1 {
            self.count.store(0);
            self.sense.store(sense.wrapping_add(1));
        } else {
            while self.sense.load() == sense {
                fence();
                core::hint::spin_loop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::atomic::GlobalAtomicU32;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn exactly_one_releaser_per_round() {
        let barrier = Arc::new(SpinBarrier::new(
            GlobalAtomicU32::new(0),
            GlobalAtomicU32::new(0),
        ));
        let releasers = Arc::new(AtomicUsize::new(0));
        const N: u32 = 16;
        const ROUNDS: usize = 20;

        let threads: Vec<_> = (0..N)
            .map(|_| {
                let barrier = barrier.clone();
                let releasers = releasers.clone();
                std::thread::spawn(move || {
                    // Back-to-back reuse by the same population.
                    for _ in 0..ROUNDS {
                        match barrier.arrive(N) {
                            BarrierRole::Releaser => {
                                releasers.fetch_add(1, Ordering::SeqCst);
                                barrier.clear();
                            }
                            BarrierRole::Waiter(epoch) => barrier.wait_release(epoch),
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(releasers.load(Ordering::SeqCst), ROUNDS);
    }

    #[test]
    fn no_release_before_every_arrival() {
        let barrier = Arc::new(SpinBarrier::new(
            GlobalAtomicU32::new(0),
            GlobalAtomicU32::new(0),
        ));
        let arrived = Arc::new(AtomicUsize::new(0));
        const N: u32 = 8;

        let threads: Vec<_> = (0..N)
            .map(|i| {
                let barrier = barrier.clone();
                let arrived = arrived.clone();
                std::thread::spawn(move || {
                    if i == 0 {
                        std::thread::sleep(std::time::Duration::from_millis(20));
                    }
                    arrived.fetch_add(1, Ordering::SeqCst);
                    match barrier.arrive(N) {
                        BarrierRole::Releaser => barrier.clear(),
                        BarrierRole::Waiter(epoch) => barrier.wait_release(epoch),
                    }
                    assert_eq!(arrived.load(Ordering::SeqCst), N as usize);
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
    }

    #[test]
    fn fcc_barrier_is_reusable() {
        const THREADS: u32 = 8;
        const ROUNDS: usize = 50;
        static BARRIER: LocalFccBarrier = LocalFccBarrier::new();
        static PHASE: AtomicU32 = AtomicU32::new(0);

        BARRIER.init();
        let threads: Vec<_> = (0..THREADS)
            .map(|_| {
                std::thread::spawn(|| {
                    for round in 0..ROUNDS {
                        // Every hart must still see the previous round's
                        // phase value when it arrives.
                        assert_eq!(PHASE.load(Ordering::SeqCst) as usize, round);
                        BARRIER.wait(THREADS, 0xF);
                        if PHASE.load(Ordering::SeqCst) as usize == round {
                            let _ = PHASE.compare_exchange(
                                round as u32,
                                round as u32 + 1,
                                Ordering::SeqCst,
                                Ordering::SeqCst,
                            );
                        }
                        BARRIER.wait(THREADS, 0xF);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(PHASE.load(Ordering::SeqCst) as usize, ROUNDS);
    }
}
