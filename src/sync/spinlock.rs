// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Raw spin words for locks that live in shared scratchpad memory and
//! protect data the lock owner accesses through its own protocol (the
//! unicast circular buffers). For owned in-firmware data use
//! `spin::Mutex` instead.

use super::atomic::GlobalAtomicU32;

/// A one-word test-and-set lock in globally ordered memory.
#[repr(C, align(64))]
pub struct SpinWord {
    flag: GlobalAtomicU32,
    _pad: [u32; 15],
}

impl SpinWord {
    pub const fn new() -> Self {
        Self {
            flag: GlobalAtomicU32::new(0),
            _pad: [0; 15],
        }
    }

    pub fn lock(&self) -> SpinGuard<'_> {
        while self.flag.compare_exchange(0, 1) != 0 {
            core::hint::spin_loop();
        }
        SpinGuard { word: self }
    }

    pub fn try_lock(&self) -> Option<SpinGuard<'_>> {
        if self.flag.compare_exchange(0, 1) == 0 {
            Some(SpinGuard { word: self })
        } else {
            None
        }
    }
}

pub struct SpinGuard<'a> {
    word: &'a SpinWord,
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.word.flag.store(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_exclusive() {
        let word = SpinWord::new();
        let guard = word.lock();
        assert!(word.try_lock().is_none());
        drop(guard);
        assert!(word.try_lock().is_some());
    }

    #[test]
    fn contended_increments_do_not_interleave() {
        use std::sync::atomic::{AtomicU64, Ordering};

        static WORD: SpinWord = SpinWord::new();
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    for _ in 0..1000 {
                        let _guard = WORD.lock();
                        let v = COUNTER.load(Ordering::Relaxed);
                        COUNTER.store(v + 1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(COUNTER.load(Ordering::Relaxed), 8000);
    }
}
