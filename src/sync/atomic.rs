// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Cache-scope atomic cells.
//!
//! Every line of the flat physical address space is backed either by a
//! local cache bank (`Local*` cells, atomic with respect to harts of
//! the owning shire) or by the globally ordered cache (`Global*`
//! cells, atomic and ordered device-wide). The scope is a placement
//! property: both flavors expose the same operations and the linker
//! decides which bank backs a given static. Atomic operations never
//! order *non-atomic* payload around them; producers and consumers of
//! plain memory must pair them with an explicit [`fence`].
//!
//! 8- and 16-bit accesses are synthesized from aligned 32-bit words,
//! as the memory system only guarantees atomicity at word granularity.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Device-wide memory fence ordering non-atomic traffic around the
/// atomic cells.
#[inline(always)]
pub fn fence() {
    core::sync::atomic::fence(Ordering::SeqCst);
}

macro_rules! scoped_atomic {
    ($name:ident, $raw:ty, $prim:ty) => {
        #[repr(transparent)]
        pub struct $name($raw);

        #[allow(dead_code)]
        impl $name {
            pub const fn new(value: $prim) -> Self {
                Self(<$raw>::new(value))
            }

            #[inline(always)]
            pub fn load(&self) -> $prim {
                self.0.load(Ordering::Acquire)
            }

            #[inline(always)]
            pub fn store(&self, value: $prim) {
                self.0.store(value, Ordering::Release)
            }

            #[inline(always)]
            pub fn swap(&self, value: $prim) -> $prim {
                self.0.swap(value, Ordering::AcqRel)
            }

            #[inline(always)]
            pub fn fetch_add(&self, value: $prim) -> $prim {
                self.0.fetch_add(value, Ordering::AcqRel)
            }

            #[inline(always)]
            pub fn fetch_and(&self, value: $prim) -> $prim {
                self.0.fetch_and(value, Ordering::AcqRel)
            }

            #[inline(always)]
            pub fn fetch_or(&self, value: $prim) -> $prim {
                self.0.fetch_or(value, Ordering::AcqRel)
            }

            /// Compare-and-exchange; returns the previous value.
            #[inline(always)]
            pub fn compare_exchange(&self, current: $prim, new: $prim) -> $prim {
                match self.0.compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire) {
                    Ok(prev) => prev,
                    Err(prev) => prev,
                }
            }
        }
    };
}

scoped_atomic!(LocalAtomicU32, AtomicU32, u32);
scoped_atomic!(LocalAtomicU64, AtomicU64, u64);
scoped_atomic!(GlobalAtomicU32, AtomicU32, u32);
scoped_atomic!(GlobalAtomicU64, AtomicU64, u64);

macro_rules! lane_ops {
    ($name:ident) => {
        #[allow(dead_code)]
        impl $name {
            /// Byte lane `lane` (0..4, little-endian) of the word.
            #[inline(always)]
            pub fn load_u8(&self, lane: usize) -> u8 {
                debug_assert!(lane < 4);
                (self.load() >> (lane * 8)) as u8
            }

            pub fn store_u8(&self, lane: usize, value: u8) {
                debug_assert!(lane < 4);
                let shift = lane * 8;
                let mask = 0xFFu32 << shift;
                let mut cur = self.load();
                loop {
                    let new = (cur & !mask) | ((value as u32) << shift);
                    let prev = self.compare_exchange(cur, new);
                    if prev == cur {
                        return;
                    }
                    cur = prev;
                }
            }

            /// Wrapping add within one byte lane; returns the previous
            /// lane value.
            pub fn fetch_add_u8(&self, lane: usize, value: u8) -> u8 {
                debug_assert!(lane < 4);
                let shift = lane * 8;
                let mask = 0xFFu32 << shift;
                let mut cur = self.load();
                loop {
                    let old = (cur >> shift) as u8;
                    let new = (cur & !mask) | ((old.wrapping_add(value) as u32) << shift);
                    let prev = self.compare_exchange(cur, new);
                    if prev == cur {
                        return old;
                    }
                    cur = prev;
                }
            }

            /// Halfword lane `lane` (0..2, little-endian) of the word.
            #[inline(always)]
            pub fn load_u16(&self, lane: usize) -> u16 {
                debug_assert!(lane < 2);
                (self.load() >> (lane * 16)) as u16
            }

            pub fn store_u16(&self, lane: usize, value: u16) {
                debug_assert!(lane < 2);
                let shift = lane * 16;
                let mask = 0xFFFFu32 << shift;
                let mut cur = self.load();
                loop {
                    let new = (cur & !mask) | ((value as u32) << shift);
                    let prev = self.compare_exchange(cur, new);
                    if prev == cur {
                        return;
                    }
                    cur = prev;
                }
            }
        }
    };
}

lane_ops!(LocalAtomicU32);
lane_ops!(GlobalAtomicU32);

/// Operations shared by the 32-bit cells of either scope, for code
/// that is generic over the backing cache bank.
pub trait AtomicCell32: Sync {
    fn load(&self) -> u32;
    fn store(&self, value: u32);
    fn fetch_add(&self, value: u32) -> u32;
}

macro_rules! impl_cell32 {
    ($name:ident) => {
        impl AtomicCell32 for $name {
            #[inline(always)]
            fn load(&self) -> u32 {
                $name::load(self)
            }

            #[inline(always)]
            fn store(&self, value: u32) {
                $name::store(self, value)
            }

            #[inline(always)]
            fn fetch_add(&self, value: u32) -> u32 {
                $name::fetch_add(self, value)
            }
        }
    };
}

impl_cell32!(LocalAtomicU32);
impl_cell32!(GlobalAtomicU32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rmw_returns_previous_value() {
        let cell = GlobalAtomicU64::new(0b1010);
        assert_eq!(cell.fetch_or(0b0101), 0b1010);
        assert_eq!(cell.fetch_and(!0b0010), 0b1111);
        assert_eq!(cell.load(), 0b1101);
        assert_eq!(cell.compare_exchange(0b1101, 7), 0b1101);
        assert_eq!(cell.compare_exchange(0b1101, 9), 7);
    }

    #[test]
    fn byte_lanes_are_independent() {
        let cell = LocalAtomicU32::new(0);
        cell.store_u8(0, 0xAA);
        cell.store_u8(2, 0xCC);
        assert_eq!(cell.load(), 0x00CC_00AA);
        assert_eq!(cell.fetch_add_u8(0, 1), 0xAA);
        assert_eq!(cell.load_u8(0), 0xAB);
        assert_eq!(cell.load_u8(2), 0xCC);
        // Lane adds wrap within the lane.
        cell.store_u8(1, 0xFF);
        assert_eq!(cell.fetch_add_u8(1, 2), 0xFF);
        assert_eq!(cell.load_u8(1), 0x01);
        assert_eq!(cell.load_u8(2), 0xCC);
    }

    #[test]
    fn halfword_lanes_are_independent() {
        let cell = GlobalAtomicU32::new(0);
        cell.store_u16(1, 0xBEEF);
        cell.store_u16(0, 0x1234);
        assert_eq!(cell.load(), 0xBEEF_1234);
        assert_eq!(cell.load_u16(1), 0xBEEF);
    }
}
