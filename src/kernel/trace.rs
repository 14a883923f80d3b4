// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Per-hart U-mode trace buffer. Strictly hart-local: the owning hart
//! initializes it before entering U-mode and finalizes the header
//! after returning; nothing else touches it until the launch is over.

use alloc::vec::Vec;

const TRACE_HEADER_MAGIC: u64 = 0x5452_4143; // "TRAC"

pub struct UModeTrace {
    enabled: bool,
    buffer: Vec<u64>,
}

impl UModeTrace {
    pub const fn new() -> Self {
        Self {
            enabled: false,
            buffer: Vec::new(),
        }
    }

    /// Arm (or disarm, the default) the trace for the coming kernel
    /// run. An armed trace starts with a header word and a count slot.
    pub fn init(&mut self, hart_id: usize, enabled: bool) {
        self.buffer.clear();
        self.enabled = enabled;
        if enabled {
            self.buffer.push(TRACE_HEADER_MAGIC << 32 | hart_id as u64);
            self.buffer.push(0);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, event: u64) {
        if self.enabled {
            self.buffer.push(event);
        }
    }

    /// Patch the entry count into the header after the kernel run.
    pub fn update_buffer_header(&mut self) {
        if self.enabled {
            let entries = self.buffer.len() as u64 - 2;
            self.buffer[1] = entries;
        }
    }

    /// `(hart_id, entry_count)` if the trace was armed and finalized.
    pub fn header(&self) -> Option<(u32, u64)> {
        if !self.enabled || self.buffer.len() < 2 {
            return None;
        }
        let head = self.buffer[0];
        if head >> 32 != TRACE_HEADER_MAGIC {
            return None;
        }
        Some((head as u32, self.buffer[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_trace_stays_empty() {
        let mut trace = UModeTrace::new();
        trace.init(5, false);
        trace.record(0xAB);
        trace.update_buffer_header();
        assert!(trace.header().is_none());
    }

    #[test]
    fn header_counts_recorded_events() {
        let mut trace = UModeTrace::new();
        trace.init(7, true);
        trace.record(1);
        trace.record(2);
        trace.update_buffer_header();
        assert_eq!(trace.header(), Some((7, 2)));

        // Re-arming resets the buffer.
        trace.init(7, true);
        trace.update_buffer_header();
        assert_eq!(trace.header(), Some((7, 0)));
    }
}
