// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Bounded circular buffer of message cells, one 4 KiB window per
//! unicast channel. Producers serialize on the channel's lock word;
//! the consumer side is single-reader and lock-free.

use core::cell::UnsafeCell;

use crate::error::{ErrorKind, Result};
use crate::sync::{fence, GlobalAtomicU32};

use super::message::MessageCell;

/// 63 cells plus the control line fill the 4 KiB window exactly.
pub const CIRCBUFF_CELL_COUNT: usize = 63;

#[repr(C, align(64))]
pub struct CircBuffer {
    /// Next cell to write.
    head: GlobalAtomicU32,
    /// Next cell to read.
    tail: GlobalAtomicU32,
    length: u32,
    _pad: u32,
    cells: [UnsafeCell<MessageCell>; CIRCBUFF_CELL_COUNT],
}

const _: () = assert!(core::mem::size_of::<CircBuffer>() == 4096);

// SAFETY: cell payloads are only written by the producer holding the
// channel lock and only read by the single consumer, each strictly
// inside the head/tail window it owns.
unsafe impl Sync for CircBuffer {}

impl CircBuffer {
    pub const fn new() -> Self {
        Self {
            head: GlobalAtomicU32::new(0),
            tail: GlobalAtomicU32::new(0),
            length: CIRCBUFF_CELL_COUNT as u32,
            _pad: 0,
            cells: [const { UnsafeCell::new(MessageCell::empty()) }; CIRCBUFF_CELL_COUNT],
        }
    }

    /// Append one message. Caller must hold the channel's lock word.
    pub fn push(&self, message: &MessageCell) -> Result<()> {
        let head = self.head.load();
        let next = (head + 1) % self.length;
        if next == self.tail.load() {
            return ErrorKind::Busy.into();
        }
        // SAFETY: `head` is owned by the (locked) producer side and the
        // cell at `head` is outside the consumer's window.
        unsafe {
            *self.cells[head as usize].get() = *message;
        }
        fence();
        self.head.store(next);
        Ok(())
    }

    /// Take the oldest message. Single consumer per buffer.
    pub fn pop(&self, out: &mut MessageCell) -> Result<()> {
        let tail = self.tail.load();
        if tail == self.head.load() {
            return ErrorKind::Empty.into();
        }
        fence();
        // SAFETY: the cell at `tail` was published by a completed push
        // and no producer touches it until `tail` advances past it.
        *out = unsafe { *self.cells[tail as usize].get() };
        self.tail.store((tail + 1) % self.length);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.tail.load() == self.head.load()
    }
}
