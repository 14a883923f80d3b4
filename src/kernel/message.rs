// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Messages exchanged between the master minion and the compute
//! minions: one cache line each way, a monotone per-channel sequence
//! number, a variant tag, and a fixed payload.

use crate::error::{ErrorKind, Result};

pub const MESSAGE_MAX_PAYLOAD_SIZE: usize = 62;

/// Cache-line message envelope shared by the broadcast slot and every
/// unicast circular buffer.
#[repr(C, align(64))]
#[derive(Debug, Clone, Copy)]
pub struct MessageCell {
    pub number: u8,
    pub id: u8,
    pub payload: [u8; MESSAGE_MAX_PAYLOAD_SIZE],
}

const _: () = assert!(core::mem::size_of::<MessageCell>() == 64);
const _: () = assert!(core::mem::align_of::<MessageCell>() == 64);

impl MessageCell {
    pub const fn empty() -> Self {
        Self {
            number: 0,
            id: 0,
            payload: [0; MESSAGE_MAX_PAYLOAD_SIZE],
        }
    }
}

pub type MessageHandlerFunc = fn(&MessageCell);

declare_enum_with_handler! {
    pub enum MmToCmMessageId [pub MM_TO_CM_HANDLER_LIST => MessageHandlerFunc] {
        None => crate::kernel::cpu::handle_none,
        KernelLaunch => crate::kernel::cpu::handle_kernel_launch,
        KernelAbort => crate::kernel::cpu::handle_kernel_abort,
        SetLogLevel => crate::kernel::cpu::handle_set_log_level,
    }
}

/// CM to MM message ids live above the MM to CM range.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmToMmMessageId {
    None = 0x80,
    KernelLaunchAck = 0x81,
    KernelComplete = 0x82,
    KernelException = 0x83,
}

fn read_u64(payload: &[u8], off: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&payload[off..off + 8]);
    u64::from_le_bytes(bytes)
}

fn write_u64(payload: &mut [u8], off: usize, value: u64) {
    payload[off..off + 8].copy_from_slice(&value.to_le_bytes());
}

fn read_u32(payload: &[u8], off: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&payload[off..off + 4]);
    u32::from_le_bytes(bytes)
}

fn write_u32(payload: &mut [u8], off: usize, value: u32) {
    payload[off..off + 4].copy_from_slice(&value.to_le_bytes());
}

/// `KERNEL_LAUNCH` payload. Carries everything the orchestrator needs,
/// including the exception buffer address (zero means no capture).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelLaunchMessage {
    pub kw_base_id: u8,
    pub slot_index: u8,
    pub flags: u8,
    pub code_start_address: u64,
    pub pointer_to_args: u64,
    pub exception_buffer: u64,
    pub shire_mask: u64,
}

impl KernelLaunchMessage {
    pub fn encode(&self) -> MessageCell {
        let mut cell = MessageCell::empty();
        cell.id = MmToCmMessageId::KernelLaunch as u8;
        cell.payload[0] = self.kw_base_id;
        cell.payload[1] = self.slot_index;
        cell.payload[2] = self.flags;
        write_u64(&mut cell.payload, 6, self.code_start_address);
        write_u64(&mut cell.payload, 14, self.pointer_to_args);
        write_u64(&mut cell.payload, 22, self.exception_buffer);
        write_u64(&mut cell.payload, 30, self.shire_mask);
        cell
    }

    pub fn decode(cell: &MessageCell) -> Result<Self> {
        if cell.id != MmToCmMessageId::KernelLaunch as u8 {
            return ErrorKind::Protocol.into();
        }
        Ok(Self {
            kw_base_id: cell.payload[0],
            slot_index: cell.payload[1],
            flags: cell.payload[2],
            code_start_address: read_u64(&cell.payload, 6),
            pointer_to_args: read_u64(&cell.payload, 14),
            exception_buffer: read_u64(&cell.payload, 22),
            shire_mask: read_u64(&cell.payload, 30),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelAbortMessage {
    pub slot_index: u8,
}

impl KernelAbortMessage {
    pub fn encode(&self) -> MessageCell {
        let mut cell = MessageCell::empty();
        cell.id = MmToCmMessageId::KernelAbort as u8;
        cell.payload[0] = self.slot_index;
        cell
    }

    pub fn decode(cell: &MessageCell) -> Result<Self> {
        if cell.id != MmToCmMessageId::KernelAbort as u8 {
            return ErrorKind::Protocol.into();
        }
        Ok(Self {
            slot_index: cell.payload[0],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetLogLevelMessage {
    pub level: u8,
}

impl SetLogLevelMessage {
    pub fn encode(&self) -> MessageCell {
        let mut cell = MessageCell::empty();
        cell.id = MmToCmMessageId::SetLogLevel as u8;
        cell.payload[0] = self.level;
        cell
    }

    pub fn decode(cell: &MessageCell) -> Result<Self> {
        if cell.id != MmToCmMessageId::SetLogLevel as u8 {
            return ErrorKind::Protocol.into();
        }
        Ok(Self {
            level: cell.payload[0],
        })
    }
}

/// Informational per-shire pre-launch acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelLaunchAckMessage {
    pub shire_id: u32,
    pub slot_index: u8,
}

impl KernelLaunchAckMessage {
    pub fn encode(&self) -> MessageCell {
        let mut cell = MessageCell::empty();
        cell.id = CmToMmMessageId::KernelLaunchAck as u8;
        write_u32(&mut cell.payload, 0, self.shire_id);
        cell.payload[4] = self.slot_index;
        cell
    }

    pub fn decode(cell: &MessageCell) -> Result<Self> {
        if cell.id != CmToMmMessageId::KernelLaunchAck as u8 {
            return ErrorKind::Protocol.into();
        }
        Ok(Self {
            shire_id: read_u32(&cell.payload, 0),
            slot_index: cell.payload[4],
        })
    }
}

/// The single per-launch completion notification. The masks are only
/// meaningful when `status` is not success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelCompleteMessage {
    pub shire_id: u32,
    pub slot_index: u8,
    pub status: i8,
    pub exception_mask: u64,
    pub system_abort_mask: u64,
}

impl KernelCompleteMessage {
    pub fn encode(&self) -> MessageCell {
        let mut cell = MessageCell::empty();
        cell.id = CmToMmMessageId::KernelComplete as u8;
        write_u32(&mut cell.payload, 0, self.shire_id);
        cell.payload[4] = self.slot_index;
        cell.payload[5] = self.status as u8;
        write_u64(&mut cell.payload, 6, self.exception_mask);
        write_u64(&mut cell.payload, 14, self.system_abort_mask);
        cell
    }

    pub fn decode(cell: &MessageCell) -> Result<Self> {
        if cell.id != CmToMmMessageId::KernelComplete as u8 {
            return ErrorKind::Protocol.into();
        }
        Ok(Self {
            shire_id: read_u32(&cell.payload, 0),
            slot_index: cell.payload[4],
            status: cell.payload[5] as i8,
            exception_mask: read_u64(&cell.payload, 6),
            system_abort_mask: read_u64(&cell.payload, 14),
        })
    }
}

/// Trap context as reported on the unicast channel by the trap handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelExceptionMessage {
    pub hart_id: u64,
    pub mcause: u64,
    pub mepc: u64,
    pub mtval: u64,
    pub mstatus: u64,
}

impl KernelExceptionMessage {
    pub fn encode(&self) -> MessageCell {
        let mut cell = MessageCell::empty();
        cell.id = CmToMmMessageId::KernelException as u8;
        write_u64(&mut cell.payload, 0, self.hart_id);
        write_u64(&mut cell.payload, 8, self.mcause);
        write_u64(&mut cell.payload, 16, self.mepc);
        write_u64(&mut cell.payload, 24, self.mtval);
        write_u64(&mut cell.payload, 32, self.mstatus);
        cell
    }

    pub fn decode(cell: &MessageCell) -> Result<Self> {
        if cell.id != CmToMmMessageId::KernelException as u8 {
            return ErrorKind::Protocol.into();
        }
        Ok(Self {
            hart_id: read_u64(&cell.payload, 0),
            mcause: read_u64(&cell.payload, 8),
            mepc: read_u64(&cell.payload, 16),
            mtval: read_u64(&cell.payload, 24),
            mstatus: read_u64(&cell.payload, 32),
        })
    }
}
