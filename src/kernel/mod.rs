// Copyright (c) 2025 The Minion Runtime Authors. All rights reserved.
// Minion-Runtime is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! The kernel launch and completion core: message channels, per-shire
//! launch state, the pre-launch synchronizer and the orchestrator.

pub use self::barrier::*;
pub use self::cpu::*;
pub use self::exception::*;
pub use self::iface::*;
pub use self::launch::*;
pub use self::launch_info::*;
pub use self::logger::*;
pub use self::message::*;

pub mod barrier;
pub mod circbuff;
pub mod cpu;
pub mod exception;
pub mod iface;
pub mod launch;
pub mod launch_info;
pub mod logger;
pub mod message;
pub mod trace;
