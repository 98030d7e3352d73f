// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent layer for Reverie: persona, self-review loop, and the
//! conversation controller that ties memory and generation together.

pub mod conversation;
pub mod persona;
pub mod reflector;
pub mod tags;

pub use conversation::{Conversation, TurnOutcome};
pub use reflector::{ReflectionOutcome, Reflector};
