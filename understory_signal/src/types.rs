// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types shared by signals and their subscribers.

bitflags::bitflags! {
    /// Placement and lifetime options for [`Signal::connect`](crate::Signal::connect).
    ///
    /// Flags combine: `ONCE | PREPEND` places a one-shot subscriber at the head.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ConnectFlags: u8 {
        /// Remove the subscriber automatically after its first invocation.
        const ONCE    = 0b0000_0001;
        /// Place the subscriber at the head of the list instead of the tail.
        const PREPEND = 0b0000_0010;
    }
}

impl ConnectFlags {
    /// Append at the tail and keep the subscriber until it is disconnected.
    pub const DEFAULT: Self = Self::empty();
}

impl Default for ConnectFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}
