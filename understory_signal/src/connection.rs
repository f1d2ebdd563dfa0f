// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Connection handles.
//!
//! A [`Connection`] names one subscriber by its generational slot key and
//! reaches the owning list through a weak, type-erased reference. The handle
//! never owns or touches the subscriber itself: liveness is decided by the list,
//! so unlinking a node (through any handle, a once/remove outcome, a clear, or
//! dropping the signal) invalidates every handle that points at it.

use alloc::rc::Weak;
use core::cell::RefCell;

use crate::list::{NodeKey, SignalList};

/// Removal path from a handle back into its list.
pub(crate) trait Disconnect {
    fn disconnect(&self, key: NodeKey);
    fn is_connected(&self, key: NodeKey) -> bool;
}

impl<T: ?Sized, R> Disconnect for RefCell<SignalList<T, R>> {
    fn disconnect(&self, key: NodeKey) {
        let detached = self.borrow_mut().remove(key);
        if let Some(detached) = detached {
            detached.finish();
        }
    }

    fn is_connected(&self, key: NodeKey) -> bool {
        self.borrow().is_live(key)
    }
}

/// Handle to one subscription.
///
/// Returned by [`Signal::connect`](crate::Signal::connect) and friends.
/// Dropping the handle disconnects the subscriber; use [`Connection::release`]
/// to keep the subscriber for the lifetime of the signal instead.
///
/// Handles are movable but not clonable. [`Connection::default`] is a handle
/// that is not connected to anything, which makes `core::mem::take` a
/// convenient way to move a handle out of a field.
///
/// ```
/// use understory_signal::Signal;
///
/// let signal: Signal<u32> = Signal::new();
/// let mut conn = signal.append(|_| {});
/// assert!(conn.connected());
///
/// let mut moved = core::mem::take(&mut conn);
/// assert!(!conn.connected());
/// assert!(moved.connected());
///
/// moved.disconnect();
/// moved.disconnect(); // no-op
/// assert!(signal.is_empty());
/// ```
#[must_use = "dropping a Connection disconnects its subscriber"]
#[derive(Default)]
pub struct Connection {
    link: Option<Link>,
}

struct Link {
    list: Weak<dyn Disconnect>,
    key: NodeKey,
}

impl Connection {
    pub(crate) fn new(list: Weak<dyn Disconnect>, key: NodeKey) -> Self {
        Self {
            link: Some(Link { list, key }),
        }
    }

    /// Remove the subscriber from its signal.
    ///
    /// Idempotent: calling it again, or on a handle whose subscriber already went
    /// away, does nothing. Safe to call from inside any callback, including the
    /// subscriber's own.
    pub fn disconnect(&mut self) {
        if let Some(link) = self.link.take()
            && let Some(list) = link.list.upgrade()
        {
            list.disconnect(link.key);
        }
    }

    /// Whether the handle still refers to a live subscriber of a live signal.
    pub fn connected(&self) -> bool {
        self.link.as_ref().is_some_and(|link| {
            link.list
                .upgrade()
                .is_some_and(|list| list.is_connected(link.key))
        })
    }

    /// Give up the handle without disconnecting.
    ///
    /// The subscriber stays connected until it is removed by the signal itself
    /// (once, a reduce outcome, a clear) or the signal is dropped.
    pub fn release(mut self) {
        self.link = None;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl core::fmt::Debug for Connection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.connected())
            .finish_non_exhaustive()
    }
}
