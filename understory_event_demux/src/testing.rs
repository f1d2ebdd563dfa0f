// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Small window-system event model shared by the unit tests.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::{KeyField, Payload, RawEvent};

pub(crate) const KEY_PRESS: u8 = 2;
pub(crate) const EXPOSE: u8 = 12;
pub(crate) const SENT: u8 = 0x80;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct KeyPress {
    pub(crate) window: u32,
    pub(crate) detail: u8,
    /// Delivered on behalf of another client; sets the high bit of the code.
    pub(crate) sent: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Expose {
    pub(crate) window: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TestEvent {
    KeyPress(KeyPress),
    Expose(Expose),
}

impl TestEvent {
    pub(crate) fn key(window: u32, detail: u8) -> Self {
        Self::KeyPress(KeyPress {
            window,
            detail,
            sent: false,
        })
    }

    pub(crate) fn expose(window: u32) -> Self {
        Self::Expose(Expose { window })
    }
}

impl RawEvent for TestEvent {
    fn discriminant(&self) -> u8 {
        match self {
            Self::KeyPress(k) if k.sent => KEY_PRESS | SENT,
            Self::KeyPress(_) => KEY_PRESS,
            Self::Expose(_) => EXPOSE,
        }
    }
}

impl Payload<TestEvent> for KeyPress {
    fn view(raw: &TestEvent) -> Option<&Self> {
        match raw {
            TestEvent::KeyPress(k) => Some(k),
            _ => None,
        }
    }
}

impl Payload<TestEvent> for Expose {
    fn view(raw: &TestEvent) -> Option<&Self> {
        match raw {
            TestEvent::Expose(e) => Some(e),
            _ => None,
        }
    }
}

/// `KeyPress::window`.
pub(crate) struct KeyWindow;

impl KeyField<KeyPress> for KeyWindow {
    type Key = u32;
    fn key(payload: &KeyPress) -> u32 {
        payload.window
    }
}

/// `KeyPress::detail`.
pub(crate) struct KeyDetail;

impl KeyField<KeyPress> for KeyDetail {
    type Key = u8;
    fn key(payload: &KeyPress) -> u8 {
        payload.detail
    }
}

/// `Expose::window`.
pub(crate) struct ExposeWindow;

impl KeyField<Expose> for ExposeWindow {
    type Key = u32;
    fn key(payload: &Expose) -> u32 {
        payload.window
    }
}

pub(crate) type Log<T> = Rc<RefCell<Vec<T>>>;

pub(crate) fn log<T>() -> Log<T> {
    Rc::new(RefCell::new(Vec::new()))
}
