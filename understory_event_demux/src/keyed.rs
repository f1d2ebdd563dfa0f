// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keyed routes: one signal per value of a payload field.
//!
//! A keyed route subscribes once to the plain route of its discriminant and
//! forwards each payload to the signal registered for `F::key(payload)`. Teardown
//! cascades through on-empty notifications:
//!
//! 1. The last subscriber of a key leaves: the key is erased.
//! 2. The last key is erased: the upstream subscription is dropped and the keyed
//!    route erases itself from the demux.
//! 3. Dropping the upstream subscription may empty the plain route, which the demux
//!    then erases as well.
//!
//! The upstream does not have to be a demux route: a [`Filter`](crate::Filter)
//! feeds its keyed routes from its own filtered signal. Both owners index their
//! keyed routes in a [`KeyedRoutes`] registry.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::any::Any;
use core::cell::{Cell, RefCell};
use core::hash::Hash;
use core::marker::PhantomData;

use hashbrown::HashMap;
use understory_signal::{ConnectFlags, Connection, Signal};

use crate::KeyField;

struct KeySlot<P: 'static> {
    serial: u64,
    signal: Rc<Signal<P>>,
}

pub(crate) struct KeyedRoute<P: 'static, F: KeyField<P>> {
    signals: RefCell<HashMap<F::Key, KeySlot<P>>>,
    /// Subscription on the plain route of the same discriminant.
    upstream: RefCell<Connection>,
    next_serial: Cell<u64>,
    /// Erases this route from the demux.
    on_empty: Box<dyn Fn()>,
    _field: PhantomData<fn() -> F>,
}

impl<P: 'static, F: KeyField<P>> KeyedRoute<P, F> {
    pub(crate) fn new(on_empty: impl Fn() + 'static) -> Self {
        Self {
            signals: RefCell::new(HashMap::new()),
            upstream: RefCell::new(Connection::default()),
            next_serial: Cell::new(0),
            on_empty: Box::new(on_empty),
            _field: PhantomData,
        }
    }

    /// Install the upstream subscription; replaces (and drops) any previous one.
    pub(crate) fn attach(&self, upstream: Connection) {
        let previous = self.upstream.replace(upstream);
        drop(previous);
    }

    /// Forward `payload` to the subscribers of its key.
    pub(crate) fn dispatch(&self, payload: &P) {
        let key = F::key(payload);
        let signal = self
            .signals
            .borrow()
            .get(&key)
            .map(|slot| Rc::clone(&slot.signal));
        match signal {
            Some(signal) => signal.emit(payload),
            None => tracing::trace!("no subscribers for key"),
        }
    }

    pub(crate) fn connect(
        self: &Rc<Self>,
        key: F::Key,
        f: impl Fn(&P) + 'static,
        flags: ConnectFlags,
    ) -> Connection {
        let signal = {
            let mut signals = self.signals.borrow_mut();
            let slot = signals.entry(key.clone()).or_insert_with(|| {
                let serial = self.next_serial.get();
                self.next_serial.set(serial + 1);
                let route = Rc::downgrade(self);
                KeySlot {
                    serial,
                    signal: Rc::new(Signal::with_on_empty(move || {
                        if let Some(route) = route.upgrade() {
                            route.erase_key(&key, serial);
                        }
                    })),
                }
            });
            Rc::clone(&slot.signal)
        };
        signal.connect(f, flags)
    }

    #[cfg(test)]
    pub(crate) fn key_count(&self) -> usize {
        self.signals.borrow().len()
    }

    fn erase_key(&self, key: &F::Key, serial: u64) {
        let (removed, now_empty) = {
            let mut signals = self.signals.borrow_mut();
            let current = signals.get(key).is_some_and(|slot| slot.serial == serial);
            let removed = if current { signals.remove(key) } else { None };
            (removed, signals.is_empty())
        };
        let Some(removed) = removed else {
            return;
        };
        drop(removed);
        if now_empty {
            let upstream = core::mem::take(&mut *self.upstream.borrow_mut());
            drop(upstream);
            (self.on_empty)();
        }
    }
}

struct KeyedEntry {
    serial: u64,
    route: Rc<dyn Any>,
}

/// Type-erased keyed routes of one owner, indexed by `Id`.
///
/// Each entry remembers the serial it was registered under, so a stale on-empty
/// notification never erases a newer route stored under the same id.
pub(crate) struct KeyedRoutes<Id> {
    entries: RefCell<HashMap<Id, KeyedEntry>>,
    next_serial: Cell<u64>,
}

impl<Id: Copy + Eq + Hash> KeyedRoutes<Id> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            next_serial: Cell::new(0),
        }
    }

    /// Serial for a route about to be registered.
    pub(crate) fn reserve(&self) -> u64 {
        let serial = self.next_serial.get();
        self.next_serial.set(serial + 1);
        serial
    }

    pub(crate) fn get<P: 'static, F: KeyField<P>>(&self, id: Id) -> Option<Rc<KeyedRoute<P, F>>> {
        let route = self
            .entries
            .borrow()
            .get(&id)
            .map(|entry| Rc::clone(&entry.route))?;
        let Ok(route) = route.downcast::<KeyedRoute<P, F>>() else {
            unreachable!("keyed routes are indexed by their own type");
        };
        Some(route)
    }

    pub(crate) fn insert<P: 'static, F: KeyField<P>>(
        &self,
        id: Id,
        serial: u64,
        route: &Rc<KeyedRoute<P, F>>,
    ) {
        let route = Rc::clone(route);
        let route: Rc<dyn Any> = route;
        let previous = self
            .entries
            .borrow_mut()
            .insert(id, KeyedEntry { serial, route });
        drop(previous);
    }

    /// Erase the entry under `id` if it is still the one registered as `serial`.
    pub(crate) fn erase(&self, id: Id, serial: u64) -> bool {
        let removed = {
            let mut entries = self.entries.borrow_mut();
            let current = entries.get(&id).is_some_and(|e| e.serial == serial);
            if current { entries.remove(&id) } else { None }
        };
        removed.is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
