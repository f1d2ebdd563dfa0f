// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Filtered routes.
//!
//! A [`Filter`] is a signal of its own that listens to a demux route only while
//! it has subscribers, and re-emits only the payloads its predicate accepts. A
//! typical use is a "close requested" signal carved out of a generic
//! client-message event.
//!
//! Filtered payloads can be split by a key field as well ([`Filter::on_key`]).
//! Those keyed routes hang off the filter's own signal and tear down the same
//! way as the demux's: last subscriber of a key, then the key, then the keyed
//! route, then (if nothing else listens) the filter's attachment to the demux.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use core::any::TypeId;
use core::cell::RefCell;

use understory_signal::{ConnectFlags, Connection, Signal};

use crate::keyed::{KeyedRoute, KeyedRoutes};
use crate::{DemuxError, EventDemux, KeyField, Payload};

struct FilterInner<P: 'static> {
    predicate: Box<dyn Fn(&P) -> bool>,
    signal: Signal<P>,
    upstream: RefCell<Connection>,
    /// Keyed routes fed by `signal`, one per key field type.
    keyed: KeyedRoutes<TypeId>,
}

/// Predicate-filtered view of a demux route.
///
/// ```
/// use core::cell::Cell;
/// use std::rc::Rc;
/// use understory_event_demux::{EventDemux, Filter, RawEvent};
///
/// struct Message {
///     kind: u32,
/// }
///
/// impl RawEvent for Message {
///     fn discriminant(&self) -> u8 {
///         33
///     }
/// }
///
/// const DELETE_WINDOW: u32 = 301;
///
/// let demux = EventDemux::<Message>::new();
/// let close_requested = Filter::<Message>::new(|m| m.kind == DELETE_WINDOW);
///
/// let closes = Rc::new(Cell::new(0));
/// let c = closes.clone();
/// let conn = close_requested
///     .on(&demux, 33, move |_| c.set(c.get() + 1))
///     .unwrap();
///
/// demux.emit(&Message { kind: 12 });
/// demux.emit(&Message { kind: DELETE_WINDOW });
/// assert_eq!(closes.get(), 1);
///
/// // Without subscribers the filter lets go of the demux route.
/// drop(conn);
/// assert!(!close_requested.is_attached());
/// assert!(demux.is_empty());
/// ```
pub struct Filter<P: 'static> {
    inner: Rc<FilterInner<P>>,
}

impl<P: 'static> Filter<P> {
    /// Create a detached filter passing payloads for which `predicate` holds.
    pub fn new(predicate: impl Fn(&P) -> bool + 'static) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<FilterInner<P>>| {
            let weak = weak.clone();
            FilterInner {
                predicate: Box::new(predicate),
                signal: Signal::with_on_empty(move || {
                    if let Some(inner) = weak.upgrade() {
                        let upstream = core::mem::take(&mut *inner.upstream.borrow_mut());
                        drop(upstream);
                        tracing::debug!("filter detached from its route");
                    }
                }),
                upstream: RefCell::new(Connection::default()),
                keyed: KeyedRoutes::new(),
            }
        });
        Self { inner }
    }

    /// Subscribe `f` to payloads of route `code` that pass the predicate.
    ///
    /// The first subscription attaches the filter to `demux`; while attached,
    /// later calls reuse that route and ignore `demux` and `code`.
    pub fn on<E: 'static>(
        &self,
        demux: &EventDemux<E>,
        code: u8,
        f: impl Fn(&P) + 'static,
    ) -> Result<Connection, DemuxError>
    where
        P: Payload<E>,
    {
        self.on_with(demux, code, ConnectFlags::DEFAULT, f)
    }

    /// Like [`Filter::on`], with explicit [`ConnectFlags`] for `f`.
    pub fn on_with<E: 'static>(
        &self,
        demux: &EventDemux<E>,
        code: u8,
        flags: ConnectFlags,
        f: impl Fn(&P) + 'static,
    ) -> Result<Connection, DemuxError>
    where
        P: Payload<E>,
    {
        self.attach(demux, code)?;
        Ok(self.inner.signal.connect(f, flags))
    }

    /// Subscribe `f` to payloads of route `code` that pass the predicate and
    /// whose field `F` equals `key`.
    ///
    /// Attaches like [`Filter::on`]. Subscribers of other keys are not invoked.
    pub fn on_key<F: KeyField<P>, E: 'static>(
        &self,
        demux: &EventDemux<E>,
        code: u8,
        key: F::Key,
        f: impl Fn(&P) + 'static,
    ) -> Result<Connection, DemuxError>
    where
        P: Payload<E>,
    {
        self.on_key_with::<F, E>(demux, code, key, ConnectFlags::DEFAULT, f)
    }

    /// Like [`Filter::on_key`], with explicit [`ConnectFlags`] for `f`.
    pub fn on_key_with<F: KeyField<P>, E: 'static>(
        &self,
        demux: &EventDemux<E>,
        code: u8,
        key: F::Key,
        flags: ConnectFlags,
        f: impl Fn(&P) + 'static,
    ) -> Result<Connection, DemuxError>
    where
        P: Payload<E>,
    {
        self.attach(demux, code)?;
        let route = self.keyed_route::<F>();
        Ok(route.connect(key, f, flags))
    }

    /// Whether the filter currently listens to a demux route.
    pub fn is_attached(&self) -> bool {
        self.inner.upstream.borrow().connected()
    }

    /// Whether the filter has no subscribers.
    pub fn is_empty(&self) -> bool {
        self.inner.signal.is_empty()
    }

    /// Number of subscribers, counting each keyed route once.
    pub fn len(&self) -> usize {
        self.inner.signal.len()
    }

    /// Number of live keyed routes.
    pub fn keyed_route_count(&self) -> usize {
        self.inner.keyed.len()
    }

    /// Listen to route `code` of `demux` unless already attached.
    fn attach<E: 'static>(&self, demux: &EventDemux<E>, code: u8) -> Result<(), DemuxError>
    where
        P: Payload<E>,
    {
        if self.is_attached() {
            return Ok(());
        }
        let weak = Rc::downgrade(&self.inner);
        let upstream = demux.on::<P>(code, move |payload| {
            if let Some(inner) = weak.upgrade()
                && (inner.predicate)(payload)
            {
                inner.signal.emit(payload);
            }
        })?;
        let previous = self.inner.upstream.replace(upstream);
        drop(previous);
        tracing::debug!(code, "filter attached to route");
        Ok(())
    }

    /// Find or create the keyed route for `F`, fed by the filter's own signal.
    fn keyed_route<F: KeyField<P>>(&self) -> Rc<KeyedRoute<P, F>> {
        let id = TypeId::of::<KeyedRoute<P, F>>();
        if let Some(route) = self.inner.keyed.get::<P, F>(id) {
            return route;
        }

        let serial = self.inner.keyed.reserve();
        let filter = Rc::downgrade(&self.inner);
        let route = Rc::new(KeyedRoute::<P, F>::new(move || {
            if let Some(inner) = filter.upgrade()
                && inner.keyed.erase(id, serial)
            {
                tracing::debug!("erased filtered keyed route");
            }
        }));
        let weak = Rc::downgrade(&route);
        route.attach(self.inner.signal.append(move |payload| {
            if let Some(route) = weak.upgrade() {
                route.dispatch(payload);
            }
        }));
        self.inner.keyed.insert(id, serial, &route);
        tracing::debug!(field = core::any::type_name::<F>(), "created filtered keyed route");
        route
    }
}

impl<P: 'static> core::fmt::Debug for Filter<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Filter")
            .field("attached", &self.is_attached())
            .field("subscribers", &self.len())
            .field("keyed_routes", &self.keyed_route_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        EXPOSE, Expose, ExposeWindow, KEY_PRESS, KeyPress, Log, TestEvent, log,
    };

    fn even_windows() -> Filter<Expose> {
        Filter::new(|e: &Expose| e.window.is_multiple_of(2))
    }

    #[test]
    fn forwards_only_accepted_payloads() {
        let demux = EventDemux::<TestEvent>::new();
        let filter = even_windows();
        let seen: Log<u32> = log();
        let s = seen.clone();
        let _conn = filter
            .on(&demux, EXPOSE, move |e| s.borrow_mut().push(e.window))
            .unwrap();

        for window in 1..=4 {
            demux.emit(&TestEvent::expose(window));
        }
        assert_eq!(*seen.borrow(), [2, 4]);
    }

    #[test]
    fn attaches_once_and_detaches_when_empty() {
        let demux = EventDemux::<TestEvent>::new();
        let filter = even_windows();
        assert!(!filter.is_attached());

        let a = filter.on(&demux, EXPOSE, |_| {}).unwrap();
        let b = filter.on(&demux, EXPOSE, |_| {}).unwrap();
        assert!(filter.is_attached());
        assert_eq!(filter.len(), 2);
        assert_eq!(demux.route_count(), 1);

        drop(a);
        assert!(filter.is_attached());
        drop(b);
        assert!(!filter.is_attached());
        assert!(filter.is_empty());
        assert!(demux.is_empty());

        // Re-attaches on demand.
        let _c = filter.on(&demux, EXPOSE, |_| {}).unwrap();
        assert!(filter.is_attached());
        assert_eq!(demux.route_count(), 1);
    }

    #[test]
    fn coexists_with_plain_subscribers() {
        let demux = EventDemux::<TestEvent>::new();
        let filter = even_windows();
        let seen: Log<&str> = log();
        let s = seen.clone();
        let _plain = demux
            .on::<Expose>(EXPOSE, move |_| s.borrow_mut().push("plain"))
            .unwrap();
        let s = seen.clone();
        let filtered = filter
            .on(&demux, EXPOSE, move |_| s.borrow_mut().push("filtered"))
            .unwrap();

        demux.emit(&TestEvent::expose(2));
        assert_eq!(*seen.borrow(), ["plain", "filtered"]);
        drop(filtered);
        assert_eq!(demux.route_count(), 1);
    }

    #[test]
    fn once_through_a_filter_detaches_during_dispatch() {
        let demux = EventDemux::<TestEvent>::new();
        let filter = even_windows();
        let seen: Log<u32> = log();
        let s = seen.clone();
        filter
            .on_with(&demux, EXPOSE, ConnectFlags::ONCE, move |e| {
                s.borrow_mut().push(e.window);
            })
            .unwrap()
            .release();

        demux.emit(&TestEvent::expose(1));
        demux.emit(&TestEvent::expose(2));
        demux.emit(&TestEvent::expose(4));
        assert_eq!(*seen.borrow(), [2]);
        assert!(!filter.is_attached());
        assert!(demux.is_empty());
    }

    #[test]
    fn mismatched_route_leaves_filter_detached() {
        let demux = EventDemux::<TestEvent>::new();
        let _keys = demux.on::<KeyPress>(KEY_PRESS, |_| {}).unwrap();
        let filter = even_windows();
        assert!(filter.on(&demux, KEY_PRESS, |_| {}).is_err());
        assert!(!filter.is_attached());
        assert!(filter.is_empty());
    }

    #[test]
    fn keyed_subscribers_see_only_their_key() {
        let demux = EventDemux::<TestEvent>::new();
        let filter = even_windows();
        let seen: Log<(&str, u32)> = log();
        let s = seen.clone();
        let _two = filter
            .on_key::<ExposeWindow, _>(&demux, EXPOSE, 2, move |e| {
                s.borrow_mut().push(("2", e.window));
            })
            .unwrap();
        let s = seen.clone();
        let _four = filter
            .on_key::<ExposeWindow, _>(&demux, EXPOSE, 4, move |e| {
                s.borrow_mut().push(("4", e.window));
            })
            .unwrap();
        let s = seen.clone();
        let _three = filter
            .on_key::<ExposeWindow, _>(&demux, EXPOSE, 3, move |e| {
                s.borrow_mut().push(("3", e.window));
            })
            .unwrap();
        assert_eq!(filter.keyed_route_count(), 1);
        assert_eq!(filter.len(), 1);

        for window in [1, 2, 3, 4, 2, 6] {
            demux.emit(&TestEvent::expose(window));
        }
        assert_eq!(*seen.borrow(), [("2", 2), ("4", 4), ("2", 2)]);
    }

    #[test]
    fn keyed_teardown_cascades_through_the_filter() {
        let demux = EventDemux::<TestEvent>::new();
        let filter = even_windows();
        let a = filter
            .on_key::<ExposeWindow, _>(&demux, EXPOSE, 2, |_| {})
            .unwrap();
        let b = filter
            .on_key::<ExposeWindow, _>(&demux, EXPOSE, 4, |_| {})
            .unwrap();
        let plain = filter.on(&demux, EXPOSE, |_| {}).unwrap();
        assert_eq!(filter.len(), 2);

        drop(a);
        assert_eq!(filter.keyed_route_count(), 1);
        drop(b);
        assert_eq!(filter.keyed_route_count(), 0);
        assert_eq!(filter.len(), 1);
        assert!(filter.is_attached());

        drop(plain);
        assert!(!filter.is_attached());
        assert!(demux.is_empty());

        // Keyed routes come back on demand.
        let again = filter
            .on_key::<ExposeWindow, _>(&demux, EXPOSE, 2, |_| {})
            .unwrap();
        assert!(filter.is_attached());
        assert_eq!(filter.keyed_route_count(), 1);
        drop(again);
        assert_eq!(filter.keyed_route_count(), 0);
        assert!(demux.is_empty());
    }

    #[test]
    fn keyed_once_detaches_during_dispatch() {
        let demux = EventDemux::<TestEvent>::new();
        let filter = even_windows();
        let seen: Log<u32> = log();
        let s = seen.clone();
        filter
            .on_key_with::<ExposeWindow, _>(&demux, EXPOSE, 4, ConnectFlags::ONCE, move |e| {
                s.borrow_mut().push(e.window);
            })
            .unwrap()
            .release();

        demux.emit(&TestEvent::expose(2));
        demux.emit(&TestEvent::expose(4));
        demux.emit(&TestEvent::expose(4));
        assert_eq!(*seen.borrow(), [4]);
        assert_eq!(filter.keyed_route_count(), 0);
        assert!(!filter.is_attached());
        assert!(demux.is_empty());
    }

    #[test]
    fn dropping_the_filter_releases_the_route() {
        let demux = EventDemux::<TestEvent>::new();
        let filter = even_windows();
        let conn = filter.on(&demux, EXPOSE, |_| {}).unwrap();
        drop(filter);
        assert!(demux.is_empty());
        assert!(!conn.connected());
    }
}
