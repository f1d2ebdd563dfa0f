// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The event demultiplexer.

use alloc::rc::{Rc, Weak};
use core::any::{Any, TypeId, type_name};
use core::cell::{Cell, RefCell};

use hashbrown::HashMap;
use understory_signal::{ConnectFlags, Connection, Signal};

use crate::keyed::{KeyedRoute, KeyedRoutes};
use crate::{DemuxConfig, DemuxError, KeyField, Payload, RawEvent};

/// Type-erased plain route, stored per discriminant.
trait Route<E> {
    fn dispatch(&self, raw: &E);
    fn payload_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

/// Plain route: one signal for every event of a discriminant, viewed as `P`.
struct PlainRoute<P: 'static> {
    signal: Signal<P>,
}

impl<E: 'static, P: Payload<E>> Route<E> for PlainRoute<P> {
    fn dispatch(&self, raw: &E) {
        match P::view(raw) {
            Some(payload) => self.signal.emit(payload),
            None => tracing::trace!(payload = type_name::<P>(), "event has no view as payload"),
        }
    }

    fn payload_name(&self) -> &'static str {
        type_name::<P>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct RouteEntry<E: 'static> {
    serial: u64,
    route: Rc<dyn Route<E>>,
}

struct Inner<E: 'static> {
    config: DemuxConfig,
    routes: RefCell<HashMap<u8, RouteEntry<E>>>,
    keyed: KeyedRoutes<(u8, TypeId)>,
    next_serial: Cell<u64>,
}

impl<E: 'static> Inner<E> {
    fn serial(&self) -> u64 {
        let serial = self.next_serial.get();
        self.next_serial.set(serial + 1);
        serial
    }

    fn erase_route(&self, code: u8, serial: u64) {
        let removed = {
            let mut routes = self.routes.borrow_mut();
            let current = routes.get(&code).is_some_and(|e| e.serial == serial);
            if current { routes.remove(&code) } else { None }
        };
        if removed.is_some() {
            tracing::debug!(code, "erased route");
        }
        drop(removed);
    }

    fn erase_keyed(&self, id: (u8, TypeId), serial: u64) {
        if self.keyed.erase(id, serial) {
            tracing::debug!(code = id.0, "erased keyed route");
        }
    }
}

/// Routes raw events of type `E` to typed signals, by discriminant and
/// optionally by a key field of the payload.
///
/// Routes are created on first subscription and erased when their last
/// subscriber leaves; an idle demux holds no signals. Cloning the demux yields
/// another handle to the same routes.
///
/// ## Example
///
/// ```rust
/// use core::cell::Cell;
/// use std::rc::Rc;
/// use understory_event_demux::{EventDemux, KeyField, RawEvent};
///
/// enum Event {
///     Key { window: u32, code: u8 },
///     Close { window: u32 },
/// }
///
/// impl RawEvent for Event {
///     fn discriminant(&self) -> u8 {
///         match self {
///             Event::Key { .. } => 2,
///             Event::Close { .. } => 33,
///         }
///     }
/// }
///
/// struct Window;
///
/// impl KeyField<Event> for Window {
///     type Key = u32;
///     fn key(event: &Event) -> u32 {
///         match event {
///             Event::Key { window, .. } | Event::Close { window } => *window,
///         }
///     }
/// }
///
/// let demux = EventDemux::<Event>::new();
/// let closed = Rc::new(Cell::new(0));
/// let c = closed.clone();
/// let conn = demux
///     .on_key::<Event, Window>(33, 7, move |_| c.set(c.get() + 1))
///     .unwrap();
///
/// demux.emit(&Event::Close { window: 8 });
/// demux.emit(&Event::Close { window: 7 });
/// demux.emit(&Event::Key { window: 7, code: 24 });
/// assert_eq!(closed.get(), 1);
///
/// drop(conn);
/// assert!(demux.is_empty());
/// ```
pub struct EventDemux<E: 'static> {
    inner: Rc<Inner<E>>,
}

impl<E: 'static> EventDemux<E> {
    /// Create a demux with the default [`DemuxConfig`].
    pub fn new() -> Self {
        Self::with_config(DemuxConfig::default())
    }

    /// Create a demux with an explicit configuration.
    pub fn with_config(config: DemuxConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                config,
                routes: RefCell::new(HashMap::new()),
                keyed: KeyedRoutes::new(),
                next_serial: Cell::new(0),
            }),
        }
    }

    /// The configuration this demux was built with.
    pub fn config(&self) -> DemuxConfig {
        self.inner.config
    }

    /// Subscribe to every event with discriminant `code`, viewed as `P`.
    ///
    /// Fails if `code` already routes a different payload type.
    pub fn on<P: Payload<E>>(
        &self,
        code: u8,
        f: impl Fn(&P) + 'static,
    ) -> Result<Connection, DemuxError> {
        self.on_with(code, ConnectFlags::DEFAULT, f)
    }

    /// Like [`EventDemux::on`], with explicit [`ConnectFlags`].
    pub fn on_with<P: Payload<E>>(
        &self,
        code: u8,
        flags: ConnectFlags,
        f: impl Fn(&P) + 'static,
    ) -> Result<Connection, DemuxError> {
        let route = self.route::<P>(code)?;
        let Some(route) = route.as_any().downcast_ref::<PlainRoute<P>>() else {
            unreachable!("route payload checked on lookup");
        };
        Ok(route.signal.connect(f, flags))
    }

    /// Subscribe to events with discriminant `code` whose field `F` equals `key`.
    ///
    /// Subscribers of other keys are not invoked, and finding a key is a single map
    /// lookup however many keys are registered.
    pub fn on_key<P: Payload<E>, F: KeyField<P>>(
        &self,
        code: u8,
        key: F::Key,
        f: impl Fn(&P) + 'static,
    ) -> Result<Connection, DemuxError> {
        self.on_key_with::<P, F>(code, key, ConnectFlags::DEFAULT, f)
    }

    /// Like [`EventDemux::on_key`], with explicit [`ConnectFlags`].
    pub fn on_key_with<P: Payload<E>, F: KeyField<P>>(
        &self,
        code: u8,
        key: F::Key,
        flags: ConnectFlags,
        f: impl Fn(&P) + 'static,
    ) -> Result<Connection, DemuxError> {
        let route = self.keyed_route::<P, F>(code)?;
        Ok(route.connect(key, f, flags))
    }

    /// Dispatch `raw` to the route of its masked discriminant.
    ///
    /// Events nobody listens to are dropped.
    pub fn emit(&self, raw: &E)
    where
        E: RawEvent,
    {
        let code = self.inner.config.apply(raw.discriminant());
        self.emit_code(code, raw);
    }

    /// Dispatch `raw` to the route of `code`, ignoring its own discriminant.
    ///
    /// The mask is not applied.
    pub fn emit_code(&self, code: u8, raw: &E) {
        let route = self
            .inner
            .routes
            .borrow()
            .get(&code)
            .map(|entry| Rc::clone(&entry.route));
        match route {
            Some(route) => route.dispatch(raw),
            None => tracing::trace!(code, "no route for event"),
        }
    }

    /// Number of live plain routes (one per subscribed discriminant).
    pub fn route_count(&self) -> usize {
        self.inner.routes.borrow().len()
    }

    /// Number of live keyed routes.
    pub fn keyed_route_count(&self) -> usize {
        self.inner.keyed.len()
    }

    /// Whether no route is live.
    pub fn is_empty(&self) -> bool {
        self.inner.routes.borrow().is_empty() && self.inner.keyed.is_empty()
    }

    /// Find or create the plain route of `code`.
    fn route<P: Payload<E>>(&self, code: u8) -> Result<Rc<dyn Route<E>>, DemuxError> {
        let mut routes = self.inner.routes.borrow_mut();
        if let Some(entry) = routes.get(&code) {
            if entry.route.as_any().is::<PlainRoute<P>>() {
                return Ok(Rc::clone(&entry.route));
            }
            return Err(DemuxError::PayloadMismatch {
                code,
                expected: entry.route.payload_name(),
                found: type_name::<P>(),
            });
        }

        let serial = self.inner.serial();
        let demux = Rc::downgrade(&self.inner);
        let route: Rc<dyn Route<E>> = Rc::new(PlainRoute::<P> {
            signal: Signal::with_on_empty(move || {
                if let Some(inner) = demux.upgrade() {
                    inner.erase_route(code, serial);
                }
            }),
        });
        routes.insert(
            code,
            RouteEntry {
                serial,
                route: Rc::clone(&route),
            },
        );
        tracing::debug!(code, payload = type_name::<P>(), "created route");
        Ok(route)
    }

    /// Find or create the keyed route for `(code, F)`.
    fn keyed_route<P: Payload<E>, F: KeyField<P>>(
        &self,
        code: u8,
    ) -> Result<Rc<KeyedRoute<P, F>>, DemuxError> {
        let id = (code, TypeId::of::<KeyedRoute<P, F>>());
        if let Some(route) = self.inner.keyed.get::<P, F>(id) {
            return Ok(route);
        }

        let serial = self.inner.keyed.reserve();
        let demux: Weak<Inner<E>> = Rc::downgrade(&self.inner);
        let route = Rc::new(KeyedRoute::<P, F>::new(move || {
            if let Some(inner) = demux.upgrade() {
                inner.erase_keyed(id, serial);
            }
        }));
        let weak = Rc::downgrade(&route);
        // Subscribe upstream before registering, so a mismatch leaves no trace.
        let upstream = self.on::<P>(code, move |payload| {
            if let Some(route) = weak.upgrade() {
                route.dispatch(payload);
            }
        })?;
        route.attach(upstream);
        self.inner.keyed.insert(id, serial, &route);
        tracing::debug!(code, field = type_name::<F>(), "created keyed route");
        Ok(route)
    }
}

impl<E: 'static> Clone for EventDemux<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: 'static> Default for EventDemux<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> core::fmt::Debug for EventDemux<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventDemux")
            .field("config", &self.inner.config)
            .field("routes", &self.route_count())
            .field("keyed_routes", &self.keyed_route_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        EXPOSE, Expose, ExposeWindow, KEY_PRESS, KeyDetail, KeyPress, KeyWindow, Log, TestEvent,
        log,
    };
    use alloc::format;
    use alloc::vec::Vec;

    #[test]
    fn plain_route_receives_typed_payloads() {
        let demux = EventDemux::<TestEvent>::new();
        let seen = log();
        let s = seen.clone();
        let _conn = demux
            .on::<KeyPress>(KEY_PRESS, move |k| s.borrow_mut().push((k.window, k.detail)))
            .unwrap();

        demux.emit(&TestEvent::key(1, 38));
        demux.emit(&TestEvent::expose(1));
        demux.emit(&TestEvent::key(2, 40));
        assert_eq!(*seen.borrow(), [(1, 38), (2, 40)]);
        assert_eq!(demux.route_count(), 1);
    }

    #[test]
    fn raw_event_is_its_own_payload() {
        let demux = EventDemux::<TestEvent>::new();
        let seen = log();
        let s = seen.clone();
        let _conn = demux
            .on::<TestEvent>(EXPOSE, move |e| s.borrow_mut().push(e.clone()))
            .unwrap();
        demux.emit(&TestEvent::expose(9));
        assert_eq!(*seen.borrow(), [TestEvent::expose(9)]);
    }

    #[test]
    fn keyed_routes_isolate_keys() {
        let demux = EventDemux::<TestEvent>::new();
        let seen = log();
        let s = seen.clone();
        let _w34 = demux
            .on_key::<KeyPress, KeyWindow>(KEY_PRESS, 34, move |k| {
                s.borrow_mut().push(("34", k.window));
            })
            .unwrap();
        let s = seen.clone();
        let _w12 = demux
            .on_key::<KeyPress, KeyWindow>(KEY_PRESS, 12, move |k| {
                s.borrow_mut().push(("12", k.window));
            })
            .unwrap();

        demux.emit(&TestEvent::key(34, 0));
        assert_eq!(*seen.borrow(), [("34", 34)]);
        demux.emit(&TestEvent::key(99, 0));
        demux.emit(&TestEvent::key(12, 0));
        assert_eq!(*seen.borrow(), [("34", 34), ("12", 12)]);
        assert_eq!(demux.keyed_route_count(), 1);
    }

    #[test]
    fn removing_the_last_keyed_subscriber_cascades() {
        let demux = EventDemux::<TestEvent>::new();
        let a = demux
            .on_key::<KeyPress, KeyWindow>(KEY_PRESS, 34, |_| {})
            .unwrap();
        let b = demux
            .on_key::<KeyPress, KeyWindow>(KEY_PRESS, 34, |_| {})
            .unwrap();
        let c = demux
            .on_key::<KeyPress, KeyWindow>(KEY_PRESS, 12, |_| {})
            .unwrap();
        assert_eq!(demux.route_count(), 1);
        assert_eq!(demux.keyed_route_count(), 1);

        drop(a);
        drop(c);
        assert_eq!(demux.keyed_route_count(), 1);
        drop(b);
        assert_eq!(demux.keyed_route_count(), 0);
        assert_eq!(demux.route_count(), 0);
        assert!(demux.is_empty());

        // Emitting after teardown is a silent no-op.
        demux.emit(&TestEvent::key(34, 0));
    }

    #[test]
    fn plain_subscriber_keeps_the_route_alive_after_keyed_teardown() {
        let demux = EventDemux::<TestEvent>::new();
        let hits = log();
        let h = hits.clone();
        let _plain = demux
            .on::<KeyPress>(KEY_PRESS, move |_| h.borrow_mut().push("plain"))
            .unwrap();
        let h = hits.clone();
        let keyed = demux
            .on_key::<KeyPress, KeyWindow>(KEY_PRESS, 1, move |_| {
                h.borrow_mut().push("keyed");
            })
            .unwrap();

        demux.emit(&TestEvent::key(1, 0));
        assert_eq!(*hits.borrow(), ["plain", "keyed"]);

        drop(keyed);
        assert_eq!(demux.keyed_route_count(), 0);
        assert_eq!(demux.route_count(), 1);
        demux.emit(&TestEvent::key(1, 0));
        assert_eq!(*hits.borrow(), ["plain", "keyed", "plain"]);
    }

    #[test]
    fn distinct_key_fields_get_distinct_routes() {
        let demux = EventDemux::<TestEvent>::new();
        let seen = log();
        let s = seen.clone();
        let _by_window = demux
            .on_key::<KeyPress, KeyWindow>(KEY_PRESS, 5, move |_| {
                s.borrow_mut().push("window");
            })
            .unwrap();
        let s = seen.clone();
        let _by_detail = demux
            .on_key::<KeyPress, KeyDetail>(KEY_PRESS, 5, move |_| {
                s.borrow_mut().push("detail");
            })
            .unwrap();
        assert_eq!(demux.keyed_route_count(), 2);
        assert_eq!(demux.route_count(), 1);

        demux.emit(&TestEvent::key(5, 9));
        demux.emit(&TestEvent::key(9, 5));
        assert_eq!(*seen.borrow(), ["window", "detail"]);
    }

    #[test]
    fn payload_mismatch_is_rejected() {
        let demux = EventDemux::<TestEvent>::new();
        let _conn = demux.on::<KeyPress>(KEY_PRESS, |_| {}).unwrap();

        let err = demux.on::<Expose>(KEY_PRESS, |_| {}).unwrap_err();
        assert!(matches!(
            err,
            DemuxError::PayloadMismatch { code: KEY_PRESS, .. }
        ));
        let text = format!("{err}");
        assert!(text.contains("KeyPress") && text.contains("Expose"), "{text}");

        let keyed = demux.on_key::<Expose, ExposeWindow>(KEY_PRESS, 1, |_| {});
        assert!(keyed.is_err());
        assert_eq!(demux.route_count(), 1);
        assert_eq!(demux.keyed_route_count(), 0);
    }

    #[test]
    fn absent_routes_are_ignored() {
        let demux = EventDemux::<TestEvent>::new();
        demux.emit(&TestEvent::key(1, 1));
        demux.emit_code(200, &TestEvent::expose(1));
        assert!(demux.is_empty());
    }

    #[test]
    fn mask_folds_sent_events() {
        let sent = TestEvent::KeyPress(KeyPress {
            window: 3,
            detail: 1,
            sent: true,
        });

        let plain = EventDemux::<TestEvent>::new();
        let masked =
            EventDemux::<TestEvent>::with_config(DemuxConfig::new().discriminant_mask(0x7F));
        let seen: Log<&str> = log();
        let s = seen.clone();
        let _p = plain
            .on::<KeyPress>(KEY_PRESS, move |_| s.borrow_mut().push("plain"))
            .unwrap();
        let s = seen.clone();
        let _m = masked
            .on::<KeyPress>(KEY_PRESS, move |_| s.borrow_mut().push("masked"))
            .unwrap();

        plain.emit(&sent);
        masked.emit(&sent);
        assert_eq!(*seen.borrow(), ["masked"]);
    }

    #[test]
    fn emit_code_overrides_the_discriminant() {
        let demux = EventDemux::<TestEvent>::new();
        let hits = log();
        let h = hits.clone();
        let _conn = demux
            .on::<TestEvent>(100, move |_| h.borrow_mut().push(()))
            .unwrap();
        demux.emit(&TestEvent::expose(1));
        demux.emit_code(100, &TestEvent::expose(1));
        assert_eq!(hits.borrow().len(), 1);
    }

    #[test]
    fn once_subscription_tears_its_route_down() {
        let demux = EventDemux::<TestEvent>::new();
        let hits = log();
        let h = hits.clone();
        demux
            .on_with::<Expose>(EXPOSE, ConnectFlags::ONCE, move |e| {
                h.borrow_mut().push(e.window);
            })
            .unwrap()
            .release();
        demux.emit(&TestEvent::expose(4));
        demux.emit(&TestEvent::expose(5));
        assert_eq!(*hits.borrow(), [4]);
        assert!(demux.is_empty());
    }

    #[test]
    fn subscribing_from_inside_a_dispatch() {
        let demux = EventDemux::<TestEvent>::new();
        let late: Log<Connection> = log();
        let hits = log();
        let _outer = {
            let demux2 = demux.clone();
            let late = late.clone();
            let hits = hits.clone();
            demux
                .on::<Expose>(EXPOSE, move |e| {
                    let hits = hits.clone();
                    let conn = demux2
                        .on_key::<Expose, ExposeWindow>(EXPOSE, e.window, move |e| {
                            hits.borrow_mut().push(e.window);
                        })
                        .unwrap();
                    late.borrow_mut().push(conn);
                })
                .unwrap()
        };
        // The keyed upstream appended by the first pass is reached by that pass.
        demux.emit(&TestEvent::expose(7));
        assert_eq!(*hits.borrow(), [7]);
        demux.emit(&TestEvent::expose(7));
        assert_eq!(*hits.borrow(), [7, 7, 7]);
        assert_eq!(demux.keyed_route_count(), 1);

        let late: Vec<_> = late.borrow_mut().drain(..).collect();
        drop(late);
        assert_eq!(demux.keyed_route_count(), 0);
        assert_eq!(demux.route_count(), 1);
    }

    #[test]
    fn debug_reports_counts() {
        let demux = EventDemux::<TestEvent>::new();
        let _conn = demux.on::<Expose>(EXPOSE, |_| {}).unwrap();
        let text = format!("{demux:?}");
        assert!(text.contains("routes: 1"), "{text}");
    }
}
