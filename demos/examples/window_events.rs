// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Window events: a scripted window-system event stream routed through a demux.
//!
//! This example shows how to:
//! - describe a protocol's events with `RawEvent`, `Payload` and `KeyField`,
//! - subscribe per window with keyed routes,
//! - carve a "close requested" signal out of client messages with a `Filter`,
//!   and key it by window,
//! - let routes tear themselves down as windows go away.
//!
//! Run:
//! - `cargo run -p understory_examples --example window_events`

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{Level, info};
use understory_event_demux::{DemuxConfig, EventDemux, Filter, KeyField, Payload, RawEvent};
use understory_signal::{ConnectFlags, Connection, Signal, UntilTrue};

const KEY_PRESS: u8 = 2;
const EXPOSE: u8 = 12;
const CLIENT_MESSAGE: u8 = 33;
/// Set on events another client sent on our behalf.
const SENT_BIT: u8 = 0x80;

const WM_PROTOCOLS: u32 = 300;
const WM_DELETE_WINDOW: u32 = 301;

#[derive(Debug)]
struct KeyPress {
    window: u32,
    keycode: u8,
}

#[derive(Debug)]
struct Expose {
    window: u32,
    width: u16,
    height: u16,
}

#[derive(Debug)]
struct ClientMessage {
    window: u32,
    kind: u32,
    data: [u32; 2],
}

#[derive(Debug)]
enum Event {
    KeyPress(KeyPress),
    Expose(Expose),
    ClientMessage { sent: bool, message: ClientMessage },
}

impl RawEvent for Event {
    fn discriminant(&self) -> u8 {
        match self {
            Self::KeyPress(_) => KEY_PRESS,
            Self::Expose(_) => EXPOSE,
            Self::ClientMessage { sent: true, .. } => CLIENT_MESSAGE | SENT_BIT,
            Self::ClientMessage { sent: false, .. } => CLIENT_MESSAGE,
        }
    }
}

impl Payload<Event> for KeyPress {
    fn view(raw: &Event) -> Option<&Self> {
        match raw {
            Event::KeyPress(k) => Some(k),
            _ => None,
        }
    }
}

impl Payload<Event> for Expose {
    fn view(raw: &Event) -> Option<&Self> {
        match raw {
            Event::Expose(e) => Some(e),
            _ => None,
        }
    }
}

impl Payload<Event> for ClientMessage {
    fn view(raw: &Event) -> Option<&Self> {
        match raw {
            Event::ClientMessage { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// `KeyPress::window`.
struct KeyWindow;

impl KeyField<KeyPress> for KeyWindow {
    type Key = u32;
    fn key(payload: &KeyPress) -> u32 {
        payload.window
    }
}

/// `Expose::window`.
struct ExposeWindow;

impl KeyField<Expose> for ExposeWindow {
    type Key = u32;
    fn key(payload: &Expose) -> u32 {
        payload.window
    }
}

/// `ClientMessage::window`.
struct MessageWindow;

impl KeyField<ClientMessage> for MessageWindow {
    type Key = u32;
    fn key(payload: &ClientMessage) -> u32 {
        payload.window
    }
}

type Windows = RefCell<Vec<Window>>;

/// A top-level window and its subscriptions.
struct Window {
    id: u32,
    subscriptions: Vec<Connection>,
}

impl Window {
    fn open(
        id: u32,
        demux: &EventDemux<Event>,
        shortcuts: &Rc<Signal<u8, bool, UntilTrue>>,
        close_requested: &Filter<ClientMessage>,
        windows: Weak<Windows>,
    ) -> Self {
        let repaint = demux
            .on_key::<Expose, ExposeWindow>(EXPOSE, id, move |e| {
                info!(window = id, width = e.width, height = e.height, "repaint");
            })
            .expect("expose routes carry Expose");
        let shortcuts = Rc::clone(shortcuts);
        let typing = demux
            .on_key::<KeyPress, KeyWindow>(KEY_PRESS, id, move |k| {
                if !shortcuts.emit(&k.keycode) {
                    info!(window = id, keycode = k.keycode, "typed");
                }
            })
            .expect("key routes carry KeyPress");
        let close = close_requested
            .on_key::<MessageWindow, _>(demux, CLIENT_MESSAGE, id, move |_| {
                let Some(windows) = windows.upgrade() else {
                    return;
                };
                // Dropping the window disconnects its subscriptions mid-dispatch.
                let closed: Vec<Window> = {
                    let mut windows = windows.borrow_mut();
                    let (closed, open) = windows.drain(..).partition(|w| w.id == id);
                    *windows = open;
                    closed
                };
                drop(closed);
            })
            .expect("client-message routes carry ClientMessage");
        info!(window = id, "opened");
        Self {
            id,
            subscriptions: vec![repaint, typing, close],
        }
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        info!(window = self.id, subscriptions = self.subscriptions.len(), "closed");
    }
}

fn main() {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    // Fold events sent by other clients onto the plain codes.
    let demux =
        EventDemux::<Event>::with_config(DemuxConfig::new().discriminant_mask(!SENT_BIT));

    // Application-wide shortcuts; the first handler returning `true` consumes the key.
    let shortcuts: Rc<Signal<u8, bool, UntilTrue>> = Rc::new(Signal::new());
    let _help = shortcuts.append(|keycode| {
        let handled = *keycode == 67;
        if handled {
            info!("help requested");
        }
        handled
    });

    // Close requests: client messages of kind WM_PROTOCOLS carrying WM_DELETE_WINDOW.
    let close_requested = Filter::<ClientMessage>::new(|m| {
        m.kind == WM_PROTOCOLS && m.data[0] == WM_DELETE_WINDOW
    });

    let windows: Rc<Windows> = Rc::new(RefCell::new(Vec::new()));
    for id in [34, 12] {
        let window = Window::open(
            id,
            &demux,
            &shortcuts,
            &close_requested,
            Rc::downgrade(&windows),
        );
        windows.borrow_mut().push(window);
    }

    // The first key press anywhere is logged once.
    demux
        .on_with::<KeyPress>(KEY_PRESS, ConnectFlags::ONCE, |k| {
            info!(window = k.window, "first key press");
        })
        .expect("key routes carry KeyPress")
        .release();

    let script = [
        Event::Expose(Expose {
            window: 34,
            width: 640,
            height: 480,
        }),
        Event::KeyPress(KeyPress {
            window: 34,
            keycode: 38,
        }),
        Event::KeyPress(KeyPress {
            window: 12,
            keycode: 67,
        }),
        Event::ClientMessage {
            sent: true,
            message: ClientMessage {
                window: 34,
                kind: WM_PROTOCOLS,
                data: [WM_DELETE_WINDOW, 0],
            },
        },
        // Window 34 is gone; nobody listens to its keys any more.
        Event::KeyPress(KeyPress {
            window: 34,
            keycode: 39,
        }),
        Event::Expose(Expose {
            window: 12,
            width: 320,
            height: 200,
        }),
        Event::ClientMessage {
            sent: false,
            message: ClientMessage {
                window: 12,
                kind: WM_PROTOCOLS,
                data: [WM_DELETE_WINDOW, 0],
            },
        },
    ];

    for event in &script {
        demux.emit(event);
        info!(
            routes = demux.route_count(),
            keyed = demux.keyed_route_count(),
            "dispatched"
        );
    }

    assert!(windows.borrow().is_empty());
    assert!(demux.is_empty() && !close_requested.is_attached());
    info!(?demux, ?close_requested, "done");
}
