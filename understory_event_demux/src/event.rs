// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Seams where a protocol layer plugs into the demultiplexer.
//!
//! The demux never interprets event bytes. A protocol crate describes its raw
//! event type with [`RawEvent`], the typed views routes hand to subscribers with
//! [`Payload`], and the fields keyed routes split on with [`KeyField`].

use core::hash::Hash;

/// A raw event as read from the source.
pub trait RawEvent {
    /// Integer code selecting the route, before masking.
    fn discriminant(&self) -> u8;
}

/// Typed view of a raw event `E`.
///
/// A route registered for payload `P` hands `P::view(raw)` to its subscribers.
/// Returning `None` skips the event for that route.
///
/// Every [`RawEvent`] is its own payload, so subscribers may always take the raw
/// event.
pub trait Payload<E: ?Sized>: 'static {
    /// View `raw` as `Self`.
    fn view(raw: &E) -> Option<&Self>;
}

impl<E: RawEvent + 'static> Payload<E> for E {
    fn view(raw: &E) -> Option<&Self> {
        Some(raw)
    }
}

/// Names one field of payload `P` that keyed routes split on.
///
/// Implement it on a zero-sized marker type; each marker gets its own keyed route,
/// so two fields of the same payload never share subscribers.
///
/// ```
/// use understory_event_demux::KeyField;
///
/// struct Expose {
///     window: u32,
/// }
///
/// /// `Expose::window`.
/// struct ExposeWindow;
///
/// impl KeyField<Expose> for ExposeWindow {
///     type Key = u32;
///     fn key(payload: &Expose) -> u32 {
///         payload.window
///     }
/// }
///
/// assert_eq!(ExposeWindow::key(&Expose { window: 7 }), 7);
/// ```
pub trait KeyField<P: ?Sized>: 'static {
    /// Field value used as the map key.
    type Key: Hash + Eq + Clone + 'static;

    /// Read the field from `payload`.
    fn key(payload: &P) -> Self::Key;
}
