// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_event_demux --heading-base-level=0

//! Understory Event Demux: route one raw event stream to many typed signals.
//!
//! Window systems deliver a single stream of events tagged with a small integer
//! code. Most consumers only care about a few codes, and often only about events
//! for one window. [`EventDemux`] keeps one [`Signal`](understory_signal::Signal)
//! per code, and optionally one per value of a payload field, so that:
//!
//! - subscribers receive a typed payload instead of the raw event;
//! - an event for window 34 never wakes subscribers of window 12;
//! - routes exist only while someone listens. They are created on the first
//!   subscription and erased, cascading upward, when the last one leaves.
//!
//! The protocol layer plugs in through three traits:
//!
//! - [`RawEvent`]: reads the code of a raw event.
//! - [`Payload`]: typed view of a raw event for one code.
//! - [`KeyField`]: names the payload field keyed routes split on.
//!
//! ## API overview
//!
//! - [`EventDemux::on`] / [`EventDemux::on_with`]: subscribe to a code.
//! - [`EventDemux::on_key`] / [`EventDemux::on_key_with`]: subscribe to a code and key.
//! - [`EventDemux::emit`]: dispatch by the (masked) code; [`EventDemux::emit_code`]
//!   dispatches with an explicit code.
//! - [`Filter`]: a predicate-filtered signal that attaches to a route on demand,
//!   optionally split by key with [`Filter::on_key`].
//! - [`DemuxConfig`]: the discriminant mask.
//! - [`DemuxError`]: a code subscribed with two different payload types.
//!
//! Emitting an event nobody listens to is a silent no-op. Subscriptions are
//! [`Connection`](understory_signal::Connection)s and follow the signal rules:
//! dropping one unsubscribes, and subscribers may unsubscribe or subscribe from
//! inside a dispatch.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod config;
mod demux;
mod error;
mod event;
mod filter;
mod keyed;

#[cfg(test)]
mod testing;

pub use config::DemuxConfig;
pub use demux::EventDemux;
pub use error::DemuxError;
pub use event::{KeyField, Payload, RawEvent};
pub use filter::Filter;
