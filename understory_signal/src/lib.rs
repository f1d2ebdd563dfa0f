// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_signal --heading-base-level=0

//! Understory Signal: single-threaded signals with movable connection handles.
//!
//! A [`Signal`] holds an ordered list of subscribers. Emitting it calls every
//! subscriber with a shared reference to the arguments and folds their results
//! through a [`Reduce`] policy, which may also remove the current subscriber or
//! stop the pass early.
//!
//! - Subscribers are plain closures; there is no receiver object to inherit from.
//! - Connecting returns a [`Connection`]. Handles move but do not clone, and
//!   dropping one disconnects its subscriber. [`Connection::release`] keeps the
//!   subscriber alive for as long as the signal lives.
//! - Subscribers may connect, disconnect, clear, or emit again from inside a
//!   running pass. The list stays consistent and no subscriber is skipped
//!   because another one was removed.
//! - An optional on-empty callback fires when the last subscriber goes away,
//!   which lets owners tear down resources that only exist while someone listens.
//!
//! ## API overview
//!
//! - [`Signal::append`] / [`Signal::prepend`] / [`Signal::connect`] → [`Connection`]
//! - [`Signal::append_void`] / [`Signal::connect_void`] add subscribers that
//!   return nothing to a signal whose other subscribers return values.
//! - [`Signal::emit`] uses the signal's policy; [`Signal::emit_with`] picks one per call.
//! - [`Signal::clear`], [`Signal::len`], [`Signal::is_empty`].
//! - [`ConnectFlags`]: `ONCE` and `PREPEND`.
//! - Policies: [`ReduceVoid`] (default), [`UseLast`], [`Collect`], [`UntilTrue`],
//!   [`RetainWhile`], or any type implementing [`Reduce`].
//!
//! ## Example
//!
//! ```rust
//! use understory_signal::{Signal, UntilTrue};
//!
//! // Key handlers: the first one that returns `true` consumes the key.
//! let keys: Signal<char, bool, UntilTrue> = Signal::new();
//! let _quit = keys.append(|c| *c == 'q');
//! let _help = keys.append(|c| *c == '?');
//!
//! assert!(keys.emit(&'q'));
//! assert!(!keys.emit(&'x'));
//! ```
//!
//! Signals are `!Send` and `!Sync`; they are meant to live on one thread, such
//! as an event loop.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod connection;
mod list;
mod reduce;
mod signal;
mod types;

pub use connection::Connection;
pub use reduce::{Collect, Outcome, Reduce, ReduceVoid, RetainWhile, UntilTrue, UseLast};
pub use signal::Signal;
pub use types::ConnectFlags;
