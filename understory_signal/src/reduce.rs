// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reduce policies: fold subscriber results and steer the pass.
//!
//! A fresh policy is created (via [`Default`]) for every emit. It sees each
//! subscriber's return value in visiting order (or a [`Reduce::skip`] for
//! subscribers that return nothing) and answers with an [`Outcome`]:
//!
//! - [`Outcome::Continue`]: keep going.
//! - [`Outcome::Remove`]: unlink the subscriber that produced the value, then keep going.
//! - [`Outcome::Stop`]: end the pass immediately; later subscribers are not invoked.
//!
//! When the pass ends, [`Reduce::finish`] turns the accumulated state into the
//! value returned by `emit`.
//!
//! ## Custom policies
//!
//! ```
//! use understory_signal::{Outcome, Reduce, Signal};
//!
//! /// Sum results until the running total reaches a limit.
//! #[derive(Default)]
//! struct SumUpTo10(u32);
//!
//! impl Reduce<u32> for SumUpTo10 {
//!     type Output = u32;
//!     fn reduce(&mut self, value: u32) -> Outcome {
//!         self.0 += value;
//!         if self.0 >= 10 { Outcome::Stop } else { Outcome::Continue }
//!     }
//!     fn finish(self) -> u32 {
//!         self.0
//!     }
//! }
//!
//! let signal: Signal<u32, u32, SumUpTo10> = Signal::new();
//! for _ in 0..5 {
//!     signal.append(|x| *x).release();
//! }
//! assert_eq!(signal.emit(&4), 12);
//! ```

use alloc::vec::Vec;

/// Decision returned by a [`Reduce`] policy for one subscriber result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Continue with the next subscriber.
    Continue,
    /// Remove the subscriber that produced this result, then continue.
    Remove,
    /// Stop the pass; remaining subscribers are skipped.
    Stop,
}

/// Per-emit accumulator over subscriber results of type `R`.
pub trait Reduce<R>: Default {
    /// Aggregate returned by `emit`.
    type Output;

    /// Fold one subscriber result and decide how the pass proceeds.
    fn reduce(&mut self, value: R) -> Outcome;

    /// A void subscriber ran and produced no result.
    fn skip(&mut self) -> Outcome {
        Outcome::Continue
    }

    /// Produce the aggregate once the pass has ended.
    fn finish(self) -> Self::Output;
}

/// Ignore results and always continue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReduceVoid;

impl<R> Reduce<R> for ReduceVoid {
    type Output = ();

    fn reduce(&mut self, _value: R) -> Outcome {
        Outcome::Continue
    }

    fn finish(self) {}
}

/// Keep the result of the last subscriber that produced one.
///
/// Yields `None` when no valued subscriber ran.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UseLast<R>(Option<R>);

impl<R> Default for UseLast<R> {
    fn default() -> Self {
        Self(None)
    }
}

impl<R> Reduce<R> for UseLast<R> {
    type Output = Option<R>;

    fn reduce(&mut self, value: R) -> Outcome {
        self.0 = Some(value);
        Outcome::Continue
    }

    fn finish(self) -> Option<R> {
        self.0
    }
}

/// Collect every result in visiting order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collect<R>(Vec<R>);

impl<R> Default for Collect<R> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<R> Reduce<R> for Collect<R> {
    type Output = Vec<R>;

    fn reduce(&mut self, value: R) -> Outcome {
        self.0.push(value);
        Outcome::Continue
    }

    fn finish(self) -> Vec<R> {
        self.0
    }
}

/// Stop at the first subscriber that returns `true` ("handled").
///
/// The aggregate reports whether any subscriber handled the emit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UntilTrue {
    handled: bool,
}

impl Reduce<bool> for UntilTrue {
    type Output = bool;

    fn reduce(&mut self, value: bool) -> Outcome {
        if value {
            self.handled = true;
            Outcome::Stop
        } else {
            Outcome::Continue
        }
    }

    fn finish(self) -> bool {
        self.handled
    }
}

/// Keep subscribers while they return `true`; a `false` result removes the
/// subscriber that returned it.
///
/// The aggregate is the number of subscribers removed by this emit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetainWhile {
    removed: usize,
}

impl Reduce<bool> for RetainWhile {
    type Output = usize;

    fn reduce(&mut self, keep: bool) -> Outcome {
        if keep {
            Outcome::Continue
        } else {
            self.removed += 1;
            Outcome::Remove
        }
    }

    fn finish(self) -> usize {
        self.removed
    }
}
