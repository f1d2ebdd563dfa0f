// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The [`Signal`] facade.
//!
//! ## Semantics
//!
//! - Subscribers run in list order: [`Signal::append`] adds at the tail,
//!   [`Signal::prepend`] at the head.
//! - Each emit creates a fresh [`Reduce`] policy and feeds it every result.
//!   Subscribers connected with [`Signal::append_void`] or [`Signal::connect_void`]
//!   produce no result; the policy sees [`Reduce::skip`] for them instead.
//!   [`Outcome::Remove`] and once-subscribers unlink the current node;
//!   [`Outcome::Stop`] ends the pass.
//! - Subscribers may connect, disconnect (themselves or others), clear, or emit
//!   again while a pass is running. Disconnected subscribers that the cursor has
//!   not reached yet are skipped. A subscriber connected during a pass may or may
//!   not run in that pass: appended nodes behind the cursor are reached,
//!   prepended ones are not.
//! - The on-empty callback fires once per transition from one or more
//!   subscribers to none, however they were removed. Dropping the signal does not
//!   fire it.
//!
//! If a subscriber panics, the list stays consistent: the pass is closed, a
//! once-subscriber that panicked is still removed, and the panic propagates to
//! the caller of `emit`.

use alloc::rc::{Rc, Weak};
use core::cell::RefCell;
use core::marker::PhantomData;

use crate::connection::{Connection, Disconnect};
use crate::list::{Callback, NodeKey, SignalList};
use crate::reduce::{Outcome, Reduce, ReduceVoid};
use crate::types::ConnectFlags;

/// Broadcast point for callbacks taking `&T` and returning `R`.
///
/// `P` is the default [`Reduce`] policy applied by [`Signal::emit`]. Several
/// arguments travel as a tuple.
///
/// ## Example
///
/// ```rust
/// use core::cell::RefCell;
/// use std::rc::Rc;
/// use understory_signal::{ConnectFlags, Signal};
///
/// let log = Rc::new(RefCell::new(Vec::new()));
/// let signal: Signal<(u32, &'static str)> = Signal::new();
///
/// let l = log.clone();
/// let _a = signal.append(move |(n, s)| l.borrow_mut().push(format!("a{n}{s}")));
/// let l = log.clone();
/// let _b = signal.connect(
///     move |(n, s)| l.borrow_mut().push(format!("b{n}{s}")),
///     ConnectFlags::PREPEND | ConnectFlags::ONCE,
/// );
///
/// signal.emit(&(1, "!"));
/// signal.emit(&(2, "?"));
/// assert_eq!(*log.borrow(), ["b1!", "a1!", "a2?"]);
/// ```
pub struct Signal<T: ?Sized + 'static, R: 'static = (), P: Reduce<R> = ReduceVoid> {
    /// `None` results come from void subscribers.
    list: Rc<RefCell<SignalList<T, Option<R>>>>,
    _policy: PhantomData<fn() -> P>,
}

impl<T: ?Sized + 'static, R: 'static, P: Reduce<R>> Signal<T, R, P> {
    /// Create a signal without an on-empty callback.
    pub fn new() -> Self {
        Self::from_list(SignalList::new(None))
    }

    /// Create a signal that calls `on_empty` whenever its last subscriber is removed.
    pub fn with_on_empty(on_empty: impl Fn() + 'static) -> Self {
        Self::from_list(SignalList::new(Some(Rc::new(on_empty))))
    }

    fn from_list(list: SignalList<T, Option<R>>) -> Self {
        Self {
            list: Rc::new(RefCell::new(list)),
            _policy: PhantomData,
        }
    }

    /// Add a subscriber at the tail.
    pub fn append(&self, f: impl Fn(&T) -> R + 'static) -> Connection {
        self.connect(f, ConnectFlags::DEFAULT)
    }

    /// Add a subscriber at the head.
    pub fn prepend(&self, f: impl Fn(&T) -> R + 'static) -> Connection {
        self.connect(f, ConnectFlags::PREPEND)
    }

    /// Add a subscriber with explicit [`ConnectFlags`].
    pub fn connect(&self, f: impl Fn(&T) -> R + 'static, flags: ConnectFlags) -> Connection {
        self.insert(Rc::new(move |args: &T| Some(f(args))), flags)
    }

    /// Add a subscriber that returns nothing at the tail.
    ///
    /// Its runs are reported to the policy through [`Reduce::skip`], so for
    /// example [`UseLast`](crate::UseLast) keeps the last real value.
    pub fn append_void(&self, f: impl Fn(&T) + 'static) -> Connection {
        self.connect_void(f, ConnectFlags::DEFAULT)
    }

    /// Like [`Signal::append_void`], with explicit [`ConnectFlags`].
    pub fn connect_void(&self, f: impl Fn(&T) + 'static, flags: ConnectFlags) -> Connection {
        self.insert(
            Rc::new(move |args: &T| -> Option<R> {
                f(args);
                None
            }),
            flags,
        )
    }

    fn insert(&self, callback: Callback<T, Option<R>>, flags: ConnectFlags) -> Connection {
        let once = flags.contains(ConnectFlags::ONCE);
        let key = {
            let mut list = self.list.borrow_mut();
            if flags.contains(ConnectFlags::PREPEND) {
                list.prepend(callback, once)
            } else {
                list.append(callback, once)
            }
        };
        let list = Rc::downgrade(&self.list);
        let list: Weak<dyn Disconnect> = list;
        Connection::new(list, key)
    }

    /// Invoke every subscriber with `args`, folding results with `P`.
    pub fn emit(&self, args: &T) -> P::Output {
        self.emit_with::<P>(args)
    }

    /// Invoke every subscriber with `args`, folding results with the policy `Q`
    /// instead of the signal's default.
    pub fn emit_with<Q: Reduce<R>>(&self, args: &T) -> Q::Output {
        let mut policy = Q::default();
        let mut pass = Pass::enter(Rc::clone(&self.list));
        let mut cursor = pass.list.borrow().head();
        while let Some(idx) = cursor {
            let visit = pass.list.borrow_mut().visit(idx);
            let Some((key, callback, once)) = visit else {
                cursor = pass.list.borrow().next_of(idx);
                continue;
            };
            if once {
                pass.pending = Some(key);
            }
            let outcome = match callback(args) {
                Some(value) => policy.reduce(value),
                None => policy.skip(),
            };
            pass.pending = None;

            let detached = {
                let mut list = pass.list.borrow_mut();
                cursor = list.next_of(idx);
                if once || outcome == Outcome::Remove {
                    list.remove(key)
                } else {
                    None
                }
            };
            if let Some(detached) = detached {
                detached.finish();
            }
            // The callback clone may be the last owner of a closure whose node was
            // unlinked meanwhile; it drops here, outside of any list borrow.
            drop(callback);
            if outcome == Outcome::Stop {
                tracing::trace!("signal pass stopped by reduce policy");
                break;
            }
        }
        drop(pass);
        policy.finish()
    }

    /// Remove every subscriber; fires on-empty once if any were connected.
    pub fn clear(&self) {
        let detached = self.list.borrow_mut().clear();
        if let Some(detached) = detached {
            tracing::debug!(removed = detached.len(), "cleared signal");
            detached.finish();
        }
    }

    /// Whether no subscriber is connected.
    pub fn is_empty(&self) -> bool {
        self.list.borrow().is_empty()
    }

    /// Number of connected subscribers.
    pub fn len(&self) -> usize {
        self.list.borrow().len()
    }
}

impl<T: ?Sized + 'static, R: 'static, P: Reduce<R>> Default for Signal<T, R, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static, R: 'static, P: Reduce<R>> Drop for Signal<T, R, P> {
    fn drop(&mut self) {
        let closed = self.list.borrow_mut().close();
        closed.finish();
    }
}

impl<T: ?Sized + 'static, R: 'static, P: Reduce<R>> core::fmt::Debug for Signal<T, R, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signal")
            .field("list", &*self.list.borrow())
            .finish_non_exhaustive()
    }
}

/// One active traversal of a list.
///
/// Keeps the list alive for the duration of the pass (the signal may be dropped
/// by a subscriber) and closes the pass even when a subscriber unwinds.
struct Pass<T: ?Sized, R> {
    list: Rc<RefCell<SignalList<T, R>>>,
    /// Once-subscriber currently being invoked.
    pending: Option<NodeKey>,
}

impl<T: ?Sized, R> Pass<T, R> {
    fn enter(list: Rc<RefCell<SignalList<T, R>>>) -> Self {
        list.borrow_mut().enter();
        Self {
            list,
            pending: None,
        }
    }
}

impl<T: ?Sized, R> Drop for Pass<T, R> {
    fn drop(&mut self) {
        let detached = {
            let mut list = self.list.borrow_mut();
            let detached = self.pending.take().and_then(|key| list.remove(key));
            list.leave();
            detached
        };
        if let Some(detached) = detached {
            detached.finish();
        }
    }
}
