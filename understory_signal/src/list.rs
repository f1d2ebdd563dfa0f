// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Subscriber list: a slot arena threaded into a doubly linked list.
//!
//! Nodes live in generational slots (the same scheme the box tree uses for
//! `NodeId`) and are linked through `prev`/`next` slot indices. The [`Root`]
//! sentinel is the `head`/`tail` pair; `None` marks the end of the chain.
//!
//! ## Removal during traversal
//!
//! Traversal is driven from outside (by `Signal::emit_with`) with plain slot
//! indices as cursors. While at least one pass is active, an unlinked node is
//! kept as a tombstone: its callback is handed back to the caller, but the slot
//! keeps its `next` link and is not reused, so a cursor parked on it can still
//! step forward. Tombstones are released when the outermost pass leaves.
//!
//! Nothing in this module calls user code. Every operation that gives up a
//! callback or must fire the on-empty notification returns a [`Detached`] that
//! the caller finishes after the list borrow is released.

use alloc::rc::Rc;
use alloc::vec::Vec;
use smallvec::{SmallVec, smallvec};

pub(crate) type Callback<T, R> = Rc<dyn Fn(&T) -> R>;
pub(crate) type OnEmpty = Rc<dyn Fn()>;

/// Generational key of a subscriber slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeKey(u32, u32);

impl NodeKey {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Subscriber keys are intentionally 32-bit."
    )]
    const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }

    const fn generation(self) -> u32 {
        self.1
    }
}

/// Sentinel anchoring the chain. Never holds a callback and has no key.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Root {
    head: Option<usize>,
    tail: Option<usize>,
}

struct Node<T: ?Sized, R> {
    generation: u32,
    prev: Option<usize>,
    next: Option<usize>,
    /// `None` once the node is unlinked (tombstone).
    callback: Option<Callback<T, R>>,
    once: bool,
    /// A once-node that has been handed out to a pass.
    spent: bool,
}

/// Callbacks and notifications released by a list mutation.
///
/// Must be finished outside of any borrow of the list: dropping a callback may
/// drop captured connections, and on-empty may tear down the owner.
#[must_use]
pub(crate) struct Detached<T: ?Sized, R> {
    callbacks: SmallVec<[Callback<T, R>; 1]>,
    on_empty: Option<OnEmpty>,
    /// On-empty notification taken out by `close`; dropped, never fired.
    retired: Option<OnEmpty>,
}

impl<T: ?Sized, R> Detached<T, R> {
    /// Fire the on-empty notification (if this mutation emptied the list), then
    /// drop the released callbacks and any retired notification.
    pub(crate) fn finish(self) {
        let Self {
            callbacks,
            on_empty,
            retired,
        } = self;
        if let Some(on_empty) = on_empty {
            on_empty();
        }
        drop(callbacks);
        drop(retired);
    }

    pub(crate) fn len(&self) -> usize {
        self.callbacks.len()
    }
}

pub(crate) struct SignalList<T: ?Sized, R> {
    /// slots
    nodes: Vec<Option<Node<T, R>>>,
    /// last generation per slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
    root: Root,
    len: usize,
    /// Number of active passes over this list.
    passes: u32,
    tombstones: SmallVec<[usize; 4]>,
    on_empty: Option<OnEmpty>,
}

impl<T: ?Sized, R> SignalList<T, R> {
    pub(crate) fn new(on_empty: Option<OnEmpty>) -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            root: Root::default(),
            len: 0,
            passes: 0,
            tombstones: SmallVec::new(),
            on_empty,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.root.head.is_none()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn head(&self) -> Option<usize> {
        self.root.head
    }

    /// Whether `key` names a node that is still linked into this list.
    pub(crate) fn is_live(&self, key: NodeKey) -> bool {
        matches!(
            self.nodes.get(key.idx()),
            Some(Some(node)) if node.generation == key.generation() && node.callback.is_some()
        )
    }

    pub(crate) fn append(&mut self, callback: Callback<T, R>, once: bool) -> NodeKey {
        self.insert_before(None, callback, once)
    }

    pub(crate) fn prepend(&mut self, callback: Callback<T, R>, once: bool) -> NodeKey {
        let head = self.root.head;
        self.insert_before(head, callback, once)
    }

    /// Splice a new node immediately before `anchor`; `None` anchors at the root,
    /// which appends at the tail.
    pub(crate) fn insert_before(
        &mut self,
        anchor: Option<usize>,
        callback: Callback<T, R>,
        once: bool,
    ) -> NodeKey {
        let prev = match anchor {
            Some(a) => self.node(a).prev,
            None => self.root.tail,
        };
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            (idx, generation)
        } else {
            self.nodes.push(None);
            self.generations.push(1);
            (self.nodes.len() - 1, 1_u32)
        };
        self.nodes[idx] = Some(Node {
            generation,
            prev,
            next: anchor,
            callback: Some(callback),
            once,
            spent: false,
        });
        match prev {
            Some(p) => self.node_mut(p).next = Some(idx),
            None => self.root.head = Some(idx),
        }
        match anchor {
            Some(a) => self.node_mut(a).prev = Some(idx),
            None => self.root.tail = Some(idx),
        }
        self.len += 1;
        NodeKey::new(idx, generation)
    }

    /// Unlink the node named by `key`. Returns `None` for stale keys.
    pub(crate) fn remove(&mut self, key: NodeKey) -> Option<Detached<T, R>> {
        if !self.is_live(key) {
            return None;
        }
        let callback = self.unlink(key.idx());
        Some(Detached {
            callbacks: smallvec![callback],
            on_empty: self.empty_notice(),
            retired: None,
        })
    }

    /// Unlink every node, head first. Notifies on-empty once if anything was linked.
    pub(crate) fn clear(&mut self) -> Option<Detached<T, R>> {
        if self.is_empty() {
            return None;
        }
        let callbacks = self.drain();
        Some(Detached {
            callbacks,
            on_empty: self.empty_notice(),
            retired: None,
        })
    }

    /// Unlink every node and retire the on-empty notification; used when the
    /// owning signal goes away.
    ///
    /// The notification is handed back unfired; it may own handles into this list.
    pub(crate) fn close(&mut self) -> Detached<T, R> {
        Detached {
            callbacks: self.drain(),
            on_empty: None,
            retired: self.on_empty.take(),
        }
    }

    /// Hand out the callback of the node at `idx` to a pass.
    ///
    /// Returns `None` for tombstones and for once-nodes already handed out, so a
    /// nested pass never runs a once-node a second time.
    pub(crate) fn visit(&mut self, idx: usize) -> Option<(NodeKey, Callback<T, R>, bool)> {
        let node = self.node_mut(idx);
        if node.spent {
            return None;
        }
        let callback = Rc::clone(node.callback.as_ref()?);
        node.spent = node.once;
        Some((NodeKey::new(idx, node.generation), callback, node.once))
    }

    /// Successor of `idx`; valid for tombstones while a pass is active.
    pub(crate) fn next_of(&self, idx: usize) -> Option<usize> {
        self.node(idx).next
    }

    pub(crate) fn enter(&mut self) {
        self.passes += 1;
    }

    pub(crate) fn leave(&mut self) {
        debug_assert!(self.passes > 0, "leave without matching enter");
        self.passes -= 1;
        if self.passes == 0 {
            let tombstones = core::mem::take(&mut self.tombstones);
            for idx in tombstones {
                self.release(idx);
            }
        }
    }

    fn drain(&mut self) -> SmallVec<[Callback<T, R>; 1]> {
        let mut callbacks = SmallVec::with_capacity(self.len);
        while let Some(head) = self.root.head {
            callbacks.push(self.unlink(head));
        }
        callbacks
    }

    fn unlink(&mut self, idx: usize) -> Callback<T, R> {
        let node = self.node_mut(idx);
        let (prev, next) = (node.prev, node.next);
        let Some(callback) = node.callback.take() else {
            unreachable!("unlinking a tombstone");
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.root.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.root.tail = prev,
        }
        self.len -= 1;
        if self.passes > 0 {
            self.tombstones.push(idx);
        } else {
            self.release(idx);
        }
        callback
    }

    fn release(&mut self, idx: usize) {
        self.nodes[idx] = None;
        self.free_list.push(idx);
    }

    fn empty_notice(&self) -> Option<OnEmpty> {
        if self.is_empty() {
            self.on_empty.clone()
        } else {
            None
        }
    }

    /// Access a slot; panics if `idx` was released.
    fn node(&self, idx: usize) -> &Node<T, R> {
        self.nodes[idx].as_ref().expect("dangling subscriber slot")
    }

    /// Access a slot mutably; panics if `idx` was released.
    fn node_mut(&mut self, idx: usize) -> &mut Node<T, R> {
        self.nodes[idx].as_mut().expect("dangling subscriber slot")
    }
}

impl<T: ?Sized, R> core::fmt::Debug for SignalList<T, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SignalList")
            .field("len", &self.len)
            .field("slots", &self.nodes.len())
            .field("free_list", &self.free_list.len())
            .field("passes", &self.passes)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}
