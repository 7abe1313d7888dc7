// A bump allocator with strict LIFO rewind, for the builder's recursive
// scratch buffers (edge-event arrays, per-node classification arrays): a
// `Vec<Box<[T]>>` of fixed-size slabs behind a `Cell`-tracked cursor, with
// `push` exposed as `allocate(&self, n) -> &mut [T]` through an `UnsafeCell`
// so a caller can fill the returned slice in place. bumpalo was considered
// (it's the obvious crate for bump allocation) but its stable API has no way
// to rewind to an arbitrary earlier mark, only `reset()` the whole arena, so
// it can't express "free everything past this point while recursion
// unwinds".

use crate::memory::util::alloc_array;

use std::cell::{Cell, UnsafeCell};

/// A position in an [`Arena`], returned by [`Arena::allocate`] and consumed
/// by [`Arena::release`] or [`Arena::shrink`].
#[derive(Clone, Copy, Debug)]
pub struct Mark {
    slab: usize,
    offset: usize,
}

/// Per-thread ordered-slab bump allocator for a single element type `T`.
///
/// Allocations must be released in LIFO order, matching the recursive
/// structure of the builder: a node allocates scratch space, recurses into
/// its children (which allocate and release their own scratch space), then
/// releases its own. Violating the LIFO discipline silently corrupts
/// whichever allocation is rewound past; nothing checks this at runtime.
pub struct Arena<T> {
    slab_size: usize,
    slabs: UnsafeCell<Vec<Box<[T]>>>,
    cur_slab: Cell<usize>,
    cur_offset: Cell<usize>,
}

impl<T> Arena<T> {
    pub fn new(slab_size: usize) -> Self {
        assert!(slab_size > 0);
        Arena {
            slab_size,
            slabs: unsafe { UnsafeCell::new(vec![alloc_array(slab_size)]) },
            cur_slab: Cell::new(0),
            cur_offset: Cell::new(0),
        }
    }

    /// Allocates `n` uninitialized elements, returning a mark to later
    /// `release` or `shrink` back to, and a mutable slice to fill in.
    pub fn allocate(&self, n: usize) -> (Mark, &mut [T]) {
        let slabs = unsafe { &mut *self.slabs.get() };

        if self.cur_offset.get() + n > slabs[self.cur_slab.get()].len() {
            let new_slab_size = std::cmp::max(self.slab_size, n);
            slabs.push(unsafe { alloc_array(new_slab_size) });
            self.cur_slab.set(slabs.len() - 1);
            self.cur_offset.set(0);
        }

        let mark = Mark {
            slab: self.cur_slab.get(),
            offset: self.cur_offset.get(),
        };

        let slab = &mut slabs[mark.slab];
        let result = unsafe {
            std::slice::from_raw_parts_mut(slab.as_mut_ptr().add(mark.offset), n)
        };
        self.cur_offset.set(mark.offset + n);

        (mark, result)
    }

    /// Rewinds the arena to `mark`. `mark` must be the most recently
    /// outstanding mark that hasn't already been released.
    pub fn release(&self, mark: Mark) {
        self.cur_slab.set(mark.slab);
        self.cur_offset.set(mark.offset);
    }

    /// Shrinks the allocation returned together with `mark` to `n_new`
    /// elements, freeing the tail immediately. Must be called before any
    /// further `allocate` call on this arena (i.e. `mark`'s allocation is
    /// still the most recent one).
    pub fn shrink(&self, mark: Mark, n_new: usize) {
        debug_assert_eq!(self.cur_slab.get(), mark.slab);
        debug_assert!(mark.offset + n_new <= self.cur_offset.get());
        self.cur_offset.set(mark.offset + n_new);
    }

    /// Folds `other`'s slabs into `self`, keeping their contents alive as
    /// permanently-used space. Used by the parallel builder to reclaim a
    /// worker's per-thread arena into the dispatcher's once the worker's
    /// subtree finishes.
    pub fn merge(&self, other: Arena<T>) {
        let self_slabs = unsafe { &mut *self.slabs.get() };
        let mut other_slabs = other.slabs.into_inner();
        other_slabs.truncate(other.cur_slab.get() + 1);
        self_slabs.extend(other_slabs);
    }

    /// Drops all slabs but one and resets the cursor, reclaiming memory
    /// between builds.
    pub fn cleanup(&mut self) {
        let slabs = self.slabs.get_mut();
        slabs.truncate(1);
        self.cur_slab.set(0);
        self.cur_offset.set(0);
    }
}
