//! Fixed-capacity observer registration (spec §9: "a small fixed-capacity
//! slice ... suffices. Bounded capacity (≈ 4) is part of the contract.").

use heapless::Vec as HVec;

/// Holds up to `N` trait-object observers, delivered inline and in
/// registration order. Registration past capacity fails rather than growing
/// unbounded.
pub struct Observers<T: ?Sized, const N: usize> {
    slots: HVec<alloc::boxed::Box<T>, N>,
}

impl<T: ?Sized, const N: usize> Observers<T, N> {
    pub const fn new() -> Self {
        Self { slots: HVec::new() }
    }

    /// Registers an observer. Returns `Err(observer)` back to the caller if
    /// capacity is exhausted.
    pub fn register(&mut self, observer: alloc::boxed::Box<T>) -> Result<(), alloc::boxed::Box<T>> {
        self.slots.push(observer)
    }

    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        for observer in self.slots.iter() {
            f(observer);
        }
    }

    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        for observer in self.slots.iter_mut() {
            f(observer);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<T: ?Sized, const N: usize> Default for Observers<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A before/after snapshot handed to observers on a state transition
/// (spec §9: "Observers see state before and after the transition via
/// captured snapshots, not by aliasing into the state machine.").
#[derive(Debug, Clone)]
pub struct Transition<S> {
    pub previous: S,
    pub next: S,
}

impl<S> Transition<S> {
    pub fn new(previous: S, next: S) -> Self {
        Self { previous, next }
    }
}
