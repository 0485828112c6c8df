//! Shared primitives used across the `nifi` multiplayer networking crates.
//!
//! Nothing here is domain-specific to LocalMP/LAN/Netplay; it's the small
//! set of concurrency and logging helpers every other crate in the workspace
//! builds on.

pub mod log;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// A thread-safe flag backed by an atomic boolean. Offers a more concise API
/// than passing `Arc<AtomicBool>` around directly.
#[derive(Clone, Debug)]
pub struct Flag(Arc<AtomicBool>);

impl Flag {
    /// Initializes and returns a new `Flag`.
    pub fn new(val: bool) -> Self {
        Self(Arc::new(AtomicBool::new(val)))
    }

    /// Sets the value of this `Flag`.
    pub fn set(&self, val: bool) {
        self.0.store(val, Ordering::Release);
    }

    /// Gets the raw boolean value of this `Flag`.
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A thread-safe FIFO queue guarded by a mutex.
#[derive(Clone, Debug)]
pub struct Queue<T>(Arc<Mutex<VecDeque<T>>>);

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    /// Creates and returns a new empty `Queue<T>`.
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(VecDeque::new())))
    }

    /// Pushes an entry to the back of the queue.
    pub fn push_back(&self, entry: T) {
        let mut inner = self.0.lock().expect("queue mutex poisoned");
        inner.push_back(entry);
    }

    /// Pops an entry from the front of the queue, if any is available.
    pub fn pop_front(&self) -> Option<T> {
        let mut inner = self.0.lock().expect("queue mutex poisoned");
        inner.pop_front()
    }

    /// Returns the number of entries currently queued.
    pub fn len(&self) -> usize {
        let inner = self.0.lock().expect("queue mutex poisoned");
        inner.len()
    }

    /// Returns whether the queue currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A lock-free thread-safe value that can be set exactly once.
///
/// Useful when a background thread needs to hand a value back to the owning
/// thread without requiring the reader to take a lock.
#[derive(Clone, Debug)]
pub struct OnceValue<T>(Arc<OnceLock<T>>);

impl<T> Default for OnceValue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OnceValue<T> {
    /// Initializes a new, unset `OnceValue`.
    pub fn new() -> Self {
        Self(Arc::new(OnceLock::new()))
    }

    /// Sets the underlying value. A second call is a no-op (logged as a warning).
    pub fn set(&self, value: T) {
        if self.0.set(value).is_err() {
            tracing::warn!(target: log::Target::Shared.as_str(), "OnceValue double set, dropping new value");
        }
    }

    /// Gets a reference to the underlying value, if set.
    pub fn get(&self) -> Option<&T> {
        self.0.get()
    }
}

/// Types that can be packed into an `AtomicState` must map cleanly to an `i8`.
pub trait AtomicStateTransform: Sized {
    /// Converts this value to its `i8` representation.
    fn to_i8(&self) -> i8;

    /// Maps an `i8` back to a value. Implementations may use `unreachable!()`
    /// for values that can never be produced by `to_i8`.
    fn from_i8(value: i8) -> Self;
}

/// A thread-safe state marker backed by an atomic integer rather than a mutex.
#[derive(Debug)]
pub struct AtomicState<T> {
    inner: Arc<AtomicI8>,
    marker: std::marker::PhantomData<T>,
}

impl<T> Clone for AtomicState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            marker: std::marker::PhantomData,
        }
    }
}

impl<T> AtomicState<T>
where
    T: AtomicStateTransform,
{
    /// Initializes a new `AtomicState` with the given starting value.
    pub fn new(state: T) -> Self {
        Self {
            inner: Arc::new(AtomicI8::new(state.to_i8())),
            marker: std::marker::PhantomData,
        }
    }

    /// Sets the underlying value of this state.
    pub fn set(&self, state: T) {
        self.inner.store(state.to_i8(), Ordering::Release);
    }

    /// Gets the underlying value of this state.
    pub fn get(&self) -> T {
        T::from_i8(self.inner.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_roundtrip() {
        let flag = Flag::new(false);
        assert!(!flag.get());
        flag.set(true);
        assert!(flag.get());
    }

    #[test]
    fn queue_fifo_order() {
        let queue: Queue<i32> = Queue::new();
        queue.push_back(1);
        queue.push_back(2);
        assert_eq!(queue.pop_front(), Some(1));
        assert_eq!(queue.pop_front(), Some(2));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn once_value_ignores_second_set() {
        let value: OnceValue<i32> = OnceValue::new();
        value.set(1);
        value.set(2);
        assert_eq!(value.get(), Some(&1));
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Tristate {
        A,
        B,
        C,
    }

    impl AtomicStateTransform for Tristate {
        fn to_i8(&self) -> i8 {
            match self {
                Tristate::A => 0,
                Tristate::B => 1,
                Tristate::C => 2,
            }
        }

        fn from_i8(value: i8) -> Self {
            match value {
                0 => Tristate::A,
                1 => Tristate::B,
                2 => Tristate::C,
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn atomic_state_roundtrip() {
        let state = AtomicState::new(Tristate::A);
        assert_eq!(state.get(), Tristate::A);
        state.set(Tristate::C);
        assert_eq!(state.get(), Tristate::C);
    }
}
