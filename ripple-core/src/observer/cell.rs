//! Tracked Cells
//!
//! A [`TrackedCell`] is one intercepted property: a value slot plus the
//! dependency node for that slot. Reads register the current watcher; writes
//! that change the value notify every watcher that read it.
//!
//! Containers use `TrackedCell<Value>` for every key they observe. The cell
//! also works standalone for typed state (`TrackedCell<i32>`, ...), in which
//! case there is no child container to track.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::Observer;
use crate::reactive::{Dep, ReactiveContext};

/// Values a [`TrackedCell`] can hold.
pub trait Trackable: Clone + Send + Sync + 'static {
    /// Whether a write of `other` over `self` is a no-op.
    fn same_value(&self, other: &Self) -> bool;

    /// Make the value reactive, returning its observer if it is a container.
    fn observe_child(&self) -> Option<Observer> {
        None
    }

    /// Register the current watcher with the structural nodes of nested
    /// array elements.
    fn depend_elements(&self) {}
}

macro_rules! impl_trackable_eq {
    ($($t:ty),*) => {
        $(
            impl Trackable for $t {
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

impl_trackable_eq!(
    bool, char, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, String, Arc<str>
);

macro_rules! impl_trackable_float {
    ($($t:ty),*) => {
        $(
            impl Trackable for $t {
                fn same_value(&self, other: &Self) -> bool {
                    self == other || (self.is_nan() && other.is_nan())
                }
            }
        )*
    };
}

impl_trackable_float!(f32, f64);

/// A custom getter/setter pair installed on a property.
///
/// Observing a property that already has an accessor chains through it: the
/// tracked read calls the getter and the tracked write calls the setter. A
/// getter-only accessor makes the property read-only.
pub struct Accessor<T> {
    /// Produces the property's value.
    pub get: Arc<dyn Fn() -> T + Send + Sync>,
    /// Receives writes; `None` for read-only properties.
    pub set: Option<Arc<dyn Fn(T) + Send + Sync>>,
}

impl<T> Accessor<T> {
    /// A read-only accessor.
    pub fn getter<G>(get: G) -> Self
    where
        G: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: None,
        }
    }

    /// A read-write accessor.
    pub fn new<G, S>(get: G, set: S) -> Self
    where
        G: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: Some(Arc::new(set)),
        }
    }
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        Self {
            get: self.get.clone(),
            set: self.set.clone(),
        }
    }
}

impl<T> fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("writable", &self.set.is_some())
            .finish()
    }
}

enum Slot<T> {
    Value(T),
    Accessor(Accessor<T>),
}

/// An intercepted property: a value slot and its dependency node.
///
/// Cloning yields another handle to the same cell.
pub struct TrackedCell<T: Trackable> {
    inner: Arc<CellInner<T>>,
}

struct CellInner<T> {
    dep: Dep,
    slot: RwLock<Slot<T>>,

    /// Observer of the current value when it is a container.
    child: RwLock<Option<Observer>>,
    shallow: bool,
}

impl<T: Trackable> TrackedCell<T> {
    /// Create a cell. A container value is made reactive as well.
    pub fn new(value: T) -> Self {
        Self::build(Slot::Value(value), false)
    }

    /// Create a cell that does not make its value reactive.
    pub fn shallow(value: T) -> Self {
        Self::build(Slot::Value(value), true)
    }

    /// Create a cell that chains through an existing accessor.
    ///
    /// The initial child is only observed when the accessor is writable,
    /// since a getter-only property may compute a fresh value on each read.
    pub fn from_accessor(accessor: Accessor<T>, shallow: bool) -> Self {
        Self::build(Slot::Accessor(accessor), shallow)
    }

    fn build(slot: Slot<T>, shallow: bool) -> Self {
        let child = match &slot {
            _ if shallow => None,
            Slot::Value(value) => value.observe_child(),
            Slot::Accessor(accessor) if accessor.set.is_some() => {
                (accessor.get)().observe_child()
            }
            Slot::Accessor(_) => None,
        };

        Self {
            inner: Arc::new(CellInner {
                dep: Dep::new(),
                slot: RwLock::new(slot),
                child: RwLock::new(child),
                shallow,
            }),
        }
    }

    /// The cell's dependency node.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// Whether the cell skips child observation.
    pub fn is_shallow(&self) -> bool {
        self.inner.shallow
    }

    /// Observer of the current value, if it is an observed container.
    pub fn child_observer(&self) -> Option<Observer> {
        self.inner.child.read().clone()
    }

    /// Read the value, registering the current watcher.
    pub fn get(&self) -> T {
        let value = self.get_untracked();

        if ReactiveContext::is_active() {
            self.inner.dep.depend();
            if let Some(child) = self.child_observer() {
                child.dep().depend();
                value.depend_elements();
            }
        }

        value
    }

    /// Read the value without registering anything.
    pub fn get_untracked(&self) -> T {
        let getter = match &*self.inner.slot.read() {
            Slot::Value(value) => return value.clone(),
            Slot::Accessor(accessor) => accessor.get.clone(),
        };
        getter()
    }

    /// Write a value, notifying dependents if it changed.
    pub fn set(&self, value: T) {
        let current = self.get_untracked();
        if value.same_value(&current) {
            return;
        }

        let setter = match &mut *self.inner.slot.write() {
            Slot::Value(slot) => {
                *slot = value.clone();
                None
            }
            Slot::Accessor(accessor) => match &accessor.set {
                Some(setter) => Some(setter.clone()),
                // Read-only property.
                None => return,
            },
        };
        if let Some(setter) = setter {
            setter(value.clone());
        }

        let child = if self.inner.shallow {
            None
        } else {
            value.observe_child()
        };
        *self.inner.child.write() = child;

        self.inner.dep.notify();
    }

    /// Replace the value with `f(current)`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.get_untracked());
        self.set(next);
    }
}

impl<T: Trackable> Clone for TrackedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Trackable + fmt::Debug> fmt::Debug for TrackedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("TrackedCell");
        s.field("dep", &self.inner.dep.id());
        match &*self.inner.slot.read() {
            Slot::Value(value) => s.field("value", value),
            Slot::Accessor(accessor) => s.field("accessor", accessor),
        };
        s.finish()
    }
}
