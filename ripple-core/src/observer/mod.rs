//! Reactive Property Layer
//!
//! Turns plain containers into tracked ones. Observing an object replaces
//! each of its properties with a [`TrackedCell`] and gives the object one
//! structural dependency node, held by its [`Observer`]. Arrays get the
//! structural node only; their mutating operations notify it directly.
//!
//! Observation is recursive and idempotent: nested containers are observed
//! as they are reached, and observing an already observed container returns
//! its existing observer.
//!
//! Keys added after observation are not tracked. Use [`set`] and [`delete`]
//! to add or remove keys so that dependents of the container's shape are
//! notified.

mod array;
mod cell;
mod object;
pub mod path;
pub mod traverse;
mod value;

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::config;
use crate::error::ReactiveError;
use crate::reactive::Dep;

pub use array::ReactiveArray;
pub use cell::{Accessor, Trackable, TrackedCell};
pub use object::ReactiveObject;
pub use value::Value;

use object::Property;

thread_local! {
    static OBSERVING: Cell<bool> = const { Cell::new(true) };
}

/// Enable or disable creation of new observers on this thread.
///
/// While disabled, [`observe`] still returns existing observers but never
/// converts a container. Useful for passing data through reactive slots
/// without making it reactive.
pub fn set_observing(enabled: bool) {
    OBSERVING.with(|o| o.set(enabled));
}

/// Whether new observers may be created on this thread.
pub fn is_observing() -> bool {
    OBSERVING.with(Cell::get)
}

/// Tracking state attached to an observed container.
#[derive(Clone)]
pub struct Observer {
    inner: Arc<ObserverInner>,
}

struct ObserverInner {
    dep: Dep,
    root_count: AtomicUsize,
}

impl Observer {
    fn new() -> Self {
        Self {
            inner: Arc::new(ObserverInner {
                dep: Dep::new(),
                root_count: AtomicUsize::new(0),
            }),
        }
    }

    /// The structural dependency node: notified when keys are added or
    /// removed, or when an array is mutated.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// How many scopes use the container as their root data.
    pub fn root_count(&self) -> usize {
        self.inner.root_count.load(Ordering::Acquire)
    }

    pub(crate) fn release_root(&self) {
        // Saturating: never underflow on an unbalanced release.
        let _ = self
            .inner
            .root_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Observe every element.
    pub fn observe_items(items: &[Value]) {
        for item in items {
            observe(item, false);
        }
    }

    /// Whether both handles refer to the same observer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep().id())
            .field("root_count", &self.root_count())
            .finish()
    }
}

/// Make `value` reactive and return its observer.
///
/// Returns `None` for primitives, instance objects, raw containers, and
/// unobserved containers while observation is disabled. `as_root` marks the
/// container as a scope's root data, which forbids adding or removing keys
/// through [`set`] and [`delete`].
pub fn observe(value: &Value, as_root: bool) -> Option<Observer> {
    let observer = match value {
        Value::Object(obj) => obj.ensure_observer()?,
        Value::Array(arr) => arr.ensure_observer()?,
        _ => return None,
    };
    if as_root {
        observer.inner.root_count.fetch_add(1, Ordering::AcqRel);
    }
    Some(observer)
}

/// Key of an object property or array element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    /// An object property name.
    Name(String),
    /// An array index.
    Index(usize),
}

impl Key {
    fn index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Name(name) => name.parse().ok(),
        }
    }

    fn into_name(self) -> String {
        match self {
            Key::Name(name) => name,
            Key::Index(i) => i.to_string(),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// Set a property, adding it reactively if it does not exist yet.
///
/// On an array with an index key the array is padded with `Null` if needed
/// and the element replaced. Adding a key to an instance object or to root
/// data is refused with a warning. A non-container target is reported as
/// [`ReactiveError::InvalidTarget`]. Always returns `value`.
pub fn set(target: &Value, key: impl Into<Key>, value: Value) -> Value {
    let key = key.into();
    match target {
        Value::Array(arr) => match key.index() {
            Some(index) => {
                arr.pad_to(index);
                arr.splice(index, 1, vec![value.clone()]);
            }
            None => report_invalid("set", target),
        },
        Value::Object(obj) => {
            let key = key.into_name();
            if obj.contains_key(&key) {
                obj.assign(key, value.clone());
                return value;
            }

            let observer = obj.observer();
            if obj.is_instance() || observer.as_ref().is_some_and(|o| o.root_count() > 0) {
                warn!(
                    key = %key,
                    "refusing to add a reactive property to an instance or its root data"
                );
                return value;
            }

            match observer {
                None => obj.assign(key, value.clone()),
                Some(observer) => {
                    define_reactive(obj, key, Some(value.clone()), false);
                    observer.dep().notify();
                }
            }
        }
        _ => report_invalid("set", target),
    }
    value
}

/// Delete a property, notifying dependents of the container's shape.
///
/// Deleting a missing key does nothing. Deleting from an instance object or
/// from root data is refused with a warning. A non-container target is
/// reported as [`ReactiveError::InvalidTarget`].
pub fn delete(target: &Value, key: impl Into<Key>) {
    let key = key.into();
    match target {
        Value::Array(arr) => match key.index() {
            Some(index) => {
                arr.splice(index, 1, Vec::new());
            }
            None => report_invalid("delete", target),
        },
        Value::Object(obj) => {
            let key = key.into_name();
            let observer = obj.observer();
            if obj.is_instance() || observer.as_ref().is_some_and(|o| o.root_count() > 0) {
                warn!(
                    key = %key,
                    "refusing to delete a reactive property of an instance or its root data"
                );
                return;
            }
            if obj.remove_property(&key).is_none() {
                return;
            }
            if let Some(observer) = observer {
                observer.dep().notify();
            }
        }
        _ => report_invalid("delete", target),
    }
}

/// Convert `key` of `obj` into a tracked property and return its cell.
///
/// Without an explicit `value` the current one is kept. An existing custom
/// accessor is chained through. A `shallow` property does not make its
/// value reactive.
pub fn define_reactive(
    obj: &ReactiveObject,
    key: impl Into<String>,
    value: Option<Value>,
    shallow: bool,
) -> TrackedCell<Value> {
    let key = key.into();
    let cell = match obj.property(&key) {
        Some(Property::Tracked(cell)) => {
            if let Some(value) = value {
                cell.set(value);
            }
            return cell;
        }
        Some(Property::Accessor(accessor)) => TrackedCell::from_accessor(accessor, shallow),
        Some(Property::Plain(current)) => make_cell(value.unwrap_or(current), shallow),
        None => make_cell(value.unwrap_or_default(), shallow),
    };
    obj.install(&key, Property::Tracked(cell.clone()));
    cell
}

fn make_cell(value: Value, shallow: bool) -> TrackedCell<Value> {
    if shallow {
        TrackedCell::shallow(value)
    } else {
        TrackedCell::new(value)
    }
}

fn report_invalid(operation: &'static str, target: &Value) {
    let err = ReactiveError::InvalidTarget {
        operation,
        found: target.type_name(),
    };
    config::report(&err, None, operation);
}
