//! Reactive Arrays
//!
//! Element slots are not intercepted individually. Instead every mutating
//! operation goes through the array's structural node: it performs the
//! mutation, observes inserted elements and notifies once. Reads register
//! the current watcher with that same node.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::debug;

use super::{is_observing, Observer, Value};
use crate::reactive::ReactiveContext;

/// A sequence container with intercepted mutations.
///
/// Cloning yields another handle to the same array.
#[derive(Clone)]
pub struct ReactiveArray {
    inner: Arc<ArrayInner>,
}

struct ArrayInner {
    items: RwLock<Vec<Value>>,
    observer: OnceLock<Observer>,
    raw: AtomicBool,
}

impl ReactiveArray {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Create a plain array holding `items`.
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self {
            inner: Arc::new(ArrayInner {
                items: RwLock::new(items),
                observer: OnceLock::new(),
                raw: AtomicBool::new(false),
            }),
        }
    }

    // ---- Reads ----

    /// Element at `index`, or `None` if out of bounds.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.depend_structure();
        self.inner.items.read().get(index).cloned()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.depend_structure();
        self.inner.items.read().len()
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.depend_structure();
        self.items_untracked()
    }

    // ---- Mutations ----

    /// Append an element; returns the new length.
    pub fn push(&self, value: Value) -> usize {
        let len = {
            let mut items = self.inner.items.write();
            items.push(value.clone());
            items.len()
        };
        self.mutated(&[value]);
        len
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        let popped = self.inner.items.write().pop();
        self.mutated(&[]);
        popped
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        let shifted = {
            let mut items = self.inner.items.write();
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        };
        self.mutated(&[]);
        shifted
    }

    /// Prepend elements; returns the new length.
    pub fn unshift(&self, values: Vec<Value>) -> usize {
        let len = {
            let mut items = self.inner.items.write();
            let tail = std::mem::take(&mut *items);
            items.extend(values.iter().cloned());
            items.extend(tail);
            items.len()
        };
        self.mutated(&values);
        len
    }

    /// Remove `delete_count` elements at `start` and insert `values` there.
    /// Returns the removed elements.
    ///
    /// `start` and `delete_count` are clamped to the array bounds.
    pub fn splice(&self, start: usize, delete_count: usize, values: Vec<Value>) -> Vec<Value> {
        let removed = {
            let mut items = self.inner.items.write();
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            let removed: Vec<Value> = items.splice(start..end, values.iter().cloned()).collect();
            removed
        };
        self.mutated(&values);
        removed
    }

    /// Sort in place with a comparator.
    ///
    /// The comparator runs without the array locked, so it may read other
    /// reactive state.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> CmpOrdering,
    {
        let mut items = self.items_untracked();
        items.sort_by(compare);
        *self.inner.items.write() = items;
        self.mutated(&[]);
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.inner.items.write().reverse();
        self.mutated(&[]);
    }

    // ---- Observation ----

    /// The array's observer, if it has been observed.
    pub fn observer(&self) -> Option<Observer> {
        self.inner.observer.get().cloned()
    }

    /// Exclude the array from observation.
    ///
    /// Has no effect on an array that is already observed.
    pub fn mark_raw(&self) -> &Self {
        self.inner.raw.store(true, Ordering::Release);
        self
    }

    /// Whether [`mark_raw`](Self::mark_raw) was called.
    pub fn is_raw(&self) -> bool {
        self.inner.raw.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same array.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn items_untracked(&self) -> Vec<Value> {
        self.inner.items.read().clone()
    }

    /// Grow to at least `len` elements, filling with `Null`.
    pub(crate) fn pad_to(&self, len: usize) {
        let mut items = self.inner.items.write();
        if items.len() < len {
            items.resize(len, Value::Null);
        }
    }

    pub(crate) fn ensure_observer(&self) -> Option<Observer> {
        if let Some(observer) = self.inner.observer.get() {
            return Some(observer.clone());
        }
        if self.is_raw() || !is_observing() {
            return None;
        }

        let mut created = false;
        let observer = self
            .inner
            .observer
            .get_or_init(|| {
                created = true;
                Observer::new()
            })
            .clone();

        if created {
            let items = self.items_untracked();
            Observer::observe_items(&items);
            debug!(dep_id = %observer.dep().id(), len = items.len(), "array observed");
        }
        Some(observer)
    }

    /// Observe inserted elements and notify the structural node.
    ///
    /// Unobserved arrays are plain data: nothing to notify.
    fn mutated(&self, values: &[Value]) {
        if let Some(observer) = self.observer() {
            Observer::observe_items(values);
            observer.dep().notify();
        }
    }

    fn depend_structure(&self) {
        if ReactiveContext::is_active() {
            if let Some(observer) = self.observer() {
                observer.dep().depend();
            }
        }
    }
}

impl Default for ReactiveArray {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReactiveArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveArray")
            .field("len", &self.inner.items.read().len())
            .field("observed", &self.inner.observer.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::observe;
    use crate::reactive::{Source, Watcher, WatcherOptions};
    use crate::scope::Scope;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn nums(arr: &ReactiveArray) -> Vec<f64> {
        arr.items_untracked()
            .iter()
            .filter_map(Value::as_f64)
            .collect()
    }

    fn observed(items: Vec<Value>) -> ReactiveArray {
        let arr = ReactiveArray::from_vec(items);
        observe(&Value::Array(arr.clone()), false);
        arr
    }

    #[test]
    fn operations_match_plain_semantics() {
        let arr = observed(vec![Value::from(1), Value::from(2), Value::from(3)]);

        assert_eq!(arr.push(Value::from(4)), 4);
        assert_eq!(arr.pop(), Some(Value::from(4)));
        assert_eq!(arr.shift(), Some(Value::from(1)));
        assert_eq!(arr.unshift(vec![Value::from(0), Value::from(1)]), 4);
        assert_eq!(nums(&arr), vec![0.0, 1.0, 2.0, 3.0]);

        let removed = arr.splice(1, 2, vec![Value::from(9)]);
        assert_eq!(removed, vec![Value::from(1), Value::from(2)]);
        assert_eq!(nums(&arr), vec![0.0, 9.0, 3.0]);

        // Out-of-range start clamps to the end.
        assert!(arr.splice(10, 5, vec![Value::from(7)]).is_empty());
        assert_eq!(nums(&arr), vec![0.0, 9.0, 3.0, 7.0]);

        arr.sort_by(|a, b| {
            a.as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(CmpOrdering::Equal)
        });
        assert_eq!(nums(&arr), vec![0.0, 3.0, 7.0, 9.0]);

        arr.reverse();
        assert_eq!(nums(&arr), vec![9.0, 7.0, 3.0, 0.0]);

        let empty = observed(Vec::new());
        assert_eq!(empty.pop(), None);
        assert_eq!(empty.shift(), None);
    }

    #[test]
    fn each_operation_notifies_once() {
        let scope = Scope::new("array");
        let arr = observed(vec![Value::from(1)]);
        let runs = Arc::new(AtomicI32::new(0));

        let (arr_c, runs_c) = (arr.clone(), runs.clone());
        let _watcher = Watcher::without_callback(
            &scope,
            Source::getter(move |_| {
                runs_c.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from(arr_c.len()))
            }),
            WatcherOptions::default().sync(),
        )
        .unwrap();

        arr.unshift(vec![Value::from(1), Value::from(2), Value::from(3)]);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        arr.splice(0, 3, Vec::new());
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn inserted_containers_become_reactive() {
        let arr = observed(Vec::new());
        let item = Value::object([("n", Value::from(1))]);
        arr.push(item.clone());
        assert!(item.observer().is_some());
    }
}
