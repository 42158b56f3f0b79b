//! Reactive Objects
//!
//! A keyed container. Before it is observed every property is a plain
//! value; observation converts each one into a [`TrackedCell`]. Keys added
//! later through [`ReactiveObject::assign`] stay plain, which is why adding a
//! key reactively has to go through [`set`](super::set).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use super::cell::{Accessor, TrackedCell};
use super::{define_reactive, is_observing, Observer, Value};
use crate::reactive::ReactiveContext;

#[derive(Clone)]
pub(crate) enum Property {
    Plain(Value),
    Accessor(Accessor<Value>),
    Tracked(TrackedCell<Value>),
}

/// A keyed container whose properties can be tracked.
///
/// Cloning yields another handle to the same object; see
/// [`Value::is_identical`].
#[derive(Clone)]
pub struct ReactiveObject {
    inner: Arc<ObjectInner>,
}

struct ObjectInner {
    props: RwLock<IndexMap<String, Property>>,
    observer: OnceLock<Observer>,
    instance: bool,
    raw: AtomicBool,
}

impl ReactiveObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::with_flag(false)
    }

    /// Create an empty object flagged as an owning instance.
    ///
    /// Instances are never observed, and `set`/`delete` refuse to add or
    /// remove their keys.
    pub fn instance() -> Self {
        Self::with_flag(true)
    }

    fn with_flag(instance: bool) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                props: RwLock::new(IndexMap::new()),
                observer: OnceLock::new(),
                instance,
                raw: AtomicBool::new(false),
            }),
        }
    }

    /// Create a plain object from key/value pairs.
    pub fn from_entries<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let obj = Self::new();
        obj.inner.props.write().extend(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), Property::Plain(v))),
        );
        obj
    }

    /// Read a property. Tracked properties register the current watcher.
    ///
    /// Returns `None` if the key does not exist.
    pub fn get(&self, key: &str) -> Option<Value> {
        let prop = self.property(key)?;
        Some(match prop {
            Property::Plain(value) => value,
            Property::Accessor(accessor) => (accessor.get)(),
            Property::Tracked(cell) => cell.get(),
        })
    }

    /// Write a property.
    ///
    /// Writing an existing tracked key goes through its cell and notifies on
    /// change. Writing a new key creates a plain, untracked property.
    pub fn assign(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.property(&key) {
            Some(Property::Tracked(cell)) => cell.set(value),
            Some(Property::Accessor(accessor)) => {
                if let Some(setter) = &accessor.set {
                    setter(value);
                }
            }
            Some(Property::Plain(_)) | None => {
                self.inner.props.write().insert(key, Property::Plain(value));
            }
        }
    }

    /// Install a custom accessor for `key`.
    ///
    /// On an observed object the accessor is tracked right away; otherwise it
    /// is chained through once the object is observed.
    pub fn define_accessor(&self, key: impl Into<String>, accessor: Accessor<Value>) {
        let key = key.into();
        self.install(&key, Property::Accessor(accessor));
        if self.observer().is_some() {
            define_reactive(self, key, None, false);
        }
    }

    /// Whether `key` exists. Not tracked.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.props.read().contains_key(key)
    }

    /// Keys in insertion order. Registers the current watcher with the
    /// object's structural node, so key additions and removals are seen.
    pub fn keys(&self) -> Vec<String> {
        self.depend_structure();
        self.keys_untracked()
    }

    /// Number of keys. Tracked like [`keys`](Self::keys).
    pub fn len(&self) -> usize {
        self.depend_structure();
        self.inner.props.read().len()
    }

    /// Whether the object has no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The object's observer, if it has been observed.
    pub fn observer(&self) -> Option<Observer> {
        self.inner.observer.get().cloned()
    }

    /// Whether the object is flagged as an owning instance.
    pub fn is_instance(&self) -> bool {
        self.inner.instance
    }

    /// Exclude the object from observation.
    ///
    /// Has no effect on an object that is already observed.
    pub fn mark_raw(&self) -> &Self {
        self.inner.raw.store(true, Ordering::Release);
        self
    }

    /// Whether [`mark_raw`](Self::mark_raw) was called.
    pub fn is_raw(&self) -> bool {
        self.inner.raw.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// Return the observer, creating it and converting every property on
    /// first call.
    pub(crate) fn ensure_observer(&self) -> Option<Observer> {
        if let Some(observer) = self.inner.observer.get() {
            return Some(observer.clone());
        }
        if self.inner.instance || self.is_raw() || !is_observing() {
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

        // The observer is published before walking so that a self-reference
        // finds it instead of recursing.
        if created {
            self.walk();
            debug!(dep_id = %observer.dep().id(), keys = self.inner.props.read().len(), "object observed");
        }
        Some(observer)
    }

    fn walk(&self) {
        for key in self.keys_untracked() {
            define_reactive(self, key, None, false);
        }
    }

    pub(crate) fn property(&self, key: &str) -> Option<Property> {
        self.inner.props.read().get(key).cloned()
    }

    pub(crate) fn install(&self, key: &str, prop: Property) {
        self.inner.props.write().insert(key.to_string(), prop);
    }

    pub(crate) fn remove_property(&self, key: &str) -> Option<Property> {
        self.inner.props.write().shift_remove(key)
    }

    pub(crate) fn keys_untracked(&self) -> Vec<String> {
        self.inner.props.read().keys().cloned().collect()
    }

    fn depend_structure(&self) {
        if ReactiveContext::is_active() {
            if let Some(observer) = self.observer() {
                observer.dep().depend();
            }
        }
    }
}

impl Default for ReactiveObject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveObject")
            .field("keys", &self.keys_untracked())
            .field("observed", &self.inner.observer.get().is_some())
            .field("instance", &self.inner.instance)
            .finish()
    }
}
