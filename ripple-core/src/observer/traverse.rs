//! Deep dependency collection.
//!
//! A deep watcher must re-run when anything nested inside its value
//! changes. [`traverse`] reads the whole value graph while the watcher is
//! still the current context, which subscribes it to every property and
//! structural node it passes. Visited containers are remembered by identity,
//! so self-referential graphs terminate.

use std::collections::HashSet;

use super::Value;

/// Touch every nested property of `value`, registering the current watcher.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    visit(value, &mut seen);
}

fn visit(value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Object(obj) => {
            if obj.is_raw() || !seen.insert(obj.addr()) {
                return;
            }
            if let Some(observer) = obj.observer() {
                observer.dep().depend();
            }
            for key in obj.keys_untracked() {
                if let Some(child) = obj.get(&key) {
                    visit(&child, seen);
                }
            }
        }
        Value::Array(arr) => {
            if arr.is_raw() || !seen.insert(arr.addr()) {
                return;
            }
            if let Some(observer) = arr.observer() {
                observer.dep().depend();
            }
            for item in arr.items_untracked() {
                visit(&item, seen);
            }
        }
        _ => {}
    }
}

/// Register the current watcher with the structural node of every container
/// element of `items`, descending into nested arrays.
///
/// Array slots are not intercepted, so this is how replacing or mutating an
/// element stays observable to whoever read the array.
pub fn depend_array(items: &[Value]) {
    let mut seen = HashSet::new();
    depend_items(items, &mut seen);
}

fn depend_items(items: &[Value], seen: &mut HashSet<usize>) {
    for item in items {
        if let Some(observer) = item.observer() {
            observer.dep().depend();
        }
        if let Value::Array(arr) = item {
            if seen.insert(arr.addr()) {
                depend_items(&arr.items_untracked(), seen);
            }
        }
    }
}
