// Copyright (c) 2025 Admiral Authors
// SPDX-License-Identifier: MIT

//! In-memory finalizer manipulation.
//!
//! Finalizers are edited on the reconciler's working copy of an object; the
//! patch helper persists the change together with the rest of the reconcile.
//! This keeps finalizer ordering explicit in the deployment reconciler, which
//! adds one finalizer per reconcile pass and removes each one only after its
//! cleanup handler ran to completion.

use kube::api::ObjectMeta;

/// Whether the object carries the given finalizer.
#[must_use]
pub fn contains_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|list| list.iter().any(|f| f == finalizer))
}

/// Add a finalizer if not already present. Returns true when it was added.
pub fn add_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    if contains_finalizer(meta, finalizer) {
        return false;
    }
    meta.finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
    true
}

/// Remove a finalizer if present. Returns true when it was removed.
pub fn remove_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    let Some(list) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = list.len();
    list.retain(|f| f != finalizer);
    list.len() != before
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
