//! Hierarchical vendoring visibility.
//!
//! A [`VendorContext`] records which import paths are vendored at a given
//! directory scope. Contexts form a chain: a vendor subtree gets a child
//! context whose parent is the enclosing scope, and `contains` consults the
//! whole chain. A child is populated while its vendor subtree is traversed
//! and finalized only once that traversal completes, because vendored
//! packages may reference each other and membership is unknowable until the
//! subtree has been fully walked.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashSet;

#[derive(Debug, Default)]
pub struct VendorContext {
    packages: RwLock<FxHashSet<String>>,
    parent: Option<Arc<VendorContext>>,
    finalized: AtomicBool,
    depth: usize,
}

impl VendorContext {
    /// Creates a root context: no parent, depth zero, not finalized.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `package_path` as vendored at this scope.
    ///
    /// # Panics
    ///
    /// Panics if the context has been finalized. Adding to a finalized
    /// context is a programming error, not a runtime condition.
    pub fn add(&self, package_path: impl Into<String>) {
        assert!(
            !self.is_finalized(),
            "add cannot be called on a finalized vendor context"
        );
        self.packages.write().insert(package_path.into());
    }

    /// True if `package_path` is vendored at this scope or any ancestor scope.
    pub fn contains(&self, package_path: &str) -> bool {
        if self.packages.read().contains(package_path) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.contains(package_path),
            None => false,
        }
    }

    /// Freezes this scope. Idempotent.
    pub fn finalize(&self) {
        self.finalized.store(true, Ordering::Release);
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns a new context one level deeper whose parent is `self`.
    pub fn spawn_child(self: &Arc<Self>) -> Arc<VendorContext> {
        Arc::new(VendorContext {
            packages: RwLock::new(FxHashSet::default()),
            parent: Some(Arc::clone(self)),
            finalized: AtomicBool::new(false),
            depth: self.depth + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_context_starts_empty_and_open() {
        let ctx = VendorContext::new();
        assert!(!ctx.is_finalized());
        assert_eq!(ctx.depth(), 0);
        assert!(!ctx.contains("github.com/a/b"));
    }

    #[test]
    fn contains_consults_ancestors_but_not_descendants() {
        let root = VendorContext::new();
        root.add("github.com/x/y");
        root.finalize();

        let child = root.spawn_child();
        child.add("github.com/p/q");
        child.finalize();

        // Child sees its own entries plus everything vendored above it.
        assert!(child.contains("github.com/x/y"));
        assert!(child.contains("github.com/p/q"));
        assert_eq!(child.depth(), 1);

        // The parent never sees what a vendor subtree below it vendored.
        assert!(!root.contains("github.com/p/q"));
    }

    #[test]
    fn descendants_of_a_finalized_context_still_see_it() {
        let root = VendorContext::new();
        root.add("github.com/x/y");
        root.finalize();

        let grandchild = root.spawn_child().spawn_child();
        assert!(grandchild.contains("github.com/x/y"));
        assert_eq!(grandchild.depth(), 2);
    }

    #[test]
    fn finalize_is_idempotent() {
        let ctx = VendorContext::new();
        ctx.finalize();
        ctx.finalize();
        assert!(ctx.is_finalized());
    }

    #[test]
    #[should_panic(expected = "finalized vendor context")]
    fn add_after_finalize_panics() {
        let ctx = VendorContext::new();
        ctx.finalize();
        ctx.add("github.com/a/b");
    }
}
