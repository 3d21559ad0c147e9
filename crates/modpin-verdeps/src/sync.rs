//! Small thread-safe registries shared across pipeline tasks.
//!
//! Each registry is owned by one versioning run and guards its state with the
//! narrowest possible critical section - none of them ever holds a lock
//! across I/O.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::spec::ImportSpec;
use crate::Error;

/// Per-file expected import-revision counts, plus a running total.
///
/// The last write for a path is authoritative: vendor buffering republishes a
/// corrected count after reclassification, and the total tracks the
/// correction.
#[derive(Debug, Default)]
pub struct ImportCounts {
    inner: RwLock<ImportCountsInner>,
}

#[derive(Debug, Default)]
struct ImportCountsInner {
    counts: FxHashMap<PathBuf, usize>,
    total: usize,
}

impl ImportCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: impl Into<PathBuf>, count: usize) {
        let mut inner = self.inner.write();
        let previous = inner.counts.insert(path.into(), count).unwrap_or(0);
        inner.total = inner.total + count - previous;
    }

    /// The expected count for `path`; zero when never set.
    pub fn count_of(&self, path: &Path) -> usize {
        self.inner.read().counts.get(path).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.inner.read().total
    }
}

/// Identity-key -> resolved revision cache. Populated at most once per key,
/// read many times.
#[derive(Debug, Default)]
pub struct RevisionCache {
    inner: RwLock<FxHashMap<String, String>>,
}

impl RevisionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().get(key).cloned()
    }

    pub fn set_if_absent(&self, key: impl Into<String>, revision: impl Into<String>) {
        self.inner.write().entry(key.into()).or_insert_with(|| revision.into());
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Per-identity queue of specs awaiting an in-flight resolution.
///
/// An explicit two-state machine: `Open` accepts adds, the first `clear`
/// yields the queued specs and moves to `Cleared`, after which adds fail and
/// further clears yield nothing. Callers that lose the add race re-check the
/// revision cache.
#[derive(Debug)]
pub struct WaitingList {
    state: Mutex<WaitingListState>,
}

#[derive(Debug)]
enum WaitingListState {
    Open(Vec<ImportSpec>),
    Cleared,
}

impl WaitingList {
    pub fn new(initial_spec: ImportSpec) -> Self {
        Self {
            state: Mutex::new(WaitingListState::Open(vec![initial_spec])),
        }
    }

    /// Queues `spec`. Returns false if the list has already been cleared.
    pub fn add(&self, spec: ImportSpec) -> bool {
        let mut state = self.state.lock();
        match &mut *state {
            WaitingListState::Open(specs) => {
                specs.push(spec);
                true
            }
            WaitingListState::Cleared => false,
        }
    }

    /// Empties the list permanently. Only the first clear yields specs.
    pub fn clear(&self) -> Option<Vec<ImportSpec>> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, WaitingListState::Cleared) {
            WaitingListState::Open(specs) => Some(specs),
            WaitingListState::Cleared => None,
        }
    }
}

/// Identity-key -> [`WaitingList`] registry.
#[derive(Debug, Default)]
pub struct WaitingListMap {
    inner: Mutex<FxHashMap<String, Arc<WaitingList>>>,
}

impl WaitingListMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<WaitingList>> {
        self.inner.lock().get(key).cloned()
    }

    pub fn insert_if_absent(&self, key: impl Into<String>, list: Arc<WaitingList>) {
        self.inner.lock().entry(key.into()).or_insert(list);
    }

    /// Removes and returns every waiting list, leaving the map empty. Used at
    /// shutdown to clear lists whose resolutions will never arrive.
    pub fn drain(&self) -> Vec<(String, Arc<WaitingList>)> {
        self.inner.lock().drain().collect()
    }
}

/// Thread-safe append-only error list with a single composing operation.
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
    errors: Mutex<Vec<Error>>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, err: Error) {
        self.errors.lock().push(err);
    }

    pub fn extend(&self, errs: impl IntoIterator<Item = Error>) {
        self.errors.lock().extend(errs);
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    /// Removes and returns every accumulated error.
    pub fn take_all(&self) -> Vec<Error> {
        std::mem::take(&mut *self.errors.lock())
    }

    /// Composes every accumulated error into one summary error, or `None`
    /// when nothing was recorded.
    pub fn compose(&self) -> Option<Error> {
        let errors = self.errors.lock();
        if errors.is_empty() {
            return None;
        }
        let summary = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Some(Error::Accumulated {
            count: errors.len(),
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(path: &str) -> ImportSpec {
        ImportSpec::new("\"github.com/a/b\"", 0, path)
    }

    #[test]
    fn import_counts_last_write_wins_and_total_tracks() {
        let counts = ImportCounts::new();
        counts.set("/pkg/a.go", 3);
        counts.set("/pkg/b.go", 2);
        assert_eq!(counts.total(), 5);

        // A corrected count replaces the old one outright.
        counts.set("/pkg/a.go", 1);
        assert_eq!(counts.count_of(Path::new("/pkg/a.go")), 1);
        assert_eq!(counts.total(), 3);

        assert_eq!(counts.count_of(Path::new("/pkg/unseen.go")), 0);
    }

    #[test]
    fn revision_cache_populates_at_most_once() {
        let cache = RevisionCache::new();
        cache.set_if_absent("a/b", "sha1");
        cache.set_if_absent("a/b", "sha2");
        assert_eq!(cache.get("a/b").as_deref(), Some("sha1"));
        assert_eq!(cache.get("c/d"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn waiting_list_add_fails_once_cleared() {
        let list = WaitingList::new(spec("/pkg/a.go"));
        assert!(list.add(spec("/pkg/b.go")));

        let specs = list.clear().expect("first clear yields specs");
        assert_eq!(specs.len(), 2);

        assert!(!list.add(spec("/pkg/c.go")));
        assert!(list.clear().is_none(), "second clear yields nothing");
    }

    #[test]
    fn waiting_list_map_insert_if_absent_keeps_the_first() {
        let map = WaitingListMap::new();
        let first = Arc::new(WaitingList::new(spec("/pkg/a.go")));
        map.insert_if_absent("a/b", Arc::clone(&first));
        map.insert_if_absent("a/b", Arc::new(WaitingList::new(spec("/pkg/b.go"))));

        let got = map.get("a/b").unwrap();
        assert!(Arc::ptr_eq(&got, &first));
        assert_eq!(map.drain().len(), 1);
        assert!(map.get("a/b").is_none());
    }

    #[test]
    fn error_accumulator_composes_a_single_summary() {
        let acc = ErrorAccumulator::new();
        assert!(acc.compose().is_none());

        acc.add(Error::Diff("first".into()));
        acc.add(Error::Diff("second".into()));

        let composed = acc.compose().unwrap();
        let message = composed.to_string();
        assert!(message.contains("2 problem(s)"), "got: {message}");
        assert!(message.contains("first"));
        assert!(message.contains("second"));
    }
}
