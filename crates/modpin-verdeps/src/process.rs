//! The orchestration loop tying traversal, resolution, and patching together.
//!
//! [`process_deps`] spawns the traversal and the reviser, then merges three
//! streams in one consumer task: import specs and package specs coming out of
//! the walk, and fetch results coming back from revision lookups. Package
//! specs turn into package revisions immediately. Import specs are
//! deduplicated per dependency identity through waiting lists: the first spec
//! for an identity spawns exactly one fetch and seeds the list, later specs
//! queue on it, and the fetch result drains the whole list into import
//! revisions at once.
//!
//! Channel lifetimes drive shutdown. The spec channels close when the task
//! tree of the walk unwinds. The consumer holds one fetch-result sender and
//! drops it when the import stream ends, so the result channel closes exactly
//! when the last in-flight fetch finishes. The revision sender drops when the
//! consumer loop exits, which lets the reviser flush and join.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use modpin_runtime::Runtime;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinSet;

use crate::conventions::{
    compose_registry_import_path, import_identity_key, parse_import_path, ImportIdentity,
};
use crate::lookup::RevisionLookup;
use crate::patch::{revise_deps, ReviseDepsArgs};
use crate::resolve::{fetch_revision, FetchResult, FetchRevisionArgs};
use crate::spec::{ImportSpec, Revision};
use crate::sync::{ErrorAccumulator, ImportCounts, RevisionCache, WaitingList, WaitingListMap};
use crate::traverse::{read_package_dir, ReadPackageDirArgs};
use crate::{Error, Result};

pub struct ProcessDepsArgs {
    pub runtime: Arc<dyn Runtime>,
    pub lookup: Arc<dyn RevisionLookup>,
    pub package_dir_path: PathBuf,
    /// Identity of the package being versioned; its own sub-package imports
    /// resolve to `target_revision` without an external call.
    pub target_identity: ImportIdentity,
    pub target_revision: String,
    /// Commit timestamp of `target_revision`; dependencies resolve as of it.
    pub as_of: DateTime<Utc>,
    pub generated_internal_dir_name: Arc<String>,
}

/// Versions every eligible import under `package_dir_path`, rewriting source
/// files in place. Returns the composed summary of all non-fatal errors, if
/// any were recorded.
pub async fn process_deps(args: ProcessDepsArgs) -> Result<()> {
    let errors = Arc::new(ErrorAccumulator::new());
    let import_counts = Arc::new(ImportCounts::new());

    let (import_spec_tx, mut import_spec_rx) = unbounded_channel();
    let (package_spec_tx, mut package_spec_rx) = unbounded_channel();
    let (fetch_result_tx, mut fetch_result_rx) = unbounded_channel();
    let (revision_tx, revision_rx) = unbounded_channel();

    let traversal = tokio::spawn(read_package_dir(ReadPackageDirArgs {
        runtime: Arc::clone(&args.runtime),
        errors: Arc::clone(&errors),
        import_counts: Arc::clone(&import_counts),
        package_dir_path: args.package_dir_path,
        import_spec_tx,
        package_spec_tx,
        generated_internal_dir_name: Arc::clone(&args.generated_internal_dir_name),
    }));

    let reviser = tokio::spawn(revise_deps(ReviseDepsArgs {
        runtime: Arc::clone(&args.runtime),
        import_counts: Arc::clone(&import_counts),
        revision_rx,
        errors: Arc::clone(&errors),
    }));

    let mut processor = DepProcessor {
        lookup: args.lookup,
        target_identity: args.target_identity,
        target_revision: args.target_revision,
        as_of: args.as_of,
        generated_internal_dir_name: args.generated_internal_dir_name,
        revision_cache: RevisionCache::new(),
        waiting_lists: WaitingListMap::new(),
        errors: Arc::clone(&errors),
        revision_tx,
        fetch_result_tx: Some(fetch_result_tx),
        fetches: JoinSet::new(),
    };

    let mut imports_open = true;
    let mut packages_open = true;
    let mut results_open = true;
    while imports_open || packages_open || results_open {
        tokio::select! {
            spec = import_spec_rx.recv(), if imports_open => match spec {
                Some(spec) => processor.handle_import_spec(spec),
                None => {
                    imports_open = false;
                    // No further fetches can start; releasing this sender
                    // lets the result channel close with the last fetch.
                    processor.fetch_result_tx = None;
                }
            },
            spec = package_spec_rx.recv(), if packages_open => match spec {
                Some(spec) => {
                    let _ = processor.revision_tx.send(Revision::package(&spec));
                }
                None => packages_open = false,
            },
            result = fetch_result_rx.recv(), if results_open => match result {
                Some(result) => processor.handle_fetch_result(result),
                None => results_open = false,
            },
        }
    }

    processor.finish().await;
    drop(processor);

    let _ = traversal.await;
    let _ = reviser.await;

    match errors.compose() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Single-consumer state for the spec/result merge loop.
struct DepProcessor {
    lookup: Arc<dyn RevisionLookup>,
    target_identity: ImportIdentity,
    target_revision: String,
    as_of: DateTime<Utc>,
    generated_internal_dir_name: Arc<String>,
    revision_cache: RevisionCache,
    waiting_lists: WaitingListMap,
    errors: Arc<ErrorAccumulator>,
    revision_tx: UnboundedSender<Revision>,
    /// Held only while import specs can still arrive.
    fetch_result_tx: Option<UnboundedSender<FetchResult>>,
    fetches: JoinSet<()>,
}

impl DepProcessor {
    fn handle_import_spec(&mut self, spec: ImportSpec) {
        let key = import_identity_key(spec.import_path());

        if let Some(revision) = self.revision_cache.get(&key) {
            self.emit_import_revision(&spec, &revision);
            return;
        }

        if let Some(list) = self.waiting_lists.get(&key) {
            if list.add(spec.clone()) {
                return;
            }
            // Lost the race with the resolution clearing the list; it must
            // have populated the cache on the way.
            match self.revision_cache.get(&key) {
                Some(revision) => self.emit_import_revision(&spec, &revision),
                None => self.errors.add(Error::RevisionUnexpectedlyAbsent {
                    import_path: spec.import_path().to_string(),
                }),
            }
            return;
        }

        let (identity, _) = parse_import_path(spec.import_path());
        self.waiting_lists
            .insert_if_absent(key, Arc::new(WaitingList::new(spec)));
        if let Some(fetch_result_tx) = &self.fetch_result_tx {
            self.fetches.spawn(fetch_revision(FetchRevisionArgs {
                lookup: Arc::clone(&self.lookup),
                identity,
                target_identity: self.target_identity.clone(),
                target_revision: self.target_revision.clone(),
                as_of: self.as_of,
                result_tx: fetch_result_tx.clone(),
            }));
        }
    }

    fn handle_fetch_result(&mut self, result: FetchResult) {
        match result.outcome {
            Ok(revision) => {
                let key = result.identity.key();
                self.revision_cache.set_if_absent(key.as_str(), revision.as_str());
                if let Some(list) = self.waiting_lists.get(&key) {
                    if let Some(specs) = list.clear() {
                        for spec in specs {
                            self.emit_import_revision(&spec, &revision);
                        }
                    }
                }
            }
            // The waiting list stays put: its specs are reported as missed
            // at shutdown, never retried.
            Err(err) => self.errors.add(err),
        }
    }

    fn emit_import_revision(&self, spec: &ImportSpec, revision: &str) {
        let (identity, subpath) = parse_import_path(spec.import_path());
        let replacement = compose_registry_import_path(
            &identity,
            revision,
            &subpath,
            &self.generated_internal_dir_name,
        );
        let _ = self.revision_tx.send(Revision::import(spec, replacement));
    }

    /// Reports specs whose resolutions never arrived and reaps the fetch
    /// tasks. Called once every input stream has closed.
    async fn finish(&mut self) {
        for (key, list) in self.waiting_lists.drain() {
            if let Some(specs) = list.clear() {
                if !specs.is_empty() {
                    tracing::warn!(
                        identity = %key,
                        specs = specs.len(),
                        "dependency revision never resolved"
                    );
                }
            }
        }
        while self.fetches.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{LookupError, LookupResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    #[derive(Debug, Default)]
    struct StubLookup {
        revision: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RevisionLookup for StubLookup {
        async fn resolve_revision(
            &self,
            author: &str,
            repo: &str,
            _as_of: DateTime<Utc>,
        ) -> LookupResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.revision.clone().ok_or(LookupError::NotFound {
                author: author.to_string(),
                repo: repo.to_string(),
            })
        }

        async fn resolve_timestamp(
            &self,
            _author: &str,
            _repo: &str,
            _revision: &str,
        ) -> LookupResult<DateTime<Utc>> {
            unimplemented!("not exercised by these tests")
        }
    }

    struct Harness {
        processor: DepProcessor,
        lookup: Arc<StubLookup>,
        revision_rx: UnboundedReceiver<Revision>,
        fetch_result_rx: UnboundedReceiver<FetchResult>,
        errors: Arc<ErrorAccumulator>,
    }

    fn harness(resolved_revision: Option<&str>) -> Harness {
        let lookup = Arc::new(StubLookup {
            revision: resolved_revision.map(str::to_string),
            calls: AtomicUsize::new(0),
        });
        let errors = Arc::new(ErrorAccumulator::new());
        let (revision_tx, revision_rx) = unbounded_channel();
        let (fetch_result_tx, fetch_result_rx) = unbounded_channel();
        Harness {
            processor: DepProcessor {
                lookup: Arc::clone(&lookup) as Arc<dyn RevisionLookup>,
                target_identity: ImportIdentity::new("a", "b"),
                target_revision: "targetsha".to_string(),
                as_of: Utc::now(),
                generated_internal_dir_name: Arc::new("1a2b3c4d5e6f7890".to_string()),
                revision_cache: RevisionCache::new(),
                waiting_lists: WaitingListMap::new(),
                errors: Arc::clone(&errors),
                revision_tx,
                fetch_result_tx: Some(fetch_result_tx),
                fetches: JoinSet::new(),
            },
            lookup,
            revision_rx,
            fetch_result_rx,
            errors,
        }
    }

    fn spec(import_path: &str, file: &str) -> ImportSpec {
        ImportSpec::new(format!("\"{import_path}\""), 20, file)
    }

    #[tokio::test]
    async fn one_fetch_serves_every_spec_of_an_identity() {
        let mut h = harness(Some("sha2"));

        h.processor.handle_import_spec(spec("github.com/c/d", "/pkg/one.go"));
        h.processor.handle_import_spec(spec("github.com/c/d/e", "/pkg/two.go"));

        // Exactly one fetch was spawned; feed its result back.
        let result = h.fetch_result_rx.recv().await.unwrap();
        assert_eq!(h.lookup.calls.load(Ordering::SeqCst), 1);
        h.processor.handle_fetch_result(result);

        let first = h.revision_rx.recv().await.unwrap();
        let second = h.revision_rx.recv().await.unwrap();
        assert_eq!(first.path, PathBuf::from("/pkg/one.go"));
        assert_eq!(second.path, PathBuf::from("/pkg/two.go"));
        match second.kind {
            crate::spec::RevisionKind::Import { replacement, .. } => {
                assert_eq!(replacement, b"\"modpin.io/c/d@sha2/e\"".to_vec());
            }
            _ => unreachable!(),
        }
        assert!(h.errors.is_empty());
    }

    #[tokio::test]
    async fn cache_hits_bypass_the_waiting_lists_entirely() {
        let mut h = harness(Some("sha2"));
        h.processor.handle_import_spec(spec("github.com/c/d", "/pkg/one.go"));
        let result = h.fetch_result_rx.recv().await.unwrap();
        h.processor.handle_fetch_result(result);
        let _ = h.revision_rx.recv().await.unwrap();

        // A later spec for the same identity resolves straight from cache.
        h.processor.handle_import_spec(spec("github.com/c/d/x", "/pkg/three.go"));
        let rev = h.revision_rx.recv().await.unwrap();
        assert_eq!(rev.path, PathBuf::from("/pkg/three.go"));
        assert_eq!(h.lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn losing_the_waiting_list_race_falls_back_to_the_cache() {
        let mut h = harness(Some("sha2"));
        h.processor.handle_import_spec(spec("github.com/c/d", "/pkg/one.go"));

        // Simulate the race: the list is cleared by the arriving result
        // while another spec for the identity is already in flight.
        let result = h.fetch_result_rx.recv().await.unwrap();
        h.processor.handle_fetch_result(result);
        // Bypass the cache-hit fast path to reach the cleared list directly.
        let list = h.processor.waiting_lists.get("c/d").unwrap();
        assert!(!list.add(spec("github.com/c/d/e", "/pkg/two.go")));
        match h.processor.revision_cache.get("c/d") {
            Some(revision) => {
                h.processor
                    .emit_import_revision(&spec("github.com/c/d/e", "/pkg/two.go"), &revision);
            }
            None => unreachable!("the result populated the cache before clearing"),
        }

        let _ = h.revision_rx.recv().await.unwrap();
        let rev = h.revision_rx.recv().await.unwrap();
        assert_eq!(rev.path, PathBuf::from("/pkg/two.go"));
        assert!(h.errors.is_empty());
    }

    #[tokio::test]
    async fn cleared_list_with_an_empty_cache_records_an_error() {
        let mut h = harness(None);
        h.processor.handle_import_spec(spec("github.com/c/d", "/pkg/one.go"));

        // The fetch failed: no cache entry, and the error is recorded.
        let result = h.fetch_result_rx.recv().await.unwrap();
        h.processor.handle_fetch_result(result);
        assert_eq!(h.errors.len(), 1);

        // Force the cleared state a successful resolution would have left,
        // without a cache entry backing it up.
        h.processor.waiting_lists.get("c/d").unwrap().clear();
        h.processor.handle_import_spec(spec("github.com/c/d/e", "/pkg/two.go"));

        let recorded = h.errors.take_all();
        assert!(matches!(
            recorded.last().unwrap(),
            Error::RevisionUnexpectedlyAbsent { import_path } if import_path == "github.com/c/d/e"
        ));
    }

    #[tokio::test]
    async fn self_imports_never_reach_the_lookup() {
        let mut h = harness(None);
        h.processor.handle_import_spec(spec("github.com/a/b/sub", "/pkg/one.go"));

        let result = h.fetch_result_rx.recv().await.unwrap();
        h.processor.handle_fetch_result(result);

        let rev = h.revision_rx.recv().await.unwrap();
        match rev.kind {
            crate::spec::RevisionKind::Import { replacement, .. } => {
                assert_eq!(replacement, b"\"modpin.io/a/b@targetsha/sub\"".to_vec());
            }
            _ => unreachable!(),
        }
        assert_eq!(h.lookup.calls.load(Ordering::SeqCst), 0);
        assert!(h.errors.is_empty());
    }

    #[tokio::test]
    async fn unresolved_specs_are_reported_as_missed_at_shutdown() {
        let mut h = harness(None);
        h.processor.handle_import_spec(spec("github.com/c/d", "/pkg/one.go"));
        let result = h.fetch_result_rx.recv().await.unwrap();
        h.processor.handle_fetch_result(result);

        h.processor.fetch_result_tx = None;
        h.processor.finish().await;

        // The failure was recorded; the queued spec produced no revision.
        assert_eq!(h.errors.len(), 1);
        drop(h.processor);
        assert!(h.revision_rx.recv().await.is_none());
    }
}
