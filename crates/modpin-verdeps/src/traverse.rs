//! Recursive, vendor-aware package directory traversal.
//!
//! Traversal is a dynamically-spawned task tree: every subdirectory and every
//! Go file gets its own task, and a directory is done only once all of its
//! children have joined. Vendor subtrees are the exception to the fan-out:
//! they are traversed while the parent waits, with their specs routed through
//! [`buffer_vendorables`] so that imports already vendored in the enclosing
//! scope can be dropped once the walk settles. The vendored package paths
//! themselves accumulate in a child context that takes effect for the rest of
//! the enclosing scope only after the subtree has joined. The reserved
//! `internal` directory
//! is renamed before its contents are trusted; a failed rename abandons that
//! subtree.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use modpin_runtime::{DirEntry, Runtime};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinSet;

use crate::analyze::{analyze_source_file, AnalyzeFileArgs};
use crate::buffer::{buffer_vendorables, BufferVendorablesArgs};
use crate::conventions::{
    GO_FILE_SUFFIX, INTERNAL_DIR_NAME, VENDOR_DIR_NAME, VENDOR_SRC_DIR_NAME,
};
use crate::spec::{ImportSpec, PackageSpec};
use crate::sync::{ErrorAccumulator, ImportCounts};
use crate::vendor::VendorContext;
use crate::Error;

pub struct ReadPackageDirArgs {
    pub runtime: Arc<dyn Runtime>,
    pub errors: Arc<ErrorAccumulator>,
    pub import_counts: Arc<ImportCounts>,
    pub package_dir_path: PathBuf,
    pub import_spec_tx: UnboundedSender<ImportSpec>,
    pub package_spec_tx: UnboundedSender<PackageSpec>,
    pub generated_internal_dir_name: Arc<String>,
}

/// Walks a package directory tree, emitting import and package specs for
/// every Go file. Both spec channels close when the walk completes: the
/// senders are owned by the task tree and dropped on the way out.
pub async fn read_package_dir(args: ReadPackageDirArgs) {
    let traversal_errors = Arc::new(ErrorAccumulator::new());

    traverse_package_dir(TraverseDirArgs {
        runtime: args.runtime,
        errors: Arc::clone(&traversal_errors),
        dir_path: args.package_dir_path.clone(),
        sub_dir_path: String::new(),
        in_vendor_dir: false,
        import_counts: Some(args.import_counts),
        vendor_context: VendorContext::new(),
        vendor_registry: None,
        import_spec_tx: args.import_spec_tx,
        package_spec_tx: args.package_spec_tx,
        generated_internal_dir_name: args.generated_internal_dir_name,
    })
    .await;

    let errors = traversal_errors.take_all();
    if !errors.is_empty() {
        let summary = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        args.errors.add(Error::Traversal {
            path: args.package_dir_path,
            count: errors.len(),
            summary,
        });
    }
}

pub(crate) struct TraverseDirArgs {
    pub runtime: Arc<dyn Runtime>,
    pub errors: Arc<ErrorAccumulator>,
    /// Root of this traversal; vendor subtrees restart it at the vendor root.
    pub dir_path: PathBuf,
    /// Slash-separated path below `dir_path`; doubles as the vendored
    /// package key inside vendor subtrees.
    pub sub_dir_path: String,
    pub in_vendor_dir: bool,
    pub import_counts: Option<Arc<ImportCounts>>,
    /// The context files at this level resolve imports against.
    pub vendor_context: Arc<VendorContext>,
    /// Inside a vendor subtree, the child context being populated for the
    /// scope enclosing that subtree. Vendored package paths register here,
    /// not into `vendor_context`: vendored siblings do not vendor for one
    /// another.
    pub vendor_registry: Option<Arc<VendorContext>>,
    pub import_spec_tx: UnboundedSender<ImportSpec>,
    pub package_spec_tx: UnboundedSender<PackageSpec>,
    pub generated_internal_dir_name: Arc<String>,
}

/// Boxed for recursion: each level spawns further traversals of itself.
pub(crate) fn traverse_package_dir(
    mut args: TraverseDirArgs,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let full_dir_path = if args.sub_dir_path.is_empty() {
            args.dir_path.clone()
        } else {
            args.dir_path.join(&args.sub_dir_path)
        };

        let entries = match args.runtime.read_dir(&full_dir_path).await {
            Ok(entries) => entries,
            Err(err) => {
                args.errors.add(Error::Runtime(err));
                return;
            }
        };

        let (vendor_root, sub_dir_names, go_file_paths) =
            classify_dir_entries(&args.runtime, &full_dir_path, entries).await;

        // A directory below a vendor root is a vendored package path. It
        // registers into the context being built for the *next* scope:
        // vendored siblings do not vendor for one another.
        if args.in_vendor_dir && !args.sub_dir_path.is_empty() {
            if let Some(registry) = &args.vendor_registry {
                registry.add(args.sub_dir_path.clone());
            }
        }

        // A vendor directory shadows everything else at this level, so it is
        // traversed first and synchronously relative to this task.
        if let Some(vendor_root) = vendor_root {
            let child_context = args.vendor_context.spawn_child();

            let sub_errors = Arc::new(ErrorAccumulator::new());
            let (sub_import_tx, sub_import_rx) = unbounded_channel();
            let (sub_package_tx, sub_package_rx) = unbounded_channel();

            let sub_traversal = tokio::spawn(traverse_package_dir(TraverseDirArgs {
                runtime: Arc::clone(&args.runtime),
                errors: Arc::clone(&sub_errors),
                dir_path: vendor_root,
                sub_dir_path: String::new(),
                in_vendor_dir: true,
                import_counts: None,
                // Vendored code resolves imports against the scope enclosing
                // the boundary; the child context it populates only comes
                // into force afterwards.
                vendor_context: Arc::clone(&args.vendor_context),
                vendor_registry: Some(Arc::clone(&child_context)),
                import_spec_tx: sub_import_tx.clone(),
                package_spec_tx: sub_package_tx.clone(),
                generated_internal_dir_name: Arc::clone(&args.generated_internal_dir_name),
            }));

            let buffer = tokio::spawn(buffer_vendorables(BufferVendorablesArgs {
                import_counts: args.import_counts.clone(),
                vendor_context: Arc::clone(&args.vendor_context),
                input_import_rx: sub_import_rx,
                input_package_rx: sub_package_rx,
                output_import_tx: args.import_spec_tx.clone(),
                output_package_tx: args.package_spec_tx.clone(),
            }));

            // This task retains sender clones, so the sub-channels stay open
            // until the sub-traversal has joined and the child context is
            // final; only then may the buffer start reclassifying.
            let _ = sub_traversal.await;
            child_context.finalize();
            drop(sub_import_tx);
            drop(sub_package_tx);
            let _ = buffer.await;

            // Everything after the boundary at this level resolves imports
            // against the now-complete vendored set.
            args.vendor_context = child_context;

            let sub_errors = sub_errors.take_all();
            if !sub_errors.is_empty() {
                args.errors.extend(sub_errors);
                return;
            }
        }

        let mut children = JoinSet::new();

        for mut sub_dir_name in sub_dir_names {
            // Internal directories must be renamed before traversal results
            // can be trusted; versioned import paths will reference the
            // generated name instead.
            if sub_dir_name == INTERNAL_DIR_NAME {
                let from = full_dir_path.join(INTERNAL_DIR_NAME);
                let to = full_dir_path.join(args.generated_internal_dir_name.as_str());
                if let Err(err) = args.runtime.rename(&from, &to).await {
                    args.errors.add(Error::Rename {
                        from,
                        to,
                        source: err,
                    });
                    return;
                }
                sub_dir_name = args.generated_internal_dir_name.to_string();
            }

            let sub_dir_path = if args.sub_dir_path.is_empty() {
                sub_dir_name
            } else {
                format!("{}/{}", args.sub_dir_path, sub_dir_name)
            };
            children.spawn(traverse_package_dir(TraverseDirArgs {
                runtime: Arc::clone(&args.runtime),
                errors: Arc::clone(&args.errors),
                dir_path: args.dir_path.clone(),
                sub_dir_path,
                in_vendor_dir: args.in_vendor_dir,
                import_counts: args.import_counts.clone(),
                vendor_context: Arc::clone(&args.vendor_context),
                vendor_registry: args.vendor_registry.clone(),
                import_spec_tx: args.import_spec_tx.clone(),
                package_spec_tx: args.package_spec_tx.clone(),
                generated_internal_dir_name: Arc::clone(&args.generated_internal_dir_name),
            }));
        }

        for file_path in go_file_paths {
            children.spawn(analyze_source_file(AnalyzeFileArgs {
                runtime: Arc::clone(&args.runtime),
                file_path,
                vendor_context: Arc::clone(&args.vendor_context),
                import_counts: args.import_counts.clone(),
                import_spec_tx: args.import_spec_tx.clone(),
                package_spec_tx: args.package_spec_tx.clone(),
                errors: Arc::clone(&args.errors),
            }));
        }

        // Join-all barrier: this directory is done only once every child
        // traversal and file analysis has completed.
        while children.join_next().await.is_some() {}
    })
}

/// Splits a directory's entries into the effective vendor root (if any), the
/// other subdirectory names, and the Go file paths.
async fn classify_dir_entries(
    runtime: &Arc<dyn Runtime>,
    full_dir_path: &PathBuf,
    entries: Vec<DirEntry>,
) -> (Option<PathBuf>, Vec<String>, Vec<PathBuf>) {
    let mut vendor_root = None;
    let mut sub_dir_names = Vec::new();
    let mut go_file_paths = Vec::new();

    for entry in entries {
        if entry.is_dir {
            if entry.name == VENDOR_DIR_NAME {
                // A vendor/src directory, when present, is the true vendor root.
                let src_path = full_dir_path.join(VENDOR_DIR_NAME).join(VENDOR_SRC_DIR_NAME);
                vendor_root = match runtime.metadata(&src_path).await {
                    Ok(meta) if meta.is_dir => Some(src_path),
                    _ => Some(full_dir_path.join(VENDOR_DIR_NAME)),
                };
            } else {
                sub_dir_names.push(entry.name);
            }
        } else if entry.name.ends_with(GO_FILE_SUFFIX) {
            go_file_paths.push(full_dir_path.join(entry.name));
        }
    }

    (vendor_root, sub_dir_names, go_file_paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use modpin_runtime::test_utils::TestRuntime;
    use std::path::Path;

    struct Collected {
        imports: Vec<ImportSpec>,
        packages: Vec<PackageSpec>,
        errors: Arc<ErrorAccumulator>,
        import_counts: Arc<ImportCounts>,
    }

    async fn read_tree(root: &Path) -> Collected {
        let errors = Arc::new(ErrorAccumulator::new());
        let import_counts = Arc::new(ImportCounts::new());
        let (import_tx, mut import_rx) = unbounded_channel();
        let (package_tx, mut package_rx) = unbounded_channel();

        read_package_dir(ReadPackageDirArgs {
            runtime: Arc::new(TestRuntime::new(root.to_path_buf())),
            errors: Arc::clone(&errors),
            import_counts: Arc::clone(&import_counts),
            package_dir_path: root.to_path_buf(),
            import_spec_tx: import_tx,
            package_spec_tx: package_tx,
            generated_internal_dir_name: Arc::new("1a2b3c4d5e6f7890".to_string()),
        })
        .await;

        let mut imports = Vec::new();
        while let Some(spec) = import_rx.recv().await {
            imports.push(spec);
        }
        let mut packages = Vec::new();
        while let Some(spec) = package_rx.recv().await {
            packages.push(spec);
        }
        Collected {
            imports,
            packages,
            errors,
            import_counts,
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn walks_nested_directories_and_collects_specs() {
        let temp = tempfile::TempDir::new().unwrap();
        write(
            temp.path(),
            "main.go",
            "package main\n\nimport \"github.com/a/b\"\n",
        );
        write(
            temp.path(),
            "sub/util.go",
            "package sub\n\nimport (\n\t\"fmt\"\n\t\"github.com/c/d\"\n)\n",
        );
        write(temp.path(), "sub/README.md", "not go\n");

        let collected = read_tree(temp.path()).await;
        assert!(collected.errors.is_empty());
        assert_eq!(collected.packages.len(), 2);
        assert_eq!(collected.imports.len(), 2);
        assert_eq!(collected.import_counts.total(), 2);
    }

    #[tokio::test]
    async fn renames_the_internal_directory_before_descending() {
        let temp = tempfile::TempDir::new().unwrap();
        write(
            temp.path(),
            "internal/helpers/helpers.go",
            "package helpers\n\nimport \"github.com/a/b\"\n",
        );

        let collected = read_tree(temp.path()).await;
        assert!(collected.errors.is_empty());

        // The directory was renamed on disk and its files were analyzed
        // under the generated name.
        assert!(!temp.path().join("internal").exists());
        let renamed = temp.path().join("1a2b3c4d5e6f7890/helpers/helpers.go");
        assert!(renamed.exists());
        assert_eq!(collected.imports.len(), 1);
        assert_eq!(collected.imports[0].file_path, renamed);
    }

    #[tokio::test]
    async fn vendored_imports_are_invisible_to_the_vendored_tree_only() {
        let temp = tempfile::TempDir::new().unwrap();
        // A file outside the vendor tree importing a vendored package: the
        // import stays untouched because Go resolves it against vendor/.
        write(
            temp.path(),
            "lib/main.go",
            "package lib\n\nimport \"github.com/x/y\"\n",
        );
        write(
            temp.path(),
            "lib/vendor/github.com/x/y/y.go",
            "package y\n",
        );
        // A vendored package importing a *different* vendored package: that
        // import is external to it and must be forwarded.
        write(
            temp.path(),
            "lib/vendor/github.com/p/q/q.go",
            "package q\n\nimport \"github.com/x/y\"\n",
        );

        let collected = read_tree(temp.path()).await;
        assert!(collected.errors.is_empty());

        let import_files: Vec<&Path> = collected
            .imports
            .iter()
            .map(|s| s.file_path.as_path())
            .collect();
        assert_eq!(
            import_files,
            vec![temp.path().join("lib/vendor/github.com/p/q/q.go").as_path()],
            "only the vendored package's non-sibling import survives"
        );
        assert_eq!(
            collected
                .import_counts
                .count_of(&temp.path().join("lib/main.go")),
            0
        );
    }

    #[tokio::test]
    async fn vendor_src_is_the_effective_vendor_root() {
        let temp = tempfile::TempDir::new().unwrap();
        write(
            temp.path(),
            "main.go",
            "package main\n\nimport \"github.com/x/y\"\n",
        );
        write(
            temp.path(),
            "vendor/src/github.com/x/y/y.go",
            "package y\n",
        );

        let collected = read_tree(temp.path()).await;
        assert!(collected.errors.is_empty());
        assert!(
            collected.imports.is_empty(),
            "the import is vendored under vendor/src and must not surface"
        );
    }

    #[tokio::test]
    async fn unreadable_files_record_errors_but_do_not_stop_siblings() {
        let temp = tempfile::TempDir::new().unwrap();
        write(temp.path(), "bad.go", "not a go file at all\n");
        write(
            temp.path(),
            "good.go",
            "package good\n\nimport \"github.com/a/b\"\n",
        );

        let collected = read_tree(temp.path()).await;
        assert_eq!(collected.errors.len(), 1, "one composed traversal error");
        assert_eq!(collected.imports.len(), 1);
        assert_eq!(collected.imports[0].file_path, temp.path().join("good.go"));
    }
}
