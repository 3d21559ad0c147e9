//! Per-file source analysis.
//!
//! One analysis task runs per discovered Go file: scan the file, keep the
//! imports that are eligible for versioning (GitHub-hosted and not vendored
//! in the current scope), register the file's expected import count, and emit
//! the package spec plus the surviving import specs. A file that fails to
//! scan contributes nothing; the error is accumulated and sibling work
//! continues.

use std::path::PathBuf;
use std::sync::Arc;

use modpin_runtime::Runtime;
use tokio::sync::mpsc::UnboundedSender;

use crate::conventions::{unquote_literal, GITHUB_PREFIX};
use crate::parser::scan_imports;
use crate::spec::{ImportSpec, PackageSpec};
use crate::sync::{ErrorAccumulator, ImportCounts};
use crate::vendor::VendorContext;
use crate::Error;

pub struct AnalyzeFileArgs {
    pub runtime: Arc<dyn Runtime>,
    pub file_path: PathBuf,
    pub vendor_context: Arc<VendorContext>,
    /// `None` inside a vendor subtree; the vendorable buffer publishes the
    /// corrected counts there instead.
    pub import_counts: Option<Arc<ImportCounts>>,
    pub import_spec_tx: UnboundedSender<ImportSpec>,
    pub package_spec_tx: UnboundedSender<PackageSpec>,
    pub errors: Arc<ErrorAccumulator>,
}

/// Analyzes one source file and emits its specs.
pub async fn analyze_source_file(args: AnalyzeFileArgs) {
    let content = match args.runtime.read_file(&args.file_path).await {
        Ok(content) => content,
        Err(err) => {
            args.errors.add(Error::Runtime(err));
            return;
        }
    };

    let scanned = match scan_imports(&content) {
        Ok(scanned) => scanned,
        Err(err) => {
            args.errors.add(Error::Parse {
                path: args.file_path,
                source: err,
            });
            return;
        }
    };

    let specs: Vec<ImportSpec> = scanned
        .imports
        .into_iter()
        .filter(|import| {
            let import_path = unquote_literal(&import.literal);
            import_path.starts_with(GITHUB_PREFIX) && !args.vendor_context.contains(import_path)
        })
        .map(|import| ImportSpec::new(import.literal, import.offset, args.file_path.clone()))
        .collect();

    // The count must be authoritative before any of this file's specs are
    // considered complete downstream.
    if let Some(import_counts) = &args.import_counts {
        import_counts.set(&args.file_path, specs.len());
    }

    let _ = args
        .package_spec_tx
        .send(PackageSpec::new(scanned.package_offset, args.file_path));
    for spec in specs {
        let _ = args.import_spec_tx.send(spec);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modpin_runtime::test_utils::TestRuntime;
    use tokio::sync::mpsc::unbounded_channel;

    struct Harness {
        _temp: tempfile::TempDir,
        file_path: PathBuf,
        vendor_context: Arc<VendorContext>,
        import_counts: Arc<ImportCounts>,
        errors: Arc<ErrorAccumulator>,
        runtime: Arc<dyn Runtime>,
    }

    fn harness(source: &[u8]) -> Harness {
        let temp = tempfile::TempDir::new().unwrap();
        let file_path = temp.path().join("main.go");
        std::fs::write(&file_path, source).unwrap();
        Harness {
            runtime: Arc::new(TestRuntime::new(temp.path().to_path_buf())),
            _temp: temp,
            file_path,
            vendor_context: VendorContext::new(),
            import_counts: Arc::new(ImportCounts::new()),
            errors: Arc::new(ErrorAccumulator::new()),
        }
    }

    async fn run(h: &Harness) -> (Vec<ImportSpec>, Vec<PackageSpec>) {
        let (import_tx, mut import_rx) = unbounded_channel();
        let (package_tx, mut package_rx) = unbounded_channel();

        analyze_source_file(AnalyzeFileArgs {
            runtime: Arc::clone(&h.runtime),
            file_path: h.file_path.clone(),
            vendor_context: Arc::clone(&h.vendor_context),
            import_counts: Some(Arc::clone(&h.import_counts)),
            import_spec_tx: import_tx,
            package_spec_tx: package_tx,
            errors: Arc::clone(&h.errors),
        })
        .await;

        let mut imports = Vec::new();
        while let Ok(spec) = import_rx.try_recv() {
            imports.push(spec);
        }
        let mut packages = Vec::new();
        while let Ok(spec) = package_rx.try_recv() {
            packages.push(spec);
        }
        (imports, packages)
    }

    #[tokio::test]
    async fn emits_only_github_imports_and_registers_the_count() {
        let h = harness(
            b"package main\n\nimport (\n\t\"fmt\"\n\t\"github.com/a/b\"\n\t\"github.com/c/d/e\"\n)\n",
        );
        let (imports, packages) = run(&h).await;

        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].offset, 0);
        let literals: Vec<&str> = imports.iter().map(|s| s.literal.as_str()).collect();
        assert_eq!(literals, vec!["\"github.com/a/b\"", "\"github.com/c/d/e\""]);
        assert_eq!(h.import_counts.count_of(&h.file_path), 2);
        assert!(h.errors.is_empty());
    }

    #[tokio::test]
    async fn vendored_imports_are_filtered_out() {
        let h = harness(b"package main\n\nimport (\n\t\"github.com/x/y\"\n\t\"github.com/a/b\"\n)\n");
        h.vendor_context.add("github.com/x/y");

        let (imports, _) = run(&h).await;
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].literal, "\"github.com/a/b\"");
        assert_eq!(h.import_counts.count_of(&h.file_path), 1);
    }

    #[tokio::test]
    async fn scan_failure_accumulates_and_emits_nothing() {
        let h = harness(b"func main() {}\n");
        let (imports, packages) = run(&h).await;

        assert!(imports.is_empty());
        assert!(packages.is_empty());
        assert_eq!(h.errors.len(), 1);
        // The count is never set for a file that failed to scan.
        assert_eq!(h.import_counts.count_of(&h.file_path), 0);
        assert_eq!(h.import_counts.total(), 0);
    }
}
