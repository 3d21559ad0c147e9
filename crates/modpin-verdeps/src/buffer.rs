//! Buffering of specs discovered inside a vendor subtree.
//!
//! Specs surface while the vendor boundary's contexts are still being
//! populated, so imports that look versionable cannot be classified inline.
//! The buffer holds them until both sub-streams close (the caller finalizes
//! the boundary's child context before letting that happen), then re-checks
//! each held import against the context the vendored code sees - the
//! enclosing scope's context, since vendored siblings do not vendor for one
//! another. Contained imports are vendored and dropped; the rest are
//! legitimately external and get forwarded. The corrected per-file count is
//! published before any of a file's specs are forwarded so downstream
//! accumulation always has an authoritative count.

use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::conventions::GITHUB_PREFIX;
use crate::spec::{ImportSpec, PackageSpec};
use crate::sync::ImportCounts;
use crate::vendor::VendorContext;

pub struct BufferVendorablesArgs {
    /// `None` when this vendor subtree is itself nested inside another
    /// vendor subtree; the enclosing buffer publishes the counts then.
    pub import_counts: Option<Arc<ImportCounts>>,
    /// The context the buffered code resolves imports against: the scope
    /// enclosing the vendor boundary, not the boundary's own child context.
    pub vendor_context: Arc<VendorContext>,
    pub input_import_rx: UnboundedReceiver<ImportSpec>,
    pub input_package_rx: UnboundedReceiver<PackageSpec>,
    pub output_import_tx: UnboundedSender<ImportSpec>,
    pub output_package_tx: UnboundedSender<PackageSpec>,
}

/// Buffers a vendor sub-traversal's specs until its context is finalized,
/// then reclassifies and forwards them.
pub async fn buffer_vendorables(mut args: BufferVendorablesArgs) {
    let mut reconsiderable: Vec<ImportSpec> = Vec::new();
    let mut package_specs: Vec<PackageSpec> = Vec::new();
    let mut forwardable: FxHashMap<PathBuf, Vec<ImportSpec>> = FxHashMap::default();

    let mut imports_open = true;
    let mut packages_open = true;
    while imports_open || packages_open {
        tokio::select! {
            spec = args.input_import_rx.recv(), if imports_open => match spec {
                Some(spec) => {
                    // A GitHub import could still be a vendored package we
                    // have not indexed yet; hold it for reclassification.
                    if spec.import_path().starts_with(GITHUB_PREFIX) {
                        reconsiderable.push(spec);
                    } else {
                        forwardable.entry(spec.file_path.clone()).or_default().push(spec);
                    }
                }
                None => imports_open = false,
            },
            spec = args.input_package_rx.recv(), if packages_open => match spec {
                Some(spec) => package_specs.push(spec),
                None => packages_open = false,
            },
        }
    }

    for spec in reconsiderable {
        if !args.vendor_context.contains(spec.import_path()) {
            forwardable.entry(spec.file_path.clone()).or_default().push(spec);
        }
    }

    for (file_path, specs) in forwardable {
        if let Some(import_counts) = &args.import_counts {
            import_counts.set(&file_path, specs.len());
        }
        for spec in specs {
            let _ = args.output_import_tx.send(spec);
        }
    }

    for spec in package_specs {
        let _ = args.output_package_tx.send(spec);
    }
}
