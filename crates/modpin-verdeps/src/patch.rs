//! Revision accumulation and file patching.
//!
//! [`revise_deps`] consumes the revision stream, grouping revisions by file.
//! A file is patched exactly once: as soon as its import-revision count
//! reaches the authoritative expected count, its whole revision set is handed
//! to an apply task. Package revisions are opportunistic - zero or one per
//! file, applied when present, never blocking readiness. When the stream
//! closes, files still pending are flushed with whatever arrived and the
//! shortfall is reported as a warning.
//!
//! Applying is defensive about offsets: import ranges are re-aligned to the
//! nearest enclosing quote characters before composing, and the package
//! import comment is located by pattern at patch time. A file that cannot be
//! patched records an error without aborting its siblings.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::LazyLock;

use modpin_runtime::Runtime;
use regex::bytes::Regex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;

use crate::diff::{compose_byte_diffs, ByteDiff};
use crate::spec::{Revision, RevisionKind, RevisionList};
use crate::sync::{ErrorAccumulator, ImportCounts};
use crate::Error;

/// Matches a package clause followed by a legacy import comment on the same
/// line. Capture group 1 spans the whitespace and the comment, which is what
/// gets deleted.
static IMPORT_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^package[ \t]+\w+([ \t]+(?://[ \t]*import[ \t]+(?:"[^"\n]*"|`[^`\n]*`)[ \t]*$|/\*[ \t]*import[ \t]+(?:"[^"\n]*"|`[^`\n]*`)[ \t]*\*/))"#,
    )
    .expect("import comment pattern compiles")
});

pub struct ReviseDepsArgs {
    pub runtime: Arc<dyn Runtime>,
    pub import_counts: Arc<ImportCounts>,
    pub revision_rx: UnboundedReceiver<Revision>,
    pub errors: Arc<ErrorAccumulator>,
}

/// Consumes revisions until the stream closes, patching each file exactly
/// once its revision set is complete.
pub async fn revise_deps(mut args: ReviseDepsArgs) {
    let mut pending: FxHashMap<PathBuf, RevisionList> = FxHashMap::default();
    let mut patches = JoinSet::new();

    while let Some(rev) = args.revision_rx.recv().await {
        let path = rev.path.clone();
        let list = pending.entry(path.clone()).or_default();
        list.add(rev);

        if list.import_rev_count() == args.import_counts.count_of(&path) {
            let list = pending.remove(&path).unwrap_or_default();
            patches.spawn(apply_revisions(ApplyRevisionsArgs {
                runtime: Arc::clone(&args.runtime),
                file_path: path,
                revisions: list.into_revs(),
                errors: Arc::clone(&args.errors),
            }));
        }
    }

    // The stream is closed, so nothing pending can complete. Flush the
    // partial sets and tally what never arrived.
    if !pending.is_empty() {
        let mut missed_import_revs = 0usize;
        let flushed_files = pending.len();
        for (path, list) in pending.drain() {
            let expected = args.import_counts.count_of(&path);
            missed_import_revs += expected.saturating_sub(list.import_rev_count());
            patches.spawn(apply_revisions(ApplyRevisionsArgs {
                runtime: Arc::clone(&args.runtime),
                file_path: path,
                revisions: list.into_revs(),
                errors: Arc::clone(&args.errors),
            }));
        }
        tracing::warn!(
            flushed_files,
            missed_import_revs,
            "revision stream closed before every expected revision arrived"
        );
    }

    while patches.join_next().await.is_some() {}
}

struct ApplyRevisionsArgs {
    runtime: Arc<dyn Runtime>,
    file_path: PathBuf,
    revisions: Vec<Revision>,
    errors: Arc<ErrorAccumulator>,
}

/// Rewrites one file with its full revision set.
async fn apply_revisions(args: ApplyRevisionsArgs) {
    let content = match args.runtime.read_file(&args.file_path).await {
        Ok(content) => content,
        Err(err) => {
            args.errors.add(Error::Runtime(err));
            return;
        }
    };

    let mut diffs = Vec::with_capacity(args.revisions.len());
    for rev in args.revisions {
        match rev.kind {
            RevisionKind::Import {
                from,
                to,
                replacement,
            } => match find_import_path_boundaries(&content, from, to) {
                Some((from, to)) => diffs.push(ByteDiff::replacement(from, to, replacement)),
                None => {
                    args.errors.add(Error::Patch {
                        path: args.file_path,
                        reason: format!(
                            "no quoted import path encloses byte range [{from}, {to})"
                        ),
                    });
                    return;
                }
            },
            RevisionKind::Package { package_offset } => {
                if let Some((from, to)) = find_package_import_comment(&content, package_offset) {
                    diffs.push(ByteDiff::deletion(from, to));
                }
            }
        }
    }

    let patched = match compose_byte_diffs(&content, diffs) {
        Ok(patched) => patched,
        Err(err) => {
            args.errors.add(Error::Patch {
                path: args.file_path,
                reason: err.to_string(),
            });
            return;
        }
    };

    if let Err(err) = args.runtime.write_file(&args.file_path, &patched).await {
        args.errors.add(Error::Runtime(err));
    }
}

/// Widens `[from, to)` outward to the nearest enclosing quote characters,
/// returning the quote-inclusive range. `None` when either boundary runs off
/// the buffer without finding a quote.
fn find_import_path_boundaries(content: &[u8], from: usize, to: usize) -> Option<(usize, usize)> {
    if from >= content.len() || to > content.len() || from >= to {
        return None;
    }

    let is_quote = |b: u8| b == b'"' || b == b'`';

    let mut left = from;
    loop {
        if is_quote(content[left]) {
            break;
        }
        left = left.checked_sub(1)?;
    }

    let mut right = to - 1;
    while !is_quote(content[right]) {
        right += 1;
        if right >= content.len() {
            return None;
        }
    }

    Some((left, right + 1))
}

/// Locates a legacy import comment trailing the package clause at
/// `package_offset`, returning the byte range to delete (the whitespace
/// between the clause and the comment, plus the comment itself).
fn find_package_import_comment(content: &[u8], package_offset: usize) -> Option<(usize, usize)> {
    let line = content.get(package_offset..)?;
    let caps = IMPORT_COMMENT.captures(line)?;
    // The pattern may also match a later package-like line in the slice;
    // only a match at the clause itself counts.
    if caps.get(0)?.start() != 0 {
        return None;
    }
    let comment = caps.get(1)?;
    Some((package_offset + comment.start(), package_offset + comment.end()))
}
