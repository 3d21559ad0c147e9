//! Discovered source facts and the revisions derived from them.
//!
//! Traversal and analysis produce [`ImportSpec`]s and [`PackageSpec`]s;
//! resolution turns them into [`Revision`]s, which the patching stage
//! consumes exactly once per spec.

use std::path::PathBuf;

/// A discovered import statement: the literal text (quotes included), its
/// byte offset in the owning file, and the file's path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub literal: String,
    pub offset: usize,
    pub file_path: PathBuf,
}

impl ImportSpec {
    pub fn new(literal: impl Into<String>, offset: usize, file_path: impl Into<PathBuf>) -> Self {
        Self {
            literal: literal.into(),
            offset,
            file_path: file_path.into(),
        }
    }

    /// The literal with its surrounding quotes stripped.
    pub fn import_path(&self) -> &str {
        crate::conventions::unquote_literal(&self.literal)
    }
}

/// The byte offset of a file's `package` clause plus the file's path. Used to
/// locate and strip a legacy import comment on the package line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub offset: usize,
    pub file_path: PathBuf,
}

impl PackageSpec {
    pub fn new(offset: usize, file_path: impl Into<PathBuf>) -> Self {
        Self {
            offset,
            file_path: file_path.into(),
        }
    }
}

/// A single pending edit to a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub path: PathBuf,
    pub kind: RevisionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionKind {
    /// Replace the import literal in `[from, to)` with `replacement`.
    Import {
        from: usize,
        to: usize,
        replacement: Vec<u8>,
    },
    /// Delete the import comment trailing the package clause at
    /// `package_offset`, if one exists.
    Package { package_offset: usize },
}

impl Revision {
    pub fn import(spec: &ImportSpec, replacement: Vec<u8>) -> Self {
        Self {
            path: spec.file_path.clone(),
            kind: RevisionKind::Import {
                from: spec.offset,
                to: spec.offset + spec.literal.len(),
                replacement,
            },
        }
    }

    pub fn package(spec: &PackageSpec) -> Self {
        Self {
            path: spec.file_path.clone(),
            kind: RevisionKind::Package {
                package_offset: spec.offset,
            },
        }
    }

    pub fn revises_import(&self) -> bool {
        matches!(self.kind, RevisionKind::Import { .. })
    }

    pub fn revises_package(&self) -> bool {
        matches!(self.kind, RevisionKind::Package { .. })
    }
}

/// Per-file accumulation of revisions, tracking the two revision kinds
/// separately so readiness can be decided against the expected import count.
#[derive(Debug, Default)]
pub struct RevisionList {
    revs: Vec<Revision>,
    import_rev_count: usize,
    package_rev_count: usize,
}

impl RevisionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rev: Revision) {
        if rev.revises_import() {
            self.import_rev_count += 1;
        } else {
            self.package_rev_count += 1;
        }
        self.revs.push(rev);
    }

    pub fn import_rev_count(&self) -> usize {
        self.import_rev_count
    }

    pub fn package_rev_count(&self) -> usize {
        self.package_rev_count
    }

    pub fn into_revs(self) -> Vec<Revision> {
        self.revs
    }

    pub fn len(&self) -> usize {
        self.revs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revs.is_empty()
    }
}
