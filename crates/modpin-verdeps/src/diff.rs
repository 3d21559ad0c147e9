//! Byte-range diff composition.
//!
//! [`compose_byte_diffs`] rebuilds a byte buffer with a set of non-overlapping
//! range replacements applied. Producers emit diffs in arbitrary order; the
//! diffs are treated as index ranges into the base buffer and composed by
//! walking them sorted by their starting offset. Any bounds violation rejects
//! the whole composition - no partial output is ever produced.

use crate::{Error, Result};

/// One replacement: base bytes in `[from, to)` are replaced by `bytes`.
/// `None` bytes mean deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteDiff {
    pub from: usize,
    pub to: usize,
    pub bytes: Option<Vec<u8>>,
}

impl ByteDiff {
    pub fn replacement(from: usize, to: usize, bytes: Vec<u8>) -> Self {
        Self {
            from,
            to,
            bytes: Some(bytes),
        }
    }

    pub fn deletion(from: usize, to: usize) -> Self {
        Self {
            from,
            to,
            bytes: None,
        }
    }

    fn replacement_len(&self) -> usize {
        self.bytes.as_ref().map_or(0, Vec::len)
    }
}

/// Applies `diffs` to `base`, returning the rebuilt buffer.
///
/// Every diff must satisfy `from < to <= base.len()` and the ranges must not
/// overlap one another; otherwise an [`Error::Diff`] is returned and `base`
/// is left untouched.
pub fn compose_byte_diffs(base: &[u8], mut diffs: Vec<ByteDiff>) -> Result<Vec<u8>> {
    if diffs.is_empty() {
        return Ok(base.to_vec());
    }

    diffs.sort_by_key(|diff| diff.from);

    // Validate bounds and overlap before touching the output.
    let mut previous_to = 0usize;
    for diff in &diffs {
        if diff.to <= diff.from {
            return Err(Error::Diff(format!(
                "invalid byte diff range [{}, {})",
                diff.from, diff.to
            )));
        }
        if diff.to > base.len() {
            return Err(Error::Diff(format!(
                "byte diff range [{}, {}) is out of bounds for a {} byte buffer",
                diff.from,
                diff.to,
                base.len()
            )));
        }
        if diff.from < previous_to {
            return Err(Error::Diff(format!(
                "byte diff range [{}, {}) overlaps a preceding diff",
                diff.from, diff.to
            )));
        }
        previous_to = diff.to;
    }

    let delta: isize = diffs
        .iter()
        .map(|diff| diff.replacement_len() as isize - (diff.to - diff.from) as isize)
        .sum();
    let mut out = Vec::with_capacity((base.len() as isize + delta) as usize);

    let mut cursor = 0usize;
    for diff in &diffs {
        out.extend_from_slice(&base[cursor..diff.from]);
        if let Some(bytes) = &diff.bytes {
            out.extend_from_slice(bytes);
        }
        cursor = diff.to;
    }
    out.extend_from_slice(&base[cursor..]);

    Ok(out)
}
