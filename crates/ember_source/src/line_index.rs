//! Offset to line/column mapping for a single version of a source.

use serde::{Deserialize, Serialize};

/// Precomputed line starts of one version of a source's text.
///
/// This is the value of every entry's `line-index` slot. It is derived from
/// the contents alone, so any content change invalidates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineIndex {
    /// Byte offsets of each line start (the first entry is always 0).
    line_starts: Vec<u32>,
    /// Total length of the indexed text in bytes.
    len: u32,
}

impl LineIndex {
    /// Builds the index for `text`.
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self {
            line_starts,
            len: text.len() as u32,
        }
    }

    /// Returns the number of lines, counting a trailing empty line.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Converts a byte offset into 1-indexed `(line, column)` coordinates.
    ///
    /// Offsets past the end of the text are clamped to the end.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let offset = offset.min(self.len);
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let line = (line_idx as u32) + 1;
        let col = offset - self.line_starts[line_idx] + 1;
        (line, col)
    }

    /// Converts 1-indexed `(line, column)` coordinates back into a byte offset.
    ///
    /// Returns `None` if the line does not exist or the column runs past the
    /// end of that line.
    pub fn offset(&self, line: u32, col: u32) -> Option<u32> {
        if line == 0 || col == 0 {
            return None;
        }
        let idx = (line - 1) as usize;
        let start = *self.line_starts.get(idx)?;
        let line_end = self
            .line_starts
            .get(idx + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        let offset = start + col - 1;
        (offset <= line_end).then_some(offset)
    }
}
