//! Source-line store.
//!
//! A read-through cache mapping file paths to their lines. The loader fills
//! it while visiting; afterwards it is read-only. Consumers use it to slice
//! object source ranges without re-reading files.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

/// Append-only collection of source lines keyed by file path.
#[derive(Debug, Default)]
pub struct LinesCollection {
    files: IndexMap<PathBuf, Vec<String>>,
}

impl LinesCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the source of a file, splitting it into lines.
    pub fn insert(&mut self, path: impl Into<PathBuf>, source: &str) {
        let lines = source.lines().map(str::to_string).collect();
        self.files.insert(path.into(), lines);
    }

    /// Get the lines of a file if already cached.
    pub fn get(&self, path: &Path) -> Option<&[String]> {
        self.files.get(path).map(|v| v.as_slice())
    }

    /// Get the lines of a file, reading it from disk on a miss.
    pub fn get_or_read(&mut self, path: &Path) -> Option<&[String]> {
        if !self.files.contains_key(path) {
            let source = fs::read_to_string(path).ok()?;
            self.insert(path, &source);
        }
        self.get(path)
    }

    /// Slice a 1-based inclusive line range of a cached file.
    pub fn slice(&self, path: &Path, lineno: usize, endlineno: usize) -> Option<Vec<&str>> {
        let lines = self.get(path)?;
        if lineno == 0 || lineno > endlineno || endlineno > lines.len() {
            return None;
        }
        Some(lines[lineno - 1..endlineno].iter().map(String::as_str).collect())
    }

    /// Number of cached files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total number of cached lines across all files.
    pub fn total_lines(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

/// Byte-offset index of line starts for one source buffer.
///
/// The parser reports byte offsets; objects carry 1-based line numbers.
#[derive(Debug)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    /// Build the index from a source buffer.
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        for (offset, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                starts.push(offset + 1);
            }
        }
        Self { starts }
    }

    /// 1-based line number containing the given byte offset.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(index) => index + 1,
            Err(index) => index,
        }
    }

    /// Number of lines in the indexed buffer.
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_slice() {
        let mut lines = LinesCollection::new();
        lines.insert("m.py", "a = 1\nb = 2\nc = 3\n");
        let slice = lines.slice(Path::new("m.py"), 2, 3).unwrap();
        assert_eq!(slice, vec!["b = 2", "c = 3"]);
    }

    #[test]
    fn slice_out_of_range_is_none() {
        let mut lines = LinesCollection::new();
        lines.insert("m.py", "a = 1\n");
        assert!(lines.slice(Path::new("m.py"), 1, 2).is_none());
        assert!(lines.slice(Path::new("m.py"), 0, 1).is_none());
    }

    #[test]
    fn line_index_maps_offsets() {
        let index = LineIndex::new("ab\ncd\nef");
        assert_eq!(index.line_of(0), 1);
        assert_eq!(index.line_of(1), 1);
        assert_eq!(index.line_of(3), 2);
        assert_eq!(index.line_of(6), 3);
        assert_eq!(index.line_count(), 3);
    }

    #[test]
    fn line_index_empty_source() {
        let index = LineIndex::new("");
        assert_eq!(index.line_of(0), 1);
    }
}
