//! Immutable, 0-indexed line listings of a source file.
//!
//! Every line keeps its original terminator so that slicing and re-joining a
//! listing reproduces the file byte-for-byte.

use std::fs;
use std::io;
use std::ops::Range;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineListing {
    origin: String,
    lines: Vec<String>,
}

impl LineListing {
    /// Split `text` into lines, keeping each line's `\n`.
    pub fn from_text(origin: impl Into<String>, text: &str) -> Self {
        Self {
            origin: origin.into(),
            lines: text.split_inclusive('\n').map(str::to_string).collect(),
        }
    }

    pub fn read(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::from_text(path.display().to_string(), &text))
    }

    /// Where the listing came from, used to identify it in locator errors.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Lines in `range`, clamped to the listing.
    pub fn slice(&self, range: Range<usize>) -> &[String] {
        let end = range.end.min(self.lines.len());
        let start = range.start.min(end);
        &self.lines[start..end]
    }

    /// Concatenated text of the lines in `range`.
    pub fn text(&self, range: Range<usize>) -> String {
        self.slice(range).concat()
    }
}
