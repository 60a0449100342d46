//! Line-oriented kernel location.
//!
//! This is deliberately not a parser: the signature is found by substring match
//! on the function name and the body end by the first line that is exactly the
//! terminator token. Name collisions and closing braces that share a line with
//! code are known limitations and are reported, not repaired.

use crate::listing::LineListing;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub const BODY_OPEN_TOKEN: &str = "{";
pub const BODY_CLOSE_TOKEN: &str = "}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error("could not find kernel function '{function}' in {origin}")]
    FunctionNotFound { function: String, origin: String },
    #[error("could not find a line equal to '{token}' at or after line {from} in {origin}")]
    TokenNotFound {
        token: String,
        from: usize,
        origin: String,
    },
    #[error("invalid boundary range {start}..{end} for a listing of {len} lines")]
    InvalidRange { start: usize, end: usize, len: usize },
}

/// Half-open line range `[start, end)` covering a function signature and body.
/// Only constructed through [`BoundaryRange::new`]; serialized for display, never read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BoundaryRange {
    start: usize,
    end: usize,
}

impl BoundaryRange {
    /// Enforces `start < end <= len`.
    pub fn new(start: usize, end: usize, len: usize) -> Result<Self, LocateError> {
        if start >= end || end > len {
            return Err(LocateError::InvalidRange { start, end, len });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of lines covered; always at least one.
    pub fn line_count(&self) -> usize {
        self.end - self.start
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

/// Strategy for finding a named function's boundaries in a listing.
pub trait BoundaryLocator {
    fn name(&self) -> &str;

    /// Range from the line before the signature through the body-closing line.
    fn locate(&self, listing: &LineListing, function: &str) -> Result<BoundaryRange, LocateError>;

    /// Index of the line that introduces the function's declaration.
    fn declaration_start(&self, listing: &LineListing, function: &str) -> Result<usize, LocateError>;
}

/// Top-to-bottom line scanner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineScanLocator;

impl LineScanLocator {
    pub fn new() -> Self {
        Self
    }
}

impl BoundaryLocator for LineScanLocator {
    fn name(&self) -> &str {
        "line-scan"
    }

    fn locate(&self, listing: &LineListing, function: &str) -> Result<BoundaryRange, LocateError> {
        let signature = find_signature_line(listing, function)?;
        let start = line_before(signature, listing.len())?;
        let end = find_token_line(listing, signature + 1, BODY_CLOSE_TOKEN)?;
        let range = BoundaryRange::new(start, end, listing.len())?;
        debug!(
            function,
            origin = listing.origin(),
            start = range.start(),
            end = range.end(),
            "located kernel"
        );
        Ok(range)
    }

    fn declaration_start(&self, listing: &LineListing, function: &str) -> Result<usize, LocateError> {
        let signature = find_signature_line(listing, function)?;
        line_before(signature, listing.len())
    }
}

// The return type sits on the line above the name.
fn line_before(signature: usize, len: usize) -> Result<usize, LocateError> {
    signature.checked_sub(1).ok_or(LocateError::InvalidRange {
        start: 0,
        end: signature + 1,
        len,
    })
}

/// Index of the first line containing `function` as a substring.
pub fn find_signature_line(listing: &LineListing, function: &str) -> Result<usize, LocateError> {
    listing
        .lines()
        .iter()
        .position(|line| line.contains(function))
        .ok_or_else(|| LocateError::FunctionNotFound {
            function: function.to_string(),
            origin: listing.origin().to_string(),
        })
}

/// One past the first line at or after `from` whose trailing-trimmed text is `token`.
pub fn find_token_line(
    listing: &LineListing,
    from: usize,
    token: &str,
) -> Result<usize, LocateError> {
    listing
        .lines()
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, line)| line.trim_end() == token)
        .map(|(index, _)| index + 1)
        .ok_or_else(|| LocateError::TokenNotFound {
            token: token.to_string(),
            from,
            origin: listing.origin().to_string(),
        })
}
