//! Splicing bodies back into the untouched text of the original source file.

use crate::listing::LineListing;
use crate::locator::{
    find_token_line, BoundaryLocator, LocateError, BODY_CLOSE_TOKEN, BODY_OPEN_TOKEN,
};
use serde::{Deserialize, Serialize};

/// Text surrounding a function body in the unprocessed source file.
///
/// The preamble runs up to and including the body-opening `{` line; the
/// postamble starts right after the body-closing `}` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceContext {
    preamble: String,
    postamble: String,
}

impl SpliceContext {
    pub fn new(preamble: impl Into<String>, postamble: impl Into<String>) -> Self {
        Self {
            preamble: preamble.into(),
            postamble: postamble.into(),
        }
    }

    /// Split `listing` around the body of `function`.
    pub fn from_listing(
        listing: &LineListing,
        function: &str,
        locator: &dyn BoundaryLocator,
    ) -> Result<Self, LocateError> {
        let declaration = locator.declaration_start(listing, function)?;
        let body_start = find_token_line(listing, declaration, BODY_OPEN_TOKEN)?;
        let body_end = find_token_line(listing, body_start, BODY_CLOSE_TOKEN)?;
        Ok(Self {
            preamble: listing.text(0..body_start),
            postamble: listing.text(body_end..listing.len()),
        })
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    pub fn postamble(&self) -> &str {
        &self.postamble
    }
}

/// Whether a transformed body carries the closing brace the range consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClosingBrace {
    #[default]
    Append,
    Included,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyVariant<'a> {
    /// Extracted body without its signature, closing brace included.
    Original(&'a str),
    /// Replacement body emitted by the transformation tool.
    Transformed(&'a str),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Synthesizer {
    closing_brace: ClosingBrace,
}

impl Synthesizer {
    pub fn new(closing_brace: ClosingBrace) -> Self {
        Self { closing_brace }
    }

    /// `preamble + body + postamble`, with no syntactic validation.
    pub fn synthesize(&self, context: &SpliceContext, body: BodyVariant<'_>) -> String {
        let mut file = String::with_capacity(
            context.preamble.len() + context.postamble.len() + body_len(body) + 2,
        );
        file.push_str(&context.preamble);
        match body {
            BodyVariant::Original(text) => file.push_str(text),
            BodyVariant::Transformed(text) => {
                file.push_str(text);
                if self.closing_brace == ClosingBrace::Append {
                    if !text.is_empty() && !text.ends_with('\n') {
                        file.push('\n');
                    }
                    file.push_str(BODY_CLOSE_TOKEN);
                    file.push('\n');
                }
            }
        }
        file.push_str(&context.postamble);
        file
    }
}

fn body_len(body: BodyVariant<'_>) -> usize {
    match body {
        BodyVariant::Original(text) | BodyVariant::Transformed(text) => text.len(),
    }
}
