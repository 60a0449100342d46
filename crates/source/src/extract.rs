//! Body extraction from a located range.

use crate::listing::LineListing;
use crate::locator::{find_token_line, BoundaryRange, LocateError, BODY_OPEN_TOKEN};

/// Marker identifying tool/compiler directive lines that must not leak into an
/// isolated snippet.
pub const DEFAULT_DIRECTIVE_MARKER: &str = "pragma";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveFilter {
    marker: String,
}

impl DirectiveFilter {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn is_directive(&self, line: &str) -> bool {
        line.contains(&self.marker)
    }
}

impl Default for DirectiveFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DIRECTIVE_MARKER)
    }
}

/// Extracted function text, one entry per line with terminators preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyText {
    lines: Vec<String>,
}

impl BodyText {
    pub fn from_lines(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn text(&self) -> String {
        self.lines.concat()
    }

    /// Drop every line up to and including the first body-opening line.
    pub fn without_signature(&self) -> Result<BodyText, LocateError> {
        let listing = LineListing::from_text("extracted body", &self.text());
        let body_start = find_token_line(&listing, 0, BODY_OPEN_TOKEN)?;
        Ok(Self::from_lines(listing.slice(body_start..listing.len()).to_vec()))
    }
}

/// Lines of `range` in order, minus directive lines. No other rewriting happens.
pub fn extract(listing: &LineListing, range: BoundaryRange, filter: &DirectiveFilter) -> BodyText {
    let lines = listing
        .slice(range.as_range())
        .iter()
        .filter(|line| !filter.is_directive(line))
        .cloned()
        .collect();
    BodyText::from_lines(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SNIPPET: &str = "\
static void
kernel_atax(int m, int n)
{
  int i, j;
#pragma scop
  for (i = 0; i < n; i++)
    y[i] = 0;
#pragma endscop
}
";

    #[test]
    fn drops_directive_lines_only() {
        let listing = LineListing::from_text("atax", SNIPPET);
        let range = BoundaryRange::new(0, listing.len(), listing.len()).unwrap();
        let body = extract(&listing, range, &DirectiveFilter::default());
        assert_eq!(
            body.text(),
            "static void\nkernel_atax(int m, int n)\n{\n  int i, j;\n  for (i = 0; i < n; i++)\n    y[i] = 0;\n}\n"
        );
    }

    #[test]
    fn strips_signature_through_opening_brace() {
        let listing = LineListing::from_text("atax", SNIPPET);
        let range = BoundaryRange::new(0, listing.len(), listing.len()).unwrap();
        let body = extract(&listing, range, &DirectiveFilter::default())
            .without_signature()
            .unwrap();
        assert_eq!(body.lines()[0], "  int i, j;\n");
        assert_eq!(body.lines().last().map(String::as_str), Some("}\n"));
    }

    #[test]
    fn signature_strip_requires_opening_line() {
        let body = BodyText::from_lines(vec!["int f() {\n".into(), "}\n".into()]);
        assert!(body.without_signature().is_err());
    }

    proptest! {
        #[test]
        fn extraction_filters_markers_and_keeps_order(
            lines in proptest::collection::vec(
                prop_oneof!["[a-z =;]{0,10}", "#pragma [a-z]{0,6}"],
                1..40,
            ),
        ) {
            let text: String = lines.iter().map(|l| format!("{l}\n")).collect();
            let listing = LineListing::from_text("prop", &text);
            let range = BoundaryRange::new(0, listing.len(), listing.len()).unwrap();
            let body = extract(&listing, range, &DirectiveFilter::default());

            prop_assert!(body.lines().iter().all(|l| !l.contains("pragma")));
            let expected: Vec<String> = lines
                .iter()
                .filter(|l| !l.contains("pragma"))
                .map(|l| format!("{l}\n"))
                .collect();
            prop_assert_eq!(body.lines(), expected.as_slice());
        }
    }
}
