//! Byte ranges into a definition, for error reporting.

use std::ops::Range;

/// A byte range `start..end` of the definition text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// One-based line and column of a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The smallest span covering both.
    pub fn merge(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// The covered text.
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    /// Where the span starts in `source`.
    pub fn locate(&self, source: &str) -> Location {
        let before = &source[..self.start.min(source.len())];
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        Location {
            line: before.matches('\n').count() + 1,
            column: before[line_start..].chars().count() + 1,
        }
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

/// A parsed value and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub value: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(value: T, span: Span) -> Self {
        Self { value, span }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        assert_eq!(Span::new(5, 10).merge(Span::new(8, 15)), Span::new(5, 15));
        assert_eq!(Span::new(8, 15).merge(Span::new(5, 10)), Span::new(5, 15));
    }

    #[test]
    fn test_locate() {
        let source = "CREATE TABLE `t` (\n  `id` int\n)";

        assert_eq!(Span::new(0, 1).locate(source), Location { line: 1, column: 1 });
        assert_eq!(Span::new(7, 12).locate(source), Location { line: 1, column: 8 });
        assert_eq!(Span::new(19, 20).locate(source), Location { line: 2, column: 1 });
        assert_eq!(Span::new(21, 25).locate(source), Location { line: 2, column: 3 });
        assert_eq!(Span::new(31, 31).locate(source), Location { line: 3, column: 2 });
    }

    #[test]
    fn test_slice() {
        assert_eq!(Span::from(7..13).slice("ENGINE=InnoDB"), "InnoDB");
    }
}
